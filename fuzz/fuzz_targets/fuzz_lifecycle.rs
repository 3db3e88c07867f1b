#![no_main]

//! Fuzz target for scope trees and tick lifecycles
//!
//! Builds arbitrary scope trees, resolves ticking services into them,
//! steps frames and destroys nodes in arbitrary order. The dispatcher must
//! never exceed one connection per signal, and destroyed scopes must
//! reject further work.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use marionette_di::{
    Capabilities, ConstructArgs, Container, DiResult, Inject, ManualTickDriver, Module,
    ScopeModule, Service, Tickable,
};
use std::sync::Arc;

struct Spinner;
impl Tickable for Spinner {
    fn on_tick(&self, _delta_time: f64) {}
}
impl Service for Spinner {
    fn as_tickable(&self) -> Option<&dyn Tickable> {
        Some(self)
    }
}
impl Inject for Spinner {
    const CAPS: Capabilities = Capabilities::none().with_tick();
    fn construct(_: &mut ConstructArgs) -> DiResult<Self> {
        Ok(Self)
    }
}

#[derive(Debug, Arbitrary)]
enum LifecycleOp {
    CreateScope,
    CreateChild { parent: u8 },
    ResolveSpinner { scope: u8 },
    DestroyScope { scope: u8 },
    Step,
    PauseToggle,
}

fuzz_target!(|ops: Vec<LifecycleOp>| {
    let driver = ManualTickDriver::new(false);
    let container = Container::with_driver(Arc::new(driver.clone()));
    container
        .use_module(&Module::builder().scoped::<Spinner>().build())
        .expect("ingest");

    let mut scopes = Vec::new();
    let mut paused = false;

    for op in ops {
        match op {
            LifecycleOp::CreateScope => {
                if scopes.len() < 32
                    && let Ok(scope) = container.create_scope(&ScopeModule::empty())
                {
                    scopes.push(scope);
                }
            }
            LifecycleOp::CreateChild { parent } => {
                if scopes.is_empty() || scopes.len() >= 32 {
                    continue;
                }
                let parent = &scopes[parent as usize % scopes.len()];
                match parent.create_child_scope() {
                    Ok(child) => scopes.push(child),
                    Err(_) => assert!(parent.is_destroyed()),
                }
            }
            LifecycleOp::ResolveSpinner { scope } => {
                if scopes.is_empty() {
                    continue;
                }
                let scope = &scopes[scope as usize % scopes.len()];
                match scope.resolve::<Spinner>() {
                    Ok(_) => assert!(!scope.is_destroyed()),
                    Err(_) => {}
                }
            }
            LifecycleOp::DestroyScope { scope } => {
                if scopes.is_empty() {
                    continue;
                }
                let scope = &scopes[scope as usize % scopes.len()];
                scope.destroy();
                assert!(scope.is_destroyed());
            }
            LifecycleOp::Step => {
                driver.step(1.0 / 60.0);
            }
            LifecycleOp::PauseToggle => {
                let dispatcher = container.tick_dispatcher();
                if paused {
                    dispatcher.resume();
                } else {
                    dispatcher.pause();
                }
                paused = !paused;
            }
        }
    }

    // One logic connection at most, however many scopes ticked.
    assert!(driver.connection_count() <= 1);
});
