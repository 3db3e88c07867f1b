//! Demo for the #[derive(Service)] macro
//!
//! Run with:
//!   cargo run --example derive --features derive

use marionette_di::{
    ConstructArgs, Container, Destroyable, DiResult, Inject, ManualTickDriver, Module, ScopeModule,
    Service, Tickable,
};
use std::sync::Arc;

#[derive(Service)]
#[service(tick, destroy)]
struct Turret {
    heat: std::sync::atomic::AtomicU32,
}

impl Tickable for Turret {
    fn on_tick(&self, _delta_time: f64) {
        let heat = self
            .heat
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        println!("turret heat: {heat}");
    }
}

impl Destroyable for Turret {
    fn on_destroy(&self) -> DiResult<()> {
        println!("turret dismantled");
        Ok(())
    }
}

impl Inject for Turret {
    // Emitted by the derive, so the flags cannot drift from the accessors.
    const CAPS: marionette_di::Capabilities = Self::SERVICE_CAPS;

    fn construct(_: &mut ConstructArgs) -> DiResult<Self> {
        Ok(Self {
            heat: std::sync::atomic::AtomicU32::new(0),
        })
    }
}

fn main() {
    let driver = ManualTickDriver::new(false);
    let container = Container::with_driver(Arc::new(driver.clone()));
    container
        .use_module(&Module::builder().scoped::<Turret>().build())
        .expect("module ingest");

    let scope = container
        .create_scope(&ScopeModule::builder().root::<Turret>().build())
        .expect("scope");

    driver.step(1.0 / 60.0);
    driver.step(1.0 / 60.0);
    scope.destroy();
}
