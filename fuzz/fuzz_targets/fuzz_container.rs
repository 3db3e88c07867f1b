#![no_main]

//! Fuzz target for container registration and resolution
//!
//! Drives arbitrary op sequences against a container and checks that no
//! operation panics and that cache invariants hold.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use marionette_di::{
    ConstructArgs, Container, DiResult, Inject, Module, RuntimeArgs, ScopeModule, Service,
};
use std::sync::Arc;

struct Alpha;
impl Service for Alpha {}
impl Inject for Alpha {
    fn construct(_: &mut ConstructArgs) -> DiResult<Self> {
        Ok(Self)
    }
}

struct Beta;
impl Service for Beta {}
impl Inject for Beta {
    fn construct(_: &mut ConstructArgs) -> DiResult<Self> {
        Ok(Self)
    }
}

struct Gamma;
impl Service for Gamma {}
impl Inject for Gamma {
    fn construct(_: &mut ConstructArgs) -> DiResult<Self> {
        Ok(Self)
    }
}

#[derive(Debug, Arbitrary)]
enum ContainerOp {
    RegisterSingleAlpha,
    RegisterScopedBeta,
    RegisterFactoryGamma,
    ResolveAlpha,
    ResolveBeta,
    ResolveGamma,
    ResolveBetaInScope,
    ResolveGammaWithArgs,
    Validate,
    Launch,
    CreateAndDropScope,
}

fuzz_target!(|ops: Vec<ContainerOp>| {
    let container = Container::new();
    let mut last_alpha: Option<Arc<Alpha>> = None;

    for op in ops {
        match op {
            ContainerOp::RegisterSingleAlpha => {
                // May fail as a duplicate; never panics.
                let _ = container.use_module(&Module::builder().single::<Alpha>().build());
            }
            ContainerOp::RegisterScopedBeta => {
                let _ = container.use_module(&Module::builder().scoped::<Beta>().build());
            }
            ContainerOp::RegisterFactoryGamma => {
                let _ = container.use_module(&Module::builder().factory::<Gamma>().build());
            }
            ContainerOp::ResolveAlpha => {
                if let Ok(alpha) = container.resolve::<Alpha>() {
                    if let Some(previous) = &last_alpha {
                        assert!(Arc::ptr_eq(previous, &alpha));
                    }
                    last_alpha = Some(alpha);
                }
            }
            ContainerOp::ResolveBeta => {
                // Scoped without a scope: must error, never panic.
                assert!(container.resolve::<Beta>().is_err());
            }
            ContainerOp::ResolveGamma => {
                if let (Ok(a), Ok(b)) =
                    (container.resolve::<Gamma>(), container.resolve::<Gamma>())
                {
                    assert!(!Arc::ptr_eq(&a, &b));
                }
            }
            ContainerOp::ResolveBetaInScope => {
                if let Ok(scope) = container.create_scope(&ScopeModule::empty()) {
                    if let (Ok(a), Ok(b)) = (scope.resolve::<Beta>(), scope.resolve::<Beta>()) {
                        assert!(Arc::ptr_eq(&a, &b));
                    }
                    scope.destroy();
                }
            }
            ContainerOp::ResolveGammaWithArgs => {
                let _ = container.resolve_with::<Gamma>(RuntimeArgs::new());
            }
            ContainerOp::Validate => {
                let _ = container.validate();
            }
            ContainerOp::Launch => {
                let _ = container.launch();
            }
            ContainerOp::CreateAndDropScope => {
                if let Ok(scope) = container.create_scope(&ScopeModule::empty()) {
                    scope.destroy();
                    scope.destroy();
                    assert!(scope.is_destroyed());
                }
            }
        }
    }
});
