//! # Marionette DI - Lifecycle-Aware Dependency Injection for Frame-Driven Runtimes
//!
//! A dependency-injection core for long-lived interactive applications: it
//! ingests declarative registrations, walks the dependency graph in a
//! correct order with cycle detection, enforces lifetime rules, and manages
//! start/tick/destroy lifecycles across a tree of per-entity scopes.
//!
//! ## Features
//!
//! - 🔑 **Tokens** - Opaque identity handles bind implementations to
//!   interface-style keys, interchangeable with concrete types everywhere
//! - ⏳ **Three lifetimes** - `singleton` (per container), `scoped` (per
//!   scope node), `factory` (fresh on every resolve)
//! - 🌳 **Scope tree** - Per-entity instance caches with externally provided
//!   values and ordered destruction (children first)
//! - 🔁 **Single tick subscription** - One shared connection per host frame
//!   signal regardless of how many instances tick
//! - 🧭 **Cycle detection** - The exact recursion stack, rendered
//!   `A → B → A` in the error
//! - 🧪 **Validation** - All dependency problems accumulate into one
//!   numbered report before anything is constructed
//! - 📊 **Observable** - Optional tracing integration with JSON or pretty
//!   output
//!
//! ## Quick Start
//!
//! ```rust
//! use marionette_di::{
//!     ClassMeta, ConstructArgs, Container, DiResult, Inject, Module, Service,
//! };
//! use std::sync::Arc;
//!
//! struct Config { max_players: u32 }
//! impl Service for Config {}
//! impl Inject for Config {
//!     fn construct(_: &mut ConstructArgs) -> DiResult<Self> {
//!         Ok(Self { max_players: 16 })
//!     }
//! }
//!
//! struct Matchmaker { config: Arc<Config> }
//! impl Service for Matchmaker {}
//! impl Inject for Matchmaker {
//!     fn metadata() -> ClassMeta {
//!         ClassMeta::new().dependency::<Config>(0)
//!     }
//!     fn construct(args: &mut ConstructArgs) -> DiResult<Self> {
//!         Ok(Self { config: args.dependency()? })
//!     }
//! }
//!
//! let container = Container::new();
//! container
//!     .use_module(&Module::builder().single::<Config>().single::<Matchmaker>().build())
//!     .unwrap();
//!
//! let matchmaker = container.resolve::<Matchmaker>().unwrap();
//! assert_eq!(matchmaker.config.max_players, 16);
//! ```
//!
//! ## Scopes
//!
//! Per-entity object graphs (one per connected player, say) live in scopes.
//! A scope caches its scoped instances, accepts pre-constructed externals,
//! and tears everything down in one `destroy` call: tick subscriptions are
//! unhooked first, children destroyed next, then the scope's own
//! destroyables run.
//!
//! ## Ticking
//!
//! The host runtime hands the container a [`TickDriver`] for its logic and
//! render signals. However many instances tick, the shared
//! [`TickDispatcher`] holds at most one connection per signal and fans each
//! frame out itself. [`ManualTickDriver`] steps frames by hand in tests.

mod container;
mod diagnostics;
mod error;
mod inject;
mod key;
#[cfg(feature = "tracing")]
pub mod logging;
mod reflect;
mod registration;
mod scope;
mod service;
mod storage;
mod ticker;
mod token;

pub use container::{Container, KeyedFactory};
pub use diagnostics::{ScopeDebug, TickDebugInfo};
pub use error::{DiError, DiResult, ResolutionChain};
pub use inject::{ConstructArgs, Inject, RuntimeArgs};
pub use key::Key;
pub use reflect::{ClassMeta, Reflection};
pub use registration::{
    Binding, Module, ModuleBuilder, Provider, ScopeModule, ScopeModuleBuilder, provider,
};
pub use scope::{Scope, ScopeId};
pub use service::{
    Capabilities, Destroyable, FixedTickable, Lifetime, RenderTickable, Service, Startable,
    Tickable, Warmup, downcast_service,
};
pub use ticker::{DriverHandle, ManualTickDriver, TickDispatcher, TickDriver, TickFn};
pub use token::{Token, create_token, is_token};

#[cfg(feature = "derive")]
pub use marionette_derive::Service;

// Re-export for convenience
pub use std::sync::Arc;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Capabilities, ClassMeta, ConstructArgs, Container, DiError, DiResult, Inject, Key,
        Lifetime, Module, RuntimeArgs, Scope, ScopeModule, Service, Token, create_token, provider,
    };
    pub use std::sync::Arc;
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    // =====================================================================
    // Scenario: bind by interface
    // =====================================================================

    mod bind {
        use super::*;

        static TOKEN: Lazy<Token> = Lazy::new(|| create_token("ClockToken"));

        struct Clock;
        impl Service for Clock {}
        impl Inject for Clock {
            fn construct(_: &mut ConstructArgs) -> DiResult<Self> {
                Ok(Self)
            }
        }

        #[test]
        fn token_resolves_to_the_bound_singleton() {
            let container = Container::new();
            container
                .use_module(&Module::builder().single::<Clock>().bound_to(&*TOKEN).build())
                .unwrap();

            let first = container.resolve_token_as::<Clock>(&TOKEN).unwrap();
            let second = container.resolve_token_as::<Clock>(&TOKEN).unwrap();
            assert!(Arc::ptr_eq(&first, &second));
        }
    }

    // =====================================================================
    // Scenario: scope isolation
    // =====================================================================

    mod isolation {
        use super::*;

        #[derive(Debug)]
        struct Session;
        impl Service for Session {}
        impl Inject for Session {
            fn construct(_: &mut ConstructArgs) -> DiResult<Self> {
                Ok(Self)
            }
        }

        #[test]
        fn scoped_instances_are_per_scope_and_cached_within() {
            let container = Container::new();
            container
                .use_module(&Module::builder().scoped::<Session>().build())
                .unwrap();

            let s1 = container.create_scope(&ScopeModule::empty()).unwrap();
            let s2 = container.create_scope(&ScopeModule::empty()).unwrap();

            let a1 = s1.resolve::<Session>().unwrap();
            let a2 = s1.resolve::<Session>().unwrap();
            let b = s2.resolve::<Session>().unwrap();

            assert!(Arc::ptr_eq(&a1, &a2));
            assert!(!Arc::ptr_eq(&a1, &b));
        }

        #[test]
        fn scoped_resolve_without_scope_is_a_lifetime_violation() {
            let container = Container::new();
            container
                .use_module(&Module::builder().scoped::<Session>().build())
                .unwrap();

            let err = container.resolve::<Session>().unwrap_err();
            assert!(matches!(err, DiError::LifetimeViolation { .. }));
        }
    }

    // =====================================================================
    // Scenario: external override
    // =====================================================================

    mod externals {
        use super::*;

        static PLAYER_TOKEN: Lazy<Token> = Lazy::new(|| create_token("PlayerToken"));

        struct Player {
            name: &'static str,
        }
        impl Service for Player {}
        impl Inject for Player {
            fn construct(_: &mut ConstructArgs) -> DiResult<Self> {
                Ok(Self { name: "default" })
            }
        }

        struct Escort {
            player: Arc<Player>,
        }
        impl Service for Escort {}
        impl Inject for Escort {
            fn metadata() -> ClassMeta {
                ClassMeta::new().token_dependency(0, &*PLAYER_TOKEN)
            }
            fn construct(args: &mut ConstructArgs) -> DiResult<Self> {
                Ok(Self {
                    player: args.dependency()?,
                })
            }
        }

        #[test]
        fn external_wins_over_the_registration() {
            let container = Container::new();
            container
                .use_module(
                    &Module::builder()
                        .single::<Player>()
                        .bound_to(&*PLAYER_TOKEN)
                        .scoped::<Escort>()
                        .build(),
                )
                .unwrap();

            let scope = container.create_scope(&ScopeModule::empty()).unwrap();
            let joined: Arc<Player> = Arc::new(Player { name: "zoe" });
            scope
                .provide_external_arc(Key::from(&*PLAYER_TOKEN), joined.clone())
                .unwrap();

            let escort = scope.resolve::<Escort>().unwrap();
            assert!(Arc::ptr_eq(&escort.player, &joined));
            assert_eq!(escort.player.name, "zoe");
        }

        static GHOST_TOKEN: Lazy<Token> = Lazy::new(|| create_token("GhostToken"));

        #[derive(Debug)]
        struct Haunter {
            ghost: Arc<dyn Service>,
        }
        impl Service for Haunter {}
        impl Inject for Haunter {
            fn metadata() -> ClassMeta {
                ClassMeta::new().token_dependency(0, &*GHOST_TOKEN)
            }
            fn construct(args: &mut ConstructArgs) -> DiResult<Self> {
                Ok(Self {
                    ghost: args.dependency_dyn()?,
                })
            }
        }

        #[test]
        fn declared_externals_satisfy_validation_but_not_resolution() {
            let container = Container::new();
            container
                .use_module(
                    &Module::builder()
                        .scoped::<Haunter>()
                        .expects_external(&*GHOST_TOKEN)
                        .build(),
                )
                .unwrap();
            container.validate().unwrap();

            // Without a provided external the resolve still fails.
            let bare = container.create_scope(&ScopeModule::empty()).unwrap();
            let err = bare.resolve::<Haunter>().unwrap_err();
            assert!(err.to_string().contains("no external was provided"));

            // With one, the dependency flows through.
            let ghost: Arc<Player> = Arc::new(Player { name: "boo" });
            let scope = container
                .create_scope(
                    &ScopeModule::builder()
                        .external_arc(Key::from(&*GHOST_TOKEN), ghost.clone())
                        .build(),
                )
                .unwrap();
            let haunter = scope.resolve::<Haunter>().unwrap();
            assert!(Arc::ptr_eq(
                &haunter.ghost,
                &(ghost as Arc<dyn Service>)
            ));
        }

        #[test]
        fn child_scope_falls_back_to_parent_externals() {
            let container = Container::new();
            container
                .use_module(
                    &Module::builder()
                        .single::<Player>()
                        .bound_to(&*PLAYER_TOKEN)
                        .scoped::<Escort>()
                        .build(),
                )
                .unwrap();

            let parent = container.create_scope(&ScopeModule::empty()).unwrap();
            let joined: Arc<Player> = Arc::new(Player { name: "ada" });
            parent
                .provide_external_arc(Key::from(&*PLAYER_TOKEN), joined.clone())
                .unwrap();

            let child = parent.create_child_scope().unwrap();
            let resolved = child.resolve_token_as::<Player>(&PLAYER_TOKEN).unwrap();
            assert!(Arc::ptr_eq(&resolved, &joined));
        }
    }

    // =====================================================================
    // Scenario: keyed factory
    // =====================================================================

    mod keyed {
        use super::*;

        static WEAPON: Lazy<Token> = Lazy::new(|| create_token("Weapon"));

        struct SwordWeapon;
        impl Service for SwordWeapon {}
        impl Inject for SwordWeapon {
            fn construct(_: &mut ConstructArgs) -> DiResult<Self> {
                Ok(Self)
            }
        }

        struct BowWeapon;
        impl Service for BowWeapon {}
        impl Inject for BowWeapon {
            fn construct(_: &mut ConstructArgs) -> DiResult<Self> {
                Ok(Self)
            }
        }

        fn weapon_container() -> Container {
            let container = Container::new();
            container
                .use_module(
                    &Module::builder()
                        .keyed(
                            &WEAPON,
                            vec![
                                ("Sword", provider::<SwordWeapon>()),
                                ("Bow", provider::<BowWeapon>()),
                            ],
                        )
                        .build(),
                )
                .unwrap();
            container
        }

        #[test]
        fn each_create_is_a_fresh_instance() {
            let container = weapon_container();
            let factory = container.resolve_keyed(&WEAPON).unwrap();

            let first = factory.create("Sword").unwrap();
            let second = factory.create("Sword").unwrap();
            assert!(!Arc::ptr_eq(&first, &second));
            assert!(downcast_service::<SwordWeapon>(first).is_ok());
        }

        #[test]
        fn unknown_key_lists_the_available_keys() {
            let container = weapon_container();
            let factory = container.resolve_keyed(&WEAPON).unwrap();

            let err = factory.create("Axe").unwrap_err();
            let msg = err.to_string();
            assert!(matches!(err, DiError::MissingRegistration { .. }));
            assert!(msg.contains("Sword, Bow"), "message was: {msg}");
        }

        #[test]
        fn factory_from_a_destroyed_scope_fails() {
            let container = weapon_container();
            let scope = container.create_scope(&ScopeModule::empty()).unwrap();
            let factory = scope.resolve_keyed(&WEAPON).unwrap();

            scope.destroy();
            assert!(factory.create("Sword").is_err());
        }

        #[test]
        fn cross_module_key_collision_is_fatal() {
            let container = weapon_container();
            let err = container
                .use_module(
                    &Module::builder()
                        .keyed(&WEAPON, vec![("Sword", provider::<BowWeapon>())])
                        .build(),
                )
                .unwrap_err();
            assert!(matches!(err, DiError::DuplicateRegistration { .. }));
        }
    }

    // =====================================================================
    // Scenario: cycle detection
    // =====================================================================

    mod cycles {
        use super::*;

        #[derive(Debug)]
        struct CycleA;
        impl Service for CycleA {}
        impl Inject for CycleA {
            fn metadata() -> ClassMeta {
                ClassMeta::new().dependency::<CycleB>(0)
            }
            fn construct(args: &mut ConstructArgs) -> DiResult<Self> {
                let _ = args.dependency_dyn()?;
                Ok(Self)
            }
        }

        struct CycleB;
        impl Service for CycleB {}
        impl Inject for CycleB {
            fn metadata() -> ClassMeta {
                ClassMeta::new().dependency::<CycleA>(0)
            }
            fn construct(args: &mut ConstructArgs) -> DiResult<Self> {
                let _ = args.dependency_dyn()?;
                Ok(Self)
            }
        }

        #[test]
        fn two_node_cycle_renders_the_full_chain() {
            let container = Container::new();
            container
                .use_module(&Module::builder().single::<CycleA>().single::<CycleB>().build())
                .unwrap();

            let err = container.resolve::<CycleA>().unwrap_err();
            match &err {
                DiError::CircularDependency { chain } => {
                    assert_eq!(chain.to_string(), "CycleA → CycleB → CycleA");
                }
                other => panic!("expected a cycle, got {other}"),
            }
        }
    }

    // =====================================================================
    // Scenario: tick unregistration on destroy
    // =====================================================================

    mod ticking {
        use super::*;

        static TICKS: AtomicU32 = AtomicU32::new(0);

        struct Mover;
        impl Tickable for Mover {
            fn on_tick(&self, _delta_time: f64) {
                TICKS.fetch_add(1, Ordering::SeqCst);
            }
        }
        impl Service for Mover {
            fn as_tickable(&self) -> Option<&dyn Tickable> {
                Some(self)
            }
        }
        impl Inject for Mover {
            const CAPS: Capabilities = Capabilities::none().with_tick();
            fn construct(_: &mut ConstructArgs) -> DiResult<Self> {
                Ok(Self)
            }
        }

        #[test]
        fn destroyed_scope_receives_no_further_ticks() {
            let driver = ManualTickDriver::new(false);
            let container = Container::with_driver(Arc::new(driver.clone()));
            container
                .use_module(&Module::builder().scoped::<Mover>().build())
                .unwrap();

            let scope = container.create_scope(&ScopeModule::empty()).unwrap();
            let _mover = scope.resolve::<Mover>().unwrap();

            driver.step(0.016);
            let after_first = TICKS.load(Ordering::SeqCst);
            assert_eq!(after_first, 1);

            scope.destroy();
            driver.step(0.016);
            assert_eq!(TICKS.load(Ordering::SeqCst), after_first);
        }
    }

    // =====================================================================
    // Launch semantics
    // =====================================================================

    mod launching {
        use super::*;

        static EVENTS: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());
        static IDLE_BUILT: AtomicU32 = AtomicU32::new(0);
        static EAGER_BUILT: AtomicU32 = AtomicU32::new(0);

        struct EagerOne;
        impl Startable for EagerOne {
            fn on_start(&self) -> DiResult<()> {
                EVENTS.lock().unwrap().push("one");
                Ok(())
            }
        }
        impl Service for EagerOne {
            fn as_startable(&self) -> Option<&dyn Startable> {
                Some(self)
            }
        }
        impl Inject for EagerOne {
            const CAPS: Capabilities = Capabilities::none().with_start();
            fn construct(_: &mut ConstructArgs) -> DiResult<Self> {
                EAGER_BUILT.fetch_add(1, Ordering::SeqCst);
                Ok(Self)
            }
        }

        struct EagerTwo;
        impl Startable for EagerTwo {
            fn on_start(&self) -> DiResult<()> {
                EVENTS.lock().unwrap().push("two");
                Ok(())
            }
        }
        impl Service for EagerTwo {
            fn as_startable(&self) -> Option<&dyn Startable> {
                Some(self)
            }
        }
        impl Inject for EagerTwo {
            const CAPS: Capabilities = Capabilities::none().with_start();
            fn construct(_: &mut ConstructArgs) -> DiResult<Self> {
                Ok(Self)
            }
        }

        struct Idle;
        impl Service for Idle {}
        impl Inject for Idle {
            fn construct(_: &mut ConstructArgs) -> DiResult<Self> {
                IDLE_BUILT.fetch_add(1, Ordering::SeqCst);
                Ok(Self)
            }
        }

        #[test]
        fn launch_starts_in_registration_order_and_skips_startless() {
            let container = Container::new();
            container
                .use_module(
                    &Module::builder()
                        .single::<EagerOne>()
                        .single::<Idle>()
                        .single::<EagerTwo>()
                        .build(),
                )
                .unwrap();

            container.launch().unwrap();
            assert_eq!(*EVENTS.lock().unwrap(), vec!["one", "two"]);
            assert_eq!(IDLE_BUILT.load(Ordering::SeqCst), 0);

            // Launching again must not rebuild cached singletons.
            container.launch().unwrap();
            assert_eq!(EAGER_BUILT.load(Ordering::SeqCst), 1);
        }
    }

    // =====================================================================
    // Multi-registrations
    // =====================================================================

    mod multi {
        use super::*;

        static ARSENAL: Lazy<Token> = Lazy::new(|| create_token("Arsenal"));

        struct Cannon;
        impl Service for Cannon {}
        impl Inject for Cannon {
            fn construct(_: &mut ConstructArgs) -> DiResult<Self> {
                Ok(Self)
            }
        }

        struct Launcher;
        impl Service for Launcher {}
        impl Inject for Launcher {
            fn construct(_: &mut ConstructArgs) -> DiResult<Self> {
                Ok(Self)
            }
        }

        struct Arming {
            weapons: Vec<Arc<dyn Service>>,
        }
        impl Service for Arming {}
        impl Inject for Arming {
            fn metadata() -> ClassMeta {
                ClassMeta::new().token_dependency(0, &*ARSENAL)
            }
            fn construct(args: &mut ConstructArgs) -> DiResult<Self> {
                Ok(Self {
                    weapons: args.many_dyn()?,
                })
            }
        }

        fn arsenal_container() -> Container {
            let container = Container::new();
            container
                .use_module(
                    &Module::builder()
                        .multi(&ARSENAL, vec![provider::<Cannon>(), provider::<Launcher>()])
                        .single::<Arming>()
                        .build(),
                )
                .unwrap();
            container
        }

        #[test]
        fn members_preserve_order_and_cache_as_singletons() {
            let container = arsenal_container();

            let first = container.resolve_all(&ARSENAL).unwrap();
            let second = container.resolve_all(&ARSENAL).unwrap();
            assert_eq!(first.len(), 2);
            assert!(downcast_service::<Cannon>(first[0].clone()).is_ok());
            assert!(downcast_service::<Launcher>(first[1].clone()).is_ok());
            assert!(Arc::ptr_eq(&first[0], &second[0]));
            assert!(Arc::ptr_eq(&first[1], &second[1]));
        }

        #[test]
        fn multi_token_injects_as_a_member_list() {
            let container = arsenal_container();
            let arming = container.resolve::<Arming>().unwrap();
            assert_eq!(arming.weapons.len(), 2);
        }
    }

    // =====================================================================
    // Runtime parameters
    // =====================================================================

    mod runtime_params {
        use super::*;

        #[derive(Debug)]
        struct SpawnRequest {
            level: u32,
            class_name: String,
        }
        impl Service for SpawnRequest {}
        impl Inject for SpawnRequest {
            fn metadata() -> ClassMeta {
                ClassMeta::new().runtime_param(0).runtime_param(1)
            }
            fn construct(args: &mut ConstructArgs) -> DiResult<Self> {
                Ok(Self {
                    level: args.runtime()?,
                    class_name: args.runtime()?,
                })
            }
        }

        #[test]
        fn runtime_arguments_are_consumed_in_parameter_order() {
            let container = Container::new();
            container
                .use_module(&Module::builder().factory::<SpawnRequest>().build())
                .unwrap();

            let request = container
                .resolve_with::<SpawnRequest>(crate::runtime_args![7u32, String::from("archer")])
                .unwrap();
            assert_eq!(request.level, 7);
            assert_eq!(request.class_name, "archer");
        }

        #[test]
        fn missing_runtime_argument_is_a_wrapped_constructor_error() {
            let container = Container::new();
            container
                .use_module(&Module::builder().factory::<SpawnRequest>().build())
                .unwrap();

            let err = container.resolve::<SpawnRequest>().unwrap_err();
            assert!(matches!(err, DiError::ConstructorError { .. }));
            assert!(err.to_string().contains("runtime parameter"));
        }
    }

    // =====================================================================
    // Validation
    // =====================================================================

    mod validation {
        use super::*;

        struct MissingDepOne;
        struct MissingDepTwo;

        struct NeedsOne;
        impl Service for NeedsOne {}
        impl Inject for NeedsOne {
            fn metadata() -> ClassMeta {
                ClassMeta::new().dependency::<MissingDepOne>(0)
            }
            fn construct(args: &mut ConstructArgs) -> DiResult<Self> {
                let _ = args.dependency_dyn()?;
                Ok(Self)
            }
        }

        struct NeedsTwo;
        impl Service for NeedsTwo {}
        impl Inject for NeedsTwo {
            fn metadata() -> ClassMeta {
                ClassMeta::new().dependency::<MissingDepTwo>(0)
            }
            fn construct(args: &mut ConstructArgs) -> DiResult<Self> {
                let _ = args.dependency_dyn()?;
                Ok(Self)
            }
        }

        #[test]
        fn problems_accumulate_into_one_numbered_report() {
            let container = Container::new();
            container
                .use_module(&Module::builder().single::<NeedsOne>().single::<NeedsTwo>().build())
                .unwrap();

            let err = container.validate().unwrap_err();
            match &err {
                DiError::ValidationFailed { problems } => assert_eq!(problems.len(), 2),
                other => panic!("expected a validation report, got {other}"),
            }
            let msg = err.to_string();
            assert!(msg.contains("1."));
            assert!(msg.contains("2."));
        }

        #[test]
        fn successful_validation_is_idempotent_until_the_next_ingest() {
            let container = Container::new();
            container.validate().unwrap();
            container.validate().unwrap();

            // A new (broken) module resets the validated bit.
            container
                .use_module(&Module::builder().single::<NeedsOne>().build())
                .unwrap();
            assert!(container.validate().is_err());
        }
    }

    // =====================================================================
    // Warmup rule
    // =====================================================================

    mod warming {
        use super::*;

        static WARMED: AtomicU32 = AtomicU32::new(0);

        struct HotCache;
        impl Warmup for HotCache {
            fn on_warmup(&self) -> DiResult<()> {
                WARMED.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
        impl Service for HotCache {
            fn as_warmup(&self) -> Option<&dyn Warmup> {
                Some(self)
            }
        }
        impl Inject for HotCache {
            const CAPS: Capabilities = Capabilities::none().with_warmup();
            fn construct(_: &mut ConstructArgs) -> DiResult<Self> {
                Ok(Self)
            }
        }

        // Capability flags intentionally left empty: validation cannot see
        // the warmup, so the violation surfaces at resolve time.
        #[derive(Debug)]
        struct SneakyCache;
        impl Warmup for SneakyCache {
            fn on_warmup(&self) -> DiResult<()> {
                Ok(())
            }
        }
        impl Service for SneakyCache {
            fn as_warmup(&self) -> Option<&dyn Warmup> {
                Some(self)
            }
        }
        impl Inject for SneakyCache {
            fn construct(_: &mut ConstructArgs) -> DiResult<Self> {
                Ok(Self)
            }
        }

        #[test]
        fn singleton_warmup_runs_once_after_construction() {
            let container = Container::new();
            container
                .use_module(&Module::builder().single::<HotCache>().build())
                .unwrap();

            let _ = container.resolve::<HotCache>().unwrap();
            let _ = container.resolve::<HotCache>().unwrap();
            assert_eq!(WARMED.load(Ordering::SeqCst), 1);
        }

        #[test]
        fn declared_warmup_on_a_scoped_registration_fails_validation() {
            let container = Container::new();
            container
                .use_module(&Module::builder().scoped::<HotCache>().build())
                .unwrap();
            let err = container.validate().unwrap_err();
            assert!(matches!(err, DiError::ValidationFailed { .. }));
        }

        #[test]
        fn undeclared_warmup_is_still_caught_at_resolve_time() {
            let container = Container::new();
            container
                .use_module(&Module::builder().scoped::<SneakyCache>().build())
                .unwrap();
            // SneakyCache declares no capability flags, so validation passes.
            container.validate().unwrap();

            let scope = container.create_scope(&ScopeModule::empty()).unwrap();
            let err = scope.resolve::<SneakyCache>().unwrap_err();
            assert!(matches!(err, DiError::LifetimeViolation { .. }));
        }
    }

    // =====================================================================
    // Destruction ordering & singleton survival
    // =====================================================================

    mod teardown {
        use super::*;

        static ORDER: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

        struct ParentGuard;
        impl Destroyable for ParentGuard {
            fn on_destroy(&self) -> DiResult<()> {
                ORDER.lock().unwrap().push("parent");
                Ok(())
            }
        }
        impl Service for ParentGuard {
            fn as_destroyable(&self) -> Option<&dyn Destroyable> {
                Some(self)
            }
        }
        impl Inject for ParentGuard {
            const CAPS: Capabilities = Capabilities::none().with_destroy();
            fn construct(_: &mut ConstructArgs) -> DiResult<Self> {
                Ok(Self)
            }
        }

        struct ChildGuard;
        impl Destroyable for ChildGuard {
            fn on_destroy(&self) -> DiResult<()> {
                ORDER.lock().unwrap().push("child");
                Ok(())
            }
        }
        impl Service for ChildGuard {
            fn as_destroyable(&self) -> Option<&dyn Destroyable> {
                Some(self)
            }
        }
        impl Inject for ChildGuard {
            const CAPS: Capabilities = Capabilities::none().with_destroy();
            fn construct(_: &mut ConstructArgs) -> DiResult<Self> {
                Ok(Self)
            }
        }

        struct Persistent;
        impl Service for Persistent {}
        impl Inject for Persistent {
            fn construct(_: &mut ConstructArgs) -> DiResult<Self> {
                Ok(Self)
            }
        }

        #[test]
        fn children_are_destroyed_before_parent_destroyables_run() {
            let container = Container::new();
            container
                .use_module(
                    &Module::builder()
                        .scoped::<ParentGuard>()
                        .scoped::<ChildGuard>()
                        .build(),
                )
                .unwrap();

            let parent = container.create_scope(&ScopeModule::empty()).unwrap();
            let _ = parent.resolve::<ParentGuard>().unwrap();
            let child = parent.create_child_scope().unwrap();
            let _ = child.resolve::<ChildGuard>().unwrap();

            parent.destroy();
            assert_eq!(*ORDER.lock().unwrap(), vec!["child", "parent"]);

            // Idempotent: a second destroy runs nothing again.
            parent.destroy();
            assert_eq!(ORDER.lock().unwrap().len(), 2);
        }

        #[test]
        fn destroying_scopes_never_evicts_singletons() {
            let container = Container::new();
            container
                .use_module(&Module::builder().single::<Persistent>().build())
                .unwrap();

            let before = container.resolve::<Persistent>().unwrap();
            let scope = container.create_scope(&ScopeModule::empty()).unwrap();
            scope.destroy();
            let after = container.resolve::<Persistent>().unwrap();
            assert!(Arc::ptr_eq(&before, &after));
        }

        #[test]
        fn destroyed_scope_rejects_every_operation() {
            let container = Container::new();
            let scope = container.create_scope(&ScopeModule::empty()).unwrap();
            scope.destroy();

            assert!(scope.is_destroyed());
            assert!(scope.resolve::<Persistent>().is_err());
            assert!(scope.create_child_scope().is_err());
            assert!(scope.provide_external(Key::of::<Persistent>(), Persistent).is_err());
        }
    }

    // =====================================================================
    // Tokens & reflection isolation
    // =====================================================================

    mod tokens {
        use super::*;

        #[test]
        fn foreign_tokens_are_rejected() {
            let foreign = create_token("Foreign");
            let container = Container::with_reflection(
                Reflection::new(),
                Arc::new(ManualTickDriver::new(false)),
            );

            let err = container.resolve_token(&foreign).unwrap_err();
            assert!(matches!(err, DiError::InvalidToken { .. }));
        }

        #[test]
        fn missing_registration_carries_the_key() {
            let token = create_token("Nowhere");
            let container = Container::new();
            let err = container.resolve_token(&token).unwrap_err();
            assert!(matches!(err, DiError::MissingRegistration { .. }));
            assert!(err.to_string().contains("Nowhere"));
        }
    }

    // =====================================================================
    // Scope roots, start_all and debug snapshots
    // =====================================================================

    mod scope_graphs {
        use super::*;

        static STARTED: AtomicU32 = AtomicU32::new(0);

        struct Brain;
        impl Startable for Brain {
            fn on_start(&self) -> DiResult<()> {
                STARTED.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
        impl Service for Brain {
            fn as_startable(&self) -> Option<&dyn Startable> {
                Some(self)
            }
        }
        impl Inject for Brain {
            const CAPS: Capabilities = Capabilities::none().with_start();
            fn construct(_: &mut ConstructArgs) -> DiResult<Self> {
                Ok(Self)
            }
        }

        #[test]
        fn scope_root_is_resolved_and_started_on_creation() {
            let container = Container::new();
            container
                .use_module(&Module::builder().scoped::<Brain>().build())
                .unwrap();

            let scope = container
                .create_scope(&ScopeModule::builder().root::<Brain>().build())
                .unwrap();
            assert_eq!(STARTED.load(Ordering::SeqCst), 1);

            // The root is cached like any scoped instance.
            let again = scope.resolve::<Brain>().unwrap();
            let twice = scope.resolve::<Brain>().unwrap();
            assert!(Arc::ptr_eq(&again, &twice));
        }

        #[test]
        fn debug_snapshot_reports_the_tree_shape() {
            let container = Container::new();
            container
                .use_module(&Module::builder().scoped::<Brain>().build())
                .unwrap();

            let parent = container.create_scope(&ScopeModule::empty()).unwrap();
            let child = parent.create_child_scope_labeled("minion").unwrap();
            let _ = child.resolve::<Brain>().unwrap();

            let parent_debug = parent.debug();
            assert_eq!(parent_debug.child_scopes, 1);
            assert_eq!(parent_debug.total_services, 1);
            assert!(parent_debug.parent_scope_id.is_none());

            let child_debug = child.debug();
            assert_eq!(child_debug.parent_scope_id, Some(parent.id()));
            assert_eq!(child_debug.label.as_deref(), Some("minion"));
            assert_eq!(child_debug.services.len(), 1);
        }
    }

    // =====================================================================
    // Dispatcher invariants across the container
    // =====================================================================

    mod subscriptions {
        use super::*;

        struct Spinner;
        impl Tickable for Spinner {
            fn on_tick(&self, _delta_time: f64) {}
        }
        impl RenderTickable for Spinner {
            fn on_render_tick(&self, _delta_time: f64) {}
        }
        impl Service for Spinner {
            fn as_tickable(&self) -> Option<&dyn Tickable> {
                Some(self)
            }
            fn as_render_tickable(&self) -> Option<&dyn RenderTickable> {
                Some(self)
            }
        }
        impl Inject for Spinner {
            const CAPS: Capabilities = Capabilities::none().with_tick().with_render_tick();
            fn construct(_: &mut ConstructArgs) -> DiResult<Self> {
                Ok(Self)
            }
        }

        #[test]
        fn connection_count_is_bounded_by_signal_count() {
            let driver = ManualTickDriver::new(true);
            let container = Container::with_driver(Arc::new(driver.clone()));
            container
                .use_module(&Module::builder().scoped::<Spinner>().build())
                .unwrap();

            for _ in 0..8 {
                let scope = container.create_scope(&ScopeModule::empty()).unwrap();
                let _ = scope.resolve::<Spinner>().unwrap();
            }

            assert_eq!(driver.connection_count(), 2);
            let info = container.tick_dispatcher().debug_info();
            assert_eq!(info.tickables, 8);
            assert_eq!(info.render_tickables, 8);
            assert_eq!(info.connections, 2);
        }
    }
}
