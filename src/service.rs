//! Service traits: lifetimes, lifecycle capabilities and the umbrella trait
//!
//! Every instance the container manages is an `Arc<dyn Service>`. The
//! [`Service`] trait is object-safe and exposes one accessor per lifecycle
//! capability; an accessor returning `Some` is how the container discovers
//! that an instance wants to be started, destroyed or ticked. The
//! `#[derive(Service)]` macro (feature `derive`) writes the accessors from a
//! `#[service(...)]` attribute so they cannot drift from [`Capabilities`].

use crate::DiResult;
use std::any::Any;
use std::sync::Arc;

/// How long a resolved instance lives and where it is cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Lifetime {
    /// One instance per container, cached until process teardown.
    #[default]
    Singleton,

    /// One instance per scope node, cached until the scope is destroyed.
    Scoped,

    /// Fresh instance on every resolve; never cached, never tracked.
    Factory,
}

impl std::fmt::Display for Lifetime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lifetime::Singleton => write!(f, "singleton"),
            Lifetime::Scoped => write!(f, "scoped"),
            Lifetime::Factory => write!(f, "factory"),
        }
    }
}

// =========================================================================
// Capability traits
// =========================================================================

/// Started once when its container launches or its scope finishes building.
pub trait Startable: Send + Sync {
    fn on_start(&self) -> DiResult<()>;
}

/// Warmed up immediately after construction. Only legal on singletons;
/// any other lifetime fails with a lifetime violation.
pub trait Warmup: Send + Sync {
    fn on_warmup(&self) -> DiResult<()>;
}

/// Torn down when the owning scope is destroyed. Failures are logged and
/// never abort the destruction pass.
pub trait Destroyable: Send + Sync {
    fn on_destroy(&self) -> DiResult<()>;
}

/// Receives the logic/physics tick with the frame delta time.
pub trait Tickable: Send + Sync {
    fn on_tick(&self, delta_time: f64);
}

/// Receives the logic signal after all plain tickables, same delta time.
pub trait FixedTickable: Send + Sync {
    fn on_fixed_tick(&self, delta_time: f64);
}

/// Receives the pre-render tick. Only delivered on rendering hosts.
pub trait RenderTickable: Send + Sync {
    fn on_render_tick(&self, delta_time: f64);
}

// =========================================================================
// Capability flags
// =========================================================================

/// Static mirror of the [`Service`] accessors, consumed on the paths that
/// run before any instance exists: the launch pre-instantiation filter and
/// validation. Declared on [`Inject::CAPS`](crate::Inject::CAPS).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub start: bool,
    pub warmup: bool,
    pub destroy: bool,
    pub tick: bool,
    pub fixed_tick: bool,
    pub render_tick: bool,
}

impl Capabilities {
    /// No capabilities.
    #[inline]
    pub const fn none() -> Self {
        Self {
            start: false,
            warmup: false,
            destroy: false,
            tick: false,
            fixed_tick: false,
            render_tick: false,
        }
    }

    #[inline]
    pub const fn with_start(mut self) -> Self {
        self.start = true;
        self
    }

    #[inline]
    pub const fn with_warmup(mut self) -> Self {
        self.warmup = true;
        self
    }

    #[inline]
    pub const fn with_destroy(mut self) -> Self {
        self.destroy = true;
        self
    }

    #[inline]
    pub const fn with_tick(mut self) -> Self {
        self.tick = true;
        self
    }

    #[inline]
    pub const fn with_fixed_tick(mut self) -> Self {
        self.fixed_tick = true;
        self
    }

    #[inline]
    pub const fn with_render_tick(mut self) -> Self {
        self.render_tick = true;
        self
    }
}

// =========================================================================
// Umbrella trait
// =========================================================================

/// The object-safe umbrella trait every managed instance implements.
///
/// All accessors default to `None`; a plain service is one line:
///
/// ```rust
/// use marionette_di::Service;
///
/// struct Config { max_players: u32 }
/// impl Service for Config {}
/// ```
///
/// A ticking, destroyable service overrides the matching accessors (or
/// derives them with `#[derive(Service)]` and `#[service(tick, destroy)]`):
///
/// ```rust
/// use marionette_di::{Destroyable, DiResult, Service, Tickable};
///
/// struct Mover;
///
/// impl Tickable for Mover {
///     fn on_tick(&self, _delta_time: f64) {}
/// }
/// impl Destroyable for Mover {
///     fn on_destroy(&self) -> DiResult<()> { Ok(()) }
/// }
/// impl Service for Mover {
///     fn as_tickable(&self) -> Option<&dyn Tickable> { Some(self) }
///     fn as_destroyable(&self) -> Option<&dyn Destroyable> { Some(self) }
/// }
/// ```
pub trait Service: Any + Send + Sync {
    /// Short name of the concrete implementing type, for diagnostics.
    fn type_name(&self) -> &'static str {
        crate::key::short_type_name::<Self>()
    }

    fn as_startable(&self) -> Option<&dyn Startable> {
        None
    }

    fn as_warmup(&self) -> Option<&dyn Warmup> {
        None
    }

    fn as_destroyable(&self) -> Option<&dyn Destroyable> {
        None
    }

    fn as_tickable(&self) -> Option<&dyn Tickable> {
        None
    }

    fn as_fixed_tickable(&self) -> Option<&dyn FixedTickable> {
        None
    }

    fn as_render_tickable(&self) -> Option<&dyn RenderTickable> {
        None
    }
}

impl std::fmt::Debug for dyn Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(self.type_name()).finish()
    }
}

/// Checked downcast of a shared service instance to its concrete type.
///
/// Returns the original `Arc` unchanged on mismatch so callers can keep it.
pub fn downcast_service<T: Service>(instance: Arc<dyn Service>) -> Result<Arc<T>, Arc<dyn Service>> {
    let any: Arc<dyn Any + Send + Sync> = instance.clone();
    match any.downcast::<T>() {
        Ok(typed) => Ok(typed),
        Err(_) => Err(instance),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain(u32);
    impl Service for Plain {}

    #[derive(Debug)]
    struct Ticking;
    impl Tickable for Ticking {
        fn on_tick(&self, _delta_time: f64) {}
    }
    impl Service for Ticking {
        fn as_tickable(&self) -> Option<&dyn Tickable> {
            Some(self)
        }
    }

    #[test]
    fn accessors_default_to_none() {
        let plain = Plain(7);
        assert!(plain.as_startable().is_none());
        assert!(plain.as_tickable().is_none());
        assert!(plain.as_destroyable().is_none());
    }

    #[test]
    fn overridden_accessor_returns_instance() {
        let ticking = Ticking;
        assert!(ticking.as_tickable().is_some());
        assert!(ticking.as_render_tickable().is_none());
    }

    #[test]
    fn downcast_roundtrip() {
        let shared: Arc<dyn Service> = Arc::new(Plain(42));
        let typed = downcast_service::<Plain>(shared).unwrap();
        assert_eq!(typed.0, 42);
    }

    #[test]
    fn downcast_mismatch_returns_original() {
        let shared: Arc<dyn Service> = Arc::new(Plain(1));
        let err = downcast_service::<Ticking>(shared).unwrap_err();
        assert!(downcast_service::<Plain>(err).is_ok());
    }

    #[test]
    fn type_name_reports_the_concrete_type_through_dyn() {
        let shared: Arc<dyn Service> = Arc::new(Plain(1));
        assert_eq!(shared.type_name(), "Plain");
    }

    #[test]
    fn capability_flags_compose_in_const_context() {
        const CAPS: Capabilities = Capabilities::none().with_start().with_tick();
        assert!(CAPS.start);
        assert!(CAPS.tick);
        assert!(!CAPS.destroy);
    }
}
