//! The tick dispatcher: one shared subscriber to the host's frame signals
//!
//! The host runtime delivers two periodic signals: a logic/physics tick and,
//! on rendering hosts only, a pre-render tick. The dispatcher owns at most
//! one connection per signal regardless of how many instances tick, and
//! fans each frame out to its subscriber lists. Scopes register lifecycle
//! instances here and unregister them before destruction so no frame
//! callback touches half-destroyed state.

use crate::diagnostics::TickDebugInfo;
use crate::service::Service;
use parking_lot::Mutex;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

#[cfg(feature = "tracing")]
use tracing::{debug, error};

/// A frame callback taking the delta time in seconds.
pub type TickFn = Box<dyn Fn(f64) + Send + Sync>;

/// Host-runtime abstraction over the two periodic signals.
///
/// `connect_render` is only invoked after `supports_render` returned true;
/// headless hosts never see it.
pub trait TickDriver: Send + Sync {
    fn connect_logic(&self, callback: TickFn) -> DriverHandle;
    fn connect_render(&self, callback: TickFn) -> DriverHandle;
    fn supports_render(&self) -> bool;
}

/// Handle over one live signal connection; disconnects on drop.
pub struct DriverHandle {
    disconnect: Option<Box<dyn FnOnce() + Send>>,
}

impl DriverHandle {
    /// Wrap a disconnect action.
    #[inline]
    pub fn new(disconnect: impl FnOnce() + Send + 'static) -> Self {
        Self {
            disconnect: Some(Box::new(disconnect)),
        }
    }

    /// Disconnect explicitly.
    #[inline]
    pub fn disconnect(mut self) {
        if let Some(f) = self.disconnect.take() {
            f();
        }
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        if let Some(f) = self.disconnect.take() {
            f();
        }
    }
}

// =========================================================================
// Manual driver
// =========================================================================

type SignalSlots = Vec<(u64, Arc<TickFn>)>;

/// A hand-stepped [`TickDriver`] for tests, demos and headless hosts.
///
/// ```rust
/// use marionette_di::ManualTickDriver;
///
/// let driver = ManualTickDriver::new(true);
/// driver.step(1.0 / 60.0);
/// driver.step_render(1.0 / 60.0);
/// assert_eq!(driver.connection_count(), 0);
/// ```
#[derive(Clone)]
pub struct ManualTickDriver {
    inner: Arc<ManualDriverInner>,
}

struct ManualDriverInner {
    logic: Mutex<SignalSlots>,
    render: Mutex<SignalSlots>,
    next_id: AtomicU64,
    rendering: bool,
}

impl ManualTickDriver {
    /// `rendering` controls whether the render signal exists at all.
    pub fn new(rendering: bool) -> Self {
        Self {
            inner: Arc::new(ManualDriverInner {
                logic: Mutex::new(Vec::new()),
                render: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                rendering,
            }),
        }
    }

    /// Fire the logic signal once.
    pub fn step(&self, delta_time: f64) {
        for callback in Self::snapshot(&self.inner.logic) {
            (*callback)(delta_time);
        }
    }

    /// Fire the render signal once. A no-op on non-rendering drivers.
    pub fn step_render(&self, delta_time: f64) {
        for callback in Self::snapshot(&self.inner.render) {
            (*callback)(delta_time);
        }
    }

    // The lock is released before any callback runs, so a callback may
    // connect or disconnect without deadlocking the step.
    fn snapshot(slots: &Mutex<SignalSlots>) -> Vec<Arc<TickFn>> {
        slots.lock().iter().map(|(_, f)| Arc::clone(f)).collect()
    }

    /// Live connections across both signals.
    pub fn connection_count(&self) -> usize {
        self.inner.logic.lock().len() + self.inner.render.lock().len()
    }

    fn connect(&self, is_logic: bool, callback: TickFn) -> DriverHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let slots = if is_logic {
            &self.inner.logic
        } else {
            &self.inner.render
        };
        slots.lock().push((id, Arc::new(callback)));
        let inner = Arc::clone(&self.inner);
        DriverHandle::new(move || {
            let slots = if is_logic { &inner.logic } else { &inner.render };
            slots.lock().retain(|(slot_id, _)| *slot_id != id);
        })
    }
}

impl TickDriver for ManualTickDriver {
    fn connect_logic(&self, callback: TickFn) -> DriverHandle {
        self.connect(true, callback)
    }

    fn connect_render(&self, callback: TickFn) -> DriverHandle {
        self.connect(false, callback)
    }

    fn supports_render(&self) -> bool {
        self.inner.rendering
    }
}

// =========================================================================
// Dispatcher
// =========================================================================

/// The single shared fan-out point between the host's frame signals and all
/// ticking instances.
///
/// Cloning is cheap; clones share the same subscriber lists and
/// connections.
#[derive(Clone)]
pub struct TickDispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    driver: Arc<dyn TickDriver>,
    tickables: Mutex<Vec<Arc<dyn Service>>>,
    fixed_tickables: Mutex<Vec<Arc<dyn Service>>>,
    render_tickables: Mutex<Vec<Arc<dyn Service>>>,
    paused: AtomicBool,
    logic_connection: Mutex<Option<DriverHandle>>,
    render_connection: Mutex<Option<DriverHandle>>,
    logic_ticks: AtomicU64,
    render_ticks: AtomicU64,
}

impl TickDispatcher {
    pub fn new(driver: Arc<dyn TickDriver>) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                driver,
                tickables: Mutex::new(Vec::new()),
                fixed_tickables: Mutex::new(Vec::new()),
                render_tickables: Mutex::new(Vec::new()),
                paused: AtomicBool::new(false),
                logic_connection: Mutex::new(None),
                render_connection: Mutex::new(None),
                logic_ticks: AtomicU64::new(0),
                render_ticks: AtomicU64::new(0),
            }),
        }
    }

    // =====================================================================
    // Registration
    // =====================================================================

    /// Subscribe an instance to the logic tick.
    pub fn register_tickable(&self, instance: Arc<dyn Service>) {
        self.inner.tickables.lock().push(instance);
        self.ensure_logic_connection();
    }

    /// Subscribe an instance to the fixed tick (logic signal, second pass).
    pub fn register_fixed_tickable(&self, instance: Arc<dyn Service>) {
        self.inner.fixed_tickables.lock().push(instance);
        self.ensure_logic_connection();
    }

    /// Subscribe an instance to the pre-render tick. On non-rendering hosts
    /// the instance is listed but never called.
    pub fn register_render_tickable(&self, instance: Arc<dyn Service>) {
        self.inner.render_tickables.lock().push(instance);
        self.ensure_render_connection();
    }

    /// Remove a logic-tick subscriber. Unordered removal: the last entry is
    /// swapped into the hole, so dispatch order across frames is not stable.
    pub fn unregister_tickable(&self, instance: &Arc<dyn Service>) {
        Self::swap_remove(&self.inner.tickables, instance);
    }

    pub fn unregister_fixed_tickable(&self, instance: &Arc<dyn Service>) {
        Self::swap_remove(&self.inner.fixed_tickables, instance);
    }

    pub fn unregister_render_tickable(&self, instance: &Arc<dyn Service>) {
        Self::swap_remove(&self.inner.render_tickables, instance);
    }

    fn swap_remove(list: &Mutex<Vec<Arc<dyn Service>>>, instance: &Arc<dyn Service>) {
        let mut list = list.lock();
        if let Some(index) = list.iter().position(|entry| Arc::ptr_eq(entry, instance)) {
            list.swap_remove(index);
        }
    }

    // =====================================================================
    // Pause & teardown
    // =====================================================================

    /// Suppress dispatch while keeping the host connections live.
    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::SeqCst);

        #[cfg(feature = "tracing")]
        debug!("Tick dispatcher paused");
    }

    /// Resume dispatch.
    pub fn resume(&self) {
        self.inner.paused.store(false, Ordering::SeqCst);

        #[cfg(feature = "tracing")]
        debug!("Tick dispatcher resumed");
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    /// Disconnect from the host signals and clear all subscriber lists.
    pub fn destroy(&self) {
        self.inner.logic_connection.lock().take();
        self.inner.render_connection.lock().take();
        self.inner.tickables.lock().clear();
        self.inner.fixed_tickables.lock().clear();
        self.inner.render_tickables.lock().clear();

        #[cfg(feature = "tracing")]
        debug!("Tick dispatcher destroyed");
    }

    /// Snapshot counts, pause state and frame counters.
    pub fn debug_info(&self) -> TickDebugInfo {
        let connections = self.inner.logic_connection.lock().is_some() as usize
            + self.inner.render_connection.lock().is_some() as usize;
        TickDebugInfo {
            tickables: self.inner.tickables.lock().len(),
            fixed_tickables: self.inner.fixed_tickables.lock().len(),
            render_tickables: self.inner.render_tickables.lock().len(),
            paused: self.is_paused(),
            logic_ticks: self.inner.logic_ticks.load(Ordering::Relaxed),
            render_ticks: self.inner.render_ticks.load(Ordering::Relaxed),
            connections,
        }
    }

    // =====================================================================
    // Connections & dispatch
    // =====================================================================

    fn ensure_logic_connection(&self) {
        let mut connection = self.inner.logic_connection.lock();
        if connection.is_none() {
            let weak = Arc::downgrade(&self.inner);
            *connection = Some(self.inner.driver.connect_logic(Box::new(move |delta_time| {
                DispatcherInner::dispatch_logic(&weak, delta_time);
            })));

            #[cfg(feature = "tracing")]
            debug!("Connected to logic tick signal");
        }
    }

    fn ensure_render_connection(&self) {
        if !self.inner.driver.supports_render() {
            return;
        }
        let mut connection = self.inner.render_connection.lock();
        if connection.is_none() {
            let weak = Arc::downgrade(&self.inner);
            *connection = Some(self.inner.driver.connect_render(Box::new(move |delta_time| {
                DispatcherInner::dispatch_render(&weak, delta_time);
            })));

            #[cfg(feature = "tracing")]
            debug!("Connected to render tick signal");
        }
    }
}

impl DispatcherInner {
    fn dispatch_logic(weak: &Weak<DispatcherInner>, delta_time: f64) {
        let Some(inner) = weak.upgrade() else { return };
        if inner.paused.load(Ordering::SeqCst) {
            return;
        }
        inner.logic_ticks.fetch_add(1, Ordering::Relaxed);

        // Snapshots keep the lists unlocked while user code runs, so a tick
        // handler may register or unregister without deadlocking.
        let tickables = inner.tickables.lock().clone();
        for instance in &tickables {
            Self::trap(|| {
                if let Some(tickable) = instance.as_tickable() {
                    tickable.on_tick(delta_time);
                }
            });
        }

        let fixed = inner.fixed_tickables.lock().clone();
        for instance in &fixed {
            Self::trap(|| {
                if let Some(tickable) = instance.as_fixed_tickable() {
                    tickable.on_fixed_tick(delta_time);
                }
            });
        }
    }

    fn dispatch_render(weak: &Weak<DispatcherInner>, delta_time: f64) {
        let Some(inner) = weak.upgrade() else { return };
        if inner.paused.load(Ordering::SeqCst) {
            return;
        }
        inner.render_ticks.fetch_add(1, Ordering::Relaxed);

        let render = inner.render_tickables.lock().clone();
        for instance in &render {
            Self::trap(|| {
                if let Some(tickable) = instance.as_render_tickable() {
                    tickable.on_render_tick(delta_time);
                }
            });
        }
    }

    /// Trap a panicking subscriber so one bad handler cannot stall the frame
    /// for everyone else.
    fn trap(callback: impl FnOnce()) {
        if catch_unwind(AssertUnwindSafe(callback)).is_err() {
            #[cfg(feature = "tracing")]
            error!("A tick subscriber panicked; continuing with the remaining subscribers");
        }
    }
}

impl std::fmt::Debug for TickDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let info = self.debug_info();
        f.debug_struct("TickDispatcher")
            .field("tickables", &info.tickables)
            .field("fixed_tickables", &info.fixed_tickables)
            .field("render_tickables", &info.render_tickables)
            .field("paused", &info.paused)
            .field("connections", &info.connections)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{FixedTickable, RenderTickable, Tickable};
    use std::sync::atomic::AtomicU32;

    #[derive(Default)]
    struct Counter {
        ticks: AtomicU32,
        fixed: AtomicU32,
        renders: AtomicU32,
    }

    impl Tickable for Counter {
        fn on_tick(&self, _delta_time: f64) {
            self.ticks.fetch_add(1, Ordering::SeqCst);
        }
    }
    impl FixedTickable for Counter {
        fn on_fixed_tick(&self, _delta_time: f64) {
            self.fixed.fetch_add(1, Ordering::SeqCst);
        }
    }
    impl RenderTickable for Counter {
        fn on_render_tick(&self, _delta_time: f64) {
            self.renders.fetch_add(1, Ordering::SeqCst);
        }
    }
    impl Service for Counter {
        fn as_tickable(&self) -> Option<&dyn Tickable> {
            Some(self)
        }
        fn as_fixed_tickable(&self) -> Option<&dyn FixedTickable> {
            Some(self)
        }
        fn as_render_tickable(&self) -> Option<&dyn RenderTickable> {
            Some(self)
        }
    }

    struct Panicking;
    impl Tickable for Panicking {
        fn on_tick(&self, _delta_time: f64) {
            panic!("boom");
        }
    }
    impl Service for Panicking {
        fn as_tickable(&self) -> Option<&dyn Tickable> {
            Some(self)
        }
    }

    fn setup(rendering: bool) -> (ManualTickDriver, TickDispatcher) {
        let driver = ManualTickDriver::new(rendering);
        let dispatcher = TickDispatcher::new(Arc::new(driver.clone()));
        (driver, dispatcher)
    }

    #[test]
    fn one_connection_amortised_over_many_tickables() {
        let (driver, dispatcher) = setup(false);
        for _ in 0..32 {
            dispatcher.register_tickable(Arc::new(Counter::default()));
        }
        assert_eq!(driver.connection_count(), 1);
        assert_eq!(dispatcher.debug_info().connections, 1);
    }

    #[test]
    fn render_connection_skipped_on_headless_hosts() {
        let (driver, dispatcher) = setup(false);
        dispatcher.register_render_tickable(Arc::new(Counter::default()));
        assert_eq!(driver.connection_count(), 0);
    }

    #[test]
    fn logic_signal_reaches_tickables_then_fixed() {
        let (driver, dispatcher) = setup(false);
        let counter = Arc::new(Counter::default());
        let shared: Arc<dyn Service> = counter.clone();
        dispatcher.register_tickable(shared.clone());
        dispatcher.register_fixed_tickable(shared);

        driver.step(0.016);
        assert_eq!(counter.ticks.load(Ordering::SeqCst), 1);
        assert_eq!(counter.fixed.load(Ordering::SeqCst), 1);
        assert_eq!(counter.renders.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn render_signal_reaches_render_tickables() {
        let (driver, dispatcher) = setup(true);
        let counter = Arc::new(Counter::default());
        dispatcher.register_render_tickable(counter.clone());

        driver.step_render(0.008);
        assert_eq!(counter.renders.load(Ordering::SeqCst), 1);
        assert_eq!(driver.connection_count(), 1);
    }

    #[test]
    fn paused_dispatcher_keeps_connections_but_skips_callbacks() {
        let (driver, dispatcher) = setup(false);
        let counter = Arc::new(Counter::default());
        dispatcher.register_tickable(counter.clone());

        dispatcher.pause();
        driver.step(0.016);
        assert_eq!(counter.ticks.load(Ordering::SeqCst), 0);
        assert_eq!(driver.connection_count(), 1);

        dispatcher.resume();
        driver.step(0.016);
        assert_eq!(counter.ticks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unregistered_instance_receives_no_further_ticks() {
        let (driver, dispatcher) = setup(false);
        let counter = Arc::new(Counter::default());
        let shared: Arc<dyn Service> = counter.clone();
        dispatcher.register_tickable(shared.clone());

        driver.step(0.016);
        dispatcher.unregister_tickable(&shared);
        driver.step(0.016);
        assert_eq!(counter.ticks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_subscriber_does_not_starve_the_rest() {
        let (driver, dispatcher) = setup(false);
        let counter = Arc::new(Counter::default());
        dispatcher.register_tickable(Arc::new(Panicking));
        dispatcher.register_tickable(counter.clone());

        driver.step(0.016);
        assert_eq!(counter.ticks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn destroy_disconnects_and_clears() {
        let (driver, dispatcher) = setup(true);
        dispatcher.register_tickable(Arc::new(Counter::default()));
        dispatcher.register_render_tickable(Arc::new(Counter::default()));
        assert_eq!(driver.connection_count(), 2);

        dispatcher.destroy();
        assert_eq!(driver.connection_count(), 0);
        let info = dispatcher.debug_info();
        assert_eq!(info.tickables, 0);
        assert_eq!(info.connections, 0);
    }

    #[test]
    fn tick_counters_advance_per_dispatched_frame() {
        let (driver, dispatcher) = setup(false);
        dispatcher.register_tickable(Arc::new(Counter::default()));
        driver.step(0.016);
        driver.step(0.016);
        assert_eq!(dispatcher.debug_info().logic_ticks, 2);
    }
}
