//! Scope tree: per-entity instance caches with independent destruction
//!
//! A scope is one node in a tree rooted at the container. Each node caches
//! scoped instances, holds externally provided values, and tracks which of
//! its instances want destruction or ticks. Destroying a scope unhooks its
//! tickables from the dispatcher first, then destroys children, then runs
//! the node's own destroyables.

use crate::container::ContainerInner;
use crate::diagnostics::ScopeDebug;
use crate::error::{DiError, DiResult};
use crate::inject::RuntimeArgs;
use crate::key::Key;
use crate::service::{Service, downcast_service};
use crate::ticker::TickDispatcher;
use crate::token::Token;
use ahash::RandomState;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

#[cfg(feature = "tracing")]
use tracing::{debug, error};

/// Unique scope identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u64);

impl ScopeId {
    #[inline]
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw id value.
    #[inline]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ScopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "scope-{}", self.0)
    }
}

type LocalMap = HashMap<Key, Arc<dyn Service>, RandomState>;

/// A node in the scope tree. Cloning is cheap and shares the node.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

pub(crate) struct ScopeInner {
    id: ScopeId,
    label: Option<String>,
    created_at: Instant,
    parent: Option<Weak<ScopeInner>>,
    container: Weak<ContainerInner>,
    children: Mutex<Vec<Scope>>,
    cache: Mutex<LocalMap>,
    externals: Mutex<LocalMap>,
    destroyables: Mutex<Vec<Arc<dyn Service>>>,
    tickables: Mutex<Vec<Arc<dyn Service>>>,
    fixed_tickables: Mutex<Vec<Arc<dyn Service>>>,
    render_tickables: Mutex<Vec<Arc<dyn Service>>>,
    destroyed: AtomicBool,
}

impl Scope {
    pub(crate) fn new_root(container: &Arc<ContainerInner>, label: Option<String>) -> Self {
        Self::allocate(container, None, label)
    }

    fn allocate(
        container: &Arc<ContainerInner>,
        parent: Option<&Arc<ScopeInner>>,
        label: Option<String>,
    ) -> Self {
        let inner = Arc::new(ScopeInner {
            id: ScopeId::next(),
            label,
            created_at: Instant::now(),
            parent: parent.map(Arc::downgrade),
            container: Arc::downgrade(container),
            children: Mutex::new(Vec::new()),
            cache: Mutex::new(HashMap::with_hasher(RandomState::new())),
            externals: Mutex::new(HashMap::with_hasher(RandomState::new())),
            destroyables: Mutex::new(Vec::new()),
            tickables: Mutex::new(Vec::new()),
            fixed_tickables: Mutex::new(Vec::new()),
            render_tickables: Mutex::new(Vec::new()),
            destroyed: AtomicBool::new(false),
        });

        #[cfg(feature = "tracing")]
        debug!(scope = %inner.id, "Created scope");

        Self { inner }
    }

    #[inline]
    pub(crate) fn inner(&self) -> &Arc<ScopeInner> {
        &self.inner
    }

    /// This scope's id.
    #[inline]
    pub fn id(&self) -> ScopeId {
        self.inner.id
    }

    /// The label given at creation, if any.
    #[inline]
    pub fn label(&self) -> Option<&str> {
        self.inner.label.as_deref()
    }

    /// Whether `destroy` has run.
    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    // =====================================================================
    // Tree operations
    // =====================================================================

    /// Allocate a child node. Children are destroyed before this scope's
    /// own destroyables run.
    pub fn create_child_scope(&self) -> DiResult<Scope> {
        self.create_child_scope_inner(None)
    }

    /// Allocate a labelled child node.
    pub fn create_child_scope_labeled(&self, label: impl Into<String>) -> DiResult<Scope> {
        self.create_child_scope_inner(Some(label.into()))
    }

    fn create_child_scope_inner(&self, label: Option<String>) -> DiResult<Scope> {
        self.inner.ensure_live_scope()?;
        let container = self.inner.container()?;
        let child = Self::allocate(&container, Some(&self.inner), label);
        self.inner.children.lock().push(child.clone());
        Ok(child)
    }

    // =====================================================================
    // Externals & resolution
    // =====================================================================

    /// Provide a pre-constructed value under `key`, bypassing construction.
    /// The value is lifecycle-tracked as if it had been resolved here.
    pub fn provide_external<T: Service>(&self, key: impl Into<Key>, value: T) -> DiResult<()> {
        self.provide_external_arc(key.into(), Arc::new(value))
    }

    /// Provide an already-shared value under `key`.
    pub fn provide_external_arc(&self, key: Key, value: Arc<dyn Service>) -> DiResult<()> {
        self.inner.ensure_live(&key)?;
        let container = self.inner.container()?;
        let ticker = container.ticker();

        let previous = self.inner.externals.lock().insert(key, Arc::clone(&value));
        if let Some(previous) = previous {
            self.inner.untrack(&previous, ticker);
        }
        self.inner.track(&value, ticker);
        Ok(())
    }

    /// Resolve a concrete type with this scope as the resolution scope.
    pub fn resolve<T: Service>(&self) -> DiResult<Arc<T>> {
        self.resolve_with::<T>(RuntimeArgs::new())
    }

    /// Resolve a concrete type, supplying runtime arguments for parameters
    /// marked as runtime-supplied.
    pub fn resolve_with<T: Service>(&self, mut args: RuntimeArgs) -> DiResult<Arc<T>> {
        let key = Key::of::<T>();
        let container = self.inner.container()?;
        let instance = container
            .resolve_entry(&key, Some(&self.inner), &mut args)?
            .into_one(&key)?;
        downcast_service::<T>(instance).map_err(|found| DiError::TypeMismatch {
            context: format!("resolve of {key} in {}", self.inner.id),
            expected: crate::key::short_type_name::<T>(),
            found: found.type_name(),
        })
    }

    /// Resolve a token binding to its untyped instance.
    pub fn resolve_token(&self, token: &Token) -> DiResult<Arc<dyn Service>> {
        let key = Key::from(token);
        let container = self.inner.container()?;
        container
            .resolve_entry(&key, Some(&self.inner), &mut RuntimeArgs::new())?
            .into_one(&key)
    }

    /// Resolve a token binding and downcast to its concrete type.
    pub fn resolve_token_as<T: Service>(&self, token: &Token) -> DiResult<Arc<T>> {
        let instance = self.resolve_token(token)?;
        downcast_service::<T>(instance).map_err(|found| DiError::TypeMismatch {
            context: format!("resolve of {token} in {}", self.inner.id),
            expected: crate::key::short_type_name::<T>(),
            found: found.type_name(),
        })
    }

    /// Resolve a multi-registration to its ordered member list.
    pub fn resolve_all(&self, token: &Token) -> DiResult<Vec<Arc<dyn Service>>> {
        let key = Key::from(token);
        let container = self.inner.container()?;
        container
            .resolve_entry(&key, Some(&self.inner), &mut RuntimeArgs::new())?
            .into_many(&key)
    }

    /// Resolve a keyed registration to its factory callable, bound to this
    /// scope for dependency resolution.
    pub fn resolve_keyed(&self, token: &Token) -> DiResult<crate::KeyedFactory> {
        let key = Key::from(token);
        let container = self.inner.container()?;
        container
            .resolve_entry(&key, Some(&self.inner), &mut RuntimeArgs::new())?
            .into_keyed(&key)
    }

    // =====================================================================
    // Lifecycle
    // =====================================================================

    /// Start every cached and external instance exactly once. Individual
    /// failures are logged and do not abort the pass.
    pub fn start_all(&self) {
        let mut seen: Vec<*const dyn Service> = Vec::new();
        let mut instances: Vec<Arc<dyn Service>> = Vec::new();
        {
            let externals = self.inner.externals.lock();
            let cache = self.inner.cache.lock();
            for instance in externals.values().chain(cache.values()) {
                let ptr = Arc::as_ptr(instance);
                if !seen.contains(&ptr) {
                    seen.push(ptr);
                    instances.push(Arc::clone(instance));
                }
            }
        }

        for instance in instances {
            if let Some(startable) = instance.as_startable()
                && let Err(_e) = startable.on_start()
            {
                #[cfg(feature = "tracing")]
                error!(scope = %self.inner.id, error = %_e, "start_all: a service failed to start");
            }
        }
    }

    /// Tear this scope down. Idempotent. Order: unhook tickables, destroy
    /// children, run destroyables (failures logged, loop continues), clear
    /// caches, mark destroyed.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        #[cfg(feature = "tracing")]
        debug!(scope = %self.inner.id, "Destroying scope");

        // (a) Stop frame callbacks before anything is torn down.
        if let Some(container) = self.inner.container.upgrade() {
            let ticker = container.ticker();
            for instance in self.inner.tickables.lock().iter() {
                ticker.unregister_tickable(instance);
            }
            for instance in self.inner.fixed_tickables.lock().iter() {
                ticker.unregister_fixed_tickable(instance);
            }
            for instance in self.inner.render_tickables.lock().iter() {
                ticker.unregister_render_tickable(instance);
            }
        }

        // (b) Children go down before this scope's own destroyables run.
        let children = std::mem::take(&mut *self.inner.children.lock());
        for child in children {
            child.destroy();
        }

        // (c) Destroyables, in tracking order; failures never abort the pass.
        let destroyables = std::mem::take(&mut *self.inner.destroyables.lock());
        for instance in destroyables {
            if let Some(destroyable) = instance.as_destroyable()
                && let Err(_e) = destroyable.on_destroy()
            {
                #[cfg(feature = "tracing")]
                error!(scope = %self.inner.id, error = %_e, "destroy: a service failed to tear down");
            }
        }

        // (d) Drop every cached instance and tracking list.
        self.inner.cache.lock().clear();
        self.inner.externals.lock().clear();
        self.inner.tickables.lock().clear();
        self.inner.fixed_tickables.lock().clear();
        self.inner.render_tickables.lock().clear();
    }

    /// Snapshot this node for debugging.
    pub fn debug(&self) -> ScopeDebug {
        let mut services: Vec<String> = Vec::new();
        for key in self.inner.externals.lock().keys() {
            services.push(key.render());
        }
        for key in self.inner.cache.lock().keys() {
            services.push(key.render());
        }

        ScopeDebug {
            scope_id: self.inner.id,
            label: self.inner.label.clone(),
            created_at: self.inner.created_at,
            parent_scope_id: self
                .inner
                .parent
                .as_ref()
                .and_then(|weak| weak.upgrade())
                .map(|parent| parent.id),
            child_scopes: self.inner.children.lock().len(),
            total_services: self.total_services(),
            services,
        }
    }

    fn total_services(&self) -> usize {
        let own = self.inner.externals.lock().len() + self.inner.cache.lock().len();
        let children = self.inner.children.lock().clone();
        own + children
            .iter()
            .map(|child| child.total_services())
            .sum::<usize>()
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.inner.id)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

impl ScopeInner {
    /// Fail every operation on a destroyed scope.
    pub(crate) fn ensure_live(&self, key: &Key) -> DiResult<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(DiError::lifetime(
                key.render(),
                format!("{} has been destroyed", self.id),
            ));
        }
        Ok(())
    }

    fn ensure_live_scope(&self) -> DiResult<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(DiError::lifetime(
                self.id.to_string(),
                format!("{} has been destroyed", self.id),
            ));
        }
        Ok(())
    }

    pub(crate) fn container(&self) -> DiResult<Arc<ContainerInner>> {
        self.container.upgrade().ok_or_else(|| {
            DiError::lifetime(self.id.to_string(), "the owning container has been dropped")
        })
    }

    #[inline]
    pub(crate) fn parent(&self) -> Option<Arc<ScopeInner>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// Externals first, then the scoped cache. Exact key identity only.
    pub(crate) fn lookup_local(&self, key: &Key) -> Option<Arc<dyn Service>> {
        if let Some(hit) = self.externals.lock().get(key) {
            return Some(Arc::clone(hit));
        }
        self.cache.lock().get(key).map(Arc::clone)
    }

    /// Cache a freshly constructed scoped instance and lifecycle-track it.
    pub(crate) fn insert_cached(&self, key: Key, instance: Arc<dyn Service>, ticker: &TickDispatcher) {
        self.cache.lock().insert(key, Arc::clone(&instance));
        self.track(&instance, ticker);
    }

    /// Inspect an instance for lifecycle capabilities and track it.
    fn track(&self, instance: &Arc<dyn Service>, ticker: &TickDispatcher) {
        if instance.as_destroyable().is_some() {
            self.destroyables.lock().push(Arc::clone(instance));
        }
        if instance.as_tickable().is_some() {
            self.tickables.lock().push(Arc::clone(instance));
            ticker.register_tickable(Arc::clone(instance));
        }
        if instance.as_fixed_tickable().is_some() {
            self.fixed_tickables.lock().push(Arc::clone(instance));
            ticker.register_fixed_tickable(Arc::clone(instance));
        }
        if instance.as_render_tickable().is_some() {
            self.render_tickables.lock().push(Arc::clone(instance));
            ticker.register_render_tickable(Arc::clone(instance));
        }
    }

    /// Reverse of `track`, for replaced externals.
    fn untrack(&self, instance: &Arc<dyn Service>, ticker: &TickDispatcher) {
        let remove = |list: &Mutex<Vec<Arc<dyn Service>>>| {
            list.lock().retain(|entry| !Arc::ptr_eq(entry, instance));
        };
        remove(&self.destroyables);
        remove(&self.tickables);
        remove(&self.fixed_tickables);
        remove(&self.render_tickables);
        ticker.unregister_tickable(instance);
        ticker.unregister_fixed_tickable(instance);
        ticker.unregister_render_tickable(instance);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_ids_are_unique_and_display_with_prefix() {
        let a = ScopeId::next();
        let b = ScopeId::next();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("scope-"));
    }
}
