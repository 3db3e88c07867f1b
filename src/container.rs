//! The container: root registry, resolution algorithm, validator, launch
//!
//! The container ingests registration records from modules, validates the
//! dependency graph once, and walks it on resolve: singletons cache
//! globally, scoped instances cache per scope node, factory products are
//! never cached. Cycle detection watches the exact recursion stack and
//! fires before a second entry into the same key.

use crate::error::{DiError, DiResult, ResolutionChain};
use crate::inject::{ArgSlot, ConstructArgs, RuntimeArgs};
use crate::key::Key;
use crate::reflect::{ParamSpec, Reflection};
use crate::registration::{Module, ProviderRecord, Record, Registration, ScopeModule, duplicate};
use crate::scope::{Scope, ScopeInner};
use crate::service::{Lifetime, Service, downcast_service};
use crate::storage::{InstanceCache, RegistrationTable};
use crate::ticker::{ManualTickDriver, TickDispatcher, TickDriver};
use crate::token::Token;
use ahash::RandomState;
use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

#[cfg(feature = "tracing")]
use tracing::{debug, trace};

/// The root of an object graph. Cloning is cheap and shares the container.
///
/// # Examples
///
/// ```rust
/// use marionette_di::{ConstructArgs, Container, DiResult, Inject, Module, Service};
///
/// struct Clock;
/// impl Service for Clock {}
/// impl Inject for Clock {
///     fn construct(_: &mut ConstructArgs) -> DiResult<Self> { Ok(Self) }
/// }
///
/// let container = Container::new();
/// container.use_module(&Module::builder().single::<Clock>().build()).unwrap();
///
/// let a = container.resolve::<Clock>().unwrap();
/// let b = container.resolve::<Clock>().unwrap();
/// assert!(std::sync::Arc::ptr_eq(&a, &b));
/// ```
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

pub(crate) struct ContainerInner {
    reflection: Reflection,
    registrations: RegistrationTable,
    singletons: InstanceCache,
    multi: DashMap<Token, Vec<ProviderRecord>, RandomState>,
    multi_cache: DashMap<Token, Vec<Arc<dyn Service>>, RandomState>,
    keyed: DashMap<Token, Vec<(String, ProviderRecord)>, RandomState>,
    external_keys: DashSet<Key, RandomState>,
    validated: AtomicBool,
    ticker: TickDispatcher,
}

impl Container {
    /// A container over the global reflection registry with an internal
    /// headless [`ManualTickDriver`]. Hosts that deliver real frame signals
    /// use [`Container::with_driver`].
    pub fn new() -> Self {
        Self::with_driver(Arc::new(ManualTickDriver::new(false)))
    }

    /// A container wired to the host's frame signals.
    pub fn with_driver(driver: Arc<dyn TickDriver>) -> Self {
        Self::with_reflection(Reflection::global().clone(), driver)
    }

    /// A container over an explicit reflection handle, for tests that need
    /// isolated token and metadata registries.
    pub fn with_reflection(reflection: Reflection, driver: Arc<dyn TickDriver>) -> Self {
        #[cfg(feature = "tracing")]
        debug!("Creating container");

        Self {
            inner: Arc::new(ContainerInner {
                reflection,
                registrations: RegistrationTable::new(),
                singletons: InstanceCache::new(),
                multi: DashMap::with_hasher(RandomState::new()),
                multi_cache: DashMap::with_hasher(RandomState::new()),
                keyed: DashMap::with_hasher(RandomState::new()),
                external_keys: DashSet::with_hasher(RandomState::new()),
                validated: AtomicBool::new(false),
                ticker: TickDispatcher::new(driver),
            }),
        }
    }

    /// The reflection handle this container reads metadata from.
    #[inline]
    pub fn reflection(&self) -> &Reflection {
        &self.inner.reflection
    }

    /// The shared tick dispatcher.
    #[inline]
    pub fn tick_dispatcher(&self) -> TickDispatcher {
        self.inner.ticker.clone()
    }

    /// Number of single/scoped/factory registrations.
    #[inline]
    pub fn registration_count(&self) -> usize {
        self.inner.registrations.len()
    }

    // =====================================================================
    // Ingest
    // =====================================================================

    /// Merge a module's registration records into the container.
    ///
    /// Duplicate single/scoped/factory keys fail immediately. Multi records
    /// append preserving order. Keyed records merge by string key; a
    /// collision with an entry from an earlier module is diagnosed as a
    /// duplicate. Any merge resets the validated bit.
    pub fn use_module(&self, module: &Module) -> DiResult<()> {
        let inner = &self.inner;
        inner.validated.store(false, Ordering::SeqCst);

        for record in &module.records {
            record.install_metadata(&inner.reflection);
            match record {
                Record::Single(registration) => {
                    #[cfg(feature = "tracing")]
                    trace!(key = %registration.key, lifetime = %registration.lifetime, "Registering");

                    inner.registrations.insert(registration.clone())?;
                }
                Record::Multi { token, providers } => {
                    inner
                        .multi
                        .entry(token.clone())
                        .or_default()
                        .extend(providers.iter().cloned());
                    inner.multi_cache.remove(token);
                }
                Record::Keyed { token, entries } => {
                    let mut existing = inner.keyed.entry(token.clone()).or_default();
                    for (name, provider) in entries {
                        if existing.iter().any(|(n, _)| n == name) {
                            return Err(duplicate(&Key::from(token)));
                        }
                        existing.push((name.clone(), provider.clone()));
                    }
                }
                Record::External(key) => {
                    inner.external_keys.insert(key.clone());
                }
            }
        }
        Ok(())
    }

    // =====================================================================
    // Validation & launch
    // =====================================================================

    /// Validate every registration's dependency graph. Problems accumulate
    /// into one numbered report. Idempotent: a second call with no
    /// intervening `use_module` is a no-op.
    pub fn validate(&self) -> DiResult<()> {
        self.inner.ensure_validated()
    }

    /// Validate, then start every singleton whose implementation declares
    /// the start capability, in registration order. Singletons without it
    /// are not pre-instantiated.
    pub fn launch(&self) -> DiResult<()> {
        let inner = &self.inner;
        inner.ensure_validated()?;

        #[cfg(feature = "tracing")]
        debug!("Launching container");

        for key in inner.registrations.keys_in_order() {
            let Some(registration) = inner.registrations.get(&key) else {
                continue;
            };
            if registration.lifetime != Lifetime::Singleton || !registration.provider.caps.start {
                continue;
            }
            let instance = inner
                .resolve_entry(&key, None, &mut RuntimeArgs::new())?
                .into_one(&key)?;
            if let Some(startable) = instance.as_startable() {
                startable.on_start()?;
            }
        }
        Ok(())
    }

    /// Allocate a root scope from a scope module: externals are copied in
    /// and tracked, the declared root (if any) is resolved with scoped
    /// lifetime, then every instance in the scope is started.
    pub fn create_scope(&self, module: &ScopeModule) -> DiResult<Scope> {
        let scope = Scope::new_root(&self.inner, None);
        for (key, value) in &module.externals {
            scope.provide_external_arc(key.clone(), Arc::clone(value))?;
        }
        if let Some(root) = &module.root {
            self.inner
                .resolve_entry(root, Some(scope.inner()), &mut RuntimeArgs::new())?
                .into_one(root)?;
        }
        scope.start_all();
        Ok(scope)
    }

    // =====================================================================
    // Resolution entry points
    // =====================================================================

    /// Resolve a concrete type key.
    pub fn resolve<T: Service>(&self) -> DiResult<Arc<T>> {
        self.resolve_with::<T>(RuntimeArgs::new())
    }

    /// Resolve a concrete type key, supplying runtime arguments.
    pub fn resolve_with<T: Service>(&self, mut args: RuntimeArgs) -> DiResult<Arc<T>> {
        let key = Key::of::<T>();
        let instance = self
            .inner
            .resolve_entry(&key, None, &mut args)?
            .into_one(&key)?;
        downcast_service::<T>(instance).map_err(|found| DiError::TypeMismatch {
            context: format!("resolve of {key}"),
            expected: crate::key::short_type_name::<T>(),
            found: found.type_name(),
        })
    }

    /// Resolve a token binding to its untyped instance.
    pub fn resolve_token(&self, token: &Token) -> DiResult<Arc<dyn Service>> {
        let key = Key::from(token);
        self.inner
            .resolve_entry(&key, None, &mut RuntimeArgs::new())?
            .into_one(&key)
    }

    /// Resolve a token binding and downcast to its concrete type.
    pub fn resolve_token_as<T: Service>(&self, token: &Token) -> DiResult<Arc<T>> {
        let instance = self.resolve_token(token)?;
        downcast_service::<T>(instance).map_err(|found| DiError::TypeMismatch {
            context: format!("resolve of {token}"),
            expected: crate::key::short_type_name::<T>(),
            found: found.type_name(),
        })
    }

    /// Resolve a multi-registration to its ordered member list.
    pub fn resolve_all(&self, token: &Token) -> DiResult<Vec<Arc<dyn Service>>> {
        let key = Key::from(token);
        self.inner
            .resolve_entry(&key, None, &mut RuntimeArgs::new())?
            .into_many(&key)
    }

    /// Resolve a keyed registration to its factory callable.
    pub fn resolve_keyed(&self, token: &Token) -> DiResult<KeyedFactory> {
        let key = Key::from(token);
        self.inner
            .resolve_entry(&key, None, &mut RuntimeArgs::new())?
            .into_keyed(&key)
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("registrations", &self.inner.registrations.len())
            .field("singletons", &self.inner.singletons.len())
            .field("validated", &self.inner.validated.load(Ordering::SeqCst))
            .finish()
    }
}

// =========================================================================
// Resolution internals
// =========================================================================

/// What a key resolved to.
pub(crate) enum Resolved {
    One(Arc<dyn Service>),
    Many(Vec<Arc<dyn Service>>),
    Keyed(KeyedFactory),
}

impl Resolved {
    fn kind(&self) -> &'static str {
        match self {
            Resolved::One(_) => "a single registration",
            Resolved::Many(_) => "a multi-registration (use resolve_all)",
            Resolved::Keyed(_) => "a keyed registration (use resolve_keyed)",
        }
    }

    pub(crate) fn into_one(self, key: &Key) -> DiResult<Arc<dyn Service>> {
        match self {
            Resolved::One(instance) => Ok(instance),
            other => Err(DiError::TypeMismatch {
                context: format!("resolve of {key}"),
                expected: "a single registration",
                found: other.kind(),
            }),
        }
    }

    pub(crate) fn into_many(self, key: &Key) -> DiResult<Vec<Arc<dyn Service>>> {
        match self {
            Resolved::Many(instances) => Ok(instances),
            other => Err(DiError::TypeMismatch {
                context: format!("resolve_all of {key}"),
                expected: "a multi-registration",
                found: other.kind(),
            }),
        }
    }

    pub(crate) fn into_keyed(self, key: &Key) -> DiResult<KeyedFactory> {
        match self {
            Resolved::Keyed(factory) => Ok(factory),
            other => Err(DiError::TypeMismatch {
                context: format!("resolve_keyed of {key}"),
                expected: "a keyed registration",
                found: other.kind(),
            }),
        }
    }

    fn into_slot(self) -> ArgSlot {
        match self {
            Resolved::One(instance) => ArgSlot::One(instance),
            Resolved::Many(instances) => ArgSlot::Many(instances),
            Resolved::Keyed(factory) => ArgSlot::Keyed(factory),
        }
    }
}

/// The recursion stack of one resolve call.
#[derive(Default)]
struct ResolveCtx {
    chain: Vec<Key>,
}

impl ResolveCtx {
    fn rendered(&self) -> ResolutionChain {
        ResolutionChain::from_keys(self.chain.iter().map(Key::render).collect())
    }

    fn rendered_with(&self, key: &Key) -> ResolutionChain {
        let mut keys: Vec<String> = self.chain.iter().map(Key::render).collect();
        keys.push(key.render());
        ResolutionChain::from_keys(keys)
    }
}

impl ContainerInner {
    #[inline]
    pub(crate) fn ticker(&self) -> &TickDispatcher {
        &self.ticker
    }

    /// Run validation unless it already passed since the last ingest.
    pub(crate) fn ensure_validated(&self) -> DiResult<()> {
        if self.validated.load(Ordering::SeqCst) {
            return Ok(());
        }

        #[cfg(feature = "tracing")]
        debug!("Validating registrations");

        let mut problems = Vec::new();
        for key in self.registrations.keys_in_order() {
            let Some(registration) = self.registrations.get(&key) else {
                continue;
            };
            self.check_provider(
                &registration.provider,
                registration.lifetime,
                &key.render(),
                &mut problems,
            );
        }
        for entry in self.multi.iter() {
            let owner = format!("{} (multi)", entry.key().description());
            for provider in entry.value() {
                // Multi members construct and cache with singleton semantics.
                self.check_provider(provider, Lifetime::Singleton, &owner, &mut problems);
            }
        }
        for entry in self.keyed.iter() {
            for (name, provider) in entry.value() {
                let owner = format!("{}[{name}] (keyed)", entry.key().description());
                self.check_provider(provider, Lifetime::Factory, &owner, &mut problems);
            }
        }

        if problems.is_empty() {
            self.validated.store(true, Ordering::SeqCst);
            Ok(())
        } else {
            Err(DiError::ValidationFailed { problems })
        }
    }

    fn check_provider(
        &self,
        provider: &ProviderRecord,
        lifetime: Lifetime,
        owner: &str,
        problems: &mut Vec<String>,
    ) {
        match self
            .reflection
            .param_plan(provider.type_id, provider.type_name)
        {
            Err(error) => problems.push(format!("{owner}: {error}")),
            Ok(plan) => {
                for spec in plan {
                    if let ParamSpec::Dependency(dependency) = spec
                        && !self.is_resolvable(&dependency)
                    {
                        problems.push(format!(
                            "{owner} depends on {dependency}, which has no registration"
                        ));
                    }
                }
            }
        }
        if provider.caps.warmup && lifetime != Lifetime::Singleton {
            problems.push(format!(
                "{owner} exposes a warmup capability but is registered as {lifetime}; \
                 warmup requires singleton"
            ));
        }
    }

    fn is_resolvable(&self, key: &Key) -> bool {
        if self.registrations.contains(key) || self.external_keys.contains(key) {
            return true;
        }
        key.as_token()
            .is_some_and(|token| self.multi.contains_key(token) || self.keyed.contains_key(token))
    }

    /// Public resolve entry: validate lazily, then walk the graph.
    pub(crate) fn resolve_entry(
        self: &Arc<Self>,
        key: &Key,
        scope: Option<&Arc<ScopeInner>>,
        runtime: &mut RuntimeArgs,
    ) -> DiResult<Resolved> {
        self.ensure_validated()?;
        let mut ctx = ResolveCtx::default();
        self.resolve_key(key, scope, &mut ctx, runtime)
    }

    /// The core resolution walk. Lookup precedence from a scope: externals
    /// in this scope, this scope's cache, container registration dispatched
    /// by lifetime, then the parent scope when no registration exists.
    fn resolve_key(
        self: &Arc<Self>,
        key: &Key,
        scope: Option<&Arc<ScopeInner>>,
        ctx: &mut ResolveCtx,
        runtime: &mut RuntimeArgs,
    ) -> DiResult<Resolved> {
        if let Some(scope) = scope {
            scope.ensure_live(key)?;
            if let Some(hit) = scope.lookup_local(key) {
                return Ok(Resolved::One(hit));
            }
        }

        if let Key::Token(token) = key {
            if !self.reflection.is_token(token) {
                return Err(DiError::InvalidToken {
                    detail: format!(
                        "{token} was not minted by this container's reflection registry"
                    ),
                });
            }
            if self.multi.contains_key(token) {
                return Ok(Resolved::Many(self.resolve_multi(token, ctx)?));
            }
            if self.keyed.contains_key(token) {
                return Ok(Resolved::Keyed(KeyedFactory {
                    token: token.clone(),
                    container: Arc::downgrade(self),
                    scope: scope.map(Arc::downgrade),
                }));
            }
        }

        let Some(registration) = self.registrations.get(key) else {
            // No registration here: the parent scope may hold the key as an
            // external or a scoped instance of its own.
            if let Some(scope) = scope
                && let Some(parent) = scope.parent()
            {
                return self.resolve_key(key, Some(&parent), ctx, runtime);
            }
            if self.external_keys.contains(key) {
                return Err(DiError::MissingRegistration {
                    key: key.render(),
                    chain: ctx.rendered_with(key),
                    detail: "declared as a scope external, but no external was provided".into(),
                });
            }
            return Err(DiError::missing(key.render(), ctx.rendered_with(key)));
        };

        match registration.lifetime {
            Lifetime::Singleton => {
                if let Some(hit) = self.singletons.get(key) {
                    return Ok(Resolved::One(hit));
                }
                let instance =
                    self.construct_guarded(&registration, key, None, ctx, runtime)?;
                self.singletons.insert(key.clone(), Arc::clone(&instance));
                self.track_global(&instance);
                Ok(Resolved::One(instance))
            }
            Lifetime::Scoped => {
                let Some(scope) = scope else {
                    return Err(DiError::lifetime(
                        key.render(),
                        "scoped registration resolved without a scope; \
                         resolve it through a scope handle",
                    ));
                };
                let instance =
                    self.construct_guarded(&registration, key, Some(scope), ctx, runtime)?;
                scope.insert_cached(key.clone(), Arc::clone(&instance), &self.ticker);
                Ok(Resolved::One(instance))
            }
            Lifetime::Factory => {
                let instance = self.construct_guarded(&registration, key, scope, ctx, runtime)?;
                Ok(Resolved::One(instance))
            }
        }
    }

    /// Cycle-check, push the key, construct, pop.
    fn construct_guarded(
        self: &Arc<Self>,
        registration: &Registration,
        key: &Key,
        dependency_scope: Option<&Arc<ScopeInner>>,
        ctx: &mut ResolveCtx,
        runtime: &mut RuntimeArgs,
    ) -> DiResult<Arc<dyn Service>> {
        self.guard_cycle(ctx, key)?;
        ctx.chain.push(key.clone());
        let result = self.instantiate(
            &registration.provider,
            key,
            registration.lifetime,
            dependency_scope,
            ctx,
            runtime,
        );
        ctx.chain.pop();
        result
    }

    fn guard_cycle(&self, ctx: &ResolveCtx, key: &Key) -> DiResult<()> {
        if ctx.chain.contains(key) {
            return Err(DiError::CircularDependency {
                chain: ctx.rendered_with(key),
            });
        }
        Ok(())
    }

    /// Resolve the parameter plan, construct, apply the warmup rule.
    fn instantiate(
        self: &Arc<Self>,
        provider: &ProviderRecord,
        key: &Key,
        lifetime: Lifetime,
        dependency_scope: Option<&Arc<ScopeInner>>,
        ctx: &mut ResolveCtx,
        runtime: &mut RuntimeArgs,
    ) -> DiResult<Arc<dyn Service>> {
        #[cfg(feature = "tracing")]
        trace!(key = %key, %lifetime, "Constructing");

        let plan = self
            .reflection
            .param_plan(provider.type_id, provider.type_name)
            .map_err(|error| error.wrap_constructor(key.render(), ctx.rendered()))?;

        let mut slots = Vec::with_capacity(plan.len());
        for (index, spec) in plan.into_iter().enumerate() {
            match spec {
                ParamSpec::Runtime => {
                    let value = runtime.take().ok_or_else(|| {
                        DiError::failure(format!(
                            "runtime parameter {index} of {} was not supplied; \
                             pass it with resolve_with and runtime_args!",
                            provider.type_name
                        ))
                        .wrap_constructor(key.render(), ctx.rendered())
                    })?;
                    slots.push(ArgSlot::Runtime(value));
                }
                ParamSpec::Dependency(dependency) => {
                    // Transitive dependencies never see the caller's runtime
                    // arguments.
                    let resolved = self.resolve_key(
                        &dependency,
                        dependency_scope,
                        ctx,
                        &mut RuntimeArgs::new(),
                    )?;
                    slots.push(resolved.into_slot());
                }
            }
        }

        let mut args = ConstructArgs::new(provider.type_name, slots);
        let instance = (provider.construct)(&mut args)
            .map_err(|error| error.wrap_constructor(key.render(), ctx.rendered()))?;

        if let Some(warmup) = instance.as_warmup() {
            if lifetime != Lifetime::Singleton {
                return Err(DiError::lifetime(
                    key.render(),
                    format!(
                        "{} exposes a warmup capability but was constructed as {lifetime}; \
                         warmup requires singleton",
                        provider.type_name
                    ),
                ));
            }
            warmup
                .on_warmup()
                .map_err(|error| error.wrap_constructor(key.render(), ctx.rendered()))?;
        }

        Ok(instance)
    }

    /// Construct and cache the members of a multi-registration. Members use
    /// singleton semantics: constructed once, cached for the container's
    /// lifetime, never re-built on later resolves.
    fn resolve_multi(
        self: &Arc<Self>,
        token: &Token,
        ctx: &mut ResolveCtx,
    ) -> DiResult<Vec<Arc<dyn Service>>> {
        if let Some(cached) = self.multi_cache.get(token) {
            return Ok(cached.value().clone());
        }
        let providers = self
            .multi
            .get(token)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();

        let token_key = Key::from(token);
        self.guard_cycle(ctx, &token_key)?;
        ctx.chain.push(token_key);

        let mut members = Vec::with_capacity(providers.len());
        let mut failure = None;
        for provider in &providers {
            let member_key = provider.impl_key();
            if let Err(error) = self.guard_cycle(ctx, &member_key) {
                failure = Some(error);
                break;
            }
            ctx.chain.push(member_key.clone());
            let result = self.instantiate(
                provider,
                &member_key,
                Lifetime::Singleton,
                None,
                ctx,
                &mut RuntimeArgs::new(),
            );
            ctx.chain.pop();
            match result {
                Ok(instance) => members.push(instance),
                Err(error) => {
                    failure = Some(error);
                    break;
                }
            }
        }
        ctx.chain.pop();
        if let Some(error) = failure {
            return Err(error);
        }

        for member in &members {
            self.track_global(member);
        }
        self.multi_cache.insert(token.clone(), members.clone());
        Ok(members)
    }

    /// Singleton-cached instances tick for the container's lifetime; only
    /// the dispatcher's own destroy unhooks them.
    fn track_global(&self, instance: &Arc<dyn Service>) {
        if instance.as_tickable().is_some() {
            self.ticker.register_tickable(Arc::clone(instance));
        }
        if instance.as_fixed_tickable().is_some() {
            self.ticker.register_fixed_tickable(Arc::clone(instance));
        }
        if instance.as_render_tickable().is_some() {
            self.ticker.register_render_tickable(Arc::clone(instance));
        }
    }
}

// =========================================================================
// Keyed factories
// =========================================================================

/// The callable produced by resolving a keyed registration.
///
/// Every [`create`](KeyedFactory::create) call constructs a fresh instance
/// with factory semantics: nothing is cached, nothing is tracked.
#[derive(Clone)]
pub struct KeyedFactory {
    token: Token,
    container: Weak<ContainerInner>,
    scope: Option<Weak<ScopeInner>>,
}

impl KeyedFactory {
    /// The keyed registration's token.
    #[inline]
    pub fn token(&self) -> &Token {
        &self.token
    }

    /// The string keys this factory can construct, in insertion order.
    pub fn available_keys(&self) -> Vec<String> {
        self.container
            .upgrade()
            .and_then(|container| {
                container
                    .keyed
                    .get(&self.token)
                    .map(|entry| entry.iter().map(|(name, _)| name.clone()).collect())
            })
            .unwrap_or_default()
    }

    /// Construct the implementation registered under `name`.
    pub fn create(&self, name: &str) -> DiResult<Arc<dyn Service>> {
        self.create_with(name, RuntimeArgs::new())
    }

    /// Construct with runtime arguments for the target's runtime parameters.
    pub fn create_with(&self, name: &str, mut args: RuntimeArgs) -> DiResult<Arc<dyn Service>> {
        let container = self.container.upgrade().ok_or_else(|| {
            DiError::lifetime(
                self.token.description(),
                "the owning container has been dropped",
            )
        })?;
        let scope = match &self.scope {
            Some(weak) => {
                let scope = weak.upgrade().ok_or_else(|| {
                    DiError::lifetime(
                        self.token.description(),
                        "the scope this factory was resolved in is gone",
                    )
                })?;
                scope.ensure_live(&Key::from(&self.token))?;
                Some(scope)
            }
            None => None,
        };

        let entries = container
            .keyed
            .get(&self.token)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        let Some((_, provider)) = entries.iter().find(|(entry, _)| entry == name) else {
            let available = entries
                .iter()
                .map(|(entry, _)| entry.clone())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(DiError::MissingRegistration {
                key: format!("{}[{name}]", self.token.description()),
                chain: ResolutionChain::empty(),
                detail: format!("available keys: {available}"),
            });
        };

        let member_key = provider.impl_key();
        let mut ctx = ResolveCtx::default();
        ctx.chain.push(Key::from(&self.token));
        container.instantiate(
            provider,
            &member_key,
            Lifetime::Factory,
            scope.as_ref(),
            &mut ctx,
            &mut args,
        )
    }

    /// Construct and downcast to the concrete type.
    pub fn create_as<T: Service>(&self, name: &str) -> DiResult<Arc<T>> {
        let instance = self.create(name)?;
        downcast_service::<T>(instance).map_err(|found| DiError::TypeMismatch {
            context: format!("keyed create of {}[{name}]", self.token.description()),
            expected: crate::key::short_type_name::<T>(),
            found: found.type_name(),
        })
    }
}

impl std::fmt::Debug for KeyedFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedFactory")
            .field("token", &self.token.description())
            .finish()
    }
}
