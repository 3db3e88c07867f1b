//! Reflection: the token registry and the per-class metadata store
//!
//! Both stores are process-wide singletons in spirit, but they live behind a
//! [`Reflection`] handle that can be constructed fresh for tests. The global
//! handle backs [`create_token`](crate::create_token) and is what
//! [`Container::new`](crate::Container::new) picks up by default.
//!
//! Metadata lookups walk the declared ancestor chain per property: a class
//! inherits each ancestor property unless it defines its own. This is the
//! only supported inheritance path.

use crate::error::{DiError, DiResult};
use crate::key::Key;
use crate::service::Lifetime;
use crate::token::Token;
use ahash::RandomState;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "tracing")]
use tracing::trace;

static GLOBAL: Lazy<Reflection> = Lazy::new(Reflection::new);

/// Handle over the token registry and the class metadata store.
///
/// Cloning is cheap; clones share the same underlying stores.
#[derive(Clone)]
pub struct Reflection {
    inner: Arc<ReflectionInner>,
}

struct ReflectionInner {
    tokens: DashMap<u64, Arc<str>, RandomState>,
    next_token_id: AtomicU64,
    classes: DashMap<TypeId, ClassMeta, RandomState>,
}

impl Reflection {
    /// A fresh, empty reflection handle. Tokens minted here are unknown to
    /// any other handle.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ReflectionInner {
                tokens: DashMap::with_hasher(RandomState::new()),
                next_token_id: AtomicU64::new(1),
                classes: DashMap::with_hasher(RandomState::new()),
            }),
        }
    }

    /// The process-global handle.
    #[inline]
    pub fn global() -> &'static Reflection {
        &GLOBAL
    }

    /// Whether two handles share the same stores.
    #[inline]
    pub(crate) fn same_registry(&self, other: &Reflection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // =====================================================================
    // Token registry
    // =====================================================================

    /// Mint a fresh token and record its id in this registry.
    pub fn create_token(&self, description: &str) -> Token {
        let id = self.inner.next_token_id.fetch_add(1, Ordering::Relaxed);
        let description: Arc<str> = Arc::from(description);
        self.inner.tokens.insert(id, Arc::clone(&description));

        #[cfg(feature = "tracing")]
        trace!(id, %description, "Minted token");

        Token::mint(id, description)
    }

    /// `true` iff the token was minted by this registry.
    #[inline]
    pub fn is_token(&self, token: &Token) -> bool {
        self.inner.tokens.contains_key(&token.id())
    }

    // =====================================================================
    // Metadata store
    // =====================================================================

    /// Install (or replace) the metadata for a class.
    pub fn describe<T: 'static>(&self, meta: ClassMeta) {
        self.inner.classes.insert(TypeId::of::<T>(), meta);
    }

    /// Install metadata only when the store has no entry yet. Containers use
    /// this on ingest so pre-seeded test metadata wins.
    pub(crate) fn describe_if_absent(&self, type_id: TypeId, meta: impl FnOnce() -> ClassMeta) {
        self.inner.classes.entry(type_id).or_insert_with(meta);
    }

    /// The declared lifetime for a class, walking the ancestor chain.
    pub fn lifetime_of(&self, type_id: TypeId) -> Option<Lifetime> {
        self.walk(type_id, |meta| meta.lifetime)
    }

    /// Build the positional parameter plan for a class.
    ///
    /// Each of the three parameter properties (explicit injection keys,
    /// auto-wired parameter types, runtime markers) is inherited
    /// independently along the ancestor chain. A parameter index covered by
    /// none of them is an error naming the class and the index.
    pub(crate) fn param_plan(
        &self,
        type_id: TypeId,
        type_name: &str,
    ) -> DiResult<Vec<ParamSpec>> {
        let tokens = self.walk(type_id, |meta| meta.dependency_tokens.clone());
        let auto = self.walk(type_id, |meta| meta.dependencies.clone());
        let runtime = self.walk(type_id, |meta| meta.runtime_params.clone());

        let tokens = tokens.unwrap_or_default();
        let auto = auto.unwrap_or_default();
        let mut runtime = runtime.unwrap_or_default();
        // Runtime arguments are consumed in ascending parameter-index order.
        runtime.sort_unstable();

        let count = tokens
            .keys()
            .copied()
            .map(|i| i + 1)
            .max()
            .unwrap_or(0)
            .max(auto.len())
            .max(runtime.last().map(|i| i + 1).unwrap_or(0));

        let mut plan = Vec::with_capacity(count);
        for index in 0..count {
            if runtime.binary_search(&index).is_ok() {
                plan.push(ParamSpec::Runtime);
            } else if let Some(key) = tokens.get(&index) {
                plan.push(ParamSpec::Dependency(key.clone()));
            } else if let Some(Some(key)) = auto.get(index) {
                plan.push(ParamSpec::Dependency(key.clone()));
            } else {
                return Err(DiError::failure(format!(
                    "no injection key for parameter {index} of {type_name}; \
                     declare it with ClassMeta::dependency/token_dependency or \
                     mark it with ClassMeta::runtime_param"
                )));
            }
        }
        Ok(plan)
    }

    /// First `Some` value of a property along the ancestor chain.
    fn walk<V>(&self, type_id: TypeId, pick: impl Fn(&ClassMeta) -> Option<V>) -> Option<V> {
        let mut current = Some(type_id);
        while let Some(id) = current {
            match self.inner.classes.get(&id) {
                Some(meta) => {
                    if let Some(value) = pick(meta.value()) {
                        return Some(value);
                    }
                    current = meta.value().parent;
                }
                None => return None,
            }
        }
        None
    }
}

impl Default for Reflection {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Reflection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reflection")
            .field("tokens", &self.inner.tokens.len())
            .field("classes", &self.inner.classes.len())
            .finish()
    }
}

/// One resolved entry of a parameter plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ParamSpec {
    /// Resolve this key from the container/scope.
    Dependency(Key),
    /// Pull the next caller-supplied runtime argument.
    Runtime,
}

// =========================================================================
// Per-class metadata
// =========================================================================

/// The per-class property bag the resolution algorithm reads.
///
/// Built by [`Inject::metadata`](crate::Inject::metadata) (or installed
/// directly via [`Reflection::describe`]). Unset properties fall through to
/// the declared ancestor.
#[derive(Debug, Clone, Default)]
pub struct ClassMeta {
    lifetime: Option<Lifetime>,
    dependency_tokens: Option<HashMap<usize, Key>>,
    dependencies: Option<Vec<Option<Key>>>,
    runtime_params: Option<Vec<usize>>,
    parent: Option<TypeId>,
}

impl ClassMeta {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the default lifetime used by
    /// [`ModuleBuilder::register`](crate::ModuleBuilder::register).
    #[inline]
    pub fn lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    /// Auto-wire parameter `index` to the concrete type `T`.
    pub fn dependency<T: 'static>(mut self, index: usize) -> Self {
        let deps = self.dependencies.get_or_insert_with(Vec::new);
        if deps.len() <= index {
            deps.resize(index + 1, None);
        }
        deps[index] = Some(Key::of::<T>());
        self
    }

    /// Bind parameter `index` to an explicit injection key (token or type).
    /// Explicit keys take precedence over auto-wired types at the same index.
    pub fn token_dependency(mut self, index: usize, key: impl Into<Key>) -> Self {
        self.dependency_tokens
            .get_or_insert_with(HashMap::new)
            .insert(index, key.into());
        self
    }

    /// Mark parameter `index` as supplied by the caller at resolve time.
    pub fn runtime_param(mut self, index: usize) -> Self {
        self.runtime_params.get_or_insert_with(Vec::new).push(index);
        self
    }

    /// Declare the ancestor class this one inherits unset properties from.
    pub fn parent<P: 'static>(mut self) -> Self {
        self.parent = Some(TypeId::of::<P>());
        self
    }

    #[inline]
    pub(crate) fn declared_lifetime(&self) -> Option<Lifetime> {
        self.lifetime
    }
}
