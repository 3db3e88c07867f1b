//! Registration records and the module builder DSL
//!
//! The builder accumulates declarative registration records; a finished
//! [`Module`] is handed to [`Container::use_module`](crate::Container::use_module)
//! and is immutable from then on. Scope modules describe per-entity graphs:
//! an optional scoped root plus pre-constructed external values.

use crate::error::{DiError, DiResult};
use crate::inject::{ConstructArgs, Inject};
use crate::key::{Key, short_type_name};
use crate::reflect::Reflection;
use crate::service::{Capabilities, Lifetime, Service};
use crate::token::Token;
use std::any::TypeId;
use std::marker::PhantomData;
use std::sync::Arc;

// =========================================================================
// Provider records
// =========================================================================

type ConstructFn = dyn Fn(&mut ConstructArgs) -> DiResult<Arc<dyn Service>> + Send + Sync;

/// Monomorphized, type-erased constructor for one implementation.
#[derive(Clone)]
pub(crate) struct ProviderRecord {
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub caps: Capabilities,
    pub construct: Arc<ConstructFn>,
    pub install_meta: fn(&Reflection),
}

fn install_meta_for<T: Inject>(reflection: &Reflection) {
    reflection.describe_if_absent(TypeId::of::<T>(), T::metadata);
}

impl ProviderRecord {
    pub fn of<T: Inject>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: short_type_name::<T>(),
            caps: T::CAPS,
            construct: Arc::new(|args| Ok(Arc::new(T::construct(args)?) as Arc<dyn Service>)),
            install_meta: install_meta_for::<T>,
        }
    }

    #[inline]
    pub fn impl_key(&self) -> Key {
        Key::Type {
            id: self.type_id,
            name: self.type_name,
        }
    }
}

impl std::fmt::Debug for ProviderRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRecord")
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// Public handle over a provider record, used by the multi/keyed builder
/// operations.
pub struct Provider(pub(crate) ProviderRecord);

/// The provider for implementation `T`.
#[inline]
pub fn provider<T: Inject>() -> Provider {
    Provider(ProviderRecord::of::<T>())
}

/// A single/scoped/factory registration: key, implementation, lifetime.
#[derive(Clone, Debug)]
pub(crate) struct Registration {
    pub key: Key,
    pub provider: ProviderRecord,
    pub lifetime: Lifetime,
}

/// One accumulated builder record.
#[derive(Clone, Debug)]
pub(crate) enum Record {
    Single(Registration),
    Multi {
        token: Token,
        providers: Vec<ProviderRecord>,
    },
    Keyed {
        token: Token,
        entries: Vec<(String, ProviderRecord)>,
    },
    /// A key satisfied by scope externals only; validation accepts it.
    External(Key),
}

// =========================================================================
// Modules
// =========================================================================

/// An immutable batch of registration records.
pub struct Module {
    pub(crate) records: Vec<Record>,
}

impl Module {
    /// Start accumulating records.
    #[inline]
    pub fn builder() -> ModuleBuilder {
        ModuleBuilder::new()
    }

    /// Number of accumulated records.
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("records", &self.records.len())
            .finish()
    }
}

/// Accumulates registration records.
///
/// ```rust
/// use marionette_di::{ConstructArgs, DiResult, Inject, Module, Service, create_token, provider};
///
/// struct Sword;
/// impl Service for Sword {}
/// impl Inject for Sword {
///     fn construct(_: &mut ConstructArgs) -> DiResult<Self> { Ok(Self) }
/// }
///
/// struct Bow;
/// impl Service for Bow {}
/// impl Inject for Bow {
///     fn construct(_: &mut ConstructArgs) -> DiResult<Self> { Ok(Self) }
/// }
///
/// let main_weapon = create_token("MainWeapon");
/// let arsenal = create_token("Arsenal");
/// let module = Module::builder()
///     .single::<Sword>()
///     .bound_to(&main_weapon)
///     .multi(&arsenal, vec![provider::<Sword>(), provider::<Bow>()])
///     .build();
/// assert_eq!(module.len(), 3);
/// ```
#[derive(Default)]
pub struct ModuleBuilder {
    records: Vec<Record>,
}

impl ModuleBuilder {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    fn push_single<C: Inject>(&mut self, lifetime: Lifetime) {
        let provider = ProviderRecord::of::<C>();
        self.records.push(Record::Single(Registration {
            key: provider.impl_key(),
            provider,
            lifetime,
        }));
    }

    /// Register `C` as a singleton under its own type key. The returned
    /// binding continuation can alias the same implementation under one
    /// additional key.
    pub fn single<C: Inject>(mut self) -> Binding<C> {
        self.push_single::<C>(Lifetime::Singleton);
        Binding {
            builder: self,
            lifetime: Lifetime::Singleton,
            _marker: PhantomData,
        }
    }

    /// Register `C` with scoped lifetime.
    pub fn scoped<C: Inject>(mut self) -> Binding<C> {
        self.push_single::<C>(Lifetime::Scoped);
        Binding {
            builder: self,
            lifetime: Lifetime::Scoped,
            _marker: PhantomData,
        }
    }

    /// Register `C` with factory lifetime.
    pub fn factory<C: Inject>(mut self) -> Binding<C> {
        self.push_single::<C>(Lifetime::Factory);
        Binding {
            builder: self,
            lifetime: Lifetime::Factory,
            _marker: PhantomData,
        }
    }

    /// Register `C` with the lifetime its metadata declares (singleton when
    /// the metadata is silent).
    pub fn register<C: Inject>(self) -> Binding<C> {
        let lifetime = C::metadata().declared_lifetime().unwrap_or_default();
        match lifetime {
            Lifetime::Singleton => self.single::<C>(),
            Lifetime::Scoped => self.scoped::<C>(),
            Lifetime::Factory => self.factory::<C>(),
        }
    }

    /// Append a multi-registration: resolving `token` yields the listed
    /// implementations in insertion order.
    pub fn multi(mut self, token: &Token, providers: Vec<Provider>) -> Self {
        self.records.push(Record::Multi {
            token: token.clone(),
            providers: providers.into_iter().map(|p| p.0).collect(),
        });
        self
    }

    /// Append a keyed registration: resolving `token` yields a callable that
    /// constructs an implementation by string key, factory semantics. A key
    /// repeated within one call is last-write-wins.
    pub fn keyed<S: Into<String>>(
        mut self,
        token: &Token,
        entries: impl IntoIterator<Item = (S, Provider)>,
    ) -> Self {
        let mut merged: Vec<(String, ProviderRecord)> = Vec::new();
        for (name, provider) in entries {
            let name = name.into();
            if let Some(slot) = merged.iter_mut().find(|(existing, _)| *existing == name) {
                slot.1 = provider.0;
            } else {
                merged.push((name, provider.0));
            }
        }
        self.records.push(Record::Keyed {
            token: token.clone(),
            entries: merged,
        });
        self
    }

    /// Declare a key that is satisfied by scope externals only. No
    /// implementation is registered; validation accepts dependencies on the
    /// key, and resolving it without a provided external still fails.
    pub fn expects_external(mut self, key: impl Into<Key>) -> Self {
        self.records.push(Record::External(key.into()));
        self
    }

    /// Finish the module.
    #[inline]
    pub fn build(self) -> Module {
        Module {
            records: self.records,
        }
    }
}

/// Continuation returned by [`ModuleBuilder::single`] and friends: binds the
/// just-registered implementation under one additional key.
pub struct Binding<C: Inject> {
    builder: ModuleBuilder,
    lifetime: Lifetime,
    _marker: PhantomData<fn() -> C>,
}

impl<C: Inject> Binding<C> {
    /// Also register the implementation under `key`, same lifetime.
    pub fn bound_to(mut self, key: impl Into<Key>) -> ModuleBuilder {
        self.builder.records.push(Record::Single(Registration {
            key: key.into(),
            provider: ProviderRecord::of::<C>(),
            lifetime: self.lifetime,
        }));
        self.builder
    }

    /// Continue without an extra binding.
    #[inline]
    pub fn done(self) -> ModuleBuilder {
        self.builder
    }

    // Passthroughs so registration chains read naturally.

    pub fn single<D: Inject>(self) -> Binding<D> {
        self.done().single::<D>()
    }

    pub fn scoped<D: Inject>(self) -> Binding<D> {
        self.done().scoped::<D>()
    }

    pub fn factory<D: Inject>(self) -> Binding<D> {
        self.done().factory::<D>()
    }

    pub fn register<D: Inject>(self) -> Binding<D> {
        self.done().register::<D>()
    }

    pub fn multi(self, token: &Token, providers: Vec<Provider>) -> ModuleBuilder {
        self.done().multi(token, providers)
    }

    pub fn expects_external(self, key: impl Into<Key>) -> ModuleBuilder {
        self.done().expects_external(key)
    }

    pub fn keyed<S: Into<String>>(
        self,
        token: &Token,
        entries: impl IntoIterator<Item = (S, Provider)>,
    ) -> ModuleBuilder {
        self.done().keyed(token, entries)
    }

    pub fn build(self) -> Module {
        self.done().build()
    }
}

// =========================================================================
// Scope modules
// =========================================================================

/// Declarative description of a per-entity scope: an optional scoped root
/// to resolve on creation plus pre-constructed externals.
///
/// A parameterised scope module is a plain function capturing its runtime
/// parameters as externals:
///
/// ```rust
/// use marionette_di::{ScopeModule, Service, Token};
///
/// struct Player { name: String }
/// impl Service for Player {}
///
/// fn player_scope(token: &Token, player: Player) -> ScopeModule {
///     ScopeModule::builder().external(token, player).build()
/// }
/// # let _ = player_scope;
/// ```
pub struct ScopeModule {
    pub(crate) root: Option<Key>,
    pub(crate) externals: Vec<(Key, Arc<dyn Service>)>,
}

impl ScopeModule {
    /// Start accumulating a scope description.
    #[inline]
    pub fn builder() -> ScopeModuleBuilder {
        ScopeModuleBuilder::default()
    }

    /// A scope with no root and no externals.
    #[inline]
    pub fn empty() -> Self {
        Self {
            root: None,
            externals: Vec::new(),
        }
    }
}

impl std::fmt::Debug for ScopeModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeModule")
            .field("root", &self.root)
            .field("externals", &self.externals.len())
            .finish()
    }
}

/// Accumulator for [`ScopeModule`].
#[derive(Default)]
pub struct ScopeModuleBuilder {
    root: Option<Key>,
    externals: Vec<(Key, Arc<dyn Service>)>,
}

impl ScopeModuleBuilder {
    /// Declare the scoped root resolved right after the scope is created.
    /// The implementation must carry a scoped registration in the container.
    pub fn root<C: Inject>(mut self) -> Self {
        self.root = Some(Key::of::<C>());
        self
    }

    /// Provide a pre-constructed value under `key`.
    pub fn external<T: Service>(self, key: impl Into<Key>, value: T) -> Self {
        self.external_arc(key, Arc::new(value))
    }

    /// Provide an already-shared value under `key`.
    pub fn external_arc(mut self, key: impl Into<Key>, value: Arc<dyn Service>) -> Self {
        self.externals.push((key.into(), value));
        self
    }

    #[inline]
    pub fn build(self) -> ScopeModule {
        ScopeModule {
            root: self.root,
            externals: self.externals,
        }
    }
}

// =========================================================================
// Record helpers shared with the container
// =========================================================================

impl Record {
    /// Install the metadata of every provider this record mentions.
    pub(crate) fn install_metadata(&self, reflection: &Reflection) {
        match self {
            Record::Single(reg) => (reg.provider.install_meta)(reflection),
            Record::Multi { providers, .. } => {
                for provider in providers {
                    (provider.install_meta)(reflection);
                }
            }
            Record::Keyed { entries, .. } => {
                for (_, provider) in entries {
                    (provider.install_meta)(reflection);
                }
            }
            Record::External(_) => {}
        }
    }
}

/// Duplicate-key error helper shared by the container's ingest path.
pub(crate) fn duplicate(key: &Key) -> DiError {
    DiError::DuplicateRegistration { key: key.render() }
}
