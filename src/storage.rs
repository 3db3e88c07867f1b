//! Storage for registrations and cached instances
//!
//! `DashMap` with `ahash` keeps lookups cheap on the hot resolve path; a
//! side vector preserves registration order for the launch pass and the
//! validation report.

use crate::error::DiResult;
use crate::key::Key;
use crate::registration::{Registration, duplicate};
use crate::service::Service;
use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// The root registry of single/scoped/factory registrations.
///
/// Insertion order is observable: `launch` starts singletons in the order
/// their registrations arrived.
pub(crate) struct RegistrationTable {
    entries: DashMap<Key, Registration, RandomState>,
    order: Mutex<Vec<Key>>,
}

impl RegistrationTable {
    pub fn new() -> Self {
        Self {
            entries: DashMap::with_hasher(RandomState::new()),
            order: Mutex::new(Vec::new()),
        }
    }

    /// Insert a registration; a second insertion for the same key fails.
    pub fn insert(&self, registration: Registration) -> DiResult<()> {
        let key = registration.key.clone();
        if self.entries.contains_key(&key) {
            return Err(duplicate(&key));
        }
        self.entries.insert(key.clone(), registration);
        self.order.lock().push(key);
        Ok(())
    }

    #[inline]
    pub fn get(&self, key: &Key) -> Option<Registration> {
        self.entries.get(key).map(|r| r.value().clone())
    }

    #[inline]
    pub fn contains(&self, key: &Key) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys in the order their registrations were inserted.
    pub fn keys_in_order(&self) -> Vec<Key> {
        self.order.lock().clone()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Cache of constructed shared instances, keyed like the registrations.
pub(crate) struct InstanceCache {
    entries: DashMap<Key, Arc<dyn Service>, RandomState>,
}

impl InstanceCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::with_hasher(RandomState::new()),
        }
    }

    #[inline]
    pub fn get(&self, key: &Key) -> Option<Arc<dyn Service>> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    #[inline]
    pub fn insert(&self, key: Key, instance: Arc<dyn Service>) {
        self.entries.insert(key, instance);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inject::{ConstructArgs, Inject};
    use crate::registration::ProviderRecord;
    use crate::service::Lifetime;

    struct A;
    impl Service for A {}
    impl Inject for A {
        fn construct(_: &mut ConstructArgs) -> DiResult<Self> {
            Ok(Self)
        }
    }

    struct B;
    impl Service for B {}
    impl Inject for B {
        fn construct(_: &mut ConstructArgs) -> DiResult<Self> {
            Ok(Self)
        }
    }

    fn registration_of<T: Inject>(lifetime: Lifetime) -> Registration {
        let provider = ProviderRecord::of::<T>();
        Registration {
            key: provider.impl_key(),
            provider,
            lifetime,
        }
    }

    #[test]
    fn duplicate_insertion_fails() {
        let table = RegistrationTable::new();
        table.insert(registration_of::<A>(Lifetime::Singleton)).unwrap();
        let err = table
            .insert(registration_of::<A>(Lifetime::Scoped))
            .unwrap_err();
        assert!(err.to_string().contains("duplicate registration"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn keys_preserve_insertion_order() {
        let table = RegistrationTable::new();
        table.insert(registration_of::<B>(Lifetime::Singleton)).unwrap();
        table.insert(registration_of::<A>(Lifetime::Singleton)).unwrap();
        assert_eq!(table.keys_in_order(), vec![Key::of::<B>(), Key::of::<A>()]);
    }

    #[test]
    fn instance_cache_returns_same_arc() {
        let cache = InstanceCache::new();
        let instance: Arc<dyn Service> = Arc::new(A);
        cache.insert(Key::of::<A>(), Arc::clone(&instance));
        let fetched = cache.get(&Key::of::<A>()).unwrap();
        assert!(Arc::ptr_eq(&fetched, &instance));
    }
}
