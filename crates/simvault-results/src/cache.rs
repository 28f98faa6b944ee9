use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use simvault_types::TokenKey;
use tracing::trace;

use crate::tokenizable::Tokenizable;

type Slot = Arc<Mutex<Option<Arc<dyn Tokenizable>>>>;

/// Reconstructed objects by key, shared by every referrer.
///
/// Each key has its own slot lock. The first caller to claim a slot builds
/// the object while holding it; concurrent callers for the same key wait
/// and then share that instance, so no key is ever reconstructed twice.
/// Different keys are built in parallel.
#[derive(Default)]
pub struct DecodeCache {
    slots: Mutex<HashMap<TokenKey, Slot>>,
}

impl DecodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &TokenKey) -> Slot {
        let mut slots = self.slots.lock().expect("lock poisoned");
        Arc::clone(slots.entry(key.clone()).or_default())
    }

    /// The cached object for `key`, waiting if it is being built.
    pub fn get(&self, key: &TokenKey) -> Option<Arc<dyn Tokenizable>> {
        let slot = self.slots.lock().expect("lock poisoned").get(key).cloned()?;
        let guard = slot.lock().expect("lock poisoned");
        guard.clone()
    }

    /// Return the cached object for `key`, or build it with `build`.
    ///
    /// A failed build leaves the slot empty so a later call may retry.
    /// `build` must not request `key` itself.
    pub fn get_or_try_insert<E, F>(
        &self,
        key: &TokenKey,
        build: F,
    ) -> Result<Arc<dyn Tokenizable>, E>
    where
        F: FnOnce() -> Result<Arc<dyn Tokenizable>, E>,
    {
        let slot = self.slot(key);
        let mut guard = slot.lock().expect("lock poisoned");
        if let Some(obj) = guard.as_ref() {
            trace!(%key, "decode cache hit");
            return Ok(Arc::clone(obj));
        }
        let obj = build()?;
        *guard = Some(Arc::clone(&obj));
        Ok(obj)
    }

    /// Seed the cache with an object already in memory.
    ///
    /// Returns the instance now cached, which is the existing one if `key`
    /// was already present.
    pub fn insert(&self, key: &TokenKey, obj: Arc<dyn Tokenizable>) -> Arc<dyn Tokenizable> {
        let slot = self.slot(key);
        let mut guard = slot.lock().expect("lock poisoned");
        Arc::clone(guard.get_or_insert(obj))
    }

    pub fn contains(&self, key: &TokenKey) -> bool {
        self.get(key).is_some()
    }

    /// Number of materialized objects.
    pub fn len(&self) -> usize {
        let slots: Vec<Slot> = self
            .slots
            .lock()
            .expect("lock poisoned")
            .values()
            .cloned()
            .collect();
        slots
            .iter()
            .filter(|slot| slot.lock().expect("lock poisoned").is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached object.
    pub fn clear(&self) {
        self.slots.lock().expect("lock poisoned").clear();
    }
}

impl std::fmt::Debug for DecodeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeCache")
            .field("slots", &self.slots.lock().expect("lock poisoned").len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizable::ShallowFields;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    struct Unit;

    impl Tokenizable for Unit {
        fn class_name(&self) -> &'static str {
            "Unit"
        }

        fn to_shallow(&self) -> ShallowFields {
            ShallowFields::new()
        }
    }

    fn key(s: &str) -> TokenKey {
        TokenKey::parse(s).unwrap()
    }

    #[test]
    fn builds_once_then_hits() {
        let cache = DecodeCache::new();
        let k = key("Unit-01");
        let first = cache
            .get_or_try_insert::<(), _>(&k, || Ok(Arc::new(Unit)))
            .unwrap();
        let second = cache
            .get_or_try_insert::<(), _>(&k, || panic!("must not rebuild"))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failed_build_leaves_slot_empty() {
        let cache = DecodeCache::new();
        let k = key("Unit-02");
        let err = cache.get_or_try_insert(&k, || Err("boom")).err();
        assert_eq!(err, Some("boom"));
        assert!(!cache.contains(&k));
        assert!(cache.is_empty());

        cache
            .get_or_try_insert::<(), _>(&k, || Ok(Arc::new(Unit)))
            .unwrap();
        assert!(cache.contains(&k));
    }

    #[test]
    fn insert_keeps_existing_instance() {
        let cache = DecodeCache::new();
        let k = key("Unit-03");
        let a: Arc<dyn Tokenizable> = Arc::new(Unit);
        let b: Arc<dyn Tokenizable> = Arc::new(Unit);
        let kept = cache.insert(&k, a.clone());
        assert!(Arc::ptr_eq(&kept, &a));
        let kept = cache.insert(&k, b);
        assert!(Arc::ptr_eq(&kept, &a));
    }

    #[test]
    fn clear_empties() {
        let cache = DecodeCache::new();
        cache.insert(&key("Unit-04"), Arc::new(Unit));
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get(&key("Unit-04")).is_none());
    }

    #[test]
    fn concurrent_callers_share_one_build() {
        let cache = Arc::new(DecodeCache::new());
        let builds = Arc::new(AtomicUsize::new(0));
        let k = key("Unit-05");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let builds = Arc::clone(&builds);
                let k = k.clone();
                thread::spawn(move || {
                    cache
                        .get_or_try_insert::<(), _>(&k, || {
                            builds.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(20));
                            Ok(Arc::new(Unit))
                        })
                        .unwrap()
                })
            })
            .collect();

        let objs: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().expect("thread should not panic"))
            .collect();
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(objs.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}
