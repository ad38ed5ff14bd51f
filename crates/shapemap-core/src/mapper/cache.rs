//! Mapper cache
//!
//! Instances are keyed by (source shape, target shape, override identity,
//! plan kind). Lookups are lock-free; creation is serialized so that one key
//! never gets two instances, even under contention.

use super::MapperInstance;
use crate::error::Result;
use crate::plan::{OverridesId, PlanKind};
use crate::shape::ShapeId;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MapperKey {
    pub source: ShapeId,
    pub target: ShapeId,
    pub overrides: OverridesId,
    pub kind: PlanKind,
}

impl fmt::Display for MapperKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} [{:?}, {}]", self.source, self.target, self.kind, self.overrides)
    }
}

/// Decides which entries leave the cache
pub trait EvictionPolicy: Send + Sync {
    /// Called after `key` was inserted, with the new entry count. Returns the keys to drop.
    fn on_insert(&self, key: &MapperKey, len: usize) -> Vec<MapperKey>;

    fn on_clear(&self) {}
}

/// Keep everything
#[derive(Debug, Default)]
pub struct Unbounded;

impl EvictionPolicy for Unbounded {
    fn on_insert(&self, _key: &MapperKey, _len: usize) -> Vec<MapperKey> {
        Vec::new()
    }
}

/// Keep at most `capacity` entries, dropping the oldest first
pub struct CapacityLimit {
    capacity: usize,
    order: Mutex<VecDeque<MapperKey>>,
}

impl CapacityLimit {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: Mutex::new(VecDeque::new()),
        }
    }
}

impl EvictionPolicy for CapacityLimit {
    fn on_insert(&self, key: &MapperKey, len: usize) -> Vec<MapperKey> {
        let mut order = self.order.lock();
        order.push_back(key.clone());
        let mut evicted = Vec::new();
        let mut remaining = len;
        while remaining > self.capacity {
            match order.pop_front() {
                Some(oldest) => evicted.push(oldest),
                None => break,
            }
            remaining -= 1;
        }
        evicted
    }

    fn on_clear(&self) {
        self.order.lock().clear();
    }
}

pub struct MapperCache {
    entries: DashMap<MapperKey, Arc<MapperInstance>>,
    create_lock: Mutex<()>,
    eviction: Box<dyn EvictionPolicy>,
}

impl MapperCache {
    pub fn new(eviction: Box<dyn EvictionPolicy>) -> Self {
        Self {
            entries: DashMap::new(),
            create_lock: Mutex::new(()),
            eviction,
        }
    }

    pub fn get(&self, key: &MapperKey) -> Option<Arc<MapperInstance>> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    /// Cached instance for `key`, creating it with `create` on a miss.
    /// Failed creations are not cached.
    pub fn get_or_create<F>(&self, key: MapperKey, create: F) -> Result<Arc<MapperInstance>>
    where
        F: FnOnce() -> Result<Arc<MapperInstance>>,
    {
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }

        let _guard = self.create_lock.lock();
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }

        let created = create()?;
        self.entries.insert(key.clone(), created.clone());
        for evicted in self.eviction.on_insert(&key, self.entries.len()) {
            self.entries.remove(&evicted);
            tracing::debug!(key = %evicted, "Evicted mapper");
        }
        tracing::debug!(key = %key, cached = self.entries.len(), "Created mapper");
        Ok(created)
    }

    pub fn contains(&self, key: &MapperKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry; handles already given out keep working
    pub fn clear(&self) {
        let _guard = self.create_lock.lock();
        self.entries.clear();
        self.eviction.on_clear();
    }
}

impl Default for MapperCache {
    fn default() -> Self {
        Self::new(Box::new(Unbounded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapperConfig;
    use crate::error::Error;
    use crate::mapper::CompileScheduler;
    use crate::plan::Overrides;
    use crate::tier::fixtures::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    fn key(variant: u64) -> MapperKey {
        MapperKey {
            source: ShapeId::of::<Person>("Person", variant),
            target: ShapeId::of::<Profile>("Profile", 0),
            overrides: OverridesId::NONE,
            kind: PlanKind::Transform,
        }
    }

    fn make() -> Result<Arc<MapperInstance>> {
        let config = MapperConfig::interpreted_only();
        let scheduler = Arc::new(CompileScheduler::new(config.scheduler.clone()));
        Ok(MapperInstance::new(
            plan(&Overrides::<Person, Profile>::new(), PlanKind::Transform),
            Arc::new(config),
            scheduler,
        ))
    }

    #[test]
    fn test_one_instance_per_key_under_contention() {
        let cache = Arc::new(MapperCache::default());
        let created = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let created = created.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    cache
                        .get_or_create(key(0), || {
                            created.fetch_add(1, Ordering::SeqCst);
                            make()
                        })
                        .unwrap()
                })
            })
            .collect();

        let instances: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert!(instances.iter().all(|i| Arc::ptr_eq(i, &instances[0])));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_failures_are_not_cached() {
        let cache = MapperCache::default();
        let err = cache
            .get_or_create(key(0), || Err(Error::configuration("nope")))
            .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(!cache.contains(&key(0)));
        assert!(cache.get_or_create(key(0), make).is_ok());
    }

    #[test]
    fn test_capacity_limit_drops_oldest() {
        let cache = MapperCache::new(Box::new(CapacityLimit::new(2)));
        for variant in 0..3 {
            cache.get_or_create(key(variant), make).unwrap();
        }
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&key(0)));
        assert!(cache.contains(&key(2)));

        cache.clear();
        assert!(cache.is_empty());
    }
}
