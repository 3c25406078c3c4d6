use std::collections::VecDeque;
use std::sync::Arc;

use crate::instance::{InstanceState, SceneInstance};

/// Sizing policy for instance pools. Capacity grows by doubling (bounded)
/// after repeated exhaustion events and shrinks via periodic trims down to
/// the low-water mark.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Capacity of pools created implicitly on first return.
    pub initial_capacity: usize,
    /// Hard ceiling for capacity growth.
    pub max_capacity: usize,
    /// Consecutive exhaustions (checkout misses) before capacity doubles.
    pub growth_exhaustions: u32,
    /// Spares kept when trimming idle pools.
    pub low_water: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 4,
            max_capacity: 64,
            growth_exhaustions: 3,
            low_water: 4,
        }
    }
}

/// A reserve of spare, reset, detached instances for one source scene.
pub struct InstancePool {
    source_path: Arc<str>,
    capacity: usize,
    spares: VecDeque<SceneInstance>,
    exhaustion_streak: u32,
    total_exhaustions: u64,
}

impl InstancePool {
    pub fn new(source_path: &str, capacity: usize) -> Self {
        Self {
            source_path: Arc::from(source_path),
            capacity,
            spares: VecDeque::with_capacity(capacity),
            exhaustion_streak: 0,
            total_exhaustions: 0,
        }
    }

    pub fn source_path(&self) -> &str {
        &self.source_path
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn spare_count(&self) -> usize {
        self.spares.len()
    }

    pub fn total_exhaustions(&self) -> u64 {
        self.total_exhaustions
    }

    /// Pop a spare instance, if any. A miss is not an error — the caller
    /// creates a fresh instance instead.
    pub fn checkout(&mut self) -> Option<SceneInstance> {
        let instance = self.spares.pop_front();
        if instance.is_some() {
            self.exhaustion_streak = 0;
        }
        instance
    }

    /// Record a checkout miss. Returns the new capacity when the repeated
    /// exhaustions trigger a (bounded, doubling) growth step.
    pub fn note_exhausted(&mut self, config: &PoolConfig) -> Option<usize> {
        self.total_exhaustions += 1;
        self.exhaustion_streak += 1;
        if self.exhaustion_streak >= config.growth_exhaustions && self.capacity < config.max_capacity
        {
            self.exhaustion_streak = 0;
            self.capacity = (self.capacity * 2).clamp(1, config.max_capacity);
            log::info!(
                "pool `{}` grew to capacity {}",
                self.source_path,
                self.capacity
            );
            return Some(self.capacity);
        }
        None
    }

    /// Push a reset instance back. If the pool is at capacity the instance
    /// is handed back to the caller for destruction.
    pub fn checkin(&mut self, instance: SceneInstance) -> Result<(), SceneInstance> {
        debug_assert_eq!(instance.state(), InstanceState::Pooled);
        if self.spares.len() < self.capacity {
            self.spares.push_back(instance);
            Ok(())
        } else {
            Err(instance)
        }
    }

    /// Shrink idle spares down to `low_water`, returning the trimmed
    /// instances for destruction.
    pub fn trim(&mut self, low_water: usize) -> Vec<SceneInstance> {
        let mut trimmed = Vec::new();
        while self.spares.len() > low_water {
            if let Some(instance) = self.spares.pop_back() {
                trimmed.push(instance);
            }
        }
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SceneCache;
    use husky_core::NodeRegistry;
    use husky_io::MemoryLoader;
    use husky_scene::{SceneFile, SceneRecord};
    use std::sync::Arc as StdArc;

    fn pooled_instance(cache: &SceneCache, registry: &NodeRegistry) -> SceneInstance {
        let mut instance =
            SceneInstance::instantiate(cache, registry, "Bullet.scene", "Bullet").unwrap();
        instance.set_pool_origin(true);
        instance.set_state(InstanceState::Pooled);
        instance
    }

    fn fixture() -> (SceneCache, NodeRegistry) {
        let loader = MemoryLoader::new();
        loader.insert(
            "Bullet.scene",
            SceneFile::new("Bullet")
                .with_root(SceneRecord::new("Bullet", "Node2D"))
                .to_vec_pretty(),
        );
        (
            SceneCache::new(StdArc::new(loader)),
            NodeRegistry::with_builtins(),
        )
    }

    #[test]
    fn checkin_rejects_beyond_capacity() {
        let (cache, registry) = fixture();
        let mut pool = InstancePool::new("Bullet.scene", 2);
        assert!(pool.checkin(pooled_instance(&cache, &registry)).is_ok());
        assert!(pool.checkin(pooled_instance(&cache, &registry)).is_ok());
        let overflow = pool.checkin(pooled_instance(&cache, &registry));
        assert!(overflow.is_err());
        assert_eq!(pool.spare_count(), 2);
    }

    #[test]
    fn exhaustion_streak_triggers_bounded_doubling() {
        let (_cache, _registry) = fixture();
        let config = PoolConfig {
            growth_exhaustions: 2,
            max_capacity: 6,
            ..PoolConfig::default()
        };
        let mut pool = InstancePool::new("Bullet.scene", 2);
        assert_eq!(pool.note_exhausted(&config), None);
        assert_eq!(pool.note_exhausted(&config), Some(4));
        assert_eq!(pool.note_exhausted(&config), None);
        // Ceiling clamps the next doubling.
        assert_eq!(pool.note_exhausted(&config), Some(6));
        assert_eq!(pool.note_exhausted(&config), None);
        assert_eq!(pool.note_exhausted(&config), None);
        assert_eq!(pool.capacity(), 6);
        assert_eq!(pool.total_exhaustions(), 6);
    }

    #[test]
    fn hit_resets_exhaustion_streak() {
        let (cache, registry) = fixture();
        let config = PoolConfig {
            growth_exhaustions: 2,
            ..PoolConfig::default()
        };
        let mut pool = InstancePool::new("Bullet.scene", 4);
        pool.note_exhausted(&config);
        pool.checkin(pooled_instance(&cache, &registry)).unwrap();
        assert!(pool.checkout().is_some());
        // The miss streak restarted, one more miss is not enough to grow.
        assert_eq!(pool.note_exhausted(&config), None);
    }

    #[test]
    fn trim_keeps_low_water_spares() {
        let (cache, registry) = fixture();
        let mut pool = InstancePool::new("Bullet.scene", 8);
        for _ in 0..5 {
            pool.checkin(pooled_instance(&cache, &registry)).unwrap();
        }
        let trimmed = pool.trim(2);
        assert_eq!(trimmed.len(), 3);
        assert_eq!(pool.spare_count(), 2);
    }
}
