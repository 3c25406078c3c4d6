use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use husky_core::NodeRegistry;
use husky_io::ResourceLoader;
use rayon::prelude::*;
use uuid::Uuid;

use crate::cache::{CacheConfig, SceneCache};
use crate::error::SceneError;
use crate::graph::DependencyGraph;
use crate::instance::{InstanceState, SceneInstance};
use crate::monitor::{MonitorConfig, PerformanceMonitor, Snapshot};
use crate::pool::{InstancePool, PoolConfig};

/// Everything a scene operation needs, passed explicitly instead of living
/// in a process-global: the resource loader, the template cache and the
/// node-class registry. Tests build as many isolated contexts as they like.
pub struct SceneContext {
    loader: Arc<dyn ResourceLoader>,
    cache: Arc<SceneCache>,
    registry: NodeRegistry,
}

impl SceneContext {
    pub fn new(loader: Arc<dyn ResourceLoader>) -> Self {
        Self::with_config(loader, CacheConfig::default())
    }

    pub fn with_config(loader: Arc<dyn ResourceLoader>, cache_config: CacheConfig) -> Self {
        let cache = Arc::new(SceneCache::with_config(loader.clone(), cache_config));
        Self {
            loader,
            cache,
            registry: NodeRegistry::with_builtins(),
        }
    }

    pub fn loader(&self) -> &Arc<dyn ResourceLoader> {
        &self.loader
    }

    pub fn cache(&self) -> &Arc<SceneCache> {
        &self.cache
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut NodeRegistry {
        &mut self.registry
    }
}

/// One entry of a `batch_create` call.
#[derive(Clone, Debug)]
pub struct CreateRequest {
    pub source_path: String,
    pub name: String,
    pub use_pool: bool,
}

impl CreateRequest {
    pub fn new(source_path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            name: name.into(),
            use_pool: false,
        }
    }

    pub fn pooled(mut self) -> Self {
        self.use_pool = true;
        self
    }
}

/// Completion callback for asynchronous creation. Runs on the owner thread
/// inside `drain_async`, with the manager available for follow-up work.
pub type CreateCallback = Box<dyn FnOnce(&mut SceneInstanceManager, Result<Uuid, SceneError>) + Send>;

struct AsyncCompletion {
    request: CreateRequest,
    callback: CreateCallback,
    result: Result<(), SceneError>,
}

/// Handle to an in-flight asynchronous creation. Canceling before the
/// background parse completes suppresses the instance and its callback;
/// canceling afterwards is a no-op.
pub struct AsyncHandle {
    canceled: Arc<AtomicBool>,
}

impl AsyncHandle {
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}

/// Orchestrates instance creation, destruction, pooling and batch/async
/// operations over one [`SceneContext`].
///
/// Threading: the manager lives on the owner thread and is the only place
/// trees are mutated. Background workers only read and parse scene files
/// (through the internally synchronized cache); their completions are
/// marshaled back here and applied inside `drain_async`.
pub struct SceneInstanceManager {
    ctx: SceneContext,
    graph: DependencyGraph,
    instances: HashMap<Uuid, SceneInstance>,
    by_scene: HashMap<String, HashSet<Uuid>>,
    pools: Mutex<HashMap<String, InstancePool>>,
    pool_config: PoolConfig,
    monitor: PerformanceMonitor,
    created_callbacks: Vec<Box<dyn Fn(Uuid) + Send>>,
    destroyed_callbacks: Vec<Box<dyn Fn(Uuid) + Send>>,
    async_tx: Sender<AsyncCompletion>,
    async_rx: Receiver<AsyncCompletion>,
}

impl SceneInstanceManager {
    pub fn new(ctx: SceneContext) -> Self {
        Self::with_configs(ctx, PoolConfig::default(), MonitorConfig::default())
    }

    pub fn with_configs(
        ctx: SceneContext,
        pool_config: PoolConfig,
        monitor_config: MonitorConfig,
    ) -> Self {
        let (async_tx, async_rx) = channel();
        Self {
            ctx,
            graph: DependencyGraph::new(),
            instances: HashMap::new(),
            by_scene: HashMap::new(),
            pools: Mutex::new(HashMap::new()),
            pool_config,
            monitor: PerformanceMonitor::with_config(monitor_config),
            created_callbacks: Vec::new(),
            destroyed_callbacks: Vec::new(),
            async_tx,
            async_rx,
        }
    }

    pub fn ctx(&self) -> &SceneContext {
        &self.ctx
    }

    pub fn ctx_mut(&mut self) -> &mut SceneContext {
        &mut self.ctx
    }

    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.monitor
    }

    pub fn monitor_mut(&mut self) -> &mut PerformanceMonitor {
        &mut self.monitor
    }

    // ---------------- creation / destruction ----------------

    /// Create an instance of `source_path`. With `use_pool`, a spare from
    /// the matching pool is preferred; a pool miss falls back to fresh
    /// creation (and counts toward pool growth).
    pub fn create_instance(
        &mut self,
        source_path: &str,
        name: &str,
        use_pool: bool,
    ) -> Result<Uuid, SceneError> {
        let started = Instant::now();
        self.preflight(source_path)?;

        let mut checked_out: Option<SceneInstance> = None;
        let mut exhausted_capacity: Option<usize> = None;
        if use_pool {
            let mut pools = self.pools.lock().expect("pool map lock poisoned");
            if let Some(pool) = pools.get_mut(source_path) {
                checked_out = pool.checkout();
                if checked_out.is_none() {
                    exhausted_capacity = Some(pool.capacity());
                    pool.note_exhausted(&self.pool_config);
                }
            }
        }
        if let Some(capacity) = exhausted_capacity {
            self.monitor.pool_exhausted(source_path, capacity);
        }

        let mut instance = match checked_out {
            Some(mut spare) => {
                spare.rename(name);
                spare
            }
            None => {
                let mut fresh = SceneInstance::instantiate(
                    &self.ctx.cache,
                    &self.ctx.registry,
                    source_path,
                    name,
                )?;
                fresh.set_pool_origin(use_pool);
                fresh
            }
        };
        instance.set_state(InstanceState::Active);
        self.monitor.record_instantiation(started.elapsed());
        Ok(self.register(instance))
    }

    /// Remove an instance. With `return_to_pool`, pool-origin instances are
    /// reset (overrides cleared, detached, connections severed) and pushed
    /// back if their pool has room; everything else is destroyed.
    pub fn destroy_instance(&mut self, id: Uuid, return_to_pool: bool) -> bool {
        let Some(mut instance) = self.instances.remove(&id) else {
            return false;
        };
        let source = instance.source_path().to_string();

        // Anything attached to the departing instance comes loose.
        let attached: Vec<Uuid> = self
            .instances
            .iter()
            .filter(|(_, other)| other.attached_to() == Some(id))
            .map(|(child, _)| *child)
            .collect();
        for child in attached {
            if let Some(other) = self.instances.get_mut(&child) {
                other.set_attached_to(None);
            }
        }

        let emptied = match self.by_scene.get_mut(&source) {
            Some(set) => {
                set.remove(&id);
                set.is_empty()
            }
            None => false,
        };
        if emptied {
            self.by_scene.remove(&source);
        }

        if return_to_pool && instance.is_pool_origin() && !instance.is_broken() {
            match instance.reset_for_pool(&self.ctx.cache, &self.ctx.registry) {
                Ok(()) => {
                    let mut pools = self.pools.lock().expect("pool map lock poisoned");
                    let pool = pools.entry(source.clone()).or_insert_with(|| {
                        InstancePool::new(&source, self.pool_config.initial_capacity)
                    });
                    match pool.checkin(instance) {
                        Ok(()) => return true,
                        Err(overflow) => instance = overflow,
                    }
                }
                Err(err) => {
                    log::warn!("failed to reset instance of `{source}` for pooling: {err}");
                }
            }
        }

        instance.set_state(InstanceState::Destroyed);
        drop(instance);
        for callback in &self.destroyed_callbacks {
            callback(id);
        }
        true
    }

    /// Produce a variant of an existing instance: same source, copied
    /// overrides, recorded lineage. The variant is registered as active.
    pub fn create_variant(&mut self, parent: Uuid, name: &str) -> Result<Uuid, SceneError> {
        let variant = {
            let parent_instance =
                self.instances
                    .get(&parent)
                    .ok_or_else(|| SceneError::SourceNotFound {
                        path: parent.to_string(),
                    })?;
            parent_instance.create_variant(&self.ctx.cache, &self.ctx.registry, name)?
        };
        let mut variant = variant;
        variant.set_state(InstanceState::Active);
        Ok(self.register(variant))
    }

    fn register(&mut self, instance: SceneInstance) -> Uuid {
        let id = instance.id();
        self.by_scene
            .entry(instance.source_path().to_string())
            .or_default()
            .insert(id);
        self.instances.insert(id, instance);
        for callback in &self.created_callbacks {
            callback(id);
        }
        id
    }

    // ---------------- batch / async ----------------

    /// Create many instances, grouping template work by source path so each
    /// distinct scene is loaded once. The result order matches the request
    /// order.
    pub fn batch_create(&mut self, requests: &[CreateRequest]) -> Vec<Result<Uuid, SceneError>> {
        let distinct: Vec<&str> = requests
            .iter()
            .map(|r| r.source_path.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        // Warm the cache in parallel; the per-path in-flight guard keeps
        // each file parsed exactly once.
        let cache = self.ctx.cache.clone();
        distinct.par_iter().for_each(|path| {
            let _ = cache.load(path);
        });

        requests
            .iter()
            .map(|request| self.create_instance(&request.source_path, &request.name, request.use_pool))
            .collect()
    }

    /// Start an asynchronous creation: file read and parse happen on a
    /// background thread, tree cloning and the callback run on the owner
    /// thread at the next `drain_async`.
    pub fn create_instance_async(
        &mut self,
        source_path: &str,
        name: &str,
        use_pool: bool,
        callback: impl FnOnce(&mut SceneInstanceManager, Result<Uuid, SceneError>) + Send + 'static,
    ) -> AsyncHandle {
        let canceled = Arc::new(AtomicBool::new(false));
        let handle = AsyncHandle {
            canceled: canceled.clone(),
        };
        let request = CreateRequest {
            source_path: source_path.to_string(),
            name: name.to_string(),
            use_pool,
        };
        let cache = self.ctx.cache.clone();
        let tx = self.async_tx.clone();
        thread::spawn(move || {
            let result = cache.load(&request.source_path).map(|_| ());
            if canceled.load(Ordering::SeqCst) {
                // Canceled before the parse finished; never completes.
                return;
            }
            let _ = tx.send(AsyncCompletion {
                request,
                callback: Box::new(callback),
                result,
            });
        });
        handle
    }

    /// Apply finished asynchronous creations. Must run on the owner thread;
    /// this is the only place async completions mutate instance state or
    /// fire callbacks. Returns the number of completions applied.
    pub fn drain_async(&mut self) -> usize {
        let completions: Vec<AsyncCompletion> = self.async_rx.try_iter().collect();
        let applied = completions.len();
        for completion in completions {
            let AsyncCompletion {
                request,
                callback,
                result,
            } = completion;
            let outcome = match result {
                Ok(()) => {
                    self.create_instance(&request.source_path, &request.name, request.use_pool)
                }
                Err(err) => Err(err),
            };
            callback(self, outcome);
        }
        applied
    }

    // ---------------- pools ----------------

    /// Pre-instantiate `capacity` reset instances of `source_path`.
    pub fn create_pool(&mut self, source_path: &str, capacity: usize) -> Result<(), SceneError> {
        self.preflight(source_path)?;
        let mut spares = Vec::with_capacity(capacity);
        for index in 0..capacity {
            let mut instance = SceneInstance::instantiate(
                &self.ctx.cache,
                &self.ctx.registry,
                source_path,
                &format!("pooled_{index}"),
            )?;
            instance.set_pool_origin(true);
            instance.set_state(InstanceState::Pooled);
            spares.push(instance);
        }

        let mut pools = self.pools.lock().expect("pool map lock poisoned");
        let pool = pools
            .entry(source_path.to_string())
            .or_insert_with(|| InstancePool::new(source_path, capacity));
        for spare in spares {
            if pool.checkin(spare).is_err() {
                break;
            }
        }
        Ok(())
    }

    /// Trim every pool's idle spares down to the low-water mark. Returns
    /// the number of instances destroyed.
    pub fn trim_pools(&mut self) -> usize {
        let mut destroyed = 0;
        let mut pools = self.pools.lock().expect("pool map lock poisoned");
        for pool in pools.values_mut() {
            for mut trimmed in pool.trim(self.pool_config.low_water) {
                trimmed.set_state(InstanceState::Destroyed);
                destroyed += 1;
            }
        }
        destroyed
    }

    pub fn pool_spares(&self, source_path: &str) -> usize {
        let pools = self.pools.lock().expect("pool map lock poisoned");
        pools
            .get(source_path)
            .map(|p| p.spare_count())
            .unwrap_or(0)
    }

    pub fn pool_capacity(&self, source_path: &str) -> Option<usize> {
        let pools = self.pools.lock().expect("pool map lock poisoned");
        pools.get(source_path).map(|p| p.capacity())
    }

    // ---------------- attachment ----------------

    /// Record that `child` hangs under `parent` in the composed scene.
    /// Rejects self-attachment and attachment cycles.
    pub fn attach_instance(&mut self, child: Uuid, parent: Uuid) -> bool {
        if child == parent || !self.instances.contains_key(&parent) {
            return false;
        }
        let mut cursor = Some(parent);
        while let Some(current) = cursor {
            if current == child {
                return false;
            }
            cursor = self
                .instances
                .get(&current)
                .and_then(|i| i.attached_to());
        }
        match self.instances.get_mut(&child) {
            Some(instance) => {
                instance.set_attached_to(Some(parent));
                true
            }
            None => false,
        }
    }

    pub fn detach_instance(&mut self, child: Uuid) {
        if let Some(instance) = self.instances.get_mut(&child) {
            instance.set_attached_to(None);
        }
    }

    // ---------------- reload / invalidation ----------------

    /// Invalidate the cached template for `path` and reload every live
    /// instance of it. Instances that fail to reload keep their prior state
    /// (soft failure). Returns the number reloaded successfully.
    pub fn reload_scene(&mut self, path: &str) -> usize {
        self.ctx.cache.invalidate(path);
        self.graph.remove_scene(path);
        if let Err(err) = self.preflight(path) {
            log::warn!("reload of `{path}` failed preflight: {err}");
            return 0;
        }

        let ids: Vec<Uuid> = self
            .by_scene
            .get(path)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        let mut reloaded = 0;
        for id in ids {
            let Some(instance) = self.instances.get_mut(&id) else {
                continue;
            };
            match instance.reload(&self.ctx.cache, &self.ctx.registry) {
                Ok(()) => reloaded += 1,
                Err(err) => log::warn!("instance {id} kept prior state: {err}"),
            }
        }
        reloaded
    }

    // ---------------- graph queries ----------------

    pub fn dependents(&self, path: &str) -> Vec<String> {
        self.graph.dependents(path)
    }

    pub fn impact_set(&self, path: &str) -> BTreeSet<String> {
        self.graph.impact_set(path)
    }

    pub fn missing_dependencies(&self, path: &str) -> Vec<String> {
        self.graph.missing(path)
    }

    /// Load metadata for `path` and register its reference edges (and,
    /// transitively, those of everything it references). Rejects cycles
    /// before any node tree is materialized.
    fn preflight(&mut self, path: &str) -> Result<(), SceneError> {
        let ctx = &self.ctx;
        let graph = &mut self.graph;
        let mut pending = vec![path.to_string()];
        let mut seen: HashSet<String> = HashSet::new();
        while let Some(current) = pending.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let metadata = ctx.cache.load_metadata(&current)?;
            let loader = &ctx.loader;
            graph.register_scene(&current, &metadata, |p| loader.file_exists(p))?;
            for reference in &metadata.references {
                if ctx.loader.file_exists(reference) {
                    pending.push(reference.clone());
                }
            }
        }
        Ok(())
    }

    // ---------------- introspection ----------------

    pub fn instance(&self, id: Uuid) -> Option<&SceneInstance> {
        self.instances.get(&id)
    }

    pub fn instance_mut(&mut self, id: Uuid) -> Option<&mut SceneInstance> {
        self.instances.get_mut(&id)
    }

    pub fn instances_of(&self, source_path: &str) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self
            .by_scene
            .get(source_path)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    pub fn active_count(&self) -> usize {
        self.instances.len()
    }

    pub fn pooled_count(&self) -> usize {
        let pools = self.pools.lock().expect("pool map lock poisoned");
        pools.values().map(|p| p.spare_count()).sum()
    }

    pub fn on_instance_created(&mut self, callback: impl Fn(Uuid) + Send + 'static) {
        self.created_callbacks.push(Box::new(callback));
    }

    pub fn on_instance_destroyed(&mut self, callback: impl Fn(Uuid) + Send + 'static) {
        self.destroyed_callbacks.push(Box::new(callback));
    }

    /// Record one monitor sample of the current population.
    pub fn sample(&mut self) -> Snapshot {
        let active = self.instances.len();
        let node_count: usize = self.instances.values().map(|i| i.node_count()).sum();
        let pooled = {
            let pools = self.pools.lock().expect("pool map lock poisoned");
            pools.values().map(|p| p.spare_count()).sum()
        };
        self.monitor.sample(active, pooled, node_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use husky_io::{MemoryLoader, ResourceLoader};
    use husky_scene::{SceneFile, SceneRecord};
    use serde_json::json;
    use std::time::Duration;

    fn context() -> SceneContext {
        let loader = MemoryLoader::new();
        loader.insert(
            "Enemy.scene",
            SceneFile::new("Enemy")
                .with_root(SceneRecord::new("Enemy", "Node2D").with_prop("health", json!(100)))
                .to_vec_pretty(),
        );
        loader.insert(
            "Bullet.scene",
            SceneFile::new("Bullet")
                .with_root(SceneRecord::new("Bullet", "Node2D"))
                .to_vec_pretty(),
        );
        SceneContext::new(Arc::new(loader))
    }

    #[test]
    fn create_and_destroy_tracks_instances() {
        let mut manager = SceneInstanceManager::new(context());
        let a = manager.create_instance("Enemy.scene", "E1", false).unwrap();
        let b = manager.create_instance("Enemy.scene", "E2", false).unwrap();
        assert_eq!(manager.active_count(), 2);
        assert_eq!(manager.instances_of("Enemy.scene").len(), 2);

        assert!(manager.destroy_instance(a, false));
        assert!(!manager.destroy_instance(a, false));
        assert_eq!(manager.active_count(), 1);
        assert_eq!(manager.instances_of("Enemy.scene"), vec![b]);
    }

    #[test]
    fn missing_source_aborts_only_that_call() {
        let mut manager = SceneInstanceManager::new(context());
        let ok = manager.create_instance("Enemy.scene", "E1", false).unwrap();
        let err = manager
            .create_instance("Ghost.scene", "G1", false)
            .unwrap_err();
        assert!(matches!(err, SceneError::SourceNotFound { .. }));
        // The earlier instance is unaffected.
        assert!(manager.instance(ok).is_some());
    }

    #[test]
    fn batch_create_preserves_request_order() {
        let mut manager = SceneInstanceManager::new(context());
        let requests = vec![
            CreateRequest::new("Enemy.scene", "E1"),
            CreateRequest::new("Bullet.scene", "B1"),
            CreateRequest::new("Ghost.scene", "G1"),
            CreateRequest::new("Enemy.scene", "E2"),
        ];
        let results = manager.batch_create(&requests);
        assert_eq!(results.len(), 4);
        assert_eq!(
            manager.instance(*results[0].as_ref().unwrap()).unwrap().name(),
            "E1"
        );
        assert_eq!(
            manager.instance(*results[1].as_ref().unwrap()).unwrap().name(),
            "B1"
        );
        assert!(results[2].is_err());
        assert_eq!(
            manager.instance(*results[3].as_ref().unwrap()).unwrap().name(),
            "E2"
        );
    }

    #[test]
    fn async_create_completes_on_drain() {
        let mut manager = SceneInstanceManager::new(context());
        let done = Arc::new(AtomicBool::new(false));
        let seen = done.clone();
        manager.create_instance_async("Enemy.scene", "E1", false, move |mgr, result| {
            let id = result.unwrap();
            assert!(mgr.instance(id).is_some());
            seen.store(true, Ordering::SeqCst);
        });

        // Wait for the background parse to land, then apply it.
        let mut applied = 0;
        for _ in 0..100 {
            applied = manager.drain_async();
            if applied > 0 {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(applied, 1);
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(manager.active_count(), 1);
    }

    #[test]
    fn async_create_reports_failures() {
        let mut manager = SceneInstanceManager::new(context());
        let failed = Arc::new(AtomicBool::new(false));
        let seen = failed.clone();
        manager.create_instance_async("Ghost.scene", "G1", false, move |_mgr, result| {
            assert!(matches!(result, Err(SceneError::SourceNotFound { .. })));
            seen.store(true, Ordering::SeqCst);
        });
        for _ in 0..100 {
            if manager.drain_async() > 0 {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert!(failed.load(Ordering::SeqCst));
        assert_eq!(manager.active_count(), 0);
    }

    /// Loader whose reads block until the test releases the gate, so the
    /// cancel flag is guaranteed to land before the background parse ends.
    struct GatedLoader {
        inner: MemoryLoader,
        gate: Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl ResourceLoader for GatedLoader {
        fn read_file(&self, path: &str) -> std::io::Result<Vec<u8>> {
            let _ = self.gate.lock().expect("gate lock poisoned").recv();
            self.inner.read_file(path)
        }

        fn file_exists(&self, path: &str) -> bool {
            self.inner.file_exists(path)
        }

        fn modified_stamp(&self, path: &str) -> Option<u64> {
            self.inner.modified_stamp(path)
        }
    }

    #[test]
    fn canceled_async_create_never_completes() {
        let inner = MemoryLoader::new();
        inner.insert(
            "Enemy.scene",
            SceneFile::new("Enemy")
                .with_root(SceneRecord::new("Enemy", "Node2D"))
                .to_vec_pretty(),
        );
        let (release, gate) = channel();
        let loader = GatedLoader {
            inner,
            gate: Mutex::new(gate),
        };
        let mut manager = SceneInstanceManager::new(SceneContext::new(Arc::new(loader)));

        let handle = manager.create_instance_async("Enemy.scene", "E1", false, |_mgr, _result| {
            panic!("canceled creation must not fire its callback");
        });
        // Cancel while the worker is still blocked inside the read.
        handle.cancel();
        assert!(handle.is_canceled());
        release.send(()).unwrap();

        thread::sleep(Duration::from_millis(50));
        assert_eq!(manager.drain_async(), 0);
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn attachment_is_cleared_when_parent_is_destroyed() {
        let mut manager = SceneInstanceManager::new(context());
        let parent = manager.create_instance("Enemy.scene", "P", false).unwrap();
        let child = manager.create_instance("Bullet.scene", "C", false).unwrap();
        assert!(manager.attach_instance(child, parent));
        assert!(!manager.attach_instance(parent, child)); // would cycle
        assert_eq!(manager.instance(child).unwrap().attached_to(), Some(parent));

        manager.destroy_instance(parent, false);
        assert_eq!(manager.instance(child).unwrap().attached_to(), None);
    }

    #[test]
    fn reload_scene_refreshes_live_instances() {
        let loader = Arc::new(MemoryLoader::new());
        loader.insert(
            "Enemy.scene",
            SceneFile::new("Enemy")
                .with_root(SceneRecord::new("Enemy", "Node2D").with_prop("health", json!(100)))
                .to_vec_pretty(),
        );
        let mut manager = SceneInstanceManager::new(SceneContext::new(loader.clone()));
        let id = manager.create_instance("Enemy.scene", "E1", false).unwrap();
        manager
            .instance_mut(id)
            .unwrap()
            .apply_property_override("Enemy/health", 50);

        // Ship a new template version.
        loader.insert(
            "Enemy.scene",
            SceneFile::new("Enemy")
                .with_root(
                    SceneRecord::new("Enemy", "Node2D")
                        .with_prop("health", json!(100))
                        .with_prop("speed", json!(7)),
                )
                .to_vec_pretty(),
        );
        assert_eq!(manager.reload_scene("Enemy.scene"), 1);

        let instance = manager.instance(id).unwrap();
        let tree = instance.tree();
        let enemy = tree.find_from(tree.root(), "Enemy").unwrap();
        // New template property picked up, override still applied.
        assert_eq!(tree.prop(enemy, "speed").and_then(|v| v.as_i64()), Some(7));
        assert_eq!(tree.prop(enemy, "health").and_then(|v| v.as_i64()), Some(50));
    }

    #[test]
    fn lifecycle_callbacks_fire() {
        let mut manager = SceneInstanceManager::new(context());
        let created = Arc::new(AtomicBool::new(false));
        let destroyed = Arc::new(AtomicBool::new(false));
        let c = created.clone();
        let d = destroyed.clone();
        manager.on_instance_created(move |_| c.store(true, Ordering::SeqCst));
        manager.on_instance_destroyed(move |_| d.store(true, Ordering::SeqCst));

        let id = manager.create_instance("Enemy.scene", "E1", false).unwrap();
        assert!(created.load(Ordering::SeqCst));
        manager.destroy_instance(id, false);
        assert!(destroyed.load(Ordering::SeqCst));
    }

    #[test]
    fn sample_reports_population() {
        let mut manager = SceneInstanceManager::new(context());
        manager.create_instance("Enemy.scene", "E1", false).unwrap();
        manager.create_pool("Bullet.scene", 2).unwrap();
        let snapshot = manager.sample();
        assert_eq!(snapshot.active, 1);
        assert_eq!(snapshot.pooled, 2);
        assert!(snapshot.node_count >= 2);
    }
}
