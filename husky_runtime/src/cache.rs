use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::{Arc, Condvar, Mutex};

use husky_io::ResourceLoader;
use husky_scene::{SceneFile, SceneMetadata};

use crate::error::SceneError;

/// Eviction bounds for the template cache. Conservative defaults; both
/// limits are enforced together with least-recently-used ordering.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub max_estimated_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 64,
            max_estimated_bytes: 32 * 1024 * 1024,
        }
    }
}

/// A parsed, immutable scene template. Instances clone from this; it is
/// never mutated after registration.
pub struct SceneTemplate {
    pub path: Arc<str>,
    pub file: SceneFile,
    pub metadata: SceneMetadata,
    pub estimated_bytes: usize,
}

impl std::fmt::Debug for SceneTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneTemplate")
            .field("path", &self.path)
            .field("estimated_bytes", &self.estimated_bytes)
            .finish_non_exhaustive()
    }
}

struct CacheEntry {
    template: Arc<SceneTemplate>,
    last_used: u64,
}

struct CacheInner {
    entries: HashMap<Arc<str>, CacheEntry>,
    in_flight: HashSet<String>,
    tick: u64,
    total_bytes: usize,
}

/// Scene template cache. Templates are parsed on first request and cached
/// by path; population is serialized per path, so concurrent requests for
/// the same unloaded path wait for a single parse instead of duplicating
/// work. Reads of a populated entry are cheap Arc clones.
pub struct SceneCache {
    loader: Arc<dyn ResourceLoader>,
    config: CacheConfig,
    inner: Mutex<CacheInner>,
    parse_done: Condvar,
}

impl SceneCache {
    pub fn new(loader: Arc<dyn ResourceLoader>) -> Self {
        Self::with_config(loader, CacheConfig::default())
    }

    pub fn with_config(loader: Arc<dyn ResourceLoader>, config: CacheConfig) -> Self {
        Self {
            loader,
            config,
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                in_flight: HashSet::new(),
                tick: 0,
                total_bytes: 0,
            }),
            parse_done: Condvar::new(),
        }
    }

    pub fn loader(&self) -> &Arc<dyn ResourceLoader> {
        &self.loader
    }

    /// Fetch the template for `path`, parsing it on first request.
    pub fn load(&self, path: &str) -> Result<Arc<SceneTemplate>, SceneError> {
        let mut inner = self.inner.lock().expect("scene cache lock poisoned");
        loop {
            if inner.entries.contains_key(path) {
                inner.tick += 1;
                let tick = inner.tick;
                let entry = inner.entries.get_mut(path).expect("entry vanished");
                entry.last_used = tick;
                return Ok(entry.template.clone());
            }
            if inner.in_flight.contains(path) {
                inner = self
                    .parse_done
                    .wait(inner)
                    .expect("scene cache lock poisoned");
                continue;
            }
            inner.in_flight.insert(path.to_string());
            break;
        }
        drop(inner);

        let result = self.parse(path);

        let mut inner = self.inner.lock().expect("scene cache lock poisoned");
        inner.in_flight.remove(path);
        if let Ok(template) = &result {
            inner.tick += 1;
            let tick = inner.tick;
            inner.total_bytes += template.estimated_bytes;
            inner.entries.insert(
                template.path.clone(),
                CacheEntry {
                    template: template.clone(),
                    last_used: tick,
                },
            );
            self.evict_over_budget(&mut inner);
        }
        self.parse_done.notify_all();
        result
    }

    /// Dependency information for `path` without materializing any node
    /// tree. Shares the template cache with `load`.
    pub fn load_metadata(&self, path: &str) -> Result<SceneMetadata, SceneError> {
        Ok(self.load(path)?.metadata.clone())
    }

    /// Drop the cached template so the next request reparses the file.
    pub fn invalidate(&self, path: &str) {
        let mut inner = self.inner.lock().expect("scene cache lock poisoned");
        if let Some(entry) = inner.entries.remove(path) {
            inner.total_bytes = inner
                .total_bytes
                .saturating_sub(entry.template.estimated_bytes);
            log::debug!("invalidated cached scene `{path}`");
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        let inner = self.inner.lock().expect("scene cache lock poisoned");
        inner.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock().expect("scene cache lock poisoned");
        inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn estimated_bytes(&self) -> usize {
        let inner = self.inner.lock().expect("scene cache lock poisoned");
        inner.total_bytes
    }

    fn parse(&self, path: &str) -> Result<Arc<SceneTemplate>, SceneError> {
        let bytes = self.loader.read_file(path).map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                SceneError::SourceNotFound {
                    path: path.to_string(),
                }
            } else {
                SceneError::Load {
                    path: path.to_string(),
                    reason: err.to_string(),
                }
            }
        })?;
        let file = SceneFile::from_slice(&bytes).map_err(|err| SceneError::Load {
            path: path.to_string(),
            reason: err.to_string(),
        })?;
        let metadata = SceneMetadata::scan(path, &file, self.loader.modified_stamp(path));
        Ok(Arc::new(SceneTemplate {
            path: Arc::from(path),
            file,
            metadata,
            estimated_bytes: bytes.len(),
        }))
    }

    fn evict_over_budget(&self, inner: &mut CacheInner) {
        while inner.entries.len() > self.config.max_entries
            || inner.total_bytes > self.config.max_estimated_bytes
        {
            let Some(victim) = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(path, _)| path.clone())
            else {
                break;
            };
            if let Some(entry) = inner.entries.remove(&victim) {
                inner.total_bytes = inner
                    .total_bytes
                    .saturating_sub(entry.template.estimated_bytes);
                log::debug!("evicted cached scene `{victim}` (LRU)");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use husky_io::MemoryLoader;
    use husky_scene::SceneRecord;

    fn scene_bytes(name: &str) -> Vec<u8> {
        SceneFile::new(name)
            .with_root(SceneRecord::new(name, "Node2D"))
            .to_vec_pretty()
    }

    fn cache_with(paths: &[&str]) -> SceneCache {
        let loader = MemoryLoader::new();
        for path in paths {
            loader.insert(path, scene_bytes("S"));
        }
        SceneCache::new(Arc::new(loader))
    }

    #[test]
    fn load_parses_once_and_caches() {
        let cache = cache_with(&["a.scene"]);
        let first = cache.load("a.scene").unwrap();
        let second = cache.load("a.scene").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn missing_file_is_source_not_found() {
        let cache = cache_with(&[]);
        match cache.load("ghost.scene") {
            Err(SceneError::SourceNotFound { path }) => assert_eq!(path, "ghost.scene"),
            other => panic!("expected SourceNotFound, got {other:?}"),
        }
    }

    #[test]
    fn malformed_file_is_load_error() {
        let loader = MemoryLoader::new();
        loader.insert("bad.scene", b"{broken".to_vec());
        let cache = SceneCache::new(Arc::new(loader));
        match cache.load("bad.scene") {
            Err(SceneError::Load { path, .. }) => assert_eq!(path, "bad.scene"),
            other => panic!("expected Load error, got {other:?}"),
        }
    }

    #[test]
    fn invalidate_forces_reparse() {
        let loader = Arc::new(MemoryLoader::new());
        loader.insert("a.scene", scene_bytes("First"));
        let cache = SceneCache::new(loader.clone());
        assert_eq!(cache.load("a.scene").unwrap().file.name, "First");

        loader.insert("a.scene", scene_bytes("Second"));
        // Still the cached parse until invalidated.
        assert_eq!(cache.load("a.scene").unwrap().file.name, "First");
        cache.invalidate("a.scene");
        assert_eq!(cache.load("a.scene").unwrap().file.name, "Second");
    }

    #[test]
    fn lru_eviction_respects_entry_budget() {
        let loader = MemoryLoader::new();
        for i in 0..4 {
            loader.insert(&format!("s{i}.scene"), scene_bytes("S"));
        }
        let cache = SceneCache::with_config(
            Arc::new(loader),
            CacheConfig {
                max_entries: 2,
                max_estimated_bytes: usize::MAX,
            },
        );
        cache.load("s0.scene").unwrap();
        cache.load("s1.scene").unwrap();
        cache.load("s0.scene").unwrap(); // refresh s0
        cache.load("s2.scene").unwrap(); // evicts s1
        assert!(cache.contains("s0.scene"));
        assert!(!cache.contains("s1.scene"));
        assert!(cache.contains("s2.scene"));
    }

    #[test]
    fn concurrent_loads_share_one_parse() {
        let loader = MemoryLoader::new();
        loader.insert("shared.scene", scene_bytes("Shared"));
        let cache = Arc::new(SceneCache::new(Arc::new(loader)));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || cache.load("shared.scene").map(|t| t.file.name.clone()))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), "Shared");
        }
        assert_eq!(cache.len(), 1);
    }
}
