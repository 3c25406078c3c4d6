use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::UNIX_EPOCH;

/// Read-only access to scene assets. Loaders are passed explicitly into the
/// scene context — there is no process-global root.
///
/// Paths use the `res://` convention for project-relative assets; a loader
/// decides how that maps onto its backing store.
pub trait ResourceLoader: Send + Sync {
    fn read_file(&self, path: &str) -> io::Result<Vec<u8>>;

    fn file_exists(&self, path: &str) -> bool;

    /// Monotonic change stamp for a file (mtime seconds on disk), used for
    /// cache metadata. None when the backing store has no stamp.
    fn modified_stamp(&self, path: &str) -> Option<u64>;
}

/// Loader over a project directory on disk. `res://x` resolves to
/// `<root>/res/x`, everything else is taken relative to the root.
pub struct DiskLoader {
    root: PathBuf,
}

impl DiskLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        if let Some(stripped) = path.strip_prefix("res://") {
            let mut pb = self.root.clone();
            pb.push("res");
            pb.push(stripped);
            pb
        } else {
            let mut pb = self.root.clone();
            pb.push(path);
            pb
        }
    }
}

impl ResourceLoader for DiskLoader {
    fn read_file(&self, path: &str) -> io::Result<Vec<u8>> {
        fs::read(self.resolve(path))
    }

    fn file_exists(&self, path: &str) -> bool {
        self.resolve(path).is_file()
    }

    fn modified_stamp(&self, path: &str) -> Option<u64> {
        let meta = fs::metadata(self.resolve(path)).ok()?;
        let modified = meta.modified().ok()?;
        modified
            .duration_since(UNIX_EPOCH)
            .ok()
            .map(|d| d.as_secs())
    }
}

/// In-memory loader for tests and tooling. Writes bump a per-file stamp so
/// cache invalidation paths can be exercised without touching disk.
#[derive(Default)]
pub struct MemoryLoader {
    files: RwLock<HashMap<String, (Vec<u8>, u64)>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &str, contents: impl Into<Vec<u8>>) {
        let mut files = self.files.write().expect("memory loader lock poisoned");
        let stamp = files.get(path).map(|(_, s)| s + 1).unwrap_or(1);
        files.insert(path.to_string(), (contents.into(), stamp));
    }

    pub fn remove(&self, path: &str) {
        let mut files = self.files.write().expect("memory loader lock poisoned");
        files.remove(path);
    }
}

impl ResourceLoader for MemoryLoader {
    fn read_file(&self, path: &str) -> io::Result<Vec<u8>> {
        let files = self.files.read().expect("memory loader lock poisoned");
        files
            .get(path)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("no such file: {path}"))
            })
    }

    fn file_exists(&self, path: &str) -> bool {
        let files = self.files.read().expect("memory loader lock poisoned");
        files.contains_key(path)
    }

    fn modified_stamp(&self, path: &str) -> Option<u64> {
        let files = self.files.read().expect("memory loader lock poisoned");
        files.get(path).map(|(_, stamp)| *stamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_loader_roundtrip() {
        let loader = MemoryLoader::new();
        loader.insert("scenes/Main.scene", b"{}".to_vec());
        assert!(loader.file_exists("scenes/Main.scene"));
        assert_eq!(loader.read_file("scenes/Main.scene").unwrap(), b"{}");
        assert!(loader.read_file("scenes/Missing.scene").is_err());
    }

    #[test]
    fn memory_loader_bumps_stamp_on_overwrite() {
        let loader = MemoryLoader::new();
        loader.insert("a.scene", b"1".to_vec());
        let first = loader.modified_stamp("a.scene").unwrap();
        loader.insert("a.scene", b"2".to_vec());
        let second = loader.modified_stamp("a.scene").unwrap();
        assert!(second > first);
    }

    #[test]
    fn disk_loader_resolves_res_prefix() {
        let dir = std::env::temp_dir().join(format!("husky_io_test_{}", std::process::id()));
        let res = dir.join("res");
        fs::create_dir_all(&res).unwrap();
        fs::write(res.join("icon.scene"), b"data").unwrap();

        let loader = DiskLoader::new(&dir);
        assert!(loader.file_exists("res://icon.scene"));
        assert_eq!(loader.read_file("res://icon.scene").unwrap(), b"data");
        assert!(loader.modified_stamp("res://icon.scene").is_some());
        assert!(!loader.file_exists("res://missing.scene"));

        let _ = fs::remove_dir_all(&dir);
    }
}
