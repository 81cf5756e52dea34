//! Sharded on-disk key-value store
//!
//! Each key is one file, placed under the directories produced by the
//! configured [`KeyTransform`]. Writes go to a hidden temporary file that
//! is renamed over the target, so a reader never sees a half-written
//! record. Recently read values are kept in a size-bounded cache.

use crate::transform::{block_transform, KeyTransform};
use crate::StoreError;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, trace};

/// Default read cache budget (1 MiB)
pub const DEFAULT_CACHE_SIZE: usize = 1024 * 1024;

const TEMP_PREFIX: &str = ".tmp-";

/// Disk store options
#[derive(Clone)]
pub struct DiskStoreOptions {
    /// Root directory of the store
    pub base_path: PathBuf,
    /// Key to directory segments
    pub transform: KeyTransform,
    /// Upper bound on cached value bytes (0 disables the cache)
    pub cache_size_max: usize,
}

impl DiskStoreOptions {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            transform: std::sync::Arc::new(block_transform),
            cache_size_max: DEFAULT_CACHE_SIZE,
        }
    }

    pub fn with_transform(mut self, transform: KeyTransform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_cache_size(mut self, bytes: usize) -> Self {
        self.cache_size_max = bytes;
        self
    }
}

impl std::fmt::Debug for DiskStoreOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskStoreOptions")
            .field("base_path", &self.base_path)
            .field("cache_size_max", &self.cache_size_max)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct ReadCache {
    entries: HashMap<String, Vec<u8>>,
    size: usize,
    /// Bumped on every invalidation; a fill started under an older
    /// generation may hold a superseded value
    generation: u64,
}

impl ReadCache {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: &str, value: &[u8], max: usize, seen_generation: u64) {
        if value.len() > max || seen_generation != self.generation {
            return;
        }
        self.remove(key);

        while self.size + value.len() > max {
            let Some(victim) = self.entries.keys().next().cloned() else {
                break;
            };
            self.remove(&victim);
        }

        self.size += value.len();
        self.entries.insert(key.to_string(), value.to_vec());
    }

    fn remove(&mut self, key: &str) {
        if let Some(old) = self.entries.remove(key) {
            self.size -= old.len();
        }
    }

    fn invalidate(&mut self, key: &str) {
        self.remove(key);
        self.generation += 1;
    }
}

/// Filesystem-backed key-value store
pub struct DiskStore {
    base_path: PathBuf,
    transform: KeyTransform,
    cache_size_max: usize,
    cache: Mutex<ReadCache>,
    temp_counter: AtomicU64,
}

impl DiskStore {
    /// Open a store, creating the base directory if needed
    pub fn open(options: DiskStoreOptions) -> Result<Self, StoreError> {
        fs::create_dir_all(&options.base_path)?;
        debug!(path = %options.base_path.display(), "Opened disk store");

        Ok(Self {
            base_path: options.base_path,
            transform: options.transform,
            cache_size_max: options.cache_size_max,
            cache: Mutex::new(ReadCache::default()),
            temp_counter: AtomicU64::new(0),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Durably write `value` under `key`, replacing any previous value
    ///
    /// The file and every directory entry leading to it are synced before
    /// this returns.
    pub fn write(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let dir = self.dir_for(key)?;
        let created = self.create_dirs(&dir)?;

        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        let temp_path = dir.join(format!("{}{}-{}", TEMP_PREFIX, std::process::id(), n));

        let result =
            write_synced(&temp_path, value).and_then(|()| fs::rename(&temp_path, dir.join(key)));
        if let Err(e) = result {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        // The new value is visible from here on, even if a sync below fails
        self.lock_cache().invalidate(key);

        sync_dir(&dir)?;
        for parent in created {
            sync_dir(&parent)?;
        }
        trace!(key, bytes = value.len(), "Wrote record");
        Ok(())
    }

    /// Read the value stored under `key`
    pub fn read(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let generation = {
            let cache = self.lock_cache();
            if let Some(value) = cache.get(key) {
                return Ok(value);
            }
            cache.generation
        };

        let path = self.dir_for(key)?.join(key);
        let value = fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(key.to_string()),
            _ => StoreError::Io(e),
        })?;

        if self.cache_size_max > 0 {
            self.lock_cache()
                .insert(key, &value, self.cache_size_max, generation);
        }
        Ok(value)
    }

    pub fn has(&self, key: &str) -> bool {
        self.dir_for(key)
            .map(|dir| dir.join(key).is_file())
            .unwrap_or(false)
    }

    /// Lazily walk the store for keys starting with `prefix`
    pub fn keys_with_prefix(&self, prefix: &str) -> Keys {
        Keys::new(&self.base_path, prefix)
    }

    fn dir_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;

        let mut dir = self.base_path.clone();
        for segment in (self.transform)(key) {
            if segment.is_empty()
                || segment == "."
                || segment == ".."
                || segment.contains(['/', '\\', '\0'])
            {
                return Err(StoreError::InvalidKey(key.to_string()));
            }
            dir.push(segment);
        }
        Ok(dir)
    }

    /// Create `dir` and its missing ancestors below the base path
    ///
    /// Returns the directories whose entries changed and need a sync,
    /// innermost first.
    fn create_dirs(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut missing = Vec::new();
        let mut current = dir;
        while current != self.base_path.as_path() && !current.is_dir() {
            missing.push(current.to_path_buf());
            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }

        fs::create_dir_all(dir)?;

        // The parent of each created directory gained an entry
        Ok(missing
            .iter()
            .filter_map(|created| created.parent().map(Path::to_path_buf))
            .collect())
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, ReadCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() || key.starts_with('.') || key.contains(['/', '\\', '\0']) {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

fn write_synced(path: &Path, value: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(value)?;
    file.sync_all()
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

// Directory handles can't be synced this way outside unix
#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

/// Iterator over stored keys, produced by [`DiskStore::keys_with_prefix`]
///
/// Walks the directory tree as it is consumed. A single pass only.
pub struct Keys {
    prefix: String,
    stack: Vec<fs::ReadDir>,
    pending: Option<StoreError>,
}

impl Keys {
    fn new(base_path: &Path, prefix: &str) -> Self {
        let (stack, pending) = match fs::read_dir(base_path) {
            Ok(dir) => (vec![dir], None),
            Err(e) => (Vec::new(), Some(StoreError::Io(e))),
        };

        Self {
            prefix: prefix.to_string(),
            stack,
            pending,
        }
    }
}

impl Iterator for Keys {
    type Item = Result<String, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.pending.take() {
            return Some(Err(err));
        }

        loop {
            let dir = self.stack.last_mut()?;
            let entry = match dir.next() {
                None => {
                    self.stack.pop();
                    continue;
                }
                Some(Err(e)) => return Some(Err(e.into())),
                Some(Ok(entry)) => entry,
            };

            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(e) => return Some(Err(e.into())),
            };

            if file_type.is_dir() {
                match fs::read_dir(entry.path()) {
                    Ok(child) => self.stack.push(child),
                    Err(e) => return Some(Err(e.into())),
                }
                continue;
            }

            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with('.') || !name.starts_with(&self.prefix) {
                continue;
            }
            return Some(Ok(name.to_string()));
        }
    }
}
