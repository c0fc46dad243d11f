//! Persistent result caching.
//!
//! [`Cached`] wraps a calculation and stores its results in a
//! [`CacheBackend`] keyed by a fingerprint of (namespace, calculation,
//! process, region). Backend failures fail the call; they are never treated
//! as misses.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use tally_core::{
    CacheBackend, Error, Fingerprint, FingerprintBuilder, Fingerprinted, Result, Value,
};
use tally_model::{Process, Region};

use crate::calculation::{Calculation, Parallelizable};
use crate::context::CallContext;

/// Return the cached value for `key`, or compute, store and return it.
pub fn get_or_compute<F>(backend: &dyn CacheBackend, key: &Fingerprint, thunk: F) -> Result<Value>
where
    F: FnOnce() -> Result<Value>,
{
    if let Some(bytes) = backend.get(key)? {
        tracing::debug!(backend = backend.name(), key = ?key, "persistent cache hit");
        return serde_json::from_slice(&bytes)
            .map_err(|e| Error::Cache(format!("corrupt entry {}: {}", key, e)));
    }
    tracing::debug!(backend = backend.name(), key = ?key, "persistent cache miss");
    let value = thunk()?;
    let bytes = serde_json::to_vec(&value)
        .map_err(|e| Error::Cache(format!("cannot encode entry {}: {}", key, e)))?;
    backend.put(key, &bytes)?;
    Ok(value)
}

/// Custom cache-key function.
pub type KeyFn = Arc<dyn Fn(&Process, &Region) -> Fingerprint + Send + Sync>;

/// Persistent-cache middleware.
///
/// The key is computed from the call's process and region only; load hints
/// and transient caches never reach it.
pub struct Cached<C> {
    inner: C,
    backend: Arc<dyn CacheBackend>,
    namespace: String,
    key_fn: Option<KeyFn>,
}

impl<C: Calculation> Cached<C> {
    /// Cache `inner` in `backend` under the default namespace.
    pub fn new(inner: C, backend: Arc<dyn CacheBackend>) -> Self {
        Self { inner, backend, namespace: "tally".to_string(), key_fn: None }
    }

    /// Set the key namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Replace the default key with a custom function.
    pub fn with_key_fn(mut self, f: KeyFn) -> Self {
        self.key_fn = Some(f);
        self
    }

    /// The wrapped calculation.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Cache key for a call.
    pub fn key(&self, process: &Process, region: &Region) -> Fingerprint {
        if let Some(f) = &self.key_fn {
            return f(process, region);
        }
        let mut fp = FingerprintBuilder::new("cached");
        fp.str(&self.namespace).nested(&self.inner).nested(process).nested(region);
        fp.finish()
    }
}

impl<C: Calculation> Fingerprinted for Cached<C> {
    fn write_fingerprint(&self, fp: &mut FingerprintBuilder) {
        self.inner.write_fingerprint(fp);
    }
}

impl<C: Calculation> Calculation for Cached<C> {
    fn call_with(&self, process: &Process, region: &Region, ctx: &CallContext<'_>) -> Result<Value> {
        let key = self.key(process, region);
        get_or_compute(self.backend.as_ref(), &key, || self.inner.call_with(process, region, ctx))
    }
}

impl<C: Parallelizable> Parallelizable for Cached<C> {
    fn mock(&self, process: &Process, region: &Region) -> Result<Value> {
        self.inner.mock(process, region)
    }

    fn map_key(&self, process: &Process, region: &Region) -> Fingerprint {
        self.inner.map_key(process, region)
    }

    fn properties(&self, process: &Process, region: &Region) -> BTreeSet<String> {
        self.inner.properties(process, region)
    }
}

// ── Backends ───────────────────────────────────────────────────

/// Durable store: one JSON file per key, named by its hex fingerprint.
///
/// Writes go to a temporary file renamed into place, so readers never see a
/// partial entry.
#[derive(Debug, Clone)]
pub struct FileSystemCache {
    root: PathBuf,
}

impl FileSystemCache {
    /// Store entries under `root` (created on first write).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Cache directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, key: &Fingerprint) -> PathBuf {
        self.root.join(format!("{}.json", key.to_hex()))
    }
}

impl CacheBackend for FileSystemCache {
    fn get(&self, key: &Fingerprint) -> Result<Option<Vec<u8>>> {
        match std::fs::read(self.path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Cache(format!("cannot read entry {}: {}", key, e))),
        }
    }

    fn put(&self, key: &Fingerprint, value: &[u8]) -> Result<()> {
        std::fs::create_dir_all(&self.root).map_err(|e| {
            Error::Cache(format!("cannot create cache dir {}: {}", self.root.display(), e))
        })?;
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or(0);
        let tmp = self.root.join(format!("{}.{}.{}.tmp", key.to_hex(), std::process::id(), nanos));
        std::fs::write(&tmp, value)
            .and_then(|()| std::fs::rename(&tmp, self.path(key)))
            .map_err(|e| {
                let _ = std::fs::remove_file(&tmp);
                Error::Cache(format!("cannot write entry {}: {}", key, e))
            })
    }

    fn name(&self) -> &str {
        "filesystem"
    }
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryCache {
    map: Mutex<HashMap<Fingerprint, Vec<u8>>>,
}

impl MemoryCache {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.map.lock().expect("memory cache mutex poisoned").len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheBackend for MemoryCache {
    fn get(&self, key: &Fingerprint) -> Result<Option<Vec<u8>>> {
        Ok(self.map.lock().expect("memory cache mutex poisoned").get(key).cloned())
    }

    fn put(&self, key: &Fingerprint, value: &[u8]) -> Result<()> {
        self.map.lock().expect("memory cache mutex poisoned").insert(*key, value.to_vec());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
