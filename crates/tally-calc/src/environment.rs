//! Execution environment: which persistent cache and parallel backend to
//! use.
//!
//! ```yaml
//! cache:
//!   type: filesystem
//!   path: .tally-cache
//! backend:
//!   type: rayon
//!   threads: 8
//! transient_max_bytes: 268435456
//! ```
//!
//! Every key is optional. A sibling `<stem>.local.yml` overrides top-level
//! keys.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tally_core::{CacheBackend, Error, Result};
use tally_data::TransientCacheConfig;
use tally_model::load_config;

use crate::backend::{ParallelBackend, RayonBackend, SerialBackend};
use crate::batch::BatchScheduler;
use crate::persistent::{FileSystemCache, MemoryCache};

fn default_cache_path() -> PathBuf {
    PathBuf::from(".tally-cache")
}

fn default_transient_max_bytes() -> usize {
    TransientCacheConfig::default().max_bytes
}

/// Persistent cache selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheConfig {
    /// One file per entry under `path`. Relative paths are resolved against
    /// the configuration file's directory.
    Filesystem {
        /// Cache directory.
        #[serde(default = "default_cache_path")]
        path: PathBuf,
    },
    /// Process-local map; nothing persists across runs.
    Memory,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig::Filesystem { path: default_cache_path() }
    }
}

/// Parallel backend selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Run batches on the calling thread.
    Serial,
    /// Run batches on a rayon pool; `threads = 0` uses the global pool.
    Rayon {
        /// Worker count.
        #[serde(default)]
        threads: usize,
    },
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Rayon { threads: 0 }
    }
}

/// Environment configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentConfig {
    /// Persistent cache.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Parallel backend.
    #[serde(default)]
    pub backend: BackendConfig,
    /// Byte bound of each batch's transient table cache.
    #[serde(default = "default_transient_max_bytes")]
    pub transient_max_bytes: usize,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            backend: BackendConfig::default(),
            transient_max_bytes: default_transient_max_bytes(),
        }
    }
}

impl EnvironmentConfig {
    /// Load from a YAML file (with local override), or the defaults when
    /// `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let mut config: Self = load_config(path)?;
        if let CacheConfig::Filesystem { path: cache } = &mut config.cache
            && cache.is_relative()
            && let Some(dir) = path.parent()
        {
            *cache = dir.join(&*cache);
        }
        tracing::debug!(path = %path.display(), config = ?config, "loaded environment");
        Ok(config)
    }

    /// Parse a YAML document (no local override, paths kept as written).
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml_ng::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Instantiate the persistent cache.
    pub fn persistent_cache(&self) -> Arc<dyn CacheBackend> {
        match &self.cache {
            CacheConfig::Filesystem { path } => Arc::new(FileSystemCache::new(path)),
            CacheConfig::Memory => Arc::new(MemoryCache::new()),
        }
    }

    /// Instantiate the parallel backend.
    pub fn parallel_backend(&self) -> Arc<dyn ParallelBackend> {
        match self.backend {
            BackendConfig::Serial => Arc::new(SerialBackend),
            BackendConfig::Rayon { threads } => Arc::new(RayonBackend::with_threads(threads)),
        }
    }

    /// A scheduler over the configured backend and transient cache bound.
    pub fn scheduler(&self) -> BatchScheduler {
        BatchScheduler::new(self.parallel_backend()).with_transient(TransientCacheConfig {
            max_bytes: self.transient_max_bytes,
            enabled: self.transient_max_bytes > 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(tag: &str) -> PathBuf {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
        let dir = std::env::temp_dir().join(format!("tally_{}_{}_{}", tag, std::process::id(), nanos));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn defaults() {
        let env = EnvironmentConfig::load(None).unwrap();
        assert_eq!(env.cache, CacheConfig::Filesystem { path: PathBuf::from(".tally-cache") });
        assert_eq!(env.backend, BackendConfig::Rayon { threads: 0 });
        assert_eq!(env.parallel_backend().name(), "rayon");
        assert_eq!(env.persistent_cache().name(), "filesystem");
    }

    #[test]
    fn parses_yaml() {
        let env = EnvironmentConfig::from_yaml(
            "cache:\n  type: memory\nbackend:\n  type: rayon\n  threads: 2\n",
        )
        .unwrap();
        assert_eq!(env.cache, CacheConfig::Memory);
        assert_eq!(env.backend, BackendConfig::Rayon { threads: 2 });
        assert_eq!(env.persistent_cache().name(), "memory");
        assert!(EnvironmentConfig::from_yaml("unknown: 1\n").is_err());
    }

    #[test]
    fn local_override_and_relative_paths() {
        let dir = temp_dir("env");
        let path = dir.join("environment.yml");
        std::fs::write(&path, "cache:\n  type: filesystem\n  path: cache\nbackend:\n  type: rayon\n")
            .unwrap();
        std::fs::write(dir.join("environment.local.yml"), "backend:\n  type: serial\n").unwrap();
        let env = EnvironmentConfig::load(Some(&path)).unwrap();
        assert_eq!(env.backend, BackendConfig::Serial);
        assert_eq!(env.cache, CacheConfig::Filesystem { path: dir.join("cache") });
        assert_eq!(env.scheduler().backend_name(), "serial");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_file_is_config_error() {
        let missing = std::env::temp_dir().join("tally_no_such_environment.yml");
        assert!(matches!(EnvironmentConfig::load(Some(&missing)), Err(Error::Config(_))));
    }
}
