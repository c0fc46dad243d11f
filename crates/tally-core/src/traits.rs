//! Core traits for Tally
//!
//! Storage backends are injected behind these traits so the calculation
//! layer never depends on a concrete persistence mechanism.

use crate::Result;
use crate::fingerprint::Fingerprint;

/// Key/value store used by the persistent cache.
///
/// Implementations must be safe to share between threads. Values are opaque
/// serialized bytes; keys are content fingerprints, so concurrent writers of
/// the same key always write the same bytes.
pub trait CacheBackend: Send + Sync {
    /// Look up a value. `Ok(None)` is a miss; `Err` means the store is unusable.
    fn get(&self, key: &Fingerprint) -> Result<Option<Vec<u8>>>;

    /// Store a value.
    fn put(&self, key: &Fingerprint, value: &[u8]) -> Result<()>;

    /// Backend name (e.g. "filesystem", "memory")
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct DummyBackend {
        map: Mutex<HashMap<Fingerprint, Vec<u8>>>,
    }

    impl CacheBackend for DummyBackend {
        fn get(&self, key: &Fingerprint) -> Result<Option<Vec<u8>>> {
            Ok(self.map.lock().unwrap().get(key).cloned())
        }

        fn put(&self, key: &Fingerprint, value: &[u8]) -> Result<()> {
            self.map.lock().unwrap().insert(*key, value.to_vec());
            Ok(())
        }

        fn name(&self) -> &str {
            "Dummy"
        }
    }

    #[test]
    fn test_dummy_backend() {
        let backend = DummyBackend { map: Mutex::new(HashMap::new()) };
        let key = Fingerprint::of_bytes(b"k");
        assert_eq!(backend.name(), "Dummy");
        assert!(backend.get(&key).unwrap().is_none());
        backend.put(&key, b"v").unwrap();
        assert_eq!(backend.get(&key).unwrap().as_deref(), Some(&b"v"[..]));
    }
}
