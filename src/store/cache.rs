//! Process-shared key/value cache and the TrustCache view over it.

use crate::protocol::models::TrustStatus;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Any process-shared key/value store; no persistence required.
pub trait KeyValueCache: Send + Sync {
    /// Read a value.
    fn get_value(&self, key: &str) -> Option<String>;

    /// Write a value.
    fn set_value(&self, key: &str, value: String);

    /// Remove a value.
    fn delete_value(&self, key: &str);
}

/// In-process cache backed by a `RwLock<HashMap>`.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueCache for MemoryCache {
    fn get_value(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set_value(&self, key: &str, value: String) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }

    fn delete_value(&self, key: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

/// Point-in-time read of the two TrustCache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustSnapshot {
    /// Cached verdict.
    pub status: TrustStatus,
    /// Epoch seconds of the last check; 0 if never.
    pub last_check_ts: i64,
}

/// The ephemeral trust verdict shared by every egress decision.
///
/// Two independent keys; a briefly disagreeing pair costs at most one
/// extra revalidation.
#[derive(Clone)]
pub struct TrustCache {
    cache: Arc<dyn KeyValueCache>,
    status_key: String,
    last_check_key: String,
}

impl TrustCache {
    /// View over `cache` with keys under `namespace`.
    pub fn new(cache: Arc<dyn KeyValueCache>, namespace: &str) -> Self {
        Self {
            cache,
            status_key: format!("{}:license:status", namespace),
            last_check_key: format!("{}:license:last_check_ts", namespace),
        }
    }

    /// Key holding the status.
    pub fn status_key(&self) -> &str {
        &self.status_key
    }

    /// Key holding the last check timestamp.
    pub fn last_check_key(&self) -> &str {
        &self.last_check_key
    }

    /// Cached verdict; `Unknown` when absent.
    pub fn status(&self) -> TrustStatus {
        self.cache
            .get_value(&self.status_key)
            .map(|value| TrustStatus::parse(&value))
            .unwrap_or_default()
    }

    /// Epoch seconds of the last check; 0 when absent or unreadable.
    pub fn last_check_ts(&self) -> i64 {
        self.cache
            .get_value(&self.last_check_key)
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Read both keys.
    pub fn snapshot(&self) -> TrustSnapshot {
        TrustSnapshot {
            status: self.status(),
            last_check_ts: self.last_check_ts(),
        }
    }

    /// Write the verdict and the check timestamp.
    pub fn record(&self, status: TrustStatus, epoch_seconds: i64) {
        self.cache
            .set_value(&self.status_key, status.as_str().to_string());
        self.cache
            .set_value(&self.last_check_key, epoch_seconds.to_string());
    }

    /// Drop both keys; the next read is `Unknown`.
    pub fn clear(&self) {
        self.cache.delete_value(&self.status_key);
        self.cache.delete_value(&self.last_check_key);
    }
}

impl std::fmt::Debug for TrustCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustCache")
            .field("status_key", &self.status_key)
            .field("last_check_key", &self.last_check_key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trust() -> TrustCache {
        TrustCache::new(Arc::new(MemoryCache::new()), "helpdesk")
    }

    #[test]
    fn test_keys_are_namespaced() {
        let trust = trust();
        assert_eq!(trust.status_key(), "helpdesk:license:status");
        assert_eq!(trust.last_check_key(), "helpdesk:license:last_check_ts");
    }

    #[test]
    fn test_empty_cache_reads_unknown() {
        let snapshot = trust().snapshot();
        assert_eq!(snapshot.status, TrustStatus::Unknown);
        assert_eq!(snapshot.last_check_ts, 0);
    }

    #[test]
    fn test_record_and_clear() {
        let trust = trust();
        trust.record(TrustStatus::Grace, 1_700_000_000);
        assert_eq!(
            trust.snapshot(),
            TrustSnapshot {
                status: TrustStatus::Grace,
                last_check_ts: 1_700_000_000
            }
        );
        trust.clear();
        assert_eq!(trust.status(), TrustStatus::Unknown);
    }

    #[test]
    fn test_garbage_values_are_tolerated() {
        let cache = Arc::new(MemoryCache::new());
        let trust = TrustCache::new(cache.clone(), "ns");
        cache.set_value("ns:license:status", "bogus".to_string());
        cache.set_value("ns:license:last_check_ts", "yesterday".to_string());
        assert_eq!(trust.status(), TrustStatus::Unknown);
        assert_eq!(trust.last_check_ts(), 0);
    }

    #[test]
    fn test_concurrent_readers_and_writers() {
        let trust = trust();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let trust = trust.clone();
                std::thread::spawn(move || {
                    for n in 0..200 {
                        if i % 2 == 0 {
                            trust.record(TrustStatus::Valid, n);
                        } else {
                            let _ = trust.snapshot();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(trust.status(), TrustStatus::Valid);
    }
}
