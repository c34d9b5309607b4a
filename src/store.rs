/// Temporal content store with append-only change history.
///
/// Unlike a conventional key-value table that overwrites values, this
/// store keeps the complete history of every key:
///
/// - Every save appends a new change record
/// - Each record links to its predecessor by content hash
/// - Time-travel queries walk the history backward
/// - Identical contents share one allocation (content-addressed dedup)
///
/// The store is thread-safe and uses DashMap for sharded concurrent
/// access: readers only block writers for the short critical section
/// around a single key's shard.
use crate::error::{AgramaError, AgramaResult};
use crate::types::{content_hash, ChangeRecord};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;

/// Point-in-time copy of the store's persisted state.
///
/// The serialization format is the crate's own serde shape; an injected
/// persistence backend decides where the bytes go. Restoring rebuilds
/// the content-addressed dedup table, so identical values share one
/// allocation again afterwards.
#[derive(Debug, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Latest record per key
    pub current: HashMap<String, ChangeRecord>,
    /// Complete history per key (oldest → newest)
    pub history: HashMap<String, Vec<ChangeRecord>>,
}

/// Temporal key→value store.
///
/// Three primary structures:
///
/// 1. **Current table**: latest change record per key
/// 2. **History log**: ordered records per key (oldest → newest)
/// 3. **Value store**: contents deduplicated by blake3 hash
///
/// Retention is unbounded by default; a non-zero `retention` caps each
/// key's history at that many records, dropping the oldest.
#[derive(Debug)]
pub struct TemporalStore {
    /// Current (latest) record for each key
    current: DashMap<String, ChangeRecord>,

    /// Complete history for each key (ordered oldest → newest)
    history: DashMap<String, Vec<ChangeRecord>>,

    /// Deduplicated content storage: content_hash → shared value
    values: DashMap<String, Arc<JsonValue>>,

    /// Per-key history cap (0 = unbounded)
    retention: usize,
}

impl TemporalStore {
    /// Create a new store with unbounded history retention.
    pub fn new() -> Self {
        Self::with_retention(0)
    }

    /// Create a new store capping each key's history at `retention`
    /// records (0 = unbounded).
    pub fn with_retention(retention: usize) -> Self {
        Self {
            current: DashMap::new(),
            history: DashMap::new(),
            values: DashMap::new(),
            retention,
        }
    }

    /// Append a change record for `key` and update the current table.
    ///
    /// Saves to the same key are strictly ordered by wall-clock timestamp;
    /// the history entry and current-table update happen under the key's
    /// history shard lock so readers always observe a completed save.
    ///
    /// # Errors
    ///
    /// `EmptyString` if the key has zero length.
    pub fn save(&self, key: impl Into<String>, value: JsonValue) -> AgramaResult<ChangeRecord> {
        let key = key.into();
        if key.is_empty() {
            return Err(AgramaError::EmptyString { field: "key".into() });
        }

        let hash = content_hash(&value);

        // Same content shares one Arc allocation
        let shared = self
            .values
            .entry(hash.clone())
            .or_insert_with(|| Arc::new(value))
            .clone();

        // Append under the history shard lock; the timestamp is taken
        // inside the critical section so per-key history stays ordered
        // even under concurrent writers.
        let mut entry = self.history.entry(key.clone()).or_default();
        let timestamp = Utc::now();
        let previous = entry.last().map(|r| r.content_hash.clone());
        let record = ChangeRecord::new(shared, timestamp, hash, previous);
        entry.push(record.clone());
        if self.retention > 0 && entry.len() > self.retention {
            let excess = entry.len() - self.retention;
            entry.drain(0..excess);
        }
        // Publish the current value before releasing the history shard so
        // a concurrent writer cannot reorder current behind history.
        self.current.insert(key, record.clone());
        drop(entry);

        Ok(record)
    }

    /// Get the current (latest) record for a key.
    pub fn get(&self, key: &str) -> AgramaResult<ChangeRecord> {
        self.current
            .get(key)
            .map(|r| r.clone())
            .ok_or_else(|| AgramaError::KeyNotFound { key: key.to_string() })
    }

    /// Whether a key currently exists.
    pub fn exists(&self, key: &str) -> bool {
        self.current.contains_key(key)
    }

    /// Get up to `limit` change records for a key, most recent first.
    ///
    /// # Errors
    ///
    /// `KeyNotFound` only if the key never existed. A key whose history
    /// was truncated by retention still returns its surviving records.
    pub fn history(&self, key: &str, limit: usize) -> AgramaResult<Vec<ChangeRecord>> {
        let entry = self
            .history
            .get(key)
            .ok_or_else(|| AgramaError::KeyNotFound { key: key.to_string() })?;
        Ok(entry.iter().rev().take(limit).cloned().collect())
    }

    /// Get the record current at a specific point in time (time travel).
    ///
    /// Walks the history backward and returns the most recent record with
    /// timestamp ≤ `timestamp`.
    pub fn get_at(&self, key: &str, timestamp: DateTime<Utc>) -> AgramaResult<ChangeRecord> {
        let entry = self
            .history
            .get(key)
            .ok_or_else(|| AgramaError::KeyNotFound { key: key.to_string() })?;

        entry
            .iter()
            .rev()
            .find(|r| r.timestamp <= timestamp)
            .cloned()
            .ok_or_else(|| AgramaError::NoValueAtTimestamp {
                key: key.to_string(),
                timestamp: timestamp.timestamp_millis(),
            })
    }

    /// Number of distinct keys currently stored.
    pub fn key_count(&self) -> usize {
        self.current.len()
    }

    /// Total number of change records across all keys.
    pub fn version_count(&self) -> usize {
        self.history.iter().map(|entry| entry.value().len()).sum()
    }

    /// Number of unique contents in the value store.
    ///
    /// Lower than [`version_count`](Self::version_count) means the dedup
    /// is saving memory.
    pub fn unique_value_count(&self) -> usize {
        self.values.len()
    }

    /// All current keys with the given prefix, sorted.
    ///
    /// Used by the link/ops sidecar scans (`_link:`, `_ops:`) and by
    /// temporal search.
    pub fn list_keys(&self, prefix: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .current
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }

    /// Create a consistent snapshot of current values and history.
    ///
    /// Writes may continue while the snapshot is taken; they are simply
    /// not included.
    pub fn snapshot(&self) -> StoreSnapshot {
        let current: HashMap<String, ChangeRecord> = self
            .current
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        let history: HashMap<String, Vec<ChangeRecord>> = self
            .history
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        StoreSnapshot { current, history }
    }

    /// Rebuild a store from a snapshot, re-establishing value dedup.
    pub fn from_snapshot(snapshot: StoreSnapshot, retention: usize) -> Self {
        let store = Self::with_retention(retention);

        // Share one allocation per distinct content hash
        let dedup = |record: ChangeRecord| -> ChangeRecord {
            let shared = store
                .values
                .entry(record.content_hash.clone())
                .or_insert_with(|| record.content.clone())
                .clone();
            ChangeRecord::new(shared, record.timestamp, record.content_hash, record.previous)
        };

        for (key, records) in snapshot.history {
            let deduped: Vec<ChangeRecord> = records.into_iter().map(&dedup).collect();
            store.history.insert(key, deduped);
        }
        for (key, record) in snapshot.current {
            store.current.insert(key, dedup(record));
        }
        store
    }

    /// Drop a key entirely: current value and history.
    ///
    /// Reserved for internal rotation of `_ops:` sidecar logs; user keys
    /// keep their append-only history.
    pub(crate) fn purge(&self, key: &str) {
        self.current.remove(key);
        self.history.remove(key);
    }

    /// Scan change records across all keys within a time range.
    ///
    /// Returns `(key, record)` pairs with `start ≤ timestamp ≤ end`,
    /// ordered newest first then by key. Reserved sidecar keys are
    /// included only when `include_reserved` is set; the search primitive
    /// scans user data only.
    pub fn scan_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        include_reserved: bool,
        limit: usize,
    ) -> Vec<(String, ChangeRecord)> {
        let mut hits: Vec<(String, ChangeRecord)> = Vec::new();
        for entry in self.history.iter() {
            if !include_reserved && crate::types::is_reserved(entry.key()) {
                continue;
            }
            for record in entry.value().iter().rev() {
                if record.timestamp > end {
                    continue;
                }
                if record.timestamp < start {
                    break;
                }
                hits.push((entry.key().clone(), record.clone()));
            }
        }
        hits.sort_by(|a, b| b.1.timestamp.cmp(&a.1.timestamp).then_with(|| a.0.cmp(&b.0)));
        hits.truncate(limit);
        hits
    }
}

impl Default for TemporalStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_save_and_get() {
        let store = TemporalStore::new();
        let value = json!({"name": "Alice", "age": 30});

        store.save("alice", value.clone()).unwrap();
        let record = store.get("alice").unwrap();

        assert_eq!(record.content(), &value);
    }

    #[test]
    fn test_empty_key_rejected() {
        let store = TemporalStore::new();
        let result = store.save("", json!(1));
        assert!(matches!(result, Err(AgramaError::EmptyString { .. })));
    }

    #[test]
    fn test_get_nonexistent_key() {
        let store = TemporalStore::new();
        let result = store.get("nonexistent");
        assert!(matches!(result, Err(AgramaError::KeyNotFound { .. })));
    }

    #[test]
    fn test_history_most_recent_first() {
        let store = TemporalStore::new();

        store.save("clicks", json!(1)).unwrap();
        thread::sleep(Duration::from_millis(5));
        store.save("clicks", json!(2)).unwrap();
        thread::sleep(Duration::from_millis(5));
        store.save("clicks", json!(3)).unwrap();

        let history = store.history("clicks", 10).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].content(), &json!(3));
        assert_eq!(history[2].content(), &json!(1));

        // Timestamps are non-decreasing going backward in the returned order
        assert!(history[0].timestamp() >= history[1].timestamp());
        assert!(history[1].timestamp() >= history[2].timestamp());
    }

    #[test]
    fn test_history_respects_limit() {
        let store = TemporalStore::new();
        for i in 0..10 {
            store.save("k", json!(i)).unwrap();
        }
        let history = store.history("k", 3).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].content(), &json!(9));
    }

    #[test]
    fn test_history_missing_key_is_error() {
        let store = TemporalStore::new();
        assert!(matches!(
            store.history("nope", 10),
            Err(AgramaError::KeyNotFound { .. })
        ));
    }

    #[test]
    fn test_causal_chain() {
        let store = TemporalStore::new();

        let v1 = store.save("doc", json!({"rev": 1})).unwrap();
        let v2 = store.save("doc", json!({"rev": 2})).unwrap();

        assert_eq!(v2.previous(), Some(v1.content_hash()));
        assert_eq!(store.get("doc").unwrap().content_hash(), v2.content_hash());
    }

    #[test]
    fn test_time_travel() {
        let store = TemporalStore::new();

        let v1 = store.save("readme", json!({"version": 1})).unwrap();
        thread::sleep(Duration::from_millis(20));
        let v2 = store.save("readme", json!({"version": 2})).unwrap();

        let at_v1 = store.get_at("readme", v1.timestamp()).unwrap();
        assert_eq!(at_v1.content(), &json!({"version": 1}));

        let at_v2 = store.get_at("readme", v2.timestamp()).unwrap();
        assert_eq!(at_v2.content(), &json!({"version": 2}));
    }

    #[test]
    fn test_time_travel_before_first_record() {
        let store = TemporalStore::new();
        let before = Utc::now();
        thread::sleep(Duration::from_millis(20));
        store.save("doc", json!({"data": "x"})).unwrap();

        let result = store.get_at("doc", before);
        assert!(matches!(result, Err(AgramaError::NoValueAtTimestamp { .. })));
    }

    #[test]
    fn test_retention_caps_history() {
        let store = TemporalStore::with_retention(3);
        for i in 0..10 {
            store.save("k", json!(i)).unwrap();
        }

        let history = store.history("k", 100).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].content(), &json!(9));
        assert_eq!(history[2].content(), &json!(7));

        // Current value survives and the key still exists
        assert_eq!(store.get("k").unwrap().content(), &json!(9));
    }

    #[test]
    fn test_value_deduplication() {
        let store = TemporalStore::new();
        let value = json!({"status": "active"});

        store.save("a", value.clone()).unwrap();
        store.save("b", value.clone()).unwrap();
        store.save("c", json!({"status": "inactive"})).unwrap();

        assert_eq!(store.version_count(), 3);
        assert_eq!(store.unique_value_count(), 2);

        // Identical contents share the same allocation
        let a = store.get("a").unwrap();
        let b = store.get("b").unwrap();
        assert!(Arc::ptr_eq(&a.content, &b.content));
    }

    #[test]
    fn test_list_keys_prefix() {
        let store = TemporalStore::new();
        store.save("doc1", json!(1)).unwrap();
        store.save("doc2", json!(2)).unwrap();
        store.save("_link:a:uses:b", json!({})).unwrap();
        store.save("_meta:doc1", json!({})).unwrap();

        assert_eq!(store.list_keys("_link:"), vec!["_link:a:uses:b"]);
        assert_eq!(store.list_keys("doc"), vec!["doc1", "doc2"]);
    }

    #[test]
    fn test_scan_range_excludes_reserved() {
        let store = TemporalStore::new();
        let start = Utc::now();
        store.save("doc1", json!("one")).unwrap();
        store.save("_meta:doc1", json!({})).unwrap();
        let end = Utc::now();

        let hits = store.scan_range(start, end, false, 100);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "doc1");

        let with_reserved = store.scan_range(start, end, true, 100);
        assert_eq!(with_reserved.len(), 2);
    }

    #[test]
    fn test_scan_range_newest_first() {
        let store = TemporalStore::new();
        let start = Utc::now();
        store.save("a", json!(1)).unwrap();
        thread::sleep(Duration::from_millis(5));
        store.save("b", json!(2)).unwrap();
        let end = Utc::now();

        let hits = store.scan_range(start, end, false, 100);
        assert_eq!(hits[0].0, "b");
        assert_eq!(hits[1].0, "a");
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let store = TemporalStore::new();
        let shared = json!({"status": "active"});
        store.save("a", shared.clone()).unwrap();
        store.save("a", json!({"status": "revised"})).unwrap();
        store.save("b", shared.clone()).unwrap();

        // Through serialization, as a persistence backend would do it
        let bytes = serde_json::to_vec(&store.snapshot()).unwrap();
        let snapshot: StoreSnapshot = serde_json::from_slice(&bytes).unwrap();
        let restored = TemporalStore::from_snapshot(snapshot, 0);

        assert_eq!(restored.get("a").unwrap().content(), &json!({"status": "revised"}));
        assert_eq!(restored.history("a", 10).unwrap().len(), 2);
        assert_eq!(restored.key_count(), 2);

        // Dedup is re-established: "a"'s first version and "b" share one Arc
        let a_history = restored.history("a", 10).unwrap();
        let b = restored.get("b").unwrap();
        assert!(Arc::ptr_eq(&a_history[1].content, &b.content));
    }

    #[test]
    fn test_concurrent_writes_distinct_keys() {
        let store = Arc::new(TemporalStore::new());
        let mut handles = vec![];

        for i in 0..10 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                store.save(format!("key{i}"), json!(i)).unwrap();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.key_count(), 10);
    }

    #[test]
    fn test_concurrent_updates_same_key() {
        let store = Arc::new(TemporalStore::new());
        let mut handles = vec![];

        for i in 0..20 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                store.save("counter", json!(i)).unwrap();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.key_count(), 1);
        assert_eq!(store.version_count(), 20);
        assert_eq!(store.history("counter", 100).unwrap().len(), 20);
    }
}
