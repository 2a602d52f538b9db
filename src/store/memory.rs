// In-process key-value engine with per-key expiry. Used by tests and by the collector
// when `store.engine = "memory"`.

use super::{KvEngine, StoreError};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

/// Open scans kept before the oldest abandoned one is dropped.
const MAX_OPEN_SCANS: usize = 1024;

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|t| now < t)
    }
}

/// Resume points of in-flight scans, keyed by the cursor handed to the caller.
#[derive(Default)]
struct ScanCursors {
    next_id: u64,
    resume_after: BTreeMap<u64, String>,
}

impl ScanCursors {
    fn open(&mut self, last_key: String) -> u64 {
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.resume_after.insert(self.next_id, last_key);
        while self.resume_after.len() > MAX_OPEN_SCANS {
            self.resume_after.pop_first();
        }
        self.next_id
    }
}

/// Cloneable handle; clones share the same map.
#[derive(Clone, Default)]
pub struct MemoryKv {
    inner: Arc<RwLock<BTreeMap<String, Entry>>>,
    scans: Arc<Mutex<ScanCursors>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.inner
            .read()
            .await
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Writes also purge expired entries. Scans resume by key, so removals never
    /// shift an in-flight listing.
    async fn insert(&self, key: &str, value: String, expires_at: Option<Instant>) {
        let now = Instant::now();
        let mut map = self.inner.write().await;
        map.retain(|_, e| e.is_live(now));
        map.insert(key.to_string(), Entry { value, expires_at });
    }
}

/// Glob subset used by the record store: a trailing `*` matches any suffix,
/// anything else matches exactly.
fn matches(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

impl KvEngine for MemoryKv {
    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        self.insert(key, value, Some(Instant::now() + ttl)).await;
        Ok(())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.insert(key, value, None).await;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let map = self.inner.read().await;
        Ok(map
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    /// Cursor 0 starts a scan; any other cursor resumes after the last key the
    /// previous page visited. Keys live for the whole scan are always returned.
    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Result<(u64, Vec<String>), StoreError> {
        let resume_after = if cursor == 0 {
            None
        } else {
            let key = self.scans.lock().await.resume_after.remove(&cursor);
            Some(key.ok_or_else(|| {
                StoreError::Protocol(format!("unknown or expired scan cursor {cursor}"))
            })?)
        };

        let now = Instant::now();
        let page = count.max(1);
        let lower = match &resume_after {
            Some(key) => Bound::Excluded(key.as_str()),
            None => Bound::Unbounded,
        };

        let map = self.inner.read().await;
        let mut visited = 0;
        let mut last_visited = None;
        let mut keys = Vec::new();
        for (key, entry) in map.range::<str, _>((lower, Bound::Unbounded)).take(page) {
            visited += 1;
            last_visited = Some(key);
            if entry.is_live(now) && matches(pattern, key) {
                keys.push(key.clone());
            }
        }

        let next = match last_visited {
            Some(last) if visited == page => self.scans.lock().await.open(last.clone()),
            _ => 0,
        };
        Ok((next, keys))
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        let now = Instant::now();
        let map = self.inner.read().await;
        Ok(keys
            .iter()
            .map(|k| {
                map.get(k)
                    .filter(|e| e.is_live(now))
                    .map(|e| e.value.clone())
            })
            .collect())
    }
}
