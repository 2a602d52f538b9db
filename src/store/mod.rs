// Record store: JSON-encoded records in a TTL-bounded key-value engine.
// Records live under `record_prefix`; the last-update watermark lives outside it so
// listings never pick it up.

mod memory;
mod redis_kv;

pub use memory::MemoryKv;
pub use redis_kv::RedisKv;

use crate::models::Record;
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::Span;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("codec: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("key does not exist: {0}")]
    KeyNotFound(String),
    #[error("metric '{field}' does not exist in key '{key}'")]
    FieldNotFound { key: String, field: String },
    #[error("watermark value {0:?} is not an integer")]
    CorruptWatermark(String),
    #[error("store protocol: {0}")]
    Protocol(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::KeyNotFound(_) | StoreError::FieldNotFound { .. }
        )
    }
}

/// Contract of the external key-value engine. Implementations provide their own
/// concurrency safety; callers hold no locks across calls.
pub trait KvEngine: Send + Sync + 'static {
    /// Write `value` under `key`, expiring after `ttl`. Overwrites.
    fn set_ex(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Write `value` under `key` without expiry.
    fn set(&self, key: &str, value: String) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// One incremental scan step. Returns the next cursor (0 when the scan is complete)
    /// and the keys matching `pattern` in this page. Keys may repeat across pages.
    fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> impl Future<Output = Result<(u64, Vec<String>), StoreError>> + Send;

    /// Batched read; one slot per key, `None` for absent or expired keys.
    fn mget(
        &self,
        keys: &[String],
    ) -> impl Future<Output = Result<Vec<Option<String>>, StoreError>> + Send;
}

/// Key layout of the record store.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    pub record_prefix: String,
    pub watermark_key: String,
    pub scan_count: usize,
}

impl Default for StoreLayout {
    fn default() -> Self {
        Self {
            record_prefix: "switch:".into(),
            watermark_key: "meta:last_update".into(),
            scan_count: 100,
        }
    }
}

pub struct RecordStore<E> {
    engine: E,
    layout: StoreLayout,
    span: Span,
}

impl<E: KvEngine> RecordStore<E> {
    pub fn new(engine: E, layout: StoreLayout, span: Span) -> Self {
        Self {
            engine,
            layout,
            span,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    fn record_key(&self, switch_id: &str) -> String {
        format!("{}{}", self.layout.record_prefix, switch_id)
    }

    /// Serializes `record` and writes it under `switch_id` with expiry `ttl`.
    pub async fn put(&self, switch_id: &str, record: &Record, ttl: Duration) -> Result<(), StoreError> {
        let data = serde_json::to_string(record)?;
        self.engine
            .set_ex(&self.record_key(switch_id), data, ttl)
            .await
    }

    pub async fn get(&self, switch_id: &str) -> Result<Option<Record>, StoreError> {
        match self.engine.get(&self.record_key(switch_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// All live records as `(switch_id, record)`, sorted by switch id. Walks the key
    /// space with incremental scans and reads each page with one batched call.
    /// Entries that expire mid-listing or fail to decode are skipped.
    pub async fn get_all(&self) -> Result<Vec<(String, Record)>, StoreError> {
        let pattern = format!("{}*", self.layout.record_prefix);
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut cursor = 0;

        loop {
            let (next, keys) = self
                .engine
                .scan(cursor, &pattern, self.layout.scan_count)
                .await?;
            let keys: Vec<String> = keys.into_iter().filter(|k| seen.insert(k.clone())).collect();

            if !keys.is_empty() {
                let values = self.engine.mget(&keys).await?;
                if values.len() != keys.len() {
                    return Err(StoreError::Protocol(format!(
                        "batched read returned {} values for {} keys",
                        values.len(),
                        keys.len()
                    )));
                }
                for (key, value) in keys.iter().zip(values) {
                    let Some(raw) = value else {
                        tracing::debug!(parent: &self.span, key = %key, "key expired during listing");
                        continue;
                    };
                    match serde_json::from_str::<Record>(&raw) {
                        Ok(record) => {
                            let switch_id = key
                                .strip_prefix(&self.layout.record_prefix)
                                .unwrap_or(key)
                                .to_string();
                            out.push((switch_id, record));
                        }
                        Err(e) => {
                            tracing::warn!(
                                parent: &self.span,
                                key = %key,
                                error = %e,
                                operation = "get_all",
                                "skipping undecodable record"
                            );
                        }
                    }
                }
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    /// One field of a stored record, decoded generically so any field name can be
    /// probed.
    pub async fn get_field(&self, switch_id: &str, field: &str) -> Result<Value, StoreError> {
        let raw = self
            .engine
            .get(&self.record_key(switch_id))
            .await?
            .ok_or_else(|| StoreError::KeyNotFound(switch_id.to_string()))?;
        let mut fields: serde_json::Map<String, Value> = serde_json::from_str(&raw)?;
        fields
            .remove(field)
            .ok_or_else(|| StoreError::FieldNotFound {
                key: switch_id.to_string(),
                field: field.to_string(),
            })
    }

    /// Writes the last-update marker. No expiry: it reflects the latest ingest.
    pub async fn set_watermark(&self, timestamp: i64) -> Result<(), StoreError> {
        self.engine
            .set(&self.layout.watermark_key, timestamp.to_string())
            .await
    }

    pub async fn watermark(&self) -> Result<Option<i64>, StoreError> {
        match self.engine.get(&self.layout.watermark_key).await? {
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| StoreError::CorruptWatermark(raw)),
            None => Ok(None),
        }
    }
}
