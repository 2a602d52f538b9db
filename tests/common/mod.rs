// Shared test helpers
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use switch_telemetry::models::Record;
use switch_telemetry::store::{KvEngine, MemoryKv, RecordStore, StoreError, StoreLayout};
use tracing::Span;

pub fn record(switch_id: &str, timestamp: Option<i64>) -> Record {
    Record {
        switch_id: switch_id.to_string(),
        timestamp,
        bandwidth_mbps: 1234.56,
        latency_ms: 3.14,
        packet_errors: 0,
    }
}

pub fn memory_store() -> Arc<RecordStore<MemoryKv>> {
    Arc::new(RecordStore::new(
        MemoryKv::new(),
        StoreLayout::default(),
        Span::none(),
    ))
}

/// Memory engine that rejects writes to keys containing `poison`.
#[derive(Clone)]
pub struct FlakyKv {
    pub inner: MemoryKv,
    pub poison: String,
}

impl FlakyKv {
    pub fn new(poison: &str) -> Self {
        Self {
            inner: MemoryKv::new(),
            poison: poison.to_string(),
        }
    }

    fn check(&self, key: &str) -> Result<(), StoreError> {
        if key.contains(&self.poison) {
            Err(StoreError::Protocol(format!("write rejected for {key}")))
        } else {
            Ok(())
        }
    }
}

impl KvEngine for FlakyKv {
    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        self.check(key)?;
        self.inner.set_ex(key, value, ttl).await
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.check(key)?;
        self.inner.set(key, value).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Result<(u64, Vec<String>), StoreError> {
        self.inner.scan(cursor, pattern, count).await
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        self.inner.mget(keys).await
    }
}
