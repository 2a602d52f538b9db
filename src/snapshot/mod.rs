// TTL-gated CSV snapshot cache behind GET /counters.
// Fast path takes the read lock only; regeneration takes the write lock and re-checks
// freshness so a herd of callers on an expired cache produces one regeneration.

mod source;

pub use source::{RecordSource, SyntheticSource};

use crate::models::{RenderError, Schema};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::Span;

/// Cache-validation outcome of a snapshot read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotStatus {
    /// Regenerated by this call; body carries the full CSV.
    Fresh,
    /// Cache still within its TTL; body is empty and the caller keeps its last copy.
    NotModified,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub status: SnapshotStatus,
    pub body: String,
}

impl Snapshot {
    fn not_modified() -> Self {
        Self {
            status: SnapshotStatus::NotModified,
            body: String::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("error generating CSV snapshot: {0}")]
    Render(#[from] RenderError),
    #[error("snapshot cache lock poisoned")]
    Poisoned,
}

#[derive(Default)]
struct CacheState {
    body: String,
    generated_at: Option<Instant>,
    generated_at_unix: i64,
}

impl CacheState {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.generated_at.is_some_and(|t| t.elapsed() < ttl)
    }
}

pub struct SnapshotCache {
    state: RwLock<CacheState>,
    source: Box<dyn RecordSource>,
    schema: Schema,
    ttl: Duration,
    regenerations: AtomicU64,
    span: Span,
}

impl SnapshotCache {
    /// `ttl` must be non-zero for `generated_at` to strictly increase across regenerations.
    pub fn new(source: impl RecordSource + 'static, schema: Schema, ttl: Duration, span: Span) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            source: Box::new(source),
            schema,
            ttl,
            regenerations: AtomicU64::new(0),
            span,
        }
    }

    /// Number of successful regenerations since construction.
    pub fn regenerations(&self) -> u64 {
        self.regenerations.load(Ordering::Relaxed)
    }

    /// Monotonic time of the last regeneration, if any.
    pub fn generated_at(&self) -> Option<Instant> {
        self.state.read().ok().and_then(|s| s.generated_at)
    }

    /// Last rendered body (empty before the first regeneration).
    pub fn cached_body(&self) -> Result<String, SnapshotError> {
        let state = self.state.read().map_err(|_| SnapshotError::Poisoned)?;
        Ok(state.body.clone())
    }

    /// Returns `Fresh` with the new body when the cache was expired (or empty) and this
    /// call regenerated it, `NotModified` otherwise. Blocking; call from a blocking
    /// context when running on an async runtime.
    pub fn get_snapshot(&self) -> Result<Snapshot, SnapshotError> {
        // Hot path: no logging.
        {
            let state = self.state.read().map_err(|_| SnapshotError::Poisoned)?;
            if state.is_fresh(self.ttl) {
                return Ok(Snapshot::not_modified());
            }
        }

        let mut state = self.state.write().map_err(|_| SnapshotError::Poisoned)?;
        if state.is_fresh(self.ttl) {
            return Ok(Snapshot::not_modified());
        }

        let timestamp = chrono::Utc::now().timestamp();
        let records = self.source.collect(timestamp);
        let body = match self.schema.render(&records) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(parent: &self.span, error = %e, rows = records.len(), "snapshot render failed");
                return Err(e.into());
            }
        };

        state.body.clone_from(&body);
        state.generated_at = Some(Instant::now());
        state.generated_at_unix = timestamp;
        self.regenerations.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            parent: &self.span,
            rows = records.len(),
            data_size_bytes = body.len(),
            timestamp = state.generated_at_unix,
            "snapshot regenerated"
        );

        Ok(Snapshot {
            status: SnapshotStatus::Fresh,
            body,
        })
    }
}
