// Collection pipeline: fetch the source's /counters snapshot, parse it tolerantly and
// write each record to the store, then advance the last-update watermark.
// One background task, strictly sequential cycles; the next tick is the retry.

mod parse;

pub use parse::{LineError, ParsedBatch, ParsedLine, parse_body};

use crate::models::Schema;
use crate::store::{KvEngine, RecordStore};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{Instrument, Span};

/// Cycle-level failure; the cycle is abandoned and retried on the next tick.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("failed to fetch metrics from {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected status code {status} from {url}")]
    UnexpectedStatus { url: String, status: StatusCode },
    #[error("failed to read response body from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Counters for one Fresh cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Non-blank data lines in the body.
    pub lines: usize,
    pub stored: usize,
    pub parse_errors: usize,
    pub store_errors: usize,
    /// Last-update marker written this cycle, if any.
    pub watermark: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Source reported 304; nothing parsed or stored.
    NotModified,
    Ingested(CycleReport),
}

/// Collector settings (from `[collector]` and `[store]` config).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Base URL of the source service; `/counters` is appended.
    pub source_url: String,
    pub schema: Schema,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    /// Expiry applied to every stored record.
    pub store_ttl: Duration,
}

pub struct Collector<E> {
    client: reqwest::Client,
    counters_url: String,
    schema: Schema,
    store_ttl: Duration,
    store: Arc<RecordStore<E>>,
    span: Span,
}

enum Fetched {
    NotModified,
    Fresh(String),
}

impl<E: KvEngine> Collector<E> {
    pub fn new(
        store: Arc<RecordStore<E>>,
        config: &PipelineConfig,
        span: Span,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            counters_url: format!("{}/counters", config.source_url.trim_end_matches('/')),
            schema: config.schema,
            store_ttl: config.store_ttl,
            store,
            span,
        })
    }

    pub fn counters_url(&self) -> &str {
        &self.counters_url
    }

    /// One fetch → parse → store → watermark cycle.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, CycleError> {
        let body = match self.fetch().await? {
            // Steady state; not worth a log line.
            Fetched::NotModified => return Ok(CycleOutcome::NotModified),
            Fetched::Fresh(body) => body,
        };
        tracing::info!(
            parent: &self.span,
            data_size_bytes = body.len(),
            "fetched fresh snapshot"
        );
        Ok(CycleOutcome::Ingested(self.ingest(&body).await))
    }

    async fn fetch(&self) -> Result<Fetched, CycleError> {
        let url = &self.counters_url;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| CycleError::Fetch {
                url: url.clone(),
                source,
            })?;

        match resp.status() {
            StatusCode::NOT_MODIFIED => Ok(Fetched::NotModified),
            StatusCode::OK => {
                let body = resp.text().await.map_err(|source| CycleError::Body {
                    url: url.clone(),
                    source,
                })?;
                Ok(Fetched::Fresh(body))
            }
            status => Err(CycleError::UnexpectedStatus {
                url: url.clone(),
                status,
            }),
        }
    }

    /// Parses `body` and stores every valid record. Per-line and per-record failures
    /// are logged and counted; they never abort the batch.
    pub async fn ingest(&self, body: &str) -> CycleReport {
        let batch = parse_body(body, self.schema);
        for LineError { line_number, error } in &batch.errors {
            tracing::warn!(
                parent: &self.span,
                line_number,
                error = %error,
                "discarding malformed line"
            );
        }

        let mut report = CycleReport {
            lines: batch.lines,
            parse_errors: batch.errors.len(),
            ..CycleReport::default()
        };
        let mut last_timestamp: Option<i64> = None;

        for ParsedLine {
            line_number,
            record,
        } in &batch.records
        {
            match self
                .store
                .put(&record.switch_id, record, self.store_ttl)
                .await
            {
                Ok(()) => {
                    report.stored += 1;
                    last_timestamp = last_timestamp.max(record.timestamp);
                }
                Err(e) => {
                    report.store_errors += 1;
                    tracing::warn!(
                        parent: &self.span,
                        line_number,
                        switch_id = %record.switch_id,
                        error = %e,
                        operation = "put",
                        "error storing metric"
                    );
                }
            }
        }

        match last_timestamp {
            Some(ts) => match self.store.set_watermark(ts).await {
                Ok(()) => report.watermark = Some(ts),
                Err(e) => {
                    tracing::warn!(
                        parent: &self.span,
                        error = %e,
                        operation = "set_watermark",
                        "failed to set last update time"
                    );
                }
            },
            None => {
                tracing::warn!(
                    parent: &self.span,
                    "no valid timestamp in batch; last update time unchanged"
                );
            }
        }

        tracing::info!(
            parent: &self.span,
            total_lines = report.lines,
            stored = report.stored,
            parse_errors = report.parse_errors,
            store_errors = report.store_errors,
            last_timestamp = report.watermark,
            "metrics processed"
        );
        report
    }
}

/// Spawns the collection loop: run a cycle, sleep `poll_interval`, repeat until
/// `shutdown_rx` fires (or its sender is dropped). Shutdown interrupts both the cycle
/// and the sleep.
pub fn spawn<E: KvEngine>(
    collector: Collector<E>,
    poll_interval: Duration,
    mut shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    let span = collector.span.clone();
    tokio::spawn(
        async move {
            tracing::info!(
                source_url = %collector.counters_url,
                interval_ms = poll_interval.as_millis() as u64,
                "collector starting"
            );
            loop {
                tokio::select! {
                    result = collector.run_cycle() => {
                        if let Err(e) = result {
                            tracing::warn!(error = %e, operation = "run_cycle", "collection cycle failed");
                        }
                    }
                    _ = &mut shutdown_rx => {
                        tracing::debug!("Collector shutting down mid-cycle");
                        break;
                    }
                }
                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {}
                    _ = &mut shutdown_rx => {
                        tracing::debug!("Collector shutting down");
                        break;
                    }
                }
            }
        }
        .instrument(span),
    )
}
