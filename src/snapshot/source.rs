// Record sources feeding the snapshot cache

use crate::models::Record;
use rand::Rng;

/// Produces the records of one snapshot regeneration. Called under the cache's write
/// lock, so implementations should be CPU-bound and quick.
pub trait RecordSource: Send + Sync {
    fn collect(&self, timestamp: i64) -> Vec<Record>;
}

impl<F> RecordSource for F
where
    F: Fn(i64) -> Vec<Record> + Send + Sync,
{
    fn collect(&self, timestamp: i64) -> Vec<Record> {
        self(timestamp)
    }
}

/// Random metrics for switches `sw1..=swN`.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    rows: usize,
}

impl SyntheticSource {
    pub const MAX_BANDWIDTH_MBPS: f64 = 10_000.0;
    pub const MAX_LATENCY_MS: f64 = 5_000.0;
    pub const MAX_PACKET_ERRORS: u32 = 100;

    pub fn new(rows: usize) -> Self {
        Self { rows }
    }
}

impl RecordSource for SyntheticSource {
    fn collect(&self, timestamp: i64) -> Vec<Record> {
        let mut rng = rand::thread_rng();
        (1..=self.rows)
            .map(|i| Record {
                switch_id: format!("sw{i}"),
                timestamp: Some(timestamp),
                bandwidth_mbps: rng.gen_range(0.0..Self::MAX_BANDWIDTH_MBPS),
                latency_ms: rng.gen_range(0.0..Self::MAX_LATENCY_MS),
                packet_errors: rng.gen_range(0..Self::MAX_PACKET_ERRORS),
            })
            .collect()
    }
}
