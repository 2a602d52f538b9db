// Per-switch telemetry record

use serde::{Deserialize, Serialize};

/// One device's metric tuple. Field names double as the CSV column names and the
/// JSON keys stored in the record store, so `GetMetric?metric=` probes them directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub switch_id: String,
    /// Seconds since epoch at the source; absent for schemas without a timestamp column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    pub bandwidth_mbps: f64,
    pub latency_ms: f64,
    pub packet_errors: u32,
}
