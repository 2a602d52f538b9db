// CSV wire schema shared by the snapshot renderer, the collector parser and the
// query whitelist. Both services pick a version explicitly in config.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Write as _;
use thiserror::Error;

use super::Record;

pub const FIELD_SEPARATOR: char = ',';

pub const TIMESTAMP: &str = "timestamp";
pub const SWITCH_ID: &str = "switch_id";
pub const BANDWIDTH_MBPS: &str = "bandwidth_mbps";
pub const LATENCY_MS: &str = "latency_ms";
pub const PACKET_ERRORS: &str = "packet_errors";

const V1_COLUMNS: &[&str] = &[SWITCH_ID, BANDWIDTH_MBPS, LATENCY_MS, PACKET_ERRORS];
const V2_COLUMNS: &[&str] = &[
    TIMESTAMP,
    SWITCH_ID,
    BANDWIDTH_MBPS,
    LATENCY_MS,
    PACKET_ERRORS,
];

/// Column layout of the `/counters` CSV body.
///
/// `V1` is the 4-field layout without a timestamp column, `V2` prepends `timestamp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Schema {
    V1,
    #[default]
    V2,
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schema::V1 => f.write_str("v1"),
            Schema::V2 => f.write_str("v2"),
        }
    }
}

/// A data line that could not be turned into a [`Record`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("expected {expected} fields, got {got}")]
    FieldCount { expected: usize, got: usize },
    #[error("empty switch_id")]
    EmptySwitchId,
    #[error("invalid {field} {value:?}: {reason}")]
    InvalidField {
        field: &'static str,
        value: String,
        reason: String,
    },
}

/// A record that cannot be written to the CSV body without corrupting it.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("switch_id {0:?} is empty or contains a separator or line break")]
    SwitchId(String),
    #[error("{field} of {switch_id} is not finite")]
    NonFinite {
        switch_id: String,
        field: &'static str,
    },
    #[error("record {0} has no timestamp but the schema requires one")]
    MissingTimestamp(String),
    #[error("format: {0}")]
    Fmt(#[from] fmt::Error),
}

impl Schema {
    /// Column names in wire order.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Schema::V1 => V1_COLUMNS,
            Schema::V2 => V2_COLUMNS,
        }
    }

    pub fn field_count(self) -> usize {
        self.columns().len()
    }

    pub fn has_timestamp(self) -> bool {
        matches!(self, Schema::V2)
    }

    /// Header row, without line terminator.
    pub fn header(self) -> String {
        self.columns().join(",")
    }

    /// Queryable fields: every column except the key.
    pub fn metric_names(self) -> impl Iterator<Item = &'static str> {
        self.columns().iter().copied().filter(|c| *c != SWITCH_ID)
    }

    pub fn is_metric(self, name: &str) -> bool {
        self.metric_names().any(|m| m == name)
    }

    /// Header plus one row per record, each terminated by `\n`.
    pub fn render(self, records: &[Record]) -> Result<String, RenderError> {
        let mut out = String::with_capacity(64 * (records.len() + 1));
        out.push_str(&self.header());
        out.push('\n');
        for record in records {
            self.render_row(record, &mut out)?;
        }
        Ok(out)
    }

    /// Appends one data row. Floats use fixed 2-decimal precision.
    pub fn render_row(self, record: &Record, out: &mut String) -> Result<(), RenderError> {
        let id = &record.switch_id;
        if id.is_empty() || id.contains([FIELD_SEPARATOR, '\n', '\r']) {
            return Err(RenderError::SwitchId(id.clone()));
        }
        for (field, value) in [
            (BANDWIDTH_MBPS, record.bandwidth_mbps),
            (LATENCY_MS, record.latency_ms),
        ] {
            if !value.is_finite() {
                return Err(RenderError::NonFinite {
                    switch_id: id.clone(),
                    field,
                });
            }
        }
        if self.has_timestamp() {
            let ts = record
                .timestamp
                .ok_or_else(|| RenderError::MissingTimestamp(id.clone()))?;
            write!(out, "{ts},")?;
        }
        writeln!(
            out,
            "{},{:.2},{:.2},{}",
            id, record.bandwidth_mbps, record.latency_ms, record.packet_errors
        )?;
        Ok(())
    }

    /// Parses one trimmed, non-blank data line.
    pub fn parse_line(self, line: &str) -> Result<Record, ParseError> {
        let fields: Vec<&str> = line.split(FIELD_SEPARATOR).map(str::trim).collect();
        if fields.len() != self.field_count() {
            return Err(ParseError::FieldCount {
                expected: self.field_count(),
                got: fields.len(),
            });
        }

        let (timestamp, rest) = if self.has_timestamp() {
            (Some(parse_timestamp(fields[0])?), &fields[1..])
        } else {
            (None, &fields[..])
        };

        let switch_id = rest[0];
        if switch_id.is_empty() {
            return Err(ParseError::EmptySwitchId);
        }

        Ok(Record {
            switch_id: switch_id.to_string(),
            timestamp,
            bandwidth_mbps: parse_gauge(BANDWIDTH_MBPS, rest[1])?,
            latency_ms: parse_gauge(LATENCY_MS, rest[2])?,
            packet_errors: rest[3]
                .parse::<u32>()
                .map_err(|e| invalid(PACKET_ERRORS, rest[3], e))?,
        })
    }
}

fn invalid(field: &'static str, value: &str, reason: impl fmt::Display) -> ParseError {
    ParseError::InvalidField {
        field,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_timestamp(raw: &str) -> Result<i64, ParseError> {
    let ts = raw.parse::<i64>().map_err(|e| invalid(TIMESTAMP, raw, e))?;
    if ts < 0 {
        return Err(invalid(TIMESTAMP, raw, "negative timestamp"));
    }
    Ok(ts)
}

/// Non-negative finite float.
fn parse_gauge(field: &'static str, raw: &str) -> Result<f64, ParseError> {
    let value = raw.parse::<f64>().map_err(|e| invalid(field, raw, e))?;
    if !value.is_finite() {
        return Err(invalid(field, raw, "not a finite number"));
    }
    if value < 0.0 {
        return Err(invalid(field, raw, "negative value"));
    }
    Ok(value)
}
