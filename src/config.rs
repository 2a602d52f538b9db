// Service configuration: TOML file (CONFIG_FILE, default config.toml), then
// environment overrides, then validation. Every field has a built-in default.

use crate::models::Schema;
use crate::pipeline::PipelineConfig;
use crate::store::{RedisKv, StoreLayout};
use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub collector: CollectorConfig,
    pub store: StoreConfig,
}

/// Snapshot source service (`telemetry-source`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub host: String,
    pub port: u16,
    /// Minimum interval between snapshot regenerations.
    pub snapshot_ttl_ms: u64,
    /// Synthetic switches per snapshot.
    pub rows: usize,
    pub schema: Schema,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 9001,
            snapshot_ttl_ms: 10_000,
            rows: 100,
            schema: Schema::default(),
        }
    }
}

/// Collector + query service (`telemetry-collector`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub host: String,
    pub port: u16,
    pub source_url: String,
    pub poll_interval_ms: u64,
    pub request_timeout_ms: u64,
    /// Schema the source actually emits.
    pub schema: Schema,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            source_url: "http://localhost:9001".into(),
            poll_interval_ms: 10_000,
            request_timeout_ms: 5_000,
            schema: Schema::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreEngine {
    #[default]
    Redis,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub engine: StoreEngine,
    pub host: String,
    pub port: u16,
    /// Expiry of each stored record.
    pub ttl_ms: u64,
    pub record_prefix: String,
    pub watermark_key: String,
    /// COUNT hint per scan page.
    pub scan_count: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let layout = StoreLayout::default();
        Self {
            engine: StoreEngine::default(),
            host: "localhost".into(),
            port: 6379,
            ttl_ms: 10_000,
            record_prefix: layout.record_prefix,
            watermark_key: layout.watermark_key,
            scan_count: layout.scan_count,
        }
    }
}

impl SourceConfig {
    pub fn snapshot_ttl(&self) -> Duration {
        Duration::from_millis(self.snapshot_ttl_ms)
    }
}

impl StoreConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Connects the Redis engine, naming the endpoint in the error chain.
    pub async fn connect_redis(&self) -> anyhow::Result<RedisKv> {
        RedisKv::connect(&self.host, self.port)
            .await
            .with_context(|| format!("connecting to store at {}:{}", self.host, self.port))
    }

    pub fn layout(&self) -> StoreLayout {
        StoreLayout {
            record_prefix: self.record_prefix.clone(),
            watermark_key: self.watermark_key.clone(),
            scan_count: self.scan_count,
        }
    }
}

impl AppConfig {
    /// Reads `CONFIG_FILE` (must exist when set), else `config.toml` if present, else
    /// defaults; then applies environment overrides and validates.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = match std::env::var("CONFIG_FILE") {
            Ok(path) => Self::parse_file(Path::new(&path))?,
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::parse_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            Err(_) => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a config file, without environment overrides.
    pub fn load_from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let config = Self::parse_file(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    fn parse_file(path: &Path) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&s).with_context(|| format!("parsing {}", path.display()))
    }

    /// Environment overrides: PORT, SOURCE_PORT, STORE_HOST, STORE_PORT, STORE_TTL,
    /// POLL_INTERVAL, SNAPSHOT_TTL, SOURCE_URL. `lookup` is `std::env::var` in
    /// production and a map in tests.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(v) = lookup("PORT") {
            self.collector.port = v.parse().with_context(|| format!("PORT={v}"))?;
        }
        if let Some(v) = lookup("SOURCE_PORT") {
            self.source.port = v.parse().with_context(|| format!("SOURCE_PORT={v}"))?;
        }
        if let Some(v) = lookup("STORE_HOST") {
            self.store.host = v;
        }
        if let Some(v) = lookup("STORE_PORT") {
            self.store.port = v.parse().with_context(|| format!("STORE_PORT={v}"))?;
        }
        if let Some(v) = lookup("STORE_TTL") {
            self.store.ttl_ms = duration_ms("STORE_TTL", &v)?;
        }
        if let Some(v) = lookup("POLL_INTERVAL") {
            self.collector.poll_interval_ms = duration_ms("POLL_INTERVAL", &v)?;
        }
        if let Some(v) = lookup("SNAPSHOT_TTL") {
            self.source.snapshot_ttl_ms = duration_ms("SNAPSHOT_TTL", &v)?;
        }
        if let Some(v) = lookup("SOURCE_URL") {
            self.collector.source_url = v;
        }
        Ok(())
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            source_url: self.collector.source_url.clone(),
            schema: self.collector.schema,
            poll_interval: Duration::from_millis(self.collector.poll_interval_ms),
            request_timeout: Duration::from_millis(self.collector.request_timeout_ms),
            store_ttl: self.store.ttl(),
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.source.port > 0,
            "source.port must be between 1 and 65535, got {}",
            self.source.port
        );
        anyhow::ensure!(!self.source.host.is_empty(), "source.host must be non-empty");
        anyhow::ensure!(
            self.source.snapshot_ttl_ms > 0,
            "source.snapshot_ttl_ms must be > 0, got {}",
            self.source.snapshot_ttl_ms
        );
        anyhow::ensure!(
            self.source.rows > 0,
            "source.rows must be > 0, got {}",
            self.source.rows
        );
        anyhow::ensure!(
            self.collector.port > 0,
            "collector.port must be between 1 and 65535, got {}",
            self.collector.port
        );
        anyhow::ensure!(
            !self.collector.host.is_empty(),
            "collector.host must be non-empty"
        );
        anyhow::ensure!(
            self.collector.source_url.starts_with("http://")
                || self.collector.source_url.starts_with("https://"),
            "collector.source_url must be an http(s) URL, got {:?}",
            self.collector.source_url
        );
        anyhow::ensure!(
            self.collector.poll_interval_ms > 0,
            "collector.poll_interval_ms must be > 0, got {}",
            self.collector.poll_interval_ms
        );
        anyhow::ensure!(
            self.collector.request_timeout_ms > 0,
            "collector.request_timeout_ms must be > 0, got {}",
            self.collector.request_timeout_ms
        );
        anyhow::ensure!(!self.store.host.is_empty(), "store.host must be non-empty");
        anyhow::ensure!(
            self.store.port > 0,
            "store.port must be between 1 and 65535, got {}",
            self.store.port
        );
        anyhow::ensure!(
            self.store.ttl_ms > 0,
            "store.ttl_ms must be > 0, got {}",
            self.store.ttl_ms
        );
        anyhow::ensure!(
            !self.store.record_prefix.is_empty(),
            "store.record_prefix must be non-empty"
        );
        anyhow::ensure!(
            !self.store.watermark_key.is_empty(),
            "store.watermark_key must be non-empty"
        );
        anyhow::ensure!(
            !self.store.watermark_key.starts_with(&self.store.record_prefix),
            "store.watermark_key {:?} must not start with store.record_prefix {:?}",
            self.store.watermark_key,
            self.store.record_prefix
        );
        anyhow::ensure!(
            self.store.scan_count > 0,
            "store.scan_count must be > 0, got {}",
            self.store.scan_count
        );
        Ok(())
    }
}

/// `500ms`, `10s`, `2m`, or a bare integer meaning seconds.
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();
    let (digits, unit_ms) = if let Some(n) = s.strip_suffix("ms") {
        (n, 1)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1_000)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60_000)
    } else {
        (s, 1_000)
    };
    let n: u64 = digits
        .trim()
        .parse()
        .with_context(|| format!("invalid duration {s:?}"))?;
    let ms = n
        .checked_mul(unit_ms)
        .with_context(|| format!("duration {s:?} overflows"))?;
    Ok(Duration::from_millis(ms))
}

fn duration_ms(key: &str, value: &str) -> anyhow::Result<u64> {
    let d = parse_duration(value).with_context(|| format!("{key}={value}"))?;
    Ok(d.as_millis() as u64)
}
