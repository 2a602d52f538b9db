use anyhow::Result;
use std::sync::Arc;
use switch_telemetry::config::AppConfig;
use switch_telemetry::snapshot::{SnapshotCache, SyntheticSource};
use switch_telemetry::{logging, routes, shutdown};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let app_config = AppConfig::load()?;
    let cfg = &app_config.source;

    let cache = Arc::new(SnapshotCache::new(
        SyntheticSource::new(cfg.rows),
        cfg.schema,
        cfg.snapshot_ttl(),
        tracing::info_span!("snapshot_cache", schema = %cfg.schema),
    ));

    let app = routes::source_app(cache);
    let addr = format!("{}:{}", cfg.host, cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        rows = cfg.rows,
        snapshot_ttl_ms = cfg.snapshot_ttl_ms,
        "Listening on http://{}",
        addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::signal())
        .await?;
    Ok(())
}
