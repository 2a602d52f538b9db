use anyhow::Result;
use std::sync::Arc;
use switch_telemetry::config::{AppConfig, StoreEngine};
use switch_telemetry::pipeline::{self, Collector};
use switch_telemetry::store::{KvEngine, MemoryKv, RecordStore};
use switch_telemetry::{logging, routes, shutdown};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let app_config = AppConfig::load()?;
    match app_config.store.engine {
        StoreEngine::Redis => {
            let engine = app_config.store.connect_redis().await?;
            run(engine, app_config).await
        }
        StoreEngine::Memory => {
            tracing::warn!("Using in-process memory store; records are lost on exit");
            run(MemoryKv::new(), app_config).await
        }
    }
}

async fn run<E: KvEngine>(engine: E, app_config: AppConfig) -> Result<()> {
    let store = Arc::new(RecordStore::new(
        engine,
        app_config.store.layout(),
        tracing::info_span!("record_store"),
    ));

    let pipeline_config = app_config.pipeline();
    let collector = Collector::new(
        store.clone(),
        &pipeline_config,
        tracing::info_span!("collector", schema = %pipeline_config.schema),
    )?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let collector_handle = pipeline::spawn(collector, pipeline_config.poll_interval, shutdown_rx);

    let app = routes::collector_app(store, app_config.collector.schema);
    let addr = format!("{}:{}", app_config.collector.host, app_config.collector.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        store_ttl_ms = app_config.store.ttl_ms,
        "Listening on http://{}",
        addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::signal())
        .await?;

    let _ = shutdown_tx.send(());
    let _ = collector_handle.await;
    Ok(())
}
