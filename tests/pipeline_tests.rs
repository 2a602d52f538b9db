// Collection pipeline: tolerant ingest, watermark rules, HTTP cycles, background loop

mod common;

use axum_test::TestServer;
use common::{FlakyKv, memory_store, record};
use std::sync::Arc;
use std::time::Duration;
use switch_telemetry::models::{Record, Schema};
use switch_telemetry::pipeline::{self, Collector, CycleError, CycleOutcome, PipelineConfig};
use switch_telemetry::routes;
use switch_telemetry::snapshot::SnapshotCache;
use switch_telemetry::store::{KvEngine, MemoryKv, RecordStore, StoreLayout};
use tracing::Span;

const V2_HEADER: &str = "timestamp,switch_id,bandwidth_mbps,latency_ms,packet_errors";

fn pipeline_config(source_url: &str, schema: Schema) -> PipelineConfig {
    PipelineConfig {
        source_url: source_url.to_string(),
        schema,
        poll_interval: Duration::from_millis(20),
        request_timeout: Duration::from_secs(2),
        store_ttl: Duration::from_secs(60),
    }
}

fn collector<E: KvEngine>(
    store: Arc<RecordStore<E>>,
    source_url: &str,
    schema: Schema,
) -> Collector<E> {
    Collector::new(store, &pipeline_config(source_url, schema), Span::none()).unwrap()
}

/// Serves `source_app` on an ephemeral port; returns its base URL.
async fn serve_source(cache: SnapshotCache) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = routes::source_app(Arc::new(cache));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn sw5_source(_: i64) -> Vec<Record> {
    vec![Record {
        switch_id: "sw5".into(),
        timestamp: None,
        bandwidth_mbps: 1234.56,
        latency_ms: 3.14,
        packet_errors: 0,
    }]
}

#[test]
fn test_counters_url_is_derived_from_base() {
    let store = memory_store();
    let c = collector(store.clone(), "http://gen:9001/", Schema::V2);
    assert_eq!(c.counters_url(), "http://gen:9001/counters");
    let c = collector(store, "http://gen:9001", Schema::V2);
    assert_eq!(c.counters_url(), "http://gen:9001/counters");
}

#[tokio::test]
async fn test_ingest_tolerates_malformed_lines() {
    let store = memory_store();
    let c = collector(store.clone(), "http://unused", Schema::V2);

    let mut body = format!("{V2_HEADER}\n");
    for i in 1..=100 {
        match i {
            17 => body.push_str("1700000000,sw17,fast,1.00,0\n"),
            60 => body.push_str("1700000000,sw60,1.00\n"),
            _ => body.push_str(&format!("{},sw{i},10.50,2.25,{}\n", 1_700_000_000 + i, i % 7)),
        }
    }

    let report = c.ingest(&body).await;
    assert_eq!(report.lines, 100);
    assert_eq!(report.stored, 98);
    assert_eq!(report.parse_errors, 2);
    assert_eq!(report.store_errors, 0);
    assert_eq!(report.watermark, Some(1_700_000_100));

    assert_eq!(store.get_all().await.unwrap().len(), 98);
    assert_eq!(store.get("sw17").await.unwrap(), None);
    assert_eq!(store.get("sw60").await.unwrap(), None);
    assert_eq!(store.watermark().await.unwrap(), Some(1_700_000_100));
}

#[tokio::test]
async fn test_watermark_is_max_timestamp_not_last_line() {
    let store = memory_store();
    let c = collector(store.clone(), "http://unused", Schema::V2);
    let body = format!("{V2_HEADER}\n300,sw1,1.00,1.00,1\n500,sw2,1.00,1.00,1\n400,sw3,1.00,1.00,1\n");

    let report = c.ingest(&body).await;
    assert_eq!(report.watermark, Some(500));
    assert_eq!(store.watermark().await.unwrap(), Some(500));
}

#[tokio::test]
async fn test_watermark_unchanged_without_valid_timestamps() {
    let store = memory_store();
    store.set_watermark(1_000).await.unwrap();

    // Every line malformed.
    let v2 = collector(store.clone(), "http://unused", Schema::V2);
    let report = v2.ingest(&format!("{V2_HEADER}\nbad\nworse,line\n")).await;
    assert_eq!(report.stored, 0);
    assert_eq!(report.watermark, None);
    assert_eq!(store.watermark().await.unwrap(), Some(1_000));

    // v1 rows are stored but carry no timestamp.
    let v1 = collector(store.clone(), "http://unused", Schema::V1);
    let report = v1
        .ingest("switch_id,bandwidth_mbps,latency_ms,packet_errors\nsw5,1234.56,3.14,0\n")
        .await;
    assert_eq!(report.stored, 1);
    assert_eq!(report.watermark, None);
    assert_eq!(store.watermark().await.unwrap(), Some(1_000));
    assert_eq!(store.get("sw5").await.unwrap(), Some(record("sw5", None)));
}

#[tokio::test]
async fn test_store_failure_skips_record_and_excludes_it_from_watermark() {
    let store = Arc::new(RecordStore::new(
        FlakyKv::new("sw2"),
        StoreLayout::default(),
        Span::none(),
    ));
    let c = collector(store.clone(), "http://unused", Schema::V2);
    let body = format!("{V2_HEADER}\n100,sw1,1.00,1.00,1\n900,sw2,1.00,1.00,1\n200,sw3,1.00,1.00,1\n");

    let report = c.ingest(&body).await;
    assert_eq!(report.stored, 2);
    assert_eq!(report.store_errors, 1);
    assert_eq!(report.watermark, Some(200));

    let ids: Vec<String> = store
        .get_all()
        .await
        .unwrap()
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    assert_eq!(ids, vec!["sw1".to_string(), "sw3".to_string()]);
}

#[tokio::test]
async fn test_watermark_write_failure_keeps_records() {
    let store = Arc::new(RecordStore::new(
        FlakyKv::new("meta:"),
        StoreLayout::default(),
        Span::none(),
    ));
    let c = collector(store.clone(), "http://unused", Schema::V2);
    let report = c.ingest(&format!("{V2_HEADER}\n100,sw1,1.00,1.00,1\n")).await;

    assert_eq!(report.stored, 1);
    assert_eq!(report.watermark, None);
    assert_eq!(store.watermark().await.unwrap(), None);
    assert!(store.get("sw1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_end_to_end_fetch_store_query() {
    let cache = SnapshotCache::new(sw5_source, Schema::V1, Duration::from_secs(60), Span::none());
    let base = serve_source(cache).await;

    let store = memory_store();
    let c = collector(store.clone(), &base, Schema::V1);

    let outcome = c.run_cycle().await.unwrap();
    let CycleOutcome::Ingested(report) = outcome else {
        panic!("expected a fresh snapshot, got {outcome:?}");
    };
    assert_eq!(report.stored, 1);
    assert_eq!(report.watermark, None);

    // Snapshot still fresh on the source side.
    assert_eq!(c.run_cycle().await.unwrap(), CycleOutcome::NotModified);

    let query = TestServer::new(routes::collector_app(store, Schema::V1)).unwrap();
    let response = query
        .get("/telemetry/GetMetric?switch_id=sw5&metric=latency_ms")
        .await;
    response.assert_status_ok();
    response.assert_text("3.14");

    let listing: serde_json::Value = query.get("/telemetry/ListMetrics").await.json();
    assert_eq!(listing[0]["sw5"]["bandwidth_mbps"], 1234.56);
}

#[tokio::test]
async fn test_unexpected_status_fails_cycle() {
    let broken = |_: i64| vec![record("bad,id", None)];
    let cache = SnapshotCache::new(broken, Schema::V1, Duration::from_secs(60), Span::none());
    let base = serve_source(cache).await;

    let store = memory_store();
    let c = collector(store.clone(), &base, Schema::V1);
    let err = c.run_cycle().await.unwrap_err();
    assert!(matches!(
        err,
        CycleError::UnexpectedStatus { status, .. } if status.as_u16() == 500
    ));
    assert!(store.get_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unreachable_source_fails_cycle() {
    // Reserve a port, then free it so nothing listens there.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let c = collector(memory_store(), &format!("http://{addr}"), Schema::V2);
    let err = c.run_cycle().await.unwrap_err();
    assert!(matches!(err, CycleError::Fetch { .. }));
    assert!(err.to_string().contains("/counters"));
}

#[tokio::test]
async fn test_spawned_loop_collects_and_stops_on_shutdown() {
    let cache = SnapshotCache::new(sw5_source, Schema::V1, Duration::from_millis(30), Span::none());
    let base = serve_source(cache).await;

    let engine = MemoryKv::new();
    let store = Arc::new(RecordStore::new(
        engine.clone(),
        StoreLayout::default(),
        Span::none(),
    ));
    let c = collector(store.clone(), &base, Schema::V1);
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = pipeline::spawn(c, Duration::from_millis(20), shutdown_rx);

    tokio::time::timeout(Duration::from_secs(5), async {
        while store.get("sw5").await.unwrap().is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("collector stored the record");
    assert!(!engine.is_empty().await);

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("collector stopped")
        .unwrap();
}

#[tokio::test]
async fn test_spawned_loop_survives_failing_cycles() {
    let c = collector(memory_store(), "http://127.0.0.1:1", Schema::V2);
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = pipeline::spawn(c, Duration::from_millis(10), shutdown_rx);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!handle.is_finished());

    drop(shutdown_tx);
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("collector stopped when sender dropped")
        .unwrap();
}
