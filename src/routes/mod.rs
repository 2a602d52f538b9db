// HTTP routes for both services

mod counters;
mod http;
mod telemetry;

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::models::Schema;
use crate::snapshot::SnapshotCache;
use crate::store::{KvEngine, RecordStore};

#[derive(Clone)]
pub(crate) struct SourceState {
    pub(crate) cache: Arc<SnapshotCache>,
}

pub(crate) struct QueryState<E> {
    pub(crate) store: Arc<RecordStore<E>>,
    pub(crate) schema: Schema,
}

// Manual impl: derive would require `E: Clone`.
impl<E> Clone for QueryState<E> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            schema: self.schema,
        }
    }
}

/// Router of the snapshot source service.
pub fn source_app(cache: Arc<SnapshotCache>) -> Router {
    Router::new()
        .route("/health", get(http::health_handler)) // GET /health
        .route("/version", get(http::version_handler)) // GET /version
        .route("/counters", get(counters::counters_handler)) // GET /counters
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(SourceState { cache })
}

/// Router of the collector's read-only query service. `schema` decides which metric
/// names GetMetric accepts.
pub fn collector_app<E: KvEngine>(store: Arc<RecordStore<E>>, schema: Schema) -> Router {
    Router::new()
        .route("/health", get(http::health_handler)) // GET /health
        .route("/version", get(http::version_handler)) // GET /version
        .route(
            "/telemetry/ListMetrics",
            get(telemetry::list_metrics_handler::<E>),
        ) // GET /telemetry/ListMetrics
        .route(
            "/telemetry/GetMetric",
            get(telemetry::get_metric_handler::<E>),
        ) // GET /telemetry/GetMetric?switch_id=..&metric=..
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(QueryState { store, schema })
}
