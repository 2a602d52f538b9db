// Query service: read-only views over the record store

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::collections::BTreeMap;

use super::QueryState;
use crate::models::Record;
use crate::store::KvEngine;

/// GET /telemetry/ListMetrics: `[{"<switch_id>": Record}, ...]`.
pub(super) async fn list_metrics_handler<E: KvEngine>(
    State(state): State<QueryState<E>>,
) -> Response {
    match state.store.get_all().await {
        Ok(entries) => {
            let body: Vec<BTreeMap<String, Record>> = entries
                .into_iter()
                .map(|(switch_id, record)| BTreeMap::from([(switch_id, record)]))
                .collect();
            Json(body).into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, operation = "get_all", "listing metrics failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error retrieving metrics: {e}"),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct GetMetricParams {
    switch_id: Option<String>,
    metric: Option<String>,
}

/// GET /telemetry/GetMetric?switch_id=<id>&metric=<field>: the field as a JSON scalar.
pub(super) async fn get_metric_handler<E: KvEngine>(
    State(state): State<QueryState<E>>,
    Query(params): Query<GetMetricParams>,
) -> Response {
    let Some(switch_id) = params.switch_id.filter(|s| !s.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing switch_id parameter").into_response();
    };
    let Some(metric) = params.metric.filter(|s| !s.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing metric parameter").into_response();
    };
    if !state.schema.is_metric(&metric) {
        return (
            StatusCode::BAD_REQUEST,
            format!("Unknown metric '{metric}'"),
        )
            .into_response();
    }

    match state.store.get_field(&switch_id, &metric).await {
        Ok(value) => Json(value).into_response(),
        Err(e) if e.is_not_found() => (
            StatusCode::NOT_FOUND,
            format!("Error retrieving metric: {e}"),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, switch_id = %switch_id, operation = "get_field", "metric lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error retrieving metric: {e}"),
            )
                .into_response()
        }
    }
}
