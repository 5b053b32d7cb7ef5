// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HTTP request handlers.

use super::AppState;
use crate::error::{IngestError, TierFailures};
use crate::store::Tier;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: u16,

    /// Tiers that hold the row despite the failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub written_tiers: Option<Vec<Tier>>,

    /// Tiers that could not be written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_tiers: Option<Vec<Tier>>,
}

impl ApiError {
    fn new(code: StatusCode, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.as_u16(),
            written_tiers: None,
            failed_tiers: None,
        }
    }

    fn storage(code: StatusCode, failures: &TierFailures) -> Self {
        Self {
            error: format!("storage failure: {}", failures),
            code: code.as_u16(),
            written_tiers: Some(failures.written.clone()),
            failed_tiers: Some(failures.failed.iter().map(|(tier, _)| *tier).collect()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Validation(e) => Self::new(StatusCode::BAD_REQUEST, e.to_string()),
            IngestError::Storage(failures) if failures.is_schema_mismatch() => {
                Self::storage(StatusCode::CONFLICT, &failures)
            }
            IngestError::Storage(failures) => {
                Self::storage(StatusCode::INTERNAL_SERVER_ERROR, &failures)
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

/// POST /data
pub async fn receive_data(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = payload?;

    // Runs to completion even if the client goes away
    let service = Arc::clone(&state.service);
    let receipt = tokio::task::spawn_blocking(move || service.ingest(&body))
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))??;

    Ok(Json(serde_json::json!({
        "status": "received",
        "port": receipt.source_id,
        "values_count": receipt.values_count,
        "received_at": receipt.received_at_epoch(),
    })))
}

/// GET /health
pub async fn health() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /api/v1/info
pub async fn info(State(state): State<Arc<AppState>>) -> Response {
    let capacities = state.service.capacities();
    let info = serde_json::json!({
        "name": "portlog-receiver",
        "version": env!("CARGO_PKG_VERSION"),
        "api_version": "v1",
        "data_dir": state.config.data_dir,
        "tiers": {
            "short": capacities.short,
            "long": capacities.long,
        },
        "schema_policy": state.service.store().schema_policy(),
        "endpoints": [
            "/data",
            "/health",
            "/api/v1/data",
            "/api/v1/health",
            "/api/v1/info"
        ]
    });

    (StatusCode::OK, Json(info)).into_response()
}
