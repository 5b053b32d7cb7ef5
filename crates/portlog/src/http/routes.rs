// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Route definitions.

use super::handlers;
use super::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// API routes
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/data", post(handlers::receive_data))
        .route("/api/v1/health", get(handlers::health))
        .route("/api/v1/info", get(handlers::info))
        // Paths used by existing producers
        .route("/data", post(handlers::receive_data))
        .route("/health", get(handlers::health))
}
