// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HTTP boundary of the receiver.
//!
//! # Endpoints
//!
//! - `POST /data` - Ingest one batch
//! - `GET /health` - Liveness probe
//! - `GET /api/v1/info` - Service info
//!
//! `/api/v1/data` and `/api/v1/health` are aliases of the first two.

pub mod handlers;
pub mod routes;

use crate::config::Config;
use crate::ingest::IngestService;
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Shared application state
pub struct AppState {
    pub service: Arc<IngestService>,
    pub config: Config,
}

impl AppState {
    pub fn new(service: IngestService, config: Config) -> Self {
        Self {
            service: Arc::new(service),
            config,
        }
    }
}

/// Build the router with CORS, tracing and the optional request timeout.
pub fn build_router(state: Arc<AppState>) -> Router {
    let timeout = state.config.request_timeout();

    let mut router = routes::api_routes()
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    if let Some(timeout) = timeout {
        router = router.layer(TimeoutLayer::new(timeout));
    }

    router.with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
