// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! portlog
//!
//! Receives periodic sample batches tagged by a source port, replaces
//! sentinel error codes with a missing marker, and keeps a bounded rolling
//! history per port in two retention tiers.
//!
//! # Features
//!
//! - **Sentinel cleansing** -- Configurable error codes stored as `nan`
//! - **Two tiers** -- Short (10 rows) and long (1000 rows) per port
//! - **Durable CSV logs** -- One file per port and tier, atomic rewrites
//! - **Per-port locking** -- Different ports never wait on each other
//!
//! # Architecture
//!
//! ```text
//! HTTP (axum)
//! +-- IngestService   (validate, sanitize, write both tiers)
//!     +-- Sanitizer    (sentinel -> missing)
//!     +-- RollingStore (CsvStore or MemoryStore)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use portlog::{CsvStore, IngestService};
//! use std::sync::Arc;
//!
//! let store = CsvStore::new("received_data")?;
//! let service = IngestService::new(Arc::new(store));
//!
//! let body = serde_json::json!({
//!     "port": 8092,
//!     "values": { "names": ["temp", "hum"], "values": [22.1, -100] }
//! });
//! let receipt = service.ingest(&body)?;
//! assert_eq!(receipt.missing_count, 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod http;
pub mod ingest;
pub mod sanitize;
pub mod store;
pub mod table;

pub use batch::{SampleBatch, WireBatch, WireChannels};
pub use config::{Config, ConfigBuilder, ConfigError};
pub use error::{IngestError, StoreError, TierFailures, ValidationError};
pub use ingest::{IngestReceipt, IngestService, TierCapacities, TIME_FORMAT};
pub use sanitize::{sanitize, Reading, Sanitizer, DEFAULT_SENTINELS};
pub use store::{
    AppendOutcome, CsvStore, LogKey, MemoryStore, RollingLog, RollingStore, Row, SchemaPolicy,
    Tier,
};
