// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ingestion service
//!
//! Turns one raw batch into one sanitized row and writes it to every tier of
//! the rolling store.

use crate::batch::SampleBatch;
use crate::error::{IngestError, TierFailures};
use crate::sanitize::Sanitizer;
use crate::store::{LogKey, RollingStore, Row, Tier};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Format of the `DateTime` column.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Row limit per tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCapacities {
    pub short: usize,
    pub long: usize,
}

impl Default for TierCapacities {
    fn default() -> Self {
        Self {
            short: Tier::Short.default_capacity(),
            long: Tier::Long.default_capacity(),
        }
    }
}

impl TierCapacities {
    pub fn get(&self, tier: Tier) -> usize {
        match tier {
            Tier::Short => self.short,
            Tier::Long => self.long,
        }
    }
}

/// Successful ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReceipt {
    pub source_id: i64,
    /// Number of channel values in the batch.
    pub values_count: usize,
    /// How many of them were stored as missing.
    pub missing_count: usize,
    /// Receipt time; authoritative for the stored `DateTime` column.
    pub received_at: DateTime<Local>,
}

impl IngestReceipt {
    /// Receipt time as fractional Unix seconds.
    pub fn received_at_epoch(&self) -> f64 {
        self.received_at.timestamp_micros() as f64 / 1_000_000.0
    }
}

/// Ingestion service.
pub struct IngestService {
    store: Arc<dyn RollingStore>,
    sanitizer: Sanitizer,
    capacities: TierCapacities,
}

impl IngestService {
    /// Create a service with default sentinels and tier capacities.
    pub fn new(store: Arc<dyn RollingStore>) -> Self {
        Self {
            store,
            sanitizer: Sanitizer::default(),
            capacities: TierCapacities::default(),
        }
    }

    pub fn with_sanitizer(mut self, sanitizer: Sanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    pub fn with_capacities(mut self, capacities: TierCapacities) -> Self {
        self.capacities = capacities;
        self
    }

    pub fn store(&self) -> &Arc<dyn RollingStore> {
        &self.store
    }

    pub fn capacities(&self) -> TierCapacities {
        self.capacities
    }

    /// Validate and ingest a decoded JSON body.
    pub fn ingest(&self, body: &Value) -> Result<IngestReceipt, IngestError> {
        let batch = SampleBatch::from_json(body)?;
        self.ingest_batch(&batch)
    }

    /// Ingest an already validated batch.
    ///
    /// Every tier is attempted even if an earlier one fails.
    pub fn ingest_batch(&self, batch: &SampleBatch) -> Result<IngestReceipt, IngestError> {
        let received_at = Local::now();
        let values = self.sanitizer.sanitize_all(&batch.channel_values);
        let missing_count = values.iter().filter(|v| v.is_missing()).count();
        let header = batch.header();
        let row = Row::new(received_at.format(TIME_FORMAT).to_string(), values);

        let mut written = Vec::with_capacity(Tier::ALL.len());
        let mut failed = Vec::new();
        for tier in Tier::ALL {
            let key = LogKey::new(batch.source_id, tier);
            match self
                .store
                .append(key, &header, &row, self.capacities.get(tier))
            {
                Ok(_) => written.push(tier),
                Err(e) => {
                    tracing::warn!("Failed to append to {}: {}", key, e);
                    failed.push((tier, e));
                }
            }
        }

        if !failed.is_empty() {
            return Err(IngestError::Storage(TierFailures { written, failed }));
        }

        tracing::debug!(
            "Ingested port {}: {} values ({} missing)",
            batch.source_id,
            batch.len(),
            missing_count
        );

        Ok(IngestReceipt {
            source_id: batch.source_id,
            values_count: batch.len(),
            missing_count,
            received_at,
        })
    }
}
