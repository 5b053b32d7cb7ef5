// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for ingestion and storage.

use crate::store::Tier;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// A batch was malformed. Nothing was written.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("field 'port' is required")]
    MissingSourceId,

    #[error("field 'port' must be an integer")]
    SourceIdNotInteger,

    #[error("field 'values' is required")]
    MissingValues,

    #[error("field 'values' must be an object with 'names' and 'values'")]
    ValuesNotObject,

    #[error("field 'values.names' is required")]
    MissingNames,

    #[error("field 'values.values' is required")]
    MissingChannelValues,

    #[error("'values.names' and 'values.values' must be lists")]
    NotSequences,

    #[error("channel name at index {0} is not a string")]
    NameNotString(usize),

    #[error("channel value at index {0} is not a number")]
    ValueNotNumeric(usize),

    #[error("duplicate channel name '{0}'")]
    DuplicateChannel(String),

    #[error("names and values counts differ ({names} names, {values} values)")]
    LengthMismatch { names: usize, values: usize },
}

/// Rolling store failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt log {} at record {record}: {reason}", path.display())]
    Corrupt {
        path: PathBuf,
        record: usize,
        reason: String,
    },

    #[error("channel layout {found:?} does not match stored header {expected:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("capacity must be positive")]
    InvalidCapacity,
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Per-tier outcome of a failed ingest.
///
/// Tiers are independent logs, so one may be written while the other fails.
#[derive(Debug)]
pub struct TierFailures {
    /// Tiers that hold the new row.
    pub written: Vec<Tier>,
    /// Tiers that could not be written, with the cause.
    pub failed: Vec<(Tier, StoreError)>,
}

impl TierFailures {
    /// Returns true if every failure is a schema mismatch.
    pub fn is_schema_mismatch(&self) -> bool {
        !self.failed.is_empty()
            && self
                .failed
                .iter()
                .all(|(_, e)| matches!(e, StoreError::SchemaMismatch { .. }))
    }
}

impl fmt::Display for TierFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (tier, err)) in self.failed.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{} tier: {}", tier, err)?;
        }
        Ok(())
    }
}

/// Ingestion failure.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid batch: {0}")]
    Validation(#[from] ValidationError),

    #[error("storage failure: {0}")]
    Storage(TierFailures),
}
