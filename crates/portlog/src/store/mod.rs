// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Rolling store abstraction
//!
//! A rolling log is a header plus at most `capacity` rows, oldest evicted
//! first. One log exists per `(source_id, tier)`.
//!
//! # Backends
//!
//! - [`CsvStore`] -- One CSV file per log, durable
//! - [`MemoryStore`] -- In-process only, for tests and dry runs
//!
//! # Locking
//!
//! Both backends keep a map from [`LogKey`] to a per-key mutex. The map guard
//! is dropped before the mutex is taken, so appends to different keys never
//! wait on each other while appends to the same key are serialized.

pub mod csv;
pub mod memory;

pub use self::csv::CsvStore;
pub use self::memory::MemoryStore;

use crate::error::StoreError;
use crate::sanitize::Reading;
use crate::table;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

/// First column of every log.
pub const DATETIME_COLUMN: &str = "DateTime";

/// Retention class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Latest few rows, for dashboard tails.
    Short,
    /// Bounded history.
    Long,
}

impl Tier {
    /// Both tiers, in write order.
    pub const ALL: [Tier; 2] = [Tier::Short, Tier::Long];

    /// Row limit used when nothing else is configured.
    pub fn default_capacity(self) -> usize {
        match self {
            Tier::Short => 10,
            Tier::Long => 1000,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Short => "short",
            Tier::Long => "long",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one rolling log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogKey {
    pub source_id: i64,
    pub tier: Tier,
}

impl LogKey {
    pub fn new(source_id: i64, tier: Tier) -> Self {
        Self { source_id, tier }
    }
}

impl fmt::Display for LogKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port {}/{}", self.source_id, self.tier)
    }
}

/// What to do when a batch's channel layout differs from the stored header.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SchemaPolicy {
    /// Append positionally and keep the original header.
    #[default]
    Trust,
    /// Refuse the append with [`StoreError::SchemaMismatch`].
    Reject,
}

impl SchemaPolicy {
    /// Check an incoming header against the stored one.
    pub fn check(self, stored: &[String], incoming: &[String]) -> Result<(), StoreError> {
        if stored == incoming {
            return Ok(());
        }
        match self {
            SchemaPolicy::Trust => {
                tracing::warn!(
                    "Channel layout changed ({:?} -> {:?}), appending positionally",
                    &stored[1.min(stored.len())..],
                    &incoming[1.min(incoming.len())..]
                );
                Ok(())
            }
            SchemaPolicy::Reject => Err(StoreError::SchemaMismatch {
                expected: stored.to_vec(),
                found: incoming.to_vec(),
            }),
        }
    }
}

/// One data row: receipt time plus sanitized values.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Receipt time, `%Y-%m-%d %H:%M:%S`.
    pub observed_at: String,
    pub values: Vec<Reading>,
}

impl Row {
    pub fn new(observed_at: impl Into<String>, values: Vec<Reading>) -> Self {
        Self {
            observed_at: observed_at.into(),
            values,
        }
    }

    /// Fields in table order.
    pub fn to_fields(&self) -> Vec<String> {
        let mut fields = Vec::with_capacity(self.values.len() + 1);
        fields.push(self.observed_at.clone());
        fields.extend(self.values.iter().map(Reading::to_string));
        fields
    }

    /// Decode a table record.
    pub fn from_record(record: Vec<String>) -> Result<Self, String> {
        let mut fields = record.into_iter();
        let observed_at = fields.next().unwrap_or_default();
        let values = fields
            .enumerate()
            .map(|(i, field)| {
                field
                    .parse::<Reading>()
                    .map_err(|_| format!("column {} value '{}' is not a number", i + 1, field))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            observed_at,
            values,
        })
    }
}

/// Undo record for [`RollingLog::push`].
#[derive(Debug)]
pub(crate) struct PushUndo {
    evicted: Vec<Row>,
    previous_capacity: usize,
}

impl PushUndo {
    pub(crate) fn evicted(&self) -> usize {
        self.evicted.len()
    }
}

/// Header plus a capacity-bounded FIFO of rows.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingLog {
    header: Vec<String>,
    rows: VecDeque<Row>,
    capacity: usize,
}

impl RollingLog {
    /// Create an empty log.
    pub fn new(header: Vec<String>, capacity: usize) -> Self {
        Self {
            header,
            rows: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Rows, oldest first.
    pub fn rows(&self) -> impl ExactSizeIterator<Item = &Row> {
        self.rows.iter()
    }

    pub fn newest(&self) -> Option<&Row> {
        self.rows.back()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a row, evicting from the front until `len <= capacity`.
    pub(crate) fn push(&mut self, row: Row, capacity: usize) -> PushUndo {
        let previous_capacity = self.capacity;
        self.capacity = capacity;
        self.rows.push_back(row);

        let excess = self.rows.len().saturating_sub(capacity);
        let evicted = self.rows.drain(..excess).collect();
        PushUndo {
            evicted,
            previous_capacity,
        }
    }

    /// Revert the most recent [`push`](Self::push).
    pub(crate) fn undo(&mut self, undo: PushUndo) {
        self.rows.pop_back();
        for row in undo.evicted.into_iter().rev() {
            self.rows.push_front(row);
        }
        self.capacity = undo.previous_capacity;
    }

    /// Write header and rows as CSV.
    pub fn write_csv<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(table::encode_record(&self.header).as_bytes())?;
        for row in &self.rows {
            out.write_all(table::encode_record(&row.to_fields()).as_bytes())?;
        }
        Ok(())
    }
}

/// Backend-agnostic rolling store.
pub trait RollingStore: Send + Sync {
    /// Append `row` to the log for `key`, creating it with `header` if absent.
    ///
    /// After success the log holds at most `capacity` rows, newest last.
    /// On error the log is unchanged.
    fn append(
        &self,
        key: LogKey,
        header: &[String],
        row: &Row,
        capacity: usize,
    ) -> Result<AppendOutcome, StoreError>;

    /// Snapshot of the log for `key`, or `None` if nothing was written yet.
    fn load(&self, key: LogKey) -> Result<Option<RollingLog>, StoreError>;

    /// Schema policy applied on append.
    fn schema_policy(&self) -> SchemaPolicy;
}

/// Result of one append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    /// Rows held after the append.
    pub rows: usize,
    /// Rows evicted by this append.
    pub evicted: usize,
    /// The log did not exist before this append.
    pub created: bool,
}

/// Per-key mutexes, shared by the backends.
pub(crate) struct SlotMap<T> {
    slots: DashMap<LogKey, Arc<Mutex<T>>>,
}

impl<T: Default> SlotMap<T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Slot for `key`, created on first use.
    pub(crate) fn slot(&self, key: LogKey) -> Arc<Mutex<T>> {
        Arc::clone(&self.slots.entry(key).or_default())
    }

    pub(crate) fn get(&self, key: LogKey) -> Option<Arc<Mutex<T>>> {
        self.slots.get(&key).map(|slot| Arc::clone(&slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Vec<String> {
        vec!["DateTime".into(), "temp".into()]
    }

    fn row(i: usize) -> Row {
        Row::new(format!("t{}", i), vec![Reading::Value(i as f64)])
    }

    #[test]
    fn test_push_evicts_oldest() {
        let mut log = RollingLog::new(header(), 3);
        for i in 0..5 {
            log.push(row(i), 3);
        }
        assert_eq!(log.len(), 3);
        let times: Vec<_> = log.rows().map(|r| r.observed_at.as_str()).collect();
        assert_eq!(times, ["t2", "t3", "t4"]);
        assert_eq!(log.header(), header().as_slice());
    }

    #[test]
    fn test_undo_restores_evicted_rows() {
        let mut log = RollingLog::new(header(), 2);
        log.push(row(0), 2);
        log.push(row(1), 2);
        let before = log.clone();

        let undo = log.push(row(2), 2);
        assert_eq!(undo.evicted(), 1);
        log.undo(undo);
        assert_eq!(log, before);
    }

    #[test]
    fn test_lowered_capacity_evicts_several() {
        let mut log = RollingLog::new(header(), 5);
        for i in 0..5 {
            log.push(row(i), 5);
        }
        let undo = log.push(row(5), 2);
        assert_eq!(undo.evicted(), 4);
        assert_eq!(log.len(), 2);
        assert_eq!(log.capacity(), 2);
    }

    #[test]
    fn test_row_record_round_trip() {
        let row = Row::new(
            "2026-01-01 10:00:00",
            vec![Reading::Value(22.1), Reading::Missing],
        );
        let fields = row.to_fields();
        assert_eq!(fields, ["2026-01-01 10:00:00", "22.1", "nan"]);
        assert_eq!(Row::from_record(fields).unwrap(), row);

        let err = Row::from_record(vec!["t".into(), "oops".into()]).unwrap_err();
        assert!(err.contains("column 1"));
    }

    #[test]
    fn test_schema_policy() {
        let stored = header();
        let other = vec!["DateTime".to_string(), "hum".to_string()];

        assert!(SchemaPolicy::Trust.check(&stored, &other).is_ok());
        assert!(SchemaPolicy::Reject.check(&stored, &stored).is_ok());
        assert!(matches!(
            SchemaPolicy::Reject.check(&stored, &other),
            Err(StoreError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_write_csv() {
        let mut log = RollingLog::new(header(), 10);
        log.push(Row::new("t0", vec![Reading::Missing]), 10);
        let mut out = Vec::new();
        log.write_csv(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "DateTime,temp\nt0,nan\n");
    }
}
