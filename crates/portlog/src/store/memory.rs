// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-memory backend. Nothing survives the process.

use super::{AppendOutcome, LogKey, RollingLog, RollingStore, Row, SchemaPolicy, SlotMap};
use crate::error::StoreError;

/// In-memory rolling store.
pub struct MemoryStore {
    schema_policy: SchemaPolicy,
    slots: SlotMap<Option<RollingLog>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            schema_policy: SchemaPolicy::default(),
            slots: SlotMap::new(),
        }
    }

    /// Set the schema policy.
    pub fn with_schema_policy(mut self, policy: SchemaPolicy) -> Self {
        self.schema_policy = policy;
        self
    }
}

impl RollingStore for MemoryStore {
    fn append(
        &self,
        key: LogKey,
        header: &[String],
        row: &Row,
        capacity: usize,
    ) -> Result<AppendOutcome, StoreError> {
        if capacity == 0 {
            return Err(StoreError::InvalidCapacity);
        }

        let slot = self.slots.slot(key);
        let mut slot = slot.lock();

        let created = slot.is_none();
        let log = slot.get_or_insert_with(|| RollingLog::new(header.to_vec(), capacity));
        if !created {
            self.schema_policy.check(log.header(), header)?;
        }

        let evicted = log.push(row.clone(), capacity).evicted();
        Ok(AppendOutcome {
            rows: log.len(),
            evicted,
            created,
        })
    }

    fn load(&self, key: LogKey) -> Result<Option<RollingLog>, StoreError> {
        let Some(slot) = self.slots.get(key) else {
            return Ok(None);
        };
        let log = slot.lock().clone();
        Ok(log)
    }

    fn schema_policy(&self) -> SchemaPolicy {
        self.schema_policy
    }
}
