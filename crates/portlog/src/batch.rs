// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sample batches and their JSON wire form.
//!
//! ```json
//! {
//!   "port": 8092,
//!   "timeStamp": "2026-01-01 12:00:00",
//!   "values": {"names": ["temp", "hum"], "values": [22.1, -100]}
//! }
//! ```

use crate::error::ValidationError;
use crate::store::DATETIME_COLUMN;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Wire form of a batch, as sent by producers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireBatch {
    pub port: i64,

    /// Producer's own timestamp (informational only).
    #[serde(rename = "timeStamp", default, skip_serializing_if = "Option::is_none")]
    pub time_stamp: Option<String>,

    pub values: WireChannels,
}

/// Channel names and raw values. `null` is a missing value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireChannels {
    pub names: Vec<String>,
    pub values: Vec<Option<f64>>,
}

/// A validated batch, before sanitization.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBatch {
    pub source_id: i64,
    /// Timestamp claimed by the producer, kept as metadata.
    pub claimed_timestamp: Option<String>,
    pub channel_names: Vec<String>,
    pub channel_values: Vec<Option<f64>>,
}

impl SampleBatch {
    /// Validate a decoded JSON body.
    pub fn from_json(body: &Value) -> Result<Self, ValidationError> {
        let port = match body.get("port") {
            None | Some(Value::Null) => return Err(ValidationError::MissingSourceId),
            Some(port) => port.as_i64().ok_or(ValidationError::SourceIdNotInteger)?,
        };

        let claimed_timestamp = body
            .get("timeStamp")
            .or_else(|| body.get("timestamp"))
            .and_then(|ts| match ts {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });

        let channels = match body.get("values") {
            None | Some(Value::Null) => return Err(ValidationError::MissingValues),
            Some(Value::Object(channels)) => channels,
            Some(_) => return Err(ValidationError::ValuesNotObject),
        };
        let names = channels.get("names").ok_or(ValidationError::MissingNames)?;
        let values = channels
            .get("values")
            .ok_or(ValidationError::MissingChannelValues)?;

        let (Value::Array(names), Value::Array(values)) = (names, values) else {
            return Err(ValidationError::NotSequences);
        };

        if names.len() != values.len() {
            return Err(ValidationError::LengthMismatch {
                names: names.len(),
                values: values.len(),
            });
        }

        let channel_names = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                name.as_str()
                    .map(str::to_owned)
                    .ok_or(ValidationError::NameNotString(i))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let channel_values = values
            .iter()
            .enumerate()
            .map(|(i, value)| match value {
                Value::Null => Ok(None),
                Value::Number(n) => n.as_f64().map(Some).ok_or(ValidationError::ValueNotNumeric(i)),
                _ => Err(ValidationError::ValueNotNumeric(i)),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(port, claimed_timestamp, channel_names, channel_values)
    }

    /// Build a batch from already typed parts.
    pub fn new(
        source_id: i64,
        claimed_timestamp: Option<String>,
        channel_names: Vec<String>,
        channel_values: Vec<Option<f64>>,
    ) -> Result<Self, ValidationError> {
        if channel_names.len() != channel_values.len() {
            return Err(ValidationError::LengthMismatch {
                names: channel_names.len(),
                values: channel_values.len(),
            });
        }

        {
            let mut seen = HashSet::with_capacity(channel_names.len());
            if let Some(dup) = channel_names.iter().find(|name| !seen.insert(name.as_str())) {
                return Err(ValidationError::DuplicateChannel(dup.clone()));
            }
        }

        Ok(Self {
            source_id,
            claimed_timestamp,
            channel_names,
            channel_values,
        })
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.channel_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel_names.is_empty()
    }

    /// Table header for this batch: `DateTime` followed by the channel names.
    pub fn header(&self) -> Vec<String> {
        std::iter::once(DATETIME_COLUMN.to_string())
            .chain(self.channel_names.iter().cloned())
            .collect()
    }
}

impl TryFrom<WireBatch> for SampleBatch {
    type Error = ValidationError;

    fn try_from(wire: WireBatch) -> Result<Self, Self::Error> {
        Self::new(
            wire.port,
            wire.time_stamp,
            wire.values.names,
            wire.values.values,
        )
    }
}
