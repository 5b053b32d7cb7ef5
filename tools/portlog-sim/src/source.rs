// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sample sources and port pairs.

use anyhow::{bail, Context, Result};
use portlog::{table, WireBatch, WireChannels};
use std::f64::consts::TAU;
use std::path::Path;

/// Raw value injected on the dirty port in place of a reading.
pub const DROP_SENTINEL: f64 = -400_000.0;

/// Produces one row of channel values per step.
pub trait SampleSource: Send {
    fn names(&self) -> &[String];

    /// Values for the current step, then advance.
    fn next_values(&mut self) -> Vec<f64>;
}

/// Rows replayed from a CSV file, looping at the end.
///
/// The first column is a timestamp and is ignored. Rows with a cell that does
/// not parse as a number are dropped.
pub struct Dataset {
    names: Vec<String>,
    rows: Vec<Vec<f64>>,
    cursor: usize,
}

impl Dataset {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading dataset {}", path.display()))?;
        Self::from_csv(&text).with_context(|| format!("loading dataset {}", path.display()))
    }

    pub fn from_csv(text: &str) -> Result<Self> {
        // Last line of a hand-edited file often lacks a newline
        let parsed = if text.ends_with('\n') {
            table::parse(text)
        } else {
            table::parse(&format!("{}\n", text))
        };

        let mut records = parsed.records.into_iter();
        let Some(header) = records.next() else {
            bail!("dataset is empty");
        };
        if header.len() < 2 {
            bail!("dataset needs a timestamp column and at least one channel");
        }
        let names = header[1..].to_vec();

        let rows: Vec<Vec<f64>> = records
            .filter(|record| record.len() == header.len())
            .filter_map(|record| {
                record[1..]
                    .iter()
                    .map(|cell| cell.trim().parse::<f64>().ok().filter(|v| v.is_finite()))
                    .collect::<Option<Vec<f64>>>()
            })
            .collect();

        if rows.is_empty() {
            bail!("dataset has no complete numeric rows");
        }

        Ok(Self {
            names,
            rows,
            cursor: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl SampleSource for Dataset {
    fn names(&self) -> &[String] {
        &self.names
    }

    fn next_values(&mut self) -> Vec<f64> {
        let values = self.rows[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.rows.len();
        values
    }
}

/// Sine waves plus uniform noise.
pub struct Synthetic {
    names: Vec<String>,
    step: u64,
    period: f64,
    rng: fastrand::Rng,
}

impl Synthetic {
    pub fn new(channels: usize, rng: fastrand::Rng) -> Self {
        Self {
            names: (1..=channels).map(|i| format!("ch{}", i)).collect(),
            step: 0,
            period: 120.0,
            rng,
        }
    }
}

impl SampleSource for Synthetic {
    fn names(&self) -> &[String] {
        &self.names
    }

    fn next_values(&mut self) -> Vec<f64> {
        let t = self.step as f64;
        self.step += 1;

        (0..self.names.len())
            .map(|i| {
                let offset = 20.0 + 5.0 * i as f64;
                let phase = i as f64 * 0.7;
                let wave = 10.0 * (TAU * t / self.period + phase).sin();
                let noise = self.rng.f64() - 0.5;
                ((offset + wave + noise) * 100.0).round() / 100.0
            })
            .collect()
    }
}

/// One source feeding two ports: a dirty one with dropped readings, and a
/// clean one with the same values untouched.
pub struct PortPair {
    pub dirty_port: i64,
    pub clean_port: i64,
    drop_chance: f64,
    source: Box<dyn SampleSource>,
    rng: fastrand::Rng,
}

impl PortPair {
    pub fn new(
        dirty_port: i64,
        clean_port: i64,
        drop_chance: f64,
        source: Box<dyn SampleSource>,
        rng: fastrand::Rng,
    ) -> Self {
        Self {
            dirty_port,
            clean_port,
            drop_chance: drop_chance.clamp(0.0, 1.0),
            source,
            rng,
        }
    }

    /// Next `(dirty, clean)` batches and the number of dropped readings.
    pub fn next_batches(&mut self, time_stamp: &str) -> (WireBatch, WireBatch, usize) {
        let names = self.source.names().to_vec();
        let clean = self.source.next_values();

        let mut dropped = 0;
        let dirty: Vec<Option<f64>> = clean
            .iter()
            .map(|&v| {
                if self.drop_chance > 0.0 && self.rng.f64() < self.drop_chance {
                    dropped += 1;
                    Some(DROP_SENTINEL)
                } else {
                    Some(v)
                }
            })
            .collect();

        let batch = |port: i64, values: Vec<Option<f64>>| WireBatch {
            port,
            time_stamp: Some(time_stamp.to_string()),
            values: WireChannels {
                names: names.clone(),
                values,
            },
        };

        (
            batch(self.dirty_port, dirty),
            batch(self.clean_port, clean.into_iter().map(Some).collect()),
            dropped,
        )
    }
}
