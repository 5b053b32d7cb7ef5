// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! portlog-sim - Synthetic traffic for the portlog receiver
//!
//! Every source feeds a pair of ports. The first port gets readings randomly
//! replaced by the `-400000` error code, the second gets the same readings
//! untouched.
//!
//! ```bash
//! # Two synthetic sources on ports 8092..8095
//! portlog-sim
//!
//! # Replay datasets with per-source drop chances
//! portlog-sim --dataset power.csv --drop-chance 0.3 \
//!             --dataset energy.csv --drop-chance 0.2
//! ```

mod source;

use anyhow::{bail, Result};
use clap::Parser;
use source::{Dataset, PortPair, SampleSource, Synthetic};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// portlog traffic simulator
#[derive(Parser, Debug)]
#[command(name = "portlog-sim")]
#[command(version)]
#[command(about = "Post synthetic sample batches to a portlog receiver")]
struct Args {
    /// Receiver endpoint
    #[arg(short, long, default_value = "http://127.0.0.1:8001/data")]
    url: String,

    /// Seconds between two posts to the same port
    #[arg(short, long, default_value_t = 5.0)]
    interval: f64,

    /// CSV dataset to replay (repeatable, one port pair each)
    #[arg(long)]
    dataset: Vec<PathBuf>,

    /// Drop chance per source, in order (the last one repeats)
    #[arg(long, default_values_t = [0.3, 0.2])]
    drop_chance: Vec<f64>,

    /// Synthetic sources to run when no dataset is given
    #[arg(long, default_value_t = 2)]
    sources: usize,

    /// Channels per synthetic source
    #[arg(long, default_value_t = 4)]
    channels: usize,

    /// First port; pairs use consecutive ports from here
    #[arg(long, default_value_t = 8092)]
    base_port: i64,

    /// Stop after this many rounds over all ports
    #[arg(short = 'n', long)]
    count: Option<u64>,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 2.5)]
    timeout: f64,

    /// Seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    for (flag, secs) in [("--interval", args.interval), ("--timeout", args.timeout)] {
        if !secs.is_finite() || secs <= 0.0 {
            bail!("{} must be a positive number of seconds", flag);
        }
    }

    let mut pairs = build_pairs(&args)?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs_f64(args.timeout))
        .build()?;

    let port_count = pairs.len() * 2;
    let pause = Duration::from_secs_f64(args.interval / port_count as f64);

    tracing::info!("portlog-sim started");
    tracing::info!("  Sending to: {}", args.url);
    for pair in &pairs {
        tracing::info!(
            "  Ports: {} (with drops), {} (clean)",
            pair.dirty_port,
            pair.clean_port
        );
    }

    let mut stats = Stats::default();
    let mut rounds = 0u64;
    'outer: while running.load(Ordering::SeqCst) {
        if args.count.is_some_and(|count| rounds >= count) {
            break;
        }

        for pair in &mut pairs {
            let now = chrono::Local::now().format(portlog::TIME_FORMAT).to_string();
            let (dirty, clean, dropped) = pair.next_batches(&now);

            for (batch, drops) in [(dirty, dropped), (clean, 0)] {
                post(&client, &args.url, &batch, drops, &mut stats);
                if !sleep_while_running(pause, &running) {
                    break 'outer;
                }
            }
        }
        rounds += 1;
    }

    tracing::info!(
        "Stopped after {} rounds: {} sent, {} failed",
        rounds,
        stats.sent,
        stats.failed
    );
    Ok(())
}

#[derive(Debug, Default)]
struct Stats {
    sent: u64,
    failed: u64,
}

fn build_pairs(args: &Args) -> Result<Vec<PortPair>> {
    let mut rng = match args.seed {
        Some(seed) => fastrand::Rng::with_seed(seed),
        None => fastrand::Rng::new(),
    };

    let sources: Vec<Box<dyn SampleSource>> = if args.dataset.is_empty() {
        if args.sources == 0 || args.channels == 0 {
            bail!("--sources and --channels must be positive");
        }
        (0..args.sources)
            .map(|_| Box::new(Synthetic::new(args.channels, rng.fork())) as Box<dyn SampleSource>)
            .collect()
    } else {
        let mut sources = Vec::with_capacity(args.dataset.len());
        for path in &args.dataset {
            let dataset = Dataset::from_file(path)?;
            tracing::info!(
                "Loaded {} rows from {}",
                dataset.len(),
                path.display()
            );
            sources.push(Box::new(dataset) as Box<dyn SampleSource>);
        }
        sources
    };

    Ok(sources
        .into_iter()
        .enumerate()
        .map(|(i, source)| {
            let dirty_port = args.base_port + 2 * i as i64;
            PortPair::new(
                dirty_port,
                dirty_port + 1,
                drop_chance_for(&args.drop_chance, i),
                source,
                rng.fork(),
            )
        })
        .collect())
}

/// Drop chance for source `i`; the last configured value repeats.
fn drop_chance_for(chances: &[f64], i: usize) -> f64 {
    chances
        .get(i)
        .or_else(|| chances.last())
        .copied()
        .unwrap_or(0.0)
}

fn post(
    client: &reqwest::blocking::Client,
    url: &str,
    batch: &portlog::WireBatch,
    dropped: usize,
    stats: &mut Stats,
) {
    match client.post(url).json(batch).send() {
        Ok(resp) if resp.status().is_success() => {
            stats.sent += 1;
            tracing::info!("port {} | {} | drops: {}", batch.port, resp.status(), dropped);
        }
        Ok(resp) => {
            stats.failed += 1;
            let status = resp.status();
            let body = resp.text().unwrap_or_default();
            tracing::warn!("port {} | {} | {}", batch.port, status, body.trim());
        }
        Err(e) => {
            stats.failed += 1;
            tracing::error!("port {} | error: {}", batch.port, e);
        }
    }
}

/// Sleep in short slices so Ctrl-C is honored quickly. Returns false once
/// stopped.
fn sleep_while_running(total: Duration, running: &AtomicBool) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if !running.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep((deadline - now).min(Duration::from_millis(100)));
    }
}
