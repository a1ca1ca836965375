//! tally-sim: run a reward scenario and stream its events.
//!
//! Usage: `tally-sim <scenario.toml>`
//!
//! Committed events are written to stdout as JSON lines while the scenario
//! runs; the final summary follows as a single pretty-printed JSON object.
//! Logs go to stderr, filtered by `RUST_LOG` (default `tally=info`).

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use tally_sim::{run, BusSink, EventBus, Scenario};

/// Events buffered per subscriber before the writer starts losing them.
const BUS_CAPACITY: usize = 4096;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("tally=info".parse()?),
        )
        .init();

    let path: PathBuf = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: tally-sim <scenario.toml>")?;
    let scenario = Scenario::load(&path).with_context(|| format!("loading {}", path.display()))?;
    info!(path = %path.display(), steps = scenario.steps.len(), "scenario loaded");

    let bus = EventBus::new(BUS_CAPACITY);
    let mut rx = bus.subscribe();
    let writer = tokio::spawn(async move {
        let mut written = 0u64;
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let line = serde_json::to_string(&event)?;
                    writeln!(std::io::stdout().lock(), "{line}")?;
                    written += 1;
                }
                Err(RecvError::Lagged(missed)) => warn!(missed, "event writer fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
        anyhow::Ok(written)
    });

    let sink = BusSink::new(bus.clone());
    let summary = tokio::task::spawn_blocking(move || run(&scenario, sink)).await??;
    let published = bus.sequence();
    drop(bus);

    let written = writer.await??;
    info!(published, written, "event stream closed");

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
