//! Standalone pool worker.
//!
//! Run one copy of this per machine (or several per machine) against a
//! shared directory and they will split the work between them with no
//! further configuration. Everything is taken from the environment:
//!
//! - `MACHINE_DIR` selects the shared directory (default `machines`)
//! - `WORKER_NAME` overrides the worker id (falls back to `HOSTNAME`,
//!   then to a random id)
//! - `PHASE_SECONDS` and `BUFFER_SECONDS` set the cycle shape; every
//!   process sharing a directory must use the same values

use anyhow::Context;
use lockstep::{
    CycleConfig, DirStore, KindRegistry, PhaseSemaphore, SharedCoordinator, StepWorker,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let id = worker_id();
    let root = std::env::var("MACHINE_DIR").unwrap_or_else(|_| "machines".to_string());
    let phase = env_seconds("PHASE_SECONDS", 3)?;
    let buffer = env_seconds("BUFFER_SECONDS", 1)?;

    let config = CycleConfig::builder()
        .uniform_phases(phase)
        .buffer(buffer)
        .build()
        .map_err(anyhow::Error::msg)?;
    info!(worker = %id, dir = %root, cycle = ?config.cycle_length(), "starting");

    let store = Arc::new(DirStore::open(root).await?);
    let registry = Arc::new(KindRegistry::builtin()?);
    let semaphore = Arc::new(PhaseSemaphore::new(config)?);
    let coordinator = Arc::new(SharedCoordinator::new(store, registry, semaphore));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, finishing the current step");
                let _ = shutdown_tx.send(true);
            }
            Err(error) => warn!(%error, "could not install interrupt handler"),
        }
    });

    let steps = StepWorker::new(id, coordinator).run(shutdown_rx).await?;
    info!(steps, "worker exited");
    Ok(())
}

fn worker_id() -> String {
    std::env::var("WORKER_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("worker-{}", Uuid::new_v4()))
}

fn env_seconds(key: &str, default: u64) -> anyhow::Result<Duration> {
    match std::env::var(key) {
        Ok(raw) => {
            let seconds: u64 = raw
                .parse()
                .with_context(|| format!("{key} must be a whole number of seconds, got {raw:?}"))?;
            Ok(Duration::from_secs(seconds))
        }
        Err(_) => Ok(Duration::from_secs(default)),
    }
}
