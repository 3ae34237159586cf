//! # Lockstep: Clock-Coordinated Work Sharing
//!
//! A leaderless work pool where independent worker processes cooperate
//! through nothing but a shared store and synchronized clocks. Tasks are
//! resumable state machines persisted as JSON records; the wall clock is
//! partitioned into repeating phases, and every worker performs each
//! protocol operation only inside that operation's phase, so all workers
//! compute assignments from identical snapshots without ever talking to
//! each other.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lockstep::{
//!     CountdownMachine, CycleConfig, DirStore, KindRegistry, PhaseSemaphore,
//!     SharedCoordinator, StepWorker,
//! };
//! use std::sync::Arc;
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Every process pointed at the same directory joins the same pool.
//!     let store = Arc::new(DirStore::open("machines").await?);
//!     let registry = Arc::new(KindRegistry::builtin()?);
//!     let semaphore = Arc::new(PhaseSemaphore::new(CycleConfig::default())?);
//!     let coordinator = Arc::new(SharedCoordinator::new(store, registry, semaphore));
//!
//!     coordinator.submit(&CountdownMachine::new("launch", 5)).await?;
//!
//!     let (_shutdown, signal) = watch::channel(false);
//!     let steps = StepWorker::new("worker-a", coordinator).run(signal).await?;
//!     println!("executed {steps} steps");
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod config;
pub mod coordinator;
pub mod error;
pub mod machine;
pub mod phase;
pub mod semaphore;
pub mod source;
pub mod store;
pub mod worker;

// Re-exports for convenience
pub use config::{CycleConfig, CycleConfigBuilder};
pub use coordinator::SharedCoordinator;
pub use error::{CoordError, Result};
pub use machine::builtin::{
    CountdownMachine, SimpleMachine, COUNTDOWN_KIND, SIMPLE_KIND, SLOW_COUNTDOWN_KIND,
};
pub use machine::registry::{KindConstructor, KindRegistry};
pub use machine::{increment_name, MachineState, StateRecord};
pub use phase::{Phase, PhaseKind};
pub use semaphore::PhaseSemaphore;
pub use source::{FileSource, SimpleSource, WorkSource};
pub use store::dir::DirStore;
pub use store::mem::MemStore;
pub use store::{FlagKind, SharedStore, RECORD_EXTENSION};
pub use worker::{DrainWorker, StepWorker};
