use crate::coordinator::SharedCoordinator;
use crate::error::Result;
use crate::phase::PhaseKind;
use crate::source::WorkSource;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Single-process worker that empties a local source.
///
/// Greedy on purpose: once it holds a machine it ticks it all the way to a
/// terminal state instead of yielding between steps. [`StepWorker`] is the
/// cooperative counterpart for shared pools.
pub struct DrainWorker {
    source: Arc<dyn WorkSource>,
}

impl DrainWorker {
    pub fn new(source: Arc<dyn WorkSource>) -> Self {
        Self { source }
    }

    /// Run until the source is empty. Returns the number of steps executed.
    pub async fn run(&self) -> usize {
        let mut steps = 0usize;
        while self.source.has_work().await {
            debug!("retrieving work");
            let mut current = self.source.get_work().await;
            while let Some(machine) = current {
                steps += 1;
                current = machine.tick().await;
            }
        }
        info!(steps, "no more work to do");
        steps
    }
}

/// Pool worker: the full coordination protocol, one machine step per cycle.
///
/// After registering, each cycle is fetch assignment, commit, run exactly
/// one step, publish. Yielding between steps keeps the pairing fresh: a
/// lineage hops between workers instead of being monopolized by whoever
/// started it. A worker with no assignment stands down until the next
/// Assignment window opens so it does not re-poll the one that rejected it.
/// The loop ends when the pool has nothing left or when `shutdown` flips;
/// an in-flight step always publishes its result before the worker stops.
pub struct StepWorker {
    id: String,
    coordinator: Arc<SharedCoordinator>,
}

impl StepWorker {
    pub fn new(id: impl Into<String>, coordinator: Arc<SharedCoordinator>) -> Self {
        Self {
            id: id.into(),
            coordinator,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Drive the protocol until the pool drains or shutdown is requested.
    /// Returns the number of steps this worker executed.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<usize> {
        info!(worker = %self.id, "worker starting");
        self.coordinator.register_worker(&self.id).await?;

        let mut steps = 0usize;
        loop {
            if *shutdown.borrow() {
                break;
            }
            if !self.coordinator.has_work().await? {
                info!(worker = %self.id, "no more work to do");
                break;
            }

            let assigned = tokio::select! {
                result = self.coordinator.get_work(&self.id) => result?,
                _ = shutdown_signalled(&mut shutdown) => break,
            };

            match assigned {
                Some(machine) => {
                    let origin = machine.name().to_string();
                    self.coordinator.commit_to_work(&self.id, &origin).await?;
                    let successor = machine.tick().await;
                    steps += 1;
                    self.coordinator
                        .save_result(&self.id, &origin, successor)
                        .await?;
                }
                None => {
                    debug!(worker = %self.id, "standing down this cycle");
                    tokio::select! {
                        _ = self
                            .coordinator
                            .semaphore()
                            .wait_for_next(PhaseKind::Assignment) => {}
                        _ = shutdown_signalled(&mut shutdown) => break,
                    }
                }
            }
        }

        info!(worker = %self.id, steps, "worker stopped");
        Ok(steps)
    }
}

/// Resolves when the controller asks for shutdown. Once the sender is gone
/// shutdown can no longer arrive, so this parks forever rather than
/// resolving spuriously.
async fn shutdown_signalled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CycleConfig;
    use crate::machine::builtin::{CountdownMachine, SimpleMachine, COUNTDOWN_KIND};
    use crate::machine::registry::KindRegistry;
    use crate::machine::MachineState;
    use crate::semaphore::PhaseSemaphore;
    use crate::source::SimpleSource;
    use crate::store::mem::MemStore;
    use crate::store::{FlagKind, SharedStore};
    use std::time::Duration;

    fn instant_countdown_registry() -> KindRegistry {
        let mut registry = KindRegistry::new();
        registry
            .register(COUNTDOWN_KIND, |name, payload| {
                let count = payload["count"].as_u64().unwrap_or(0) as u32;
                let machine =
                    CountdownMachine::new(name, count).with_step_delay(Duration::ZERO);
                Ok(Box::new(machine) as Box<dyn MachineState>)
            })
            .unwrap();
        registry
    }

    fn pool() -> (Arc<SharedCoordinator>, Arc<MemStore>) {
        let store = Arc::new(MemStore::new());
        let registry = Arc::new(instant_countdown_registry());
        let semaphore = Arc::new(PhaseSemaphore::new(CycleConfig::development()).unwrap());
        let coordinator = Arc::new(SharedCoordinator::new(
            store.clone(),
            registry,
            semaphore,
        ));
        (coordinator, store)
    }

    #[tokio::test]
    async fn test_drain_worker_runs_everything_to_terminal() {
        let source = Arc::new(SimpleSource::new(vec![
            Box::new(CountdownMachine::new("launch", 3).with_step_delay(Duration::ZERO))
                as Box<dyn MachineState>,
            Box::new(SimpleMachine::new("greet", "Hello.").with_step_delay(Duration::ZERO))
                as Box<dyn MachineState>,
        ]));

        let worker = DrainWorker::new(source.clone());
        let steps = worker.run().await;

        // One step for the greeting, three for the countdown lineage.
        assert_eq!(steps, 4);
        assert!(!source.has_work().await);
    }

    #[tokio::test]
    async fn test_step_worker_drains_the_pool() {
        let (coordinator, store) = pool();
        coordinator
            .submit(&CountdownMachine::new("launch", 2))
            .await
            .unwrap();

        let (_tx, rx) = watch::channel(false);
        let worker = StepWorker::new("worker-a", coordinator);
        let steps = worker.run(rx).await.unwrap();

        assert_eq!(steps, 2);
        let done = store.list_flags(FlagKind::Done).await.unwrap();
        assert!(done.contains("launch"));
        assert!(done.contains("launch-1"));
        let claimed = store.list_flags(FlagKind::Claimed).await.unwrap();
        assert!(claimed.is_empty());
        let records = store.list_records().await.unwrap();
        assert!(records.contains_key("launch-1"));
        assert!(!records.contains_key("launch-2"));
    }

    #[tokio::test]
    async fn test_step_worker_stops_on_shutdown() {
        let (coordinator, _store) = pool();
        coordinator
            .submit(&CountdownMachine::new("endless", 10_000))
            .await
            .unwrap();

        let (tx, rx) = watch::channel(false);
        let worker = StepWorker::new("worker-a", coordinator);
        let handle = tokio::spawn(async move { worker.run(rx).await });

        tokio::time::sleep(Duration::from_millis(200)).await;
        tx.send(true).unwrap();

        let steps = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker should stop promptly after shutdown")
            .unwrap()
            .unwrap();
        assert!(steps < 10_000);
    }
}
