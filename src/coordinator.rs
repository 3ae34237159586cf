use crate::error::Result;
use crate::machine::registry::KindRegistry;
use crate::machine::{increment_name, MachineState, StateRecord};
use crate::phase::PhaseKind;
use crate::semaphore::PhaseSemaphore;
use crate::store::{FlagKind, SharedStore};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Phase-gated client of a shared work pool.
///
/// One coordinator serves one process. Every protocol operation waits for
/// its window before touching storage, so across the fleet each kind of
/// write only ever happens inside the same slice of the cycle: assignments
/// are read while nobody writes, claims land together, results land
/// together. That discipline, not locking, is what keeps the pool sane.
///
/// There is no watchdog behind it. A worker that commits to a task and dies
/// before publishing leaves the claim raised forever; operators clean that
/// up by hand.
pub struct SharedCoordinator {
    store: Arc<dyn SharedStore>,
    registry: Arc<KindRegistry>,
    semaphore: Arc<PhaseSemaphore>,
}

impl SharedCoordinator {
    pub fn new(
        store: Arc<dyn SharedStore>,
        registry: Arc<KindRegistry>,
        semaphore: Arc<PhaseSemaphore>,
    ) -> Self {
        Self {
            store,
            registry,
            semaphore,
        }
    }

    pub fn semaphore(&self) -> &PhaseSemaphore {
        &self.semaphore
    }

    /// Put a brand-new machine on the pool. Not phase-gated; seeding
    /// happens before the workers start, or from outside the protocol.
    pub async fn submit(&self, machine: &dyn MachineState) -> Result<()> {
        let record = StateRecord::for_machine(machine);
        self.store.put_record(machine.name(), &record).await?;
        info!(task = %machine.name(), kind = %machine.kind(), "submitted");
        Ok(())
    }

    /// Announce this worker as idle. Waits for the Update window.
    pub async fn register_worker(&self, worker_id: &str) -> Result<()> {
        self.semaphore.wait_until(PhaseKind::Update).await;
        self.store.raise_flag(FlagKind::Idle, worker_id).await?;
        info!(worker = %worker_id, "registered as idle");
        Ok(())
    }

    /// Fetch this worker's assignment for the current cycle.
    ///
    /// Waits for the Assignment window, then computes the same pairing every
    /// other worker computes from the same snapshot, and picks out its own
    /// row. `None` means stand down for this cycle: either more workers than
    /// tasks, or this worker is not in the idle set.
    pub async fn get_work(&self, worker_id: &str) -> Result<Option<Box<dyn MachineState>>> {
        self.semaphore.wait_until(PhaseKind::Assignment).await;

        let records = self.store.list_records().await?;
        let claimed = self.store.list_flags(FlagKind::Claimed).await?;
        let done = self.store.list_flags(FlagKind::Done).await?;
        let idle = self.store.list_flags(FlagKind::Idle).await?;

        let available = available_tasks(&records, &claimed, &done, &self.registry);
        debug!(
            worker = %worker_id,
            records = records.len(),
            idle = idle.len(),
            available = available.len(),
            "assignment snapshot"
        );

        let Some(task_name) = assignment_for(worker_id, &idle, &available) else {
            debug!(worker = %worker_id, "no assignment this cycle");
            return Ok(None);
        };

        // available is drawn from records, so the lookup cannot miss; the
        // filter already weeded out records this registry cannot revive
        let record = match records.get(&task_name) {
            Some(record) => record,
            None => return Ok(None),
        };
        let machine = self.registry.construct(&task_name, record)?;
        info!(worker = %worker_id, task = %task_name, "assigned");
        Ok(Some(machine))
    }

    /// Publicly claim a task. Waits for the Commitment window, raises the
    /// task's claimed flag and drops this worker's idle flag. Every worker
    /// writes only the rows the pairing already gave it, so concurrent
    /// commits never contradict each other.
    pub async fn commit_to_work(&self, worker_id: &str, task_name: &str) -> Result<()> {
        self.semaphore.wait_until(PhaseKind::Commitment).await;
        self.store.raise_flag(FlagKind::Claimed, task_name).await?;
        self.store.clear_flag(FlagKind::Idle, worker_id).await?;
        info!(worker = %worker_id, task = %task_name, "committed");
        Ok(())
    }

    /// Publish the outcome of one step. Waits for the Update window; writes
    /// the follow-up record under the lineage-incremented name when there is
    /// one, then marks the origin done, releases its claim and re-raises
    /// this worker's idle flag. The done flag goes up before the claim comes
    /// down, so a crash between the two writes leaves a finished task that
    /// still looks claimed, never one that looks available again. A step
    /// that outlived its cycle simply catches a later cycle's Update here.
    pub async fn save_result(
        &self,
        worker_id: &str,
        origin: &str,
        successor: Option<Box<dyn MachineState>>,
    ) -> Result<()> {
        self.semaphore.wait_until(PhaseKind::Update).await;

        if let Some(machine) = successor {
            let next_name = increment_name(origin);
            let record = StateRecord::for_machine(machine.as_ref());
            self.store.put_record(&next_name, &record).await?;
            info!(worker = %worker_id, task = %origin, next = %next_name, "published follow-up");
        } else {
            info!(worker = %worker_id, task = %origin, "reached terminal state");
        }

        self.store.raise_flag(FlagKind::Done, origin).await?;
        self.store.clear_flag(FlagKind::Claimed, origin).await?;
        self.store.raise_flag(FlagKind::Idle, worker_id).await?;
        Ok(())
    }

    /// Whether any task is still available. Not phase-gated; the answer is
    /// advisory and the next Assignment window has the final say.
    pub async fn has_work(&self) -> Result<bool> {
        let records = self.store.list_records().await?;
        let claimed = self.store.list_flags(FlagKind::Claimed).await?;
        let done = self.store.list_flags(FlagKind::Done).await?;
        let available = available_tasks(&records, &claimed, &done, &self.registry);
        Ok(!available.is_empty())
    }
}

/// Tasks that can actually be handed out: on the pool, not claimed, not
/// done, and revivable through this process's registry. A record this
/// process cannot revive, whether its kind tag is unrecognized or its
/// payload does not parse, is logged and left alone for a process that can
/// handle it; counting it would keep workers polling for an assignment
/// that never comes.
fn available_tasks(
    records: &BTreeMap<String, StateRecord>,
    claimed: &BTreeSet<String>,
    done: &BTreeSet<String>,
    registry: &KindRegistry,
) -> BTreeSet<String> {
    records
        .iter()
        .filter(|(name, _)| !claimed.contains(*name) && !done.contains(*name))
        .filter(|(name, record)| match registry.construct(name, record) {
            Ok(_) => true,
            Err(e) if e.is_skippable() => {
                warn!(record = %name, kind = %record.state, error = %e, "cannot revive record, leaving it alone");
                false
            }
            // Anything more serious stays visible and surfaces on assignment.
            Err(_) => true,
        })
        .map(|(name, _)| name.clone())
        .collect()
}

/// The deterministic pairing at the heart of assignment: idle workers and
/// available tasks line up in sorted order and the shorter side truncates
/// the longer. Pure arithmetic over two sorted sets; every worker that runs
/// it over the same snapshot reads off the same table, so nobody has to ask
/// anybody what they got. Workers whose names sort early are favored every
/// cycle; that bias is accepted, not a bug to fix.
fn assignment_for(
    worker_id: &str,
    idle: &BTreeSet<String>,
    available: &BTreeSet<String>,
) -> Option<String> {
    idle.iter()
        .zip(available.iter())
        .find(|(worker, _)| worker.as_str() == worker_id)
        .map(|(_, task)| task.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CycleConfig;
    use crate::machine::builtin::{CountdownMachine, COUNTDOWN_KIND};
    use crate::store::mem::MemStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn names(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_pairing_is_positional_and_truncating() {
        let idle = names(&["worker-a", "worker-b"]);
        let tasks = names(&["alpha", "beta", "gamma"]);

        assert_eq!(
            assignment_for("worker-a", &idle, &tasks),
            Some("alpha".to_string())
        );
        assert_eq!(
            assignment_for("worker-b", &idle, &tasks),
            Some("beta".to_string())
        );
        // gamma stays on the pool for a later cycle
    }

    #[test]
    fn test_excess_workers_stand_down() {
        let idle = names(&["worker-a", "worker-b", "worker-c"]);
        let tasks = names(&["alpha", "beta"]);

        assert_eq!(
            assignment_for("worker-c", &idle, &tasks),
            None
        );
    }

    #[test]
    fn test_pairing_ignores_insertion_order() {
        let mut idle = BTreeSet::new();
        idle.insert("worker-b".to_string());
        idle.insert("worker-a".to_string());
        let mut tasks = BTreeSet::new();
        tasks.insert("beta".to_string());
        tasks.insert("alpha".to_string());

        assert_eq!(
            assignment_for("worker-a", &idle, &tasks),
            Some("alpha".to_string())
        );
    }

    #[test]
    fn test_unregistered_worker_gets_nothing() {
        let idle = names(&["worker-a"]);
        let tasks = names(&["alpha"]);
        assert_eq!(assignment_for("stranger", &idle, &tasks), None);
    }

    #[test]
    fn test_available_excludes_claimed_done_and_unrevivable() {
        let registry = KindRegistry::builtin().unwrap();
        let mut records = BTreeMap::new();
        records.insert(
            "open".to_string(),
            StateRecord::new(COUNTDOWN_KIND, json!({ "count": 1 })),
        );
        records.insert(
            "taken".to_string(),
            StateRecord::new(COUNTDOWN_KIND, json!({ "count": 1 })),
        );
        records.insert(
            "finished".to_string(),
            StateRecord::new(COUNTDOWN_KIND, json!({ "count": 1 })),
        );
        records.insert(
            "alien".to_string(),
            StateRecord::new("from-the-future", json!({})),
        );
        // Known kind, but a payload its constructor rejects.
        records.insert(
            "garbled".to_string(),
            StateRecord::new(COUNTDOWN_KIND, json!({ "count": "three" })),
        );

        let available = available_tasks(
            &records,
            &names(&["taken"]),
            &names(&["finished"]),
            &registry,
        );
        assert_eq!(available, names(&["open"]));
    }

    /// Countdown kind with no simulated work, so protocol tests spend
    /// their time in windows rather than in sleeps.
    fn instant_countdown_registry() -> KindRegistry {
        let mut registry = KindRegistry::new();
        registry
            .register(COUNTDOWN_KIND, |name, payload| {
                let count = payload["count"].as_u64().unwrap_or(0) as u32;
                let machine =
                    CountdownMachine::new(name, count).with_step_delay(std::time::Duration::ZERO);
                Ok(Box::new(machine) as Box<dyn MachineState>)
            })
            .unwrap();
        registry
    }

    fn test_coordinator() -> SharedCoordinator {
        let store = Arc::new(MemStore::new());
        let registry = Arc::new(instant_countdown_registry());
        let semaphore =
            Arc::new(PhaseSemaphore::new(CycleConfig::development()).unwrap());
        SharedCoordinator::new(store, registry, semaphore)
    }

    #[tokio::test]
    async fn test_single_worker_protocol_pass() {
        let coordinator = test_coordinator();
        let machine = CountdownMachine::new("launch", 2);
        coordinator.submit(&machine).await.unwrap();
        assert!(coordinator.has_work().await.unwrap());

        coordinator.register_worker("worker-a").await.unwrap();
        let assigned = coordinator
            .get_work("worker-a")
            .await
            .unwrap()
            .expect("the only worker should win the only task");
        assert_eq!(assigned.name(), "launch");

        coordinator
            .commit_to_work("worker-a", assigned.name())
            .await
            .unwrap();
        // Claimed tasks are off the market even before they finish.
        assert!(!coordinator.has_work().await.unwrap());
        let claimed = coordinator
            .store
            .list_flags(FlagKind::Claimed)
            .await
            .unwrap();
        assert!(claimed.contains("launch"));

        let origin = assigned.name().to_string();
        let successor = assigned.tick().await;
        assert!(successor.is_some());
        coordinator
            .save_result("worker-a", &origin, successor)
            .await
            .unwrap();

        // The follow-up is on the pool under the lineage name.
        let records = coordinator.store.list_records().await.unwrap();
        assert!(records.contains_key("launch-1"));
        assert_eq!(records["launch-1"].payload, json!({ "count": 1 }));
        assert!(coordinator.has_work().await.unwrap());

        // Worker is idle again, the origin is done and its claim is gone.
        let idle = coordinator.store.list_flags(FlagKind::Idle).await.unwrap();
        assert!(idle.contains("worker-a"));
        let done = coordinator.store.list_flags(FlagKind::Done).await.unwrap();
        assert!(done.contains("launch"));
        let claimed = coordinator
            .store
            .list_flags(FlagKind::Claimed)
            .await
            .unwrap();
        assert!(claimed.is_empty());
    }

    #[tokio::test]
    async fn test_terminal_result_publishes_no_record() {
        let coordinator = test_coordinator();
        coordinator
            .submit(&CountdownMachine::new("spent", 1))
            .await
            .unwrap();
        coordinator.register_worker("worker-a").await.unwrap();

        let assigned = coordinator.get_work("worker-a").await.unwrap().unwrap();
        coordinator
            .commit_to_work("worker-a", "spent")
            .await
            .unwrap();
        let successor = assigned.tick().await;
        assert!(successor.is_none());
        coordinator
            .save_result("worker-a", "spent", successor)
            .await
            .unwrap();

        let records = coordinator.store.list_records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(!coordinator.has_work().await.unwrap());
    }

    #[tokio::test]
    async fn test_get_work_stands_down_on_empty_pool() {
        let coordinator = test_coordinator();
        coordinator.register_worker("worker-a").await.unwrap();
        let assigned = coordinator.get_work("worker-a").await.unwrap();
        assert!(assigned.is_none());
    }

    #[tokio::test]
    async fn test_unknown_kind_never_assigned() {
        let coordinator = test_coordinator();
        coordinator
            .store
            .put_record("alien", &StateRecord::new("from-the-future", json!({})))
            .await
            .unwrap();

        assert!(!coordinator.has_work().await.unwrap());
        coordinator.register_worker("worker-a").await.unwrap();
        assert!(coordinator.get_work("worker-a").await.unwrap().is_none());

        // The record itself is untouched for a process that understands it.
        let records = coordinator.store.list_records().await.unwrap();
        assert!(records.contains_key("alien"));
    }

    #[tokio::test]
    async fn test_unrevivable_payload_not_counted_as_work() {
        // The strict built-in constructors, not the lenient test ones.
        let store = Arc::new(MemStore::new());
        let registry = Arc::new(KindRegistry::builtin().unwrap());
        let semaphore = Arc::new(PhaseSemaphore::new(CycleConfig::development()).unwrap());
        let coordinator = SharedCoordinator::new(store, registry, semaphore);

        coordinator
            .store
            .put_record(
                "garbled",
                &StateRecord::new(COUNTDOWN_KIND, json!({ "count": "three" })),
            )
            .await
            .unwrap();

        // A record nobody here can revive must not keep the pool looking
        // busy, or every worker would poll for an assignment forever.
        assert!(!coordinator.has_work().await.unwrap());
        coordinator.register_worker("worker-a").await.unwrap();
        assert!(coordinator.get_work("worker-a").await.unwrap().is_none());

        // The record stays put for an operator to repair.
        let records = coordinator.store.list_records().await.unwrap();
        assert!(records.contains_key("garbled"));
    }
}
