use crate::config::CycleConfig;
use crate::error::{CoordError, Result};
use crate::phase::{Phase, PhaseKind};
use chrono::Utc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Clock-driven gate over the coordination windows.
///
/// Holds no mutable state. The active phase is recomputed from the wall
/// clock on every query, so two processes with the same configuration and
/// synchronized clocks always agree on it without talking to each other.
pub struct PhaseSemaphore {
    config: CycleConfig,
    cycle_ms: i64,
    phases: [Phase; 3],
}

impl PhaseSemaphore {
    /// Build the window table for one cycle. Fails when the configuration
    /// does not validate.
    pub fn new(config: CycleConfig) -> Result<Self> {
        config.validate().map_err(CoordError::InvalidConfiguration)?;

        let cycle = config.cycle_length();
        let assignment = Phase::new(
            PhaseKind::Assignment,
            Duration::ZERO,
            config.assignment,
            cycle,
        );
        let commitment_start = assignment.stop() + config.buffer;
        let commitment = Phase::new(
            PhaseKind::Commitment,
            commitment_start,
            commitment_start + config.commitment,
            cycle,
        );
        let update_start = commitment.stop() + config.buffer;
        let update = Phase::new(
            PhaseKind::Update,
            update_start,
            update_start + config.update,
            cycle,
        );

        Ok(Self {
            config,
            cycle_ms: cycle.as_millis() as i64,
            phases: [assignment, commitment, update],
        })
    }

    pub fn config(&self) -> &CycleConfig {
        &self.config
    }

    /// Total length of one coordination cycle
    pub fn cycle_length(&self) -> Duration {
        Duration::from_millis(self.cycle_ms as u64)
    }

    /// Position of the wall clock within the repeating cycle
    pub fn cycle_time(&self) -> Duration {
        let now_ms = Utc::now().timestamp_millis();
        Duration::from_millis(now_ms.rem_euclid(self.cycle_ms) as u64)
    }

    /// The phase active right now
    pub fn current_phase(&self) -> PhaseKind {
        self.phase_at(self.cycle_time())
    }

    /// The phase covering the given cycle position
    pub fn phase_at(&self, cycle_time: Duration) -> PhaseKind {
        self.phases
            .iter()
            .find(|phase| phase.is_active(cycle_time))
            .map(|phase| phase.kind())
            .unwrap_or(PhaseKind::Buffer)
    }

    /// Sleep until the given window is active. Returns immediately when the
    /// clock is already inside it. The buffer is not a schedulable window;
    /// waiting for it is a no-op.
    pub async fn wait_until(&self, kind: PhaseKind) {
        let delay = match self.window(kind) {
            Some(phase) => phase.delay_until_active(self.cycle_time()),
            None => Duration::ZERO,
        };
        if !delay.is_zero() {
            debug!(
                phase = %kind,
                delay_ms = delay.as_millis() as u64,
                "waiting for window"
            );
            sleep(delay).await;
        }
    }

    /// Sleep until the *next* opening of the given window, even when the
    /// clock is currently inside it. A worker that stood down uses this so
    /// it does not re-poll within the window that just rejected it.
    pub async fn wait_for_next(&self, kind: PhaseKind) {
        let delay = match self.window(kind) {
            Some(phase) => phase.delay_until_next_start(self.cycle_time()),
            None => Duration::ZERO,
        };
        if !delay.is_zero() {
            debug!(
                phase = %kind,
                delay_ms = delay.as_millis() as u64,
                "waiting for next window"
            );
            sleep(delay).await;
        }
    }

    fn window(&self, kind: PhaseKind) -> Option<&Phase> {
        self.phases.iter().find(|phase| phase.kind() == kind)
    }
}
