use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The named windows of one coordination cycle, in cycle order.
///
/// `Buffer` is every point of the cycle not covered by a named window; it
/// carries no operations and exists to absorb storage write latency between
/// windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhaseKind {
    Assignment,
    Commitment,
    Update,
    Buffer,
}

impl PhaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseKind::Assignment => "assignment",
            PhaseKind::Commitment => "commitment",
            PhaseKind::Update => "update",
            PhaseKind::Buffer => "buffer",
        }
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A half-open window `[start, stop)` within a repeating cycle.
///
/// Purely arithmetic; the blocking waits live in
/// [`PhaseSemaphore`](crate::semaphore::PhaseSemaphore). All positions are
/// offsets from the start of the current cycle and must lie within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Phase {
    kind: PhaseKind,
    start: Duration,
    stop: Duration,
    cycle: Duration,
}

impl Phase {
    pub(crate) fn new(kind: PhaseKind, start: Duration, stop: Duration, cycle: Duration) -> Self {
        Self {
            kind,
            start,
            stop,
            cycle,
        }
    }

    pub fn kind(&self) -> PhaseKind {
        self.kind
    }

    pub fn start(&self) -> Duration {
        self.start
    }

    pub fn stop(&self) -> Duration {
        self.stop
    }

    /// Whether the window covers the given cycle position. The start is
    /// inclusive and the stop exclusive, so adjacent windows never overlap.
    pub fn is_active(&self, cycle_time: Duration) -> bool {
        self.start <= cycle_time && cycle_time < self.stop
    }

    /// How long until the window is (next) active. Zero while inside it;
    /// otherwise the distance to `start`, wrapped forward one cycle when
    /// the window has already passed.
    pub fn delay_until_active(&self, cycle_time: Duration) -> Duration {
        if self.is_active(cycle_time) {
            Duration::ZERO
        } else {
            self.delay_until_next_start(cycle_time)
        }
    }

    /// How long until the window next *opens*, even when currently inside
    /// it. A worker standing down uses this to skip the remainder of the
    /// window it is in.
    pub fn delay_until_next_start(&self, cycle_time: Duration) -> Duration {
        if cycle_time < self.start {
            self.start - cycle_time
        } else {
            self.cycle.saturating_sub(cycle_time) + self.start
        }
    }
}
