use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cycle timing configuration shared by every worker on a pool.
///
/// The coordination cycle is Assignment, Commitment and Update windows in
/// that order, with a quiet buffer after each one. Workers only ever agree
/// about what to do because they all run the same cycle arithmetic against
/// the same wall clock, so every process on a pool must be constructed with
/// identical values here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleConfig {
    // Phase windows
    /// Length of the Assignment window, where work is handed out
    pub assignment: Duration,
    /// Length of the Commitment window, where claims are recorded
    pub commitment: Duration,
    /// Length of the Update window, where results and registrations land
    pub update: Duration,

    // Spacing
    /// Quiet gap inserted after each window to absorb storage latency
    pub buffer: Duration,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            assignment: Duration::from_secs(3),
            commitment: Duration::from_secs(3),
            update: Duration::from_secs(3),
            buffer: Duration::from_secs(1),
        }
    }
}

impl CycleConfig {
    /// Create a new builder for CycleConfig
    pub fn builder() -> CycleConfigBuilder {
        CycleConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.assignment.is_zero() {
            return Err("assignment window must be longer than zero".to_string());
        }
        if self.commitment.is_zero() {
            return Err("commitment window must be longer than zero".to_string());
        }
        if self.update.is_zero() {
            return Err("update window must be longer than zero".to_string());
        }
        // A zero buffer is legal; it only removes the latency slack.

        // Cycle positions are computed in whole milliseconds, so a cycle
        // shorter than that cannot be scheduled.
        if self.cycle_length() < Duration::from_millis(1) {
            return Err("cycle length must be at least one millisecond".to_string());
        }
        Ok(())
    }

    /// Total length of one coordination cycle
    pub fn cycle_length(&self) -> Duration {
        self.assignment + self.commitment + self.update + 3 * self.buffer
    }

    /// Create a configuration with millisecond-scale windows for tests
    /// and local experiments. A full cycle takes 150ms.
    pub fn development() -> Self {
        Self {
            assignment: Duration::from_millis(40),
            commitment: Duration::from_millis(40),
            update: Duration::from_millis(40),
            buffer: Duration::from_millis(10),
        }
    }
}

/// Builder for CycleConfig
pub struct CycleConfigBuilder {
    config: CycleConfig,
}

impl CycleConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            config: CycleConfig::default(),
        }
    }

    /// Set the Assignment window length
    pub fn assignment(mut self, length: Duration) -> Self {
        self.config.assignment = length;
        self
    }

    /// Set the Commitment window length
    pub fn commitment(mut self, length: Duration) -> Self {
        self.config.commitment = length;
        self
    }

    /// Set the Update window length
    pub fn update(mut self, length: Duration) -> Self {
        self.config.update = length;
        self
    }

    /// Set the buffer length
    pub fn buffer(mut self, length: Duration) -> Self {
        self.config.buffer = length;
        self
    }

    /// Set all three phase windows to the same length
    pub fn uniform_phases(mut self, length: Duration) -> Self {
        self.config.assignment = length;
        self.config.commitment = length;
        self.config.update = length;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<CycleConfig, String> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for CycleConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
