use crate::error::{CoordError, Result};
use crate::machine::registry::KindRegistry;
use crate::machine::MachineState;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;

/// Kind tag of [`SimpleMachine`]
pub const SIMPLE_KIND: &str = "simple";
/// Kind tag of [`CountdownMachine`]
pub const COUNTDOWN_KIND: &str = "countdown";
/// Kind tag of the slow [`CountdownMachine`] variant
pub const SLOW_COUNTDOWN_KIND: &str = "slow-countdown";

const SIMPLE_STEP: Duration = Duration::from_secs(1);
const COUNTDOWN_STEP: Duration = Duration::from_secs(1);
// Long enough to outlast a default cycle on purpose: a worker mid-step
// misses windows and catches a later cycle's Update instead.
const SLOW_COUNTDOWN_STEP: Duration = Duration::from_secs(10);

/// Register the stock kinds on a registry
pub fn register_defaults(registry: &mut KindRegistry) -> Result<()> {
    registry.register(SIMPLE_KIND, |name, payload| {
        let machine = SimpleMachine::from_payload(name, payload)?;
        Ok(Box::new(machine) as Box<dyn MachineState>)
    })?;
    registry.register(COUNTDOWN_KIND, |name, payload| {
        let count = parse_count(&name, payload)?;
        Ok(Box::new(CountdownMachine::new(name, count)) as Box<dyn MachineState>)
    })?;
    registry.register(SLOW_COUNTDOWN_KIND, |name, payload| {
        let count = parse_count(&name, payload)?;
        Ok(Box::new(CountdownMachine::slow(name, count)) as Box<dyn MachineState>)
    })?;
    Ok(())
}

#[derive(Deserialize)]
struct SimplePayload {
    target: String,
}

#[derive(Deserialize)]
struct CountdownPayload {
    count: u32,
}

fn parse_count(record: &str, payload: &Value) -> Result<u32> {
    let parsed: CountdownPayload = serde_json::from_value(payload.clone())
        .map_err(|e| CoordError::malformed(record, e.to_string()))?;
    Ok(parsed.count)
}

/// One-shot machine that says something and finishes
pub struct SimpleMachine {
    name: String,
    target: String,
    step_delay: Duration,
}

impl SimpleMachine {
    pub fn new(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            step_delay: SIMPLE_STEP,
        }
    }

    fn from_payload(name: String, payload: &Value) -> Result<Self> {
        let parsed: SimplePayload = serde_json::from_value(payload.clone())
            .map_err(|e| CoordError::malformed(&name, e.to_string()))?;
        Ok(Self::new(name, parsed.target))
    }

    /// Override how long one step pretends to work
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }
}

#[async_trait]
impl MachineState for SimpleMachine {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        SIMPLE_KIND
    }

    fn payload(&self) -> Value {
        json!({ "target": self.target })
    }

    async fn tick(self: Box<Self>) -> Option<Box<dyn MachineState>> {
        info!(machine = %self.name, "saying {}", self.target);
        sleep(self.step_delay).await;
        // One terminal state, no follow-up work
        None
    }
}

/// Machine that counts down one step per tick until it reaches zero.
///
/// Each tick decrements the counter and, while anything remains, hands back
/// the decremented state as its follow-up. The slow variant does the same
/// with a step that outlasts a default cycle.
pub struct CountdownMachine {
    name: String,
    count: u32,
    kind: &'static str,
    step_delay: Duration,
}

impl CountdownMachine {
    pub fn new(name: impl Into<String>, count: u32) -> Self {
        Self {
            name: name.into(),
            count,
            kind: COUNTDOWN_KIND,
            step_delay: COUNTDOWN_STEP,
        }
    }

    /// Slow variant: same state shape, much longer step
    pub fn slow(name: impl Into<String>, count: u32) -> Self {
        Self {
            name: name.into(),
            count,
            kind: SLOW_COUNTDOWN_KIND,
            step_delay: SLOW_COUNTDOWN_STEP,
        }
    }

    /// Override how long one step pretends to work
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

#[async_trait]
impl MachineState for CountdownMachine {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        self.kind
    }

    fn payload(&self) -> Value {
        json!({ "count": self.count })
    }

    async fn tick(self: Box<Self>) -> Option<Box<dyn MachineState>> {
        let mut machine = *self;
        machine.count = machine.count.saturating_sub(1);
        info!(machine = %machine.name, remaining = machine.count, "counting down");
        sleep(machine.step_delay).await;
        if machine.count > 0 {
            Some(Box::new(machine) as Box<dyn MachineState>)
        } else {
            None
        }
    }
}
