pub mod builtin;
pub mod registry;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A resumable unit of work.
///
/// A machine owns everything it needs to execute its next step. `tick`
/// consumes the machine, performs exactly one step and hands back the
/// follow-up state, or `None` once the work is finished. Between steps the
/// machine lives as a [`StateRecord`] in shared storage, so any worker on
/// the pool can pick it up where the previous one left off.
#[async_trait]
pub trait MachineState: Send + Sync {
    /// Storage key of this machine, unique within the pool
    fn name(&self) -> &str;

    /// Registry tag identifying the concrete kind
    fn kind(&self) -> &str;

    /// Kind-specific step state, as persisted in the record payload
    fn payload(&self) -> Value;

    /// Execute one step. `None` means the machine reached a terminal state.
    async fn tick(self: Box<Self>) -> Option<Box<dyn MachineState>>;
}

/// Wire format of a persisted machine: the kind tag plus whatever the kind
/// needs to resume. The machine's name is deliberately *not* part of the
/// record; identity comes from the storage key it is filed under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    /// Kind tag resolved through the registry at load time
    pub state: String,
    /// Kind-specific fields
    pub payload: Value,
}

impl StateRecord {
    pub fn new(state: impl Into<String>, payload: Value) -> Self {
        Self {
            state: state.into(),
            payload,
        }
    }

    /// Snapshot a live machine into its storable form
    pub fn for_machine(machine: &dyn MachineState) -> Self {
        Self {
            state: machine.kind().to_string(),
            payload: machine.payload(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Derive the name a machine's follow-up state is filed under.
///
/// A trailing `-<number>` suffix is incremented; any other name gets `-1`
/// appended. The sequence `foo`, `foo-1`, `foo-2`, ... records how many
/// steps a lineage has taken. Nothing namespaces lineages: a submitted
/// record that happens to be called `foo-2` collides with the second
/// successor of `foo`. Callers own the namespace.
///
/// A suffix that cannot be incremented, because it sits at `u64::MAX`, is
/// treated like any other non-numeric tail and gets `-1` appended instead.
pub fn increment_name(name: &str) -> String {
    if let Some((stem, suffix)) = name.rsplit_once('-') {
        if let Some(next) = suffix.parse::<u64>().ok().and_then(|n| n.checked_add(1)) {
            return format!("{}-{}", stem, next);
        }
    }
    format!("{}-1", name)
}
