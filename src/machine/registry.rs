use crate::error::{CoordError, Result};
use crate::machine::{MachineState, StateRecord};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Constructor invoked to revive a machine from its stored record. Receives
/// the machine's name (the storage key) and the record payload.
pub type KindConstructor =
    Arc<dyn Fn(String, &Value) -> Result<Box<dyn MachineState>> + Send + Sync>;

/// Closed mapping from kind tag to machine constructor.
///
/// Only kinds registered here can be revived from shared storage; a record
/// carrying any other tag is reported as
/// [`UnknownKind`](CoordError::UnknownKind) and left where it is. The set is
/// fixed at startup, before the registry is shared between tasks.
pub struct KindRegistry {
    constructors: HashMap<String, KindConstructor>,
}

impl KindRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Registry preloaded with the built-in kinds
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::new();
        crate::machine::builtin::register_defaults(&mut registry)?;
        Ok(registry)
    }

    /// Register a constructor for a kind tag. Registering a tag twice is an
    /// error; replacing a kind's behavior mid-run would split the pool.
    pub fn register<F>(&mut self, kind: impl Into<String>, constructor: F) -> Result<()>
    where
        F: Fn(String, &Value) -> Result<Box<dyn MachineState>> + Send + Sync + 'static,
    {
        let kind = kind.into();
        if self.constructors.contains_key(&kind) {
            return Err(CoordError::KindAlreadyRegistered { kind });
        }
        self.constructors.insert(kind, Arc::new(constructor));
        Ok(())
    }

    /// Revive a machine from its stored record
    pub fn construct(&self, name: &str, record: &StateRecord) -> Result<Box<dyn MachineState>> {
        let constructor =
            self.constructors
                .get(&record.state)
                .ok_or_else(|| CoordError::UnknownKind {
                    kind: record.state.clone(),
                    record: name.to_string(),
                })?;
        constructor(name.to_string(), &record.payload)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    /// Registered kind tags, sorted for stable output
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.constructors.keys().cloned().collect();
        kinds.sort();
        kinds
    }
}

impl Default for KindRegistry {
    fn default() -> Self {
        Self::new()
    }
}
