use crate::error::{CoordError, Result};
use crate::machine::registry::KindRegistry;
use crate::machine::{MachineState, StateRecord};
use crate::store::RECORD_EXTENSION;
use async_trait::async_trait;
use std::path::Path;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Hands machines to a local worker, one at a time.
///
/// This is the single-process face of the system: a
/// [`DrainWorker`](crate::worker::DrainWorker) empties one of these with no
/// coordination at all. The pool-wide protocol lives in
/// [`SharedCoordinator`](crate::coordinator::SharedCoordinator) instead.
#[async_trait]
pub trait WorkSource: Send + Sync {
    /// Whether anything is left to hand out
    async fn has_work(&self) -> bool;

    /// Take the next machine; `None` once drained
    async fn get_work(&self) -> Option<Box<dyn MachineState>>;
}

/// Fixed in-memory batch of machines, handed out newest-first
pub struct SimpleSource {
    work: Mutex<Vec<Box<dyn MachineState>>>,
}

impl SimpleSource {
    pub fn new(work: Vec<Box<dyn MachineState>>) -> Self {
        info!(count = work.len(), "initialized in-memory source");
        Self {
            work: Mutex::new(work),
        }
    }
}

#[async_trait]
impl WorkSource for SimpleSource {
    async fn has_work(&self) -> bool {
        !self.work.lock().await.is_empty()
    }

    async fn get_work(&self) -> Option<Box<dyn MachineState>> {
        let mut work = self.work.lock().await;
        let machine = work.pop();
        if let Some(machine) = &machine {
            info!(task = %machine.name(), remaining = work.len(), "delegating work");
        }
        machine
    }
}

/// One-shot directory load: every revivable record in the directory becomes
/// a machine up front, then machines are handed out from memory.
///
/// No flags and no phases; this assumes a single process owns the
/// directory. Records whose kind the registry does not know, or that do not
/// parse, are logged and left behind.
pub struct FileSource {
    work: Mutex<Vec<Box<dyn MachineState>>>,
}

impl FileSource {
    pub async fn load(dir: impl AsRef<Path>, registry: &KindRegistry) -> Result<Self> {
        let dir = dir.as_ref();
        match fs::metadata(dir).await {
            Ok(meta) if meta.is_dir() => {}
            _ => {
                return Err(CoordError::storage(format!(
                    "{} is not a readable directory",
                    dir.display()
                )))
            }
        }

        let mut work: Vec<Box<dyn MachineState>> = Vec::new();
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let raw = fs::read_to_string(&path).await?;
            let record = match StateRecord::from_json(&raw) {
                Ok(record) => record,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unparseable record, skipping");
                    continue;
                }
            };
            match registry.construct(name, &record) {
                Ok(machine) => {
                    info!(task = %name, kind = %record.state, "loaded machine");
                    work.push(machine);
                }
                Err(e) if e.is_skippable() => {
                    warn!(path = %path.display(), error = %e, "skipping record");
                }
                Err(e) => return Err(e),
            }
        }

        info!(count = work.len(), dir = %dir.display(), "initialized file source");
        Ok(Self {
            work: Mutex::new(work),
        })
    }
}

#[async_trait]
impl WorkSource for FileSource {
    async fn has_work(&self) -> bool {
        !self.work.lock().await.is_empty()
    }

    async fn get_work(&self) -> Option<Box<dyn MachineState>> {
        let mut work = self.work.lock().await;
        let machine = work.pop();
        if let Some(machine) = &machine {
            info!(task = %machine.name(), remaining = work.len(), "delegating work");
        }
        machine
    }
}
