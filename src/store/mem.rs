use crate::error::Result;
use crate::machine::StateRecord;
use crate::store::{FlagKind, SharedStore};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::collections::{BTreeMap, BTreeSet};

/// In-memory store for tests and single-process experiments. Same contract
/// as [`DirStore`](crate::store::dir::DirStore); nothing is persisted and
/// the flag races the directory layout absorbs cannot happen here at all.
#[derive(Default)]
pub struct MemStore {
    records: DashMap<String, StateRecord>,
    claimed: DashSet<String>,
    done: DashSet<String>,
    idle: DashSet<String>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn flags(&self, kind: FlagKind) -> &DashSet<String> {
        match kind {
            FlagKind::Claimed => &self.claimed,
            FlagKind::Done => &self.done,
            FlagKind::Idle => &self.idle,
        }
    }
}

#[async_trait]
impl SharedStore for MemStore {
    async fn put_record(&self, name: &str, record: &StateRecord) -> Result<()> {
        self.records.insert(name.to_string(), record.clone());
        Ok(())
    }

    async fn list_records(&self) -> Result<BTreeMap<String, StateRecord>> {
        Ok(self
            .records
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect())
    }

    async fn raise_flag(&self, kind: FlagKind, key: &str) -> Result<()> {
        self.flags(kind).insert(key.to_string());
        Ok(())
    }

    async fn clear_flag(&self, kind: FlagKind, key: &str) -> Result<()> {
        self.flags(kind).remove(key);
        Ok(())
    }

    async fn list_flags(&self, kind: FlagKind) -> Result<BTreeSet<String>> {
        Ok(self
            .flags(kind)
            .iter()
            .map(|entry| entry.key().clone())
            .collect())
    }
}
