use crate::error::Result;
use crate::machine::StateRecord;
use crate::store::{FlagKind, SharedStore, RECORD_EXTENSION};
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Shared storage on a plain directory, the production medium.
///
/// Records are `<name>.state` files at the root; each flag namespace is a
/// subdirectory of empty marker files. Nothing here is atomic or fsynced:
/// the layout leans entirely on the phase windows and buffers to keep
/// writers from clobbering what a reader depends on.
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    /// Open a store rooted at the given directory, creating the layout when
    /// it is missing. Concurrent workers race to create these directories;
    /// whoever loses the race finds them already present, which is fine.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        for kind in FlagKind::ALL {
            fs::create_dir_all(root.join(kind.as_str())).await?;
        }
        debug!(root = %root.display(), "opened shared directory store");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.{RECORD_EXTENSION}"))
    }

    fn flag_path(&self, kind: FlagKind, key: &str) -> PathBuf {
        self.root.join(kind.as_str()).join(key)
    }
}

#[async_trait]
impl SharedStore for DirStore {
    async fn put_record(&self, name: &str, record: &StateRecord) -> Result<()> {
        let path = self.record_path(name);
        fs::write(&path, record.to_json()?).await?;
        debug!(record = %name, path = %path.display(), "wrote record");
        Ok(())
    }

    async fn list_records(&self) -> Result<BTreeMap<String, StateRecord>> {
        let mut found = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) => found.push((stem.to_string(), path.clone())),
                None => debug!(path = %path.display(), "skipping record with non-UTF-8 name"),
            }
        }

        let reads = join_all(found.iter().map(|(_, path)| fs::read_to_string(path))).await;

        let mut records = BTreeMap::new();
        for ((name, path), raw) in found.iter().zip(reads) {
            let raw = match raw {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(record = %name, error = %e, "failed to read record, skipping");
                    continue;
                }
            };
            match StateRecord::from_json(&raw) {
                Ok(record) => {
                    records.insert(name.clone(), record);
                }
                // Another worker may be mid-write; the record stays behind
                // and shows up whole on a later listing.
                Err(e) => {
                    warn!(
                        record = %name,
                        path = %path.display(),
                        error = %e,
                        "unparseable record, skipping"
                    );
                }
            }
        }
        Ok(records)
    }

    async fn raise_flag(&self, kind: FlagKind, key: &str) -> Result<()> {
        // Touch semantics: whoever creates the file first wins and the rest
        // of the writes change nothing.
        fs::write(self.flag_path(kind, key), []).await?;
        Ok(())
    }

    async fn clear_flag(&self, kind: FlagKind, key: &str) -> Result<()> {
        match fs::remove_file(self.flag_path(kind, key)).await {
            Ok(()) => Ok(()),
            // Somebody else already cleared it, which is just as good.
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_flags(&self, kind: FlagKind) -> Result<BTreeSet<String>> {
        let mut flags = BTreeSet::new();
        let mut entries = fs::read_dir(self.root.join(kind.as_str())).await?;
        while let Some(entry) = entries.next_entry().await? {
            match entry.file_name().to_str() {
                Some(key) => {
                    flags.insert(key.to_string());
                }
                None => debug!(flag = %kind, "skipping flag with non-UTF-8 name"),
            }
        }
        Ok(flags)
    }
}
