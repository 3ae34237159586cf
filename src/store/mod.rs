pub mod dir;
pub mod mem;

use crate::error::Result;
use crate::machine::StateRecord;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// File extension that marks a record in directory-backed layouts
pub const RECORD_EXTENSION: &str = "state";

/// The flag namespaces a pool coordinates through. A flag is pure presence;
/// raising one twice or clearing one that is gone carries no information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlagKind {
    /// Task was handed to a worker and is off the market
    Claimed,
    /// Task's step completed and its result is recorded
    Done,
    /// Worker is idle and asking for an assignment
    Idle,
}

impl FlagKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagKind::Claimed => "claimed",
            FlagKind::Done => "done",
            FlagKind::Idle => "idle",
        }
    }

    pub const ALL: [FlagKind; 3] = [FlagKind::Claimed, FlagKind::Done, FlagKind::Idle];
}

impl fmt::Display for FlagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record and flag persistence shared by every worker on a pool.
///
/// Implementations are deliberately weak. Writes are independent and
/// best-effort: raising a flag that is already raised and clearing one that
/// is already gone both succeed silently, because with many workers racing
/// through the same window somebody else regularly gets there first.
/// Consistency across workers comes from phase discipline and the buffer
/// gaps, never from atomicity here.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Persist a record under the given name, replacing any previous one.
    /// The write is not atomic; readers tolerate torn records instead.
    async fn put_record(&self, name: &str, record: &StateRecord) -> Result<()>;

    /// Every parseable record, keyed by name. Entries that cannot be read
    /// or parsed (a record mid-write by another worker looks like garbage)
    /// are logged and left out rather than poisoning the listing.
    async fn list_records(&self) -> Result<BTreeMap<String, StateRecord>>;

    /// Raise a flag for a key
    async fn raise_flag(&self, kind: FlagKind, key: &str) -> Result<()>;

    /// Clear a flag for a key
    async fn clear_flag(&self, kind: FlagKind, key: &str) -> Result<()>;

    /// Keys currently flagged in a namespace, in sorted order
    async fn list_flags(&self, kind: FlagKind) -> Result<BTreeSet<String>>;
}
