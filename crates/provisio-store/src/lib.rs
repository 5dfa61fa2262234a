//! Versioned persistence for parse results and consolidated snapshots.
//!
//! Both entities follow create-then-flip supersession: the new row is
//! written first and the old one is marked superseded (or has its
//! validity window closed) in the same atomic unit. A failure anywhere
//! in that unit leaves the previous state authoritative. Writes for one
//! document are serialized; writes for different documents never wait
//! on each other.

mod error;
mod locks;
mod memory;

pub use error::StoreError;
pub use locks::DocumentLocks;
pub use memory::MemoryStore;

#[cfg(feature = "duckdb")]
mod duck;
#[cfg(feature = "duckdb")]
pub use duck::DuckStore;

use provisio_core::{
    ConsolidatedSnapshot, ParseResult, ProvisionNode, SnapshotWindow, VersionPlan,
};
use serde::{Deserialize, Serialize};

/// A parse result together with its node list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseRecord {
    pub result: ParseResult,
    pub nodes: Vec<ProvisionNode>,
}

impl ParseRecord {
    /// True when `other` came from the same parser build over the same text.
    pub fn same_run(&self, other: &ParseRecord) -> bool {
        self.result.document_id == other.result.document_id
            && self.result.parser == other.result.parser
            && self.result.content_hash == other.result.content_hash
    }
}

/// What [`VersionStore::record_parse`] did with a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Inserted,
    /// An identical run is already current; nothing was written.
    Unchanged,
    Superseded { previous: String },
}

/// Where a commit can be made to fail, for atomicity tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    /// The new snapshot is staged, old windows are not yet touched.
    AfterInsert,
    /// All changes are staged but not yet made visible.
    BeforeCommit,
}

/// Window planner handed to [`VersionStore::commit_snapshot`]. It runs
/// under the document's write lock with the current windows as input.
pub type Planner<'a> = &'a dyn Fn(&[SnapshotWindow]) -> VersionPlan;

pub trait VersionStore: Send + Sync {
    /// Store a parse result, superseding the current one for the same
    /// document and parser id.
    fn record_parse(&self, record: ParseRecord) -> Result<Recorded, StoreError>;

    /// Current parse result for a document under a parser id.
    fn latest_parse(
        &self,
        document_id: &str,
        parser_id: &str,
    ) -> Result<Option<ParseRecord>, StoreError>;

    /// Current (not superseded) snapshots ordered by effective date.
    fn snapshots(&self, document_id: &str) -> Result<Vec<ConsolidatedSnapshot>, StoreError>;

    /// Write `snapshot` and apply the plan returned by `plan` as one unit.
    /// The snapshot is stored with the plan's `valid_until`.
    fn commit_snapshot(
        &self,
        snapshot: &ConsolidatedSnapshot,
        plan: Planner<'_>,
    ) -> Result<VersionPlan, StoreError>;

    /// The snapshot with an open validity window, if any.
    fn open_snapshot(&self, document_id: &str) -> Result<Option<ConsolidatedSnapshot>, StoreError> {
        Ok(self
            .snapshots(document_id)?
            .into_iter()
            .rfind(ConsolidatedSnapshot::is_open))
    }
}
