//! Point-in-time consolidation of amended documents.
//!
//! [`consolidate`] replays the directives of every amending document over a
//! base provision tree and returns the merged text with per-span provenance
//! and tombstones for removed units. [`publish`] stores the resulting
//! snapshot and adjusts the validity windows of the snapshots around it.

pub mod engine;
pub mod error;
mod fragment;
pub mod versioner;

pub use engine::{
    AmendmentSource, BaseDocument, Consolidation, DirectiveFailure, FailureReason, consolidate,
};
pub use error::ConsolidateError;
pub use versioner::{plan_version, publish};
