//! Validity windows for consolidated snapshots.

use chrono::NaiveDate;
use provisio_core::{ComputationStatus, ConsolidatedSnapshot, SnapshotWindow, VersionPlan};
use provisio_store::VersionStore;
use tracing::info;

use crate::error::ConsolidateError;

/// Window changes for a new snapshot effective on `effective`.
///
/// A current snapshot with the same effective date is superseded. Earlier
/// snapshots whose window is open or reaches past the new date are closed
/// at it. The new window ends at the earliest later effective date.
pub fn plan_version(existing: &[SnapshotWindow], effective: NaiveDate) -> VersionPlan {
    let mut plan = VersionPlan::default();
    for window in existing {
        if window.effective_date == effective {
            plan.supersede.push(window.id.clone());
        } else if window.effective_date > effective {
            plan.valid_until = Some(match plan.valid_until {
                Some(d) => d.min(window.effective_date),
                None => window.effective_date,
            });
        } else if window.valid_until.is_none_or(|until| until > effective) {
            plan.truncate.push((window.id.clone(), effective));
        }
    }
    plan
}

/// Commit a snapshot through the store, planning its window under the
/// store's lock for the document.
pub fn publish<S: VersionStore + ?Sized>(
    store: &S,
    snapshot: &ConsolidatedSnapshot,
) -> Result<VersionPlan, ConsolidateError> {
    if snapshot.status == ComputationStatus::Failed {
        return Err(ConsolidateError::NotPublishable {
            id: snapshot.id.clone(),
            status: snapshot.status,
        });
    }
    let effective = snapshot.effective_date;
    let planner = |existing: &[SnapshotWindow]| plan_version(existing, effective);
    let plan = store.commit_snapshot(snapshot, &planner)?;
    info!(
        document_id = %snapshot.document_id,
        snapshot_id = %snapshot.id,
        effective = %effective,
        valid_until = ?plan.valid_until,
        "snapshot published"
    );
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn window(id: &str, from: &str, until: Option<&str>) -> SnapshotWindow {
        SnapshotWindow {
            id: id.into(),
            effective_date: date(from),
            valid_until: until.map(date),
        }
    }

    #[test]
    fn first_snapshot_is_open() {
        assert_eq!(plan_version(&[], date("2024-01-01")), VersionPlan::default());
    }

    #[test]
    fn later_snapshot_closes_the_open_one() {
        let plan = plan_version(&[window("a", "2024-01-01", None)], date("2025-01-01"));
        assert_eq!(plan.truncate, vec![("a".to_string(), date("2025-01-01"))]);
        assert_eq!(plan.valid_until, None);
        assert!(plan.supersede.is_empty());
    }

    #[test]
    fn backfill_splits_a_closed_window() {
        let existing = [
            window("a", "2024-01-01", Some("2026-01-01")),
            window("c", "2026-01-01", None),
        ];
        let plan = plan_version(&existing, date("2025-01-01"));
        assert_eq!(plan.truncate, vec![("a".to_string(), date("2025-01-01"))]);
        assert_eq!(plan.valid_until, Some(date("2026-01-01")));
    }

    #[test]
    fn same_date_supersedes() {
        let existing = [
            window("a", "2024-01-01", Some("2025-01-01")),
            window("b", "2025-01-01", None),
        ];
        let plan = plan_version(&existing, date("2025-01-01"));
        assert_eq!(plan.supersede, vec!["b".to_string()]);
        assert!(plan.truncate.is_empty());
        assert_eq!(plan.valid_until, None);
    }
}
