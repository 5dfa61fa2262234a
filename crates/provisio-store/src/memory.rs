//! In-process store. Every write for one document is staged on a copy of
//! that document's state and swapped in only once complete.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use provisio_core::{ConsolidatedSnapshot, SnapshotWindow, VersionPlan};
use tracing::{debug, info};

use crate::{
    DocumentLocks, FailPoint, ParseRecord, Planner, Recorded, StoreError, VersionStore,
};

#[derive(Debug, Clone)]
struct Versioned<T> {
    value: T,
    superseded_by: Option<String>,
}

impl<T> Versioned<T> {
    fn current(value: T) -> Self {
        Self {
            value,
            superseded_by: None,
        }
    }

    fn is_current(&self) -> bool {
        self.superseded_by.is_none()
    }
}

#[derive(Debug, Clone, Default)]
struct DocumentState {
    parses: Vec<Versioned<ParseRecord>>,
    snapshots: Vec<Versioned<ConsolidatedSnapshot>>,
}

impl DocumentState {
    fn current_snapshots(&self) -> impl Iterator<Item = &ConsolidatedSnapshot> {
        self.snapshots
            .iter()
            .filter(|s| s.is_current())
            .map(|s| &s.value)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<String, DocumentState>>,
    locks: DocumentLocks,
    fail_point: Mutex<Option<FailPoint>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next commit fail at `point`. Fires once.
    pub fn fail_at(&self, point: FailPoint) -> Result<(), StoreError> {
        *self.fail_point.lock()? = Some(point);
        Ok(())
    }

    fn trip(&self, point: FailPoint) -> Result<(), StoreError> {
        let mut armed = self.fail_point.lock()?;
        if *armed == Some(point) {
            *armed = None;
            return Err(StoreError::Injected(point));
        }
        Ok(())
    }

    fn staged(&self, document_id: &str) -> Result<DocumentState, StoreError> {
        let documents = self.documents.read()?;
        Ok(documents.get(document_id).cloned().unwrap_or_default())
    }

    fn publish(&self, document_id: &str, state: DocumentState) -> Result<(), StoreError> {
        self.documents
            .write()?
            .insert(document_id.to_string(), state);
        Ok(())
    }
}

impl VersionStore for MemoryStore {
    fn record_parse(&self, record: ParseRecord) -> Result<Recorded, StoreError> {
        let document_id = record.result.document_id.clone();
        let lock = self.locks.get(&document_id)?;
        let _guard = lock.lock()?;

        let mut state = self.staged(&document_id)?;
        let current = state.parses.iter_mut().find(|p| {
            p.is_current() && p.value.result.parser.parser_id == record.result.parser.parser_id
        });
        let outcome = match current {
            Some(existing) if existing.value.same_run(&record) => return Ok(Recorded::Unchanged),
            Some(existing) => {
                existing.superseded_by = Some(record.result.id.clone());
                Recorded::Superseded {
                    previous: existing.value.result.id.clone(),
                }
            }
            None => Recorded::Inserted,
        };
        debug!(document_id, result_id = %record.result.id, ?outcome, "parse recorded");
        state.parses.push(Versioned::current(record));
        self.publish(&document_id, state)?;
        Ok(outcome)
    }

    fn latest_parse(
        &self,
        document_id: &str,
        parser_id: &str,
    ) -> Result<Option<ParseRecord>, StoreError> {
        let documents = self.documents.read()?;
        Ok(documents.get(document_id).and_then(|state| {
            state
                .parses
                .iter()
                .rfind(|p| p.is_current() && p.value.result.parser.parser_id == parser_id)
                .map(|p| p.value.clone())
        }))
    }

    fn snapshots(&self, document_id: &str) -> Result<Vec<ConsolidatedSnapshot>, StoreError> {
        let documents = self.documents.read()?;
        let mut out: Vec<ConsolidatedSnapshot> = documents
            .get(document_id)
            .map(|state| state.current_snapshots().cloned().collect())
            .unwrap_or_default();
        out.sort_by_key(|s| s.effective_date);
        Ok(out)
    }

    fn commit_snapshot(
        &self,
        snapshot: &ConsolidatedSnapshot,
        plan: Planner<'_>,
    ) -> Result<VersionPlan, StoreError> {
        let document_id = snapshot.document_id.as_str();
        let lock = self.locks.get(document_id)?;
        let _guard = lock.lock()?;

        let mut state = self.staged(document_id)?;
        let windows: Vec<SnapshotWindow> = state
            .current_snapshots()
            .map(ConsolidatedSnapshot::window)
            .collect();
        let plan = plan(&windows);

        let mut created = snapshot.clone();
        created.valid_until = plan.valid_until;
        let previous = state.snapshots.len();
        state.snapshots.push(Versioned::current(created));
        self.trip(FailPoint::AfterInsert)?;

        for stored in state.snapshots[..previous].iter_mut().filter(|s| s.is_current()) {
            if plan.supersede.contains(&stored.value.id) {
                stored.superseded_by = Some(snapshot.id.clone());
            } else if let Some((_, until)) =
                plan.truncate.iter().find(|(id, _)| *id == stored.value.id)
            {
                stored.value.valid_until = Some(*until);
            }
        }
        self.trip(FailPoint::BeforeCommit)?;

        self.publish(document_id, state)?;
        info!(
            document_id,
            snapshot_id = %snapshot.id,
            valid_until = ?plan.valid_until,
            truncated = plan.truncate.len(),
            superseded = plan.supersede.len(),
            "snapshot committed"
        );
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use super::*;
    use chrono::NaiveDate;
    use provisio_core::{
        ComputationStatus, Coverage, DocumentMetadata, ParseResult, ParseStatus, ParserIdentity,
    };

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn record(id: &str, version: &str, hash: &str) -> ParseRecord {
        ParseRecord {
            result: ParseResult {
                id: id.into(),
                document_id: "doc".into(),
                parser: ParserIdentity {
                    parser_id: "provisio-tree".into(),
                    version: version.into(),
                    config_fingerprint: "cfg".into(),
                },
                status: ParseStatus::Success,
                warnings: vec![],
                unparsed: vec![],
                metadata: DocumentMetadata::default(),
                text_length: 0,
                char_count: 0,
                content_hash: hash.into(),
                node_count: 0,
                max_depth: 0,
                type_counts: BTreeMap::new(),
                coverage: Coverage::default(),
            },
            nodes: vec![],
        }
    }

    fn snapshot(id: &str, effective: &str) -> ConsolidatedSnapshot {
        ConsolidatedSnapshot {
            id: id.into(),
            document_id: "doc".into(),
            effective_date: date(effective),
            valid_from: date(effective),
            valid_until: None,
            text: String::new(),
            content_hash: String::new(),
            tree_hash: String::new(),
            contributing_documents: vec!["doc".into()],
            node_count: 0,
            article_count: 0,
            tombstone_count: 0,
            coverage: Coverage::default(),
            status: ComputationStatus::Complete,
            fingerprint: String::new(),
        }
    }

    /// Close every open window at the new date.
    fn close_open(effective: NaiveDate) -> impl Fn(&[SnapshotWindow]) -> VersionPlan {
        move |existing| VersionPlan {
            valid_until: None,
            truncate: existing
                .iter()
                .filter(|w| w.valid_until.is_none())
                .map(|w| (w.id.clone(), effective))
                .collect(),
            supersede: vec![],
        }
    }

    #[test]
    fn parse_supersession() {
        let store = MemoryStore::new();
        assert_eq!(store.record_parse(record("pr-1", "0.1.0", "h1")).unwrap(), Recorded::Inserted);
        assert_eq!(store.record_parse(record("pr-1", "0.1.0", "h1")).unwrap(), Recorded::Unchanged);
        assert_eq!(
            store.record_parse(record("pr-2", "0.2.0", "h1")).unwrap(),
            Recorded::Superseded {
                previous: "pr-1".into()
            }
        );
        let latest = store.latest_parse("doc", "provisio-tree").unwrap().unwrap();
        assert_eq!(latest.result.id, "pr-2");
        assert!(store.latest_parse("doc", "other").unwrap().is_none());
    }

    #[test]
    fn commit_closes_previous_window() {
        let store = MemoryStore::new();
        store
            .commit_snapshot(&snapshot("s1", "2024-01-01"), &close_open(date("2024-01-01")))
            .unwrap();
        store
            .commit_snapshot(&snapshot("s2", "2025-01-01"), &close_open(date("2025-01-01")))
            .unwrap();
        let all = store.snapshots("doc").unwrap();
        assert_eq!(all[0].valid_until, Some(date("2025-01-01")));
        assert_eq!(store.open_snapshot("doc").unwrap().unwrap().id, "s2");
    }

    #[test]
    fn supersede_hides_replaced_snapshot() {
        let store = MemoryStore::new();
        store
            .commit_snapshot(&snapshot("s1", "2024-01-01"), &close_open(date("2024-01-01")))
            .unwrap();
        let replace = |existing: &[SnapshotWindow]| VersionPlan {
            supersede: existing.iter().map(|w| w.id.clone()).collect(),
            ..VersionPlan::default()
        };
        store.commit_snapshot(&snapshot("s1b", "2024-01-01"), &replace).unwrap();
        let ids: Vec<String> = store.snapshots("doc").unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["s1b"]);
    }

    #[test]
    fn injected_failures_keep_the_old_state() {
        for point in [FailPoint::AfterInsert, FailPoint::BeforeCommit] {
            let store = MemoryStore::new();
            store
                .commit_snapshot(&snapshot("s1", "2024-01-01"), &close_open(date("2024-01-01")))
                .unwrap();
            store.fail_at(point).unwrap();
            let err = store
                .commit_snapshot(&snapshot("s2", "2025-01-01"), &close_open(date("2025-01-01")))
                .unwrap_err();
            assert!(matches!(err, StoreError::Injected(p) if p == point));

            let all = store.snapshots("doc").unwrap();
            assert_eq!(all.len(), 1);
            assert_eq!(store.open_snapshot("doc").unwrap().unwrap().id, "s1");
        }
    }

    #[test]
    fn concurrent_commits_leave_one_open_window() {
        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let effective = date(&format!("2024-0{}-01", i + 1));
                    store
                        .commit_snapshot(&snapshot(&format!("s{i}"), &effective.to_string()), &close_open(effective))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let open = store
            .snapshots("doc")
            .unwrap()
            .into_iter()
            .filter(ConsolidatedSnapshot::is_open)
            .count();
        assert_eq!(open, 1);
    }
}
