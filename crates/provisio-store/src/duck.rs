//! DuckDB-backed store.
//!
//! Each entity is one table holding a few indexed columns plus the full
//! JSON payload. Supersession and window changes run inside a single SQL
//! transaction, so a failure before commit rolls everything back.

use std::path::Path;
use std::sync::Mutex;

use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use duckdb::{Connection, OptionalExt, params};
use provisio_core::{ConsolidatedSnapshot, SnapshotWindow, VersionPlan};
use tracing::{debug, info};

use crate::{DocumentLocks, FailPoint, ParseRecord, Planner, Recorded, StoreError, VersionStore};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS parse_results (
    id VARCHAR NOT NULL,
    document_id VARCHAR NOT NULL,
    parser_id VARCHAR NOT NULL,
    parser_version VARCHAR NOT NULL,
    config_fingerprint VARCHAR NOT NULL,
    content_hash VARCHAR NOT NULL,
    status VARCHAR NOT NULL,
    payload VARCHAR NOT NULL,
    superseded_by VARCHAR,
    recorded_at TIMESTAMP DEFAULT current_timestamp
);
CREATE TABLE IF NOT EXISTS snapshots (
    id VARCHAR NOT NULL,
    document_id VARCHAR NOT NULL,
    effective_date VARCHAR NOT NULL,
    valid_until VARCHAR,
    status VARCHAR NOT NULL,
    content_hash VARCHAR NOT NULL,
    payload VARCHAR NOT NULL,
    superseded_by VARCHAR,
    revision BIGINT NOT NULL
);
";

/// DuckDB store, in memory or file-backed.
///
/// Use [`open`](Self::open) for an ephemeral database and
/// [`open_persistent`](Self::open_persistent) for one that survives
/// process restarts.
pub struct DuckStore {
    conn: Mutex<Connection>,
    locks: DocumentLocks,
    fail_point: Mutex<Option<FailPoint>>,
}

impl DuckStore {
    /// Open an in-memory DuckDB database.
    pub fn open() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Open or create a persistent DuckDB database at the given path.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        Self::init(Connection::open(path)?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            locks: DocumentLocks::new(),
            fail_point: Mutex::new(None),
        })
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

    /// Execute arbitrary SQL and return Arrow RecordBatches.
    pub fn query_arrow(&self, sql: &str) -> Result<Vec<RecordBatch>, StoreError> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();
        Ok(batches)
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, StoreError> {
    Ok(s.parse::<NaiveDate>()?)
}

/// Current windows for a document, read inside the caller's transaction.
fn current_windows(conn: &Connection, document_id: &str) -> Result<Vec<SnapshotWindow>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, effective_date, valid_until FROM snapshots
         WHERE document_id = ? AND superseded_by IS NULL
         ORDER BY effective_date, id",
    )?;
    let rows = stmt.query_map([document_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (id, effective, until) = row?;
        out.push(SnapshotWindow {
            id,
            effective_date: parse_date(&effective)?,
            valid_until: until.as_deref().map(parse_date).transpose()?,
        });
    }
    Ok(out)
}

impl VersionStore for DuckStore {
    fn record_parse(&self, record: ParseRecord) -> Result<Recorded, StoreError> {
        let result = &record.result;
        let lock = self.locks.get(&result.document_id)?;
        let _guard = lock.lock()?;
        let mut conn = self.conn.lock()?;
        let tx = conn.transaction()?;

        let current: Option<(String, String, String, String)> = tx
            .query_row(
                "SELECT id, parser_version, config_fingerprint, content_hash FROM parse_results
                 WHERE document_id = ? AND parser_id = ? AND superseded_by IS NULL",
                [&result.document_id, &result.parser.parser_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let outcome = match current {
            Some((_, version, fingerprint, hash))
                if version == result.parser.version
                    && fingerprint == result.parser.config_fingerprint
                    && hash == result.content_hash =>
            {
                return Ok(Recorded::Unchanged);
            }
            Some((previous, ..)) => Recorded::Superseded { previous },
            None => Recorded::Inserted,
        };

        tx.execute(
            "INSERT INTO parse_results
             (id, document_id, parser_id, parser_version, config_fingerprint, content_hash, status, payload)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                result.id,
                result.document_id,
                result.parser.parser_id,
                result.parser.version,
                result.parser.config_fingerprint,
                result.content_hash,
                result.status.as_str(),
                serde_json::to_string(&record)?,
            ],
        )?;
        if let Recorded::Superseded { previous } = &outcome {
            tx.execute(
                "UPDATE parse_results SET superseded_by = ? WHERE id = ? AND superseded_by IS NULL",
                params![result.id, previous],
            )?;
        }
        tx.commit()?;
        debug!(document_id = %result.document_id, result_id = %result.id, ?outcome, "parse recorded");
        Ok(outcome)
    }

    fn latest_parse(
        &self,
        document_id: &str,
        parser_id: &str,
    ) -> Result<Option<ParseRecord>, StoreError> {
        let conn = self.conn.lock()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM parse_results
                 WHERE document_id = ? AND parser_id = ? AND superseded_by IS NULL",
                [document_id, parser_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(payload.map(|p| serde_json::from_str(&p)).transpose()?)
    }

    fn snapshots(&self, document_id: &str) -> Result<Vec<ConsolidatedSnapshot>, StoreError> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(
            "SELECT payload, valid_until FROM snapshots
             WHERE document_id = ? AND superseded_by IS NULL
             ORDER BY effective_date, revision",
        )?;
        let rows = stmt.query_map([document_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (payload, until) = row?;
            let mut snapshot: ConsolidatedSnapshot = serde_json::from_str(&payload)?;
            snapshot.valid_until = until.as_deref().map(parse_date).transpose()?;
            out.push(snapshot);
        }
        Ok(out)
    }

    fn commit_snapshot(
        &self,
        snapshot: &ConsolidatedSnapshot,
        plan: Planner<'_>,
    ) -> Result<VersionPlan, StoreError> {
        let lock = self.locks.get(&snapshot.document_id)?;
        let _guard = lock.lock()?;
        let mut conn = self.conn.lock()?;
        let tx = conn.transaction()?;

        let windows = current_windows(&tx, &snapshot.document_id)?;
        let plan = plan(&windows);

        // Rows written before this commit have a lower revision.
        let revision: i64 = tx.query_row(
            "SELECT coalesce(max(revision), 0) + 1 FROM snapshots WHERE document_id = ?",
            [&snapshot.document_id],
            |row| row.get(0),
        )?;

        let mut created = snapshot.clone();
        created.valid_until = plan.valid_until;
        tx.execute(
            "INSERT INTO snapshots
             (id, document_id, effective_date, valid_until, status, content_hash, payload, revision)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                created.id,
                created.document_id,
                created.effective_date.to_string(),
                created.valid_until.map(|d| d.to_string()),
                created.status.as_str(),
                created.content_hash,
                serde_json::to_string(&created)?,
                revision,
            ],
        )?;
        self.trip(FailPoint::AfterInsert)?;

        for (id, until) in &plan.truncate {
            tx.execute(
                "UPDATE snapshots SET valid_until = ?
                 WHERE document_id = ? AND id = ? AND superseded_by IS NULL AND revision < ?",
                params![until.to_string(), created.document_id, id, revision],
            )?;
        }
        for id in &plan.supersede {
            tx.execute(
                "UPDATE snapshots SET superseded_by = ?
                 WHERE document_id = ? AND id = ? AND superseded_by IS NULL AND revision < ?",
                params![created.id, created.document_id, id, revision],
            )?;
        }
        self.trip(FailPoint::BeforeCommit)?;

        tx.commit()?;
        info!(
            document_id = %snapshot.document_id,
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
    use super::*;
    use provisio_core::{ComputationStatus, Coverage};

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn snapshot(id: &str, effective: &str) -> ConsolidatedSnapshot {
        ConsolidatedSnapshot {
            id: id.into(),
            document_id: "doc".into(),
            effective_date: date(effective),
            valid_from: date(effective),
            valid_until: None,
            text: "Article 1.".into(),
            content_hash: "h".into(),
            tree_hash: "t".into(),
            contributing_documents: vec!["doc".into()],
            node_count: 2,
            article_count: 1,
            tombstone_count: 0,
            coverage: Coverage::default(),
            status: ComputationStatus::Complete,
            fingerprint: "f".into(),
        }
    }

    fn close_at(effective: NaiveDate) -> impl Fn(&[SnapshotWindow]) -> VersionPlan {
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
    fn open_in_memory() {
        let store = DuckStore::open().unwrap();
        let batches = store.query_arrow("SELECT 1 AS x").unwrap();
        assert_eq!(batches[0].num_rows(), 1);
    }

    #[test]
    fn commit_and_read_back() {
        let store = DuckStore::open().unwrap();
        store
            .commit_snapshot(&snapshot("s1", "2024-01-01"), &close_at(date("2024-01-01")))
            .unwrap();
        store
            .commit_snapshot(&snapshot("s2", "2025-01-01"), &close_at(date("2025-01-01")))
            .unwrap();
        let all = store.snapshots("doc").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].valid_until, Some(date("2025-01-01")));
        assert_eq!(store.open_snapshot("doc").unwrap().unwrap().id, "s2");
    }

    #[test]
    fn failed_commit_rolls_back() {
        let store = DuckStore::open().unwrap();
        store
            .commit_snapshot(&snapshot("s1", "2024-01-01"), &close_at(date("2024-01-01")))
            .unwrap();
        store.fail_at(FailPoint::BeforeCommit).unwrap();
        assert!(
            store
                .commit_snapshot(&snapshot("s2", "2025-01-01"), &close_at(date("2025-01-01")))
                .is_err()
        );
        let all = store.snapshots("doc").unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].is_open());
    }

    #[test]
    fn persistent_reopen() {
        let tmp = tempfile::TempDir::new().unwrap();
        let db_path = tmp.path().join("provisio.duckdb");
        let store = DuckStore::open_persistent(&db_path).unwrap();
        store
            .commit_snapshot(&snapshot("s1", "2024-01-01"), &close_at(date("2024-01-01")))
            .unwrap();
        drop(store);

        let store = DuckStore::open_persistent(&db_path).unwrap();
        assert_eq!(store.open_snapshot("doc").unwrap().unwrap().id, "s1");
    }
}
