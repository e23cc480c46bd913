//! SQLite-backed claim records.
//!
//! Every call opens its own connection on a blocking thread, so several
//! `claims` processes can share one database file. Nested records
//! (`extracted_data`, `audit_result`) are stored as JSON text.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use tracing::debug;

use super::{ClaimStore, StoreError};
use crate::models::{AuditResult, Claim, ClaimPatch, ClaimStatus, ExtractedData};

/// Database file name inside the data directory.
pub const CLAIMS_DB_FILE: &str = "claims.db";

const CLAIM_COLUMNS: &str = "id, file_name, file_path, status, uploaded_by, policy_id, \
     policy_text, extracted_data, audit_result, error_message, processed_at, created_at";

/// Open a connection with settings for concurrent writers.
fn connect(db_path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(Duration::from_secs(30))?;
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
    "#,
    )?;
    Ok(conn)
}

/// Timestamps are fixed-width RFC 3339 in UTC so text order is time order.
fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(id: &str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            id: id.to_string(),
            reason: format!("bad timestamp {:?}: {}", value, e),
        })
}

fn parse_status(id: &str, value: &str) -> Result<ClaimStatus, StoreError> {
    ClaimStatus::from_str(value).ok_or_else(|| StoreError::Corrupt {
        id: id.to_string(),
        reason: format!("unknown status {:?}", value),
    })
}

/// A `claims` row as stored, before decoding.
struct ClaimRow {
    id: String,
    file_name: Option<String>,
    file_path: Option<String>,
    status: String,
    uploaded_by: Option<String>,
    policy_id: Option<String>,
    policy_text: Option<String>,
    extracted_data: Option<String>,
    audit_result: Option<String>,
    error_message: Option<String>,
    processed_at: Option<String>,
    created_at: String,
}

impl ClaimRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            file_name: row.get("file_name")?,
            file_path: row.get("file_path")?,
            status: row.get("status")?,
            uploaded_by: row.get("uploaded_by")?,
            policy_id: row.get("policy_id")?,
            policy_text: row.get("policy_text")?,
            extracted_data: row.get("extracted_data")?,
            audit_result: row.get("audit_result")?,
            error_message: row.get("error_message")?,
            processed_at: row.get("processed_at")?,
            created_at: row.get("created_at")?,
        })
    }

    fn into_claim(self) -> Result<Claim, StoreError> {
        let status = parse_status(&self.id, &self.status)?;
        let created_at = parse_timestamp(&self.id, &self.created_at)?;
        let processed_at = self
            .processed_at
            .as_deref()
            .map(|at| parse_timestamp(&self.id, at))
            .transpose()?;
        let extracted_data: Option<ExtractedData> = self
            .extracted_data
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        let audit_result: Option<AuditResult> = self
            .audit_result
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(Claim {
            id: self.id,
            file_name: self.file_name,
            file_path: self.file_path,
            status,
            uploaded_by: self.uploaded_by,
            policy_id: self.policy_id,
            policy_text: self.policy_text,
            extracted_data,
            audit_result,
            error_message: self.error_message,
            processed_at,
            created_at,
        })
    }
}

fn query_claims(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> Result<Vec<Claim>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, ClaimRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(ClaimRow::into_claim).collect()
}

fn current_status(conn: &Connection, claim_id: &str) -> Result<Option<ClaimStatus>, StoreError> {
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM claims WHERE id = ?",
            params![claim_id],
            |row| row.get(0),
        )
        .optional()?;
    status.map(|s| parse_status(claim_id, &s)).transpose()
}

/// Apply `patch` as one `UPDATE` of the touched columns.
///
/// A status change only matches rows whose current status may move to the
/// new one, so the check and the write cannot interleave with another writer.
fn update_claim(conn: &Connection, claim_id: &str, patch: &ClaimPatch) -> Result<(), StoreError> {
    let mut assignments: Vec<&str> = Vec::new();
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(status) = patch.status {
        assignments.push("status = ?");
        values.push(Box::new(status.as_str().to_string()));
    }
    if let Some(data) = &patch.extracted_data {
        assignments.push("extracted_data = ?");
        values.push(Box::new(serde_json::to_string(data)?));
    }
    if let Some(result) = &patch.audit_result {
        assignments.push("audit_result = ?");
        values.push(Box::new(serde_json::to_string(result)?));
    }
    if let Some(message) = &patch.error_message {
        assignments.push("error_message = ?");
        values.push(Box::new(message.clone()));
    }
    if let Some(at) = &patch.processed_at {
        assignments.push("processed_at = ?");
        values.push(Box::new(format_timestamp(at)));
    }

    if assignments.is_empty() {
        return match current_status(conn, claim_id)? {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(claim_id.to_string())),
        };
    }

    let mut sql = format!("UPDATE claims SET {} WHERE id = ?", assignments.join(", "));
    values.push(Box::new(claim_id.to_string()));
    if let Some(next) = patch.status {
        let allowed = ClaimStatus::predecessors(next);
        let placeholders = vec!["?"; allowed.len()].join(", ");
        sql.push_str(&format!(" AND status IN ({})", placeholders));
        for from in allowed {
            values.push(Box::new(from.as_str().to_string()));
        }
    }

    let params_refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
    let changed = conn.execute(&sql, params_refs.as_slice())?;
    if changed > 0 {
        return Ok(());
    }

    // Nothing matched: tell a missing claim apart from a refused transition.
    match (current_status(conn, claim_id)?, patch.status) {
        (Some(from), Some(to)) => Err(StoreError::InvalidTransition {
            claim_id: claim_id.to_string(),
            from,
            to,
        }),
        _ => Err(StoreError::NotFound(claim_id.to_string())),
    }
}

fn insert_claim(conn: &Connection, claim: &Claim) -> Result<(), StoreError> {
    let extracted_data = claim
        .extracted_data
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let audit_result = claim
        .audit_result
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let inserted = conn.execute(
        &format!(
            "INSERT OR IGNORE INTO claims ({}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            CLAIM_COLUMNS
        ),
        params![
            claim.id,
            claim.file_name,
            claim.file_path,
            claim.status.as_str(),
            claim.uploaded_by,
            claim.policy_id,
            claim.policy_text,
            extracted_data,
            audit_result,
            claim.error_message,
            claim.processed_at.as_ref().map(format_timestamp),
            format_timestamp(&claim.created_at),
        ],
    )?;
    if inserted == 0 {
        return Err(StoreError::AlreadyExists(claim.id.clone()));
    }
    Ok(())
}

/// Claim records in a SQLite database file.
pub struct SqliteClaimStore {
    db_path: PathBuf,
}

impl SqliteClaimStore {
    /// Open (creating if needed) the database at `db_path`.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self { db_path };
        store.init_schema()?;
        Ok(store)
    }

    /// Open the claims database inside a data directory.
    pub fn in_data_dir(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::new(root.as_ref().join(CLAIMS_DB_FILE))
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = connect(&self.db_path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS claims (
                id TEXT PRIMARY KEY,
                file_name TEXT,
                file_path TEXT,
                status TEXT NOT NULL,
                uploaded_by TEXT,
                policy_id TEXT,
                policy_text TEXT,
                extracted_data TEXT,
                audit_result TEXT,
                error_message TEXT,
                processed_at TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_claims_status ON claims(status, created_at);
            CREATE INDEX IF NOT EXISTS idx_claims_owner ON claims(uploaded_by, created_at);
        "#,
        )?;
        Ok(())
    }

    /// Run `f` against a fresh connection on the blocking pool.
    async fn with_connection<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = connect(&db_path)?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Other(format!("Database task failed: {}", e)))?
    }
}

#[async_trait]
impl ClaimStore for SqliteClaimStore {
    async fn get(&self, claim_id: &str) -> Result<Option<Claim>, StoreError> {
        let claim_id = claim_id.to_string();
        self.with_connection(move |conn| {
            let sql = format!("SELECT {} FROM claims WHERE id = ?", CLAIM_COLUMNS);
            let row = conn
                .query_row(&sql, params![claim_id], ClaimRow::from_row)
                .optional()?;
            row.map(ClaimRow::into_claim).transpose()
        })
        .await
    }

    async fn update(&self, claim_id: &str, patch: ClaimPatch) -> Result<(), StoreError> {
        let claim_id = claim_id.to_string();
        self.with_connection(move |conn| {
            update_claim(conn, &claim_id, &patch)?;
            debug!("Updated claim {}", claim_id);
            Ok(())
        })
        .await
    }

    async fn find(&self, status: ClaimStatus) -> Result<Vec<String>, StoreError> {
        self.with_connection(move |conn| {
            let mut stmt = conn
                .prepare("SELECT id FROM claims WHERE status = ? ORDER BY created_at, rowid")?;
            let ids = stmt
                .query_map(params![status.as_str()], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(ids)
        })
        .await
    }

    async fn insert(&self, claim: Claim) -> Result<(), StoreError> {
        self.with_connection(move |conn| insert_claim(conn, &claim))
            .await
    }

    async fn list_by_owner(&self, user_id: &str) -> Result<Vec<Claim>, StoreError> {
        let user_id = user_id.to_string();
        self.with_connection(move |conn| {
            let sql = format!(
                "SELECT {} FROM claims WHERE uploaded_by = ? \
                 ORDER BY created_at DESC, rowid DESC",
                CLAIM_COLUMNS
            );
            query_claims(conn, &sql, &[&user_id as &dyn ToSql])
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Finding, FindingType, Severity};
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> SqliteClaimStore {
        SqliteClaimStore::in_data_dir(dir.path()).unwrap()
    }

    fn review(note: &str) -> AuditResult {
        AuditResult::needs_review(
            50,
            Finding::new(FindingType::Other, Severity::Low, note),
            "Manual review required.",
        )
    }

    #[tokio::test]
    async fn claim_update_is_persisted() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let claim = Claim::new("c1", "u/c1.pdf")
            .with_owner("alice")
            .with_file_name("bill.pdf");
        store.insert(claim.clone()).await.unwrap();

        store
            .update(
                "c1",
                ClaimPatch::status(ClaimStatus::Failed)
                    .with_error("bad pdf")
                    .processed_now(),
            )
            .await
            .unwrap();

        let reopened = open(&dir);
        let stored = reopened.get("c1").await.unwrap().unwrap();
        assert_eq!(stored.status, ClaimStatus::Failed);
        assert_eq!(stored.error_message.as_deref(), Some("bad pdf"));
        assert_eq!(stored.created_at, claim.created_at);
        assert_eq!(stored.file_name.as_deref(), Some("bill.pdf"));
        assert!(stored.processed_at.is_some());
        assert!(reopened.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn audit_result_round_trips_as_json() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store.insert(Claim::new("c1", "u/c1.pdf")).await.unwrap();

        let result = review("room rent above cap");
        store
            .update("c1", ClaimPatch::default().with_audit_result(result.clone()))
            .await
            .unwrap();

        let stored = store.get("c1").await.unwrap().unwrap();
        assert_eq!(stored.audit_result, Some(result));
        assert_eq!(stored.status, ClaimStatus::Queued);
    }

    #[tokio::test]
    async fn find_orders_by_creation_time() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let mut first = Claim::new("zzz", "a.pdf");
        first.created_at -= chrono::Duration::minutes(5);
        store.insert(Claim::new("aaa", "b.pdf")).await.unwrap();
        store.insert(first).await.unwrap();

        let ids = store.find(ClaimStatus::Queued).await.unwrap();
        assert_eq!(ids, vec!["zzz", "aaa"]);
        assert!(store.find(ClaimStatus::Completed).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_by_owner_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let mut old = Claim::new("old", "a.pdf").with_owner("alice");
        old.created_at -= chrono::Duration::hours(1);
        store.insert(old).await.unwrap();
        store
            .insert(Claim::new("new", "b.pdf").with_owner("alice"))
            .await
            .unwrap();
        store
            .insert(Claim::new("other", "c.pdf").with_owner("bob"))
            .await
            .unwrap();

        let ids: Vec<String> = store
            .list_by_owner("alice")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store.insert(Claim::new("c1", "a.pdf")).await.unwrap();
        assert!(matches!(
            store.insert(Claim::new("c1", "b.pdf")).await,
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn update_missing_claim_errors() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        for patch in [
            ClaimPatch::status(ClaimStatus::Failed),
            ClaimPatch::default().with_error("x"),
            ClaimPatch::default(),
        ] {
            assert!(matches!(
                store.update("nope", patch).await,
                Err(StoreError::NotFound(_))
            ));
        }
    }

    #[tokio::test]
    async fn forbidden_status_write_is_refused() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store.insert(Claim::new("c1", "a.pdf")).await.unwrap();

        let err = store
            .update(
                "c1",
                ClaimPatch::status(ClaimStatus::Completed).with_error("skipped"),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidTransition {
                from: ClaimStatus::Queued,
                to: ClaimStatus::Completed,
                ..
            }
        ));

        let stored = store.get("c1").await.unwrap().unwrap();
        assert_eq!(stored.status, ClaimStatus::Queued);
        assert!(stored.error_message.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_on_one_file_keep_every_field() {
        let dir = TempDir::new().unwrap();
        let seeding = open(&dir);
        let ids: Vec<String> = (0..60).map(|i| format!("c{i}")).collect();
        for id in &ids {
            seeding.insert(Claim::new(id, "u/a.pdf")).await.unwrap();
        }

        // Two handles on the same database, as two CLI processes would have.
        let auditor = std::sync::Arc::new(open(&dir));
        let worker = std::sync::Arc::new(open(&dir));
        let mut tasks = Vec::new();
        for id in &ids {
            let (auditor, id_a) = (auditor.clone(), id.clone());
            tasks.push(tokio::spawn(async move {
                let patch = ClaimPatch::default().with_audit_result(review("checked"));
                auditor.update(&id_a, patch).await
            }));
            let (worker, id_b) = (worker.clone(), id.clone());
            tasks.push(tokio::spawn(async move {
                let patch = ClaimPatch::status(ClaimStatus::Failed).with_error("download timed out");
                worker.update(&id_b, patch).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        for id in &ids {
            let claim = seeding.get(id).await.unwrap().unwrap();
            assert_eq!(claim.status, ClaimStatus::Failed, "{id}");
            assert_eq!(claim.error_message.as_deref(), Some("download timed out"));
            assert!(claim.audit_result.is_some(), "{id} lost its audit result");
        }
    }
}
