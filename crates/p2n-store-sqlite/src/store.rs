// crates/p2n-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Metadata Store
// Description: Durable MetadataStore backed by SQLite WAL.
// Purpose: Persist papers, claims, plans, runs, and events transactionally.
// Dependencies: p2n-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This module implements the durable [`MetadataStore`] over `SQLite`. Row
//! ownership follows the entity model: a paper owns its claims, plans, runs,
//! and events, enforced with cascading foreign keys. Claim replacement and
//! event appends run inside transactions so readers never observe partial
//! writes.
//!
//! Security posture: database contents are untrusted on load; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use p2n_core::Claim;
use p2n_core::ErrorCode;
use p2n_core::IndexHandle;
use p2n_core::Paper;
use p2n_core::PaperId;
use p2n_core::PaperStatus;
use p2n_core::PlanId;
use p2n_core::PlanRecord;
use p2n_core::PlanState;
use p2n_core::Run;
use p2n_core::RunEventRecord;
use p2n_core::RunId;
use p2n_core::RunStatus;
use p2n_core::Stage;
use p2n_core::Timestamp;
use p2n_core::interfaces::MetadataStore;
use p2n_core::interfaces::StoreError;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteJournalMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteJournalMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// Configuration for the `SQLite` metadata store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteJournalMode,
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Messages never embed raw row payloads.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: found {0}, need {SCHEMA_VERSION}")]
    VersionMismatch(i64),
    /// Stored data failed to deserialize.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
}

/// Maps a `rusqlite` error onto the interface error.
fn map_db_error(error: &rusqlite::Error) -> StoreError {
    match error {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound("row".to_string()),
        rusqlite::Error::SqliteFailure(failure, message)
            if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::Conflict(message.clone().unwrap_or_else(|| "constraint".to_string()))
        }
        other => StoreError::Backend(other.to_string()),
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed metadata store.
///
/// # Invariants
/// - Connection access is serialized through a mutex; WAL keeps readers
///   non-blocking at the file level.
/// - Foreign keys stay enabled for the connection lifetime.
#[derive(Clone)]
pub struct SqliteMetadataStore {
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteMetadataStore {
    /// Opens or creates the store at the configured path.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] on open failure, pragma failure, or a
    /// schema version mismatch.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        let connection =
            Connection::open(&config.path).map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        connection
            .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        connection
            .pragma_update(None, "journal_mode", config.journal_mode.pragma_value())
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        connection
            .pragma_update(None, "foreign_keys", "on")
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        initialize_schema(&connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Opens an in-memory store for tests and tooling.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] on initialization failure.
    pub fn open_in_memory() -> Result<Self, SqliteStoreError> {
        let connection =
            Connection::open_in_memory().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        connection
            .pragma_update(None, "foreign_keys", "on")
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        initialize_schema(&connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Runs a closure with the locked connection.
    fn with_connection<T>(
        &self,
        operation: impl FnOnce(&mut Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self
            .connection
            .lock()
            .map_err(|_| StoreError::Backend("connection mutex poisoned".to_string()))?;
        operation(&mut guard)
    }
}

/// Creates tables and records the schema version.
fn initialize_schema(connection: &Connection) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch(
            "CREATE TABLE IF NOT EXISTS meta (
                 key TEXT PRIMARY KEY,
                 value TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS papers (
                 id TEXT PRIMARY KEY,
                 title TEXT NOT NULL,
                 source_url TEXT,
                 pdf_path TEXT NOT NULL,
                 checksum TEXT NOT NULL UNIQUE,
                 index_handle TEXT UNIQUE,
                 upload_blob_path TEXT,
                 upload_format TEXT,
                 upload_filename TEXT,
                 stage TEXT NOT NULL,
                 status TEXT NOT NULL,
                 created_at INTEGER NOT NULL,
                 updated_at INTEGER NOT NULL
             );
             CREATE TABLE IF NOT EXISTS claims (
                 id TEXT PRIMARY KEY,
                 paper_id TEXT NOT NULL REFERENCES papers(id) ON DELETE CASCADE,
                 position INTEGER NOT NULL,
                 body TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS claims_by_paper ON claims(paper_id, position);
             CREATE TABLE IF NOT EXISTS plans (
                 id TEXT PRIMARY KEY,
                 paper_id TEXT NOT NULL REFERENCES papers(id) ON DELETE CASCADE,
                 document TEXT NOT NULL,
                 env_fingerprint TEXT,
                 state TEXT NOT NULL,
                 reasoning TEXT,
                 created_at INTEGER NOT NULL,
                 updated_at INTEGER NOT NULL
             );
             CREATE TABLE IF NOT EXISTS runs (
                 id TEXT PRIMARY KEY,
                 plan_id TEXT NOT NULL REFERENCES plans(id) ON DELETE CASCADE,
                 paper_id TEXT NOT NULL REFERENCES papers(id) ON DELETE CASCADE,
                 status TEXT NOT NULL,
                 seed INTEGER NOT NULL,
                 env_fingerprint TEXT NOT NULL,
                 created_at INTEGER NOT NULL,
                 started_at INTEGER,
                 completed_at INTEGER,
                 duration_seconds REAL,
                 error_code TEXT,
                 error_message TEXT
             );
             CREATE TABLE IF NOT EXISTS run_events (
                 run_id TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
                 seq INTEGER NOT NULL,
                 at INTEGER NOT NULL,
                 event_type TEXT NOT NULL,
                 payload TEXT NOT NULL,
                 PRIMARY KEY (run_id, seq)
             );",
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;

    let stored: Option<String> = connection
        .query_row("SELECT value FROM meta WHERE key = 'schema_version'", [], |row| row.get(0))
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    match stored {
        None => {
            connection
                .execute(
                    "INSERT INTO meta (key, value) VALUES ('schema_version', ?1)",
                    params![SCHEMA_VERSION.to_string()],
                )
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            Ok(())
        }
        Some(value) => {
            let found: i64 = value.parse().unwrap_or(-1);
            if found == SCHEMA_VERSION {
                Ok(())
            } else {
                Err(SqliteStoreError::VersionMismatch(found))
            }
        }
    }
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Serializes an enum-like value through its `snake_case` wire form.
fn wire<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    let rendered =
        serde_json::to_string(value).map_err(|err| StoreError::Corrupt(err.to_string()))?;
    Ok(rendered.trim_matches('"').to_string())
}

/// Deserializes an enum-like value from its `snake_case` wire form.
fn unwire<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, StoreError> {
    serde_json::from_str(&format!("\"{text}\""))
        .map_err(|err| StoreError::Corrupt(err.to_string()))
}

/// Maps a paper row into the entity record.
fn paper_from_row(row: &Row<'_>) -> Result<Paper, rusqlite::Error> {
    let upload_blob_path: Option<String> = row.get("upload_blob_path")?;
    let upload_format: Option<String> = row.get("upload_format")?;
    let upload_filename: Option<String> = row.get("upload_filename")?;
    let dataset_upload = match (upload_blob_path, upload_format, upload_filename) {
        (Some(blob_path), Some(format), Some(original_filename)) => {
            let format = unwire(&format).map_err(|_| rusqlite::Error::InvalidQuery)?;
            Some(p2n_core::DatasetUpload {
                blob_path,
                format,
                original_filename,
            })
        }
        _ => None,
    };

    let stage: String = row.get("stage")?;
    let status: String = row.get("status")?;
    Ok(Paper {
        id: PaperId::new(row.get::<_, String>("id")?),
        title: row.get("title")?,
        source_url: row.get("source_url")?,
        pdf_path: row.get("pdf_path")?,
        checksum: row.get("checksum")?,
        index_handle: row.get::<_, Option<String>>("index_handle")?.map(IndexHandle::new),
        dataset_upload,
        stage: unwire::<Stage>(&stage).map_err(|_| rusqlite::Error::InvalidQuery)?,
        status: unwire::<PaperStatus>(&status).map_err(|_| rusqlite::Error::InvalidQuery)?,
        created_at: Timestamp::from_unix_millis(row.get("created_at")?),
        updated_at: Timestamp::from_unix_millis(row.get("updated_at")?),
    })
}

/// Maps a run row into the entity record.
fn run_from_row(row: &Row<'_>) -> Result<Run, rusqlite::Error> {
    let status: String = row.get("status")?;
    let error_code: Option<String> = row.get("error_code")?;
    let error_code = match error_code {
        Some(code) => {
            Some(unwire::<ErrorCode>(&code).map_err(|_| rusqlite::Error::InvalidQuery)?)
        }
        None => None,
    };
    Ok(Run {
        id: RunId::new(row.get::<_, String>("id")?),
        plan_id: PlanId::new(row.get::<_, String>("plan_id")?),
        paper_id: PaperId::new(row.get::<_, String>("paper_id")?),
        status: unwire::<RunStatus>(&status).map_err(|_| rusqlite::Error::InvalidQuery)?,
        seed: row.get("seed")?,
        env_fingerprint: row.get("env_fingerprint")?,
        created_at: Timestamp::from_unix_millis(row.get("created_at")?),
        started_at: row.get::<_, Option<i64>>("started_at")?.map(Timestamp::from_unix_millis),
        completed_at: row
            .get::<_, Option<i64>>("completed_at")?
            .map(Timestamp::from_unix_millis),
        duration_seconds: row.get("duration_seconds")?,
        error_code,
        error_message: row.get("error_message")?,
    })
}

/// Maps a plan row into the entity record.
fn plan_from_row(row: &Row<'_>) -> Result<PlanRecord, rusqlite::Error> {
    let document: String = row.get("document")?;
    let state: String = row.get("state")?;
    Ok(PlanRecord {
        id: PlanId::new(row.get::<_, String>("id")?),
        paper_id: PaperId::new(row.get::<_, String>("paper_id")?),
        document: serde_json::from_str(&document).map_err(|_| rusqlite::Error::InvalidQuery)?,
        env_fingerprint: row.get("env_fingerprint")?,
        state: unwire::<PlanState>(&state).map_err(|_| rusqlite::Error::InvalidQuery)?,
        reasoning: row.get("reasoning")?,
        created_at: Timestamp::from_unix_millis(row.get("created_at")?),
        updated_at: Timestamp::from_unix_millis(row.get("updated_at")?),
    })
}

// ============================================================================
// SECTION: MetadataStore Implementation
// ============================================================================

impl MetadataStore for SqliteMetadataStore {
    fn insert_paper(&self, paper: &Paper) -> Result<(), StoreError> {
        self.with_connection(|connection| {
            let upload = paper.dataset_upload.as_ref();
            let upload_format = match upload {
                Some(upload) => Some(wire(&upload.format)?),
                None => None,
            };
            connection
                .execute(
                    "INSERT INTO papers (id, title, source_url, pdf_path, checksum, index_handle,
                         upload_blob_path, upload_format, upload_filename, stage, status,
                         created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                    params![
                        paper.id.as_str(),
                        paper.title,
                        paper.source_url,
                        paper.pdf_path,
                        paper.checksum,
                        paper.index_handle.as_ref().map(IndexHandle::as_str),
                        upload.map(|value| value.blob_path.as_str()),
                        upload_format,
                        upload.map(|value| value.original_filename.as_str()),
                        wire(&paper.stage)?,
                        wire(&paper.status)?,
                        paper.created_at.as_unix_millis(),
                        paper.updated_at.as_unix_millis(),
                    ],
                )
                .map_err(|err| map_db_error(&err))?;
            Ok(())
        })
    }

    fn get_paper(&self, id: &PaperId) -> Result<Paper, StoreError> {
        self.with_connection(|connection| {
            connection
                .query_row("SELECT * FROM papers WHERE id = ?1", params![id.as_str()], |row| {
                    paper_from_row(row)
                })
                .optional()
                .map_err(|err| map_db_error(&err))?
                .ok_or_else(|| StoreError::NotFound(format!("paper {id}")))
        })
    }

    fn find_paper_by_checksum(&self, checksum: &str) -> Result<Option<Paper>, StoreError> {
        self.with_connection(|connection| {
            connection
                .query_row("SELECT * FROM papers WHERE checksum = ?1", params![checksum], |row| {
                    paper_from_row(row)
                })
                .optional()
                .map_err(|err| map_db_error(&err))
        })
    }

    fn update_paper_stage(
        &self,
        id: &PaperId,
        stage: Stage,
        status: PaperStatus,
        at: Timestamp,
    ) -> Result<(), StoreError> {
        self.with_connection(|connection| {
            let updated = connection
                .execute(
                    "UPDATE papers SET stage = ?2, status = ?3, updated_at = ?4 WHERE id = ?1",
                    params![
                        id.as_str(),
                        wire(&stage)?,
                        wire(&status)?,
                        at.as_unix_millis()
                    ],
                )
                .map_err(|err| map_db_error(&err))?;
            if updated == 0 {
                return Err(StoreError::NotFound(format!("paper {id}")));
            }
            Ok(())
        })
    }

    fn set_paper_index_handle(
        &self,
        id: &PaperId,
        handle: &IndexHandle,
        at: Timestamp,
    ) -> Result<(), StoreError> {
        self.with_connection(|connection| {
            let updated = connection
                .execute(
                    "UPDATE papers SET index_handle = ?2, updated_at = ?3 WHERE id = ?1",
                    params![id.as_str(), handle.as_str(), at.as_unix_millis()],
                )
                .map_err(|err| map_db_error(&err))?;
            if updated == 0 {
                return Err(StoreError::NotFound(format!("paper {id}")));
            }
            Ok(())
        })
    }

    fn delete_paper(&self, id: &PaperId) -> Result<(), StoreError> {
        self.with_connection(|connection| {
            let deleted = connection
                .execute("DELETE FROM papers WHERE id = ?1", params![id.as_str()])
                .map_err(|err| map_db_error(&err))?;
            if deleted == 0 {
                return Err(StoreError::NotFound(format!("paper {id}")));
            }
            Ok(())
        })
    }

    fn replace_claims(&self, paper_id: &PaperId, claims: &[Claim]) -> Result<(), StoreError> {
        self.with_connection(|connection| {
            let transaction = connection.transaction().map_err(|err| map_db_error(&err))?;
            transaction
                .execute("DELETE FROM claims WHERE paper_id = ?1", params![paper_id.as_str()])
                .map_err(|err| map_db_error(&err))?;
            for (position, claim) in claims.iter().enumerate() {
                let body = serde_json::to_string(claim)
                    .map_err(|err| StoreError::Corrupt(err.to_string()))?;
                transaction
                    .execute(
                        "INSERT INTO claims (id, paper_id, position, body)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![
                            claim.id.as_str(),
                            paper_id.as_str(),
                            i64::try_from(position).unwrap_or(i64::MAX),
                            body
                        ],
                    )
                    .map_err(|err| map_db_error(&err))?;
            }
            transaction.commit().map_err(|err| map_db_error(&err))
        })
    }

    fn list_claims(&self, paper_id: &PaperId) -> Result<Vec<Claim>, StoreError> {
        self.with_connection(|connection| {
            let mut statement = connection
                .prepare("SELECT body FROM claims WHERE paper_id = ?1 ORDER BY position")
                .map_err(|err| map_db_error(&err))?;
            let rows = statement
                .query_map(params![paper_id.as_str()], |row| row.get::<_, String>(0))
                .map_err(|err| map_db_error(&err))?;
            let mut claims = Vec::new();
            for body in rows {
                let body = body.map_err(|err| map_db_error(&err))?;
                claims.push(
                    serde_json::from_str(&body)
                        .map_err(|err| StoreError::Corrupt(err.to_string()))?,
                );
            }
            Ok(claims)
        })
    }

    fn insert_plan(&self, plan: &PlanRecord) -> Result<(), StoreError> {
        self.with_connection(|connection| {
            let document = serde_json::to_string(&plan.document)
                .map_err(|err| StoreError::Corrupt(err.to_string()))?;
            connection
                .execute(
                    "INSERT INTO plans (id, paper_id, document, env_fingerprint, state,
                         reasoning, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        plan.id.as_str(),
                        plan.paper_id.as_str(),
                        document,
                        plan.env_fingerprint,
                        wire(&plan.state)?,
                        plan.reasoning,
                        plan.created_at.as_unix_millis(),
                        plan.updated_at.as_unix_millis(),
                    ],
                )
                .map_err(|err| map_db_error(&err))?;
            Ok(())
        })
    }

    fn get_plan(&self, id: &PlanId) -> Result<PlanRecord, StoreError> {
        self.with_connection(|connection| {
            connection
                .query_row("SELECT * FROM plans WHERE id = ?1", params![id.as_str()], |row| {
                    plan_from_row(row)
                })
                .optional()
                .map_err(|err| map_db_error(&err))?
                .ok_or_else(|| StoreError::NotFound(format!("plan {id}")))
        })
    }

    fn list_plans(&self, paper_id: &PaperId) -> Result<Vec<PlanRecord>, StoreError> {
        self.with_connection(|connection| {
            let mut statement = connection
                .prepare(
                    "SELECT * FROM plans WHERE paper_id = ?1
                     ORDER BY created_at DESC, id DESC",
                )
                .map_err(|err| map_db_error(&err))?;
            let rows = statement
                .query_map(params![paper_id.as_str()], |row| plan_from_row(row))
                .map_err(|err| map_db_error(&err))?;
            rows.collect::<Result<Vec<_>, _>>().map_err(|err| map_db_error(&err))
        })
    }

    fn set_plan_fingerprint(
        &self,
        id: &PlanId,
        fingerprint: &str,
        at: Timestamp,
    ) -> Result<(), StoreError> {
        self.with_connection(|connection| {
            let updated = connection
                .execute(
                    "UPDATE plans SET env_fingerprint = ?2, updated_at = ?3 WHERE id = ?1",
                    params![id.as_str(), fingerprint, at.as_unix_millis()],
                )
                .map_err(|err| map_db_error(&err))?;
            if updated == 0 {
                return Err(StoreError::NotFound(format!("plan {id}")));
            }
            Ok(())
        })
    }

    fn insert_run(&self, run: &Run) -> Result<(), StoreError> {
        self.with_connection(|connection| {
            let error_code = match &run.error_code {
                Some(code) => Some(wire(code)?),
                None => None,
            };
            connection
                .execute(
                    "INSERT INTO runs (id, plan_id, paper_id, status, seed, env_fingerprint,
                         created_at, started_at, completed_at, duration_seconds,
                         error_code, error_message)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    params![
                        run.id.as_str(),
                        run.plan_id.as_str(),
                        run.paper_id.as_str(),
                        wire(&run.status)?,
                        run.seed,
                        run.env_fingerprint,
                        run.created_at.as_unix_millis(),
                        run.started_at.map(Timestamp::as_unix_millis),
                        run.completed_at.map(Timestamp::as_unix_millis),
                        run.duration_seconds,
                        error_code,
                        run.error_message,
                    ],
                )
                .map_err(|err| map_db_error(&err))?;
            Ok(())
        })
    }

    fn get_run(&self, id: &RunId) -> Result<Run, StoreError> {
        self.with_connection(|connection| {
            connection
                .query_row("SELECT * FROM runs WHERE id = ?1", params![id.as_str()], |row| {
                    run_from_row(row)
                })
                .optional()
                .map_err(|err| map_db_error(&err))?
                .ok_or_else(|| StoreError::NotFound(format!("run {id}")))
        })
    }

    fn list_runs(&self, plan_id: &PlanId) -> Result<Vec<Run>, StoreError> {
        self.with_connection(|connection| {
            let mut statement = connection
                .prepare(
                    "SELECT * FROM runs WHERE plan_id = ?1
                     ORDER BY created_at DESC, id DESC",
                )
                .map_err(|err| map_db_error(&err))?;
            let rows = statement
                .query_map(params![plan_id.as_str()], |row| run_from_row(row))
                .map_err(|err| map_db_error(&err))?;
            rows.collect::<Result<Vec<_>, _>>().map_err(|err| map_db_error(&err))
        })
    }

    fn update_run(&self, run: &Run) -> Result<(), StoreError> {
        self.with_connection(|connection| {
            let error_code = match &run.error_code {
                Some(code) => Some(wire(code)?),
                None => None,
            };
            let updated = connection
                .execute(
                    "UPDATE runs SET status = ?2, started_at = ?3, completed_at = ?4,
                         duration_seconds = ?5, error_code = ?6, error_message = ?7
                     WHERE id = ?1",
                    params![
                        run.id.as_str(),
                        wire(&run.status)?,
                        run.started_at.map(Timestamp::as_unix_millis),
                        run.completed_at.map(Timestamp::as_unix_millis),
                        run.duration_seconds,
                        error_code,
                        run.error_message,
                    ],
                )
                .map_err(|err| map_db_error(&err))?;
            if updated == 0 {
                return Err(StoreError::NotFound(format!("run {}", run.id)));
            }
            Ok(())
        })
    }

    fn append_run_event(
        &self,
        run_id: &RunId,
        at: Timestamp,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<RunEventRecord, StoreError> {
        self.with_connection(|connection| {
            let transaction = connection.transaction().map_err(|err| map_db_error(&err))?;
            let next_seq: i64 = transaction
                .query_row(
                    "SELECT COALESCE(MAX(seq) + 1, 0) FROM run_events WHERE run_id = ?1",
                    params![run_id.as_str()],
                    |row| row.get(0),
                )
                .map_err(|err| map_db_error(&err))?;
            let body = serde_json::to_string(payload)
                .map_err(|err| StoreError::Corrupt(err.to_string()))?;
            transaction
                .execute(
                    "INSERT INTO run_events (run_id, seq, at, event_type, payload)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![run_id.as_str(), next_seq, at.as_unix_millis(), event_type, body],
                )
                .map_err(|err| map_db_error(&err))?;
            transaction.commit().map_err(|err| map_db_error(&err))?;
            Ok(RunEventRecord {
                run_id: run_id.clone(),
                seq: u64::try_from(next_seq).unwrap_or(0),
                at,
                event_type: event_type.to_string(),
                payload: payload.clone(),
            })
        })
    }

    fn list_run_events(&self, run_id: &RunId) -> Result<Vec<RunEventRecord>, StoreError> {
        self.with_connection(|connection| {
            let mut statement = connection
                .prepare(
                    "SELECT seq, at, event_type, payload FROM run_events
                     WHERE run_id = ?1 ORDER BY seq",
                )
                .map_err(|err| map_db_error(&err))?;
            let rows = statement
                .query_map(params![run_id.as_str()], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })
                .map_err(|err| map_db_error(&err))?;
            let mut events = Vec::new();
            for row in rows {
                let (seq, at, event_type, payload) = row.map_err(|err| map_db_error(&err))?;
                events.push(RunEventRecord {
                    run_id: run_id.clone(),
                    seq: u64::try_from(seq).unwrap_or(0),
                    at: Timestamp::from_unix_millis(at),
                    event_type,
                    payload: serde_json::from_str(&payload)
                        .map_err(|err| StoreError::Corrupt(err.to_string()))?,
                });
            }
            Ok(events)
        })
    }
}
