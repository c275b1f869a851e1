// crates/afu9-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Control-Plane Store
// Description: Durable implementation of every AFU-9 storage contract.
// Purpose: Persist Issues, evidence, governance, and audit rows with invariants in the schema.
// Dependencies: afu9-core, afu9-evidence, afu9-policy, afu9-sync, rusqlite, serde_json
// ============================================================================

//! ## Overview
//! One SQLite database holds the whole control plane. Domain rows are stored
//! as canonical JSON snapshots next to the indexed columns the invariants
//! need; the single-active invariant is a partial unique index and event
//! synthesis is trigger-driven, so no higher layer can bypass either. All
//! access is serialized through one mutex-guarded connection, which also
//! makes the policy evaluator's probe/record pair consistent.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde_json::Value;
use thiserror::Error;

use afu9_core::Actor;
use afu9_core::CanonicalId;
use afu9_core::DeployEvent;
use afu9_core::HandoffPacket;
use afu9_core::Issue;
use afu9_core::IssueDraft;
use afu9_core::IssueEvent;
use afu9_core::IssueEventType;
use afu9_core::IssueFilter;
use afu9_core::IssueId;
use afu9_core::IssuePage;
use afu9_core::IssuePatch;
use afu9_core::IssueStore;
use afu9_core::LocalStatus;
use afu9_core::MAX_LIST_LIMIT;
use afu9_core::OperationalStore;
use afu9_core::PolicySnapshot;
use afu9_core::RunBundle;
use afu9_core::RunId;
use afu9_core::StoreError;
use afu9_core::Timestamp;
use afu9_core::VerdictRecord;
use afu9_core::VerificationReport;
use afu9_core::interfaces::ActivationMode;
use afu9_core::is_valid;
use afu9_evidence::EvidenceItem;
use afu9_evidence::Incident;
use afu9_evidence::IncidentEvent;
use afu9_evidence::IncidentStore;
use afu9_evidence::IncidentStoreError;
use afu9_evidence::NaturalKey;
use afu9_evidence::NodeInput;
use afu9_evidence::OutcomeRecord;
use afu9_evidence::RemediationRun;
use afu9_evidence::SourceRef;
use afu9_evidence::TimelineEdge;
use afu9_evidence::TimelineNode;
use afu9_evidence::TimelineStore;
use afu9_evidence::TimelineStoreError;
use afu9_policy::ApprovalError;
use afu9_policy::ApprovalGate;
use afu9_policy::ApprovalStore;
use afu9_policy::ExecutionProbe;
use afu9_policy::Lawbook;
use afu9_policy::LawbookError;
use afu9_policy::LawbookStore;
use afu9_policy::PolicyExecutionRecord;
use afu9_policy::PolicyExecutionStore;
use afu9_policy::PolicyStoreError;
use afu9_sync::SyncAuditEvent;
use afu9_sync::SyncAuditStore;
use afu9_sync::SyncConflict;
use afu9_sync::SyncStoreError;
use afu9_core::LawbookId;
use afu9_core::IncidentId;

use crate::migrations::apply_migrations;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Busy timeout for concurrent access, in milliseconds.
const BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding full row payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Stored data fails deserialization.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Schema checksum drift.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) | SqliteStoreError::VersionMismatch(message) => {
                Self::Io(message)
            }
            SqliteStoreError::Corrupt(message) | SqliteStoreError::Invalid(message) => {
                Self::Invalid(message)
            }
        }
    }
}

impl From<SqliteStoreError> for TimelineStoreError {
    fn from(error: SqliteStoreError) -> Self {
        Self::Store(error.to_string())
    }
}

impl From<SqliteStoreError> for PolicyStoreError {
    fn from(error: SqliteStoreError) -> Self {
        Self::Store(error.to_string())
    }
}

impl From<SqliteStoreError> for SyncStoreError {
    fn from(error: SqliteStoreError) -> Self {
        Self::Store(error.to_string())
    }
}

impl From<SqliteStoreError> for IncidentStoreError {
    fn from(error: SqliteStoreError) -> Self {
        Self::Store(error.to_string())
    }
}

impl From<SqliteStoreError> for LawbookError {
    fn from(error: SqliteStoreError) -> Self {
        Self::Store(error.to_string())
    }
}

impl From<SqliteStoreError> for ApprovalError {
    fn from(error: SqliteStoreError) -> Self {
        Self::Store(error.to_string())
    }
}

/// Maps an engine error, separating unique-constraint conflicts.
fn map_db_error(error: &rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(error.to_string())
}

/// Returns true when the error is a unique-constraint violation.
fn is_unique_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Durable control-plane store over one guarded `SQLite` connection.
///
/// # Invariants
/// - All reads and writes are serialized through the connection mutex.
/// - Invariant I-1 and event synthesis live in the schema, not in this code.
#[derive(Clone)]
pub struct SqliteControlStore {
    /// Guarded connection.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteControlStore {
    /// Opens (or creates) the store at a file path and applies migrations.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when opening or migrating fails.
    pub fn open(path: &Path) -> Result<Self, SqliteStoreError> {
        let connection =
            Connection::open(path).map_err(|err| SqliteStoreError::Io(err.to_string()))?;
        Self::initialize(connection)
    }

    /// Opens an in-memory store (tests and ephemeral deployments).
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when opening or migrating fails.
    pub fn open_in_memory() -> Result<Self, SqliteStoreError> {
        let connection =
            Connection::open_in_memory().map_err(|err| SqliteStoreError::Io(err.to_string()))?;
        Self::initialize(connection)
    }

    /// Applies pragmas and migrations to a fresh connection.
    fn initialize(connection: Connection) -> Result<Self, SqliteStoreError> {
        connection
            .pragma_update(None, "journal_mode", "wal")
            .map_err(|err| map_db_error(&err))?;
        connection
            .pragma_update(None, "synchronous", "full")
            .map_err(|err| map_db_error(&err))?;
        connection
            .busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS))
            .map_err(|err| map_db_error(&err))?;
        apply_migrations(&connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Locks the connection, mapping poisoning to an error.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection
            .lock()
            .map_err(|_| SqliteStoreError::Io("sqlite connection poisoned".to_string()))
    }
}

// ============================================================================
// SECTION: JSON Helpers
// ============================================================================

/// Serializes a domain row to its stored JSON snapshot.
fn to_json<T: serde::Serialize>(value: &T) -> Result<String, SqliteStoreError> {
    serde_json::to_string(value).map_err(|err| SqliteStoreError::Invalid(err.to_string()))
}

/// Deserializes a stored JSON snapshot, failing closed on corruption.
fn from_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, SqliteStoreError> {
    serde_json::from_str(raw).map_err(|err| SqliteStoreError::Corrupt(err.to_string()))
}

// ============================================================================
// SECTION: Issue Store
// ============================================================================

/// Loads an Issue row by id inside an open connection.
fn load_issue(
    connection: &Connection,
    id: &IssueId,
) -> Result<Option<Issue>, SqliteStoreError> {
    let raw: Option<String> = connection
        .query_row("SELECT issue_json FROM issues WHERE id = ?1", params![id.as_str()], |row| {
            row.get(0)
        })
        .optional()
        .map_err(|err| map_db_error(&err))?;
    raw.map(|raw| from_json(&raw)).transpose()
}

/// Writes an Issue's indexed columns and JSON snapshot.
fn write_issue(connection: &Connection, issue: &Issue) -> Result<(), SqliteStoreError> {
    let json = to_json(issue)?;
    connection
        .execute(
            "UPDATE issues SET
                canonical_id = ?2,
                local_status = ?3,
                handoff_state = ?4,
                execution_override = ?5,
                issue_json = ?6,
                updated_at = ?7
             WHERE id = ?1",
            params![
                issue.id.as_str(),
                issue.canonical_id.as_ref().map(CanonicalId::as_str),
                issue.local_status.as_str(),
                to_json(&issue.handoff_state)?.trim_matches('"').to_string(),
                i64::from(issue.execution_override),
                json,
                issue.updated_at.as_unix_millis(),
            ],
        )
        .map_err(|err| {
            if is_unique_violation(&err) {
                SqliteStoreError::Invalid("unique constraint violated on issue update".to_string())
            } else {
                map_db_error(&err)
            }
        })?;
    Ok(())
}

/// Returns the currently active Issue's id and display label, if any.
fn current_active(
    connection: &Connection,
) -> Result<Option<(IssueId, String)>, SqliteStoreError> {
    let row: Option<(String, Option<String>)> = connection
        .query_row(
            "SELECT id, canonical_id FROM issues WHERE local_status = 'ACTIVE'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(|err| map_db_error(&err))?;
    Ok(row.map(|(id, canonical)| {
        let label = canonical.unwrap_or_else(|| id.clone());
        (IssueId::new(id), label)
    }))
}

impl IssueStore for SqliteControlStore {
    fn create_issue(
        &self,
        draft: &IssueDraft,
        _actor: &Actor,
        now: Timestamp,
    ) -> Result<Issue, StoreError> {
        let connection = self.lock()?;
        let public_id: i64 = connection
            .query_row("SELECT COALESCE(MAX(public_id), 0) + 1 FROM issues", [], |row| row.get(0))
            .map_err(|err| StoreError::from(map_db_error(&err)))?;
        let issue = Issue {
            id: IssueId::new(format!("issue-{public_id:08}")),
            public_id,
            canonical_id: draft.canonical_id.clone(),
            title: draft.title.clone(),
            local_status: LocalStatus::Created,
            forge_mirror_status: afu9_core::ForgeMirrorStatus::Unknown,
            execution_state: afu9_core::ExecutionState::Idle,
            priority: draft.priority,
            labels: draft.labels.clone(),
            spec: draft.spec.clone(),
            forge: draft.forge.clone(),
            handoff_state: afu9_core::HandoffState::NotSent,
            execution_override: false,
            lawbook_version: None,
            created_at: now,
            updated_at: now,
            spec_ready_at: None,
        };
        let json = to_json(&issue)?;
        connection
            .execute(
                "INSERT INTO issues (
                    id, public_id, canonical_id, local_status, handoff_state,
                    execution_override, issue_json, created_at, updated_at
                 ) VALUES (?1, ?2, ?3, 'CREATED', 'NOT_SENT', 0, ?4, ?5, ?5)",
                params![
                    issue.id.as_str(),
                    public_id,
                    issue.canonical_id.as_ref().map(CanonicalId::as_str),
                    json,
                    now.as_unix_millis(),
                ],
            )
            .map_err(|err| {
                if is_unique_violation(&err) {
                    StoreError::Conflict(format!(
                        "canonical id {:?} already exists",
                        draft.canonical_id
                    ))
                } else {
                    StoreError::from(map_db_error(&err))
                }
            })?;
        Ok(issue)
    }

    fn get_issue(&self, id: &IssueId) -> Result<Option<Issue>, StoreError> {
        let connection = self.lock()?;
        Ok(load_issue(&connection, id)?)
    }

    fn get_issue_by_canonical(&self, id: &CanonicalId) -> Result<Option<Issue>, StoreError> {
        let connection = self.lock()?;
        let raw: Option<String> = connection
            .query_row(
                "SELECT issue_json FROM issues WHERE canonical_id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::from(map_db_error(&err)))?;
        Ok(raw.map(|raw| from_json(&raw)).transpose()?)
    }

    fn patch_issue(
        &self,
        id: &IssueId,
        patch: &IssuePatch,
        _actor: &Actor,
        now: Timestamp,
    ) -> Result<Issue, StoreError> {
        let connection = self.lock()?;
        let mut issue = load_issue(&connection, id)?
            .ok_or_else(|| StoreError::NotFound(format!("issue {id}")))?;
        issue.apply_patch(patch, now);
        write_issue(&connection, &issue)?;
        Ok(issue)
    }

    fn activate_issue(
        &self,
        id: &IssueId,
        mode: ActivationMode,
        _actor: &Actor,
        now: Timestamp,
    ) -> Result<Issue, StoreError> {
        let mut guard = self.lock()?;
        let transaction =
            guard.transaction().map_err(|err| StoreError::from(map_db_error(&err)))?;
        let mut issue = load_issue(&transaction, id)?
            .ok_or_else(|| StoreError::NotFound(format!("issue {id}")))?;
        if !is_valid(issue.local_status, LocalStatus::Active) {
            return Err(StoreError::InvalidTransition {
                from: issue.local_status,
                to: LocalStatus::Active,
            });
        }
        if let Some((active_id, label)) = current_active(&transaction)? {
            if active_id == *id {
                return Err(StoreError::Conflict(format!("issue {id} is already active")));
            }
            match mode {
                ActivationMode::Exclusive => {
                    return Err(StoreError::SingleActiveViolation {
                        current_active: label,
                    });
                }
                ActivationMode::Takeover => {
                    let mut previous = load_issue(&transaction, &active_id)?
                        .ok_or_else(|| StoreError::NotFound(format!("issue {active_id}")))?;
                    previous.local_status = LocalStatus::Hold;
                    previous.updated_at = now;
                    write_issue(&transaction, &previous)?;
                }
            }
        }
        issue.local_status = LocalStatus::Active;
        issue.updated_at = now;
        write_issue(&transaction, &issue)?;
        transaction.commit().map_err(|err| StoreError::from(map_db_error(&err)))?;
        Ok(issue)
    }

    fn transition_issue(
        &self,
        id: &IssueId,
        to: LocalStatus,
        _actor: &Actor,
        _payload: Value,
        now: Timestamp,
    ) -> Result<Issue, StoreError> {
        let connection = self.lock()?;
        let mut issue = load_issue(&connection, id)?
            .ok_or_else(|| StoreError::NotFound(format!("issue {id}")))?;
        if !is_valid(issue.local_status, to) {
            return Err(StoreError::InvalidTransition {
                from: issue.local_status,
                to,
            });
        }
        if to == LocalStatus::Active
            && let Some((active_id, label)) = current_active(&connection)?
            && active_id != *id
        {
            return Err(StoreError::SingleActiveViolation {
                current_active: label,
            });
        }
        issue.local_status = to;
        issue.updated_at = now;
        if to.is_terminal() {
            issue.execution_override = false;
        }
        write_issue(&connection, &issue)?;
        Ok(issue)
    }

    fn list_issues(&self, filter: &IssueFilter) -> Result<IssuePage, StoreError> {
        let connection = self.lock()?;
        let status = filter.status.map(LocalStatus::as_str);
        let canonical = filter.canonical_id.as_ref().map(CanonicalId::as_str);
        let total: u64 = connection
            .query_row(
                "SELECT COUNT(*) FROM issues
                 WHERE (?1 IS NULL OR local_status = ?1)
                   AND (?2 IS NULL OR canonical_id = ?2)",
                params![status, canonical],
                |row| row.get::<_, i64>(0),
            )
            .map_err(|err| StoreError::from(map_db_error(&err)))?
            .try_into()
            .unwrap_or(0);
        let mut statement = connection
            .prepare(
                "SELECT issue_json FROM issues
                 WHERE (?1 IS NULL OR local_status = ?1)
                   AND (?2 IS NULL OR canonical_id = ?2)
                 ORDER BY public_id
                 LIMIT ?3 OFFSET ?4",
            )
            .map_err(|err| StoreError::from(map_db_error(&err)))?;
        let rows = statement
            .query_map(
                params![
                    status,
                    canonical,
                    i64::from(filter.effective_limit()),
                    i64::from(filter.effective_offset()),
                ],
                |row| row.get::<_, String>(0),
            )
            .map_err(|err| StoreError::from(map_db_error(&err)))?;
        let mut issues = Vec::new();
        for raw in rows {
            let raw = raw.map_err(|err| StoreError::from(map_db_error(&err)))?;
            issues.push(from_json(&raw)?);
        }
        Ok(IssuePage {
            issues,
            total,
        })
    }

    fn issue_events(&self, id: &IssueId, limit: u32) -> Result<Vec<IssueEvent>, StoreError> {
        let connection = self.lock()?;
        let mut statement = connection
            .prepare(
                "SELECT id, issue_id, event_type, actor, payload_json, created_at
                 FROM issue_events WHERE issue_id = ?1
                 ORDER BY id DESC LIMIT ?2",
            )
            .map_err(|err| StoreError::from(map_db_error(&err)))?;
        let rows = statement
            .query_map(
                params![id.as_str(), i64::from(limit.min(MAX_LIST_LIMIT))],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                },
            )
            .map_err(|err| StoreError::from(map_db_error(&err)))?;
        let mut events = Vec::new();
        for row in rows {
            let (event_id, issue_id, event_type, actor, payload, created_at) =
                row.map_err(|err| StoreError::from(map_db_error(&err)))?;
            events.push(IssueEvent {
                id: event_id,
                issue_id: IssueId::new(issue_id),
                event_type: from_json(&format!("\"{event_type}\""))?,
                actor: Actor::human(actor),
                payload: from_json(&payload)?,
                created_at: Timestamp::from_unix_millis(created_at),
            });
        }
        Ok(events)
    }

    fn append_event(
        &self,
        id: &IssueId,
        event_type: IssueEventType,
        actor: &Actor,
        payload: Value,
        now: Timestamp,
    ) -> Result<IssueEvent, StoreError> {
        let connection = self.lock()?;
        if load_issue(&connection, id)?.is_none() {
            return Err(StoreError::NotFound(format!("issue {id}")));
        }
        let type_string = to_json(&event_type)?.trim_matches('"').to_string();
        connection
            .execute(
                "INSERT INTO issue_events (issue_id, event_type, actor, payload_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id.as_str(),
                    type_string,
                    actor.as_str(),
                    to_json(&payload)?,
                    now.as_unix_millis(),
                ],
            )
            .map_err(|err| StoreError::from(map_db_error(&err)))?;
        let event_id = connection.last_insert_rowid();
        Ok(IssueEvent {
            id: event_id,
            issue_id: id.clone(),
            event_type,
            actor: actor.clone(),
            payload,
            created_at: now,
        })
    }

    fn for_handoff(&self, id: &IssueId) -> Result<HandoffPacket, StoreError> {
        let connection = self.lock()?;
        let issue = load_issue(&connection, id)?
            .ok_or_else(|| StoreError::NotFound(format!("issue {id}")))?;
        Ok(issue.handoff_packet())
    }
}

// ============================================================================
// SECTION: Operational Store
// ============================================================================

impl SqliteControlStore {
    /// Inserts a run bundle.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when persistence fails.
    pub fn put_run(&self, bundle: &RunBundle) -> Result<(), StoreError> {
        let connection = self.lock()?;
        connection
            .execute(
                "INSERT OR REPLACE INTO runs (id, issue_id, bundle_json, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    bundle.run.id.as_str(),
                    bundle.run.issue_id.as_ref().map(IssueId::as_str),
                    to_json(bundle)?,
                    bundle.run.started_at.as_unix_millis(),
                ],
            )
            .map_err(|err| StoreError::from(map_db_error(&err)))?;
        Ok(())
    }

    /// Appends a deploy event and returns its row id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when persistence fails.
    pub fn put_deploy_event(&self, event: &DeployEvent) -> Result<i64, StoreError> {
        let connection = self.lock()?;
        connection
            .execute(
                "INSERT INTO deploy_events
                    (env, service, version, commit_hash, status, message, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    event.env,
                    event.service,
                    event.version,
                    event.commit_hash,
                    event.status,
                    event.message,
                    event.created_at.as_unix_millis(),
                ],
            )
            .map_err(|err| StoreError::from(map_db_error(&err)))?;
        Ok(connection.last_insert_rowid())
    }

    /// Inserts a policy snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when persistence fails.
    pub fn put_policy_snapshot(&self, snapshot: &PolicySnapshot) -> Result<(), StoreError> {
        let connection = self.lock()?;
        connection
            .execute(
                "INSERT OR REPLACE INTO policy_snapshots (id, version, content_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    snapshot.id,
                    snapshot.version,
                    snapshot.content_hash,
                    snapshot.created_at.as_unix_millis(),
                ],
            )
            .map_err(|err| StoreError::from(map_db_error(&err)))?;
        Ok(())
    }

    /// Inserts a verdict.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when persistence fails.
    pub fn put_verdict(&self, verdict: &VerdictRecord) -> Result<(), StoreError> {
        let connection = self.lock()?;
        connection
            .execute(
                "INSERT OR REPLACE INTO verdicts
                    (execution_id, policy_snapshot_id, verdict_json, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    verdict.execution_id,
                    verdict.policy_snapshot_id,
                    to_json(verdict)?,
                    verdict.created_at.as_unix_millis(),
                ],
            )
            .map_err(|err| StoreError::from(map_db_error(&err)))?;
        Ok(())
    }

    /// Inserts a verification report.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when persistence fails.
    pub fn put_verification(&self, report: &VerificationReport) -> Result<(), StoreError> {
        let connection = self.lock()?;
        connection
            .execute(
                "INSERT OR REPLACE INTO verification_reports
                    (id, issue_id, status, report_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    report.id,
                    report.issue_id.as_str(),
                    to_json(&report.status)?.trim_matches('"').to_string(),
                    to_json(report)?,
                    report.created_at.as_unix_millis(),
                ],
            )
            .map_err(|err| StoreError::from(map_db_error(&err)))?;
        Ok(())
    }
}

impl OperationalStore for SqliteControlStore {
    fn run(&self, id: &RunId) -> Result<Option<RunBundle>, StoreError> {
        let connection = self.lock()?;
        let raw: Option<String> = connection
            .query_row("SELECT bundle_json FROM runs WHERE id = ?1", params![id.as_str()], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|err| StoreError::from(map_db_error(&err)))?;
        Ok(raw.map(|raw| from_json(&raw)).transpose()?)
    }

    fn deploy_event(&self, id: i64) -> Result<Option<DeployEvent>, StoreError> {
        let connection = self.lock()?;
        connection
            .query_row(
                "SELECT id, env, service, version, commit_hash, status, message, created_at
                 FROM deploy_events WHERE id = ?1",
                params![id],
                deploy_event_from_row,
            )
            .optional()
            .map_err(|err| StoreError::from(map_db_error(&err)))
    }

    fn recent_deploy_events(
        &self,
        env: &str,
        limit: u32,
    ) -> Result<Vec<DeployEvent>, StoreError> {
        let connection = self.lock()?;
        let mut statement = connection
            .prepare(
                "SELECT id, env, service, version, commit_hash, status, message, created_at
                 FROM deploy_events WHERE env = ?1
                 ORDER BY created_at DESC, id DESC LIMIT ?2",
            )
            .map_err(|err| StoreError::from(map_db_error(&err)))?;
        let rows = statement
            .query_map(params![env, i64::from(limit)], deploy_event_from_row)
            .map_err(|err| StoreError::from(map_db_error(&err)))?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row.map_err(|err| StoreError::from(map_db_error(&err)))?);
        }
        Ok(events)
    }

    fn verdict(&self, execution_id: &str) -> Result<Option<VerdictRecord>, StoreError> {
        let connection = self.lock()?;
        let raw: Option<String> = connection
            .query_row(
                "SELECT verdict_json FROM verdicts WHERE execution_id = ?1",
                params![execution_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::from(map_db_error(&err)))?;
        Ok(raw.map(|raw| from_json(&raw)).transpose()?)
    }

    fn policy_snapshot(&self, id: &str) -> Result<Option<PolicySnapshot>, StoreError> {
        let connection = self.lock()?;
        connection
            .query_row(
                "SELECT id, version, content_hash, created_at
                 FROM policy_snapshots WHERE id = ?1",
                params![id],
                |row| {
                    Ok(PolicySnapshot {
                        id: row.get(0)?,
                        version: row.get(1)?,
                        content_hash: row.get(2)?,
                        created_at: Timestamp::from_unix_millis(row.get(3)?),
                    })
                },
            )
            .optional()
            .map_err(|err| StoreError::from(map_db_error(&err)))
    }

    fn verification_report(&self, id: &str) -> Result<Option<VerificationReport>, StoreError> {
        let connection = self.lock()?;
        let raw: Option<String> = connection
            .query_row(
                "SELECT report_json FROM verification_reports WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::from(map_db_error(&err)))?;
        Ok(raw.map(|raw| from_json(&raw)).transpose()?)
    }

    fn latest_verification_for_issue(
        &self,
        issue_id: &IssueId,
    ) -> Result<Option<VerificationReport>, StoreError> {
        let connection = self.lock()?;
        let raw: Option<String> = connection
            .query_row(
                "SELECT report_json FROM verification_reports
                 WHERE issue_id = ?1 ORDER BY created_at DESC, id DESC LIMIT 1",
                params![issue_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::from(map_db_error(&err)))?;
        Ok(raw.map(|raw| from_json(&raw)).transpose()?)
    }
}

/// Maps a deploy event row.
fn deploy_event_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeployEvent> {
    Ok(DeployEvent {
        id: row.get(0)?,
        env: row.get(1)?,
        service: row.get(2)?,
        version: row.get(3)?,
        commit_hash: row.get(4)?,
        status: row.get(5)?,
        message: row.get(6)?,
        created_at: Timestamp::from_unix_millis(row.get(7)?),
    })
}

// ============================================================================
// SECTION: Timeline Store
// ============================================================================

/// Raw timeline node columns before enum and JSON hydration.
struct RawNode {
    /// Store identifier.
    id: i64,
    /// Source system string.
    source_system: String,
    /// Source row type.
    source_type: String,
    /// Source row identifier.
    source_id: String,
    /// Node type string.
    node_type: String,
    /// Display title.
    title: Option<String>,
    /// Source URL.
    url: Option<String>,
    /// Payload JSON text.
    payload: String,
    /// Rulebook version stamp.
    lawbook_version: Option<String>,
    /// Creation timestamp (millis).
    created_at: i64,
    /// Update timestamp (millis).
    updated_at: i64,
}

/// Maps a timeline node row into its raw column form.
fn node_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawNode> {
    Ok(RawNode {
        id: row.get(0)?,
        source_system: row.get(1)?,
        source_type: row.get(2)?,
        source_id: row.get(3)?,
        node_type: row.get(4)?,
        title: row.get(5)?,
        url: row.get(6)?,
        payload: row.get(7)?,
        lawbook_version: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

/// Hydrates enums and JSON outside the rusqlite row closure.
fn hydrate_node(raw: RawNode) -> Result<TimelineNode, SqliteStoreError> {
    Ok(TimelineNode {
        id: raw.id,
        key: NaturalKey {
            source_system: from_json(&format!("\"{}\"", raw.source_system))?,
            source_type: raw.source_type,
            source_id: raw.source_id,
        },
        node_type: from_json(&format!("\"{}\"", raw.node_type))?,
        title: raw.title,
        url: raw.url,
        payload: from_json(&raw.payload)?,
        lawbook_version: raw.lawbook_version,
        created_at: Timestamp::from_unix_millis(raw.created_at),
        updated_at: Timestamp::from_unix_millis(raw.updated_at),
    })
}

/// Column list shared by node queries.
const NODE_COLUMNS: &str = "id, source_system, source_type, source_id, node_type,
     title, url, payload_json, lawbook_version, created_at, updated_at";

impl TimelineStore for SqliteControlStore {
    fn upsert_node(
        &self,
        input: &NodeInput,
        now: Timestamp,
    ) -> Result<TimelineNode, TimelineStoreError> {
        let connection = self.lock().map_err(TimelineStoreError::from)?;
        let system = input.key.source_system.as_str();
        let existing: Option<(i64, String, Option<String>, Option<String>, Option<String>)> =
            connection
                .query_row(
                    "SELECT id, payload_json, title, url, lawbook_version FROM timeline_nodes
                     WHERE source_system = ?1 AND source_type = ?2 AND source_id = ?3",
                    params![system, input.key.source_type, input.key.source_id],
                    |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                        ))
                    },
                )
                .optional()
                .map_err(|err| TimelineStoreError::from(map_db_error(&err)))?;

        let payload_json =
            to_json(&input.payload).map_err(TimelineStoreError::from)?;
        if let Some((id, stored_payload, title, url, lawbook_version)) = existing {
            let identical = stored_payload == payload_json
                && title == input.title
                && url == input.url
                && lawbook_version == input.lawbook_version;
            if !identical {
                connection
                    .execute(
                        "UPDATE timeline_nodes SET
                            payload_json = ?2, title = ?3, url = ?4,
                            lawbook_version = ?5, updated_at = ?6
                         WHERE id = ?1",
                        params![
                            id,
                            payload_json,
                            input.title,
                            input.url,
                            input.lawbook_version,
                            now.as_unix_millis(),
                        ],
                    )
                    .map_err(|err| TimelineStoreError::from(map_db_error(&err)))?;
            }
            drop(connection);
            return self
                .node_by_id(id)?
                .ok_or(TimelineStoreError::NodeNotFound(id));
        }

        connection
            .execute(
                "INSERT INTO timeline_nodes (
                    source_system, source_type, source_id, node_type, title, url,
                    payload_json, lawbook_version, created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                params![
                    system,
                    input.key.source_type,
                    input.key.source_id,
                    input.node_type.as_str(),
                    input.title,
                    input.url,
                    payload_json,
                    input.lawbook_version,
                    now.as_unix_millis(),
                ],
            )
            .map_err(|err| TimelineStoreError::from(map_db_error(&err)))?;
        let id = connection.last_insert_rowid();
        drop(connection);
        self.node_by_id(id)?.ok_or(TimelineStoreError::NodeNotFound(id))
    }

    fn find_node(&self, key: &NaturalKey) -> Result<Option<TimelineNode>, TimelineStoreError> {
        let connection = self.lock().map_err(TimelineStoreError::from)?;
        let row = connection
            .query_row(
                &format!(
                    "SELECT {NODE_COLUMNS} FROM timeline_nodes
                     WHERE source_system = ?1 AND source_type = ?2 AND source_id = ?3"
                ),
                params![key.source_system.as_str(), key.source_type, key.source_id],
                node_from_row,
            )
            .optional()
            .map_err(|err| TimelineStoreError::from(map_db_error(&err)))?;
        row.map(|row| hydrate_node(row).map_err(TimelineStoreError::from)).transpose()
    }

    fn node_by_id(&self, id: i64) -> Result<Option<TimelineNode>, TimelineStoreError> {
        let connection = self.lock().map_err(TimelineStoreError::from)?;
        let row = connection
            .query_row(
                &format!("SELECT {NODE_COLUMNS} FROM timeline_nodes WHERE id = ?1"),
                params![id],
                node_from_row,
            )
            .optional()
            .map_err(|err| TimelineStoreError::from(map_db_error(&err)))?;
        row.map(|row| hydrate_node(row).map_err(TimelineStoreError::from)).transpose()
    }

    fn create_edge(
        &self,
        from_node_id: i64,
        to_node_id: i64,
        edge_type: afu9_evidence::EdgeType,
        payload: Value,
    ) -> Result<(), TimelineStoreError> {
        let connection = self.lock().map_err(TimelineStoreError::from)?;
        for node_id in [from_node_id, to_node_id] {
            let exists: Option<i64> = connection
                .query_row(
                    "SELECT id FROM timeline_nodes WHERE id = ?1",
                    params![node_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| TimelineStoreError::from(map_db_error(&err)))?;
            if exists.is_none() {
                return Err(TimelineStoreError::NodeNotFound(node_id));
            }
        }
        connection
            .execute(
                "INSERT OR IGNORE INTO timeline_edges
                    (from_node_id, to_node_id, edge_type, payload_json)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    from_node_id,
                    to_node_id,
                    edge_type.as_str(),
                    to_json(&payload).map_err(TimelineStoreError::from)?,
                ],
            )
            .map_err(|err| TimelineStoreError::from(map_db_error(&err)))?;
        Ok(())
    }

    fn edges_from(&self, node_id: i64) -> Result<Vec<TimelineEdge>, TimelineStoreError> {
        let connection = self.lock().map_err(TimelineStoreError::from)?;
        let mut statement = connection
            .prepare(
                "SELECT from_node_id, to_node_id, edge_type, payload_json
                 FROM timeline_edges WHERE from_node_id = ?1",
            )
            .map_err(|err| TimelineStoreError::from(map_db_error(&err)))?;
        let rows = statement
            .query_map(params![node_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(|err| TimelineStoreError::from(map_db_error(&err)))?;
        let mut edges = Vec::new();
        for row in rows {
            let (from, to, edge_type, payload) =
                row.map_err(|err| TimelineStoreError::from(map_db_error(&err)))?;
            edges.push(TimelineEdge {
                from_node_id: from,
                to_node_id: to,
                edge_type: from_json(&format!("\"{edge_type}\""))
                    .map_err(TimelineStoreError::from)?,
                payload: from_json(&payload).map_err(TimelineStoreError::from)?,
            });
        }
        Ok(edges)
    }

    fn create_source(&self, source: &SourceRef) -> Result<(), TimelineStoreError> {
        let connection = self.lock().map_err(TimelineStoreError::from)?;
        let exists: Option<i64> = connection
            .query_row(
                "SELECT id FROM timeline_nodes WHERE id = ?1",
                params![source.node_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| TimelineStoreError::from(map_db_error(&err)))?;
        if exists.is_none() {
            return Err(TimelineStoreError::NodeNotFound(source.node_id));
        }
        connection
            .execute(
                "INSERT INTO timeline_sources (node_id, source_kind, ref_json, sha256)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    source.node_id,
                    source.source_kind,
                    to_json(&source.ref_json).map_err(TimelineStoreError::from)?,
                    source.sha256,
                ],
            )
            .map_err(|err| TimelineStoreError::from(map_db_error(&err)))?;
        Ok(())
    }

    fn sources_for(&self, node_id: i64) -> Result<Vec<SourceRef>, TimelineStoreError> {
        let connection = self.lock().map_err(TimelineStoreError::from)?;
        let mut statement = connection
            .prepare(
                "SELECT node_id, source_kind, ref_json, sha256
                 FROM timeline_sources WHERE node_id = ?1",
            )
            .map_err(|err| TimelineStoreError::from(map_db_error(&err)))?;
        let rows = statement
            .query_map(params![node_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(|err| TimelineStoreError::from(map_db_error(&err)))?;
        let mut sources = Vec::new();
        for row in rows {
            let (node_id, source_kind, ref_json, sha256) =
                row.map_err(|err| TimelineStoreError::from(map_db_error(&err)))?;
            sources.push(SourceRef {
                node_id,
                source_kind,
                ref_json: from_json(&ref_json).map_err(TimelineStoreError::from)?,
                sha256,
            });
        }
        Ok(sources)
    }
}

// ============================================================================
// SECTION: Policy Execution Store
// ============================================================================

impl PolicyExecutionStore for SqliteControlStore {
    fn probe(
        &self,
        action_type: &str,
        target_identifier: &str,
        window_seconds: i64,
        now: Timestamp,
    ) -> Result<ExecutionProbe, PolicyStoreError> {
        let connection = self.lock().map_err(PolicyStoreError::from)?;
        let last_allowed_at: Option<i64> = connection
            .query_row(
                "SELECT MAX(created_at) FROM policy_executions
                 WHERE action_type = ?1 AND target_identifier = ?2 AND decision = 'allowed'",
                params![action_type, target_identifier],
                |row| row.get(0),
            )
            .map_err(|err| PolicyStoreError::from(map_db_error(&err)))?;
        let window_start = now.as_unix_millis() - window_seconds.saturating_mul(1_000);
        let allowed_in_window: i64 = connection
            .query_row(
                "SELECT COUNT(*) FROM policy_executions
                 WHERE action_type = ?1 AND target_identifier = ?2
                   AND decision = 'allowed' AND created_at > ?3",
                params![action_type, target_identifier, window_start],
                |row| row.get(0),
            )
            .map_err(|err| PolicyStoreError::from(map_db_error(&err)))?;
        Ok(ExecutionProbe {
            last_allowed_at: last_allowed_at.map(Timestamp::from_unix_millis),
            allowed_in_window,
        })
    }

    fn record(&self, record: &PolicyExecutionRecord) -> Result<(), PolicyStoreError> {
        let connection = self.lock().map_err(PolicyStoreError::from)?;
        let decision = match record.decision {
            afu9_policy::PolicyDecision::Allowed => "allowed",
            afu9_policy::PolicyDecision::Denied => "denied",
        };
        connection
            .execute(
                "INSERT INTO policy_executions (
                    action_type, action_fingerprint, target_identifier, decision, reason,
                    idempotency_key_hash, lawbook_version, lawbook_hash, created_at,
                    enforcement_json
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    record.action_type,
                    record.action_fingerprint,
                    record.target_identifier,
                    decision,
                    record.reason,
                    record.idempotency_key_hash,
                    record.lawbook_version,
                    record.lawbook_hash,
                    record.created_at.as_unix_millis(),
                    to_json(&record.enforcement_data).map_err(PolicyStoreError::from)?,
                ],
            )
            .map_err(|err| PolicyStoreError::from(map_db_error(&err)))?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Sync Audit Store
// ============================================================================

impl SyncAuditStore for SqliteControlStore {
    fn record_audit(&self, event: &SyncAuditEvent) -> Result<bool, SyncStoreError> {
        let connection = self.lock().map_err(SyncStoreError::from)?;
        let inserted = connection
            .execute(
                "INSERT OR IGNORE INTO sync_audit_events (
                    event_type, direction, issue_id, forge_issue_number,
                    timestamp, payload_json, event_hash
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    event.event_type,
                    to_json(&event.direction).map_err(SyncStoreError::from)?
                        .trim_matches('"')
                        .to_string(),
                    event.issue_id.as_str(),
                    event.forge_issue_number,
                    event.timestamp.as_unix_millis(),
                    to_json(&event.payload).map_err(SyncStoreError::from)?,
                    event.event_hash,
                ],
            )
            .map_err(|err| SyncStoreError::from(map_db_error(&err)))?;
        Ok(inserted > 0)
    }

    fn record_conflict(&self, conflict: &SyncConflict) -> Result<(), SyncStoreError> {
        let connection = self.lock().map_err(SyncStoreError::from)?;
        connection
            .execute(
                "INSERT INTO sync_conflicts (
                    issue_id, conflict_type, description, detected_at,
                    resolved_at, resolution_notes
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    conflict.issue_id.as_str(),
                    to_json(&conflict.conflict_type).map_err(SyncStoreError::from)?
                        .trim_matches('"')
                        .to_string(),
                    conflict.description,
                    conflict.detected_at.as_unix_millis(),
                    conflict.resolved_at.map(Timestamp::as_unix_millis),
                    conflict.resolution_notes,
                ],
            )
            .map_err(|err| SyncStoreError::from(map_db_error(&err)))?;
        Ok(())
    }

    fn conflicts_for(&self, issue_id: &IssueId) -> Result<Vec<SyncConflict>, SyncStoreError> {
        let connection = self.lock().map_err(SyncStoreError::from)?;
        let mut statement = connection
            .prepare(
                "SELECT issue_id, conflict_type, description, detected_at,
                        resolved_at, resolution_notes
                 FROM sync_conflicts WHERE issue_id = ?1 ORDER BY detected_at, id",
            )
            .map_err(|err| SyncStoreError::from(map_db_error(&err)))?;
        let rows = statement
            .query_map(params![issue_id.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, Option<i64>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            })
            .map_err(|err| SyncStoreError::from(map_db_error(&err)))?;
        let mut conflicts = Vec::new();
        for row in rows {
            let (issue_id, conflict_type, description, detected_at, resolved_at, notes) =
                row.map_err(|err| SyncStoreError::from(map_db_error(&err)))?;
            conflicts.push(SyncConflict {
                issue_id: IssueId::new(issue_id),
                conflict_type: from_json(&format!("\"{conflict_type}\""))
                    .map_err(SyncStoreError::from)?,
                description,
                detected_at: Timestamp::from_unix_millis(detected_at),
                resolved_at: resolved_at.map(Timestamp::from_unix_millis),
                resolution_notes: notes,
            });
        }
        Ok(conflicts)
    }
}

// ============================================================================
// SECTION: Lawbook and Approval Stores
// ============================================================================

impl LawbookStore for SqliteControlStore {
    fn get_active(&self, id: &LawbookId) -> Result<Option<Lawbook>, LawbookError> {
        let connection = self.lock().map_err(LawbookError::from)?;
        let raw: Option<String> = connection
            .query_row(
                "SELECT lawbook_json FROM active_lawbooks WHERE lawbook_id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| LawbookError::from(map_db_error(&err)))?;
        raw.map(|raw| from_json(&raw).map_err(LawbookError::from)).transpose()
    }

    fn activate(&self, lawbook: &Lawbook) -> Result<(), LawbookError> {
        let connection = self.lock().map_err(LawbookError::from)?;
        connection
            .execute(
                "INSERT OR REPLACE INTO active_lawbooks (lawbook_id, lawbook_json, activated_at)
                 VALUES (?1, ?2, ?3)",
                params![
                    lawbook.id.as_str(),
                    to_json(lawbook).map_err(LawbookError::from)?,
                    lawbook.activated_at.as_unix_millis(),
                ],
            )
            .map_err(|err| LawbookError::from(map_db_error(&err)))?;
        Ok(())
    }
}

impl ApprovalStore for SqliteControlStore {
    fn record(&self, gate: &ApprovalGate) -> Result<(), ApprovalError> {
        let connection = self.lock().map_err(ApprovalError::from)?;
        connection
            .execute(
                "INSERT INTO approval_gates (
                    request_id, action_type, target, actor, decision, signed_phrase, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    gate.request_id.as_str(),
                    gate.action_type,
                    gate.target,
                    gate.actor.as_str(),
                    to_json(&gate.decision).map_err(ApprovalError::from)?
                        .trim_matches('"')
                        .to_string(),
                    gate.signed_phrase,
                    gate.created_at.as_unix_millis(),
                ],
            )
            .map_err(|err| ApprovalError::from(map_db_error(&err)))?;
        Ok(())
    }

    fn latest(
        &self,
        action_type: &str,
        target: &str,
    ) -> Result<Option<ApprovalGate>, ApprovalError> {
        let connection = self.lock().map_err(ApprovalError::from)?;
        let row: Option<(String, String, String, String, String, Option<String>, i64)> = connection
            .query_row(
                "SELECT request_id, action_type, target, actor, decision, signed_phrase, created_at
                 FROM approval_gates
                 WHERE action_type = ?1 AND target = ?2
                 ORDER BY created_at DESC, id DESC LIMIT 1",
                params![action_type, target],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                    ))
                },
            )
            .optional()
            .map_err(|err| ApprovalError::from(map_db_error(&err)))?;
        row.map(|(request_id, action_type, target, actor, decision, signed_phrase, created_at)| {
            Ok(ApprovalGate {
                request_id: afu9_core::RequestId::new(request_id),
                action_type,
                target,
                actor: Actor::human(actor),
                decision: from_json(&format!("\"{decision}\"")).map_err(ApprovalError::from)?,
                signed_phrase,
                created_at: Timestamp::from_unix_millis(created_at),
            })
        })
        .transpose()
    }
}

// ============================================================================
// SECTION: Incident Store
// ============================================================================

impl SqliteControlStore {
    /// Inserts or replaces an incident row.
    ///
    /// # Errors
    ///
    /// Returns [`IncidentStoreError`] when persistence fails.
    pub fn put_incident(&self, incident: &Incident) -> Result<(), IncidentStoreError> {
        let connection = self.lock().map_err(IncidentStoreError::from)?;
        connection
            .execute(
                "INSERT OR REPLACE INTO incidents (id, status, incident_json, opened_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    incident.id.as_str(),
                    to_json(&incident.status).map_err(IncidentStoreError::from)?
                        .trim_matches('"')
                        .to_string(),
                    to_json(incident).map_err(IncidentStoreError::from)?,
                    incident.opened_at.as_unix_millis(),
                ],
            )
            .map_err(|err| IncidentStoreError::from(map_db_error(&err)))?;
        Ok(())
    }

    /// Appends an evidence item.
    ///
    /// # Errors
    ///
    /// Returns [`IncidentStoreError`] when persistence fails.
    pub fn put_evidence(&self, item: &EvidenceItem) -> Result<(), IncidentStoreError> {
        let connection = self.lock().map_err(IncidentStoreError::from)?;
        connection
            .execute(
                "INSERT OR REPLACE INTO evidence_items (id, incident_id, item_json, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    item.id,
                    item.incident_id.as_str(),
                    to_json(item).map_err(IncidentStoreError::from)?,
                    item.created_at.as_unix_millis(),
                ],
            )
            .map_err(|err| IncidentStoreError::from(map_db_error(&err)))?;
        Ok(())
    }

    /// Appends an incident event.
    ///
    /// # Errors
    ///
    /// Returns [`IncidentStoreError`] when persistence fails.
    pub fn put_incident_event(&self, event: &IncidentEvent) -> Result<(), IncidentStoreError> {
        let connection = self.lock().map_err(IncidentStoreError::from)?;
        connection
            .execute(
                "INSERT INTO incident_events (incident_id, event_json, created_at)
                 VALUES (?1, ?2, ?3)",
                params![
                    event.incident_id.as_str(),
                    to_json(event).map_err(IncidentStoreError::from)?,
                    event.created_at.as_unix_millis(),
                ],
            )
            .map_err(|err| IncidentStoreError::from(map_db_error(&err)))?;
        Ok(())
    }

    /// Appends a remediation run.
    ///
    /// # Errors
    ///
    /// Returns [`IncidentStoreError`] when persistence fails.
    pub fn put_remediation(&self, run: &RemediationRun) -> Result<(), IncidentStoreError> {
        let connection = self.lock().map_err(IncidentStoreError::from)?;
        connection
            .execute(
                "INSERT OR REPLACE INTO remediation_runs (run_id, incident_id, run_json, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    run.run_id.as_str(),
                    run.incident_id.as_str(),
                    to_json(run).map_err(IncidentStoreError::from)?,
                    run.created_at.as_unix_millis(),
                ],
            )
            .map_err(|err| IncidentStoreError::from(map_db_error(&err)))?;
        Ok(())
    }

    /// Reads JSON rows for an incident child table.
    fn incident_children<T: serde::de::DeserializeOwned>(
        &self,
        sql: &str,
        incident_id: &IncidentId,
    ) -> Result<Vec<T>, IncidentStoreError> {
        let connection = self.lock().map_err(IncidentStoreError::from)?;
        let mut statement =
            connection.prepare(sql).map_err(|err| IncidentStoreError::from(map_db_error(&err)))?;
        let rows = statement
            .query_map(params![incident_id.as_str()], |row| row.get::<_, String>(0))
            .map_err(|err| IncidentStoreError::from(map_db_error(&err)))?;
        let mut items = Vec::new();
        for raw in rows {
            let raw = raw.map_err(|err| IncidentStoreError::from(map_db_error(&err)))?;
            items.push(from_json(&raw).map_err(IncidentStoreError::from)?);
        }
        Ok(items)
    }
}

impl IncidentStore for SqliteControlStore {
    fn incident(&self, id: &IncidentId) -> Result<Option<Incident>, IncidentStoreError> {
        let connection = self.lock().map_err(IncidentStoreError::from)?;
        let raw: Option<String> = connection
            .query_row(
                "SELECT incident_json FROM incidents WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| IncidentStoreError::from(map_db_error(&err)))?;
        raw.map(|raw| from_json(&raw).map_err(IncidentStoreError::from)).transpose()
    }

    fn evidence_for(&self, id: &IncidentId) -> Result<Vec<EvidenceItem>, IncidentStoreError> {
        self.incident_children(
            "SELECT item_json FROM evidence_items WHERE incident_id = ?1 ORDER BY created_at, id",
            id,
        )
    }

    fn events_for(&self, id: &IncidentId) -> Result<Vec<IncidentEvent>, IncidentStoreError> {
        self.incident_children(
            "SELECT event_json FROM incident_events WHERE incident_id = ?1 ORDER BY created_at, id",
            id,
        )
    }

    fn remediations_for(
        &self,
        id: &IncidentId,
    ) -> Result<Vec<RemediationRun>, IncidentStoreError> {
        self.incident_children(
            "SELECT run_json FROM remediation_runs WHERE incident_id = ?1 ORDER BY created_at, run_id",
            id,
        )
    }

    fn upsert_outcome(
        &self,
        record: &OutcomeRecord,
    ) -> Result<(OutcomeRecord, bool), IncidentStoreError> {
        let connection = self.lock().map_err(IncidentStoreError::from)?;
        let inserted = connection
            .execute(
                "INSERT OR IGNORE INTO outcome_records
                    (outcome_key, incident_id, record_json, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.outcome_key,
                    record.incident_id.as_str(),
                    to_json(record).map_err(IncidentStoreError::from)?,
                    record.created_at.as_unix_millis(),
                ],
            )
            .map_err(|err| IncidentStoreError::from(map_db_error(&err)))?;
        if inserted > 0 {
            return Ok((record.clone(), true));
        }
        let raw: String = connection
            .query_row(
                "SELECT record_json FROM outcome_records WHERE outcome_key = ?1",
                params![record.outcome_key],
                |row| row.get(0),
            )
            .map_err(|err| IncidentStoreError::from(map_db_error(&err)))?;
        Ok((from_json(&raw).map_err(IncidentStoreError::from)?, false))
    }
}

// ============================================================================
// SECTION: Webhook and Navigation Rows
// ============================================================================

/// Navigation menu item row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationItem {
    /// Role the item is shown to (`admin`, `user`, `guest`, `*`).
    pub role: String,
    /// Link target.
    pub href: String,
    /// Display label.
    pub label: String,
    /// Sort position within the role.
    pub position: i64,
    /// Visibility flag.
    pub enabled: bool,
}

/// Workflow mapping row for webhook dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowMapping {
    /// Event key (`event_type` or `event_type.event_action`).
    pub event_key: String,
    /// Workflow identifier to dispatch.
    pub workflow: String,
    /// Dispatch automatically on intake.
    pub auto_trigger: bool,
}

impl SqliteControlStore {
    /// Records a webhook delivery id; returns false on a duplicate.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the insert fails.
    pub fn record_delivery(
        &self,
        delivery_id: &str,
        event_type: &str,
        repo: Option<&str>,
        now: Timestamp,
    ) -> Result<bool, SqliteStoreError> {
        let connection = self.lock()?;
        let inserted = connection
            .execute(
                "INSERT OR IGNORE INTO webhook_deliveries
                    (delivery_id, event_type, repo, received_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![delivery_id, event_type, repo, now.as_unix_millis()],
            )
            .map_err(|err| map_db_error(&err))?;
        Ok(inserted > 0)
    }

    /// Persists a webhook event and returns its row id.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the insert fails.
    pub fn insert_webhook_event(
        &self,
        delivery_id: &str,
        event_type: &str,
        event_action: Option<&str>,
        payload: &Value,
        signature: &str,
        now: Timestamp,
    ) -> Result<i64, SqliteStoreError> {
        let connection = self.lock()?;
        connection
            .execute(
                "INSERT INTO webhook_events
                    (delivery_id, event_type, event_action, payload_json, signature, received_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    delivery_id,
                    event_type,
                    event_action,
                    to_json(payload)?,
                    signature,
                    now.as_unix_millis(),
                ],
            )
            .map_err(|err| map_db_error(&err))?;
        Ok(connection.last_insert_rowid())
    }

    /// Marks a webhook event processed.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the update fails.
    pub fn mark_webhook_processed(&self, event_id: i64) -> Result<(), SqliteStoreError> {
        let connection = self.lock()?;
        connection
            .execute(
                "UPDATE webhook_events SET processed = 1 WHERE id = ?1",
                params![event_id],
            )
            .map_err(|err| map_db_error(&err))?;
        Ok(())
    }

    /// Looks up the workflow mapping for an event key.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn workflow_mapping(
        &self,
        event_key: &str,
    ) -> Result<Option<WorkflowMapping>, SqliteStoreError> {
        let connection = self.lock()?;
        connection
            .query_row(
                "SELECT event_key, workflow, auto_trigger
                 FROM workflow_mappings WHERE event_key = ?1",
                params![event_key],
                |row| {
                    Ok(WorkflowMapping {
                        event_key: row.get(0)?,
                        workflow: row.get(1)?,
                        auto_trigger: row.get::<_, i64>(2)? != 0,
                    })
                },
            )
            .optional()
            .map_err(|err| map_db_error(&err))
    }

    /// Installs or replaces a workflow mapping.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the insert fails.
    pub fn set_workflow_mapping(&self, mapping: &WorkflowMapping) -> Result<(), SqliteStoreError> {
        let connection = self.lock()?;
        connection
            .execute(
                "INSERT OR REPLACE INTO workflow_mappings (event_key, workflow, auto_trigger)
                 VALUES (?1, ?2, ?3)",
                params![mapping.event_key, mapping.workflow, i64::from(mapping.auto_trigger)],
            )
            .map_err(|err| map_db_error(&err))?;
        Ok(())
    }

    /// Returns navigation items for a role ordered by position.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn navigation_for_role(
        &self,
        role: &str,
    ) -> Result<Vec<NavigationItem>, SqliteStoreError> {
        let connection = self.lock()?;
        let mut statement = connection
            .prepare(
                "SELECT role, href, label, position, enabled
                 FROM navigation_items WHERE role IN (?1, '*')
                 ORDER BY position",
            )
            .map_err(|err| map_db_error(&err))?;
        let rows = statement
            .query_map(params![role], |row| {
                Ok(NavigationItem {
                    role: row.get(0)?,
                    href: row.get(1)?,
                    label: row.get(2)?,
                    position: row.get(3)?,
                    enabled: row.get::<_, i64>(4)? != 0,
                })
            })
            .map_err(|err| map_db_error(&err))?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row.map_err(|err| map_db_error(&err))?);
        }
        Ok(items)
    }

    /// Replaces the navigation items for a role atomically.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] on duplicate positions or hrefs.
    pub fn replace_navigation(
        &self,
        role: &str,
        items: &[NavigationItem],
    ) -> Result<(), SqliteStoreError> {
        let mut guard = self.lock()?;
        let transaction = guard.transaction().map_err(|err| map_db_error(&err))?;
        transaction
            .execute("DELETE FROM navigation_items WHERE role = ?1", params![role])
            .map_err(|err| map_db_error(&err))?;
        for item in items {
            transaction
                .execute(
                    "INSERT INTO navigation_items (role, href, label, position, enabled)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![role, item.href, item.label, item.position, i64::from(item.enabled)],
                )
                .map_err(|err| {
                    if is_unique_violation(&err) {
                        SqliteStoreError::Invalid(format!(
                            "duplicate navigation position or href for role {role}"
                        ))
                    } else {
                        map_db_error(&err)
                    }
                })?;
        }
        transaction.commit().map_err(|err| map_db_error(&err))?;
        Ok(())
    }
}
