// crates/afu9-store-sqlite/src/migrations.rs
// ============================================================================
// Module: Schema Migrations
// Description: Ordered, checksummed schema migrations for the control-plane store.
// Purpose: Evolve the schema deterministically and fail closed on drift.
// Dependencies: afu9-core, rusqlite
// ============================================================================

//! ## Overview
//! Migrations are embedded, ordered, and recorded in `schema_migrations` with
//! a SHA-256 checksum of their SQL. Re-running is a no-op; a checksum mismatch
//! for an already-applied version means the binary and the database disagree
//! about history, and the store refuses to open.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::Connection;
use rusqlite::params;

use afu9_core::hashing::hash_bytes;

use crate::store::SqliteStoreError;

// ============================================================================
// SECTION: Migration Set
// ============================================================================

/// One embedded migration.
struct Migration {
    /// Monotonic version number.
    version: i64,
    /// Short description recorded alongside the version.
    description: &'static str,
    /// Migration SQL.
    sql: &'static str,
}

/// Ordered migration list; append-only across releases.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "issues and event log",
        sql: r"
CREATE TABLE issues (
    id TEXT PRIMARY KEY,
    public_id INTEGER NOT NULL UNIQUE,
    canonical_id TEXT UNIQUE,
    local_status TEXT NOT NULL,
    handoff_state TEXT NOT NULL,
    execution_override INTEGER NOT NULL DEFAULT 0,
    issue_json TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE UNIQUE INDEX idx_issues_single_active
    ON issues(local_status) WHERE local_status = 'ACTIVE';

CREATE TABLE issue_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    issue_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    actor TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX idx_issue_events_issue ON issue_events(issue_id, id);

CREATE TRIGGER trg_issues_created
AFTER INSERT ON issues
BEGIN
    INSERT INTO issue_events (issue_id, event_type, actor, payload_json, created_at)
    VALUES (
        NEW.id,
        'CREATED',
        'SYSTEM',
        json_object('canonicalId', NEW.canonical_id),
        NEW.created_at
    );
END;

CREATE TRIGGER trg_issues_status_changed
AFTER UPDATE OF local_status ON issues
WHEN NEW.local_status <> OLD.local_status
BEGIN
    INSERT INTO issue_events (issue_id, event_type, actor, payload_json, created_at)
    VALUES (
        NEW.id,
        'STATUS_CHANGED',
        'SYSTEM',
        json_object('from', OLD.local_status, 'to', NEW.local_status),
        NEW.updated_at
    );
END;

CREATE TRIGGER trg_issues_handoff_changed
AFTER UPDATE OF handoff_state ON issues
WHEN NEW.handoff_state <> OLD.handoff_state
BEGIN
    INSERT INTO issue_events (issue_id, event_type, actor, payload_json, created_at)
    VALUES (
        NEW.id,
        'HANDOFF_STATE_CHANGED',
        'SYSTEM',
        json_object('from', OLD.handoff_state, 'to', NEW.handoff_state),
        NEW.updated_at
    );
END;
",
    },
    Migration {
        version: 2,
        description: "operational rows",
        sql: r"
CREATE TABLE runs (
    id TEXT PRIMARY KEY,
    issue_id TEXT,
    bundle_json TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE deploy_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    env TEXT NOT NULL,
    service TEXT NOT NULL,
    version TEXT NOT NULL,
    commit_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    message TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX idx_deploy_events_env ON deploy_events(env, created_at);

CREATE TABLE policy_snapshots (
    id TEXT PRIMARY KEY,
    version TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE verdicts (
    execution_id TEXT PRIMARY KEY,
    policy_snapshot_id TEXT NOT NULL,
    verdict_json TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE verification_reports (
    id TEXT PRIMARY KEY,
    issue_id TEXT NOT NULL,
    status TEXT NOT NULL,
    report_json TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX idx_verification_issue ON verification_reports(issue_id, created_at);
",
    },
    Migration {
        version: 3,
        description: "timeline graph",
        sql: r"
CREATE TABLE timeline_nodes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_system TEXT NOT NULL,
    source_type TEXT NOT NULL,
    source_id TEXT NOT NULL,
    node_type TEXT NOT NULL,
    title TEXT,
    url TEXT,
    payload_json TEXT NOT NULL,
    lawbook_version TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    UNIQUE(source_system, source_type, source_id)
);

CREATE TABLE timeline_edges (
    from_node_id INTEGER NOT NULL,
    to_node_id INTEGER NOT NULL,
    edge_type TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    UNIQUE(from_node_id, to_node_id, edge_type)
);

CREATE INDEX idx_timeline_edges_from ON timeline_edges(from_node_id);

CREATE TABLE timeline_sources (
    node_id INTEGER NOT NULL,
    source_kind TEXT NOT NULL,
    ref_json TEXT NOT NULL,
    sha256 TEXT NOT NULL
);

CREATE INDEX idx_timeline_sources_node ON timeline_sources(node_id);
",
    },
    Migration {
        version: 4,
        description: "governance and audit",
        sql: r"
CREATE TABLE policy_executions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    action_type TEXT NOT NULL,
    action_fingerprint TEXT NOT NULL,
    target_identifier TEXT NOT NULL,
    decision TEXT NOT NULL,
    reason TEXT NOT NULL,
    idempotency_key_hash TEXT,
    lawbook_version TEXT,
    lawbook_hash TEXT,
    created_at INTEGER NOT NULL,
    enforcement_json TEXT NOT NULL
);

CREATE INDEX idx_policy_exec_gate
    ON policy_executions(action_type, target_identifier, decision, created_at);

CREATE TABLE approval_gates (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    request_id TEXT NOT NULL,
    action_type TEXT NOT NULL,
    target TEXT NOT NULL,
    actor TEXT NOT NULL,
    decision TEXT NOT NULL,
    signed_phrase TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX idx_approval_gate ON approval_gates(action_type, target, created_at);

CREATE TABLE active_lawbooks (
    lawbook_id TEXT PRIMARY KEY,
    lawbook_json TEXT NOT NULL,
    activated_at INTEGER NOT NULL
);

CREATE TABLE sync_audit_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_type TEXT NOT NULL,
    direction TEXT NOT NULL,
    issue_id TEXT NOT NULL,
    forge_issue_number INTEGER,
    timestamp INTEGER NOT NULL,
    payload_json TEXT NOT NULL,
    event_hash TEXT NOT NULL UNIQUE
);

CREATE TABLE sync_conflicts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    issue_id TEXT NOT NULL,
    conflict_type TEXT NOT NULL,
    description TEXT NOT NULL,
    detected_at INTEGER NOT NULL,
    resolved_at INTEGER,
    resolution_notes TEXT
);

CREATE INDEX idx_sync_conflicts_issue ON sync_conflicts(issue_id, detected_at);
",
    },
    Migration {
        version: 5,
        description: "webhooks navigation incidents views",
        sql: r"
CREATE TABLE webhook_deliveries (
    delivery_id TEXT PRIMARY KEY,
    event_type TEXT NOT NULL,
    repo TEXT,
    received_at INTEGER NOT NULL
);

CREATE TABLE webhook_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    delivery_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    event_action TEXT,
    payload_json TEXT NOT NULL,
    signature TEXT NOT NULL,
    received_at INTEGER NOT NULL,
    processed INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE workflow_mappings (
    event_key TEXT PRIMARY KEY,
    workflow TEXT NOT NULL,
    auto_trigger INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE navigation_items (
    role TEXT NOT NULL,
    href TEXT NOT NULL,
    label TEXT NOT NULL,
    position INTEGER NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    UNIQUE(role, position),
    UNIQUE(role, href)
);

CREATE TABLE incidents (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    incident_json TEXT NOT NULL,
    opened_at INTEGER NOT NULL
);

CREATE TABLE incident_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    incident_id TEXT NOT NULL,
    event_json TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE evidence_items (
    id TEXT PRIMARY KEY,
    incident_id TEXT NOT NULL,
    item_json TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE remediation_runs (
    run_id TEXT PRIMARY KEY,
    incident_id TEXT NOT NULL,
    run_json TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE outcome_records (
    outcome_key TEXT PRIMARY KEY,
    incident_id TEXT NOT NULL,
    record_json TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE VIEW active_issues AS
    SELECT id, public_id, canonical_id, issue_json
    FROM issues WHERE local_status = 'ACTIVE';

CREATE VIEW pending_handoff AS
    SELECT id, public_id, canonical_id, handoff_state, issue_json
    FROM issues WHERE handoff_state IN ('NOT_SENT', 'FAILED');

CREATE VIEW issue_statistics AS
    SELECT local_status, COUNT(*) AS issue_count
    FROM issues GROUP BY local_status;
",
    },
];

// ============================================================================
// SECTION: Application
// ============================================================================

/// Applies pending migrations and verifies recorded checksums.
///
/// # Errors
///
/// Returns [`SqliteStoreError::VersionMismatch`] when an applied migration's
/// checksum differs from the embedded SQL, and [`SqliteStoreError::Db`] on
/// engine failures.
pub fn apply_migrations(connection: &Connection) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                checksum TEXT NOT NULL,
                applied_at INTEGER NOT NULL DEFAULT (strftime('%s','now') * 1000)
            );",
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;

    for migration in MIGRATIONS {
        let checksum = hash_bytes(migration.sql.as_bytes()).value;
        let recorded: Option<String> = connection
            .query_row(
                "SELECT checksum FROM schema_migrations WHERE version = ?1",
                params![migration.version],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(SqliteStoreError::Db(other.to_string())),
            })?;

        match recorded {
            Some(existing) if existing == checksum => {}
            Some(existing) => {
                return Err(SqliteStoreError::VersionMismatch(format!(
                    "migration {} checksum drift: recorded {existing}, embedded {checksum}",
                    migration.version
                )));
            }
            None => {
                connection
                    .execute_batch(migration.sql)
                    .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
                connection
                    .execute(
                        "INSERT INTO schema_migrations (version, description, checksum, applied_at)
                         VALUES (?1, ?2, ?3, strftime('%s','now') * 1000)",
                        params![migration.version, migration.description, checksum],
                    )
                    .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            }
        }
    }
    Ok(())
}
