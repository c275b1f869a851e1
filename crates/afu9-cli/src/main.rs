// crates/afu9-cli/src/main.rs
// ============================================================================
// Module: AFU-9 CLI Entry Point
// Description: Command dispatcher for the control-plane server and operator tasks.
// Purpose: Provide a safe CLI for serving, syncing, ingesting, and postmortems.
// Dependencies: afu9-core, afu9-evidence, afu9-policy, afu9-server, afu9-store-sqlite, afu9-sync, clap, tokio
// ============================================================================

//! ## Overview
//! The AFU-9 CLI runs the API server, applies migrations, drives one-off sync
//! sweeps (the periodic driver is this command under cron), projects
//! operational rows into the evidence timeline, applies verdicts, and
//! generates postmortems. Sweeps default to dry-run; live writes require an
//! explicit flag, mirroring the sync engine's own default.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use thiserror::Error;
use url::Url;

use afu9_core::Actor;
use afu9_core::IncidentId;
use afu9_core::IssueFilter;
use afu9_core::IssueId;
use afu9_core::IssueStore;
use afu9_core::RunId;
use afu9_core::VerdictSignal;
use afu9_core::apply_verdict;
use afu9_evidence::EvidenceIngestor;
use afu9_evidence::generate_postmortem;
use afu9_policy::LawbookResolver;
use afu9_server::StderrAuditSink;
use afu9_server::build_state;
use afu9_server::config::ServerConfig;
use afu9_server::orchestrator::UnconfiguredOrchestrator;
use afu9_server::state::now;
use afu9_store_sqlite::SqliteControlStore;
use afu9_sync::StaticTokenProvider;
use afu9_sync::SweepTarget;
use afu9_sync::SyncEngine;
use afu9_sync::SyncJobRunner;
use afu9_sync::SyncOptions;
use afu9_sync::authenticated_client;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "afu9", arg_required_else_help = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the control-plane API server.
    Serve,
    /// Apply schema migrations and exit.
    Migrate(MigrateCommand),
    /// Run one sync sweep over Forge-linked Issues.
    Sync(SyncCommand),
    /// Project an operational row into the evidence timeline.
    Ingest(IngestCommand),
    /// Apply a GREEN/HOLD/RED verdict to an Issue.
    Verdict(VerdictCommand),
    /// Generate (or fetch) the postmortem for an incident.
    Postmortem(PostmortemCommand),
}

/// Verdict signals the CLI accepts.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum VerdictArg {
    /// Verification passed; advance.
    Green,
    /// Verification inconclusive; hold.
    Hold,
    /// Verification failed; hold.
    Red,
}

/// Arguments for the `verdict` command.
#[derive(Args, Debug)]
struct VerdictCommand {
    /// Database file path (defaults to `DATABASE_NAME` or `afu9.db`).
    #[arg(long, value_name = "PATH")]
    database: Option<PathBuf>,
    /// Issue identifier.
    issue: String,
    /// Verdict signal.
    #[arg(value_enum)]
    signal: VerdictArg,
}

/// Operational row kinds the ingest command accepts.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum IngestKind {
    /// A run with its steps and artifacts.
    Run,
    /// A deploy event (numeric row id).
    Deploy,
    /// A verdict (execution id).
    Verdict,
    /// A verification report.
    Verification,
}

/// Arguments for the `ingest` command.
#[derive(Args, Debug)]
struct IngestCommand {
    /// Database file path (defaults to `DATABASE_NAME` or `afu9.db`).
    #[arg(long, value_name = "PATH")]
    database: Option<PathBuf>,
    /// Row kind to ingest.
    #[arg(value_enum)]
    kind: IngestKind,
    /// Row identifier.
    id: String,
}

/// Arguments for the `postmortem` command.
#[derive(Args, Debug)]
struct PostmortemCommand {
    /// Database file path (defaults to `DATABASE_NAME` or `afu9.db`).
    #[arg(long, value_name = "PATH")]
    database: Option<PathBuf>,
    /// Incident identifier.
    incident: String,
}

/// Arguments for the `migrate` command.
#[derive(Args, Debug)]
struct MigrateCommand {
    /// Database file path (defaults to `DATABASE_NAME` or `afu9.db`).
    #[arg(long, value_name = "PATH")]
    database: Option<PathBuf>,
}

/// Arguments for the `sync` command.
#[derive(Args, Debug)]
struct SyncCommand {
    /// Database file path (defaults to `DATABASE_NAME` or `afu9.db`).
    #[arg(long, value_name = "PATH")]
    database: Option<PathBuf>,
    /// Forge API base URL (falls back to `FORGE_API_BASE`).
    #[arg(long, value_name = "URL")]
    forge_base: Option<Url>,
    /// Forge installation token (falls back to `FORGE_TOKEN`).
    #[arg(long, value_name = "TOKEN")]
    forge_token: Option<String>,
    /// Apply changes instead of the default dry-run.
    #[arg(long)]
    live: bool,
    /// Maximum concurrent per-issue sync tasks.
    #[arg(long, default_value_t = 4)]
    fan_out: usize,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI failure wrapper printed to stderr.
#[derive(Debug, Error)]
enum CliError {
    /// Configuration failure.
    #[error("configuration error: {0}")]
    Config(String),
    /// Store failure.
    #[error("store error: {0}")]
    Store(String),
    /// Serve loop failure.
    #[error("server error: {0}")]
    Serve(String),
    /// Output stream failure.
    #[error("output error: {0}")]
    Output(String),
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let _ = writeln!(std::io::stderr(), "afu9: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Dispatches the parsed command.
fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Serve => serve(),
        Commands::Migrate(command) => migrate(&command),
        Commands::Sync(command) => sync(&command),
        Commands::Ingest(command) => ingest(&command),
        Commands::Verdict(command) => verdict(&command),
        Commands::Postmortem(command) => postmortem(&command),
    }
}

/// Resolves the database path from flag, environment, or default.
fn database_path(flag: Option<&Path>) -> PathBuf {
    flag.map(Path::to_path_buf)
        .or_else(|| std::env::var("DATABASE_NAME").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("afu9.db"))
}

/// Runs the API server until stopped.
fn serve() -> Result<(), CliError> {
    let config =
        ServerConfig::from_process_env().map_err(|err| CliError::Config(err.to_string()))?;
    let path = database_path(config.database_path.as_deref().map(Path::new));
    let store = SqliteControlStore::open(&path).map_err(|err| CliError::Store(err.to_string()))?;
    let state = build_state(
        config,
        store,
        Arc::new(UnconfiguredOrchestrator),
        Arc::new(StderrAuditSink),
    );
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::Serve(err.to_string()))?;
    runtime
        .block_on(afu9_server::serve(state))
        .map_err(|err| CliError::Serve(err.to_string()))
}

/// Applies migrations by opening the store.
fn migrate(command: &MigrateCommand) -> Result<(), CliError> {
    let path = database_path(command.database.as_deref());
    SqliteControlStore::open(&path).map_err(|err| CliError::Store(err.to_string()))?;
    write_stdout_line(&format!("migrations applied: {}", path.display()))
}

/// Runs one sync sweep over all Forge-linked, non-terminal Issues.
fn sync(command: &SyncCommand) -> Result<(), CliError> {
    let config =
        ServerConfig::from_process_env().map_err(|err| CliError::Config(err.to_string()))?;
    let path = database_path(command.database.as_deref());
    let store = Arc::new(
        SqliteControlStore::open(&path).map_err(|err| CliError::Store(err.to_string()))?,
    );

    let forge_base = match &command.forge_base {
        Some(base) => base.clone(),
        None => std::env::var("FORGE_API_BASE")
            .map_err(|_| CliError::Config("FORGE_API_BASE is not set".to_string()))?
            .parse::<Url>()
            .map_err(|err| CliError::Config(err.to_string()))?,
    };
    let forge_token = match &command.forge_token {
        Some(token) => token.clone(),
        None => std::env::var("FORGE_TOKEN")
            .map_err(|_| CliError::Config("FORGE_TOKEN is not set".to_string()))?,
    };
    let forge = authenticated_client(
        config.repo_access.clone(),
        forge_base,
        Arc::new(StaticTokenProvider::new(forge_token)),
    )
    .map_err(|err| CliError::Config(err.to_string()))?;

    let engine = Arc::new(SyncEngine::new(
        Arc::clone(&store) as Arc<dyn afu9_core::IssueStore>,
        Arc::clone(&store) as Arc<dyn afu9_core::OperationalStore>,
        Arc::clone(&store) as Arc<dyn afu9_sync::SyncAuditStore>,
        Arc::new(forge),
    ));

    let page = store
        .list_issues(&IssueFilter::default())
        .map_err(|err| CliError::Store(err.to_string()))?;
    let targets: Vec<SweepTarget> = page
        .issues
        .iter()
        .filter(|issue| !issue.local_status.is_terminal())
        .filter_map(|issue| {
            let repo = issue.forge.repo.as_deref()?;
            let (owner, name) = repo.split_once('/')?;
            let number = issue.forge.issue_number?;
            Some(SweepTarget {
                issue_id: issue.id.clone(),
                owner: owner.to_string(),
                repo: name.to_string(),
                forge_issue_number: number,
            })
        })
        .collect();

    let runner = SyncJobRunner::new(engine, command.fan_out);
    let summary = runner.run_sweep(
        targets,
        &SyncOptions {
            dry_run: !command.live,
            allow_manual_override: false,
            actor: Actor::system(),
        },
        now(),
    );
    let rendered = serde_json::to_string(&summary)
        .map_err(|err| CliError::Output(err.to_string()))?;
    write_stdout_line(&rendered)
}

/// Projects one operational row into the timeline.
fn ingest(command: &IngestCommand) -> Result<(), CliError> {
    let config =
        ServerConfig::from_process_env().map_err(|err| CliError::Config(err.to_string()))?;
    let path = database_path(command.database.as_deref());
    let store = Arc::new(
        SqliteControlStore::open(&path).map_err(|err| CliError::Store(err.to_string()))?,
    );
    let resolver = Arc::new(LawbookResolver::new(
        Arc::clone(&store) as Arc<dyn afu9_policy::LawbookStore>
    ));
    let ingestor = EvidenceIngestor::new(
        Arc::clone(&store) as Arc<dyn afu9_core::OperationalStore>,
        Arc::clone(&store) as Arc<dyn afu9_evidence::TimelineStore>,
        resolver,
        config.lawbook_id,
    );

    let at = now();
    let report = match command.kind {
        IngestKind::Run => ingestor.ingest_run(&RunId::new(command.id.as_str()), at),
        IngestKind::Deploy => {
            let id = command
                .id
                .parse::<i64>()
                .map_err(|err| CliError::Config(format!("deploy id must be numeric: {err}")))?;
            ingestor.ingest_deploy(id, at)
        }
        IngestKind::Verdict => ingestor.ingest_verdict(&command.id, at),
        IngestKind::Verification => ingestor.ingest_verification(&command.id, at),
    }
    .map_err(|err| CliError::Store(err.to_string()))?;
    write_stdout_line(&format!(
        "ingested node {} ({} nodes, {} edges)",
        report.root_node_id, report.nodes_touched, report.edges_touched
    ))
}

/// Applies a verdict to an Issue.
fn verdict(command: &VerdictCommand) -> Result<(), CliError> {
    let path = database_path(command.database.as_deref());
    let store =
        SqliteControlStore::open(&path).map_err(|err| CliError::Store(err.to_string()))?;
    let signal = match command.signal {
        VerdictArg::Green => VerdictSignal::Green,
        VerdictArg::Hold => VerdictSignal::Hold,
        VerdictArg::Red => VerdictSignal::Red,
    };
    let outcome = apply_verdict(
        &store,
        &IssueId::new(command.issue.as_str()),
        signal,
        &Actor::system(),
        now(),
    )
    .map_err(|err| CliError::Store(err.to_string()))?;
    write_stdout_line(&format!(
        "verdict {} applied: status {} (changed: {})",
        signal.as_str(),
        outcome.new_status,
        outcome.state_changed
    ))
}

/// Generates (or fetches) the postmortem for an incident.
fn postmortem(command: &PostmortemCommand) -> Result<(), CliError> {
    let config =
        ServerConfig::from_process_env().map_err(|err| CliError::Config(err.to_string()))?;
    let path = database_path(command.database.as_deref());
    let store = Arc::new(
        SqliteControlStore::open(&path).map_err(|err| CliError::Store(err.to_string()))?,
    );
    let resolver = Arc::new(LawbookResolver::new(
        Arc::clone(&store) as Arc<dyn afu9_policy::LawbookStore>
    ));
    let at = now();
    let version = resolver
        .get_active_version(&config.lawbook_id, at)
        .map_err(|err| CliError::Store(err.to_string()))?;

    let outcome = generate_postmortem(
        store.as_ref(),
        &IncidentId::new(command.incident.as_str()),
        version.as_deref(),
        at,
    )
    .map_err(|err| CliError::Store(err.to_string()))?;
    let rendered = serde_json::to_string(&serde_json::json!({
        "outcomeKey": outcome.record.outcome_key,
        "postmortemHash": outcome.record.postmortem_hash,
        "isNew": outcome.is_new,
    }))
    .map_err(|err| CliError::Output(err.to_string()))?;
    write_stdout_line(&rendered)
}

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> Result<(), CliError> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}").map_err(|err| CliError::Output(err.to_string()))
}
