//! `cairn` — the interactive CLI surface (spec §6).
//!
//! Subcommands mirror spec §6 verbatim: `capture`, `recall`, `search`,
//! `sync [full|verify|repair] [--remote]`, `status [--verbose]`. Exit codes
//! follow spec §6's table: 0 success, 1 user error, 2 store unavailable,
//! 3 index corruption, 64 configuration error.

use cairn_cli::repo::{open_application, RepoError};
use cairn_core::app::ApplicationError;
use cairn_core::capture::CaptureInput;
use cairn_core::error::{CaptureError, IndexError, OsaError, RecallError, SyncError};
use cairn_core::model::Domain;
use cairn_core::recall::{DomainScope, SearchFilters};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::Read;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "cairn", author, version, about = "A git-native memory store for coding-agent sessions")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record a new memory.
    Capture {
        namespace: String,
        summary: String,
        /// Memory body. Pass "-" to read from stdin.
        #[arg(long, default_value = "-")]
        content: String,
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
        #[arg(long, default_value = "project")]
        domain: DomainArg,
        #[arg(long)]
        spec: Option<String>,
    },
    /// Semantic (vector) search over stored memories.
    Recall {
        query: String,
        #[arg(long, default_value_t = 5)]
        k: usize,
        #[arg(long)]
        namespace: Vec<String>,
        #[arg(long, default_value = "both")]
        domain: DomainScopeArg,
        /// Defaults to the configured `similarity-threshold` when unset.
        #[arg(long)]
        min_similarity: Option<f32>,
    },
    /// Search stored memories — vector similarity by default, or full-text
    /// with `--text`.
    Search {
        query: String,
        #[arg(long)]
        text: bool,
        #[arg(long)]
        namespace: Vec<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Reconcile the derived index against the object store.
    Sync {
        #[arg(value_enum, default_value = "verify")]
        mode: SyncMode,
        #[arg(long)]
        remote: Option<String>,
    },
    /// Show index/object-store health.
    Status {
        #[arg(long)]
        verbose: bool,
    },
}

#[derive(Clone, clap::ValueEnum)]
enum DomainArg {
    User,
    Project,
}

#[derive(Clone, clap::ValueEnum)]
enum DomainScopeArg {
    User,
    Project,
    Both,
}

#[derive(Clone, clap::ValueEnum)]
enum SyncMode {
    Full,
    Verify,
    Repair,
}

fn main() -> ExitCode {
    cairn_cli::logging::init_cli();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::from(0),
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let mut app = open_application()?;
    match cli.command {
        Command::Capture { namespace, summary, content, tags, domain, spec } => {
            let content = if content == "-" { read_stdin()? } else { content };
            let mut input = CaptureInput::new(namespace, summary, content);
            input.tags = tags;
            input.domain = match domain {
                DomainArg::User => Domain::User,
                DomainArg::Project => Domain::Project,
            };
            input.spec = spec;
            let result = app.capture(input)?;
            println!("{}", serde_json::to_string_pretty(&result).expect("CaptureResult is always serializable"));
            if let Some(warning) = &result.warning {
                eprintln!("{} {warning}", "warning:".yellow().bold());
            }
            Ok(())
        }
        Command::Recall { query, k, namespace, domain, min_similarity } => {
            let filters = SearchFilters {
                k,
                namespaces: parse_namespaces(&namespace)?,
                domain: match domain {
                    DomainScopeArg::User => DomainScope::User,
                    DomainScopeArg::Project => DomainScope::Project,
                    DomainScopeArg::Both => DomainScope::Both,
                },
                min_similarity: min_similarity.unwrap_or(app.config().similarity_threshold),
                spec: None,
            };
            let results = app.recall().search(&query, &filters)?;
            println!("{}", serde_json::to_string_pretty(&results).expect("MemoryResult is always serializable"));
            Ok(())
        }
        Command::Search { query, text, namespace, limit } => {
            let filters = SearchFilters {
                k: limit,
                namespaces: parse_namespaces(&namespace)?,
                domain: DomainScope::Both,
                min_similarity: app.config().similarity_threshold,
                spec: None,
            };
            if text {
                let results = app.recall().search_text(&query, &filters)?;
                println!("{}", serde_json::to_string_pretty(&results).expect("Memory is always serializable"));
            } else {
                let results = app.recall().search(&query, &filters)?;
                println!("{}", serde_json::to_string_pretty(&results).expect("MemoryResult is always serializable"));
            }
            Ok(())
        }
        Command::Sync { mode, remote } => run_sync(&app, mode, remote),
        Command::Status { verbose } => run_status(&app, verbose),
    }
}

fn run_sync(app: &cairn_core::app::Application, mode: SyncMode, remote: Option<String>) -> Result<(), CliError> {
    let sync = app.sync();
    match mode {
        SyncMode::Full => {
            let stats = sync.reindex(Domain::Project, None, true)?;
            println!("{}", serde_json::to_string_pretty(&ReindexStatsView::from(stats)).unwrap());
        }
        SyncMode::Verify => {
            let report = sync.verify_consistency(Domain::Project, None)?;
            println!("{}", serde_json::to_string_pretty(&report).expect("ConsistencyReport is always serializable"));
        }
        SyncMode::Repair => {
            let report = sync.verify_consistency(Domain::Project, None)?;
            let stats = sync.repair(Domain::Project, &report)?;
            println!("reinserted={} overwritten={} deleted={}", stats.reinserted, stats.overwritten, stats.deleted);
        }
    }
    if let Some(remote_name) = remote {
        let result = sync.sync_with_remote(Domain::Project, &remote_name, None, app.config().remote_sync, false)?;
        println!(
            "remote: fetched={} merged={} pushed={} reindexed={}",
            result.fetch.refs_updated,
            result.merge.notes_added,
            result.push.map(|p| p.refs_updated).unwrap_or(0),
            result.reindexed
        );
    }
    Ok(())
}

#[derive(serde::Serialize)]
struct ReindexStatsView {
    scanned: usize,
    upserted: usize,
    embed_failures: usize,
    removed: usize,
}

impl From<cairn_core::sync::ReindexStats> for ReindexStatsView {
    fn from(s: cairn_core::sync::ReindexStats) -> Self {
        Self { scanned: s.scanned, upserted: s.upserted, embed_failures: s.embed_failures, removed: s.removed }
    }
}

fn run_status(app: &cairn_core::app::Application, verbose: bool) -> Result<(), CliError> {
    let stats = app.index().stats()?;
    println!("{} {}", "memories:".bold(), stats.total);
    println!("{} {}", "embedding model:".bold(), app.embedding_model_name());
    if let Some(last_sync) = stats.last_sync {
        println!("{} {}", "last sync:".bold(), last_sync.to_rfc3339());
    }
    if verbose {
        for (namespace, count) in &stats.by_namespace {
            println!("  {namespace}: {count}");
        }
    }
    Ok(())
}

fn parse_namespaces(raw: &[String]) -> Result<Option<Vec<cairn_core::model::Namespace>>, CliError> {
    if raw.is_empty() {
        return Ok(None);
    }
    let mut out = Vec::with_capacity(raw.len());
    for s in raw {
        out.push(cairn_core::model::Namespace::parse(s).ok_or_else(|| CliError::InvalidNamespace(s.clone()))?);
    }
    Ok(Some(out))
}

fn read_stdin() -> Result<String, CliError> {
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf).map_err(|e| CliError::Io(e.to_string()))?;
    Ok(buf)
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid namespace: {0}")]
    InvalidNamespace(String),
    #[error("failed to read stdin: {0}")]
    Io(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Recall(#[from] RecallError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Index(#[from] IndexError),
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            CliError::InvalidNamespace(_) | CliError::Io(_) => 1,
            CliError::Repo(RepoError::NotAGitRepo(_)) => 1,
            CliError::Repo(RepoError::Application(ApplicationError::Config(_))) => 64,
            CliError::Repo(RepoError::Application(ApplicationError::Osa(_))) => 2,
            CliError::Repo(RepoError::Application(ApplicationError::Index(_))) => 3,
            CliError::Capture(e) => capture_exit_code(e),
            CliError::Recall(e) => recall_exit_code(e),
            CliError::Sync(e) => sync_exit_code(e),
            CliError::Index(_) => 3,
        }
    }
}

fn capture_exit_code(e: &CaptureError) -> u8 {
    match e {
        CaptureError::InvalidNamespace(_) | CaptureError::InvalidSummary(_) | CaptureError::InvalidContent(_) | CaptureError::ContentBlocked(_) => 1,
        CaptureError::LockTimeout(_) => 1,
        CaptureError::StoreUnavailable(_) => 2,
    }
}

fn recall_exit_code(e: &RecallError) -> u8 {
    match e {
        RecallError::Osa(OsaError::StoreUnavailable(_) | OsaError::RemoteFailed { .. } | OsaError::Git(_) | OsaError::Io(_)) => 2,
        RecallError::Osa(_) => 1,
        RecallError::Index(_) | RecallError::Codec(_) => 3,
        RecallError::Embedding(_) => 1,
    }
}

fn sync_exit_code(e: &SyncError) -> u8 {
    match e {
        SyncError::Osa(OsaError::StoreUnavailable(_) | OsaError::RemoteFailed { .. } | OsaError::Git(_) | OsaError::Io(_)) => 2,
        SyncError::Osa(_) => 1,
        SyncError::Index(_) | SyncError::Codec(_) => 3,
        SyncError::Embedding(_) => 1,
    }
}
