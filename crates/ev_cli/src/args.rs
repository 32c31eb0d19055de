//! CLI argument definitions and validation.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "ev",
    about = "Offline, deterministic evidence-core CLI",
    version
)]
pub struct Cli {
    /// Evidence store root directory.
    #[arg(long, global = true, default_value = "evidence_store")]
    pub store_root: PathBuf,

    /// Case database root directory.
    #[arg(long, global = true, default_value = "case_db")]
    pub db_root: PathBuf,

    /// Append-only audit log file (JSONL). Omit to run without a sink.
    #[arg(long, global = true)]
    pub audit_log: Option<PathBuf>,

    /// Emit machine-readable JSON instead of human summaries.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output.
    #[arg(long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Inspect and run registered algorithms.
    Algorithms {
        #[command(subcommand)]
        command: AlgorithmsCommand,
    },

    /// Audit operations over stored evidence.
    Audit {
        #[command(subcommand)]
        command: AuditCommand,
    },

    /// Build export packages.
    Export {
        #[command(subcommand)]
        command: ExportCommand,
    },

    /// Replay recorded algorithm runs and verify reproducibility.
    ReplayCase {
        #[command(flatten)]
        scope: CaseScope,

        /// Restrict replay to these algorithm ids.
        #[arg(long = "algorithm")]
        algorithms: Vec<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum AlgorithmsCommand {
    /// List registered algorithms and versions.
    List,

    /// Run one algorithm against a case.
    Run {
        /// Algorithm id (e.g. bulk_dedup).
        algorithm_id: String,

        #[command(flatten)]
        scope: CaseScope,

        /// Extra parameters as JSON (merged into params.extra).
        #[arg(long)]
        extra: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum AuditCommand {
    /// Run the integrity sweep; non-zero exit unless every item passes.
    Integrity {
        #[command(flatten)]
        scope: CaseScope,
    },
}

#[derive(Debug, Subcommand)]
pub enum ExportCommand {
    /// Build the integrity-sealed court package.
    SealedPackage {
        #[command(flatten)]
        scope: CaseScope,

        /// Export root directory.
        #[arg(long, default_value = "exports")]
        export_root: PathBuf,
    },
}

#[derive(Debug, Args)]
pub struct CaseScope {
    /// Case identifier.
    #[arg(long = "case")]
    pub case_id: u64,

    /// Tenant (organization) identifier.
    #[arg(long = "tenant")]
    pub tenant_id: u64,
}
