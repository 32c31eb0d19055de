// crates/ev_cli/src/main.rs
//
// Evidence-core CLI entrypoint. Strictly offline & deterministic: no
// network, no OS RNG beyond identifier minting. Exit code 0 on success,
// non-zero on operational error (1) or failure verdict (2).

mod args;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use args::{AlgorithmsCommand, AuditCommand, Cli, Command, ExportCommand};

use ev_algo::registry::builtin_registry;
use ev_algo::{run_and_record, AlgoContext};
use ev_core::envelope::AlgorithmParams;
use ev_core::external::AuditSink;
use ev_core::ids::{CaseId, TenantId};
use ev_pipeline::{build_sealed_package, replay_case, ExportConfig};
use ev_store::audit_log::JsonAuditLog;
use ev_store::casedb::JsonCaseDb;
use ev_store::{EvidenceStore, LocalFsStore};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("ev: error: {e}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, String> {
    let backend =
        LocalFsStore::open(&cli.store_root).map_err(|e| format!("open store: {e}"))?;
    let store = EvidenceStore::new(Arc::new(backend));
    let db = JsonCaseDb::open(&cli.db_root).map_err(|e| format!("open case db: {e}"))?;
    let audit: Option<JsonAuditLog> = match &cli.audit_log {
        Some(path) => Some(JsonAuditLog::open(path).map_err(|e| format!("open audit log: {e}"))?),
        None => None,
    };
    let audit_ref: Option<&dyn AuditSink> = audit.as_ref().map(|a| a as &dyn AuditSink);
    let registry = builtin_registry();

    match cli.command {
        Command::Algorithms { command } => match command {
            AlgorithmsCommand::List => {
                let rows = registry.list();
                if cli.json {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&rows).map_err(|e| e.to_string())?
                    );
                } else {
                    for row in rows {
                        println!("{} v{} — {}", row.algorithm_id, row.version, row.description);
                    }
                }
                Ok(ExitCode::SUCCESS)
            }
            AlgorithmsCommand::Run {
                algorithm_id,
                scope,
                extra,
            } => {
                let Some(algorithm) = registry.get(&algorithm_id, None) else {
                    return Err(format!("unknown algorithm: {algorithm_id}"));
                };
                let mut params = AlgorithmParams::new(CaseId(scope.case_id), TenantId(scope.tenant_id))
                    .with_actor(None, "cli");
                if let Some(extra) = extra {
                    let value: serde_json::Value =
                        serde_json::from_str(&extra).map_err(|e| format!("bad --extra JSON: {e}"))?;
                    let map = value
                        .as_object()
                        .ok_or_else(|| "--extra must be a JSON object".to_string())?;
                    for (k, v) in map {
                        params.extra.insert(k.clone(), v.clone());
                    }
                }

                let mut ctx = AlgoContext::new(&store, &db);
                if let Some(sink) = audit_ref {
                    ctx = ctx.with_audit(sink);
                }
                let result = run_and_record(algorithm.as_ref(), &params, &ctx)
                    .map_err(|e| format!("run failed: {e}"))?;

                if cli.json {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&result).map_err(|e| e.to_string())?
                    );
                } else if !cli.quiet {
                    println!(
                        "ev: {} v{} run {} — success={}",
                        result.algorithm_id, result.algorithm_version, result.run_id, result.success
                    );
                    println!("ev: result_hash={}", result.result_hash);
                    println!("ev: integrity_check={}", result.integrity_check);
                    if let Some(error) = &result.error {
                        println!("ev: error={error}");
                    }
                }
                Ok(if result.success {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::from(2)
                })
            }
        },

        Command::Audit { command } => match command {
            AuditCommand::Integrity { scope } => {
                let Some(algorithm) = registry.get("integrity_sweep", None) else {
                    return Err("integrity_sweep not registered".into());
                };
                let params = AlgorithmParams::new(CaseId(scope.case_id), TenantId(scope.tenant_id))
                    .with_actor(None, "cli");
                let mut ctx = AlgoContext::new(&store, &db);
                if let Some(sink) = audit_ref {
                    ctx = ctx.with_audit(sink);
                }
                let result = run_and_record(algorithm.as_ref(), &params, &ctx)
                    .map_err(|e| format!("run failed: {e}"))?;

                let all_passed =
                    result.success && result.payload["all_passed"].as_bool().unwrap_or(false);
                if cli.json {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&result.payload).map_err(|e| e.to_string())?
                    );
                } else if !cli.quiet {
                    println!(
                        "ev: integrity sweep — all_passed={all_passed} (pass={} fail={} missing={} error={})",
                        result.payload["summary"]["pass"],
                        result.payload["summary"]["fail"],
                        result.payload["summary"]["missing"],
                        result.payload["summary"]["error"],
                    );
                }
                Ok(if all_passed {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::from(2)
                })
            }
        },

        Command::Export { command } => match command {
            ExportCommand::SealedPackage { scope, export_root } => {
                let outcome = build_sealed_package(
                    &registry,
                    &store,
                    &db,
                    audit_ref,
                    None,
                    CaseId(scope.case_id),
                    TenantId(scope.tenant_id),
                    None,
                    "cli",
                    chrono::Utc::now(),
                    &ExportConfig::new(export_root),
                )
                .map_err(|e| format!("sealed export failed: {e}"))?;

                if cli.json {
                    println!(
                        "{}",
                        serde_json::json!({
                            "package_path": outcome.package_path,
                            "seal_hash": outcome.seal_hash,
                            "total_files": outcome.total_files,
                            "algorithms_run": outcome.algorithms_run,
                        })
                    );
                } else if !cli.quiet {
                    println!("ev: sealed package written to {}", outcome.package_path.display());
                    println!("ev: seal_hash={}", outcome.seal_hash);
                    println!("ev: total_files={}", outcome.total_files);
                }
                Ok(ExitCode::SUCCESS)
            }
        },

        Command::ReplayCase { scope, algorithms } => {
            let filter: Option<&[String]> = if algorithms.is_empty() {
                None
            } else {
                Some(&algorithms)
            };
            let report = replay_case(
                &registry,
                &store,
                &db,
                audit_ref,
                CaseId(scope.case_id),
                TenantId(scope.tenant_id),
                filter,
            )
            .map_err(|e| format!("replay failed: {e}"))?;

            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?
                );
            } else if !cli.quiet {
                println!(
                    "ev: replay — total={} matched={} mismatched={} errors={} all_reproducible={}",
                    report.total_runs,
                    report.matched,
                    report.mismatched,
                    report.errors,
                    report.all_reproducible
                );
                for verdict in report.verdicts.iter().filter(|v| !v.result_match) {
                    println!(
                        "ev:   {} v{} run {} — match=false error={:?}",
                        verdict.algorithm_id,
                        verdict.algorithm_version,
                        verdict.original_run_id,
                        verdict.replay_error
                    );
                }
            }
            Ok(if report.all_reproducible {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            })
        }
    }
}
