//! pgseclab CLI
//!
//! - `generate`: compile a policy file to SQL (declared schemas or one target schema)
//! - `verify`: prove the compiled policy in a throwaway namespace on a live database
//! - `analyze`: read-only report on an instance's settings, roles and tables
//!
//! Exit status follows the error class (see `ErrorKind::exit_code`).

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing_subscriber::{fmt, EnvFilter};

use pgseclab_core::error::{PgSecLabError, Result};
use pgseclab_core::{compile, policy, RenderTarget};
use pgseclab_verify::{
    analyze_with_postgres, config, verify_with_postgres, AnalysisReport, CancellationToken,
    VerifyConfig, VerifyMetrics,
};

#[derive(Debug, Parser)]
#[command(name = "pgseclab", version, about = "PostgreSQL roles, row security and masking as code")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compile a policy into ordered, idempotent SQL.
    Generate {
        #[arg(long, default_value = "policy.yaml")]
        policy: PathBuf,
        /// Write SQL here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Render every table reference into this schema.
        #[arg(long)]
        schema: Option<String>,
    },
    /// Apply the policy in a throwaway namespace and check the catalog.
    Verify {
        #[arg(long, default_value = "policy.yaml")]
        policy: PathBuf,
        #[arg(long, env = "DATABASE_URL")]
        dsn: String,
        /// Harness config (YAML); defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
        /// Write Prometheus-format metrics here after the run.
        #[arg(long)]
        metrics_out: Option<PathBuf>,
    },
    /// Report instance settings, roles, tables and findings (read-only).
    Analyze {
        #[arg(long, env = "DATABASE_URL")]
        dsn: String,
        /// Harness config (YAML); only the database section is used.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
        /// Also write the JSON report here.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let (result, format) = match cli.command {
        Command::Generate { policy, out, schema } => (generate(policy, out, schema), Format::Text),
        Command::Verify {
            policy,
            dsn,
            config,
            format,
            metrics_out,
        } => (verify(policy, dsn, config, format, metrics_out).await, format),
        Command::Analyze {
            dsn,
            config,
            format,
            out,
        } => (analyze(dsn, config, format, out).await, format),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let kind = e.kind();
            tracing::error!(code = kind.as_str(), "{e}");
            if format == Format::Json {
                println!(
                    "{}",
                    json!({ "ok": false, "error": { "code": kind.as_str(), "message": e.to_string() } })
                );
            }
            ExitCode::from(kind.exit_code())
        }
    }
}

fn generate(policy: PathBuf, out: Option<PathBuf>, schema: Option<String>) -> Result<()> {
    let p = policy::load_from_file(&policy)?;
    let compiled = compile(&p)?;
    let target = match schema {
        Some(s) => {
            compiled.ensure_retargetable()?;
            RenderTarget::Schema(s)
        }
        None => RenderTarget::Declared,
    };
    let sql = compiled.to_sql(&target);

    match out {
        Some(path) => {
            write_file(&path, &sql)?;
            tracing::info!(statements = compiled.len(), out = %path.display(), "sql written");
        }
        None => print!("{sql}"),
    }
    Ok(())
}

fn load_config(path: Option<PathBuf>) -> Result<VerifyConfig> {
    match path {
        Some(path) => config::load_from_file(path),
        None => Ok(VerifyConfig::default()),
    }
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents)
        .map_err(|e| PgSecLabError::Config(format!("write {} failed: {e}", path.display())))
}

async fn verify(
    policy: PathBuf,
    dsn: String,
    config_path: Option<PathBuf>,
    format: Format,
    metrics_out: Option<PathBuf>,
) -> Result<()> {
    let cfg = load_config(config_path)?;
    let p = policy::load_from_file(&policy)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            on_signal.cancel();
        }
    });

    let metrics = Arc::new(VerifyMetrics::default());
    let result = verify_with_postgres(&p, &dsn, &cfg, metrics.clone(), &cancel).await;

    if let Some(path) = metrics_out {
        if let Err(e) = fs::write(&path, metrics.render()) {
            tracing::warn!(path = %path.display(), error = %e, "writing metrics failed");
        }
    }

    let report = result?;
    match format {
        Format::Json => println!("{}", json!({ "ok": true, "report": report })),
        Format::Text => {
            println!("verified in namespace {} ({} ms)", report.namespace, report.elapsed_ms);
            println!(
                "  {} statements applied, {} fixture tables, {} rows",
                report.statements_applied, report.fixture_tables, report.rows_seeded
            );
            for t in &report.tables_asserted {
                println!("  ok {t}");
            }
        }
    }
    Ok(())
}

async fn analyze(
    dsn: String,
    config_path: Option<PathBuf>,
    format: Format,
    out: Option<PathBuf>,
) -> Result<()> {
    let cfg = load_config(config_path)?;
    let report = analyze_with_postgres(&dsn, &cfg.database).await?;

    if let Some(path) = &out {
        let body = serde_json::to_string_pretty(&report)
            .map_err(|e| PgSecLabError::Internal(format!("encode report: {e}")))?;
        write_file(path, &body)?;
        tracing::info!(out = %path.display(), "analysis report written");
    }

    match format {
        Format::Json => println!("{}", json!({ "ok": true, "report": report })),
        Format::Text => print_analysis(&report),
    }
    Ok(())
}

fn print_analysis(report: &AnalysisReport) {
    println!("{}", report.instance.version);
    for (name, value) in &report.instance.settings {
        println!("  {name} = {value}");
    }
    println!(
        "{} roles, {} tables, {} findings",
        report.roles.len(),
        report.tables.len(),
        report.findings.len()
    );
    for f in &report.findings {
        println!("  [{}] {}: {}", f.severity.as_str(), f.code, f.message);
    }
}
