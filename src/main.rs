/// Version injected at compile time via GCPROV_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("GCPROV_VERSION") {
    Some(v) => v,
    None => "dev",
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use gcprov::config::Config;
use gcprov::gcp::client::GcpClient;
use gcprov::gcp::http::describe_error;
use gcprov::resource::dispatch::{self, Manifest, Report};
use gcprov::resource::{get_all_resource_keys, schema};
use gcprov::{ProviderContext, ProviderError};
use serde_json::Value;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Manage Cloud SQL databases and BigQuery routines
#[derive(Parser, Debug)]
#[command(name = "gcprov", version = VERSION, about, long_about = None)]
struct Args {
    /// Default GCP project for resources that don't name one
    #[arg(short, long, global = true)]
    project: Option<String>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create, update or replace the resources described in manifests
    Apply {
        #[arg(required = true)]
        manifests: Vec<PathBuf>,
    },
    /// Show what apply would do
    Plan {
        #[arg(required = true)]
        manifests: Vec<PathBuf>,
    },
    /// Read a resource by its canonical id
    Read { kind: String, id: String },
    /// Adopt an existing resource
    Import {
        kind: String,
        id: String,
        /// Instance (sql_database) or dataset (bigquery_routine) for short ids
        #[arg(long)]
        parent: Option<String>,
    },
    /// Delete a resource by its canonical id
    Delete { kind: String, id: String },
    /// Print the schema of one or all resource kinds
    Schema { kind: Option<String> },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open log file {log_path:?}"))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("gcprov {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("gcprov").join("gcprov.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".gcprov").join("gcprov.log");
    }
    PathBuf::from("gcprov.log")
}

/// Render epoch-millisecond fields of a state as RFC 3339
fn render_timestamps(state: &mut Value) {
    let Some(obj) = state.as_object_mut() else {
        return;
    };
    for key in ["creation_time", "last_modified_time"] {
        let Some(ms) = obj.get(key).and_then(Value::as_i64) else {
            continue;
        };
        if let Some(ts) = DateTime::<Utc>::from_timestamp_millis(ms) {
            obj.insert(key.to_string(), Value::String(ts.to_rfc3339()));
        }
    }
}

fn print_report(mut report: Report) -> Result<()> {
    render_timestamps(&mut report.state);
    print!("---\n{}", serde_yaml::to_string(&report)?);
    Ok(())
}

fn user_error(err: ProviderError) -> anyhow::Error {
    anyhow::anyhow!(describe_error(&err))
}

fn load_manifests(paths: &[PathBuf]) -> Result<Vec<Manifest>> {
    let mut manifests = Vec::new();
    for path in paths {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {path:?}"))?;
        let parsed = dispatch::parse_manifests(&text)
            .map_err(user_error)
            .with_context(|| format!("in {path:?}"))?;
        manifests.extend(parsed);
    }
    Ok(manifests)
}

async fn provider(args: &Args, config: &Config) -> Result<ProviderContext> {
    let project = config.effective_project(args.project.as_deref());
    if project.is_empty() {
        tracing::warn!("No default project configured; resources must name their own");
    } else {
        tracing::info!("Using project: {}", project);
    }

    let client = GcpClient::new(&project, config.endpoints()?)
        .await
        .map_err(user_error)?
        .with_read_timeout(config.read_timeout());
    Ok(ProviderContext::new(client).with_poll_policy(config.poll_policy()))
}

/// Print every report, then fail if any entry failed
fn finish(results: Vec<gcprov::Result<Report>>) -> Result<()> {
    let mut failures = 0;
    for result in results {
        match result {
            Ok(report) => print_report(report)?,
            Err(err) => {
                tracing::error!("{}", err);
                eprintln!("Error: {}", describe_error(&err));
                failures += 1;
            },
        }
    }
    if failures > 0 {
        anyhow::bail!("{failures} resource(s) failed");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level)?;
    let config = Config::load();

    match &args.command {
        Command::Schema { kind } => {
            let keys = match kind {
                Some(kind) => vec![kind.as_str()],
                None => get_all_resource_keys(),
            };
            for key in keys {
                let def = schema(key).map_err(user_error)?;
                print!("---\n{}", serde_yaml::to_string(def)?);
            }
            Ok(())
        },
        Command::Apply { manifests } => {
            let manifests = load_manifests(manifests)?;
            let ctx = provider(&args, &config).await?;
            let results =
                futures::future::join_all(manifests.into_iter().map(|m| dispatch::apply(&ctx, m))).await;
            finish(results)
        },
        Command::Plan { manifests } => {
            let manifests = load_manifests(manifests)?;
            let ctx = &provider(&args, &config).await?;
            let results = futures::future::join_all(manifests.into_iter().map(|m| async move {
                let (resource, plan) = dispatch::plan_manifest(ctx, m).await?;
                resource.report(Some(plan))
            }))
            .await;
            finish(results)
        },
        Command::Read { kind, id } => {
            let ctx = provider(&args, &config).await?;
            finish(vec![dispatch::read_resource(&ctx, kind, id).await])
        },
        Command::Import { kind, id, parent } => {
            let ctx = provider(&args, &config).await?;
            finish(vec![dispatch::import_resource(&ctx, kind, id, parent.as_deref()).await])
        },
        Command::Delete { kind, id } => {
            let ctx = provider(&args, &config).await?;
            finish(vec![dispatch::delete_resource(&ctx, kind, id).await])
        },
    }
}
