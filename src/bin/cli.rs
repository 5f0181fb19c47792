//! fedtube CLI
//!
//! Local host application: feeds raw settings and the saved state blob to the
//! aggregator, prints results as JSON and writes the state back.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use fedtube::{
    error::{AppError, Result},
    models::{Config, Settings},
    pipeline::Aggregator,
    storage::{LocalStateStorage, PersistedState, StateStorage, decode_lossy},
    utils::{RetryPolicy, url::extract_video_id},
};
use serde::Serialize;
use serde_json::{Value, json};

/// fedtube - aggregated listings across federated video instances
#[derive(Parser, Debug)]
#[command(
    name = "fedtube",
    version,
    about = "Aggregated listings across federated video instances"
)]
struct Cli {
    /// Operator configuration (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// User settings (JSON)
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// State file carried between runs
    #[arg(long, default_value = "fedtube-state.json")]
    state: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List recent videos across instances
    Home,

    /// Search videos across instances
    Search {
        /// Search text
        query: String,
    },

    /// Check every configured instance
    Probe,

    /// Extract instance and video id from a watch URL
    Resolve {
        url: String,

        /// Also report a view when activity submission is enabled
        #[arg(long)]
        report: bool,
    },

    /// Show the saved state
    State,

    /// Validate configuration and print normalized settings
    Validate,
}

/// Initialize logging based on verbosity flag and configured level.
fn init_logging(verbose: bool, level: &str) {
    let level = if verbose { "debug" } else { level };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Read the settings file.
///
/// Settings never fail: an unreadable file yields defaults, and non-JSON or
/// non-UTF-8 content is handed to the normalizer as a string.
async fn load_settings(path: Option<&Path>, retry: &RetryPolicy) -> Value {
    let Some(path) = path else {
        return Value::Null;
    };
    let label = format!("read {}", path.display());
    match retry.run(&label, || tokio::fs::read(path)).await {
        Ok(bytes) => {
            let text = decode_lossy(bytes, path);
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        }
        Err(e) => {
            log::warn!("Settings unreadable from {:?}: {}. Using defaults.", path, e);
            Value::Null
        }
    }
}

/// Load the saved state blob; a failed read starts fresh.
async fn load_state(storage: &LocalStateStorage) -> Option<String> {
    storage.load().await.unwrap_or_else(|e| {
        log::warn!("State unreadable from {:?}: {}. Starting fresh.", storage.path(), e);
        None
    })
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = cli.config.as_deref().map(Config::load);
    let level = match &loaded {
        Some(Ok(config)) => config.logging.level.clone(),
        _ => Config::default().logging.level,
    };
    init_logging(cli.verbose, &level);

    let config = match loaded {
        Some(Ok(config)) => config,
        Some(Err(e)) => {
            log::warn!("Config load failed: {}. Using defaults.", e);
            Config::default()
        }
        None => Config::default(),
    };

    let retry = config.retry.policy();
    let raw_settings = load_settings(cli.settings.as_deref(), &retry).await;
    let storage = LocalStateStorage::new(&cli.state).with_retry(retry);

    match cli.command {
        Command::Validate => {
            log::info!("Validating configuration...");
            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            print_json(&Settings::normalize(&raw_settings))?;
            log::info!("All validations passed!");
            return Ok(());
        }

        Command::State => {
            let settings = Settings::normalize(&raw_settings);
            let blob = load_state(&storage).await;
            let state = PersistedState::load(blob.as_deref(), settings.seen_max, chrono::Utc::now());
            print_json(&json!({
                "path": storage.path(),
                "serverVersion": state.server_version,
                "seenIds": state.seen.iter().collect::<Vec<_>>(),
                "unhealthyHosts": state.unhealthy_hosts,
            }))?;
            return Ok(());
        }

        _ => {}
    }

    let blob = load_state(&storage).await;
    let aggregator = Aggregator::enable(config, &raw_settings, blob.as_deref())?;

    match cli.command {
        Command::Home => print_json(&aggregator.home().await)?,

        Command::Search { query } => print_json(&aggregator.search(&query).await)?,

        Command::Probe => {
            let reports: Vec<Value> = aggregator
                .probe_all()
                .await
                .into_iter()
                .map(|report| match report.result {
                    Ok(version) => json!({ "host": report.host, "serverVersion": version }),
                    Err(e) => json!({ "host": report.host, "error": e.to_string() }),
                })
                .collect();
            print_json(&reports)?;
        }

        Command::Resolve { url, report } => {
            let (host, id) = extract_video_id(&url)
                .ok_or_else(|| AppError::validation(format!("not a video URL: {url}")))?;
            let reported = report && aggregator.report_view(&host, &id).await;
            print_json(&json!({ "host": host, "id": id, "reported": reported }))?;
        }

        Command::State | Command::Validate => {}
    }

    storage.save(&aggregator.save_state()).await?;
    log::info!("State saved to {}", storage.path().display());

    Ok(())
}
