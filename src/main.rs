use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dataloader::cache::SnapshotInfo;
use dataloader::client::HttpTransport;
use dataloader::config::Config;
use dataloader::{
  PaginationAccumulator, PersistentCache, RequestConfig, RequestCoordinator, SqliteStorage,
};

#[derive(Parser, Debug)]
#[command(name = "dataloader")]
#[command(about = "Fetch JSON resources through a caching, deduplicating loader")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/dataloader/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Also log to stderr
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Fetch one resource and print its JSON body
  Get {
    resource: String,
    /// Query parameter, repeatable
    #[arg(short, long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    params: Vec<(String, String)>,
  },
  /// Fetch every page of a listing and print the merged result
  Pages {
    resource: String,
    #[arg(short, long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    params: Vec<(String, String)>,
    /// Override pagination.page_size
    #[arg(long)]
    page_size: Option<u32>,
  },
  /// Fetch several resources concurrently and report each outcome
  Preload {
    #[arg(required = true)]
    resources: Vec<String>,
  },
  /// Inspect or clear the stored snapshot
  Snapshot {
    #[command(subcommand)]
    action: SnapshotAction,
  },
}

#[derive(Subcommand, Debug)]
enum SnapshotAction {
  /// Print snapshot size, age and expiry
  Info,
  /// Delete the stored snapshot
  Clear,
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
  raw
    .split_once('=')
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .filter(|(k, _)| !k.is_empty())
    .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))
}

fn init_logging(verbose: bool) -> Result<Option<WorkerGuard>> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

  let guard = match dirs::data_dir().map(|d| d.join("dataloader").join("logs")) {
    Some(log_dir) => {
      std::fs::create_dir_all(&log_dir)?;
      let appender = tracing_appender::rolling::daily(log_dir, "dataloader.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);
      let file_layer = fmt::layer().with_writer(writer).with_ansi(false);
      let stderr_layer = verbose.then(|| fmt::layer().with_writer(std::io::stderr));

      tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()?;
      Some(guard)
    }
    None => {
      let stderr_layer = verbose.then(|| fmt::layer().with_writer(std::io::stderr));
      tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .try_init()?;
      None
    }
  };

  Ok(guard)
}

fn request_config(params: Vec<(String, String)>) -> RequestConfig {
  params
    .into_iter()
    .fold(RequestConfig::new(), |config, (k, v)| config.param(k, v))
}

fn print_json(value: &Value) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

fn open_snapshot_cache(config: &Config) -> Result<PersistentCache<SqliteStorage>> {
  let storage = match config.snapshot.path.as_deref() {
    Some(path) => SqliteStorage::open_at(path)?,
    None => SqliteStorage::open()?,
  };
  Ok(PersistentCache::new(storage).with_duration(config.snapshot.ttl()))
}

fn snapshot_info_json(info: Option<SnapshotInfo>, path: &Path) -> Value {
  json!({ "snapshot": info, "path": path.display().to_string() })
}

fn snapshot(action: &SnapshotAction, config: &Config) -> Result<()> {
  let cache = open_snapshot_cache(config)?;
  match action {
    SnapshotAction::Info => {
      let path = match config.snapshot.path.clone() {
        Some(path) => path,
        None => SqliteStorage::default_path()?,
      };
      print_json(&snapshot_info_json(cache.describe(), &path))
    }
    SnapshotAction::Clear => {
      cache.try_clear()?;
      info!("Snapshot cleared");
      Ok(())
    }
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = init_logging(args.verbose)?;

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  debug!(?config, "Configuration loaded");

  let transport = Arc::new(HttpTransport::new()?);
  let coordinator = RequestCoordinator::new(transport, config.coordinator());
  let sweeper = coordinator.spawn_cleanup(config.loader.cleanup_interval());

  let outcome = run(&args.command, &config, &coordinator).await;

  sweeper.shutdown().await;
  let stats = coordinator.stats();
  debug!(
    cached = stats.cached_entries,
    in_flight = stats.in_flight,
    "Loader finished"
  );

  outcome
}

async fn run(command: &Command, config: &Config, coordinator: &RequestCoordinator) -> Result<()> {
  match command {
    Command::Get { resource, params } => {
      let value = coordinator
        .load(resource, &request_config(params.clone()))
        .await?;
      print_json(&value)
    }
    Command::Pages {
      resource,
      params,
      page_size,
    } => {
      let page_size = page_size.unwrap_or(config.pagination.page_size);
      if page_size == 0 {
        return Err(eyre!("--page-size must be at least 1"));
      }
      let pages: PaginationAccumulator<Value> =
        PaginationAccumulator::new(coordinator.clone(), page_size);
      let all = pages
        .load_all_pages(resource, &request_config(params.clone()))
        .await?;
      print_json(&serde_json::to_value(all)?)
    }
    Command::Preload { resources } => {
      let results = coordinator
        .preload(resources.iter().cloned(), &RequestConfig::new())
        .await;

      let mut failed = 0;
      let report: Vec<Value> = results
        .into_iter()
        .map(|(resource, result)| match result {
          Ok(_) => json!({ "resource": resource, "ok": true }),
          Err(e) => {
            failed += 1;
            json!({ "resource": resource, "ok": false, "error": e.to_string() })
          }
        })
        .collect();
      print_json(&Value::Array(report))?;

      if failed > 0 {
        return Err(eyre!("{failed} of {} resources failed", resources.len()));
      }
      Ok(())
    }
    Command::Snapshot { action } => snapshot(action, config),
  }
}
