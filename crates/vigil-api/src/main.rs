//! vigil-server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), builds the
//! in-memory activity store wired to an event bus, and serves the JSON API
//! over HTTP. Settings can be overridden with `VIGIL_`-prefixed environment
//! variables, e.g. `VIGIL_PORT=9090`.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context as _;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use vigil_api::ServerConfig;
use vigil_bus::EventBus;
use vigil_cqrs::Dispatcher;
use vigil_store_memory::{MemoryStore, StoreConfig};

#[derive(Parser)]
#[command(author, version, about = "Vigil activity server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("VIGIL"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  // Wire the bus, store, and dispatcher.
  let bus = Arc::new(EventBus::new(server_cfg.event_history_capacity));
  let store = Arc::new(MemoryStore::new(&bus, StoreConfig {
    cache_ttl: Duration::from_secs(server_cfg.cache_ttl_seconds),
  }));
  let dispatcher = Dispatcher::new(store, Arc::clone(&bus));

  let app = vigil_api::api_router(dispatcher);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}
