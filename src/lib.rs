pub mod aggregation;
pub mod api;
pub mod audio;
pub mod cli;
pub mod db;
pub mod error;
pub mod identity;
pub mod models;
pub mod monitor;
pub mod sensing;
pub mod settings;
pub mod utils;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use log::{info, warn};

use aggregation::SessionAggregationService;
use api::ApiState;
use cli::{Cli, Commands};
use db::Database;
use identity::StaticTokenIdentity;
use settings::SettingsStore;

pub use error::{FocusError, FocusResult};

pub const DATABASE_FILE: &str = "focusbuddy.sqlite3";
pub const SETTINGS_FILE: &str = "settings.json";

pub fn init_logging() {
    // Reads RUST_LOG, defaulting to info.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

fn resolve_data_dir(cli: &Cli) -> Result<PathBuf> {
    let dir = match &cli.data_dir {
        Some(dir) => dir.clone(),
        None => dirs::data_dir()
            .map(|dir| dir.join("focusbuddy"))
            .context("No platform data directory; pass --data-dir")?,
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create data directory {}", dir.display()))?;
    Ok(dir)
}

pub async fn run(cli: Cli) -> Result<()> {
    let data_dir = resolve_data_dir(&cli)?;
    let settings = SettingsStore::new(data_dir.join(SETTINGS_FILE))?;

    match &cli.command {
        Commands::Serve { bind } => {
            let mut server = settings.server();
            if let Some(bind) = bind {
                server.bind = bind.clone();
            }
            let identity = StaticTokenIdentity::new(
                server
                    .api_tokens
                    .iter()
                    .map(|entry| (entry.token.clone(), entry.user_id.clone())),
            )?;
            if identity.is_empty() {
                warn!("No apiTokens configured in settings; every session request will be rejected");
            } else {
                info!("Loaded {} API token(s)", identity.len());
            }
            let database = Database::new(data_dir.join(DATABASE_FILE))?;
            info!("Serving sessions from {}", database.path().display());

            let state = ApiState {
                service: SessionAggregationService::new(database),
                identity: Arc::new(identity),
            };
            api::start_server(&server, state).await
        }
        Commands::Watch(args) => {
            monitor::commands::run_watch(args, settings.monitor(), &data_dir).await
        }
        Commands::Summary { user } => {
            let service = SessionAggregationService::new(Database::new(data_dir.join(DATABASE_FILE))?);
            aggregation::commands::print_summary(&service, user).await
        }
        Commands::Clear { user } => {
            let service = SessionAggregationService::new(Database::new(data_dir.join(DATABASE_FILE))?);
            aggregation::commands::clear_sessions(&service, user).await
        }
    }
}
