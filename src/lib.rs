pub mod commands;
pub mod config;
pub mod database;
pub mod error;
pub mod ollama;
pub mod services;
pub mod worker;

use anyhow::Result;
use config::Config;
use database::Database;
use services::Services;
use std::sync::Arc;

/// Open the store and build the collaborators described by `config`.
pub fn open(config: &Config) -> Result<(Arc<Database>, Services)> {
    config.ensure_dirs()?;
    let db_path = config.database_path();
    log::info!("Opening database at {:?}", db_path);
    let db = Arc::new(Database::new(&db_path)?);
    let services = Services::from_config(config)?;
    Ok((db, services))
}
