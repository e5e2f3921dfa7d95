//! `clipscribe` command line.
//!
//! `run` keeps the polled stages going until Ctrl-C; every other subcommand
//! performs one operation and prints its result as JSON.

use anyhow::Result;
use clap::{Parser, Subcommand};
use clipscribe_lib::config::Config;
use clipscribe_lib::error::AppError;
use clipscribe_lib::worker::PipelineWorker;
use clipscribe_lib::{commands, open};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "clipscribe")]
#[command(about = "Short-video comment pipeline")]
struct Cli {
    /// YAML config file (defaults to <data dir>/clipscribe/config.yaml)
    #[arg(long, global = true, env = "CLIPSCRIBE_CONFIG")]
    config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the download, convert and transcribe stages until interrupted
    Run,

    /// Queue one or more source URLs
    Add {
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// List items that have not been posted
    Queue {
        #[arg(long)]
        limit: Option<usize>,
        /// Include stage flags, prompt and comment text
        #[arg(long = "detail")]
        detail: bool,
    },

    /// Download a URL directly without queueing it
    Fetch { url: String },

    /// Generate the comment for a comment id
    Generate { id: i64 },

    /// Mark a comment posted and clean up its media
    Post {
        id: i64,
        #[arg(long)]
        by: Option<String>,
    },

    /// Remove an intake record and everything derived from it
    Remove { intake_id: i64 },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn execute(config: &Config, command: Commands) -> Result<Result<serde_json::Value, AppError>> {
    let (db, services) = open(config)?;
    let result = match command {
        Commands::Run => {
            tracing::info!("Starting clipscribe pipeline");
            let cancel = CancellationToken::new();
            let shutdown = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Shutdown requested");
                }
                shutdown.cancel();
            });
            PipelineWorker::new(db, &services, config.job_interval())
                .run(cancel)
                .await;
            Ok(serde_json::json!({ "stopped": true }))
        }
        Commands::Add { urls } => commands::enqueue_urls(&db, &urls).and_then(to_json),
        Commands::Queue { limit, detail } => {
            commands::list_queue(&db, limit, detail).and_then(to_json)
        }
        Commands::Fetch { url } => commands::fetch_media(&services, &url)
            .await
            .and_then(to_json),
        Commands::Generate { id } => commands::generate_comment(&db, &services, id)
            .await
            .and_then(to_json),
        Commands::Post { id, by } => commands::mark_posted(&db, id, by.as_deref())
            .await
            .and_then(to_json),
        Commands::Remove { intake_id } => commands::remove_intake(&db, intake_id)
            .map(|()| serde_json::json!({ "removed": intake_id })),
    };
    Ok(result)
}

fn to_json<T: Serialize>(value: T) -> Result<serde_json::Value, AppError> {
    serde_json::to_value(value).map_err(AppError::from)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load(cli.config.as_deref())?;

    match execute(&config, cli.command).await? {
        Ok(value) => {
            print_json(&value)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            tracing::debug!("Command failed: {}", e);
            print_json(&e)?;
            Ok(ExitCode::FAILURE)
        }
    }
}
