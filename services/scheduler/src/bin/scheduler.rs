//! services/scheduler/src/bin/scheduler.rs

use std::sync::Arc;

use clap::Parser;
use exam_prep_core::scheduler::ScheduleInput;
use scheduler_lib::{
    adapters::DbAdapter,
    commands::{self, Cli, Command},
    config::Config,
    error::SchedulerError,
    review_service,
};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), SchedulerError> {
    let cli = Cli::parse();

    match cli.command {
        // Previews are pure computations and need neither configuration nor a database.
        Command::Preview {
            ease_factor,
            interval,
            repetition,
        } => {
            let current = ScheduleInput {
                ease_factor,
                interval,
                repetition,
            };
            let output = commands::preview_today(&current)?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Migrate => {
            let (_, db_adapter) = connect().await?;
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");
        }
        Command::Deck(deck_command) => {
            let (config, db_adapter) = connect().await?;
            let service = review_service(db_adapter, &config);
            let output = commands::execute(&service, deck_command).await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Loads configuration, sets up logging and opens the connection pool.
async fn connect() -> Result<(Config, Arc<DbAdapter>), SchedulerError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    info!("Configuration loaded.");

    // --- 2. Connect to Database ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;

    Ok((config, Arc::new(DbAdapter::new(db_pool))))
}
