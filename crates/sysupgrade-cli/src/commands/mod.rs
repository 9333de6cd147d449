//! CLI command implementations.

pub mod catalog;
pub mod queue;

use anyhow::{Context as _, Result};
use serde::Serialize;
use sqlx::PgPool;
use sysupgrade_config::{SystemConfig, load_system_config};
use sysupgrade_scheduler::PgBuildQueue;
use tracing::info;

/// Configuration and database pool shared by all commands.
pub struct Context {
    pub config: SystemConfig,
    pub pool: PgPool,
}

impl Context {
    pub async fn connect(config_path: Option<&str>, database_url: Option<String>) -> Result<Self> {
        let config = match config_path {
            Some(path) => load_system_config(path)
                .with_context(|| format!("Failed to load config file: {}", path))?,
            None => SystemConfig::default(),
        };

        let database_url = database_url
            .or_else(|| config.database.url.clone())
            .context("No database URL: set DATABASE_URL or database.url in the config file")?;

        info!("Connecting to database...");
        let pool = sysupgrade_db::create_pool(&database_url, config.database.max_connections)
            .await
            .context("Failed to connect to database")?;
        info!("Database connected");

        Ok(Self { config, pool })
    }

    pub fn queue(&self) -> Result<PgBuildQueue> {
        Ok(PgBuildQueue::new(
            self.pool.clone(),
            self.config.queue.hash_length,
        )?)
    }
}

pub async fn migrate(ctx: &Context) -> Result<()> {
    sysupgrade_db::run_migrations(&ctx.pool).await?;
    println!("Database schema is up to date");
    Ok(())
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
