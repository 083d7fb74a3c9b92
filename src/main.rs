use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::process::ExitCode;
use std::sync::Arc;
use xcm_mirror::runtime::config::database_url_from_parts;
use xcm_mirror::{init_tracing, MirrorConfig, PgStore, Runner, SyncMode};

/// Mirrors cross-chain message telemetry from Subscan-style indexers into PostgreSQL.
#[derive(Parser, Debug)]
#[command(name = "xcm-mirror", version, about)]
struct Cli {
    /// Comma-separated API base URLs; defaults to polkadot, kusama, westend and paseo.
    #[arg(long, env = "XCM_MIRROR_ECOSYSTEMS", value_delimiter = ',')]
    ecosystems: Vec<String>,

    #[arg(long, env = "SUBSCAN_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Full connection URL. Takes precedence over the DB_* parts.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    #[arg(long, env = "DB_HOST", default_value = "localhost")]
    db_host: String,

    #[arg(long, env = "DB_PORT", default_value_t = 5432)]
    db_port: u16,

    #[arg(long, env = "DB_USER", default_value = "")]
    db_user: String,

    #[arg(long, env = "DB_PASS", default_value = "", hide_env_values = true)]
    db_pass: String,

    #[arg(long, env = "DB_NAME", default_value = "")]
    db_name: String,

    #[arg(long, env = "XCM_MIRROR_DB_MAX_CONNECTIONS")]
    db_max_connections: Option<u32>,

    /// Print the run summary as JSON on stdout.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rebuild the channel table from every ecosystem.
    Channels {
        /// Refuse the reload below this many rows.
        #[arg(long)]
        min_rows: Option<usize>,
    },
    /// Upsert new messages, or backfill everything with --full.
    Messages {
        /// Walk the whole collection instead of stopping at the stored cursor.
        #[arg(long)]
        full: bool,

        #[arg(long, alias = "pagesize")]
        page_size: Option<u32>,

        #[arg(long)]
        batch_size: Option<usize>,
    },
}

impl Cli {
    fn database_url(&self) -> String {
        match &self.database_url {
            Some(url) if !url.trim().is_empty() => url.clone(),
            _ => database_url_from_parts(
                &self.db_host,
                self.db_port,
                &self.db_user,
                &self.db_pass,
                &self.db_name,
            ),
        }
    }

    fn config(&self) -> Result<MirrorConfig> {
        let mut builder = MirrorConfig::builder().database_url(self.database_url());
        if !self.ecosystems.is_empty() {
            builder = builder.ecosystem_urls(self.ecosystems.iter().cloned());
        }
        if let Some(key) = &self.api_key {
            builder = builder.api_key(key.clone());
        }
        if let Some(connections) = self.db_max_connections {
            builder = builder.db_max_connections(connections);
        }
        match &self.command {
            Command::Channels { min_rows } => {
                if let Some(rows) = min_rows {
                    builder = builder.min_channel_rows(*rows);
                }
            }
            Command::Messages {
                page_size,
                batch_size,
                ..
            } => {
                if let Some(rows) = page_size {
                    builder = builder.page_size(*rows);
                }
                if let Some(rows) = batch_size {
                    builder = builder.batch_size(*rows);
                }
            }
        }
        builder.build().context("invalid configuration")
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    tokio::select! {
        outcome = run(&cli) => match outcome {
            Ok(true) => ExitCode::SUCCESS,
            Ok(false) => ExitCode::FAILURE,
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), "xcm-mirror failed");
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Ctrl-C received; aborting run");
            ExitCode::from(130)
        }
    }
}

/// Returns whether every ecosystem succeeded.
async fn run(cli: &Cli) -> Result<bool> {
    let config = cli.config()?;
    let store =
        Arc::new(PgStore::connect(config.database_url(), config.db_max_connections()).await?);
    let runner = Runner::new(config, store)?;

    match &cli.command {
        Command::Channels { .. } => {
            let report = runner.refresh_channels().await?;
            emit(cli.json, &report)?;
            Ok(true)
        }
        Command::Messages { full, .. } => {
            let mode = if *full {
                SyncMode::Full
            } else {
                SyncMode::Incremental
            };
            let summary = runner.sync_messages(mode).await;
            emit(cli.json, &summary)?;
            for failure in &summary.failures {
                tracing::error!(
                    ecosystem = %failure.ecosystem,
                    "ecosystem failed: {}",
                    failure.error
                );
            }
            Ok(summary.is_success())
        }
    }
}

fn emit<T: Serialize>(json: bool, value: &T) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    }
    Ok(())
}
