use crate::records::{Ecosystem, DEFAULT_ECOSYSTEM_URLS};
use crate::runtime::progress::DEFAULT_PROGRESS_EVERY;
use crate::runtime::telemetry;
use crate::source::MAX_PAGE_SIZE;
use crate::sync::batch::DEFAULT_BATCH_SIZE;
use crate::sync::channels::DEFAULT_MIN_CHANNEL_ROWS;
use crate::sync::MessageSyncOptions;
use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::time::Duration;

const DEFAULT_RATE_LIMIT_CALLS: usize = 5;
const DEFAULT_RATE_LIMIT_PERIOD: Duration = Duration::from_secs(1);
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 4;

/// Runtime configuration for a mirror run.
///
/// Built through [`MirrorConfig::builder`], which validates every value
/// before the config is handed out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorConfig {
    ecosystems: Vec<Ecosystem>,
    api_key: Option<String>,
    database_url: String,
    page_size: u32,
    batch_size: usize,
    progress_every: u64,
    min_channel_rows: usize,
    rate_limit_calls: usize,
    rate_limit_period: Duration,
    metrics_interval: Duration,
    db_max_connections: u32,
}

impl MirrorConfig {
    pub fn builder() -> MirrorConfigBuilder {
        MirrorConfigBuilder::default()
    }

    /// Ecosystems in the order they are synced.
    pub fn ecosystems(&self) -> &[Ecosystem] {
        &self.ecosystems
    }

    /// Upstream API key; `None` sends unauthenticated requests.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Rows requested per message page.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Message rows per upsert transaction.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn progress_every(&self) -> u64 {
        self.progress_every
    }

    /// Channel reloads with fewer rows than this are refused.
    pub fn min_channel_rows(&self) -> usize {
        self.min_channel_rows
    }

    pub fn rate_limit_calls(&self) -> usize {
        self.rate_limit_calls
    }

    pub fn rate_limit_period(&self) -> Duration {
        self.rate_limit_period
    }

    /// Interval used by the telemetry reporter.
    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    pub fn db_max_connections(&self) -> u32 {
        self.db_max_connections
    }

    pub fn message_sync_options(&self) -> MessageSyncOptions {
        MessageSyncOptions {
            page_size: self.page_size,
            batch_size: self.batch_size,
            progress_every: self.progress_every,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.ecosystems.is_empty() {
            bail!("at least one ecosystem is required");
        }

        let mut names = HashSet::new();
        for ecosystem in &self.ecosystems {
            if !names.insert(ecosystem.name()) {
                bail!("ecosystem {} is configured more than once", ecosystem.name());
            }
        }

        if self.database_url.trim().is_empty() {
            bail!("database_url cannot be empty");
        }

        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            bail!("page_size must be between 1 and {MAX_PAGE_SIZE}");
        }

        if self.batch_size == 0 {
            bail!("batch_size must be greater than 0");
        }

        if self.progress_every == 0 {
            bail!("progress_every must be greater than 0");
        }

        if self.rate_limit_calls == 0 {
            bail!("rate_limit_calls must be greater than 0");
        }

        if self.rate_limit_period.is_zero() {
            bail!("rate_limit_period must be greater than 0");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        if self.db_max_connections == 0 {
            bail!("db_max_connections must be greater than 0");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct MirrorConfigBuilder {
    ecosystem_urls: Option<Vec<String>>,
    api_key: Option<String>,
    database_url: Option<String>,
    page_size: Option<u32>,
    batch_size: Option<usize>,
    progress_every: Option<u64>,
    min_channel_rows: Option<usize>,
    rate_limit_calls: Option<usize>,
    rate_limit_period: Option<Duration>,
    metrics_interval: Option<Duration>,
    db_max_connections: Option<u32>,
}

impl MirrorConfigBuilder {
    /// Base URLs to mirror. Defaults to the public polkadot, kusama, westend
    /// and paseo deployments.
    pub fn ecosystem_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ecosystem_urls = Some(urls.into_iter().map(Into::into).collect());
        self
    }

    /// Blank keys are treated as absent.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into().trim().to_owned();
        self.api_key = (!key.is_empty()).then_some(key);
        self
    }

    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn page_size(mut self, rows: u32) -> Self {
        self.page_size = Some(rows);
        self
    }

    pub fn batch_size(mut self, rows: usize) -> Self {
        self.batch_size = Some(rows);
        self
    }

    pub fn progress_every(mut self, records: u64) -> Self {
        self.progress_every = Some(records);
        self
    }

    pub fn min_channel_rows(mut self, rows: usize) -> Self {
        self.min_channel_rows = Some(rows);
        self
    }

    pub fn rate_limit(mut self, calls: usize, period: Duration) -> Self {
        self.rate_limit_calls = Some(calls);
        self.rate_limit_period = Some(period);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn db_max_connections(mut self, connections: u32) -> Self {
        self.db_max_connections = Some(connections);
        self
    }

    pub fn build(self) -> Result<MirrorConfig> {
        let urls = self.ecosystem_urls.unwrap_or_else(|| {
            DEFAULT_ECOSYSTEM_URLS
                .iter()
                .map(|url| (*url).to_owned())
                .collect()
        });
        let ecosystems = urls
            .iter()
            .map(|url| url.trim())
            .filter(|url| !url.is_empty())
            .map(|url| {
                Ecosystem::from_base_url(url)
                    .with_context(|| format!("invalid ecosystem url {url}"))
            })
            .collect::<Result<Vec<_>>>()?;

        let config = MirrorConfig {
            ecosystems,
            api_key: self.api_key,
            database_url: self
                .database_url
                .context("database_url is required")?
                .trim()
                .to_owned(),
            page_size: self.page_size.unwrap_or(MAX_PAGE_SIZE),
            batch_size: self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            progress_every: self.progress_every.unwrap_or(DEFAULT_PROGRESS_EVERY),
            min_channel_rows: self.min_channel_rows.unwrap_or(DEFAULT_MIN_CHANNEL_ROWS),
            rate_limit_calls: self.rate_limit_calls.unwrap_or(DEFAULT_RATE_LIMIT_CALLS),
            rate_limit_period: self.rate_limit_period.unwrap_or(DEFAULT_RATE_LIMIT_PERIOD),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
            db_max_connections: self.db_max_connections.unwrap_or(DEFAULT_DB_MAX_CONNECTIONS),
        };

        config.validate()?;
        Ok(config)
    }
}

/// Assembles a postgres URL from discrete connection parts.
pub fn database_url_from_parts(
    host: &str,
    port: u16,
    user: &str,
    password: &str,
    database: &str,
) -> String {
    let credentials = match (user.is_empty(), password.is_empty()) {
        (true, _) => String::new(),
        (false, true) => format!("{user}@"),
        (false, false) => format!("{user}:{password}@"),
    };
    format!("postgres://{credentials}{host}:{port}/{database}")
}
