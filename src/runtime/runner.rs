use crate::http::{ApiClient, FetchPolicy, RateLimiter};
use crate::runtime::config::MirrorConfig;
use crate::runtime::telemetry::{spawn_metrics_reporter, Telemetry};
use crate::source::SubscanApi;
use crate::store::MirrorStore;
use crate::sync::{ChannelSync, ChannelSyncReport, MessageSync, MessageSyncReport, SyncMode};
use anyhow::Result;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Message sync that failed for one ecosystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EcosystemFailure {
    pub ecosystem: String,
    pub error: String,
}

/// Outcome of a message run across every configured ecosystem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub reports: Vec<MessageSyncReport>,
    pub failures: Vec<EcosystemFailure>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn total_upserted(&self) -> usize {
        self.reports.iter().map(|report| report.upserted).sum()
    }
}

/// Drives the sync flows for every configured ecosystem, one at a time,
/// through a single rate-limited client.
pub struct Runner<M: ?Sized> {
    config: MirrorConfig,
    client: ApiClient,
    store: Arc<M>,
    telemetry: Arc<Telemetry>,
    message_policy: FetchPolicy,
    channel_policy: FetchPolicy,
}

impl<M> Runner<M>
where
    M: MirrorStore + ?Sized,
{
    /// Builds the shared limiter and client from `config`.
    pub fn new(config: MirrorConfig, store: Arc<M>) -> Result<Self> {
        let limiter = Arc::new(RateLimiter::new(
            config.rate_limit_calls(),
            config.rate_limit_period(),
        )?);
        let client = ApiClient::new(limiter, config.api_key())?;
        Ok(Self::with_client(config, client, store))
    }

    pub fn with_client(config: MirrorConfig, client: ApiClient, store: Arc<M>) -> Self {
        Self {
            config,
            client,
            store,
            telemetry: Arc::new(Telemetry::default()),
            message_policy: FetchPolicy::messages(),
            channel_policy: FetchPolicy::channels(),
        }
    }

    pub fn with_fetch_policies(mut self, messages: FetchPolicy, channels: FetchPolicy) -> Self {
        self.message_policy = messages;
        self.channel_policy = channels;
        self
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn telemetry(&self) -> &Arc<Telemetry> {
        &self.telemetry
    }

    fn apis(&self) -> Vec<SubscanApi> {
        self.config
            .ecosystems()
            .iter()
            .map(|ecosystem| {
                SubscanApi::with_policies(
                    self.client.clone(),
                    ecosystem.clone(),
                    self.message_policy.clone(),
                    self.channel_policy.clone(),
                )
            })
            .collect()
    }

    /// Syncs messages for each ecosystem in turn. A failing ecosystem is
    /// recorded in the summary and the run moves on to the next one.
    pub async fn sync_messages(&self, mode: SyncMode) -> RunSummary {
        self.with_reporter(async {
            let mut summary = RunSummary::default();
            let options = self.config.message_sync_options();

            for api in self.apis() {
                let ecosystem = api.ecosystem().name().to_owned();
                let outcome = MessageSync::new(&ecosystem, &api, self.store.as_ref())
                    .with_options(options)
                    .with_telemetry(self.telemetry.clone())
                    .run(mode)
                    .await;

                match outcome {
                    Ok(report) => {
                        self.telemetry.record_ecosystem_synced();
                        summary.reports.push(report);
                    }
                    Err(err) => {
                        self.telemetry.record_ecosystem_failed();
                        tracing::error!(
                            ecosystem = %ecosystem,
                            error = %format!("{err:#}"),
                            "message sync failed"
                        );
                        summary.failures.push(EcosystemFailure {
                            ecosystem,
                            error: format!("{err:#}"),
                        });
                    }
                }
            }

            tracing::info!(
                ecosystems = summary.reports.len() + summary.failures.len(),
                failed = summary.failures.len(),
                upserted = summary.total_upserted(),
                "message run finished"
            );
            summary
        })
        .await
    }

    /// Rebuilds the channel table from every ecosystem. Nothing is written
    /// unless all of them succeed.
    pub async fn refresh_channels(&self) -> Result<ChannelSyncReport> {
        self.with_reporter(async {
            let apis = self.apis();
            let sources: Vec<(&str, &SubscanApi)> = apis
                .iter()
                .map(|api| (api.ecosystem().name(), api))
                .collect();
            ChannelSync::new(self.store.as_ref())
                .with_min_rows(self.config.min_channel_rows())
                .run(&sources)
                .await
        })
        .await
    }

    async fn with_reporter<F, T>(&self, work: F) -> T
    where
        F: Future<Output = T>,
    {
        let shutdown = CancellationToken::new();
        let reporter = spawn_metrics_reporter(
            self.telemetry.clone(),
            self.client.clone(),
            shutdown.clone(),
            self.config.metrics_interval(),
        );

        let output = work.await;

        shutdown.cancel();
        if let Err(err) = reporter.await {
            tracing::warn!(error = %err, "metrics reporter task failed");
        }
        output
    }
}
