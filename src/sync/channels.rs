use crate::normalize::{normalize_channel, relay_stat_channels, RelayDirection};
use crate::records::{ChannelRecord, NaturalKey};
use crate::source::ChannelSource;
use crate::store::{last_wins, MirrorStore};
use anyhow::{bail, Context, Result};
use serde::Serialize;

pub const DEFAULT_MIN_CHANNEL_ROWS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EcosystemChannels {
    pub ecosystem: String,
    /// Parachain-to-parachain rows from the channel list that carry both
    /// participants.
    pub channels: usize,
    /// Relay rows from both stat directions.
    pub relay: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelSyncReport {
    pub ecosystems: Vec<EcosystemChannels>,
    pub written: usize,
}

/// Rebuilds the shared channel table from every ecosystem at once.
///
/// All ecosystems are fetched before storage is touched. A failure on any of
/// them, or too few rows overall, leaves the existing table in place.
pub struct ChannelSync<'a, M: ?Sized> {
    store: &'a M,
    min_rows: usize,
}

impl<'a, M> ChannelSync<'a, M>
where
    M: MirrorStore + ?Sized,
{
    pub fn new(store: &'a M) -> Self {
        Self {
            store,
            min_rows: DEFAULT_MIN_CHANNEL_ROWS,
        }
    }

    pub fn with_min_rows(mut self, min_rows: usize) -> Self {
        self.min_rows = min_rows;
        self
    }

    pub async fn run<S>(&self, sources: &[(&str, &S)]) -> Result<ChannelSyncReport>
    where
        S: ChannelSource + ?Sized,
    {
        let mut combined = Vec::new();
        let mut ecosystems = Vec::with_capacity(sources.len());

        for &(ecosystem, source) in sources {
            let (channels, relay) = collect_channels(ecosystem, source)
                .await
                .with_context(|| format!("channel refresh aborted at {ecosystem}"))?;
            tracing::info!(
                ecosystem,
                channels = channels.len(),
                relay = relay.len(),
                "fetched channel rows"
            );
            ecosystems.push(EcosystemChannels {
                ecosystem: ecosystem.to_owned(),
                channels: channels.len(),
                relay: relay.len(),
            });
            combined.extend(channels);
            combined.extend(relay);
        }

        let rows = last_wins(&combined);
        if rows.len() < self.min_rows {
            bail!(
                "only {} channel rows fetched (minimum {}); leaving channel table untouched",
                rows.len(),
                self.min_rows
            );
        }

        let written = self.store.replace_channels(&rows).await?;
        tracing::info!(written, ecosystems = ecosystems.len(), "channel table refreshed");

        Ok(ChannelSyncReport {
            ecosystems,
            written,
        })
    }
}

/// Channel-list rows plus relay rows in both directions for one ecosystem.
pub async fn collect_channels<S>(
    ecosystem: &str,
    source: &S,
) -> Result<(Vec<ChannelRecord>, Vec<ChannelRecord>)>
where
    S: ChannelSource + ?Sized,
{
    let (channels, keyless): (Vec<_>, Vec<_>) = source
        .fetch_channels()
        .await?
        .iter()
        .map(|raw| normalize_channel(ecosystem, raw))
        .partition(|record| record.natural_key().is_some());
    if !keyless.is_empty() {
        tracing::warn!(
            ecosystem,
            skipped = keyless.len(),
            "skipping channel rows without sender or recipient"
        );
    }

    let mut relay = Vec::new();
    for direction in [RelayDirection::Downward, RelayDirection::Upward] {
        let body = source.fetch_relay_stats(direction).await?;
        relay.extend(relay_stat_channels(ecosystem, direction, &body));
    }

    Ok((channels, relay))
}
