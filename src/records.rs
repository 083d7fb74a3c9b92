//! Canonical record shapes stored by the mirror, plus the ecosystem
//! descriptor every sync run is scoped to.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::hash::Hash;

/// Upstream deployments mirrored when no explicit list is configured.
pub const DEFAULT_ECOSYSTEM_URLS: [&str; 4] = [
    "https://polkadot.api.subscan.io",
    "https://kusama.api.subscan.io",
    "https://westend.api.subscan.io",
    "https://paseo.api.subscan.io",
];

/// One upstream data source: a logical name plus the API base URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ecosystem {
    name: String,
    base_url: String,
}

impl Ecosystem {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let name = name.into().trim().to_owned();
        let base_url = base_url.into().trim().trim_end_matches('/').to_owned();
        if name.is_empty() {
            bail!("ecosystem name cannot be empty");
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            bail!("ecosystem base url must start with http:// or https://");
        }
        Ok(Self { name, base_url })
    }

    /// Derives the name from the first DNS label of the host, so
    /// `https://kusama.api.subscan.io` becomes `kusama`.
    pub fn from_base_url(base_url: &str) -> Result<Self> {
        let trimmed = base_url.trim();
        let host = trimmed
            .split_once("//")
            .map(|(_, rest)| rest)
            .with_context(|| format!("ecosystem url {trimmed} has no scheme"))?;
        let name = host
            .split(['.', '/', ':'])
            .next()
            .unwrap_or_default()
            .to_owned();
        Self::new(name, trimmed)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl std::fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Records that collapse on a natural key before they are written.
pub trait NaturalKey {
    type Key: Eq + Hash + Clone;

    /// `None` when any key component is missing; such records are never written.
    fn natural_key(&self) -> Option<Self::Key>;
}

/// Directional channel between two participants of one ecosystem.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChannelRecord {
    pub ecosystem: String,
    pub sender: Option<i32>,
    pub recipient: Option<i32>,
    pub status: Option<String>,
    pub transfer_count: Option<i64>,
    pub message_count: Option<i64>,
    pub active_at: Option<i64>,
    pub proposed_max_capacity: Option<i64>,
    pub proposed_max_message_size: Option<i64>,
}

impl NaturalKey for ChannelRecord {
    type Key = (String, i32, i32);

    fn natural_key(&self) -> Option<Self::Key> {
        if self.ecosystem.is_empty() {
            return None;
        }
        Some((self.ecosystem.clone(), self.sender?, self.recipient?))
    }
}

/// One cross-chain message event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MessageRecord {
    pub ecosystem: String,
    pub message_hash: Option<String>,
    pub origin_event_index: Option<String>,
    pub from_account_id: Option<String>,
    pub origin_para_id: Option<i32>,
    pub origin_block_timestamp: Option<i64>,
    pub relayed_block_timestamp: Option<i64>,
    pub block_num: Option<i64>,
    pub status: Option<String>,
    pub relayed_event_index: Option<String>,
    pub dest_event_index: Option<String>,
    pub dest_para_id: Option<i32>,
    pub to_account_id: Option<String>,
    pub confirm_block_timestamp: Option<i64>,
    pub extrinsic_index: Option<String>,
    pub relayed_extrinsic_index: Option<String>,
    pub dest_extrinsic_index: Option<String>,
    pub child_para_id: Option<i32>,
    pub child_dest: Option<String>,
    pub protocol: Option<String>,
    pub message_type: Option<String>,
    pub unique_id: Option<String>,
    pub xcm_version: Option<i32>,
    pub assets: Option<Value>,
}

impl MessageRecord {
    /// Value compared against the stored sync cursor: `unique_id`, falling back
    /// to `message_hash` the same way the stored cursor is derived.
    pub fn sync_cursor(&self) -> Option<&str> {
        non_empty(self.unique_id.as_deref()).or_else(|| non_empty(self.message_hash.as_deref()))
    }
}

impl NaturalKey for MessageRecord {
    type Key = (String, String);

    fn natural_key(&self) -> Option<Self::Key> {
        if self.ecosystem.is_empty() {
            return None;
        }
        let hash = non_empty(self.message_hash.as_deref())?;
        Some((self.ecosystem.clone(), hash.to_owned()))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.is_empty())
}
