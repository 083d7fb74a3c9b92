//! Bindings to the indexing API's cross-chain endpoints for one ecosystem.

use crate::http::client::ApiClient;
use crate::http::options::FetchPolicy;
use crate::http::retry::{
    RetryContext, CHANNELS_RETRY, MESSAGE_PAGE_RETRY, MESSAGE_TOTAL_RETRY, RELAY_STATS_RETRY,
};
use crate::normalize::RelayDirection;
use crate::records::Ecosystem;
use crate::source::{ChannelSource, PagePosition, PageRequest, PageSource};
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use serde_json::{json, Value};

pub const MESSAGE_LIST_PATH: &str = "api/scan/xcm/list";
pub const CHANNEL_LIST_PATH: &str = "api/scan/xcm/channels";
pub const RELAY_STAT_PATH: &str = "api/scan/xcm/parachain/stat";

const CHANNEL_PAGE_ROWS: u32 = 100;

#[derive(Debug, Clone)]
pub struct SubscanApi {
    client: ApiClient,
    ecosystem: Ecosystem,
    message_policy: FetchPolicy,
    channel_policy: FetchPolicy,
}

impl SubscanApi {
    pub fn new(client: ApiClient, ecosystem: Ecosystem) -> Self {
        Self::with_policies(
            client,
            ecosystem,
            FetchPolicy::messages(),
            FetchPolicy::channels(),
        )
    }

    pub fn with_policies(
        client: ApiClient,
        ecosystem: Ecosystem,
        message_policy: FetchPolicy,
        channel_policy: FetchPolicy,
    ) -> Self {
        Self {
            client,
            ecosystem,
            message_policy,
            channel_policy,
        }
    }

    pub fn ecosystem(&self) -> &Ecosystem {
        &self.ecosystem
    }

    async fn list_page(&self, request: &PageRequest) -> Result<Value> {
        let url = self.ecosystem.endpoint(MESSAGE_LIST_PATH);
        let context = RetryContext::for_ecosystem(&MESSAGE_PAGE_RETRY, self.ecosystem.name());
        self.client
            .post_with_context(&url, &request.to_payload(), &self.message_policy, context)
            .await
            .with_context(|| format!("failed to fetch message page for {}", self.ecosystem))
    }
}

/// `data.list` of an envelope; null or missing lists are empty.
fn data_list(body: &Value) -> Vec<Value> {
    body.get("data")
        .and_then(|data| data.get("list"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn data_count(body: &Value) -> u64 {
    body.get("data")
        .and_then(|data| data.get("count"))
        .and_then(|count| match count {
            Value::Number(number) => number.as_u64(),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        })
        .unwrap_or(0)
}

impl PageSource for SubscanApi {
    fn fetch_page<'a>(&'a self, request: PageRequest) -> BoxFuture<'a, Result<Vec<Value>>> {
        Box::pin(async move {
            let body = self.list_page(&request).await?;
            let rows = data_list(&body);
            tracing::debug!(
                ecosystem = self.ecosystem.name(),
                rows = rows.len(),
                after = matches!(request.position, PagePosition::After(_)),
                "fetched message page"
            );
            Ok(rows)
        })
    }

    fn expected_total<'a>(&'a self) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            let url = self.ecosystem.endpoint(MESSAGE_LIST_PATH);
            let context =
                RetryContext::for_ecosystem(&MESSAGE_TOTAL_RETRY, self.ecosystem.name());
            let body = self
                .client
                .post_with_context(
                    &url,
                    &json!({ "row": 1, "page": 0 }),
                    &self.message_policy,
                    context,
                )
                .await
                .with_context(|| format!("failed to read message total for {}", self.ecosystem))?;
            Ok(data_count(&body))
        })
    }
}

impl ChannelSource for SubscanApi {
    fn fetch_channels<'a>(&'a self) -> BoxFuture<'a, Result<Vec<Value>>> {
        Box::pin(async move {
            let url = self.ecosystem.endpoint(CHANNEL_LIST_PATH);
            let context = RetryContext::for_ecosystem(&CHANNELS_RETRY, self.ecosystem.name());
            let body = self
                .client
                .post_with_context(
                    &url,
                    &json!({ "row": CHANNEL_PAGE_ROWS, "page": 0 }),
                    &self.channel_policy,
                    context,
                )
                .await
                .with_context(|| format!("failed to fetch channels for {}", self.ecosystem))?;
            Ok(data_list(&body))
        })
    }

    fn fetch_relay_stats<'a>(&'a self, direction: RelayDirection) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let url = self.ecosystem.endpoint(RELAY_STAT_PATH);
            let context = RetryContext::for_ecosystem(&RELAY_STATS_RETRY, self.ecosystem.name());
            self.client
                .post_with_context(
                    &url,
                    &json!({ "direction": direction.as_query() }),
                    &self.channel_policy,
                    context,
                )
                .await
                .with_context(|| {
                    format!(
                        "failed to fetch {:?} relay stats for {}",
                        direction, self.ecosystem
                    )
                })
        })
    }
}
