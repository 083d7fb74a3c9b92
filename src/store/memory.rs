use crate::records::{ChannelRecord, MessageRecord, NaturalKey};
use crate::store::dedup::last_wins;
use crate::store::MirrorStore;
use anyhow::{bail, Result};
use futures::future::BoxFuture;
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// In-process [`MirrorStore`] with the same upsert and reload semantics as
/// the PostgreSQL backend. Used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    messages: Vec<MessageRecord>,
    index: HashMap<(String, String), usize>,
    channels: Option<Vec<ChannelRecord>>,
    message_table_ready: bool,
    upsert_calls: usize,
    channel_reloads: usize,
    /// Number of successful upserts allowed before every later one fails.
    fail_upserts_after: Option<usize>,
    fail_channel_reload: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every upsert after the first `successes` fail without writing.
    pub async fn fail_upserts_after(&self, successes: usize) {
        self.state.lock().await.fail_upserts_after = Some(successes);
    }

    pub async fn fail_channel_reload(&self, fail: bool) {
        self.state.lock().await.fail_channel_reload = fail;
    }

    /// Stored messages for `ecosystem`, in first-insert order.
    pub async fn messages(&self, ecosystem: &str) -> Vec<MessageRecord> {
        self.state
            .lock()
            .await
            .messages
            .iter()
            .filter(|record| record.ecosystem == ecosystem)
            .cloned()
            .collect()
    }

    /// `None` until the first successful reload.
    pub async fn channels(&self) -> Option<Vec<ChannelRecord>> {
        self.state.lock().await.channels.clone()
    }

    /// Number of upsert calls that reached the store, failed ones included.
    pub async fn upsert_calls(&self) -> usize {
        self.state.lock().await.upsert_calls
    }

    pub async fn channel_reloads(&self) -> usize {
        self.state.lock().await.channel_reloads
    }

    pub async fn message_table_ready(&self) -> bool {
        self.state.lock().await.message_table_ready
    }
}

impl MemoryState {
    fn upsert(&mut self, records: &[MessageRecord]) -> usize {
        let rows = last_wins(records);
        for record in &rows {
            let Some(key) = record.natural_key() else {
                continue;
            };
            match self.index.get(&key) {
                Some(&slot) => self.messages[slot] = record.clone(),
                None => {
                    self.index.insert(key, self.messages.len());
                    self.messages.push(record.clone());
                }
            }
        }
        rows.len()
    }

    /// Mirrors `ORDER BY block_num DESC NULLS LAST, origin_block_timestamp
    /// DESC NULLS LAST LIMIT 1`; ties go to the earliest stored row.
    fn latest_cursor(&self, ecosystem: &str) -> Option<String> {
        let newest = self
            .messages
            .iter()
            .filter(|record| record.ecosystem == ecosystem)
            .fold(None::<&MessageRecord>, |best, record| match best {
                Some(best) if newer(record, best) != Ordering::Greater => Some(best),
                _ => Some(record),
            })?;
        newest
            .unique_id
            .clone()
            .or_else(|| newest.message_hash.clone())
    }
}

fn newer(a: &MessageRecord, b: &MessageRecord) -> Ordering {
    desc_nulls_last(a.block_num, b.block_num)
        .then_with(|| desc_nulls_last(a.origin_block_timestamp, b.origin_block_timestamp))
}

/// `Greater` when `a` sorts ahead of `b` in a descending, nulls-last order.
fn desc_nulls_last(a: Option<i64>, b: Option<i64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

impl MirrorStore for MemoryStore {
    fn ensure_message_table<'a>(&'a self) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.state.lock().await.message_table_ready = true;
            Ok(())
        })
    }

    fn upsert_messages<'a>(&'a self, records: &'a [MessageRecord]) -> BoxFuture<'a, Result<usize>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.upsert_calls += 1;
            if let Some(remaining) = state.fail_upserts_after {
                if remaining == 0 {
                    bail!("failed to upsert message batch: injected failure");
                }
                state.fail_upserts_after = Some(remaining - 1);
            }
            Ok(state.upsert(records))
        })
    }

    fn message_count<'a>(&'a self, ecosystem: &'a str) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            let count = state
                .messages
                .iter()
                .filter(|record| record.ecosystem == ecosystem)
                .count();
            Ok(count as u64)
        })
    }

    fn latest_cursor<'a>(&'a self, ecosystem: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(async move { Ok(self.state.lock().await.latest_cursor(ecosystem)) })
    }

    fn replace_channels<'a>(
        &'a self,
        records: &'a [ChannelRecord],
    ) -> BoxFuture<'a, Result<usize>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if state.fail_channel_reload {
                bail!("failed to commit channel reload: injected failure");
            }
            let rows = last_wins(records);
            let written = rows.len();
            state.channels = Some(rows);
            state.channel_reloads += 1;
            Ok(written)
        })
    }
}
