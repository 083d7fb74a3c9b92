use crate::records::{ChannelRecord, MessageRecord};
use crate::store::dedup::last_wins;
use crate::store::schema::{
    self, CHANNEL_COLUMNS, CHANNEL_KEY_COLUMNS, CHANNEL_TABLE, MESSAGE_COLUMNS,
    MESSAGE_KEY_COLUMNS, MESSAGE_TABLE,
};
use crate::store::MirrorStore;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};
use std::time::Duration;

/// Rows per INSERT statement. 500 messages bind 12k parameters, well under
/// the 65535 PostgreSQL allows per statement.
pub const UPSERT_CHUNK_ROWS: usize = 500;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// PostgreSQL-backed mirror.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(database_url)
            .await
            .context("failed to connect to postgres")?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn upsert_messages_tx(&self, records: &[MessageRecord]) -> Result<usize> {
        let rows = last_wins(records);
        if rows.is_empty() {
            return Ok(0);
        }

        let prefix = schema::insert_prefix(MESSAGE_TABLE, &MESSAGE_COLUMNS);
        let suffix = schema::upsert_suffix(&MESSAGE_COLUMNS, MESSAGE_KEY_COLUMNS);

        let mut tx = self.pool.begin().await.context("failed to open transaction")?;
        for chunk in rows.chunks(UPSERT_CHUNK_ROWS) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(&prefix);
            builder.push_values(chunk, |mut row, record| {
                row.push_bind(record.ecosystem.clone())
                    .push_bind(record.message_hash.clone())
                    .push_bind(record.origin_event_index.clone())
                    .push_bind(record.from_account_id.clone())
                    .push_bind(record.origin_para_id)
                    .push_bind(record.origin_block_timestamp)
                    .push_bind(record.relayed_block_timestamp)
                    .push_bind(record.block_num)
                    .push_bind(record.status.clone())
                    .push_bind(record.relayed_event_index.clone())
                    .push_bind(record.dest_event_index.clone())
                    .push_bind(record.dest_para_id)
                    .push_bind(record.to_account_id.clone())
                    .push_bind(record.confirm_block_timestamp)
                    .push_bind(record.extrinsic_index.clone())
                    .push_bind(record.relayed_extrinsic_index.clone())
                    .push_bind(record.dest_extrinsic_index.clone())
                    .push_bind(record.child_para_id)
                    .push_bind(record.child_dest.clone())
                    .push_bind(record.protocol.clone())
                    .push_bind(record.message_type.clone())
                    .push_bind(record.unique_id.clone())
                    .push_bind(record.xcm_version)
                    .push_bind(record.assets.clone().map(Json));
            });
            builder.push(&suffix);
            builder
                .build()
                .execute(&mut *tx)
                .await
                .context("failed to upsert message batch")?;
        }
        tx.commit().await.context("failed to commit message batch")?;

        tracing::debug!(rows = rows.len(), submitted = records.len(), "message batch committed");
        Ok(rows.len())
    }

    async fn replace_channels_tx(&self, records: &[ChannelRecord]) -> Result<usize> {
        let rows = last_wins(records);

        let mut tx = self.pool.begin().await.context("failed to open transaction")?;
        sqlx::query(schema::DROP_CHANNELS)
            .execute(&mut *tx)
            .await
            .context("failed to drop channel table")?;
        sqlx::query(schema::CREATE_CHANNELS)
            .execute(&mut *tx)
            .await
            .context("failed to create channel table")?;

        let prefix = schema::insert_prefix(CHANNEL_TABLE, &CHANNEL_COLUMNS);
        let suffix = schema::upsert_suffix(&CHANNEL_COLUMNS, CHANNEL_KEY_COLUMNS);
        for chunk in rows.chunks(UPSERT_CHUNK_ROWS) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(&prefix);
            builder.push_values(chunk, |mut row, record| {
                row.push_bind(record.ecosystem.clone())
                    .push_bind(record.sender)
                    .push_bind(record.recipient)
                    .push_bind(record.status.clone())
                    .push_bind(record.transfer_count)
                    .push_bind(record.message_count)
                    .push_bind(record.active_at)
                    .push_bind(record.proposed_max_capacity)
                    .push_bind(record.proposed_max_message_size);
            });
            builder.push(&suffix);
            builder
                .build()
                .execute(&mut *tx)
                .await
                .context("failed to insert channel rows")?;
        }
        tx.commit().await.context("failed to commit channel reload")?;

        tracing::info!(rows = rows.len(), "channel table reloaded");
        Ok(rows.len())
    }
}

impl MirrorStore for PgStore {
    fn ensure_message_table<'a>(&'a self) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            sqlx::query(schema::CREATE_MESSAGES)
                .execute(&self.pool)
                .await
                .context("failed to create message table")?;
            Ok(())
        })
    }

    fn upsert_messages<'a>(&'a self, records: &'a [MessageRecord]) -> BoxFuture<'a, Result<usize>> {
        Box::pin(self.upsert_messages_tx(records))
    }

    fn message_count<'a>(&'a self, ecosystem: &'a str) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            let count: i64 = sqlx::query_scalar(schema::COUNT_MESSAGES)
                .bind(ecosystem)
                .fetch_one(&self.pool)
                .await
                .with_context(|| format!("failed to count messages for {ecosystem}"))?;
            Ok(u64::try_from(count).unwrap_or(0))
        })
    }

    fn latest_cursor<'a>(&'a self, ecosystem: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(async move {
            let cursor: Option<Option<String>> = sqlx::query_scalar(schema::LATEST_CURSOR)
                .bind(ecosystem)
                .fetch_optional(&self.pool)
                .await
                .with_context(|| format!("failed to read latest cursor for {ecosystem}"))?;
            Ok(cursor.flatten())
        })
    }

    fn replace_channels<'a>(
        &'a self,
        records: &'a [ChannelRecord],
    ) -> BoxFuture<'a, Result<usize>> {
        Box::pin(self.replace_channels_tx(records))
    }
}
