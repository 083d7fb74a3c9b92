//! Durable mirror storage. Every write path dedups on the natural key before
//! it reaches a backend.

pub mod dedup;
pub mod memory;
pub mod postgres;
pub mod schema;

use crate::records::{ChannelRecord, MessageRecord};
use anyhow::Result;
use futures::future::BoxFuture;

pub use dedup::last_wins;
pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Storage seam used by the sync flows.
///
/// Implementations must apply each call atomically: a failed
/// `upsert_messages` or `replace_channels` leaves storage as it was before
/// the call.
pub trait MirrorStore: Send + Sync {
    /// Creates the message table when it does not exist yet.
    fn ensure_message_table<'a>(&'a self) -> BoxFuture<'a, Result<()>>;

    /// Upserts on (ecosystem, message_hash). Returns the number of rows
    /// written after dedup.
    fn upsert_messages<'a>(&'a self, records: &'a [MessageRecord]) -> BoxFuture<'a, Result<usize>>;

    fn message_count<'a>(&'a self, ecosystem: &'a str) -> BoxFuture<'a, Result<u64>>;

    /// Cursor of the newest stored message for `ecosystem`.
    fn latest_cursor<'a>(&'a self, ecosystem: &'a str) -> BoxFuture<'a, Result<Option<String>>>;

    /// Rebuilds the channel table from `records` in one transaction.
    fn replace_channels<'a>(&'a self, records: &'a [ChannelRecord]) -> BoxFuture<'a, Result<usize>>;
}
