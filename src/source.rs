//! Upstream data sources: the traits the sync flows consume, the cursor
//! paginator, and the bindings to the indexing API endpoints.

pub mod paginator;
pub mod subscan;

use crate::normalize::RelayDirection;
use anyhow::Result;
use futures::future::BoxFuture;
use serde_json::{json, Value};

pub use paginator::{CursorPaginator, MAX_PAGE_SIZE};
pub use subscan::SubscanApi;

/// Where a page request starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PagePosition {
    /// Page zero of the collection.
    First,
    /// Records strictly after the given cursor, echoed with the JSON type
    /// upstream used for it.
    After(Value),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub row: u32,
    pub position: PagePosition,
}

impl PageRequest {
    /// Request body: `{row, page: 0}` for the first page, `{row, after_id}` after.
    pub fn to_payload(&self) -> Value {
        match &self.position {
            PagePosition::First => json!({ "row": self.row, "page": 0 }),
            PagePosition::After(cursor) => json!({ "row": self.row, "after_id": cursor }),
        }
    }
}

/// Paginated message collection for one ecosystem.
pub trait PageSource: Send + Sync {
    /// Returns the raw records of one page, in upstream order.
    fn fetch_page<'a>(&'a self, request: PageRequest) -> BoxFuture<'a, Result<Vec<Value>>>;

    /// Best-effort total reported by upstream; `0` when it does not say.
    fn expected_total<'a>(&'a self) -> BoxFuture<'a, Result<u64>>;
}

/// Channel snapshot endpoints for one ecosystem.
pub trait ChannelSource: Send + Sync {
    fn fetch_channels<'a>(&'a self) -> BoxFuture<'a, Result<Vec<Value>>>;

    /// Full response envelope of a relay stat query.
    fn fetch_relay_stats<'a>(&'a self, direction: RelayDirection) -> BoxFuture<'a, Result<Value>>;
}
