use crate::normalize::page_cursor;
use crate::source::{PagePosition, PageRequest, PageSource};
use anyhow::{bail, Result};
use serde_json::Value;

pub const MAX_PAGE_SIZE: u32 = 100;

/// Walks a [`PageSource`] one page at a time using the `unique_id` of each
/// page's last record as the next `after_id`.
///
/// The walk ends on an empty page, on a page whose last record carries no
/// usable cursor (that page is still returned), on a cursor that fails to
/// advance, or on the first error. Consumer-level stop conditions are the
/// caller's business.
pub struct CursorPaginator<'s, S: PageSource + ?Sized> {
    source: &'s S,
    row: u32,
    next: Option<PagePosition>,
    pages_fetched: usize,
}

impl<'s, S: PageSource + ?Sized> CursorPaginator<'s, S> {
    /// `start_after = None` begins at page zero.
    pub fn new(source: &'s S, start_after: Option<Value>, row: u32) -> Result<Self> {
        if row == 0 || row > MAX_PAGE_SIZE {
            bail!("page size must be between 1 and {MAX_PAGE_SIZE}, got {row}");
        }

        let next = match start_after {
            Some(cursor) => PagePosition::After(cursor),
            None => PagePosition::First,
        };

        Ok(Self {
            source,
            row,
            next: Some(next),
            pages_fetched: 0,
        })
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    pub fn is_finished(&self) -> bool {
        self.next.is_none()
    }

    /// Fetches the next page, or `None` once the walk has ended.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Value>>> {
        let Some(position) = self.next.take() else {
            return Ok(None);
        };

        let previous_cursor = match &position {
            PagePosition::After(cursor) => Some(cursor.clone()),
            PagePosition::First => None,
        };

        let rows = self
            .source
            .fetch_page(PageRequest {
                row: self.row,
                position,
            })
            .await?;

        if rows.is_empty() {
            tracing::debug!(pages = self.pages_fetched, "empty page; pagination finished");
            return Ok(None);
        }

        self.pages_fetched += 1;

        match rows.last().and_then(page_cursor) {
            Some(cursor) if previous_cursor.as_ref() == Some(&cursor) => {
                tracing::warn!(cursor = %cursor, "page cursor did not advance; halting pagination");
            }
            Some(cursor) => self.next = Some(PagePosition::After(cursor)),
            None => {
                tracing::warn!(
                    pages = self.pages_fetched,
                    rows = rows.len(),
                    "last record on page has no cursor; halting pagination"
                );
            }
        }

        Ok(Some(rows))
    }
}
