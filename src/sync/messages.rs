use crate::normalize::normalize_message;
use crate::records::NaturalKey;
use crate::runtime::progress::{SyncProgress, DEFAULT_PROGRESS_EVERY};
use crate::runtime::telemetry::Telemetry;
use crate::source::{CursorPaginator, PageSource, MAX_PAGE_SIZE};
use crate::store::MirrorStore;
use crate::sync::batch::{BatchBuffer, DEFAULT_BATCH_SIZE};
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Walks the whole collection. Existing rows are kept and refreshed.
    Full,
    /// Walks from the newest page until the stored cursor shows up.
    Incremental,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Full => f.write_str("full"),
            SyncMode::Incremental => f.write_str("incremental"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// A record matching the stored cursor was reached.
    CursorReached,
    /// The paginator ran out of pages.
    SourceExhausted,
    /// This run accepted as many records as upstream reported.
    ExpectedTotalReached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageSyncOptions {
    pub page_size: u32,
    pub batch_size: usize,
    pub progress_every: u64,
}

impl Default for MessageSyncOptions {
    fn default() -> Self {
        Self {
            page_size: MAX_PAGE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageSyncReport {
    pub ecosystem: String,
    pub mode: SyncMode,
    /// Rows written across every flush, after in-batch dedup.
    pub upserted: usize,
    /// Distinct records accepted in this run.
    pub seen: usize,
    /// Upstream total, `0` when unknown.
    pub expected: u64,
    pub stored_after: u64,
    pub pages: usize,
    pub stop_reason: StopReason,
}

impl MessageSyncReport {
    /// Rows missing against the upstream total after a full sync.
    pub fn shortfall(&self) -> Option<u64> {
        (self.mode == SyncMode::Full && self.expected > self.stored_after)
            .then(|| self.expected - self.stored_after)
    }
}

/// Mirrors the message collection of one ecosystem into a [`MirrorStore`].
pub struct MessageSync<'a, S: ?Sized, M: ?Sized> {
    ecosystem: &'a str,
    source: &'a S,
    store: &'a M,
    options: MessageSyncOptions,
    telemetry: Option<Arc<Telemetry>>,
}

impl<'a, S, M> MessageSync<'a, S, M>
where
    S: PageSource + ?Sized,
    M: MirrorStore + ?Sized,
{
    pub fn new(ecosystem: &'a str, source: &'a S, store: &'a M) -> Self {
        Self {
            ecosystem,
            source,
            store,
            options: MessageSyncOptions::default(),
            telemetry: None,
        }
    }

    pub fn with_options(mut self, options: MessageSyncOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub async fn run(&self, mode: SyncMode) -> Result<MessageSyncReport> {
        let ecosystem = self.ecosystem;
        if self.options.progress_every == 0 {
            bail!("progress_every must be greater than 0");
        }
        let mut batch = BatchBuffer::new(self.options.batch_size)?;

        self.store.ensure_message_table().await?;

        let expected = match self.source.expected_total().await {
            Ok(total) => total,
            Err(err) => {
                tracing::warn!(
                    ecosystem,
                    error = %err,
                    "cannot read expected total; continuing without it"
                );
                0
            }
        };

        let stop_cursor = match mode {
            SyncMode::Full => None,
            SyncMode::Incremental => self.store.latest_cursor(ecosystem).await?,
        };
        match (&mode, &stop_cursor) {
            (SyncMode::Full, _) => tracing::info!(ecosystem, expected, "full backfill"),
            (SyncMode::Incremental, Some(cursor)) => {
                tracing::info!(ecosystem, stop_at = %cursor, "incremental sync")
            }
            (SyncMode::Incremental, None) => {
                tracing::info!(ecosystem, expected, "no stored cursor; initial backfill")
            }
        }

        let progress = SyncProgress::new(self.options.progress_every, expected);
        let mut paginator = CursorPaginator::new(self.source, None, self.options.page_size)?;
        let mut seen: HashSet<String> = HashSet::new();
        let mut upserted = 0usize;
        let mut stop_reason = StopReason::SourceExhausted;

        'pages: while let Some(page) = paginator
            .next_page()
            .await
            .with_context(|| format!("pagination failed for {ecosystem}"))?
        {
            if let Some(telemetry) = &self.telemetry {
                telemetry.record_page();
            }

            for raw in &page {
                let record = normalize_message(ecosystem, raw);

                if let Some(stop) = stop_cursor.as_deref() {
                    if record.sync_cursor() == Some(stop) {
                        stop_reason = StopReason::CursorReached;
                        break 'pages;
                    }
                }

                let Some((_, hash)) = record.natural_key() else {
                    continue;
                };
                if !seen.insert(hash) {
                    continue;
                }

                if let Some(telemetry) = &self.telemetry {
                    telemetry.record_accepted();
                }
                let report_due = progress.record_accepted();

                if batch.push(record) {
                    upserted += self.flush(&mut batch, &progress).await?;
                }

                if report_due {
                    let stored = self.store.message_count(ecosystem).await?;
                    progress.report(ecosystem, stored, batch.len());
                }
            }

            if mode == SyncMode::Full && progress.reached_expected() {
                stop_reason = StopReason::ExpectedTotalReached;
                break;
            }
        }

        upserted += self.flush(&mut batch, &progress).await?;
        let stored_after = self.store.message_count(ecosystem).await?;

        let report = MessageSyncReport {
            ecosystem: ecosystem.to_owned(),
            mode,
            upserted,
            seen: seen.len(),
            expected,
            stored_after,
            pages: paginator.pages_fetched(),
            stop_reason,
        };

        tracing::info!(
            ecosystem,
            mode = %mode,
            upserted,
            seen = report.seen,
            expected,
            stored_after,
            pages = report.pages,
            stop = ?stop_reason,
            "message sync finished"
        );
        if let Some(missing) = report.shortfall() {
            tracing::warn!(
                ecosystem,
                missing,
                expected,
                stored_after,
                "fewer rows stored than upstream reports"
            );
        }

        Ok(report)
    }

    async fn flush(&self, batch: &mut BatchBuffer, progress: &SyncProgress) -> Result<usize> {
        let pending = batch.len();
        let written = batch
            .flush(self.store)
            .await
            .with_context(|| format!("failed to flush {pending} messages for {}", self.ecosystem))?;
        if pending > 0 {
            progress.record_upserted(written);
            if let Some(telemetry) = &self.telemetry {
                telemetry.record_flush(written);
            }
        }
        Ok(written)
    }
}
