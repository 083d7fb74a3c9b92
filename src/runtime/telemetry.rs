use crate::http::ApiClient;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(5);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
/// Later calls are no-ops.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Pipeline counters shared by the sync flows and the reporter.
#[derive(Default, Debug)]
pub struct Telemetry {
    pages_fetched: AtomicU64,
    records_accepted: AtomicU64,
    rows_upserted: AtomicU64,
    batches_flushed: AtomicU64,
    ecosystems_synced: AtomicU64,
    ecosystems_failed: AtomicU64,
}

impl Telemetry {
    pub fn record_page(&self) {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_accepted(&self) {
        self.records_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flush(&self, rows: usize) {
        self.batches_flushed.fetch_add(1, Ordering::Relaxed);
        self.rows_upserted.fetch_add(rows as u64, Ordering::Relaxed);
    }

    pub fn record_ecosystem_synced(&self) {
        self.ecosystems_synced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ecosystem_failed(&self) {
        self.ecosystems_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            pages_fetched: self.pages_fetched.load(Ordering::Relaxed),
            records_accepted: self.records_accepted.load(Ordering::Relaxed),
            rows_upserted: self.rows_upserted.load(Ordering::Relaxed),
            batches_flushed: self.batches_flushed.load(Ordering::Relaxed),
            ecosystems_synced: self.ecosystems_synced.load(Ordering::Relaxed),
            ecosystems_failed: self.ecosystems_failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub pages_fetched: u64,
    pub records_accepted: u64,
    pub rows_upserted: u64,
    pub batches_flushed: u64,
    pub ecosystems_synced: u64,
    pub ecosystems_failed: u64,
}

/// Spawns a task that logs record throughput, pipeline counters and API
/// request metrics every `interval` until `shutdown` fires.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    client: ApiClient,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!(
                        target: "xcm_mirror::metrics",
                        "metrics reporter shutting down"
                    );
                    break;
                }
                _ = ticker.tick() => {
                    let current = telemetry.snapshot();
                    let accepted_delta = current
                        .records_accepted
                        .saturating_sub(last_snapshot.records_accepted);
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let throughput = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        accepted_delta as f64 / elapsed
                    };
                    let api = client.metrics();

                    tracing::info!(
                        target: "xcm_mirror::metrics",
                        throughput = format!("{throughput:.2}"),
                        pages = current.pages_fetched,
                        accepted = current.records_accepted,
                        upserted = current.rows_upserted,
                        batches = current.batches_flushed,
                        api_requests = api.total_requests,
                        api_errors = api.total_errors,
                        api_retries = api.total_retries,
                        api_throttled = api.total_throttled,
                        api_latency_ms = format!("{:.1}", api.average_latency_ms),
                        "pipeline metrics snapshot"
                    );

                    last_snapshot = current;
                    last_tick = Instant::now();
                }
            }
        }
    })
}
