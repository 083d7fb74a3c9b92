//! Sliding-window call budget shared by every upstream call site.

use anyhow::{bail, Result};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

const DEFAULT_MAX_CALLS: usize = 5;
const DEFAULT_PERIOD: Duration = Duration::from_secs(1);

/// Admits at most `max_calls` within any trailing `period`.
///
/// Construct once per process and hand an `Arc` to every client; the window is
/// guarded by a FIFO-fair async mutex, so concurrent callers are admitted in
/// arrival order. The lock is held while waiting for capacity.
#[derive(Debug)]
pub struct RateLimiter {
    max_calls: usize,
    period: Duration,
    window: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_calls: usize, period: Duration) -> Result<Self> {
        if max_calls == 0 {
            bail!("rate limit max_calls must be greater than 0");
        }
        if period.is_zero() {
            bail!("rate limit period must be greater than 0");
        }
        Ok(Self {
            max_calls,
            period,
            window: Mutex::new(VecDeque::with_capacity(max_calls)),
        })
    }

    pub fn max_calls(&self) -> usize {
        self.max_calls
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Waits until one more call fits in the window, then records it.
    pub async fn acquire(&self) {
        let mut window = self.window.lock().await;
        self.evict(&mut window, Instant::now());

        while window.len() >= self.max_calls {
            let Some(oldest) = window.front().copied() else {
                break;
            };
            let ready_at = oldest + self.period;
            tracing::trace!(
                in_window = window.len(),
                wait_ms = ready_at
                    .saturating_duration_since(Instant::now())
                    .as_millis() as u64,
                "rate limit window full; waiting"
            );
            sleep_until(ready_at).await;
            self.evict(&mut window, Instant::now());
        }

        window.push_back(Instant::now());
    }

    /// Number of calls currently inside the trailing window.
    pub async fn in_flight_window(&self) -> usize {
        let mut window = self.window.lock().await;
        self.evict(&mut window, Instant::now());
        window.len()
    }

    fn evict(&self, window: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = window.front() {
            if now.saturating_duration_since(*oldest) >= self.period {
                window.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self {
            max_calls: DEFAULT_MAX_CALLS,
            period: DEFAULT_PERIOD,
            window: Mutex::new(VecDeque::with_capacity(DEFAULT_MAX_CALLS)),
        }
    }
}
