//! Backoff arithmetic, `Retry-After` parsing, and the canned log templates the
//! API client uses to keep retry instrumentation consistent across endpoints.

use crate::http::options::FetchPolicy;
use anyhow::Error;
use rand::Rng;
use std::time::Duration;

macro_rules! log_with_retry_ctx {
    ($level:ident, $ctx:expr, $($rest:tt)*) => {{
        if let Some(ecosystem) = $ctx.ecosystem {
            tracing::$level!(ecosystem, $($rest)*);
        } else {
            tracing::$level!($($rest)*);
        }
    }};
}

pub(crate) use log_with_retry_ctx;

/// What the retry loop should do with a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryDisposition {
    /// Sleep and try again; `hint` overrides the computed backoff when the
    /// server supplied one.
    Retry { hint: Option<Duration> },
    Abort,
}

/// Logging labels describing how one upstream operation reports retries,
/// exhaustion, and non-retryable rejections.
#[derive(Clone, Copy)]
pub(crate) struct RetryMessages {
    pub(crate) permit: &'static str,
    pub(crate) retry: &'static str,
    pub(crate) exhausted: &'static str,
    pub(crate) rejected: &'static str,
}

/// Context passed into the retry loop so callers can attach the ecosystem
/// being synced and reuse consistent log messaging.
#[derive(Clone, Copy)]
pub(crate) struct RetryContext<'a> {
    ecosystem: Option<&'a str>,
    messages: &'a RetryMessages,
}

impl<'a> RetryContext<'a> {
    pub(crate) fn new(messages: &'a RetryMessages) -> Self {
        Self {
            ecosystem: None,
            messages,
        }
    }

    pub(crate) fn for_ecosystem(messages: &'a RetryMessages, ecosystem: &'a str) -> Self {
        Self {
            ecosystem: Some(ecosystem),
            messages,
        }
    }

    pub(crate) fn log_permit(&self, attempt: u32) {
        log_with_retry_ctx!(trace, self, attempt, "{}", self.messages.permit);
    }

    pub(crate) fn log_retry(
        &self,
        attempt: u32,
        backoff: Duration,
        err: &Error,
        server_hint: bool,
    ) {
        log_with_retry_ctx!(
            warn,
            self,
            attempt,
            backoff_ms = duration_to_millis(backoff),
            retry_after = server_hint,
            error = %err,
            "{}",
            self.messages.retry
        );
    }

    pub(crate) fn log_exhausted(&self, attempt: u32, err: &Error) {
        log_with_retry_ctx!(error, self, attempt, error = %err, "{}", self.messages.exhausted);
    }

    pub(crate) fn log_rejected(&self, attempt: u32, err: &Error) {
        log_with_retry_ctx!(warn, self, attempt, error = %err, "{}", self.messages.rejected);
    }
}

pub(crate) const CHANNELS_RETRY: RetryMessages = RetryMessages {
    permit: "rate limiter permit acquired for channel snapshot",
    retry: "channel snapshot request failed; retrying",
    exhausted: "channel snapshot request exhausted retries",
    rejected: "channel snapshot request rejected",
};

pub(crate) const RELAY_STATS_RETRY: RetryMessages = RetryMessages {
    permit: "rate limiter permit acquired for relay stats",
    retry: "relay stats request failed; retrying",
    exhausted: "relay stats request exhausted retries",
    rejected: "relay stats request rejected",
};

pub(crate) const MESSAGE_PAGE_RETRY: RetryMessages = RetryMessages {
    permit: "rate limiter permit acquired for message page",
    retry: "message page request failed; retrying",
    exhausted: "message page request exhausted retries",
    rejected: "message page request rejected",
};

pub(crate) const MESSAGE_TOTAL_RETRY: RetryMessages = RetryMessages {
    permit: "rate limiter permit acquired for message total",
    retry: "message total request failed; retrying",
    exhausted: "message total request exhausted retries",
    rejected: "message total request rejected",
};

/// Exponential backoff without jitter: `min(cap, base * 2^attempt)`, with
/// `attempt` counted from zero.
pub fn backoff_delay(policy: &FetchPolicy, attempt: u32) -> Duration {
    let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    policy
        .backoff_base
        .saturating_mul(multiplier)
        .min(policy.backoff_cap)
}

/// Parses a `Retry-After` value expressed in (possibly fractional) seconds.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let seconds: f64 = value.trim().parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(seconds).ok()
}

/// Sleep applied before the next attempt: the server hint when present,
/// otherwise the capped backoff, plus uniform jitter.
pub(crate) fn retry_delay(policy: &FetchPolicy, attempt: u32, hint: Option<Duration>) -> Duration {
    let base = hint.unwrap_or_else(|| backoff_delay(policy, attempt));
    base.saturating_add(jitter(policy.jitter_max))
}

fn jitter(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    let nanos = rand::thread_rng().gen_range(0..=max.as_nanos().min(u128::from(u64::MAX)) as u64);
    Duration::from_nanos(nanos)
}

fn duration_to_millis(backoff: Duration) -> u64 {
    backoff.as_millis().min(u128::from(u64::MAX)) as u64
}
