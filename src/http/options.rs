//! Retry/backoff policies for upstream calls along with validation helpers so
//! callers can reason about timeouts, retry ceilings, and delay caps.

use anyhow::{bail, Result};
use std::time::Duration;

const CHANNELS_MAX_RETRIES: u32 = 4;
const CHANNELS_BACKOFF_BASE_MS: u64 = 500;
const CHANNELS_BACKOFF_CAP_SECS: u64 = 8;
const CHANNELS_TIMEOUT_SECS: u64 = 30;

const MESSAGES_MAX_RETRIES: u32 = 6;
const MESSAGES_BACKOFF_BASE_MS: u64 = 1_000;
const MESSAGES_BACKOFF_CAP_SECS: u64 = 60;
const MESSAGES_TIMEOUT_SECS: u64 = 60;

const DEFAULT_JITTER_MS: u64 = 100;

/// Retry ceiling, backoff shape, and per-request timeout for one class of
/// upstream call.
///
/// `max_retries` counts retries on top of the first attempt, so a policy with
/// `max_retries = 4` issues at most five requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPolicy {
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub jitter_max: Duration,
}

impl FetchPolicy {
    /// Channel snapshot and relay stat requests: few retries, short ceiling.
    pub fn channels() -> Self {
        Self {
            request_timeout: Duration::from_secs(CHANNELS_TIMEOUT_SECS),
            max_retries: CHANNELS_MAX_RETRIES,
            backoff_base: Duration::from_millis(CHANNELS_BACKOFF_BASE_MS),
            backoff_cap: Duration::from_secs(CHANNELS_BACKOFF_CAP_SECS),
            jitter_max: Duration::from_millis(DEFAULT_JITTER_MS),
        }
    }

    /// Message pagination: more retries and a one minute ceiling.
    pub fn messages() -> Self {
        Self {
            request_timeout: Duration::from_secs(MESSAGES_TIMEOUT_SECS),
            max_retries: MESSAGES_MAX_RETRIES,
            backoff_base: Duration::from_millis(MESSAGES_BACKOFF_BASE_MS),
            backoff_cap: Duration::from_secs(MESSAGES_BACKOFF_CAP_SECS),
            jitter_max: Duration::from_millis(DEFAULT_JITTER_MS),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            bail!("request_timeout must be greater than 0");
        }
        if self.backoff_base.is_zero() {
            bail!("backoff_base must be greater than 0");
        }
        if self.backoff_cap < self.backoff_base {
            bail!("backoff_cap must be at least backoff_base");
        }
        Ok(())
    }
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self::messages()
    }
}
