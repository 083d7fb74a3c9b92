use std::{env, sync::Arc, time::Duration};

use once_cell::sync::Lazy;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;
use xcm_mirror::{ApiClient, FetchPolicy, RateLimiter};

/// Serializes tests that rebuild the shared channel table.
pub static PG_GUARD: Lazy<tokio::sync::Mutex<()>> = Lazy::new(|| tokio::sync::Mutex::new(()));

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

pub fn pg_tests_enabled() -> bool {
    match env::var("XCM_MIRROR_RUN_PG_TESTS") {
        Ok(value) => {
            let normalized = value.trim().to_ascii_lowercase();
            matches!(normalized.as_str(), "1" | "true" | "yes")
        }
        Err(_) => false,
    }
}

/// `DATABASE_URL` when the postgres suite is switched on.
pub fn pg_database_url() -> Option<String> {
    if !pg_tests_enabled() {
        return None;
    }
    env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty())
}

/// Client with a limiter wide enough that tests never wait on it.
pub fn fast_client(api_key: Option<&str>) -> ApiClient {
    let limiter = Arc::new(RateLimiter::new(1_000, Duration::from_secs(1)).expect("limiter"));
    ApiClient::new(limiter, api_key).expect("client should build")
}

pub fn fast_policy(max_retries: u32) -> FetchPolicy {
    FetchPolicy {
        request_timeout: Duration::from_secs(5),
        max_retries,
        backoff_base: Duration::from_millis(5),
        backoff_cap: Duration::from_millis(20),
        jitter_max: Duration::from_millis(1),
    }
}

/// Raw upstream message rows, newest first: `m{start+count-1}` down to `m{start}`.
pub fn message_rows(start: u64, count: u64) -> Vec<Value> {
    (start..start + count)
        .rev()
        .map(|i| {
            json!({
                "message_hash": format!("0x{i:08x}"),
                "unique_id": format!("m{i}"),
                "origin_event_index": format!("{i}-3"),
                "from_account_id": "0x1234",
                "origin_para_id": 2000,
                "dest_para_id": "2004",
                "origin_block_timestamp": 1_700_000_000 + i,
                "block_num": 18_000_000 + i,
                "status": "success",
                "protocol": "HRMP",
                "message_type": "transfer",
                "xcm_version": 3,
                "assets": [{"symbol": "DOT", "amount": (i * 10).to_string(), "decimals": 10}],
            })
        })
        .collect()
}

pub fn channel_rows(pairs: &[(i32, i32)]) -> Vec<Value> {
    pairs
        .iter()
        .map(|(sender, recipient)| {
            json!({
                "sender": sender,
                "recipient": recipient,
                "status": "accepted",
                "message_count": 42,
                "transfer_count": "7",
                "active_at": 1_690_000_000,
                "max_capacity": 1000,
                "max_message_size": 102_400,
            })
        })
        .collect()
}
