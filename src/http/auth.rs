//! Header helpers for wiring the upstream API key into the `reqwest` client.

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};

pub(crate) const API_KEY_HEADER: &str = "X-API-Key";

pub(crate) fn build_api_headers(api_key: Option<&str>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    if let Some(key) = api_key.map(str::trim).filter(|key| !key.is_empty()) {
        let mut value = HeaderValue::from_str(key).context("failed to build X-API-Key header")?;
        value.set_sensitive(true);
        headers.insert(API_KEY_HEADER, value);
    }

    Ok(headers)
}
