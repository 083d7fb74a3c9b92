//! Maps raw upstream objects onto the canonical record shapes.
//!
//! Field names drift between deployments and endpoints, so every target field
//! owns an ordered alias list; the first alias present with a non-null value
//! wins. Absent or uncoercible values become `None` rather than a zero or an
//! empty string.

use crate::records::{ChannelRecord, MessageRecord};
use serde_json::{Map, Value};

pub mod aliases {
    pub const SENDER: &[&str] = &["sender", "source_para_id", "source", "from_para_id"];
    pub const RECIPIENT: &[&str] = &["recipient", "dest_para_id", "destination", "to_para_id"];
    pub const STATUS: &[&str] = &["status"];
    pub const TRANSFER_COUNT: &[&str] = &["transfer_count"];
    pub const MESSAGE_COUNT: &[&str] = &["message_count"];
    pub const ACTIVE_AT: &[&str] = &["active_at"];
    pub const MAX_CAPACITY: &[&str] = &["proposed_max_capacity", "max_capacity"];
    pub const MAX_MESSAGE_SIZE: &[&str] = &["proposed_max_message_size", "max_message_size"];

    pub const MESSAGE_HASH: &[&str] = &["message_hash"];
    pub const ORIGIN_EVENT_INDEX: &[&str] = &["origin_event_index"];
    pub const FROM_ACCOUNT_ID: &[&str] = &["from_account_id"];
    pub const ORIGIN_PARA_ID: &[&str] = &["origin_para_id"];
    pub const ORIGIN_BLOCK_TIMESTAMP: &[&str] = &["origin_block_timestamp"];
    pub const RELAYED_BLOCK_TIMESTAMP: &[&str] = &["relayed_block_timestamp"];
    pub const BLOCK_NUM: &[&str] = &["block_num"];
    pub const RELAYED_EVENT_INDEX: &[&str] = &["relayed_event_index"];
    pub const DEST_EVENT_INDEX: &[&str] = &["dest_event_index"];
    pub const DEST_PARA_ID: &[&str] = &["dest_para_id"];
    pub const TO_ACCOUNT_ID: &[&str] = &["to_account_id"];
    pub const CONFIRM_BLOCK_TIMESTAMP: &[&str] = &["confirm_block_timestamp"];
    pub const EXTRINSIC_INDEX: &[&str] = &["extrinsic_index"];
    pub const RELAYED_EXTRINSIC_INDEX: &[&str] = &["relayed_extrinsic_index"];
    pub const DEST_EXTRINSIC_INDEX: &[&str] = &["dest_extrinsic_index"];
    pub const CHILD_PARA_ID: &[&str] = &["child_para_id"];
    pub const CHILD_DEST: &[&str] = &["child_dest"];
    pub const PROTOCOL: &[&str] = &["protocol"];
    pub const MESSAGE_TYPE: &[&str] = &["message_type"];
    pub const UNIQUE_ID: &[&str] = &["unique_id"];
    pub const XCM_VERSION: &[&str] = &["xcm_version"];
    pub const ASSETS: &[&str] = &["assets"];
}

/// Relay-chain participant id used for upward and downward channels.
pub const RELAY_PARTICIPANT: i32 = 0;
const RELAY_CHANNEL_STATUS: &str = "accepted";
const RELAY_CHANNEL_MAX_CAPACITY: i64 = 1000;
const RELAY_CHANNEL_MAX_MESSAGE_SIZE: i64 = 102_400;

/// Direction of a relay stat query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayDirection {
    /// Relay chain to parachain.
    Downward,
    /// Parachain to relay chain.
    Upward,
}

impl RelayDirection {
    pub fn as_query(self) -> &'static str {
        match self {
            RelayDirection::Downward => "out",
            RelayDirection::Upward => "in",
        }
    }
}

/// Read-only view over a raw upstream object with first-match lookups.
struct Fields<'a> {
    raw: Option<&'a Map<String, Value>>,
}

impl<'a> Fields<'a> {
    fn new(raw: &'a Value) -> Self {
        Self {
            raw: raw.as_object(),
        }
    }

    fn pick(&self, names: &[&str]) -> Option<&'a Value> {
        let raw = self.raw?;
        names
            .iter()
            .filter_map(|name| raw.get(*name))
            .find(|value| !value.is_null())
    }

    fn string(&self, names: &[&str]) -> Option<String> {
        match self.pick(names)? {
            Value::String(value) => Some(value.clone()),
            Value::Number(value) => Some(value.to_string()),
            _ => None,
        }
    }

    fn int(&self, names: &[&str]) -> Option<i64> {
        coerce_i64(self.pick(names)?)
    }

    fn small_int(&self, names: &[&str]) -> Option<i32> {
        self.int(names).and_then(|value| i32::try_from(value).ok())
    }

    fn structured(&self, names: &[&str]) -> Option<Value> {
        self.pick(names).cloned()
    }
}

fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.fract() == 0.0 && float.abs() < i64::MAX as f64)
                .map(|float| float as i64)
        }),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

pub fn normalize_channel(ecosystem: &str, raw: &Value) -> ChannelRecord {
    let fields = Fields::new(raw);
    ChannelRecord {
        ecosystem: ecosystem.to_owned(),
        sender: fields.small_int(aliases::SENDER),
        recipient: fields.small_int(aliases::RECIPIENT),
        status: fields.string(aliases::STATUS),
        transfer_count: fields.int(aliases::TRANSFER_COUNT),
        message_count: fields.int(aliases::MESSAGE_COUNT),
        active_at: fields.int(aliases::ACTIVE_AT),
        proposed_max_capacity: fields.int(aliases::MAX_CAPACITY),
        proposed_max_message_size: fields.int(aliases::MAX_MESSAGE_SIZE),
    }
}

pub fn normalize_message(ecosystem: &str, raw: &Value) -> MessageRecord {
    let fields = Fields::new(raw);
    MessageRecord {
        ecosystem: ecosystem.to_owned(),
        message_hash: fields.string(aliases::MESSAGE_HASH),
        origin_event_index: fields.string(aliases::ORIGIN_EVENT_INDEX),
        from_account_id: fields.string(aliases::FROM_ACCOUNT_ID),
        origin_para_id: fields.small_int(aliases::ORIGIN_PARA_ID),
        origin_block_timestamp: fields.int(aliases::ORIGIN_BLOCK_TIMESTAMP),
        relayed_block_timestamp: fields.int(aliases::RELAYED_BLOCK_TIMESTAMP),
        block_num: fields.int(aliases::BLOCK_NUM),
        status: fields.string(aliases::STATUS),
        relayed_event_index: fields.string(aliases::RELAYED_EVENT_INDEX),
        dest_event_index: fields.string(aliases::DEST_EVENT_INDEX),
        dest_para_id: fields.small_int(aliases::DEST_PARA_ID),
        to_account_id: fields.string(aliases::TO_ACCOUNT_ID),
        confirm_block_timestamp: fields.int(aliases::CONFIRM_BLOCK_TIMESTAMP),
        extrinsic_index: fields.string(aliases::EXTRINSIC_INDEX),
        relayed_extrinsic_index: fields.string(aliases::RELAYED_EXTRINSIC_INDEX),
        dest_extrinsic_index: fields.string(aliases::DEST_EXTRINSIC_INDEX),
        child_para_id: fields.small_int(aliases::CHILD_PARA_ID),
        child_dest: fields.string(aliases::CHILD_DEST),
        protocol: fields.string(aliases::PROTOCOL),
        message_type: fields.string(aliases::MESSAGE_TYPE),
        unique_id: fields.string(aliases::UNIQUE_ID),
        xcm_version: fields.small_int(aliases::XCM_VERSION),
        assets: fields.structured(aliases::ASSETS),
    }
}

/// Pagination cursor carried by a raw message: a non-empty string or numeric
/// `unique_id`, returned as-is so it can be sent back unchanged.
pub fn page_cursor(raw: &Value) -> Option<Value> {
    match Fields::new(raw).pick(aliases::UNIQUE_ID)? {
        Value::String(cursor) if cursor.is_empty() => None,
        cursor @ (Value::String(_) | Value::Number(_)) => Some(cursor.clone()),
        _ => None,
    }
}

/// Expands a relay stat response into relay<->parachain channel rows.
///
/// `body` is the full response envelope; rows live under `data` and the
/// snapshot time under the top-level `generated_at`. Rows without a parachain
/// id are skipped.
pub fn relay_stat_channels(
    ecosystem: &str,
    direction: RelayDirection,
    body: &Value,
) -> Vec<ChannelRecord> {
    let generated_at = body.get("generated_at").and_then(coerce_i64);
    let rows = body
        .get("data")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    rows.iter()
        .filter_map(|row| {
            let fields = Fields::new(row);
            let (sender, recipient) = match direction {
                RelayDirection::Downward => {
                    (RELAY_PARTICIPANT, fields.small_int(&["recipient"])?)
                }
                RelayDirection::Upward => (fields.small_int(&["sender"])?, RELAY_PARTICIPANT),
            };
            Some(ChannelRecord {
                ecosystem: ecosystem.to_owned(),
                sender: Some(sender),
                recipient: Some(recipient),
                status: Some(RELAY_CHANNEL_STATUS.to_owned()),
                transfer_count: Some(fields.int(&["transfer_total"]).unwrap_or(0)),
                message_count: Some(fields.int(&["message_total"]).unwrap_or(0)),
                active_at: generated_at,
                proposed_max_capacity: Some(RELAY_CHANNEL_MAX_CAPACITY),
                proposed_max_message_size: Some(RELAY_CHANNEL_MAX_MESSAGE_SIZE),
            })
        })
        .collect()
}
