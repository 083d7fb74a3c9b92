//! DDL for the two mirrored tables.

pub const MESSAGE_TABLE: &str = "public.messages";
pub const CHANNEL_TABLE: &str = "public.channels";

pub const CREATE_MESSAGES: &str = r#"
CREATE TABLE IF NOT EXISTS public.messages (
    ecosystem TEXT NOT NULL,
    message_hash VARCHAR NOT NULL,
    origin_event_index VARCHAR,
    from_account_id VARCHAR,
    origin_para_id INTEGER,
    origin_block_timestamp BIGINT,
    relayed_block_timestamp BIGINT,
    block_num BIGINT,
    status VARCHAR,
    relayed_event_index VARCHAR,
    dest_event_index VARCHAR,
    dest_para_id INTEGER,
    to_account_id VARCHAR,
    confirm_block_timestamp BIGINT,
    extrinsic_index VARCHAR,
    relayed_extrinsic_index VARCHAR,
    dest_extrinsic_index VARCHAR,
    child_para_id INTEGER,
    child_dest VARCHAR,
    protocol VARCHAR,
    message_type VARCHAR,
    unique_id VARCHAR,
    xcm_version INTEGER,
    assets JSONB,
    PRIMARY KEY (ecosystem, message_hash)
)
"#;

pub const DROP_CHANNELS: &str = "DROP TABLE IF EXISTS public.channels";

pub const CREATE_CHANNELS: &str = r#"
CREATE TABLE public.channels (
    id SERIAL PRIMARY KEY,
    ecosystem TEXT NOT NULL,
    sender INTEGER NOT NULL,
    recipient INTEGER NOT NULL,
    status VARCHAR(255),
    transfer_count BIGINT,
    message_count BIGINT,
    active_at BIGINT,
    proposed_max_capacity BIGINT,
    proposed_max_message_size BIGINT,
    UNIQUE (ecosystem, sender, recipient)
)
"#;

/// Message columns in bind order. The first two form the primary key.
pub const MESSAGE_COLUMNS: [&str; 24] = [
    "ecosystem",
    "message_hash",
    "origin_event_index",
    "from_account_id",
    "origin_para_id",
    "origin_block_timestamp",
    "relayed_block_timestamp",
    "block_num",
    "status",
    "relayed_event_index",
    "dest_event_index",
    "dest_para_id",
    "to_account_id",
    "confirm_block_timestamp",
    "extrinsic_index",
    "relayed_extrinsic_index",
    "dest_extrinsic_index",
    "child_para_id",
    "child_dest",
    "protocol",
    "message_type",
    "unique_id",
    "xcm_version",
    "assets",
];

pub const MESSAGE_KEY_COLUMNS: usize = 2;

/// Channel columns in bind order. The first three form the unique key.
pub const CHANNEL_COLUMNS: [&str; 9] = [
    "ecosystem",
    "sender",
    "recipient",
    "status",
    "transfer_count",
    "message_count",
    "active_at",
    "proposed_max_capacity",
    "proposed_max_message_size",
];

pub const CHANNEL_KEY_COLUMNS: usize = 3;

pub const LATEST_CURSOR: &str = r#"
SELECT COALESCE(unique_id, message_hash) AS cursor
FROM public.messages
WHERE ecosystem = $1
ORDER BY block_num DESC NULLS LAST, origin_block_timestamp DESC NULLS LAST
LIMIT 1
"#;

pub const COUNT_MESSAGES: &str = "SELECT COUNT(*) FROM public.messages WHERE ecosystem = $1";

/// `INSERT INTO <table> (<columns>) ` prefix for a bulk upsert.
pub fn insert_prefix(table: &str, columns: &[&str]) -> String {
    format!("INSERT INTO {table} ({}) ", columns.join(", "))
}

/// `ON CONFLICT (<key>) DO UPDATE SET` clause overwriting every non-key column.
pub fn upsert_suffix(columns: &[&str], key_columns: usize) -> String {
    let (key, rest) = columns.split_at(key_columns);
    let assignments = rest
        .iter()
        .map(|column| format!("{column} = EXCLUDED.{column}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(" ON CONFLICT ({}) DO UPDATE SET {assignments}", key.join(", "))
}
