use std::sync::Arc;

use crate::support::{
    helpers::{fast_client, fast_policy, init_tracing, message_rows},
    mock_api::{MockApiServer, MockSubscan},
};
use serde_json::json;
use xcm_mirror::{
    Ecosystem, FetchPolicy, MemoryStore, MessageSync, MessageSyncOptions, MirrorStore, StopReason,
    SubscanApi, SyncMode, Telemetry,
};

const LIST: &str = "/api/scan/xcm/list";

fn api_for(server: &MockApiServer) -> SubscanApi {
    SubscanApi::with_policies(
        fast_client(None),
        Ecosystem::new("polkadot", server.url()).expect("ecosystem"),
        fast_policy(2),
        FetchPolicy::channels(),
    )
}

fn options(batch_size: usize) -> MessageSyncOptions {
    MessageSyncOptions {
        page_size: 100,
        batch_size,
        progress_every: 50,
    }
}

#[tokio::test]
async fn full_backfill_walks_every_page_with_after_id() {
    init_tracing();
    let mock = MockSubscan::new().with_messages(message_rows(0, 237));
    let server = MockApiServer::start(mock.clone()).await.expect("server");
    let api = api_for(&server);
    let store = MemoryStore::new();
    let telemetry = Arc::new(Telemetry::default());

    let report = MessageSync::new("polkadot", &api, &store)
        .with_options(options(500))
        .with_telemetry(telemetry.clone())
        .run(SyncMode::Full)
        .await
        .expect("full sync");

    assert_eq!(report.expected, 237);
    assert_eq!(report.seen, 237);
    assert_eq!(report.upserted, 237);
    assert_eq!(report.stored_after, 237);
    assert_eq!(report.pages, 3);
    assert_eq!(report.stop_reason, StopReason::ExpectedTotalReached);
    assert_eq!(report.shortfall(), None);

    let payloads: Vec<_> = mock
        .requests_to(LIST)
        .into_iter()
        .map(|request| request.payload)
        .collect();
    assert_eq!(
        payloads,
        vec![
            json!({"row": 1, "page": 0}),
            json!({"row": 100, "page": 0}),
            json!({"row": 100, "after_id": "m137"}),
            json!({"row": 100, "after_id": "m37"}),
        ]
    );

    let snapshot = telemetry.snapshot();
    assert_eq!(snapshot.pages_fetched, 3);
    assert_eq!(snapshot.records_accepted, 237);
    assert_eq!(snapshot.rows_upserted, 237);

    server.shutdown().await;
}

#[tokio::test]
async fn incremental_run_stops_at_the_stored_cursor() {
    init_tracing();
    let mock = MockSubscan::new().with_messages(message_rows(0, 150));
    let server = MockApiServer::start(mock.clone()).await.expect("server");
    let api = api_for(&server);
    let store = MemoryStore::new();

    let first = MessageSync::new("polkadot", &api, &store)
        .with_options(options(64))
        .run(SyncMode::Incremental)
        .await
        .expect("initial backfill");
    assert_eq!(first.stored_after, 150);
    assert_eq!(first.stop_reason, StopReason::SourceExhausted);
    assert_eq!(
        store.latest_cursor("polkadot").await.expect("cursor").as_deref(),
        Some("m149")
    );

    mock.publish_newer(message_rows(150, 15));
    let calls_before = mock.requests_to(LIST).len();

    let second = MessageSync::new("polkadot", &api, &store)
        .with_options(options(64))
        .run(SyncMode::Incremental)
        .await
        .expect("incremental sync");

    assert_eq!(second.seen, 15);
    assert_eq!(second.upserted, 15);
    assert_eq!(second.stored_after, 165);
    assert_eq!(second.pages, 1);
    assert_eq!(second.stop_reason, StopReason::CursorReached);
    // One total probe plus a single page.
    assert_eq!(mock.requests_to(LIST).len() - calls_before, 2);
    assert_eq!(
        store.latest_cursor("polkadot").await.expect("cursor").as_deref(),
        Some("m164")
    );

    server.shutdown().await;
}

#[tokio::test]
async fn full_run_reports_shortfall_when_upstream_overstates_total() {
    init_tracing();
    let mock = MockSubscan::new().with_messages(message_rows(0, 120));
    mock.report_total(150);
    let server = MockApiServer::start(mock.clone()).await.expect("server");
    let api = api_for(&server);
    let store = MemoryStore::new();

    let report = MessageSync::new("polkadot", &api, &store)
        .with_options(options(500))
        .run(SyncMode::Full)
        .await
        .expect("full sync");

    assert_eq!(report.stop_reason, StopReason::SourceExhausted);
    assert_eq!(report.stored_after, 120);
    assert_eq!(report.shortfall(), Some(30));

    server.shutdown().await;
}

#[tokio::test]
async fn rerunning_a_full_sync_is_idempotent() {
    init_tracing();
    let mock = MockSubscan::new().with_messages(message_rows(0, 40));
    let server = MockApiServer::start(mock.clone()).await.expect("server");
    let api = api_for(&server);
    let store = MemoryStore::new();

    for _ in 0..2 {
        let report = MessageSync::new("polkadot", &api, &store)
            .with_options(options(16))
            .run(SyncMode::Full)
            .await
            .expect("full sync");
        assert_eq!(report.stored_after, 40);
    }

    let stored = store.messages("polkadot").await;
    assert_eq!(stored.len(), 40);
    let newest = stored
        .iter()
        .find(|record| record.unique_id.as_deref() == Some("m39"))
        .expect("newest message stored");
    assert_eq!(newest.dest_para_id, Some(2004));
    assert_eq!(newest.block_num, Some(18_000_039));
    assert_eq!(
        newest.assets,
        Some(json!([{"symbol": "DOT", "amount": "390", "decimals": 10}]))
    );

    server.shutdown().await;
}

#[tokio::test]
async fn numeric_unique_ids_are_sent_back_as_numbers() {
    init_tracing();
    let rows: Vec<_> = message_rows(0, 30)
        .into_iter()
        .enumerate()
        .map(|(index, mut row)| {
            row["unique_id"] = json!(1_000 - index as u64);
            row
        })
        .collect();
    let mock = MockSubscan::new().with_messages(rows);
    let server = MockApiServer::start(mock.clone()).await.expect("server");
    let api = api_for(&server);
    let store = MemoryStore::new();

    let report = MessageSync::new("polkadot", &api, &store)
        .with_options(MessageSyncOptions {
            page_size: 20,
            batch_size: 500,
            progress_every: 50,
        })
        .run(SyncMode::Incremental)
        .await
        .expect("backfill");

    assert_eq!(report.stored_after, 30);
    let pages: Vec<_> = mock
        .requests_to(LIST)
        .into_iter()
        .skip(1)
        .map(|request| request.payload)
        .collect();
    assert_eq!(
        pages,
        vec![
            json!({"row": 20, "page": 0}),
            json!({"row": 20, "after_id": 981}),
            json!({"row": 20, "after_id": 971}),
        ]
    );
    assert_eq!(
        store.latest_cursor("polkadot").await.expect("cursor").as_deref(),
        Some("1000")
    );

    server.shutdown().await;
}
