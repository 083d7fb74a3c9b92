use std::sync::Arc;

use crate::support::{
    helpers::{fast_client, fast_policy, init_tracing, message_rows},
    mock_api::{Fault, MockApiServer, MockSubscan},
};
use xcm_mirror::{MemoryStore, MirrorConfig, Runner, StopReason, SyncMode};

#[tokio::test]
async fn failing_ecosystem_does_not_block_the_others() {
    init_tracing();
    let broken = MockSubscan::new().with_messages(message_rows(0, 10));
    broken.fail_always(Fault::Application {
        code: 403,
        message: "invalid api key".into(),
    });
    let healthy = MockSubscan::new().with_messages(message_rows(0, 130));
    let server_a = MockApiServer::start(broken.clone()).await.expect("server a");
    let server_b = MockApiServer::start_on("localhost", healthy)
        .await
        .expect("server b");

    let config = MirrorConfig::builder()
        .ecosystem_urls([server_a.url(), server_b.url()])
        .database_url("postgres://unused")
        .batch_size(50)
        .build()
        .expect("config");
    let store = Arc::new(MemoryStore::new());
    let runner = Runner::with_client(config, fast_client(None), store.clone())
        .with_fetch_policies(fast_policy(1), fast_policy(1));

    let summary = runner.sync_messages(SyncMode::Incremental).await;

    assert!(!summary.is_success());
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].ecosystem, "127");
    assert!(summary.failures[0].error.contains("invalid api key"));

    assert_eq!(summary.reports.len(), 1);
    let report = &summary.reports[0];
    assert_eq!(report.ecosystem, "localhost");
    assert_eq!(report.stored_after, 130);
    assert_eq!(report.stop_reason, StopReason::SourceExhausted);
    assert_eq!(summary.total_upserted(), 130);

    assert!(store.messages("127").await.is_empty());
    assert_eq!(store.messages("localhost").await.len(), 130);

    let telemetry = runner.telemetry().snapshot();
    assert_eq!(telemetry.ecosystems_synced, 1);
    assert_eq!(telemetry.ecosystems_failed, 1);
    assert_eq!(telemetry.rows_upserted, 130);

    server_a.shutdown().await;
    server_b.shutdown().await;
}

#[tokio::test]
async fn second_incremental_run_only_writes_new_messages() {
    init_tracing();
    let mock = MockSubscan::new().with_messages(message_rows(0, 60));
    let server = MockApiServer::start(mock.clone()).await.expect("server");

    let config = MirrorConfig::builder()
        .ecosystem_urls([server.url()])
        .database_url("postgres://unused")
        .page_size(25)
        .build()
        .expect("config");
    let store = Arc::new(MemoryStore::new());
    let runner = Runner::with_client(config, fast_client(None), store.clone())
        .with_fetch_policies(fast_policy(1), fast_policy(1));

    let first = runner.sync_messages(SyncMode::Incremental).await;
    assert!(first.is_success());
    assert_eq!(first.total_upserted(), 60);

    mock.publish_newer(message_rows(60, 4));
    let second = runner.sync_messages(SyncMode::Incremental).await;
    assert!(second.is_success());
    assert_eq!(second.total_upserted(), 4);
    assert_eq!(second.reports[0].stop_reason, StopReason::CursorReached);
    assert_eq!(second.reports[0].stored_after, 64);

    server.shutdown().await;
}
