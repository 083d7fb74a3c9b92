use crate::support::{
    helpers::{fast_client, fast_policy, init_tracing, message_rows},
    mock_api::{Fault, MockApiServer, MockSubscan},
};
use serde_json::json;
use xcm_mirror::FetchError;

const LIST: &str = "/api/scan/xcm/list";

fn list_url(server: &MockApiServer) -> String {
    format!("{}{}", server.url(), LIST)
}

#[tokio::test]
async fn throttled_request_honours_retry_after_then_succeeds() {
    init_tracing();
    let mock = MockSubscan::new().with_messages(message_rows(0, 3));
    mock.push_fault(Fault::Status {
        status: 429,
        retry_after: Some("0".into()),
    });
    let server = MockApiServer::start(mock.clone()).await.expect("server");
    let client = fast_client(None);

    let body = client
        .post_json(&list_url(&server), &json!({"row": 10, "page": 0}), &fast_policy(3))
        .await
        .expect("second attempt succeeds");

    assert_eq!(body["data"]["count"], 3);
    assert_eq!(body["data"]["list"].as_array().map(Vec::len), Some(3));
    assert_eq!(mock.requests().len(), 2);

    let metrics = client.metrics();
    assert_eq!(metrics.total_requests, 2);
    assert_eq!(metrics.total_throttled, 1);
    assert_eq!(metrics.total_retries, 1);

    server.shutdown().await;
}

#[tokio::test]
async fn persistent_server_errors_exhaust_retries() {
    init_tracing();
    let mock = MockSubscan::new();
    mock.fail_always(Fault::Status {
        status: 503,
        retry_after: None,
    });
    let server = MockApiServer::start(mock.clone()).await.expect("server");
    let client = fast_client(None);

    let err = client
        .post_json(&list_url(&server), &json!({"row": 1, "page": 0}), &fast_policy(2))
        .await
        .expect_err("retries run out");

    assert!(matches!(
        err.downcast_ref::<FetchError>(),
        Some(FetchError::RetryableStatus { status: 503, .. })
    ));
    assert_eq!(mock.requests().len(), 3);
    assert_eq!(client.metrics().total_errors, 3);

    server.shutdown().await;
}

#[tokio::test]
async fn application_errors_fail_without_retry() {
    init_tracing();
    let mock = MockSubscan::new();
    mock.push_fault(Fault::Application {
        code: 10004,
        message: "API rate limit exceeded".into(),
    });
    let server = MockApiServer::start(mock.clone()).await.expect("server");
    let client = fast_client(None);

    let err = client
        .post_json(&list_url(&server), &json!({"row": 1, "page": 0}), &fast_policy(5))
        .await
        .expect_err("non-zero code is fatal");

    match err.downcast_ref::<FetchError>() {
        Some(FetchError::Application { code, message }) => {
            assert_eq!(*code, 10004);
            assert_eq!(message, "API rate limit exceeded");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(mock.requests().len(), 1);

    server.shutdown().await;
}

#[tokio::test]
async fn unknown_path_is_a_client_error() {
    init_tracing();
    let mock = MockSubscan::new();
    let server = MockApiServer::start(mock.clone()).await.expect("server");
    let client = fast_client(None);

    let err = client
        .post_json(
            &format!("{}/api/scan/nope", server.url()),
            &json!({}),
            &fast_policy(5),
        )
        .await
        .expect_err("404 is not retried");

    assert!(matches!(
        err.downcast_ref::<FetchError>(),
        Some(FetchError::ClientStatus { status: 404 })
    ));
    assert_eq!(mock.requests().len(), 1);

    server.shutdown().await;
}

#[tokio::test]
async fn non_json_body_is_a_decode_error() {
    init_tracing();
    let mock = MockSubscan::new();
    mock.push_fault(Fault::Garbage);
    let server = MockApiServer::start(mock.clone()).await.expect("server");
    let client = fast_client(None);

    let err = client
        .post_json(&list_url(&server), &json!({"row": 1, "page": 0}), &fast_policy(5))
        .await
        .expect_err("garbage body");

    assert!(matches!(
        err.downcast_ref::<FetchError>(),
        Some(FetchError::Decode { .. })
    ));
    assert_eq!(mock.requests().len(), 1);

    server.shutdown().await;
}

#[tokio::test]
async fn api_key_travels_as_header() {
    init_tracing();
    let mock = MockSubscan::new().with_messages(message_rows(0, 1));
    let server = MockApiServer::start(mock.clone()).await.expect("server");

    fast_client(Some("secret"))
        .post_json(&list_url(&server), &json!({"row": 1, "page": 0}), &fast_policy(0))
        .await
        .expect("keyed request");
    fast_client(None)
        .post_json(&list_url(&server), &json!({"row": 1, "page": 0}), &fast_policy(0))
        .await
        .expect("anonymous request");

    let requests = mock.requests();
    assert_eq!(requests[0].api_key.as_deref(), Some("secret"));
    assert_eq!(requests[1].api_key, None);
    assert_eq!(requests[0].payload, json!({"row": 1, "page": 0}));

    server.shutdown().await;
}
