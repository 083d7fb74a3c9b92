use std::{
    collections::VecDeque,
    convert::Infallible,
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::{body, Body, Method, Request, Response, Server, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const LIST_PATH: &str = "/api/scan/xcm/list";
const CHANNELS_PATH: &str = "/api/scan/xcm/channels";
const STAT_PATH: &str = "/api/scan/xcm/parachain/stat";

pub const GENERATED_AT: i64 = 1_717_171_717;

/// Canned misbehaviour served instead of a normal response.
#[derive(Debug, Clone)]
pub enum Fault {
    Status {
        status: u16,
        retry_after: Option<String>,
    },
    /// HTTP 200 with a non-zero envelope code.
    Application { code: i64, message: String },
    /// HTTP 200 with a body that is not JSON.
    Garbage,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub payload: Value,
    pub api_key: Option<String>,
}

/// Scripted upstream for one ecosystem.
#[derive(Clone, Default)]
pub struct MockSubscan {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    /// Newest first, as upstream lists them.
    messages: Vec<Value>,
    reported_total: Option<u64>,
    channels: Vec<Value>,
    relay_out: Vec<Value>,
    relay_in: Vec<Value>,
    faults: VecDeque<Fault>,
    persistent_fault: Option<Fault>,
    requests: Vec<RecordedRequest>,
}

impl MockSubscan {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.inner.lock().expect("mock state poisoned")
    }

    pub fn with_messages(self, rows: Vec<Value>) -> Self {
        self.state().messages = rows;
        self
    }

    /// Prepends newer rows, as fresh upstream activity would.
    pub fn publish_newer(&self, mut rows: Vec<Value>) {
        let mut state = self.state();
        rows.append(&mut state.messages);
        state.messages = rows;
    }

    /// Overrides `data.count`; defaults to the number of rows.
    pub fn report_total(&self, total: u64) {
        self.state().reported_total = Some(total);
    }

    pub fn with_channels(self, rows: Vec<Value>) -> Self {
        self.state().channels = rows;
        self
    }

    pub fn with_relay_stats(self, downward: Vec<Value>, upward: Vec<Value>) -> Self {
        {
            let mut state = self.state();
            state.relay_out = downward;
            state.relay_in = upward;
        }
        self
    }

    /// Queues a fault for the next request, whatever its path.
    pub fn push_fault(&self, fault: Fault) {
        self.state().faults.push_back(fault);
    }

    /// Serves `fault` for every request from now on.
    pub fn fail_always(&self, fault: Fault) {
        self.state().persistent_fault = Some(fault);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state().requests.clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.path == path)
            .collect()
    }

    fn respond(&self, path: &str, payload: &Value) -> (StatusCode, Option<String>, String) {
        let mut state = self.state();
        let fault = state
            .faults
            .pop_front()
            .or_else(|| state.persistent_fault.clone());
        if let Some(fault) = fault {
            return render_fault(fault);
        }

        let body = match path {
            LIST_PATH => state.list_page(payload),
            CHANNELS_PATH => {
                envelope(json!({ "count": state.channels.len(), "list": state.channels }))
            }
            STAT_PATH => {
                let rows = match payload["direction"].as_str() {
                    Some("out") => state.relay_out.clone(),
                    Some("in") => state.relay_in.clone(),
                    _ => return (StatusCode::BAD_REQUEST, None, "unknown direction".into()),
                };
                envelope(Value::Array(rows))
            }
            _ => return (StatusCode::NOT_FOUND, None, "not found".into()),
        };
        (StatusCode::OK, None, body.to_string())
    }
}

impl MockState {
    fn list_page(&self, payload: &Value) -> Value {
        let row = payload["row"].as_u64().unwrap_or(10) as usize;
        let start = match payload.get("after_id") {
            Some(after) => self
                .messages
                .iter()
                .position(|message| message["unique_id"] == *after)
                .map(|index| index + 1)
                .unwrap_or(self.messages.len()),
            None => payload["page"].as_u64().unwrap_or(0) as usize * row,
        };
        let list: Vec<Value> = self.messages.iter().skip(start).take(row).cloned().collect();
        let count = self.reported_total.unwrap_or(self.messages.len() as u64);
        let list = if list.is_empty() { Value::Null } else { Value::Array(list) };
        envelope(json!({ "count": count, "list": list }))
    }
}

fn envelope(data: Value) -> Value {
    json!({
        "code": 0,
        "message": "Success",
        "generated_at": GENERATED_AT,
        "data": data,
    })
}

fn render_fault(fault: Fault) -> (StatusCode, Option<String>, String) {
    match fault {
        Fault::Status {
            status,
            retry_after,
        } => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            retry_after,
            "upstream unavailable".into(),
        ),
        Fault::Application { code, message } => (
            StatusCode::OK,
            None,
            json!({ "code": code, "message": message, "data": null }).to_string(),
        ),
        Fault::Garbage => (StatusCode::OK, None, "<html>maintenance</html>".into()),
    }
}

pub struct MockApiServer {
    url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockApiServer {
    pub async fn start(mock: MockSubscan) -> Result<Self> {
        Self::start_on("127.0.0.1", mock).await
    }

    /// Binds loopback but advertises `host` in the URL, so two servers can
    /// stand in for two differently named ecosystems.
    pub async fn start_on(host: &str, mock: MockSubscan) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind mock API listener")?;
        let addr = listener
            .local_addr()
            .context("failed to read mock listener address")?;
        let std_listener = listener
            .into_std()
            .context("failed to convert mock listener")?;
        std_listener
            .set_nonblocking(true)
            .context("failed to set mock listener non-blocking")?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let make_service = make_service_fn(move |_| {
            let mock = mock.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| serve_request(mock.clone(), req)))
            }
        });

        let server = Server::from_tcp(std_listener)
            .context("failed to build mock HTTP server")?
            .serve(make_service);
        let graceful = server.with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });

        let handle = tokio::spawn(async move {
            if let Err(err) = graceful.await {
                eprintln!("mock API server stopped: {err}");
            }
        });

        Ok(Self {
            url: format!("http://{host}:{}", addr.port()),
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

async fn serve_request(
    mock: MockSubscan,
    req: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    if req.method() != Method::POST {
        let mut response = Response::new(Body::from("Unsupported method"));
        *response.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
        return Ok(response);
    }

    let path = req.uri().path().to_owned();
    let api_key = req
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    let bytes = match body::to_bytes(req.into_body()).await {
        Ok(bytes) => bytes,
        Err(err) => {
            let mut response = Response::new(Body::from(format!("failed to read body: {err}")));
            *response.status_mut() = StatusCode::BAD_REQUEST;
            return Ok(response);
        }
    };

    let payload: Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(err) => {
            let mut response = Response::new(Body::from(format!("invalid JSON payload: {err}")));
            *response.status_mut() = StatusCode::BAD_REQUEST;
            return Ok(response);
        }
    };

    mock.state().requests.push(RecordedRequest {
        path: path.clone(),
        payload: payload.clone(),
        api_key,
    });

    let (status, retry_after, body) = mock.respond(&path, &payload);
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    if let Some(value) = retry_after {
        if let Ok(value) = hyper::header::HeaderValue::from_str(&value) {
            response.headers_mut().insert(hyper::header::RETRY_AFTER, value);
        }
    }
    Ok(response)
}
