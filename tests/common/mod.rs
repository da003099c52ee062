#![allow(dead_code)]

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chat_relay::app::create_router;
use chat_relay::config::RelayConfig;
use chat_relay::state::AppState;

/// The example stream from the wire format description, cut mid-event,
/// mid-line and mid-delimiter.
pub const HELLO_CHUNKS: [&str; 3] = [
    "data: {\"token\":\"Hel",
    "lo\"}\n\ndata: {\"tok",
    "en\":\" world\"}\n\n",
];

/// Every byte value, cut into chunks of uneven sizes that split multi-byte
/// sequences and the event delimiter alike.
pub fn binary_chunks() -> Vec<Vec<u8>> {
    let mut bytes: Vec<u8> = b"data: {\"token\":\"".to_vec();
    bytes.extend((0..=255u8).cycle().take(1000));
    bytes.extend_from_slice("é€\"}\n\n".as_bytes());

    let sizes = [1, 7, 2, 13, 64, 3, 255, 1, 31];
    let mut chunks = Vec::new();
    let mut rest = bytes.as_slice();
    for size in sizes.iter().cycle() {
        if rest.is_empty() {
            break;
        }
        let (chunk, tail) = rest.split_at((*size).min(rest.len()));
        chunks.push(chunk.to_vec());
        rest = tail;
    }
    chunks
}

#[derive(Default)]
pub struct Recorded {
    pub bodies: Mutex<Vec<Bytes>>,
    pub authorization: Mutex<Vec<Option<String>>>,
    pub slow_stream_dropped: AtomicBool,
}

impl Recorded {
    fn record(&self, headers: &HeaderMap, body: Bytes) {
        self.bodies.lock().unwrap().push(body);
        self.authorization.lock().unwrap().push(
            headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        );
    }

    pub fn last_body(&self) -> Bytes {
        self.bodies.lock().unwrap().last().cloned().unwrap()
    }

    pub fn last_authorization(&self) -> Option<String> {
        self.authorization.lock().unwrap().last().cloned().unwrap()
    }
}

fn event_stream(chunks: Vec<Result<Bytes, std::io::Error>>) -> Response {
    let body = stream::iter(chunks).then(|chunk| async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        chunk
    });
    ([(header::CONTENT_TYPE, "text/event-stream")], Body::from_stream(body)).into_response()
}

/// `/chat/send`: streams tokens chosen by the request's `message`.
async fn send(State(recorded): State<Arc<Recorded>>, headers: HeaderMap, body: Bytes) -> Response {
    recorded.record(&headers, body.clone());
    let request: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

    match request["message"].as_str().unwrap_or_default() {
        "refuse" => (StatusCode::SERVICE_UNAVAILABLE, "model overloaded").into_response(),
        // Refusal whose body never ends.
        "busy" => {
            let body = stream::unfold((), |()| async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Some((Ok::<_, std::io::Error>(Bytes::from_static(b"data: {\"error\":\"busy\"}\n\n")), ()))
            });
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [(header::CONTENT_TYPE, "text/event-stream")],
                Body::from_stream(body),
            )
                .into_response()
        }
        // Refusal with an endless, fast body.
        "flood" => {
            let body = stream::repeat_with(|| Ok::<_, std::io::Error>(Bytes::from(vec![b'x'; 1024])));
            (StatusCode::INTERNAL_SERVER_ERROR, Body::from_stream(body)).into_response()
        }
        "binary" => event_stream(binary_chunks().into_iter().map(|c| Ok(Bytes::from(c))).collect()),
        "break" => event_stream(vec![
            Ok(Bytes::from_static(b"data: {\"token\":\"partial\"}\n\n")),
            Err(std::io::Error::other("generation crashed")),
        ]),
        "malformed" => event_stream(
            ["data: {\"token\":\"A\"}\n\n", "data: not-json\n\n", "data: {\"token\":\"B\"}\n\n"]
                .into_iter()
                .map(|c| Ok(Bytes::from_static(c.as_bytes())))
                .collect(),
        ),
        _ => event_stream(
            HELLO_CHUNKS
                .into_iter()
                .map(|c| Ok(Bytes::from_static(c.as_bytes())))
                .collect(),
        ),
    }
}

/// Marks the slow stream as released when hyper drops it.
struct DropFlag(Arc<Recorded>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.slow_stream_dropped.store(true, Ordering::SeqCst);
    }
}

/// `/chat/slow`: one token, then heartbeats until the reader goes away.
async fn slow(State(recorded): State<Arc<Recorded>>, headers: HeaderMap, body: Bytes) -> Response {
    recorded.record(&headers, body);
    let flag = DropFlag(recorded.clone());

    let first = stream::once(async { Ok::<_, std::io::Error>(Bytes::from_static(b"data: {\"token\":\"first\"}\n\n")) });
    let heartbeats = stream::unfold(flag, |flag| async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Some((Ok(Bytes::from_static(b": ping\n\n")), flag))
    });

    (
        [(header::CONTENT_TYPE, "text/event-stream")],
        Body::from_stream(first.chain(heartbeats)),
    )
        .into_response()
}

async fn all(State(recorded): State<Arc<Recorded>>, headers: HeaderMap, body: Bytes) -> Response {
    recorded.record(&headers, body);
    if headers.get(header::AUTHORIZATION).is_none() {
        return (StatusCode::UNAUTHORIZED, Json(json!({"detail": "Not authenticated"}))).into_response();
    }
    Json(json!([{"id": 1, "title": "first chat"}])).into_response()
}

async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

pub async fn spawn_upstream() -> (String, Arc<Recorded>) {
    let recorded = Arc::new(Recorded::default());
    let router = Router::new()
        .route("/chat/send", post(send))
        .route("/chat/slow", post(slow))
        .route("/chat/all", post(all))
        .with_state(recorded.clone());
    let addr = serve(router).await;
    (format!("http://{addr}"), recorded)
}

/// Address nothing is listening on.
pub async fn closed_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

pub fn relay_config(api_url: &str) -> RelayConfig {
    RelayConfig {
        api_url: api_url.to_string(),
        upload_dir: std::env::temp_dir().join(format!("chat-relay-{}", uuid::Uuid::new_v4())),
        ..RelayConfig::default()
    }
}

pub fn relay_state(config: RelayConfig) -> AppState {
    AppState::new(config).unwrap()
}

/// Runs the relay on an ephemeral port and returns its base URL.
pub async fn spawn_relay(state: AppState) -> String {
    let addr = serve(create_router(state)).await;
    format!("http://{addr}")
}
