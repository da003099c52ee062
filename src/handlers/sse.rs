use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::Response,
};
use axum_extra::extract::CookieJar;
use futures::StreamExt;
use log::{debug, info, warn};
use std::{collections::HashMap, time::Duration};

use crate::{
    auth::{session_owner, with_session, SessionToken},
    cancellable_sse::{spawn_relay, StreamKey},
    error::RelayError,
    state::AppState,
    types::ChatRequest,
};

pub const STREAM_ID_HEADER: &str = "x-stream-id";

/// Longest upstream error body echoed back when the upstream refuses a chat.
const MAX_ERROR_BODY: usize = 4 * 1024;

/// How long a refusing upstream gets to deliver its error body.
const ERROR_BODY_TIMEOUT: Duration = Duration::from_secs(1);

/// `POST /api/chat`: forwards the chat request upstream and relays the
/// upstream event stream back byte for byte.
pub async fn relay_chat(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<Response, RelayError> {
    let request: ChatRequest = serde_json::from_slice(&body)
        .map_err(|e| RelayError::BadRequest(format!("Invalid chat request: {e}")))?;

    let stream_id = params
        .get("stream_id")
        .filter(|id| !id.is_empty())
        .cloned()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let stream_header = HeaderValue::from_str(&stream_id)
        .map_err(|_| RelayError::BadRequest(format!("invalid stream id: {stream_id}")))?;

    info!(
        "Relaying chat {stream_id}: {} chars, {} image(s)",
        request.message.chars().count(),
        request.images.len()
    );

    let config = &state.config;
    let session = SessionToken::from_jar(&jar, &config.session_cookie, config.auth_policy);
    let url = config.upstream_url(&config.chat_path);

    // The caller's bytes go upstream untouched, not the re-serialized struct.
    let upstream = with_session(state.client.post(&url), session.as_ref())
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .send()
        .await?;

    let status = upstream.status();
    if !status.is_success() {
        let text = read_error_body(upstream).await;
        warn!("Upstream refused chat {stream_id} with {status}");
        return Err(RelayError::UpstreamStatus { status, body: text });
    }

    debug!("Upstream accepted chat {stream_id}, starting relay");
    let key = StreamKey::new(session_owner(&jar, &config.session_cookie), stream_id);
    let stream = spawn_relay(
        state.sse_state.clone(),
        key,
        upstream,
        config.relay_buffer,
    );

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header(STREAM_ID_HEADER, stream_header)
        .body(Body::from_stream(stream))?;

    Ok(response)
}

/// Reads at most `MAX_ERROR_BODY` bytes of a refusal body, giving up after
/// `ERROR_BODY_TIMEOUT`. The upstream response is dropped on return.
async fn read_error_body(upstream: reqwest::Response) -> String {
    let mut collected = Vec::new();
    let mut chunks = upstream.bytes_stream();

    let read = async {
        while let Some(Ok(chunk)) = chunks.next().await {
            collected.extend_from_slice(&chunk);
            if collected.len() >= MAX_ERROR_BODY {
                break;
            }
        }
    };
    if tokio::time::timeout(ERROR_BODY_TIMEOUT, read).await.is_err() {
        debug!("Upstream error body still open after {ERROR_BODY_TIMEOUT:?}, cutting it off");
    }

    let mut text = String::from_utf8_lossy(&collected).into_owned();
    truncate_at_char_boundary(&mut text, MAX_ERROR_BODY);
    text
}

fn truncate_at_char_boundary(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
}
