use axum::{
    body::{Body, Bytes},
    extract::State,
    http::header,
    response::Response,
};
use axum_extra::extract::CookieJar;
use log::debug;

use crate::{
    auth::{with_session, SessionToken},
    error::RelayError,
    state::AppState,
};

/// `POST /api/chat/all`: buffered JSON pass-through for the chat list.
/// The upstream status and body are mirrored as-is.
pub async fn list_chats(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> Result<Response, RelayError> {
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        Bytes::from_static(b"{}")
    } else {
        serde_json::from_slice::<serde_json::Value>(&body)
            .map_err(|e| RelayError::BadRequest(format!("Invalid request body: {e}")))?;
        body
    };

    let config = &state.config;
    let session = SessionToken::from_jar(&jar, &config.session_cookie, config.auth_policy);
    let upstream = with_session(
        state.client.post(config.upstream_url(&config.chats_path)),
        session.as_ref(),
    )
    .header(header::CONTENT_TYPE, "application/json")
    .body(body)
    .send()
    .await?;

    let status = upstream.status();
    let bytes = upstream.bytes().await?;
    debug!("Chat list upstream answered {status} ({} bytes)", bytes.len());

    let response = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(bytes))?;

    Ok(response)
}
