use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::post,
    Router,
};
use tower_http::services::ServeDir;

use crate::cancellable_sse::cancel_stream;
use crate::handlers::{list_chats, relay_chat, upload_file, UPLOAD_URL_PREFIX};
use crate::middleware::tracing::trace_requests;
use crate::state::AppState;

/// Largest accepted upload, in bytes.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn create_router(state: AppState) -> Router {
    let uploads = ServeDir::new(&state.config.upload_dir);

    Router::new()
        .route("/api/chat", post(relay_chat))
        .route("/api/chat/cancel", post(cancel_stream))
        .route("/api/chat/all", post(list_chats))
        .route(
            "/api/upload",
            post(upload_file).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .nest_service(UPLOAD_URL_PREFIX, uploads)
        .layer(middleware::from_fn(trace_requests))
        .with_state(state)
}
