use axum::{
    body::Bytes,
    extract::{Query, State},
};
use axum_extra::extract::CookieJar;
use futures::stream::{Stream, StreamExt};
use log::{debug, error, info};
use std::{
    collections::HashMap,
    fmt,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    task::{Context, Poll},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::auth::session_owner;
use crate::state::AppState;

/// Outbound body of one relayed exchange.
///
/// Chunks arrive from the relay task in upstream order. Ends cleanly when the
/// upstream finishes or the stream is cancelled, and yields the upstream error
/// if the upstream read fails so the transfer is visibly truncated.
pub struct RelayStream {
    receiver: mpsc::Receiver<Result<Bytes, reqwest::Error>>,
    cancel_token: CancellationToken,
}

impl Stream for RelayStream {
    type Item = Result<Bytes, reqwest::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cancel_token.is_cancelled() {
            return Poll::Ready(None);
        }
        self.receiver.poll_recv(cx)
    }
}

/// Stream id scoped to the session that started the relay, so one session
/// can neither cancel nor supersede another session's relays.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamKey {
    owner: Option<String>,
    id: String,
}

impl StreamKey {
    pub fn new(owner: Option<String>, id: impl Into<String>) -> Self {
        Self {
            owner,
            id: id.into(),
        }
    }

    /// Key for a caller without a session cookie.
    pub fn anonymous(id: impl Into<String>) -> Self {
        Self::new(None, id)
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Registry of in-flight relays, keyed by session and stream id.
#[derive(Clone)]
pub struct SseState {
    cancel_tokens: Arc<dashmap::DashMap<StreamKey, Registration>>,
    next_generation: Arc<AtomicU64>,
}

#[derive(Clone)]
struct Registration {
    generation: u64,
    token: CancellationToken,
}

/// Handle a relay task keeps for its own registry entry.
pub struct StreamTicket {
    pub token: CancellationToken,
    generation: u64,
}

impl Default for SseState {
    fn default() -> Self {
        Self {
            cancel_tokens: Arc::new(dashmap::DashMap::new()),
            next_generation: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl SseState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a stream, superseding (and cancelling) any live stream the
    /// same session started under the same id.
    pub fn register_stream(&self, id: StreamKey) -> StreamTicket {
        let token = CancellationToken::new();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let registration = Registration {
            generation,
            token: token.clone(),
        };
        if let Some(previous) = self.cancel_tokens.insert(id.clone(), registration) {
            info!("Stream {id} re-registered, cancelling previous relay");
            previous.token.cancel();
        }
        StreamTicket { token, generation }
    }

    pub fn cancel_stream(&self, id: &StreamKey) -> bool {
        match self.cancel_tokens.remove(id) {
            Some((_, registration)) => {
                registration.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Drops the entry for `id` only if it still belongs to `ticket`.
    pub fn finish_stream(&self, id: &StreamKey, ticket: &StreamTicket) {
        self.cancel_tokens
            .remove_if(id, |_, registered| registered.generation == ticket.generation);
    }

    pub fn active_streams(&self) -> usize {
        self.cancel_tokens.len()
    }

    pub fn is_active(&self, id: &StreamKey) -> bool {
        self.cancel_tokens.contains_key(id)
    }
}

/// Starts the relay loop for an upstream response that already reported a
/// success status and returns the body stream to hand to the client.
///
/// The loop forwards every upstream chunk unchanged. It stops reading, and
/// drops the upstream response, as soon as the client goes away or the
/// stream is cancelled.
pub fn spawn_relay(
    state: SseState,
    stream_id: StreamKey,
    upstream: reqwest::Response,
    buffer: usize,
) -> RelayStream {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    let ticket = state.register_stream(stream_id.clone());
    let cancel_token = ticket.token.clone();

    tokio::spawn(async move {
        let mut chunks = upstream.bytes_stream();
        let mut relayed = 0usize;

        loop {
            tokio::select! {
                biased;
                _ = ticket.token.cancelled() => {
                    info!("Relay {stream_id} cancelled after {relayed} bytes");
                    break;
                }
                _ = tx.closed() => {
                    info!("Client left relay {stream_id} after {relayed} bytes");
                    break;
                }
                item = chunks.next() => match item {
                    Some(Ok(chunk)) => {
                        relayed += chunk.len();
                        if tx.send(Ok(chunk)).await.is_err() {
                            info!("Client left relay {stream_id} after {relayed} bytes");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        error!("Upstream read failed on relay {stream_id}: {e}");
                        let _ = tx.send(Err(e)).await;
                        break;
                    }
                    None => {
                        debug!("Upstream finished relay {stream_id} ({relayed} bytes)");
                        break;
                    }
                },
            }
        }

        state.finish_stream(&stream_id, &ticket);
    });

    RelayStream {
        receiver: rx,
        cancel_token,
    }
}

/// Cancels one of the caller's own relays. Relays started under another
/// session cookie are reported as unknown.
pub async fn cancel_stream(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<HashMap<String, String>>,
) -> &'static str {
    if let Some(id) = params.get("stream_id") {
        let owner = session_owner(&jar, &state.config.session_cookie);
        let stream_id = StreamKey::new(owner, id.as_str());
        if state.sse_state.cancel_stream(&stream_id) {
            info!("Cancelled stream: {stream_id}");
            "Stream cancelled"
        } else {
            debug!("Cancel requested for unknown stream: {stream_id}");
            "No such stream"
        }
    } else {
        "No stream ID provided"
    }
}
