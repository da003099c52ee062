use axum::extract::FromRef;
use reqwest::Client;
use std::sync::Arc;

use crate::cancellable_sse::SseState;
use crate::config::RelayConfig;

#[derive(FromRef, Clone)]
pub struct AppState {
    pub config: Arc<RelayConfig>,
    pub client: Client,
    pub sse_state: SseState,
}

impl AppState {
    pub fn new(config: RelayConfig) -> Result<Self, reqwest::Error> {
        // No overall request timeout: relayed streams stay open as long as
        // the upstream keeps generating.
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            config: Arc::new(config),
            client,
            sse_state: SseState::new(),
        })
    }
}
