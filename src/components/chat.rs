use futures::stream::{Stream, StreamExt};
use log::{debug, error, info};
use reqwest::{Client, StatusCode};
use thiserror::Error;

use crate::components::messagelist::Conversation;
use crate::components::stream::{parse_payload, SseFramer, StreamEvent};
use crate::models::conversations::{display_content, Message};
use crate::types::{ChatRequest, ErrorBody, UploadResponse};

pub const CHAT_ENDPOINT: &str = "/api/chat";
pub const CANCEL_ENDPOINT: &str = "/api/chat/cancel";
pub const UPLOAD_ENDPOINT: &str = "/api/upload";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Relay answered {0}")]
    Status(StatusCode),
    #[error("Upload failed: {0}")]
    Upload(String),
}

/// Clears the streaming flag of one message when dropped, so the flag is
/// released on success, on error and when the exchange future is abandoned.
struct StreamingGuard<'a> {
    conversation: &'a Conversation,
    message_id: &'a str,
}

impl Drop for StreamingGuard<'_> {
    fn drop(&mut self) {
        if self.conversation.finish_streaming(self.message_id) {
            debug!("Message {} finished streaming", self.message_id);
        }
    }
}

/// Feeds a chunked byte stream through the SSE framer and appends every
/// token to `message_id`, in stream order.
///
/// Malformed or token-less payloads are skipped. Returns the first transport
/// error; tokens appended before it stay in place.
pub async fn consume_stream<S, B, E>(
    chunks: S,
    conversation: &Conversation,
    message_id: &str,
) -> Result<(), E>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    futures::pin_mut!(chunks);
    let mut framer = SseFramer::new();

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        for payload in framer.push(chunk.as_ref()) {
            match parse_payload(&payload) {
                Ok(StreamEvent::Token(token)) => {
                    conversation.append_token(message_id, &token);
                }
                Ok(StreamEvent::Done) => {}
                Err(e) => debug!("Skipping event payload: {e}"),
            }
        }
    }

    if !framer.pending().trim().is_empty() {
        debug!("Stream ended inside an event, dropping {} chars", framer.pending().len());
    }

    Ok(())
}

/// Client half of the chat relay: submits messages, streams the replies
/// into a [`Conversation`].
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    relay_url: String,
    conversation: Conversation,
}

impl ChatClient {
    pub fn new(relay_url: impl Into<String>, conversation: Conversation) -> Self {
        Self::with_client(Client::new(), relay_url, conversation)
    }

    pub fn with_client(client: Client, relay_url: impl Into<String>, conversation: Conversation) -> Self {
        Self {
            client,
            relay_url: relay_url.into().trim_end_matches('/').to_string(),
            conversation,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Adds the user turn and its assistant placeholder, then streams the
    /// reply. On failure a notice message is appended after the partial
    /// reply. Returns the assistant message id, which is also the relay
    /// stream id usable with [`ChatClient::cancel`].
    pub async fn send_message(&self, text: &str, images: Vec<String>) -> Result<String, ChatError> {
        let (_, assistant_id) = self.conversation.begin_exchange(display_content(text, &images));
        let request = ChatRequest::new(text).with_images(images);

        if let Err(e) = self.stream_reply(&request, &assistant_id).await {
            error!("Streaming error: {e}");
            self.conversation.push(Message::contact_failed());
            return Err(e);
        }

        Ok(assistant_id)
    }

    /// Streams the relay's answer to `request` into an existing streaming
    /// message.
    pub async fn stream_reply(&self, request: &ChatRequest, assistant_id: &str) -> Result<(), ChatError> {
        let _streaming = StreamingGuard {
            conversation: &self.conversation,
            message_id: assistant_id,
        };

        let response = self
            .client
            .post(format!("{}{CHAT_ENDPOINT}", self.relay_url))
            .query(&[("stream_id", assistant_id)])
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChatError::Status(status));
        }

        consume_stream(response.bytes_stream(), &self.conversation, assistant_id).await?;
        info!("Reply {assistant_id} complete");
        Ok(())
    }

    pub async fn cancel(&self, stream_id: &str) -> Result<(), ChatError> {
        let response = self
            .client
            .post(format!("{}{CANCEL_ENDPOINT}", self.relay_url))
            .query(&[("stream_id", stream_id)])
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            status => Err(ChatError::Status(status)),
        }
    }

    /// Uploads an attachment and returns the URL to put in `images`.
    pub async fn upload_image(&self, file_name: &str, bytes: Vec<u8>) -> Result<String, ChatError> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(format!("{}{UPLOAD_ENDPOINT}", self.relay_url))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let reason = response
                .json::<ErrorBody>()
                .await
                .map(|body| body.error)
                .unwrap_or_else(|_| status.to_string());
            return Err(ChatError::Upload(reason));
        }

        Ok(response.json::<UploadResponse>().await?.url)
    }
}
