use std::sync::Arc;
use tokio::sync::watch;

use crate::components::latex::clean_latex;
use crate::models::conversations::Message;

/// Observable conversation state shared between the UI and the exchanges
/// streaming into it.
///
/// Every mutation is keyed by message id, so concurrent exchanges writing to
/// different assistant messages never interfere. Observers get the whole
/// list through [`Conversation::subscribe`].
#[derive(Clone)]
pub struct Conversation {
    messages: Arc<watch::Sender<Vec<Message>>>,
}

impl Default for Conversation {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(Vec::new());
        Self {
            messages: Arc::new(tx),
        }
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Message>> {
        self.messages.subscribe()
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.borrow().clone()
    }

    pub fn get(&self, id: &str) -> Option<Message> {
        self.messages.borrow().iter().find(|m| m.id == id).cloned()
    }

    /// Adds the user's message and an empty streaming assistant placeholder
    /// in one update. Returns `(user_id, assistant_id)`.
    pub fn begin_exchange(&self, user_content: impl Into<String>) -> (String, String) {
        let user = Message::user(user_content);
        let assistant = Message::assistant_placeholder();
        let ids = (user.id.clone(), assistant.id.clone());

        self.messages.send_modify(|messages| {
            messages.push(user);
            messages.push(assistant);
        });

        ids
    }

    pub fn push(&self, message: Message) {
        self.messages.send_modify(|messages| messages.push(message));
    }

    /// Appends a token to a streaming message and re-cleans its math
    /// delimiters. Ignored once the message has stopped streaming.
    pub fn append_token(&self, id: &str, token: &str) -> bool {
        if token.is_empty() {
            return false;
        }

        self.messages.send_if_modified(|messages| {
            match messages.iter_mut().find(|m| m.id == id && m.streaming) {
                Some(message) => {
                    message.content.push_str(token);
                    message.content = clean_latex(&message.content);
                    true
                }
                None => false,
            }
        })
    }

    /// Clears the streaming flag. Returns `true` only for the call that
    /// actually cleared it.
    pub fn finish_streaming(&self, id: &str) -> bool {
        self.messages.send_if_modified(|messages| {
            match messages.iter_mut().find(|m| m.id == id && m.streaming) {
                Some(message) => {
                    message.streaming = false;
                    true
                }
                None => false,
            }
        })
    }

    pub fn is_streaming(&self) -> bool {
        self.messages.borrow().iter().any(|m| m.streaming)
    }

    pub fn len(&self) -> usize {
        self.messages.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
