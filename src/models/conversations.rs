use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One conversation entry as the UI sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub streaming: bool,
    pub created_at: DateTime<Utc>,
}

pub const CONTACT_FAILED_NOTICE: &str = "⚠️ An error occurred while contacting the server.";

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into(), false)
    }

    /// Empty assistant message that tokens will be streamed into.
    pub fn assistant_placeholder() -> Self {
        Self::new(Role::Assistant, String::new(), true)
    }

    /// Synthetic assistant message shown when an exchange failed.
    pub fn contact_failed() -> Self {
        Self::new(Role::Assistant, CONTACT_FAILED_NOTICE.to_string(), false)
    }

    fn new(role: Role, content: String, streaming: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content,
            streaming,
            created_at: Utc::now(),
        }
    }
}

/// Text shown for a user turn: the typed text followed by a markdown image
/// reference per attachment.
pub fn display_content(text: &str, images: &[String]) -> String {
    let image_markdown = images
        .iter()
        .map(|url| format!("![image]({url})"))
        .collect::<Vec<_>>()
        .join("\n\n");

    [text, image_markdown.as_str()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
