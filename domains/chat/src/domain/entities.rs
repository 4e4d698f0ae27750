//! Domain entities for the chat domain
//!
//! Messages are posted into a room either as top-level posts or as replies to
//! another message. `reply_count` is derived by the thread merger and is never
//! read back from storage or the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use threadroom_common::{Error, Result};
use threadroom_realtime::MAX_PAYLOAD_BYTES;

/// Maximum content length in bytes, before encoding. The encoded message is
/// checked separately against [`MAX_PAYLOAD_BYTES`], since JSON escaping can
/// grow content several times over.
pub const MAX_CONTENT_LENGTH: usize = 4000;

/// Maximum author name length
const MAX_AUTHOR_NAME_LENGTH: usize = 100;

/// Name shown for participants who are not signed in
pub const GUEST_NAME: &str = "Guest";

/// Name shown for signed-in participants without a usable profile
pub const ANONYMOUS_NAME: &str = "Anonymous";

/// Message author as shown to other participants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
}

impl Author {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// The local participant of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub authenticated: bool,
}

impl Identity {
    /// A participant who has not signed in; can read but not post
    pub fn guest() -> Self {
        Self {
            name: GUEST_NAME.to_string(),
            authenticated: false,
        }
    }

    /// A signed-in participant. The display name falls back to the local part
    /// of the e-mail address, then to [`ANONYMOUS_NAME`].
    pub fn signed_in(display_name: Option<&str>, email: Option<&str>) -> Self {
        let from_display = display_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        let from_email = || {
            email
                .and_then(|e| e.split('@').next())
                .map(str::trim)
                .filter(|local| !local.is_empty())
                .map(str::to_string)
        };

        let name = from_display
            .or_else(from_email)
            .unwrap_or_else(|| ANONYMOUS_NAME.to_string());

        Self {
            name,
            authenticated: true,
        }
    }

    pub fn author(&self) -> Author {
        Author::new(self.name.clone())
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::guest()
    }
}

/// Message entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub content: String,
    pub author: Author,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Derived by the thread merger; ignored on input
    #[serde(default, skip_deserializing)]
    pub reply_count: usize,
}

impl Message {
    /// Create a new locally-originated message with a fresh id, timestamped now.
    ///
    /// Content is trimmed; an empty or blank `parent_id` means a top-level post.
    pub fn new(author: Author, content: &str, parent_id: Option<&str>) -> Result<Self> {
        let content = content.trim();
        Self::validate_content(content)?;
        Self::validate_author(&author)?;

        let message = Message {
            id: Uuid::new_v4().to_string(),
            content: content.to_string(),
            author,
            created_at: Utc::now(),
            parent_id: normalize_parent(parent_id),
            reply_count: 0,
        };
        message.validate_encoded_size()?;

        Ok(message)
    }

    /// Whether this message is a reply to another message
    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }

    /// Decode a message received from the live channel
    pub fn from_payload(payload: serde_json::Value) -> Result<Self> {
        let mut message: Message = serde_json::from_value(payload)?;
        message.validate()?;
        message.parent_id = normalize_parent(message.parent_id.as_deref());
        Ok(message)
    }

    /// Encode a message for the live channel
    pub fn to_payload(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Validate fields of a message received from outside the session
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::Validation("Message id is required".to_string()));
        }
        Self::validate_content(&self.content)?;
        Self::validate_author(&self.author)
    }

    /// Reject messages whose wire encoding would not fit in one broadcast
    fn validate_encoded_size(&self) -> Result<()> {
        let encoded = serde_json::to_string(self)?.len();
        if encoded > MAX_PAYLOAD_BYTES {
            return Err(Error::Validation(format!(
                "Encoded message is {} bytes; at most {} bytes can be sent",
                encoded, MAX_PAYLOAD_BYTES
            )));
        }
        Ok(())
    }

    /// Validate message content (CHECK (length(trim(content)) > 0))
    fn validate_content(content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Err(Error::Validation(
                "Message content cannot be empty or whitespace-only".to_string(),
            ));
        }
        if content.len() > MAX_CONTENT_LENGTH {
            return Err(Error::Validation(format!(
                "Message content must be at most {} bytes",
                MAX_CONTENT_LENGTH
            )));
        }
        Ok(())
    }

    fn validate_author(author: &Author) -> Result<()> {
        if author.name.trim().is_empty() {
            return Err(Error::Validation("Author name is required".to_string()));
        }
        if author.name.len() > MAX_AUTHOR_NAME_LENGTH {
            return Err(Error::Validation(format!(
                "Author name must be at most {} bytes",
                MAX_AUTHOR_NAME_LENGTH
            )));
        }
        Ok(())
    }
}

fn normalize_parent(parent_id: Option<&str>) -> Option<String> {
    parent_id
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
}
