//! Fire-and-forget persistence
//!
//! A failed write is logged and swallowed: the message stays visible for the
//! current session but will be missing from the next history load.

use std::sync::Arc;

use crate::domain::entities::Message;
use crate::repository::MessageStore;

#[derive(Clone)]
pub struct MessageSink {
    store: Arc<dyn MessageStore>,
}

impl MessageSink {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }

    /// Durably record messages. Never fails.
    pub async fn persist(&self, messages: Vec<Message>) {
        if messages.is_empty() {
            return;
        }

        match self.store.insert_if_absent(&messages).await {
            Ok(inserted) => {
                tracing::debug!(
                    submitted = messages.len(),
                    inserted,
                    "Messages persisted"
                );
            }
            Err(e) => {
                let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
                tracing::error!(
                    error = %e,
                    error_code = e.error_code(),
                    message_ids = ?ids,
                    "Failed to persist messages"
                );
            }
        }
    }
}
