//! Repository implementations for the chat domain
//!
//! The session depends on two narrow seams: [`HistoryLoader`] to read the full
//! room history once per session and [`MessageStore`] to durably record
//! locally-originated messages. [`MessageRepository`] implements both over
//! Postgres; [`InMemoryMessageStore`] implements both for tests and local runs.

pub mod memory;
pub mod messages;

use sqlx::PgPool;
use thiserror::Error;

use crate::domain::entities::Message;

pub use memory::InMemoryMessageStore;
pub use messages::MessageRepository;

/// History could not be loaded; the session falls back to an empty base.
#[derive(Debug, Error)]
#[error("Failed to load history for room {room}: {source}")]
pub struct LoadError {
    pub room: String,
    #[source]
    pub source: threadroom_common::Error,
}

/// Reads the persisted history of a room
#[async_trait::async_trait]
pub trait HistoryLoader: Send + Sync {
    /// All messages, ascending by `created_at`
    async fn load(&self, room: &str) -> Result<Vec<Message>, LoadError>;
}

/// Durable, idempotent message writes
#[async_trait::async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert each message whose id is not stored yet; existing rows are left
    /// untouched. Returns the number of rows inserted.
    async fn insert_if_absent(&self, messages: &[Message]) -> threadroom_common::Result<u64>;
}

/// Combined repository access for the chat domain
#[derive(Clone)]
pub struct ChatRepositories {
    pub messages: MessageRepository,
}

impl ChatRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            messages: MessageRepository::new(pool),
        }
    }
}
