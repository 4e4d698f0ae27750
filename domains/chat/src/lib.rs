//! Chat domain: room sessions, threaded message views, history and live sync

pub mod domain;
pub mod repository;
pub mod session;
pub mod sink;

// Re-export domain types at the crate root for convenience
pub use domain::entities::{Author, Identity, Message};
pub use domain::state::{ConnectionEvent, ConnectionState, ConnectionStateMachine, StateError};
pub use domain::thread::{Thread, ThreadMerger, UnifiedView};

// Re-export repository types
pub use repository::{
    ChatRepositories, HistoryLoader, InMemoryMessageStore, LoadError, MessageRepository,
    MessageStore,
};

// Re-export session types
pub use session::{ChatServices, ChatSession, SendOutcome, SessionSnapshot};
pub use sink::MessageSink;
