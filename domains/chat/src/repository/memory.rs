//! In-memory message store
//!
//! Implements [`HistoryLoader`] and [`MessageStore`] without a database, for
//! tests and local runs. Failures can be switched on to exercise degraded paths.
//! Thread-safe via `Arc<Mutex<>>`.

use std::sync::{Arc, Mutex, MutexGuard};

use threadroom_common::{Error, Result};

use crate::domain::entities::Message;
use crate::repository::{HistoryLoader, LoadError, MessageStore};

#[derive(Debug, Default)]
struct StoreState {
    rows: Vec<Message>,
    fail_load: bool,
    fail_insert: bool,
    load_calls: usize,
    insert_calls: usize,
}

/// In-memory message store with insert-if-absent semantics
#[derive(Debug, Clone, Default)]
pub struct InMemoryMessageStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with history
    pub fn with_history(messages: Vec<Message>) -> Self {
        let store = Self::new();
        store.lock().rows = messages;
        store
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stored rows in insertion order
    pub fn rows(&self) -> Vec<Message> {
        self.lock().rows.clone()
    }

    /// Make subsequent loads fail
    pub fn set_fail_load(&self, fail: bool) {
        self.lock().fail_load = fail;
    }

    /// Make subsequent inserts fail
    pub fn set_fail_insert(&self, fail: bool) {
        self.lock().fail_insert = fail;
    }

    pub fn load_calls(&self) -> usize {
        self.lock().load_calls
    }

    pub fn insert_calls(&self) -> usize {
        self.lock().insert_calls
    }
}

#[async_trait::async_trait]
impl HistoryLoader for InMemoryMessageStore {
    async fn load(&self, room: &str) -> std::result::Result<Vec<Message>, LoadError> {
        let mut state = self.lock();
        state.load_calls += 1;

        if state.fail_load {
            return Err(LoadError {
                room: room.to_string(),
                source: Error::Internal("in-memory load failure".to_string()),
            });
        }

        let mut rows = state.rows.clone();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(rows)
    }
}

#[async_trait::async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn insert_if_absent(&self, messages: &[Message]) -> Result<u64> {
        let mut state = self.lock();
        state.insert_calls += 1;

        if state.fail_insert {
            return Err(Error::Internal("in-memory insert failure".to_string()));
        }

        let mut inserted = 0;
        for message in messages {
            if state.rows.iter().all(|row| row.id != message.id) {
                let mut row = message.clone();
                row.reply_count = 0;
                state.rows.push(row);
                inserted += 1;
            }
        }

        Ok(inserted)
    }
}
