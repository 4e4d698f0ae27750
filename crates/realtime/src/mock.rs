//! Mock Live Channel Implementation
//!
//! In-process topic hub for tests and local development:
//! - records every broadcast for assertions
//! - injects arrivals as if another participant had published them
//! - simulates connection drops and restores; messages published while a
//!   topic is dropped are lost, never replayed
//! - fails subscribe or broadcast on demand
//!
//! Thread-safe via `Arc<Mutex<>>`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    ConnectionStatus, LiveChannel, LiveConfig, LiveError, LiveEvent, Subscription,
    SubscriptionHandle,
};

/// A payload recorded by [`MockLiveChannel::broadcast`].
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedPayload {
    pub topic: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Default)]
struct HubState {
    topics: HashMap<String, HashMap<Uuid, mpsc::Sender<LiveEvent>>>,
    published: Vec<PublishedPayload>,
    released: Vec<SubscriptionHandle>,
    dropped: HashSet<String>,
    fail_subscribe: bool,
    fail_broadcast: bool,
    echo: bool,
}

/// Mock live channel backed by an in-process topic hub.
#[derive(Debug, Clone)]
pub struct MockLiveChannel {
    state: Arc<Mutex<HubState>>,
    buffer: usize,
}

impl MockLiveChannel {
    /// Create a mock channel that echoes broadcasts back to every subscriber.
    pub fn new() -> Self {
        Self::with_config(LiveConfig::default())
    }

    pub fn with_config(config: LiveConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(HubState {
                echo: true,
                ..HubState::default()
            })),
            buffer: config.buffer.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Return all recorded broadcasts.
    pub fn published(&self) -> Vec<PublishedPayload> {
        self.lock().published.clone()
    }

    /// Return every handle released so far, in release order.
    pub fn released(&self) -> Vec<SubscriptionHandle> {
        self.lock().released.clone()
    }

    /// Number of live subscriptions on a topic.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.lock().topics.get(topic).map_or(0, |subs| subs.len())
    }

    /// Make subsequent `subscribe` calls fail.
    pub fn set_fail_subscribe(&self, fail: bool) {
        self.lock().fail_subscribe = fail;
    }

    /// Make subsequent `broadcast` calls fail.
    pub fn set_fail_broadcast(&self, fail: bool) {
        self.lock().fail_broadcast = fail;
    }

    /// Whether broadcasts are delivered back to subscribers of the topic.
    pub fn set_echo(&self, echo: bool) {
        self.lock().echo = echo;
    }

    /// Deliver a payload to every subscriber of a topic without recording it
    /// as a local broadcast.
    pub async fn inject(&self, topic: &str, payload: serde_json::Value) {
        self.deliver(topic, LiveEvent::Message(payload)).await;
    }

    /// Report `Disconnected` to every subscriber of a topic. Messages for the
    /// topic are discarded until [`Self::restore_connection`].
    pub async fn drop_connection(&self, topic: &str) {
        self.lock().dropped.insert(topic.to_string());
        self.deliver(topic, LiveEvent::Status(ConnectionStatus::Disconnected))
            .await;
    }

    /// Report `Connecting` then `Connected` to every subscriber of a topic.
    pub async fn restore_connection(&self, topic: &str) {
        self.lock().dropped.remove(topic);
        self.deliver(topic, LiveEvent::Status(ConnectionStatus::Connecting))
            .await;
        self.deliver(topic, LiveEvent::Status(ConnectionStatus::Connected))
            .await;
    }

    async fn deliver(&self, topic: &str, event: LiveEvent) {
        // Senders are cloned out so the lock is never held across an await.
        let senders: Vec<mpsc::Sender<LiveEvent>> = {
            let state = self.lock();
            if matches!(event, LiveEvent::Message(_)) && state.dropped.contains(topic) {
                tracing::debug!(topic = %topic, "Mock live channel: connection dropped, message lost");
                return;
            }
            state
                .topics
                .get(topic)
                .map(|subs| subs.values().cloned().collect())
                .unwrap_or_default()
        };

        for tx in senders {
            // A closed receiver just means the subscriber went away.
            let _ = tx.send(event.clone()).await;
        }
    }
}

impl Default for MockLiveChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LiveChannel for MockLiveChannel {
    async fn subscribe(&self, topic: &str) -> Result<Subscription, LiveError> {
        let (tx, rx) = mpsc::channel(self.buffer.max(2));
        let handle = SubscriptionHandle {
            id: Uuid::new_v4(),
            topic: topic.to_string(),
        };

        {
            let mut state = self.lock();
            if state.fail_subscribe {
                return Err(LiveError::Subscribe(
                    "mock subscribe failure".to_string(),
                ));
            }

            // Fresh channel with capacity >= 2, so neither send can fail.
            let _ = tx.try_send(LiveEvent::Status(ConnectionStatus::Connecting));
            let _ = tx.try_send(LiveEvent::Status(ConnectionStatus::Connected));

            state
                .topics
                .entry(topic.to_string())
                .or_default()
                .insert(handle.id, tx);
        }

        tracing::debug!(topic = %topic, subscription_id = %handle.id, "Mock live channel: subscribed");
        Ok(Subscription::new(handle, rx))
    }

    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<bool, LiveError> {
        let mut state = self.lock();

        let removed = state
            .topics
            .get_mut(&handle.topic)
            .and_then(|subs| subs.remove(&handle.id))
            .is_some();

        if removed {
            state.released.push(handle.clone());
            state.topics.retain(|_, subs| !subs.is_empty());
            tracing::debug!(topic = %handle.topic, subscription_id = %handle.id, "Mock live channel: released");
        }

        Ok(removed)
    }

    async fn broadcast(&self, topic: &str, payload: serde_json::Value) -> Result<(), LiveError> {
        let echo = {
            let mut state = self.lock();
            if state.fail_broadcast {
                return Err(LiveError::Broadcast(
                    "mock broadcast failure".to_string(),
                ));
            }
            state.published.push(PublishedPayload {
                topic: topic.to_string(),
                payload: payload.clone(),
            });
            state.echo
        };

        tracing::debug!(topic = %topic, "Mock live channel: recording broadcast");

        if echo {
            self.deliver(topic, LiveEvent::Message(payload)).await;
        }
        Ok(())
    }
}
