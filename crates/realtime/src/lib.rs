//! Threadroom Live Channel
//!
//! Provides room-scoped push subscriptions with support for:
//! - Postgres LISTEN/NOTIFY transport for production
//! - Mock in-process hub for testing and development
//! - Connection state reporting (connecting, connected, disconnected)
//!
//! Payloads are `serde_json::Value`; domains serialize their own types.
//! Missed events are never replayed after a reconnect.

pub mod mock;
pub mod postgres;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Postgres truncates identifiers (and therefore channel names) at 63 bytes.
pub const MAX_CHANNEL_NAME_BYTES: usize = 63;

/// Largest encoded payload a broadcast may carry; NOTIFY rejects 8000 bytes or more.
pub const MAX_PAYLOAD_BYTES: usize = 7999;

#[derive(Error, Debug)]
pub enum LiveError {
    #[error("Live channel configuration error: {0}")]
    Configuration(String),

    #[error("Live channel subscribe error: {0}")]
    Subscribe(String),

    #[error("Live channel broadcast error: {0}")]
    Broadcast(String),

    #[error("Live channel payload error: {0}")]
    Payload(String),
}

/// Connection state reported by a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Event delivered to a subscriber, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    /// A newly-created message published on the topic
    Message(serde_json::Value),
    /// Connection state transition
    Status(ConnectionStatus),
}

/// Identifies one subscription; passed back to [`LiveChannel::unsubscribe`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    pub id: Uuid,
    pub topic: String,
}

/// An active subscription: its handle plus the receiving end of its event stream.
///
/// The stream ends once the subscription is released.
#[derive(Debug)]
pub struct Subscription {
    handle: SubscriptionHandle,
    events: mpsc::Receiver<LiveEvent>,
}

impl Subscription {
    pub fn new(handle: SubscriptionHandle, events: mpsc::Receiver<LiveEvent>) -> Self {
        Self { handle, events }
    }

    pub fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }

    /// Receive the next event; `None` once the subscription is released.
    pub async fn recv(&mut self) -> Option<LiveEvent> {
        self.events.recv().await
    }

    /// Split into the handle (kept by the owner) and the stream (moved into a pump task).
    pub fn into_parts(self) -> (SubscriptionHandle, mpsc::Receiver<LiveEvent>) {
        (self.handle, self.events)
    }
}

/// Live channel configuration.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// Live channel provider (postgres, mock)
    pub provider: String,
    /// Prefix joined to the room topic to form the transport channel name
    pub topic_prefix: String,
    /// Per-subscription event buffer
    pub buffer: usize,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            topic_prefix: "room:".to_string(),
            buffer: 256,
        }
    }
}

impl LiveConfig {
    /// Create live channel config from environment variables.
    pub fn from_env() -> Result<Self, LiveError> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let provider = std::env::var("LIVE_PROVIDER").unwrap_or(defaults.provider);
        let topic_prefix = std::env::var("LIVE_TOPIC_PREFIX").unwrap_or(defaults.topic_prefix);

        let buffer = match std::env::var("LIVE_BUFFER") {
            Ok(raw) => raw.parse::<usize>().map_err(|_| {
                LiveError::Configuration(format!("LIVE_BUFFER must be a positive integer: {raw}"))
            })?,
            Err(_) => defaults.buffer,
        };

        if buffer == 0 {
            return Err(LiveError::Configuration(
                "LIVE_BUFFER must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            provider,
            topic_prefix,
            buffer,
        })
    }

    /// Transport channel name for a room topic.
    ///
    /// The room name is a client-side convention only; isolation between rooms
    /// rests entirely on distinct channel names.
    pub fn channel_name(&self, topic: &str) -> Result<String, LiveError> {
        if topic.trim().is_empty() {
            return Err(LiveError::Configuration(
                "Topic name cannot be empty".to_string(),
            ));
        }

        let name = format!("{}{}", self.topic_prefix, topic);
        if name.len() > MAX_CHANNEL_NAME_BYTES {
            return Err(LiveError::Configuration(format!(
                "Channel name must be at most {} bytes: {}",
                MAX_CHANNEL_NAME_BYTES, name
            )));
        }

        Ok(name)
    }
}

/// Live channel trait for different transports.
#[async_trait::async_trait]
pub trait LiveChannel: Send + Sync {
    /// Subscribe to a room topic.
    ///
    /// The first events on a fresh subscription are `Connecting` then `Connected`.
    async fn subscribe(&self, topic: &str) -> Result<Subscription, LiveError>;

    /// Release a subscription. Returns `true` if this call released it and
    /// `false` if it was already released; no events are produced afterwards.
    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<bool, LiveError>;

    /// Publish a payload to every subscriber of a topic.
    async fn broadcast(&self, topic: &str, payload: serde_json::Value) -> Result<(), LiveError>;
}

/// Factory for creating LiveChannel implementations.
pub struct LiveChannelFactory;

impl LiveChannelFactory {
    /// Create a LiveChannel based on configuration.
    ///
    /// The postgres provider requires a pool; the mock provider ignores it.
    pub fn create(
        config: LiveConfig,
        pool: Option<sqlx::PgPool>,
    ) -> Result<Box<dyn LiveChannel>, LiveError> {
        match config.provider.as_str() {
            "postgres" => {
                let pool = pool.ok_or_else(|| {
                    LiveError::Configuration(
                        "A database pool is required for the postgres provider".to_string(),
                    )
                })?;
                tracing::info!("Creating Postgres live channel");
                Ok(Box::new(postgres::PgLiveChannel::new(pool, config)))
            }
            "mock" => {
                tracing::info!("Creating mock live channel");
                Ok(Box::new(mock::MockLiveChannel::with_config(config)))
            }
            provider => Err(LiveError::Configuration(format!(
                "Unknown live provider: {}. Supported providers: postgres, mock",
                provider
            ))),
        }
    }
}
