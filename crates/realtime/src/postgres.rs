//! Postgres LISTEN/NOTIFY Live Channel
//!
//! Each subscription owns a dedicated `PgListener` connection and a pump task
//! that forwards notifications as [`LiveEvent`]s. `broadcast` issues
//! `pg_notify` on the shared pool.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{
    ConnectionStatus, LiveChannel, LiveConfig, LiveError, LiveEvent, Subscription,
    SubscriptionHandle, MAX_PAYLOAD_BYTES,
};

/// Pause between reconnect attempts after the listener connection is lost.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Live channel over Postgres LISTEN/NOTIFY.
pub struct PgLiveChannel {
    pool: PgPool,
    config: LiveConfig,
    listeners: Mutex<HashMap<Uuid, JoinHandle<()>>>,
}

impl PgLiveChannel {
    pub fn new(pool: PgPool, config: LiveConfig) -> Self {
        Self {
            pool,
            config,
            listeners: Mutex::new(HashMap::new()),
        }
    }

    fn listeners(&self) -> MutexGuard<'_, HashMap<Uuid, JoinHandle<()>>> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for PgLiveChannel {
    fn drop(&mut self) {
        for (_, task) in self.listeners().drain() {
            task.abort();
        }
    }
}

#[async_trait::async_trait]
impl LiveChannel for PgLiveChannel {
    async fn subscribe(&self, topic: &str) -> Result<Subscription, LiveError> {
        let channel = self.config.channel_name(topic)?;
        let (tx, rx) = mpsc::channel(self.config.buffer.max(2));

        // Fresh channel with capacity >= 2, so the two status sends below cannot fail.
        let _ = tx.try_send(LiveEvent::Status(ConnectionStatus::Connecting));

        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(|e| LiveError::Subscribe(e.to_string()))?;
        listener
            .listen(&channel)
            .await
            .map_err(|e| LiveError::Subscribe(e.to_string()))?;

        let _ = tx.try_send(LiveEvent::Status(ConnectionStatus::Connected));

        let handle = SubscriptionHandle {
            id: Uuid::new_v4(),
            topic: topic.to_string(),
        };

        let task = tokio::spawn(pump(listener, tx, channel.clone()));
        self.listeners().insert(handle.id, task);

        tracing::info!(topic = %topic, channel = %channel, subscription_id = %handle.id, "Listening for live messages");
        Ok(Subscription::new(handle, rx))
    }

    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<bool, LiveError> {
        let task = self.listeners().remove(&handle.id);

        match task {
            Some(task) => {
                // Aborting drops the sender, which ends the subscriber's stream.
                task.abort();
                tracing::info!(topic = %handle.topic, subscription_id = %handle.id, "Live subscription released");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn broadcast(&self, topic: &str, payload: serde_json::Value) -> Result<(), LiveError> {
        let channel = self.config.channel_name(topic)?;
        let body = payload.to_string();

        if body.len() > MAX_PAYLOAD_BYTES {
            return Err(LiveError::Payload(format!(
                "Payload of {} bytes exceeds the {} byte notification limit",
                body.len(),
                MAX_PAYLOAD_BYTES
            )));
        }

        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(&channel)
            .bind(&body)
            .execute(&self.pool)
            .await
            .map_err(|e| LiveError::Broadcast(e.to_string()))?;

        tracing::debug!(channel = %channel, bytes = body.len(), "Live message broadcast");
        Ok(())
    }
}

/// Forward notifications until the subscriber goes away or the task is aborted.
async fn pump(mut listener: PgListener, tx: mpsc::Sender<LiveEvent>, channel: String) {
    loop {
        let received = tokio::select! {
            _ = tx.closed() => return,
            received = listener.try_recv() => received,
        };

        let event = match received {
            Ok(Some(notification)) => {
                match serde_json::from_str::<serde_json::Value>(notification.payload()) {
                    Ok(payload) => LiveEvent::Message(payload),
                    Err(e) => {
                        tracing::warn!(channel = %channel, error = %e, "Dropping malformed live payload");
                        continue;
                    }
                }
            }
            Ok(None) => {
                tracing::warn!(channel = %channel, "Live connection lost");
                if tx
                    .send(LiveEvent::Status(ConnectionStatus::Disconnected))
                    .await
                    .is_err()
                {
                    return;
                }
                if !reconnect(&mut listener, &tx, &channel).await {
                    return;
                }
                continue;
            }
            Err(e) => {
                tracing::warn!(channel = %channel, error = %e, "Live listener error");
                if tx
                    .send(LiveEvent::Status(ConnectionStatus::Disconnected))
                    .await
                    .is_err()
                {
                    return;
                }
                if !reconnect(&mut listener, &tx, &channel).await {
                    return;
                }
                continue;
            }
        };

        if tx.send(event).await.is_err() {
            return;
        }
    }
}

/// Re-establish the listener connection, reporting `Connecting` on each attempt
/// and `Connected` once it succeeds. Returns `false` if the subscriber went away.
///
/// Executing a query through the listener reconnects it and re-issues LISTEN.
/// Notifications sent while disconnected are not recovered.
async fn reconnect(
    listener: &mut PgListener,
    tx: &mpsc::Sender<LiveEvent>,
    channel: &str,
) -> bool {
    loop {
        if tx
            .send(LiveEvent::Status(ConnectionStatus::Connecting))
            .await
            .is_err()
        {
            return false;
        }

        match sqlx::query("SELECT 1").execute(&mut *listener).await {
            Ok(_) => {
                tracing::info!(channel = %channel, "Live connection restored");
                return tx
                    .send(LiveEvent::Status(ConnectionStatus::Connected))
                    .await
                    .is_ok();
            }
            Err(e) => {
                tracing::warn!(channel = %channel, error = %e, "Live reconnect failed");
                if tx
                    .send(LiveEvent::Status(ConnectionStatus::Disconnected))
                    .await
                    .is_err()
                {
                    return false;
                }
                tokio::select! {
                    _ = tx.closed() => return false,
                    _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                }
            }
        }
    }
}
