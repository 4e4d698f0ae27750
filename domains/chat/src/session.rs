//! Chat session
//!
//! Owns one room's lifecycle: subscribes to the live channel, loads history
//! once, keeps the live set, and recomputes the unified view on each defined
//! event (load-complete, message-arrival, local-send, connection change).
//!
//! Every mutation of session data happens inside one mutex-guarded
//! append-then-recompute step, and snapshots are published while that lock is
//! held, so subscribers observe mutations in order. Once `leave` has marked
//! the session closed, no event is applied and no snapshot is published.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use threadroom_common::{Error, Result};
use threadroom_realtime::{ConnectionStatus, LiveChannel, LiveEvent, SubscriptionHandle};

use crate::domain::entities::{Identity, Message};
use crate::domain::state::{ConnectionEvent, ConnectionState, ConnectionStateMachine};
use crate::domain::thread::{ThreadMerger, UnifiedView};
use crate::repository::{HistoryLoader, MessageStore};
use crate::sink::MessageSink;

/// Maximum room name length in bytes
pub const MAX_ROOM_NAME_LENGTH: usize = 50;

/// External services a session depends on, passed in explicitly at join time
#[derive(Clone)]
pub struct ChatServices {
    pub history: Arc<dyn HistoryLoader>,
    pub store: Arc<dyn MessageStore>,
    pub live: Arc<dyn LiveChannel>,
}

/// Result of [`ChatSession::send`]; everything but `Sent` is a no-op
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Appended to the live set; broadcast and persistence are in flight
    Sent(Message),
    /// Content was empty or whitespace-only
    EmptyContent,
    /// The live channel is not connected
    NotConnected,
    /// The local participant is not signed in
    NotAuthenticated,
    /// The message failed validation
    Invalid(String),
    /// The session has left the room
    Closed,
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent(_))
    }
}

/// What subscribers observe after each event
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub room: String,
    pub state: ConnectionState,
    pub authenticated: bool,
    pub view: Arc<UnifiedView>,
    pub loading: bool,
    pub load_error: Option<String>,
}

struct SessionData {
    state: ConnectionState,
    identity: Identity,
    persisted: Vec<Message>,
    live: Vec<Message>,
    view: Arc<UnifiedView>,
    loading: bool,
    load_error: Option<String>,
    closed: bool,
}

impl SessionData {
    fn new(identity: Identity) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            identity,
            persisted: Vec::new(),
            live: Vec::new(),
            view: Arc::new(UnifiedView::default()),
            loading: false,
            load_error: None,
            closed: false,
        }
    }
}

/// State shared between the session handle and its live pump task
struct Shared {
    room: String,
    data: Mutex<SessionData>,
    updates: watch::Sender<SessionSnapshot>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionData> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn snapshot(room: &str, data: &SessionData) -> SessionSnapshot {
        SessionSnapshot {
            room: room.to_string(),
            state: data.state,
            authenticated: data.identity.authenticated,
            view: Arc::clone(&data.view),
            loading: data.loading,
            load_error: data.load_error.clone(),
        }
    }

    fn publish(&self, data: &SessionData) {
        self.updates.send_replace(Self::snapshot(&self.room, data));
    }

    fn recompute(&self, data: &mut SessionData) {
        data.view = Arc::new(ThreadMerger::merge(&data.persisted, &data.live));
        self.publish(data);
    }

    fn transition(&self, data: &mut SessionData, event: ConnectionEvent) {
        match ConnectionStateMachine::transition(data.state, event) {
            Ok(next) => {
                tracing::debug!(room = %self.room, from = %data.state, to = %next, event = %event, "Connection state changed");
                data.state = next;
            }
            Err(e) => {
                tracing::debug!(room = %self.room, error = %e, "Ignoring connection event");
            }
        }
    }

    /// Append a live arrival and recompute. Returns `false` once closed.
    fn apply_arrival(&self, message: Message) -> bool {
        let mut data = self.lock();
        if data.closed {
            return false;
        }

        if data.live.iter().any(|m| m.id == message.id) {
            tracing::debug!(room = %self.room, message_id = %message.id, "Duplicate live arrival");
            return true;
        }

        tracing::debug!(room = %self.room, message_id = %message.id, "Live message arrived");
        data.live.push(message);
        self.recompute(&mut data);
        true
    }

    /// Apply a connection status reported by the channel. Returns `false` once closed.
    fn apply_status(&self, status: ConnectionStatus) -> bool {
        let mut data = self.lock();
        if data.closed {
            return false;
        }

        let reported = ConnectionState::from(status);
        if reported == data.state {
            return true;
        }

        let event = ConnectionEvent::from_status(status);
        match ConnectionStateMachine::transition(data.state, event) {
            Ok(next) => data.state = next,
            Err(e) => {
                // The channel is authoritative about its own connection.
                tracing::warn!(room = %self.room, error = %e, reported = %reported, "Adopting reported connection state");
                data.state = reported;
            }
        }

        match data.state {
            ConnectionState::Connected => tracing::info!(room = %self.room, "Live channel connected"),
            ConnectionState::Disconnected => {
                tracing::warn!(room = %self.room, "Live channel disconnected; missed messages need a history reload")
            }
            ConnectionState::Connecting => tracing::debug!(room = %self.room, "Live channel connecting"),
        }

        self.publish(&data);
        true
    }

    fn stream_ended(&self) {
        let mut data = self.lock();
        if data.closed || data.state == ConnectionState::Disconnected {
            return;
        }
        tracing::warn!(room = %self.room, "Live event stream ended");
        self.transition(&mut data, ConnectionEvent::Drop);
        self.publish(&data);
    }
}

/// A participant's session in one room
pub struct ChatSession {
    shared: Arc<Shared>,
    services: ChatServices,
    sink: MessageSink,
    runtime: Handle,
    subscription: Mutex<Option<SubscriptionHandle>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl ChatSession {
    /// Join a room: subscribe to the live channel, then load history.
    ///
    /// Subscribing first means nothing published during the load is missed;
    /// anything seen on both paths is de-duplicated by the merge. Channel and
    /// history failures leave the session usable in a degraded state.
    pub async fn join(room: &str, services: ChatServices, identity: Identity) -> Result<Self> {
        let room = validate_room(room)?;

        let data = SessionData::new(identity);
        let (updates, _) = watch::channel(Shared::snapshot(&room, &data));

        let session = Self {
            shared: Arc::new(Shared {
                room,
                data: Mutex::new(data),
                updates,
            }),
            sink: MessageSink::new(Arc::clone(&services.store)),
            services,
            runtime: Handle::current(),
            subscription: Mutex::new(None),
            pump: Mutex::new(None),
        };

        tracing::info!(room = %session.shared.room, "Joining room");

        session.connect().await;
        session.reload_history().await;

        Ok(session)
    }

    pub fn room(&self) -> &str {
        &self.shared.room
    }

    /// Current unified view
    pub fn view(&self) -> Arc<UnifiedView> {
        Arc::clone(&self.shared.lock().view)
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    /// Current snapshot (the same value subscribers last observed)
    pub fn snapshot(&self) -> SessionSnapshot {
        let data = self.shared.lock();
        Shared::snapshot(&self.shared.room, &data)
    }

    /// Subscribe to snapshots published on each defined event
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.updates.subscribe()
    }

    /// Replace the local participant (e.g. after signing in or out)
    pub fn set_identity(&self, identity: Identity) {
        let mut data = self.shared.lock();
        if data.closed || data.identity == identity {
            return;
        }
        tracing::info!(room = %self.shared.room, name = %identity.name, authenticated = identity.authenticated, "Identity changed");
        data.identity = identity;
        self.shared.publish(&data);
    }

    /// Post a message, or a reply when `parent_id` is given.
    ///
    /// Accepted only while connected and signed in, with non-blank content.
    /// The message is visible in the view before this returns; broadcast and
    /// persistence run in the background and are never awaited.
    pub fn send(&self, content: &str, parent_id: Option<&str>) -> SendOutcome {
        let message = {
            let mut data = self.shared.lock();

            if data.closed {
                return SendOutcome::Closed;
            }
            if content.trim().is_empty() {
                return SendOutcome::EmptyContent;
            }
            if !data.state.can_send() {
                tracing::debug!(room = %self.shared.room, state = %data.state, "Send ignored while not connected");
                return SendOutcome::NotConnected;
            }
            if !data.identity.authenticated {
                tracing::debug!(room = %self.shared.room, "Send ignored for guest");
                return SendOutcome::NotAuthenticated;
            }

            let message = match Message::new(data.identity.author(), content, parent_id) {
                Ok(message) => message,
                Err(e) => return SendOutcome::Invalid(e.to_string()),
            };

            data.live.push(message.clone());
            self.shared.recompute(&mut data);
            message
        };

        tracing::debug!(room = %self.shared.room, message_id = %message.id, reply = message.is_reply(), "Message sent");
        self.fan_out(message.clone());
        SendOutcome::Sent(message)
    }

    /// Re-fetch history. This is the only way to recover messages missed while
    /// disconnected; it is never triggered automatically.
    ///
    /// On failure the previous base history is kept and `load_error` is set.
    pub async fn reload_history(&self) {
        {
            let mut data = self.shared.lock();
            if data.closed {
                return;
            }
            data.loading = true;
            self.shared.publish(&data);
        }

        let result = self.services.history.load(&self.shared.room).await;

        let mut data = self.shared.lock();
        if data.closed {
            return;
        }
        data.loading = false;

        match result {
            Ok(history) => {
                tracing::info!(room = %self.shared.room, count = history.len(), "History loaded");
                data.persisted = history;
                data.load_error = None;
            }
            Err(e) => {
                tracing::warn!(room = %self.shared.room, error = %e, "History load failed; continuing with live messages only");
                data.load_error = Some(e.to_string());
            }
        }

        self.shared.recompute(&mut data);
    }

    /// Leave the room: release the live subscription exactly once and stop the
    /// pump. Idempotent. After this returns no event is applied.
    pub async fn leave(&self) {
        {
            let mut data = self.shared.lock();
            if data.closed {
                return;
            }
            self.shared.transition(&mut data, ConnectionEvent::Leave);
            self.shared.publish(&data);
            data.closed = true;
        }

        let handle = self.subscription_slot().take();
        if let Some(handle) = handle {
            match self.services.live.unsubscribe(&handle).await {
                Ok(released) => {
                    tracing::debug!(room = %self.shared.room, subscription_id = %handle.id, released, "Live subscription released")
                }
                Err(e) => {
                    tracing::warn!(room = %self.shared.room, error = %e, "Failed to release live subscription")
                }
            }
        }

        let pump = self.pump_slot().take();
        if let Some(task) = pump {
            task.abort();
            let _ = task.await;
        }

        tracing::info!(room = %self.shared.room, "Left room");
    }

    /// Subscribe again after the subscribe at join failed or the event stream
    /// ended.
    ///
    /// A subscription that is still running is left to its transport, which
    /// re-establishes dropped connections itself. Returns whether a new
    /// subscription was made.
    pub async fn reconnect(&self) -> bool {
        let finished = self
            .pump_slot()
            .as_ref()
            .is_some_and(|task| task.is_finished());
        if finished {
            self.pump_slot().take();
            let stale = self.subscription_slot().take();
            if let Some(handle) = stale {
                if let Err(e) = self.services.live.unsubscribe(&handle).await {
                    tracing::warn!(room = %self.shared.room, error = %e, "Failed to release ended subscription");
                }
            }
        }

        let connected = self.connect().await;
        if connected {
            tracing::info!(room = %self.shared.room, "Reconnected to live channel");
        }
        connected
    }

    async fn connect(&self) -> bool {
        {
            let mut data = self.shared.lock();
            if data.closed
                || data.state != ConnectionState::Disconnected
                || self.subscription_slot().is_some()
            {
                return false;
            }
            self.shared.transition(&mut data, ConnectionEvent::Connect);
            self.shared.publish(&data);
        }

        let subscription = match self.services.live.subscribe(&self.shared.room).await {
            Ok(subscription) => subscription,
            Err(e) => {
                tracing::warn!(room = %self.shared.room, error = %e, "Live subscribe failed; sending disabled");
                let mut data = self.shared.lock();
                if !data.closed {
                    self.shared.transition(&mut data, ConnectionEvent::Drop);
                    self.shared.publish(&data);
                }
                return false;
            }
        };

        let (handle, events) = subscription.into_parts();
        {
            let data = self.shared.lock();
            if !data.closed {
                *self.subscription_slot() = Some(handle);
                let task = self
                    .runtime
                    .spawn(pump(Arc::clone(&self.shared), events));
                *self.pump_slot() = Some(task);
                return true;
            }
        }

        // Left while subscribing.
        if let Err(e) = self.services.live.unsubscribe(&handle).await {
            tracing::warn!(room = %self.shared.room, error = %e, "Failed to release live subscription");
        }
        false
    }

    fn fan_out(&self, message: Message) {
        let live = Arc::clone(&self.services.live);
        let sink = self.sink.clone();
        let room = self.shared.room.clone();
        let payload = message.to_payload();

        self.runtime.spawn(async move {
            let broadcast = async {
                match payload {
                    Ok(payload) => {
                        if let Err(e) = live.broadcast(&room, payload).await {
                            tracing::warn!(room = %room, error = %e, "Failed to broadcast message");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(room = %room, error = %e, "Failed to encode message for broadcast");
                    }
                }
            };
            tokio::join!(broadcast, sink.persist(vec![message]));
        });
    }

    fn subscription_slot(&self) -> MutexGuard<'_, Option<SubscriptionHandle>> {
        self.subscription.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn pump_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pump.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        {
            let mut data = self.shared.lock();
            if data.closed {
                return;
            }
            data.closed = true;
        }

        if let Some(task) = self.pump_slot().take() {
            task.abort();
        }

        if let Some(handle) = self.subscription_slot().take() {
            let live = Arc::clone(&self.services.live);
            self.runtime.spawn(async move {
                if let Err(e) = live.unsubscribe(&handle).await {
                    tracing::warn!(error = %e, "Failed to release live subscription on drop");
                }
            });
        }
    }
}

/// Forward live events into the session until the stream ends or the session closes
async fn pump(shared: Arc<Shared>, mut events: mpsc::Receiver<LiveEvent>) {
    while let Some(event) = events.recv().await {
        let open = match event {
            LiveEvent::Message(payload) => match Message::from_payload(payload) {
                Ok(message) => shared.apply_arrival(message),
                Err(e) => {
                    tracing::warn!(room = %shared.room, error = %e, "Dropping invalid live message");
                    true
                }
            },
            LiveEvent::Status(status) => shared.apply_status(status),
        };

        if !open {
            return;
        }
    }

    shared.stream_ended();
}

fn validate_room(room: &str) -> Result<String> {
    let room = room.trim();
    if room.is_empty() {
        return Err(Error::Validation("Room name is required".to_string()));
    }
    if room.len() > MAX_ROOM_NAME_LENGTH {
        return Err(Error::Validation(format!(
            "Room name must be at most {} bytes",
            MAX_ROOM_NAME_LENGTH
        )));
    }
    Ok(room.to_string())
}
