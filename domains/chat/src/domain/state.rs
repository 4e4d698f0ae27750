//! State machine for a session's live connection
//!
//! Connection states: Disconnected → Connecting → Connected → Disconnected.
//! A drop may happen while connecting; leaving is valid from any state.

pub use threadroom_common::StateError;
use serde::{Deserialize, Serialize};
use threadroom_realtime::ConnectionStatus;

/// Connection states of a chat session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    /// Get all valid next states from current state
    pub fn valid_transitions(&self) -> &'static [ConnectionState] {
        match self {
            Self::Disconnected => &[Self::Connecting, Self::Disconnected],
            Self::Connecting => &[Self::Connected, Self::Disconnected],
            Self::Connected => &[Self::Disconnected],
        }
    }

    /// Whether a send may be accepted in this state
    pub fn can_send(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

impl From<ConnectionStatus> for ConnectionState {
    fn from(status: ConnectionStatus) -> Self {
        match status {
            ConnectionStatus::Connecting => Self::Connecting,
            ConnectionStatus::Connected => Self::Connected,
            ConnectionStatus::Disconnected => Self::Disconnected,
        }
    }
}

/// Events that trigger connection state transitions
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConnectionEvent {
    /// Start (or restart) connecting to the live channel
    Connect,
    /// The live channel confirmed the subscription
    Established,
    /// The live channel lost its connection
    Drop,
    /// The session is leaving the room
    Leave,
}

impl ConnectionEvent {
    /// The event that corresponds to a status reported by the live channel
    pub fn from_status(status: ConnectionStatus) -> Self {
        match status {
            ConnectionStatus::Connecting => Self::Connect,
            ConnectionStatus::Connected => Self::Established,
            ConnectionStatus::Disconnected => Self::Drop,
        }
    }
}

impl std::fmt::Display for ConnectionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::Established => write!(f, "established"),
            Self::Drop => write!(f, "drop"),
            Self::Leave => write!(f, "leave"),
        }
    }
}

/// Connection state machine
pub struct ConnectionStateMachine;

impl ConnectionStateMachine {
    /// Attempt a state transition
    pub fn transition(
        current: ConnectionState,
        event: ConnectionEvent,
    ) -> Result<ConnectionState, StateError> {
        let next = match (&current, &event) {
            (ConnectionState::Disconnected, ConnectionEvent::Connect) => {
                ConnectionState::Connecting
            }
            (ConnectionState::Connecting, ConnectionEvent::Established) => {
                ConnectionState::Connected
            }
            (ConnectionState::Connecting, ConnectionEvent::Drop)
            | (ConnectionState::Connected, ConnectionEvent::Drop) => ConnectionState::Disconnected,
            (_, ConnectionEvent::Leave) => ConnectionState::Disconnected,
            _ => {
                return Err(StateError::InvalidTransition {
                    from: current.to_string(),
                    to: "unknown".to_string(),
                    event: event.to_string(),
                });
            }
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnected_to_connecting() {
        let result = ConnectionStateMachine::transition(
            ConnectionState::Disconnected,
            ConnectionEvent::Connect,
        );
        assert_eq!(result, Ok(ConnectionState::Connecting));
    }

    #[test]
    fn test_connecting_to_connected() {
        let result = ConnectionStateMachine::transition(
            ConnectionState::Connecting,
            ConnectionEvent::Established,
        );
        assert_eq!(result, Ok(ConnectionState::Connected));
    }

    #[test]
    fn test_connected_drop_to_disconnected() {
        let result =
            ConnectionStateMachine::transition(ConnectionState::Connected, ConnectionEvent::Drop);
        assert_eq!(result, Ok(ConnectionState::Disconnected));
    }

    #[test]
    fn test_connecting_drop_to_disconnected() {
        let result =
            ConnectionStateMachine::transition(ConnectionState::Connecting, ConnectionEvent::Drop);
        assert_eq!(result, Ok(ConnectionState::Disconnected));
    }

    #[test]
    fn test_leave_from_any_state() {
        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
        ] {
            assert_eq!(
                ConnectionStateMachine::transition(state, ConnectionEvent::Leave),
                Ok(ConnectionState::Disconnected)
            );
        }
    }

    #[test]
    fn test_disconnected_cannot_establish() {
        let result = ConnectionStateMachine::transition(
            ConnectionState::Disconnected,
            ConnectionEvent::Established,
        );
        assert!(matches!(result, Err(StateError::InvalidTransition { .. })));
    }

    #[test]
    fn test_connected_cannot_connect_again() {
        let result = ConnectionStateMachine::transition(
            ConnectionState::Connected,
            ConnectionEvent::Connect,
        );
        assert!(matches!(result, Err(StateError::InvalidTransition { .. })));
    }

    #[test]
    fn test_disconnected_cannot_drop() {
        let result = ConnectionStateMachine::transition(
            ConnectionState::Disconnected,
            ConnectionEvent::Drop,
        );
        assert!(matches!(result, Err(StateError::InvalidTransition { .. })));
    }

    #[test]
    fn test_only_connected_can_send() {
        assert!(ConnectionState::Connected.can_send());
        assert!(!ConnectionState::Connecting.can_send());
        assert!(!ConnectionState::Disconnected.can_send());
    }

    #[test]
    fn test_default_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_event_from_status() {
        assert_eq!(
            ConnectionEvent::from_status(ConnectionStatus::Connecting),
            ConnectionEvent::Connect
        );
        assert_eq!(
            ConnectionEvent::from_status(ConnectionStatus::Connected),
            ConnectionEvent::Established
        );
        assert_eq!(
            ConnectionEvent::from_status(ConnectionStatus::Disconnected),
            ConnectionEvent::Drop
        );
    }

    #[test]
    fn test_connected_valid_transitions() {
        let transitions = ConnectionState::Connected.valid_transitions();
        assert_eq!(transitions, &[ConnectionState::Disconnected]);
    }
}
