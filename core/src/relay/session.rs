// Session state machine and channel naming
//
// The establish flow is Disconnected → Connecting → Joining → Connected.
// Errored is entered when the establish operation itself fails and, like
// Disconnected, accepts a fresh connect().

use std::fmt;

/// Connection session states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No establishment in flight
    Disconnected,
    /// Socket handshake in progress
    Connecting,
    /// Socket open, channel join pushed, awaiting acknowledgment
    Joining,
    /// Channel joined
    Connected,
    /// Establishment failed before a socket existed
    Errored,
}

impl SessionState {
    /// True if a connect() call is accepted in this state.
    /// At most one establishment is in flight: a second call while
    /// Connecting/Joining/Connected is dropped, not queued.
    pub fn accepts_connect(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Errored)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Joining => "joining",
            Self::Connected => "connected",
            Self::Errored => "errored",
        };
        write!(f, "{name}")
    }
}

/// Severity of a status update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Error,
}

/// Last connection status update. Last-write-wins, no history retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub level: StatusLevel,
    pub message: String,
}

impl Status {
    /// Initial status before any connect() has run
    pub fn idle() -> Self {
        Self {
            level: StatusLevel::Info,
            message: String::new(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Error,
            message: message.into(),
        }
    }
}

/// Derive the channel topic for a public key: `user:<hex(publicKey)>`, or
/// `room:<roomName>,user:<hexPublicKey>` when a room is configured.
pub fn channel_topic(public_key: &[u8], room: Option<&str>) -> String {
    let user = format!("user:{}", hex::encode(public_key));
    match room {
        Some(room) => format!("room:{room},{user}"),
        None => user,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_user_topic_from_key_bytes() {
        assert_eq!(channel_topic(&[0xAB, 0xCD], None), "user:abcd");
    }

    #[test]
    fn test_room_topic_format() {
        assert_eq!(
            channel_topic(&[0xAB, 0xCD], Some("lobby")),
            "room:lobby,user:abcd"
        );
    }

    #[test]
    fn test_accepts_connect_only_when_idle() {
        assert!(SessionState::Disconnected.accepts_connect());
        assert!(SessionState::Errored.accepts_connect());
        assert!(!SessionState::Connecting.accepts_connect());
        assert!(!SessionState::Joining.accepts_connect());
        assert!(!SessionState::Connected.accepts_connect());
    }

    #[test]
    fn test_state_display_names() {
        assert_eq!(SessionState::Joining.to_string(), "joining");
        assert_eq!(SessionState::Errored.to_string(), "errored");
    }

    #[test]
    fn test_status_idle_is_info() {
        let status = Status::idle();
        assert_eq!(status.level, StatusLevel::Info);
        assert!(status.message.is_empty());
    }

    proptest! {
        #[test]
        fn prop_user_topic_is_hex_of_key(key in proptest::collection::vec(any::<u8>(), 1..64)) {
            let topic = channel_topic(&key, None);
            prop_assert_eq!(topic, format!("user:{}", hex::encode(&key)));
        }
    }
}
