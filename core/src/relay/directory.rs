// Relay address resolution

/// Address record for one relay server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayInfo {
    /// WebSocket endpoint, e.g. `wss://relay.example/socket/websocket`
    pub socket_url: String,
}

/// Resolves the relay the connection should dial
pub trait RelayDirectory: Send + Sync {
    fn relay(&self) -> Option<RelayInfo>;
}

/// Directory backed by a fixed, configuration-supplied relay list.
/// Serves the first entry; an empty list resolves to nothing.
pub struct StaticRelayDirectory {
    relays: Vec<RelayInfo>,
}

impl StaticRelayDirectory {
    pub fn new(socket_urls: Vec<String>) -> Self {
        Self {
            relays: socket_urls
                .into_iter()
                .map(|socket_url| RelayInfo { socket_url })
                .collect(),
        }
    }
}

impl RelayDirectory for StaticRelayDirectory {
    fn relay(&self) -> Option<RelayInfo> {
        self.relays.first().cloned()
    }
}
