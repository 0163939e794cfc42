// Presence pings — broadcast online-status requests to known peers

use crate::relay::RelayConnection;
use parking_lot::RwLock;

/// Triggered once after every successful channel join
pub trait PresenceDispatcher: Send + Sync {
    fn ping_all(&self);
}

const PING_BODY: &str = "ping";

/// Dispatcher that sends a ping to every configured peer topic through the
/// relay connection. The connection is wired in after construction because
/// the connection itself consumes this dispatcher.
pub struct PresencePinger {
    peers: RwLock<Vec<String>>,
    connection: RwLock<Option<RelayConnection>>,
}

impl PresencePinger {
    pub fn new(peers: Vec<String>) -> Self {
        Self {
            peers: RwLock::new(peers),
            connection: RwLock::new(None),
        }
    }

    /// Attach the connection pings are sent through
    pub fn wire(&self, connection: RelayConnection) {
        *self.connection.write() = Some(connection);
    }

    pub fn peers(&self) -> Vec<String> {
        self.peers.read().clone()
    }

    pub fn set_peers(&self, peers: Vec<String>) {
        *self.peers.write() = peers;
    }
}

impl PresenceDispatcher for PresencePinger {
    fn ping_all(&self) {
        let Some(connection) = self.connection.read().clone() else {
            tracing::debug!("presence ping skipped, no connection wired");
            return;
        };

        for peer in self.peers.read().iter().cloned() {
            let connection = connection.clone();
            tokio::spawn(async move {
                if let Err(e) = connection.send(&peer, PING_BODY).await {
                    tracing::debug!(peer = %peer, error = %e, "presence ping failed");
                }
            });
        }
    }
}
