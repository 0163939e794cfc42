// Sotto Core — relay chat client spine
//
// The connection owns a socket + channel pair against the relay server,
// pushes pre-encrypted chat payloads, and routes inbound chat events to the
// message processor. Everything else here exists to feed that connection.

pub mod config;
pub mod identity;
pub mod intl;
pub mod message;
pub mod presence;
pub mod relay;
pub mod store;
pub mod wire;

pub use config::ClientConfig;
pub use identity::{Identity, IdentityManager, IdentityStore};
pub use intl::{Catalog, Localizer};
pub use message::{ChatDelegate, ChatProcessor, MessageProcessor};
pub use presence::{PresenceDispatcher, PresencePinger};
pub use relay::{
    channel_topic, Collaborators, ConnectionInfo, RelayConnection, RelayDirectory, RelayInfo,
    SendError, SessionState, StaticRelayDirectory, Status, StatusLevel,
};
pub use store::{HistoryManager, MemoryStorage, MessageRecord, SledStorage, StorageBackend};
