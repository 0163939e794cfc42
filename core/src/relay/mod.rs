// Relay session — socket + channel lifecycle against the relay server

pub mod connection;
pub mod directory;
pub mod session;

pub use connection::{Collaborators, ConnectionInfo, RelayConnection, SendError};
pub use directory::{RelayDirectory, RelayInfo, StaticRelayDirectory};
pub use session::{channel_topic, SessionState, Status, StatusLevel};
