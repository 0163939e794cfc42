// Wire protocol — channel frames multiplexed over one WebSocket

pub mod frame;
pub mod socket;

pub use frame::{parse_reply, Frame, FrameError, Reply, ReplyStatus};
pub use socket::{SocketEvent, SocketEventKind, SocketHandle};
