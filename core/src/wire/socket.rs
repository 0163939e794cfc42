// WebSocket session to the relay server
//
// One spawned task per socket: it performs the handshake, then splits the
// stream into a reader half (decodes frames, emits events) and a writer task
// (fed by a command queue, answers WS pings, sends the close frame on
// shutdown). Every emitted event carries the generation id it was spawned
// with so a superseded socket's late events can be discarded.

use super::frame::Frame;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// What a socket task reports back to its owner
#[derive(Debug)]
pub enum SocketEventKind {
    /// Handshake completed, the socket is ready for frames
    Opened,
    /// A decoded channel frame arrived
    Frame(Frame),
    /// Transport-level failure; a `Closed` event follows
    Error(String),
    /// The socket is gone (clean close, handshake failure, or error)
    Closed,
}

/// A socket event tagged with the generation of the socket that produced it
#[derive(Debug)]
pub struct SocketEvent {
    pub generation: u64,
    pub kind: SocketEventKind,
}

enum SocketCommand {
    Frame(Frame),
    Pong(Vec<u8>),
    Close,
}

/// Non-blocking handle to a spawned socket task
#[derive(Clone)]
pub struct SocketHandle {
    generation: u64,
    commands: mpsc::UnboundedSender<SocketCommand>,
}

impl SocketHandle {
    /// Queue a frame for sending. Returns false if the socket task is gone.
    pub fn send(&self, frame: Frame) -> bool {
        self.commands.send(SocketCommand::Frame(frame)).is_ok()
    }

    /// Request a clean close. Best-effort: the task may already be gone.
    pub fn close(&self) {
        let _ = self.commands.send(SocketCommand::Close);
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Append the auth uid and protocol version to a relay socket URL.
/// Authority-only URLs get a `/` path: the WS handshake request target
/// must not start with `?`.
pub fn socket_url(base: &str, uid: &str) -> String {
    let authority_start = base.find("://").map_or(0, |i| i + 3);
    let (head, tail) = match base[authority_start..].find(['/', '?']) {
        Some(i) => base.split_at(authority_start + i),
        None => (base, ""),
    };
    let path = if tail.starts_with('/') { "" } else { "/" };
    let sep = if tail.contains('?') { '&' } else { '?' };
    format!("{head}{path}{tail}{sep}uid={uid}&vsn=2.0.0")
}

/// Spawn a socket task for `url`, reporting events on `events`
pub fn spawn(
    generation: u64,
    url: String,
    events: mpsc::UnboundedSender<SocketEvent>,
) -> SocketHandle {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let handle = SocketHandle {
        generation,
        commands: cmd_tx.clone(),
    };

    tokio::spawn(run_socket(generation, url, events, cmd_tx, cmd_rx));

    handle
}

async fn run_socket(
    generation: u64,
    url: String,
    events: mpsc::UnboundedSender<SocketEvent>,
    cmd_tx: mpsc::UnboundedSender<SocketCommand>,
    mut cmd_rx: mpsc::UnboundedReceiver<SocketCommand>,
) {
    let emit = |kind: SocketEventKind| {
        let _ = events.send(SocketEvent { generation, kind });
    };

    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            tracing::warn!(generation, error = %e, "socket handshake failed");
            emit(SocketEventKind::Error(e.to_string()));
            emit(SocketEventKind::Closed);
            return;
        }
    };

    tracing::debug!(generation, "socket opened");
    emit(SocketEventKind::Opened);

    let (mut sink, mut source) = stream.split();

    let writer = tokio::spawn(async move {
        while let Some(cmd) = cmd_rx.recv().await {
            let result = match cmd {
                SocketCommand::Frame(frame) => sink.send(Message::Text(frame.encode())).await,
                SocketCommand::Pong(data) => sink.send(Message::Pong(data)).await,
                SocketCommand::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            };
            if result.is_err() {
                break;
            }
        }
    });

    while let Some(item) = source.next().await {
        match item {
            Ok(Message::Text(text)) => match Frame::decode(&text) {
                Ok(frame) => emit(SocketEventKind::Frame(frame)),
                Err(e) => {
                    tracing::warn!(generation, error = %e, "dropping undecodable frame");
                }
            },
            Ok(Message::Ping(data)) => {
                let _ = cmd_tx.send(SocketCommand::Pong(data));
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(generation, error = %e, "socket transport error");
                emit(SocketEventKind::Error(e.to_string()));
                break;
            }
        }
    }

    tracing::debug!(generation, "socket closed");
    emit(SocketEventKind::Closed);
    writer.abort();
}
