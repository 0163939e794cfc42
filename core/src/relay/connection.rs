// Relay connection — owns the socket + channel lifecycle
//
// A single actor task owns all connection state and processes commands from
// handles, events from the socket task, and its own deadlines in one select
// loop. Handles are cheap clones over the command queue and the status
// watch.
//
// One deliberately preserved quirk: a channel join that is rejected or
// times out is logged but never settled. Sends parked behind the join stay
// parked and the session stays in Joining; callers race their own deadline.

use super::directory::RelayDirectory;
use super::session::{channel_topic, SessionState, Status, StatusLevel};
use crate::config::ClientConfig;
use crate::identity::Identity;
use crate::intl::Localizer;
use crate::message::MessageProcessor;
use crate::presence::PresenceDispatcher;
use crate::wire::frame::{
    self, parse_reply, Frame, ReplyStatus, CHAT_EVENT, PHOENIX_TOPIC,
};
use crate::wire::socket::{self, SocketEvent, SocketEventKind, SocketHandle};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

/// Send failure modes surfaced to callers
#[derive(Debug, Error)]
pub enum SendError {
    /// No socket and no channel name: connect() never ran or could not run
    #[error("{0}")]
    NotConnected(String),
    /// The relay acknowledged the push with an error payload
    #[error("Send rejected by relay: {0}")]
    Rejected(Value),
    /// No acknowledgment within the configured push timeout
    #[error("{0}")]
    Timeout(String),
    /// The connection task went away while the send was pending
    #[error("Connection closed")]
    ConnectionClosed,
}

/// Everything the connection consumes from the rest of the application
#[derive(Clone)]
pub struct Collaborators {
    pub identity: Arc<dyn Identity>,
    pub directory: Arc<dyn RelayDirectory>,
    pub processor: Arc<dyn MessageProcessor>,
    pub dispatcher: Arc<dyn PresenceDispatcher>,
    pub intl: Arc<dyn Localizer>,
}

/// Point-in-time view of the connection for status commands and tests
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub state: SessionState,
    pub connected: bool,
    pub has_socket: bool,
    pub has_channel: bool,
    pub topic: Option<String>,
    pub status: Status,
}

enum Command {
    Connect,
    Send {
        to: String,
        body: String,
        reply: oneshot::Sender<Result<Value, SendError>>,
    },
    Info {
        reply: oneshot::Sender<ConnectionInfo>,
    },
}

/// Handle to the connection actor. Cloning is cheap; all clones drive the
/// same connection.
#[derive(Clone)]
pub struct RelayConnection {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<Status>,
}

impl RelayConnection {
    /// Spawn the connection actor and return a handle to it
    pub fn spawn(collaborators: Collaborators, config: ClientConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(Status::idle());

        let actor = ConnectionActor {
            collaborators,
            config,
            state: SessionState::Disconnected,
            connected: false,
            generation: 0,
            topic: None,
            socket: None,
            channel: None,
            parked: Vec::new(),
            pending: HashMap::new(),
            join_deadline: None,
            heartbeat_due: None,
            heartbeat_pending: None,
            next_ref: 0,
            events_tx,
            status_tx,
        };

        tokio::spawn(actor.run(cmd_rx, events_rx));

        Self {
            commands: cmd_tx,
            status: status_rx,
        }
    }

    /// Trigger connection establishment. Idempotent: a call while an
    /// establishment is in flight, or while connected, is dropped. Returns
    /// without waiting for the connection to come up.
    pub async fn connect(&self) {
        let _ = self.commands.send(Command::Connect).await;
    }

    /// Push a pre-encrypted chat payload to `to`. Resolves with the relay's
    /// acknowledgment payload.
    pub async fn send(&self, to: &str, body: &str) -> Result<Value, SendError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Send {
                to: to.to_string(),
                body: body.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| SendError::ConnectionClosed)?;

        reply_rx.await.map_err(|_| SendError::ConnectionClosed)?
    }

    /// Snapshot of the connection state
    pub async fn info(&self) -> Result<ConnectionInfo, SendError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Info { reply: reply_tx })
            .await
            .map_err(|_| SendError::ConnectionClosed)?;

        reply_rx.await.map_err(|_| SendError::ConnectionClosed)
    }

    /// Watch receiver for status updates. Last-write-wins, no history.
    pub fn status(&self) -> watch::Receiver<Status> {
        self.status.clone()
    }
}

/// The channel half of the session, created at most once per establishment
struct Channel {
    topic: String,
    join_ref: String,
    joined: bool,
}

struct ParkedSend {
    to: String,
    body: String,
    reply: oneshot::Sender<Result<Value, SendError>>,
}

struct PendingPush {
    reply: oneshot::Sender<Result<Value, SendError>>,
    deadline: Instant,
}

struct ConnectionActor {
    collaborators: Collaborators,
    config: ClientConfig,

    state: SessionState,
    /// Cleared on socket close without clearing the stale handles
    connected: bool,
    generation: u64,
    topic: Option<String>,
    socket: Option<SocketHandle>,
    channel: Option<Channel>,

    /// Sends waiting for the channel join to complete
    parked: Vec<ParkedSend>,
    /// In-flight pushes awaiting acknowledgment, keyed by ref
    pending: HashMap<String, PendingPush>,

    join_deadline: Option<Instant>,
    heartbeat_due: Option<Instant>,
    /// Ref of the heartbeat still awaiting acknowledgment
    heartbeat_pending: Option<String>,

    next_ref: u64,
    events_tx: mpsc::UnboundedSender<SocketEvent>,
    status_tx: watch::Sender<Status>,
}

impl ConnectionActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::UnboundedReceiver<SocketEvent>,
    ) {
        loop {
            let wake = tokio::time::sleep_until(self.next_deadline());

            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    // All handles dropped; pending replies fail as
                    // ConnectionClosed when their senders drop with us.
                    None => break,
                },
                Some(event) = events.recv() => self.handle_socket_event(event),
                _ = wake => self.handle_deadlines(),
            }
        }

        if let Some(socket) = &self.socket {
            socket.close();
        }
        tracing::debug!("connection actor stopped");
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect => self.handle_connect(),
            Command::Send { to, body, reply } => self.handle_send(to, body, reply),
            Command::Info { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    // ------------------------------------------------------------------
    // Establishment
    // ------------------------------------------------------------------

    fn handle_connect(&mut self) {
        if !self.state.accepts_connect() {
            tracing::debug!(state = %self.state, "connect dropped, establishment in flight or connected");
            return;
        }

        if !self.collaborators.identity.exists() {
            tracing::debug!("connect dropped, no identity");
            return;
        }

        let Some(public_key) = self.collaborators.identity.public_key() else {
            tracing::debug!("connect dropped, no identity");
            return;
        };

        self.set_status(Status::info(self.t("chat.status.connecting")));
        self.topic = Some(channel_topic(&public_key, self.config.room.as_deref()));

        let Some(relay) = self.collaborators.directory.relay() else {
            tracing::error!("no relay configured");
            self.set_status(Status::error(self.t("chat.errors.not-connected")));
            self.transition(SessionState::Errored);
            return;
        };

        self.generation += 1;
        let url = socket::socket_url(&relay.socket_url, &hex::encode(&public_key));
        tracing::info!(generation = self.generation, url = %relay.socket_url, "dialing relay");

        // A fresh establishment replaces any stale channel from a closed
        // socket; the generation tag keeps the old socket's events out.
        self.channel = None;
        self.socket = Some(socket::spawn(self.generation, url, self.events_tx.clone()));
        self.transition(SessionState::Connecting);
    }

    fn handle_socket_opened(&mut self) {
        if self.channel.is_none() {
            let Some(topic) = self.topic.clone() else {
                return;
            };
            let join_ref = self.next_ref();

            if let Some(socket) = &self.socket {
                socket.send(Frame::join(&topic, &join_ref));
            }

            tracing::debug!(topic = %topic, join_ref = %join_ref, "joining channel");
            self.channel = Some(Channel {
                topic,
                join_ref,
                joined: false,
            });
            self.join_deadline = Some(Instant::now() + self.config.join_timeout());
        }

        self.heartbeat_due = Some(Instant::now() + self.config.heartbeat_interval());
        self.heartbeat_pending = None;
        self.transition(SessionState::Joining);
    }

    fn handle_join_reply(&mut self, payload: &Value) {
        let reply = match parse_reply(payload) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable join reply");
                return;
            }
        };

        match reply.status {
            ReplyStatus::Ok => {
                if let Some(channel) = &mut self.channel {
                    channel.joined = true;
                }
                self.connected = true;
                self.join_deadline = None;
                self.transition(SessionState::Connected);
                self.set_status(Status::info(self.t("chat.status.connected")));
                tracing::info!("channel joined");

                self.collaborators.dispatcher.ping_all();

                for parked in std::mem::take(&mut self.parked) {
                    self.push_chat(parked.to, parked.body, parked.reply);
                }
            }
            // Rejection does not settle the join: parked sends stay parked
            // and the session stays in Joining. Callers race their own
            // deadline.
            ReplyStatus::Error => {
                tracing::error!(response = %reply.response, "channel join rejected");
            }
            ReplyStatus::Other(status) => {
                tracing::warn!(status = %status, "unexpected join reply status");
            }
        }
    }

    // ------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------

    fn handle_send(
        &mut self,
        to: String,
        body: String,
        reply: oneshot::Sender<Result<Value, SendError>>,
    ) {
        match &self.channel {
            Some(channel) if channel.joined => self.push_chat(to, body, reply),
            Some(_) => self.parked.push(ParkedSend { to, body, reply }),
            None if self.socket.is_some() => {
                // Establishment under way, channel not created yet
                self.parked.push(ParkedSend { to, body, reply });
            }
            None => {
                let message = self.t("chat.errors.not-connected");
                tracing::error!("{message}");
                let _ = reply.send(Err(SendError::NotConnected(message)));
            }
        }
    }

    fn push_chat(
        &mut self,
        to: String,
        body: String,
        reply: oneshot::Sender<Result<Value, SendError>>,
    ) {
        let Some(channel) = &self.channel else {
            let message = self.t("chat.errors.not-connected");
            let _ = reply.send(Err(SendError::NotConnected(message)));
            return;
        };
        let topic = channel.topic.clone();
        let join_ref = channel.join_ref.clone();
        let reference = self.next_ref();

        let frame = Frame::push(
            &topic,
            CHAT_EVENT,
            json!({"to": to, "message": body}),
            &reference,
            Some(&join_ref),
        );

        match &self.socket {
            Some(socket) if socket.send(frame) => {}
            // Let the push time out through the ordinary deadline path
            _ => tracing::debug!(reference = %reference, "push queued on dead socket"),
        }

        self.pending.insert(
            reference,
            PendingPush {
                reply,
                deadline: Instant::now() + self.config.push_timeout(),
            },
        );
    }

    // ------------------------------------------------------------------
    // Socket events
    // ------------------------------------------------------------------

    fn handle_socket_event(&mut self, event: SocketEvent) {
        if event.generation != self.generation {
            tracing::debug!(
                generation = event.generation,
                current = self.generation,
                "discarding event from superseded socket"
            );
            return;
        }

        match event.kind {
            SocketEventKind::Opened => self.handle_socket_opened(),
            SocketEventKind::Frame(frame) => self.handle_frame(frame),
            SocketEventKind::Error(error) => {
                tracing::warn!(error = %error, "socket error");
                self.set_status(Status::error(self.t("chat.errors.socket")));
            }
            SocketEventKind::Closed => self.handle_socket_closed(),
        }
    }

    fn handle_socket_closed(&mut self) {
        tracing::info!("socket closed");
        self.set_status(Status::info(self.t("chat.status.closed")));
        // Stale socket/channel handles are retained; only the flag clears.
        self.connected = false;
        self.join_deadline = None;
        self.heartbeat_due = None;
        self.heartbeat_pending = None;
        self.transition(SessionState::Disconnected);
    }

    fn handle_frame(&mut self, frame: Frame) {
        if frame.topic == PHOENIX_TOPIC {
            if frame.is_reply() && frame.reference == self.heartbeat_pending {
                self.heartbeat_pending = None;
            }
            return;
        }

        let Some(channel) = &self.channel else {
            return;
        };
        if frame.topic != channel.topic {
            tracing::debug!(topic = %frame.topic, "dropping frame for foreign topic");
            return;
        }

        if frame.is_reply() {
            if !channel.joined && frame.reference.as_deref() == Some(channel.join_ref.as_str()) {
                self.handle_join_reply(&frame.payload);
            } else if let Some(reference) = &frame.reference {
                self.handle_push_reply(reference.clone(), &frame.payload);
            }
            return;
        }

        match frame.event.as_str() {
            CHAT_EVENT => self.collaborators.processor.receive(frame.payload),
            frame::PHX_ERROR => {
                tracing::warn!("channel errored, disconnecting socket");
                if let Some(socket) = &self.socket {
                    socket.close();
                }
            }
            frame::PHX_CLOSE => {
                tracing::info!("channel closed, disconnecting socket");
                if let Some(socket) = &self.socket {
                    socket.close();
                }
            }
            other => tracing::debug!(event = %other, "ignoring unhandled channel event"),
        }
    }

    fn handle_push_reply(&mut self, reference: String, payload: &Value) {
        let Some(push) = self.pending.remove(&reference) else {
            tracing::debug!(reference = %reference, "reply for unknown ref");
            return;
        };

        let result = match parse_reply(payload) {
            Ok(reply) => match reply.status {
                ReplyStatus::Ok => Ok(reply.response),
                ReplyStatus::Error => Err(SendError::Rejected(reply.response)),
                ReplyStatus::Other(status) => {
                    tracing::warn!(status = %status, "unexpected push reply status");
                    Err(SendError::Rejected(reply.response))
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "unparseable push reply");
                Err(SendError::Rejected(payload.clone()))
            }
        };

        let _ = push.reply.send(result);
    }

    // ------------------------------------------------------------------
    // Deadlines
    // ------------------------------------------------------------------

    fn next_deadline(&self) -> Instant {
        let mut next: Option<Instant> = None;
        let mut consider = |candidate: Option<Instant>| {
            if let Some(candidate) = candidate {
                next = Some(match next {
                    Some(current) => current.min(candidate),
                    None => candidate,
                });
            }
        };

        consider(self.join_deadline);
        consider(self.heartbeat_due);
        for push in self.pending.values() {
            consider(Some(push.deadline));
        }

        next.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600))
    }

    fn handle_deadlines(&mut self) {
        let now = Instant::now();

        if self.join_deadline.is_some_and(|deadline| deadline <= now) {
            // Informational only; the join is not failed and parked sends
            // stay parked.
            tracing::info!("channel join timed out");
            self.join_deadline = None;
        }

        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, push)| push.deadline <= now)
            .map(|(reference, _)| reference.clone())
            .collect();
        for reference in expired {
            if let Some(push) = self.pending.remove(&reference) {
                let message = self.t("chat.errors.send-timeout");
                tracing::warn!(reference = %reference, "{message}");
                let _ = push.reply.send(Err(SendError::Timeout(message)));
            }
        }

        if self.heartbeat_due.is_some_and(|due| due <= now) {
            self.beat_heart(now);
        }
    }

    fn beat_heart(&mut self, now: Instant) {
        if self.socket.is_none() {
            self.heartbeat_due = None;
            return;
        }

        if self.heartbeat_pending.is_some() {
            tracing::warn!("heartbeat unacknowledged, closing socket");
            if let Some(socket) = &self.socket {
                socket.close();
            }
            self.heartbeat_due = None;
            return;
        }

        let reference = self.next_ref();
        if let Some(socket) = &self.socket {
            socket.send(Frame::heartbeat(&reference));
        }
        self.heartbeat_pending = Some(reference);
        self.heartbeat_due = Some(now + self.config.heartbeat_interval());
    }

    // ------------------------------------------------------------------
    // Bookkeeping
    // ------------------------------------------------------------------

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            tracing::debug!(from = %self.state, to = %next, "session transition");
            self.state = next;
        }
    }

    fn set_status(&self, status: Status) {
        match status.level {
            StatusLevel::Info => tracing::info!(status = %status.message, "status"),
            StatusLevel::Error => tracing::warn!(status = %status.message, "status"),
        }
        let _ = self.status_tx.send(status);
    }

    fn next_ref(&mut self) -> String {
        self.next_ref += 1;
        self.next_ref.to_string()
    }

    fn t(&self, key: &str) -> String {
        self.collaborators.intl.t(key)
    }

    fn snapshot(&self) -> ConnectionInfo {
        ConnectionInfo {
            state: self.state,
            connected: self.connected,
            has_socket: self.socket.is_some(),
            has_channel: self.channel.is_some(),
            topic: self.topic.clone(),
            status: self.status_tx.borrow().clone(),
        }
    }
}
