// Phoenix V2 channel frame codec
//
// Frames are JSON arrays: [join_ref, ref, topic, event, payload].
// Absent refs are encoded as nulls.

use serde_json::{json, Value};
use thiserror::Error;

/// Join request for a channel topic
pub const PHX_JOIN: &str = "phx_join";
/// Leave request for a channel topic
pub const PHX_LEAVE: &str = "phx_leave";
/// Acknowledgment for a pushed frame (join, leave, or user event)
pub const PHX_REPLY: &str = "phx_reply";
/// Server-side channel crash
pub const PHX_ERROR: &str = "phx_error";
/// Server-side channel shutdown
pub const PHX_CLOSE: &str = "phx_close";
/// Socket keepalive event
pub const HEARTBEAT: &str = "heartbeat";
/// Topic reserved for socket-level heartbeats
pub const PHOENIX_TOPIC: &str = "phoenix";
/// User chat message event
pub const CHAT_EVENT: &str = "chat";

/// Frame codec error types
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Frame is not a JSON array")]
    NotAnArray,
    #[error("Expected 5 frame elements, got {0}")]
    BadArity(usize),
    #[error("Frame field '{0}' has the wrong type")]
    BadField(&'static str),
    #[error("Reply payload has no status field")]
    MissingStatus,
}

/// A single channel protocol frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Ref of the join push that opened the channel this frame belongs to
    pub join_ref: Option<String>,
    /// Ref correlating a push with its reply
    pub reference: Option<String>,
    pub topic: String,
    pub event: String,
    pub payload: Value,
}

impl Frame {
    pub fn new(
        join_ref: Option<String>,
        reference: Option<String>,
        topic: impl Into<String>,
        event: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            join_ref,
            reference,
            topic: topic.into(),
            event: event.into(),
            payload,
        }
    }

    /// Build a join push for a topic
    pub fn join(topic: &str, join_ref: &str) -> Self {
        Self::new(
            Some(join_ref.to_string()),
            Some(join_ref.to_string()),
            topic,
            PHX_JOIN,
            json!({}),
        )
    }

    /// Build a user event push on a joined channel
    pub fn push(
        topic: &str,
        event: &str,
        payload: Value,
        reference: &str,
        join_ref: Option<&str>,
    ) -> Self {
        Self::new(
            join_ref.map(str::to_string),
            Some(reference.to_string()),
            topic,
            event,
            payload,
        )
    }

    /// Build a socket heartbeat push
    pub fn heartbeat(reference: &str) -> Self {
        Self::new(
            None,
            Some(reference.to_string()),
            PHOENIX_TOPIC,
            HEARTBEAT,
            json!({}),
        )
    }

    /// Encode to V2 wire text
    pub fn encode(&self) -> String {
        Value::Array(vec![
            opt_string(&self.join_ref),
            opt_string(&self.reference),
            Value::String(self.topic.clone()),
            Value::String(self.event.clone()),
            self.payload.clone(),
        ])
        .to_string()
    }

    /// Decode from V2 wire text
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text)?;
        let items = value.as_array().ok_or(FrameError::NotAnArray)?;
        if items.len() != 5 {
            return Err(FrameError::BadArity(items.len()));
        }

        Ok(Self {
            join_ref: decode_ref(&items[0], "join_ref")?,
            reference: decode_ref(&items[1], "ref")?,
            topic: items[2]
                .as_str()
                .ok_or(FrameError::BadField("topic"))?
                .to_string(),
            event: items[3]
                .as_str()
                .ok_or(FrameError::BadField("event"))?
                .to_string(),
            payload: items[4].clone(),
        })
    }

    /// True for an acknowledgment frame
    pub fn is_reply(&self) -> bool {
        self.event == PHX_REPLY
    }
}

fn opt_string(value: &Option<String>) -> Value {
    match value {
        Some(s) => Value::String(s.clone()),
        None => Value::Null,
    }
}

fn decode_ref(value: &Value, field: &'static str) -> Result<Option<String>, FrameError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        _ => Err(FrameError::BadField(field)),
    }
}

/// Status of a reply payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyStatus {
    Ok,
    Error,
    /// Statuses this client does not know are carried, not rejected
    Other(String),
}

/// Parsed `phx_reply` payload: `{"status": ..., "response": ...}`
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: ReplyStatus,
    pub response: Value,
}

/// Parse a reply payload into status and response
pub fn parse_reply(payload: &Value) -> Result<Reply, FrameError> {
    let status = payload
        .get("status")
        .and_then(Value::as_str)
        .ok_or(FrameError::MissingStatus)?;

    let status = match status {
        "ok" => ReplyStatus::Ok,
        "error" => ReplyStatus::Error,
        other => ReplyStatus::Other(other.to_string()),
    };

    let response = payload.get("response").cloned().unwrap_or(Value::Null);

    Ok(Reply { status, response })
}
