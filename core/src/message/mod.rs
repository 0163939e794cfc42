// Message processing — routes inbound chat payloads to history and the app

use crate::store::{HistoryManager, MessageRecord};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// Consumer of every inbound chat event, verbatim. Filtering, ordering, and
/// deduplication are this layer's responsibility, not the connection's.
pub trait MessageProcessor: Send + Sync {
    fn receive(&self, payload: Value);
}

/// Callback surface notified when a chat message has been processed
pub trait ChatDelegate: Send + Sync {
    fn message_received(&self, from: &str, content: &str);
}

/// Inbound chat payload shape: `{"from": ..., "message": ...}`
#[derive(Debug, Deserialize)]
struct InboundChat {
    from: String,
    message: String,
}

/// Processor that records inbound chat payloads into history and notifies
/// a delegate. Payload content stays opaque: decryption happens upstream
/// of the delegate, not here.
pub struct ChatProcessor {
    history: HistoryManager,
    delegate: Arc<dyn ChatDelegate>,
}

impl ChatProcessor {
    pub fn new(history: HistoryManager, delegate: Arc<dyn ChatDelegate>) -> Self {
        Self { history, delegate }
    }
}

impl MessageProcessor for ChatProcessor {
    fn receive(&self, payload: Value) {
        let chat: InboundChat = match serde_json::from_value(payload) {
            Ok(chat) => chat,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed chat payload");
                return;
            }
        };

        let record = MessageRecord::new_received(chat.from.clone(), chat.message.clone());
        if let Err(e) = self.history.add(record) {
            tracing::error!(error = %e, "failed to record inbound message");
        }

        self.delegate.message_received(&chat.from, &chat.message);
    }
}
