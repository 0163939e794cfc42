// Chat history persistence and retrieval

use super::backend::StorageBackend;
use super::StoreError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageDirection {
    Sent,
    Received,
}

/// One stored chat message. `content` is the opaque payload string exactly
/// as it crossed the wire; this layer does not decrypt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub direction: MessageDirection,
    pub peer_id: String,
    pub content: String,
    pub timestamp: u64,
}

impl MessageRecord {
    pub fn new_sent(peer_id: String, content: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            direction: MessageDirection::Sent,
            peer_id,
            content,
            timestamp: current_timestamp(),
        }
    }

    pub fn new_received(peer_id: String, content: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            direction: MessageDirection::Received,
            peer_id,
            content,
            timestamp: current_timestamp(),
        }
    }
}

fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[derive(Clone)]
pub struct HistoryManager {
    backend: Arc<dyn StorageBackend>,
}

impl HistoryManager {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    pub fn add(&self, record: MessageRecord) -> Result<(), StoreError> {
        let key = format!("msg_{}", record.id);
        let value = serde_json::to_vec(&record)?;
        self.backend.put(key.as_bytes(), &value)
    }

    pub fn get(&self, id: &str) -> Result<Option<MessageRecord>, StoreError> {
        let key = format!("msg_{id}");
        match self.backend.get(key.as_bytes())? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    /// Most recent messages, newest first, optionally filtered by peer
    pub fn recent(
        &self,
        peer_filter: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        let mut records = Vec::new();
        for (_, value) in self.backend.scan_prefix(b"msg_")? {
            let record: MessageRecord = serde_json::from_slice(&value)?;
            match peer_filter {
                Some(peer) if record.peer_id != peer => {}
                _ => records.push(record),
            }
        }

        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(limit);

        Ok(records)
    }

    pub fn conversation(&self, peer_id: &str, limit: usize) -> Result<Vec<MessageRecord>, StoreError> {
        self.recent(Some(peer_id), limit)
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        for (key, _) in self.backend.scan_prefix(b"msg_")? {
            self.backend.remove(&key)?;
        }
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.backend.count_prefix(b"msg_").unwrap_or(0)
    }

    /// Drop the oldest messages beyond `max_messages`. Returns how many
    /// were removed.
    pub fn enforce_retention(&self, max_messages: usize) -> Result<usize, StoreError> {
        let all = self.backend.scan_prefix(b"msg_")?;
        if all.len() <= max_messages {
            return Ok(0);
        }

        let mut records: Vec<(Vec<u8>, MessageRecord)> = Vec::with_capacity(all.len());
        for (key, value) in all {
            let record: MessageRecord = serde_json::from_slice(&value)?;
            records.push((key, record));
        }

        records.sort_by(|a, b| a.1.timestamp.cmp(&b.1.timestamp));

        let to_remove = records.len() - max_messages;
        for (key, _) in records.iter().take(to_remove) {
            self.backend.remove(key)?;
        }

        Ok(to_remove)
    }

    pub fn flush(&self) {
        let _ = self.backend.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::backend::MemoryStorage;

    fn test_history() -> HistoryManager {
        HistoryManager::new(Arc::new(MemoryStorage::new()))
    }

    #[test]
    fn test_add_and_get() {
        let history = test_history();
        let record = MessageRecord::new_received("user:abcd".to_string(), "hello".to_string());
        let id = record.id.clone();

        history.add(record).unwrap();

        let loaded = history.get(&id).unwrap().unwrap();
        assert_eq!(loaded.peer_id, "user:abcd");
        assert_eq!(loaded.content, "hello");
        assert_eq!(loaded.direction, MessageDirection::Received);
    }

    #[test]
    fn test_recent_filters_by_peer() {
        let history = test_history();
        history
            .add(MessageRecord::new_sent("user:aa".to_string(), "one".to_string()))
            .unwrap();
        history
            .add(MessageRecord::new_sent("user:bb".to_string(), "two".to_string()))
            .unwrap();

        let all = history.recent(None, 10).unwrap();
        assert_eq!(all.len(), 2);

        let conversation = history.conversation("user:aa", 10).unwrap();
        assert_eq!(conversation.len(), 1);
        assert_eq!(conversation[0].content, "one");
    }

    #[test]
    fn test_recent_respects_limit() {
        let history = test_history();
        for i in 0..5 {
            history
                .add(MessageRecord::new_sent("user:aa".to_string(), format!("m{i}")))
                .unwrap();
        }

        assert_eq!(history.recent(None, 3).unwrap().len(), 3);
        assert_eq!(history.count(), 5);
    }

    #[test]
    fn test_clear_removes_everything() {
        let history = test_history();
        history
            .add(MessageRecord::new_sent("user:aa".to_string(), "one".to_string()))
            .unwrap();

        history.clear().unwrap();
        assert_eq!(history.count(), 0);
    }

    #[test]
    fn test_retention_drops_oldest() {
        let history = test_history();
        let mut first_id = String::new();
        for i in 0..4u64 {
            let mut record =
                MessageRecord::new_sent("user:aa".to_string(), format!("m{i}"));
            record.timestamp = 100 + i;
            if i == 0 {
                first_id = record.id.clone();
            }
            history.add(record).unwrap();
        }

        let removed = history.enforce_retention(3).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(history.count(), 3);
        assert!(history.get(&first_id).unwrap().is_none());
    }

    #[test]
    fn test_retention_noop_under_limit() {
        let history = test_history();
        history
            .add(MessageRecord::new_sent("user:aa".to_string(), "one".to_string()))
            .unwrap();

        assert_eq!(history.enforce_retention(10).unwrap(), 0);
        assert_eq!(history.count(), 1);
    }
}
