// Store module — key/value persistence and chat history

pub mod backend;
pub mod history;

pub use backend::{MemoryStorage, SledStorage, StorageBackend};
pub use history::{HistoryManager, MessageDirection, MessageRecord};

use thiserror::Error;

/// Storage error types
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Record encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}
