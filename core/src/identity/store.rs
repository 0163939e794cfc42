// Identity key storage

use super::IdentityKeys;
use crate::store::backend::StorageBackend;
use anyhow::Result;
use std::sync::Arc;

const IDENTITY_KEY: &[u8] = b"identity_keys";

/// Storage backend for identity keys
pub enum IdentityStore {
    Memory,
    Persistent(Arc<dyn StorageBackend>),
}

impl IdentityStore {
    /// Create in-memory storage
    pub fn memory() -> Self {
        Self::Memory
    }

    /// Create persistent storage
    pub fn persistent(backend: Arc<dyn StorageBackend>) -> Self {
        Self::Persistent(backend)
    }

    /// Save keys to storage
    pub fn save_keys(&self, keys: &IdentityKeys) -> Result<()> {
        match self {
            Self::Memory => Ok(()),
            Self::Persistent(db) => {
                let bytes = keys.to_bytes();
                db.put(IDENTITY_KEY, &bytes)?;
                db.flush()?;
                Ok(())
            }
        }
    }

    /// Load keys from storage
    pub fn load_keys(&self) -> Result<Option<IdentityKeys>> {
        match self {
            Self::Memory => Ok(None),
            Self::Persistent(db) => {
                if let Some(bytes) = db.get(IDENTITY_KEY)? {
                    let keys = IdentityKeys::from_bytes(&bytes)?;
                    Ok(Some(keys))
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Clear stored keys
    pub fn clear(&self) -> Result<()> {
        match self {
            Self::Memory => Ok(()),
            Self::Persistent(db) => {
                db.remove(IDENTITY_KEY)?;
                db.flush()?;
                Ok(())
            }
        }
    }
}
