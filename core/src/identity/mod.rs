// Identity — the keypair whose public half addresses the user on the relay

mod keys;
mod store;

pub use keys::IdentityKeys;
pub use store::IdentityStore;

use anyhow::Result;
use parking_lot::RwLock;

/// What the relay connection needs to know about the local identity
pub trait Identity: Send + Sync {
    /// True once keys have been generated or loaded
    fn exists(&self) -> bool;

    /// Raw public key bytes, if the identity exists
    fn public_key(&self) -> Option<Vec<u8>>;
}

/// Manages the user's identity keys
pub struct IdentityManager {
    store: IdentityStore,
    keys: RwLock<Option<IdentityKeys>>,
}

impl IdentityManager {
    /// Create a new identity manager with in-memory storage
    pub fn new() -> Self {
        Self {
            store: IdentityStore::memory(),
            keys: RwLock::new(None),
        }
    }

    /// Create a new identity manager with persistent storage
    pub fn with_store(store: IdentityStore) -> Self {
        Self {
            store,
            keys: RwLock::new(None),
        }
    }

    /// Generate or load identity keys
    pub fn initialize(&self) -> Result<()> {
        if let Some(keys) = self.store.load_keys()? {
            tracing::info!("🔑 Loaded existing identity");
            *self.keys.write() = Some(keys);
        } else {
            tracing::info!("🔑 Generating new identity");
            let keys = IdentityKeys::generate();
            self.store.save_keys(&keys)?;
            *self.keys.write() = Some(keys);
        }

        Ok(())
    }

    /// Get identity public key as hex string
    pub fn public_key_hex(&self) -> Option<String> {
        self.keys.read().as_ref().map(|k| k.public_key_hex())
    }

    /// Get identity ID (hash of public key)
    pub fn identity_id(&self) -> Option<String> {
        self.keys.read().as_ref().map(|k| k.identity_id())
    }
}

impl Default for IdentityManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Identity for IdentityManager {
    fn exists(&self) -> bool {
        self.keys.read().is_some()
    }

    fn public_key(&self) -> Option<Vec<u8>> {
        self.keys.read().as_ref().map(|k| k.public_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::backend::MemoryStorage;
    use std::sync::Arc;

    #[test]
    fn test_identity_absent_before_initialize() {
        let manager = IdentityManager::new();
        assert!(!manager.exists());
        assert!(manager.public_key().is_none());
    }

    #[test]
    fn test_identity_initialization() {
        let manager = IdentityManager::new();
        manager.initialize().unwrap();

        assert!(manager.exists());
        assert_eq!(manager.public_key().unwrap().len(), 32);
        assert!(manager.public_key_hex().is_some());
        assert!(manager.identity_id().is_some());
    }

    #[test]
    fn test_identity_persistence() {
        let backend = Arc::new(MemoryStorage::new());

        let manager1 = IdentityManager::with_store(IdentityStore::persistent(backend.clone()));
        manager1.initialize().unwrap();
        let id1 = manager1.identity_id().unwrap();

        drop(manager1);

        let manager2 = IdentityManager::with_store(IdentityStore::persistent(backend));
        manager2.initialize().unwrap();
        let id2 = manager2.identity_id().unwrap();

        assert_eq!(id1, id2);
    }
}
