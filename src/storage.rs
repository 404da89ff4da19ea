//! Durable client store
//!
//! One JSON document per logical key in an embedded `sled` tree. Values are
//! written with `serde_json` so the on-disk records match what a browser's
//! local storage would hold for the same keys.

use crate::errors::StorageError;
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use tracing::debug;

/// Persisted record keys
pub mod keys {
    pub const WALLET_TYPE: &str = "walletType";
    pub const WALLET_PUBLIC_KEY: &str = "walletPublicKey";
    pub const LOCAL_KEYPAIR: &str = "localKeypair";
    pub const TOKEN_CONFIG: &str = "tokenConfig";
    pub const TOKEN_METADATA: &str = "tokenMetadata";
    pub const DEPLOYMENT_RESULT: &str = "deploymentResult";
    pub const RECENT_RECIPIENTS: &str = "recentRecipients";

    /// Wallet identity records, cleared together on disconnect
    pub const WALLET_IDENTITY: [&str; 3] = [WALLET_PUBLIC_KEY, WALLET_TYPE, LOCAL_KEYPAIR];
}

#[derive(Debug, Clone)]
pub struct ClientStore {
    db: sled::Db,
}

impl ClientStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let db = sled::open(path)?;
        debug!(path = %path.display(), "Opened client store");
        Ok(Self { db })
    }

    /// In-memory store, discarded on drop
    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.db.get(key)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StorageError::Corrupt {
                    key: key.to_string(),
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(value).map_err(|e| StorageError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.db.insert(key, bytes)?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.db.remove(key)?;
        Ok(())
    }

    pub fn contains(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.db.contains_key(key)?)
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}
