//! Persistence boundary for wallet secrets and derived key records.
//!
//! The actual encryption-at-rest lives outside this crate; callers inject a
//! [`SecretStore`] backed by whatever secure storage the platform offers.
//! This module only defines the record shape and the load/save helpers that
//! keep corrupt persisted data from panicking the signing flows.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, WalletError};
use crate::types::PublicKeyRecord;

// ========== Secret store boundary ==========

/// Opaque key-value secure storage. Values are already-serialized strings;
/// encryption and biometric gating happen behind this trait.
pub trait SecretStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>>;
    fn store(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Storage key for one wallet's persisted record.
pub fn wallet_key(wallet_id: &str) -> String {
    format!("wallet/{wallet_id}")
}

// ========== Persisted record ==========

/// Everything persisted for one wallet, serialized as a single JSON document
/// and replaced wholesale on every write.
///
/// Which fields are populated depends on the custody type: a mnemonic wallet
/// stores only the mnemonic, hardware and QR wallets store derived public
/// keys and extended public keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredWalletData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mnemonic: Option<String>,
    /// Account-level EVM extended public key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xpub: Option<String>,
    /// Account-level Avalanche X/P extended public key
    #[serde(rename = "xpubXP", skip_serializing_if = "Option::is_none")]
    pub xpub_xp: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub public_keys: Vec<PublicKeyRecord>,
}

/// Load and parse a wallet record. Returns `Ok(None)` when nothing is stored;
/// unparseable JSON surfaces `CorruptWalletData` instead of panicking.
pub fn load_wallet_data(
    store: &dyn SecretStore,
    wallet_id: &str,
) -> Result<Option<StoredWalletData>> {
    match store.load(&wallet_key(wallet_id))? {
        None => Ok(None),
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| WalletError::CorruptWalletData(e.to_string())),
    }
}

/// Serialize and write a wallet record, replacing any previous value.
pub fn save_wallet_data(
    store: &dyn SecretStore,
    wallet_id: &str,
    data: &StoredWalletData,
) -> Result<()> {
    let raw = serde_json::to_string(data).map_err(|_| WalletError::SecretStoreFailed)?;
    store.store(&wallet_key(wallet_id), &raw)
}

/// Remove a wallet record. Idempotent.
pub fn remove_wallet_data(store: &dyn SecretStore, wallet_id: &str) -> Result<()> {
    store.remove(&wallet_key(wallet_id))
}

// ========== In-memory store ==========

/// In-process store used by tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemorySecretStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| WalletError::SecretLoadFailed)?;
        Ok(entries.get(key).cloned())
    }

    fn store(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| WalletError::SecretStoreFailed)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| WalletError::SecretStoreFailed)?;
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Curve;

    #[test]
    fn test_round_trip_wallet_data() {
        let store = MemorySecretStore::new();
        let data = StoredWalletData {
            mnemonic: None,
            xpub: Some("xpub6Bmn...".to_string()),
            xpub_xp: Some("xpub6Cxy...".to_string()),
            public_keys: vec![PublicKeyRecord {
                key: "02aabb".to_string(),
                derivation_path: "m/44'/60'/0'/0/0".to_string(),
                curve: Curve::Secp256k1,
                btc_wallet_policy: None,
            }],
        };

        save_wallet_data(&store, "w1", &data).unwrap();
        let loaded = load_wallet_data(&store, "w1").unwrap().unwrap();
        assert_eq!(loaded, data);
    }

    #[test]
    fn test_missing_record_is_none() {
        let store = MemorySecretStore::new();
        assert!(load_wallet_data(&store, "nope").unwrap().is_none());
    }

    #[test]
    fn test_corrupt_record_is_an_error_not_a_panic() {
        let store = MemorySecretStore::new();
        store.store(&wallet_key("w1"), "{not json").unwrap();
        let err = load_wallet_data(&store, "w1").unwrap_err();
        assert!(matches!(err, WalletError::CorruptWalletData(_)));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let store = MemorySecretStore::new();
        remove_wallet_data(&store, "w1").unwrap();
        save_wallet_data(&store, "w1", &StoredWalletData::default()).unwrap();
        remove_wallet_data(&store, "w1").unwrap();
        remove_wallet_data(&store, "w1").unwrap();
        assert!(load_wallet_data(&store, "w1").unwrap().is_none());
    }
}
