//! Solana pass-through support.
//!
//! Transactions arrive fully serialized from the RPC-facing layer; the core
//! only routes them to a backend capable of ed25519 signing and derives
//! display addresses.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, WalletError};

/// A serialized Solana transaction and the account expected to sign it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolanaTransactionRequest {
    /// base58 account address
    pub account: String,
    /// base64-encoded serialized transaction message
    pub serialized_tx: String,
}

impl SolanaTransactionRequest {
    /// Decode the message bytes that the signer operates on.
    pub fn message_bytes(&self) -> Result<Vec<u8>> {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD
            .decode(&self.serialized_tx)
            .map_err(|e| WalletError::CorruptWalletData(format!("bad solana payload: {e}")))
    }
}

/// base58 address from a 32-byte ed25519 public key.
pub fn address_from_pubkey(pubkey: &[u8]) -> Result<String> {
    if pubkey.len() != 32 {
        return Err(WalletError::CorruptWalletData(
            "solana address requires a 32-byte public key".to_string(),
        ));
    }
    Ok(bs58::encode(pubkey).into_string())
}
