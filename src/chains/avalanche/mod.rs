//! Avalanche X/P/C-atomic support: network context, provider boundary and
//! bech32 address handling.

pub mod builder;
pub mod tx;

use async_trait::async_trait;
use bech32::{ToBase32, Variant};
use bitcoin::hashes::{hash160, Hash};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, WalletError};
use tx::AvaxUtxo;

// ========== Chain aliases ==========

/// The three Avalanche primary-network chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainAlias {
    X,
    P,
    C,
}

impl ChainAlias {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainAlias::X => "X",
            ChainAlias::P => "P",
            ChainAlias::C => "C",
        }
    }
}

impl std::fmt::Display for ChainAlias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ========== Network context ==========

/// The slice of Avalanche network metadata the builders need. Fees are nAVAX.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvalancheContext {
    pub network_id: u32,
    /// bech32 human-readable part, `avax` on mainnet, `fuji` on testnet
    pub hrp: String,
    pub avax_asset_id: String,
    /// Flat fee for X/P base, import and export transactions
    pub base_tx_fee: u64,
    pub is_testnet: bool,
}

// ========== Provider boundary ==========

/// Chain data the builders cannot compute locally. Implementations wrap the
/// caller's RPC clients; errors cross the boundary as `anyhow::Error` and are
/// wrapped into `WalletError::Provider`.
#[async_trait]
pub trait AvalancheProvider: Send + Sync {
    async fn context(&self) -> anyhow::Result<AvalancheContext>;

    /// Spendable UTXOs on a chain for a set of owned addresses.
    async fn get_utxos(
        &self,
        chain: ChainAlias,
        addresses: &[String],
    ) -> anyhow::Result<Vec<AvaxUtxo>>;

    /// UTXOs exported toward `destination_chain` but not yet imported.
    async fn get_atomic_utxos(
        &self,
        source_chain: ChainAlias,
        destination_chain: ChainAlias,
        addresses: &[String],
    ) -> anyhow::Result<Vec<AvaxUtxo>>;

    /// Current account nonce for a C-chain EVM address.
    async fn evm_nonce(&self, address: &str) -> anyhow::Result<u64>;
}

// ========== Addresses ==========

/// Derive an X/P-style address (`{chain}-{hrp}1...`) from a compressed
/// secp256k1 public key.
pub fn address_from_pubkey(chain: ChainAlias, hrp: &str, pubkey: &[u8]) -> Result<String> {
    let digest = hash160::Hash::hash(pubkey);
    let encoded = bech32::encode(hrp, digest.to_byte_array().to_base32(), Variant::Bech32)
        .map_err(|e| WalletError::CorruptWalletData(format!("bech32 encode: {e}")))?;
    Ok(format!("{chain}-{encoded}"))
}

/// Digest for `avalanche_signMessage`: sha256 over the Avalanche signed
/// message preamble, the big-endian message length and the message itself.
pub fn message_digest(message: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(b"\x1aAvalanche Signed Message:\n");
    hasher.update((message.len() as u32).to_be_bytes());
    hasher.update(message);
    hasher.finalize().into()
}

/// Checksum-validate a P-chain address against the network's HRP.
pub fn is_valid_p_address(address: &str, hrp: &str) -> bool {
    let Some(rest) = address.strip_prefix("P-") else {
        return false;
    };
    match bech32::decode(rest) {
        Ok((decoded_hrp, _, Variant::Bech32)) => decoded_hrp == hrp,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_from_pubkey_shape() {
        let pubkey = [2u8; 33];
        let addr = address_from_pubkey(ChainAlias::P, "avax", &pubkey).unwrap();
        assert!(addr.starts_with("P-avax1"));

        let x = address_from_pubkey(ChainAlias::X, "avax", &pubkey).unwrap();
        assert_eq!(&x[2..], &addr[2..]);
    }

    #[test]
    fn test_p_address_validation() {
        let pubkey = [3u8; 33];
        let addr = address_from_pubkey(ChainAlias::P, "fuji", &pubkey).unwrap();
        assert!(is_valid_p_address(&addr, "fuji"));
        // Wrong network
        assert!(!is_valid_p_address(&addr, "avax"));
        // Missing prefix
        assert!(!is_valid_p_address(&addr[2..], "fuji"));
        // Corrupted checksum
        let mut bad = addr.clone();
        let last = bad.pop().unwrap();
        bad.push(if last == 'q' { 'p' } else { 'q' });
        assert!(!is_valid_p_address(&bad, "fuji"));
    }
}
