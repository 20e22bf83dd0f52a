//! EVM transaction handling.
//!
//! Requests arrive fully populated (nonce, gas, fees) from the RPC-facing
//! layer; this module only normalizes them into the legacy RLP payload the
//! signing backends consume and derives addresses from public keys.

use ethereum_types::{H160, U256};
use ethers_core::types::{Bytes, Signature, TransactionRequest};
use ethers_core::utils::to_checksum;
use sha3::{Digest, Keccak256};

use crate::errors::{Result, WalletError};

/// A ready-to-sign EVM transaction. All amounts are wei.
#[derive(Debug, Clone, Default)]
pub struct EvmTransactionRequest {
    pub from: Option<H160>,
    pub to: Option<H160>,
    pub value: U256,
    pub data: Vec<u8>,
    pub nonce: Option<u64>,
    pub gas_limit: u64,
    pub gas_price: U256,
    pub chain_id: u64,
}

impl EvmTransactionRequest {
    fn to_typed(&self) -> TransactionRequest {
        let mut tx = TransactionRequest::new()
            .gas(self.gas_limit)
            .gas_price(self.gas_price)
            .value(self.value)
            .chain_id(self.chain_id)
            .data(Bytes::from(self.data.clone()));
        if let Some(from) = self.from {
            tx = tx.from(from);
        }
        if let Some(to) = self.to {
            tx = tx.to(to);
        }
        if let Some(nonce) = self.nonce {
            tx = tx.nonce(nonce);
        }
        tx
    }

    /// keccak256 of the legacy RLP preimage, the value backends sign.
    pub fn sighash(&self) -> [u8; 32] {
        self.to_typed().sighash().0
    }

    /// Unsigned RLP payload for hardware backends that hash on-device.
    pub fn rlp(&self) -> Vec<u8> {
        self.to_typed().rlp().to_vec()
    }

    /// Broadcastable signed transaction bytes.
    pub fn rlp_signed(&self, signature: &Signature) -> Vec<u8> {
        self.to_typed().rlp_signed(signature).to_vec()
    }
}

/// EIP-155 replay-protected recovery value for legacy transactions.
pub fn legacy_v(recovery_id: u8, chain_id: u64) -> u64 {
    35 + 2 * chain_id + u64::from(recovery_id)
}

/// EIP-55 checksummed address from an uncompressed (65-byte SEC1) secp256k1
/// public key.
pub fn address_from_pubkey(pubkey: &[u8]) -> Result<String> {
    if pubkey.len() != 65 || pubkey[0] != 0x04 {
        return Err(WalletError::CorruptWalletData(
            "evm address requires an uncompressed public key".to_string(),
        ));
    }
    let digest = Keccak256::digest(&pubkey[1..]);
    let address = H160::from_slice(&digest[12..]);
    Ok(to_checksum(&address, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_address_from_generator_point() {
        // Public key of secret key 1, i.e. the curve generator
        let pubkey = hex::decode(
            "0479be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798\
             483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8",
        )
        .unwrap();
        assert_eq!(
            address_from_pubkey(&pubkey).unwrap(),
            "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf"
        );
    }

    #[test]
    fn test_compressed_key_is_rejected() {
        assert!(address_from_pubkey(&[2u8; 33]).is_err());
    }

    #[test]
    fn test_legacy_v() {
        assert_eq!(legacy_v(0, 43114), 35 + 2 * 43114);
        assert_eq!(legacy_v(1, 1), 38);
    }

    #[test]
    fn test_sighash_covers_every_field() {
        let base = EvmTransactionRequest {
            from: None,
            to: Some(H160::from_str("0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf").unwrap()),
            value: U256::from(1_000_000u64),
            data: vec![0xde, 0xad],
            nonce: Some(4),
            gas_limit: 21_000,
            gas_price: U256::from(25_000_000_000u64),
            chain_id: 43114,
        };
        let mut bumped = base.clone();
        bumped.nonce = Some(5);
        assert_ne!(base.sighash(), bumped.sighash());
        assert_eq!(base.sighash(), base.clone().sighash());
    }
}
