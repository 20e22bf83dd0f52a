//! Custody backends behind one polymorphic [`Wallet`] contract.
//!
//! Every backend exposes the same signing surface; operations a backend
//! cannot perform return `UnsupportedOperation` instead of silently
//! succeeding with nothing.

pub mod factory;
pub mod keystone;
pub mod ledger;
pub mod mnemonic;
pub mod seedless;

use std::collections::HashMap;

use async_trait::async_trait;
use bitcoin::Network;

use crate::chains::avalanche::AvalancheContext;
use crate::chains::evm::EvmTransactionRequest;
use crate::chains::solana::SolanaTransactionRequest;
use crate::derivation::relative_signing_path;
use crate::errors::{Result, WalletError};
use crate::types::{
    AvalancheTransactionRequest, BtcTransactionRequest, CustodyType, MessageData, NetworkInfo,
    PubKeyType, RpcMethod, VMKind,
};

/// Public key material for callers that need to watch an account without
/// being able to sign for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOnlySigner {
    pub account_index: u32,
    pub public_keys: PubKeyType,
}

/// The capability surface every custody backend implements.
///
/// Signed transactions come back in their broadcastable text form: `0x` RLP
/// hex for EVM, raw transaction hex for Bitcoin, JSON for Avalanche, base58
/// signature for Solana.
#[async_trait]
pub trait Wallet: Send + Sync {
    fn custody_type(&self) -> CustodyType;

    async fn sign_evm_transaction(
        &self,
        tx: &EvmTransactionRequest,
        account_index: u32,
    ) -> Result<String>;

    async fn sign_avalanche_transaction(
        &self,
        request: &AvalancheTransactionRequest,
        account_index: u32,
    ) -> Result<String>;

    async fn sign_btc_transaction(
        &self,
        request: &BtcTransactionRequest,
        account_index: u32,
        network: Network,
    ) -> Result<String>;

    async fn sign_svm_transaction(
        &self,
        request: &SolanaTransactionRequest,
        account_index: u32,
    ) -> Result<String>;

    async fn sign_message(
        &self,
        rpc_method: RpcMethod,
        data: &MessageData,
        account_index: u32,
        network: &NetworkInfo,
    ) -> Result<String>;

    async fn get_public_key(&self, account_index: u32) -> Result<PubKeyType>;

    async fn get_addresses(
        &self,
        account_index: u32,
        context: &AvalancheContext,
        btc_network: Network,
    ) -> Result<HashMap<VMKind, String>>;

    async fn get_read_only_signer(&self, account_index: u32) -> Result<ReadOnlySigner>;
}

/// Relative signing paths for an Avalanche request: external (receive)
/// indices first, then internal (change) indices, in request order. An empty
/// request signs with the first receive address.
pub(crate) fn avalanche_signing_paths(request: &AvalancheTransactionRequest) -> Vec<String> {
    let mut paths = Vec::new();
    if let Some(external) = &request.external_indices {
        for index in external {
            paths.push(relative_signing_path(0, *index));
        }
    }
    if let Some(internal) = &request.internal_indices {
        for index in internal {
            paths.push(relative_signing_path(1, *index));
        }
    }
    if paths.is_empty() {
        paths.push(relative_signing_path(0, 0));
    }
    paths
}

/// Look up a stored secp256k1 public key by derivation path.
pub(crate) fn record_key(records: &[crate::types::PublicKeyRecord], path: &str) -> Result<Vec<u8>> {
    let record = records
        .iter()
        .find(|r| r.curve == crate::types::Curve::Secp256k1 && r.derivation_path == path)
        .ok_or_else(|| WalletError::PublicKeyNotFound {
            path: path.to_string(),
            curve: "secp256k1".to_string(),
        })?;
    hex::decode(&record.key).map_err(|e| WalletError::CorruptWalletData(e.to_string()))
}

/// Derive all displayable addresses for one account from cached public key
/// records. Used by every backend that holds no key material.
pub(crate) fn addresses_from_records(
    records: &[crate::types::PublicKeyRecord],
    account_index: u32,
    scheme: crate::types::DerivationScheme,
    context: &AvalancheContext,
    btc_network: Network,
) -> Result<HashMap<VMKind, String>> {
    use crate::chains::{avalanche, bitcoin as btc, evm};
    use crate::derivation::derivation_path;

    let evm_compressed = record_key(records, &derivation_path(VMKind::Evm, account_index, scheme))?;
    let avax_compressed = record_key(
        records,
        &derivation_path(
            VMKind::Avm,
            account_index,
            crate::types::DerivationScheme::Bip44,
        ),
    )?;

    // The EVM address needs the uncompressed point
    let verifying_key = k256::ecdsa::VerifyingKey::from_sec1_bytes(&evm_compressed)
        .map_err(|e| WalletError::CorruptWalletData(format!("bad stored key: {e}")))?;
    let evm_uncompressed = verifying_key.to_encoded_point(false).as_bytes().to_vec();

    let mut addresses = HashMap::new();
    addresses.insert(VMKind::Evm, evm::address_from_pubkey(&evm_uncompressed)?);
    addresses.insert(
        VMKind::Bitcoin,
        btc::p2wpkh_address(&evm_compressed, btc_network)?,
    );
    addresses.insert(
        VMKind::Avm,
        avalanche::address_from_pubkey(avalanche::ChainAlias::X, &context.hrp, &avax_compressed)?,
    );
    addresses.insert(
        VMKind::Pvm,
        avalanche::address_from_pubkey(avalanche::ChainAlias::P, &context.hrp, &avax_compressed)?,
    );
    addresses.insert(
        VMKind::CoreEth,
        avalanche::address_from_pubkey(avalanche::ChainAlias::C, &context.hrp, &evm_compressed)?,
    );
    Ok(addresses)
}

/// Split a 64/65-byte compact signature into (r, s, recovery byte).
pub(crate) fn split_rsv(bytes: &[u8]) -> Result<([u8; 32], [u8; 32], u8)> {
    if bytes.len() != 64 && bytes.len() != 65 {
        return Err(WalletError::CorruptWalletData(format!(
            "expected a 64 or 65 byte signature, got {}",
            bytes.len()
        )));
    }
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&bytes[..32]);
    s.copy_from_slice(&bytes[32..64]);
    let v = if bytes.len() == 65 { bytes[64] } else { 0 };
    Ok((r, s, v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::avalanche::tx::{AvaxTxKind, UnsignedAvaxTx};

    fn request(external: Option<Vec<u32>>, internal: Option<Vec<u32>>) -> AvalancheTransactionRequest {
        AvalancheTransactionRequest {
            tx: UnsignedAvaxTx {
                vm: VMKind::Pvm,
                network_id: 1,
                kind: AvaxTxKind::BaseP,
                inputs: vec![],
                outputs: vec![],
                staked_outputs: vec![],
                evm_nonce: None,
            },
            external_indices: external,
            internal_indices: internal,
        }
    }

    #[test]
    fn test_signing_paths_default_and_order() {
        assert_eq!(avalanche_signing_paths(&request(None, None)), vec!["0/0"]);
        assert_eq!(
            avalanche_signing_paths(&request(Some(vec![0, 2]), Some(vec![1]))),
            vec!["0/0", "0/2", "1/1"]
        );
        // Empty vectors still fall back to the default path
        assert_eq!(
            avalanche_signing_paths(&request(Some(vec![]), Some(vec![]))),
            vec!["0/0"]
        );
    }

    #[test]
    fn test_split_rsv() {
        let mut bytes = vec![1u8; 32];
        bytes.extend_from_slice(&[2u8; 32]);
        let (r, s, v) = split_rsv(&bytes).unwrap();
        assert_eq!(r, [1u8; 32]);
        assert_eq!(s, [2u8; 32]);
        assert_eq!(v, 0);

        bytes.push(1);
        assert_eq!(split_rsv(&bytes).unwrap().2, 1);
        assert!(split_rsv(&bytes[..63]).is_err());
    }
}
