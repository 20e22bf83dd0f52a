//! Remote custodial (seedless) backend.
//!
//! Key shares live with the custody service; this backend caches the derived
//! public key records and sends digests to an injected [`RemoteSigner`]
//! client.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::Network;
use ethers_core::types::transaction::eip712::Eip712;
use ethers_core::types::{Signature, U256};

use crate::chains::avalanche::tx::SignedAvaxTx;
use crate::chains::avalanche::{self, AvalancheContext};
use crate::chains::bitcoin as btc;
use crate::chains::evm::{legacy_v, EvmTransactionRequest};
use crate::chains::solana::SolanaTransactionRequest;
use crate::derivation::derivation_path;
use crate::errors::{Result, WalletError};
use crate::ledger::engine::assemble_signature_hex;
use crate::types::{
    AvalancheTransactionRequest, BtcTransactionRequest, CustodyType, DerivationScheme,
    MessageData, NetworkInfo, PubKeyType, PublicKeyRecord, RpcMethod, VMKind,
};
use crate::wallet::{
    addresses_from_records, avalanche_signing_paths, record_key, split_rsv, ReadOnlySigner,
    Wallet,
};

/// Client for the remote signing service. secp256k1 signatures come back as
/// r || s || recovery byte; ed25519 as the raw 64 bytes.
#[async_trait]
pub trait RemoteSigner: Send + Sync {
    async fn sign_secp256k1(&self, path: &str, digest: [u8; 32]) -> anyhow::Result<Vec<u8>>;
    async fn sign_ed25519(&self, path: &str, message: &[u8]) -> anyhow::Result<Vec<u8>>;
}

pub struct SeedlessWallet {
    public_keys: Vec<PublicKeyRecord>,
    signer: Arc<dyn RemoteSigner>,
}

impl SeedlessWallet {
    pub fn new(public_keys: Vec<PublicKeyRecord>, signer: Arc<dyn RemoteSigner>) -> Self {
        Self {
            public_keys,
            signer,
        }
    }

    fn evm_path(&self, account_index: u32) -> String {
        derivation_path(VMKind::Evm, account_index, DerivationScheme::Bip44)
    }

    async fn sign_digest(&self, path: &str, digest: [u8; 32]) -> Result<([u8; 32], [u8; 32], u8)> {
        let compact = self.signer.sign_secp256k1(path, digest).await?;
        split_rsv(&compact)
    }
}

#[async_trait]
impl Wallet for SeedlessWallet {
    fn custody_type(&self) -> CustodyType {
        CustodyType::Seedless
    }

    async fn sign_evm_transaction(
        &self,
        tx: &EvmTransactionRequest,
        account_index: u32,
    ) -> Result<String> {
        let (r, s, recovery_id) = self
            .sign_digest(&self.evm_path(account_index), tx.sighash())
            .await?;
        let signature = Signature {
            r: U256::from_big_endian(&r),
            s: U256::from_big_endian(&s),
            v: legacy_v(recovery_id, tx.chain_id),
        };
        Ok(format!("0x{}", hex::encode(tx.rlp_signed(&signature))))
    }

    async fn sign_avalanche_transaction(
        &self,
        request: &AvalancheTransactionRequest,
        _account_index: u32,
    ) -> Result<String> {
        let digest = request.tx.signing_hash()?;
        let mut signed = SignedAvaxTx::new(request.tx.clone());
        for path in avalanche_signing_paths(request) {
            let (r, s, v) = self
                .sign_digest(&format!("m/44'/9000'/0'/{path}"), digest)
                .await?;
            signed.add_signature(assemble_signature_hex(&r, &s, v), path);
        }
        signed.to_json()
    }

    async fn sign_btc_transaction(
        &self,
        request: &BtcTransactionRequest,
        account_index: u32,
        network: Network,
    ) -> Result<String> {
        let path = derivation_path(VMKind::Bitcoin, account_index, DerivationScheme::Bip44);
        let pubkey = record_key(&self.public_keys, &self.evm_path(account_index))?;

        let (mut tx, digests) = btc::segwit_sighashes(request, &pubkey, network)?;
        let mut signatures = Vec::with_capacity(digests.len());
        for digest in digests {
            signatures.push(self.signer.sign_secp256k1(&path, digest).await?);
        }
        btc::attach_p2wpkh_witnesses(&mut tx, &signatures, &pubkey)?;
        Ok(hex::encode(bitcoin::consensus::encode::serialize(&tx)))
    }

    async fn sign_svm_transaction(
        &self,
        request: &SolanaTransactionRequest,
        account_index: u32,
    ) -> Result<String> {
        let path = derivation_path(VMKind::Solana, account_index, DerivationScheme::Bip44);
        let signature = self
            .signer
            .sign_ed25519(&path, &request.message_bytes()?)
            .await?;
        Ok(bs58::encode(signature).into_string())
    }

    async fn sign_message(
        &self,
        rpc_method: RpcMethod,
        data: &MessageData,
        account_index: u32,
        _network: &NetworkInfo,
    ) -> Result<String> {
        match (rpc_method, data) {
            (RpcMethod::PersonalSign | RpcMethod::EthSign, MessageData::Raw(message)) => {
                let digest = ethers_core::utils::hash_message(message.as_bytes()).0;
                let (r, s, recovery_id) = self
                    .sign_digest(&self.evm_path(account_index), digest)
                    .await?;
                Ok(assemble_signature_hex(&r, &s, 27 + recovery_id))
            }
            (RpcMethod::SignTypedDataV1, _) | (_, MessageData::TypedDataV1(_)) => {
                Err(WalletError::UnsupportedOperation(
                    "legacy array-form typed data",
                ))
            }
            (
                RpcMethod::SignTypedData | RpcMethod::SignTypedDataV3 | RpcMethod::SignTypedDataV4,
                MessageData::TypedData(typed),
            ) => {
                let digest = typed
                    .encode_eip712()
                    .map_err(|e| WalletError::InvalidTypedData(e.to_string()))?;
                let (r, s, recovery_id) = self
                    .sign_digest(&self.evm_path(account_index), digest)
                    .await?;
                Ok(assemble_signature_hex(&r, &s, 27 + recovery_id))
            }
            (RpcMethod::AvalancheSignMessage, MessageData::Raw(message)) => {
                let digest = avalanche::message_digest(message.as_bytes());
                let path = derivation_path(VMKind::Avm, account_index, DerivationScheme::Bip44);
                let (r, s, v) = self.sign_digest(&path, digest).await?;
                Ok(assemble_signature_hex(&r, &s, v))
            }
            (RpcMethod::SolanaSignMessage, _) => Err(WalletError::UnsupportedOperation(
                "solana message signing",
            )),
            _ => Err(WalletError::UnsupportedOperation(
                "message payload does not match the rpc method",
            )),
        }
    }

    async fn get_public_key(&self, account_index: u32) -> Result<PubKeyType> {
        let evm = hex::encode(record_key(
            &self.public_keys,
            &self.evm_path(account_index),
        )?);
        let xp_path = derivation_path(VMKind::Avm, account_index, DerivationScheme::Bip44);
        let xp = record_key(&self.public_keys, &xp_path).ok().map(hex::encode);
        Ok(PubKeyType { evm, xp })
    }

    async fn get_addresses(
        &self,
        account_index: u32,
        context: &AvalancheContext,
        btc_network: Network,
    ) -> Result<HashMap<VMKind, String>> {
        addresses_from_records(
            &self.public_keys,
            account_index,
            DerivationScheme::Bip44,
            context,
            btc_network,
        )
    }

    async fn get_read_only_signer(&self, _account_index: u32) -> Result<ReadOnlySigner> {
        Err(WalletError::UnsupportedOperation(
            "read-only avalanche signer on the remote backend",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Curve;

    struct FixedSigner;

    #[async_trait]
    impl RemoteSigner for FixedSigner {
        async fn sign_secp256k1(
            &self,
            _path: &str,
            _digest: [u8; 32],
        ) -> anyhow::Result<Vec<u8>> {
            let mut signature = vec![2u8; 64];
            signature.push(1);
            Ok(signature)
        }

        async fn sign_ed25519(&self, _path: &str, message: &[u8]) -> anyhow::Result<Vec<u8>> {
            anyhow::ensure!(!message.is_empty(), "empty message");
            Ok(vec![3u8; 64])
        }
    }

    fn wallet() -> SeedlessWallet {
        SeedlessWallet::new(
            vec![PublicKeyRecord {
                key: "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798"
                    .to_string(),
                derivation_path: "m/44'/60'/0'/0/0".to_string(),
                curve: Curve::Secp256k1,
                btc_wallet_policy: None,
            }],
            Arc::new(FixedSigner),
        )
    }

    #[tokio::test]
    async fn test_solana_signature_is_base58() {
        use base64::Engine;
        let request = SolanaTransactionRequest {
            account: "1111".to_string(),
            serialized_tx: base64::engine::general_purpose::STANDARD.encode([1u8, 2, 3]),
        };
        let signature = wallet().sign_svm_transaction(&request, 0).await.unwrap();
        assert_eq!(
            bs58::decode(&signature).into_vec().unwrap(),
            vec![3u8; 64]
        );
    }

    #[tokio::test]
    async fn test_read_only_signer_is_unsupported() {
        assert!(matches!(
            wallet().get_read_only_signer(0).await,
            Err(WalletError::UnsupportedOperation(_))
        ));
    }

    #[tokio::test]
    async fn test_avalanche_message_signature_shape() {
        let signature = wallet()
            .sign_message(
                RpcMethod::AvalancheSignMessage,
                &MessageData::Raw("hello".to_string()),
                0,
                &NetworkInfo {
                    vm: VMKind::Avm,
                    chain_id: 0,
                    is_testnet: false,
                },
            )
            .await
            .unwrap();
        assert!(signature.starts_with("0x"));
        assert_eq!(signature.len(), 132);
        assert!(signature.ends_with("01"));
    }
}
