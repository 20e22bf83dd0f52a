//! Keystone QR-based offline signer backend.
//!
//! The device is air-gapped; requests are displayed as animated QR codes and
//! signatures are scanned back. The interactive plumbing is injected as a
//! [`QrSigner`]; this backend keeps the synced public keys and shapes the
//! payloads.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::Network;
use ethers_core::types::{Signature, U256};

use crate::chains::avalanche::{self, AvalancheContext};
use crate::chains::evm::{legacy_v, EvmTransactionRequest};
use crate::chains::solana::SolanaTransactionRequest;
use crate::chains::avalanche::tx::SignedAvaxTx;
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

/// One QR round-trip: display the payload, return the scanned 64/65-byte
/// compact signature. The trailing byte, when present, is the raw recovery
/// id (0 or 1), not an Ethereum-style `v`; callers add the 27 offset where
/// the output format calls for it.
#[async_trait]
pub trait QrSigner: Send + Sync {
    async fn request_signature(
        &self,
        master_fingerprint: &str,
        path: &str,
        payload: &[u8],
    ) -> anyhow::Result<Vec<u8>>;
}

pub struct KeystoneWallet {
    master_fingerprint: String,
    public_keys: Vec<PublicKeyRecord>,
    signer: Arc<dyn QrSigner>,
}

impl KeystoneWallet {
    pub fn new(
        master_fingerprint: String,
        public_keys: Vec<PublicKeyRecord>,
        signer: Arc<dyn QrSigner>,
    ) -> Self {
        Self {
            master_fingerprint,
            public_keys,
            signer,
        }
    }

    fn evm_path(&self, account_index: u32) -> String {
        derivation_path(VMKind::Evm, account_index, DerivationScheme::Bip44)
    }

    async fn request(&self, path: &str, payload: &[u8]) -> Result<Vec<u8>> {
        Ok(self
            .signer
            .request_signature(&self.master_fingerprint, path, payload)
            .await?)
    }
}

#[async_trait]
impl Wallet for KeystoneWallet {
    fn custody_type(&self) -> CustodyType {
        CustodyType::Keystone
    }

    async fn sign_evm_transaction(
        &self,
        tx: &EvmTransactionRequest,
        account_index: u32,
    ) -> Result<String> {
        let compact = self.request(&self.evm_path(account_index), &tx.rlp()).await?;
        let (r, s, recovery_id) = split_rsv(&compact)?;
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
        let payload = request.tx.to_bytes()?;
        let mut signed = SignedAvaxTx::new(request.tx.clone());
        for path in avalanche_signing_paths(request) {
            let compact = self
                .request(&format!("m/44'/9000'/0'/{path}"), &payload)
                .await?;
            let (r, s, v) = split_rsv(&compact)?;
            signed.add_signature(assemble_signature_hex(&r, &s, v), path);
        }
        signed.to_json()
    }

    async fn sign_btc_transaction(
        &self,
        _request: &BtcTransactionRequest,
        _account_index: u32,
        _network: Network,
    ) -> Result<String> {
        Err(WalletError::UnsupportedOperation(
            "bitcoin signing on the qr backend",
        ))
    }

    async fn sign_svm_transaction(
        &self,
        _request: &SolanaTransactionRequest,
        _account_index: u32,
    ) -> Result<String> {
        Err(WalletError::UnsupportedOperation(
            "solana signing on the qr backend",
        ))
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
                let compact = self
                    .request(&self.evm_path(account_index), message.as_bytes())
                    .await?;
                let (r, s, recovery_id) = split_rsv(&compact)?;
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
                let payload = serde_json::to_vec(typed)
                    .map_err(|e| WalletError::InvalidTypedData(e.to_string()))?;
                let compact = self.request(&self.evm_path(account_index), &payload).await?;
                let (r, s, recovery_id) = split_rsv(&compact)?;
                Ok(assemble_signature_hex(&r, &s, 27 + recovery_id))
            }
            (RpcMethod::AvalancheSignMessage, MessageData::Raw(message)) => {
                let digest = avalanche::message_digest(message.as_bytes());
                let path = derivation_path(VMKind::Avm, account_index, DerivationScheme::Bip44);
                let compact = self.request(&path, &digest).await?;
                let (r, s, v) = split_rsv(&compact)?;
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

    async fn get_read_only_signer(&self, account_index: u32) -> Result<ReadOnlySigner> {
        Ok(ReadOnlySigner {
            account_index,
            public_keys: self.get_public_key(account_index).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Curve;
    use tokio::sync::Mutex;

    struct RecordingSigner {
        requests: Mutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait]
    impl QrSigner for RecordingSigner {
        async fn request_signature(
            &self,
            _master_fingerprint: &str,
            path: &str,
            payload: &[u8],
        ) -> anyhow::Result<Vec<u8>> {
            self.requests
                .lock()
                .await
                .push((path.to_string(), payload.to_vec()));
            let mut signature = vec![1u8; 64];
            signature.push(0);
            Ok(signature)
        }
    }

    fn wallet() -> (KeystoneWallet, Arc<RecordingSigner>) {
        let signer = Arc::new(RecordingSigner {
            requests: Mutex::new(Vec::new()),
        });
        let records = vec![PublicKeyRecord {
            key: "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798"
                .to_string(),
            derivation_path: "m/44'/60'/0'/0/0".to_string(),
            curve: Curve::Secp256k1,
            btc_wallet_policy: None,
        }];
        (
            KeystoneWallet::new("f5abc1d2".to_string(), records, signer.clone()),
            signer,
        )
    }

    #[tokio::test]
    async fn test_personal_sign_routes_through_qr() {
        let (wallet, signer) = wallet();
        let signature = wallet
            .sign_message(
                RpcMethod::PersonalSign,
                &MessageData::Raw("hi".to_string()),
                0,
                &NetworkInfo {
                    vm: VMKind::Evm,
                    chain_id: 43114,
                    is_testnet: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(signature.len(), 132);
        // The scanned recovery id 0 becomes v = 27, same as the other backends
        assert!(signature.ends_with("1b"));
        let requests = signer.requests.lock().await;
        assert_eq!(requests[0].0, "m/44'/60'/0'/0/0");
        assert_eq!(requests[0].1, b"hi");
    }

    #[tokio::test]
    async fn test_btc_is_unsupported() {
        let (wallet, _) = wallet();
        let err = wallet
            .sign_btc_transaction(
                &BtcTransactionRequest {
                    inputs: vec![],
                    outputs: vec![],
                },
                0,
                Network::Bitcoin,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::UnsupportedOperation(_)));
    }

    #[tokio::test]
    async fn test_public_key_from_synced_records() {
        let (wallet, _) = wallet();
        let keys = wallet.get_public_key(0).await.unwrap();
        assert!(keys.evm.starts_with("0279be"));
        assert!(keys.xp.is_none());
    }
}
