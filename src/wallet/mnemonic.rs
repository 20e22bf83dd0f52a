//! Local mnemonic-backed wallet.
//!
//! Holds the BIP32 seed in process memory (wiped on drop) and signs
//! everything locally: EVM over k256, Avalanche over sha256 of the
//! transaction bytes, Bitcoin as p2wpkh. Solana signing stays on hardware
//! or remote backends.

use std::collections::HashMap;

use async_trait::async_trait;
use bitcoin::Network;
use ethers_core::types::transaction::eip712::Eip712;
use ethers_core::types::{Signature, U256};
use k256::ecdsa::SigningKey;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::chains::avalanche::tx::SignedAvaxTx;
use crate::chains::avalanche::{self, AvalancheContext, ChainAlias};
use crate::chains::bitcoin as btc;
use crate::chains::evm::{self, legacy_v, EvmTransactionRequest};
use crate::chains::solana::{self, SolanaTransactionRequest};
use crate::derivation::{
    derivation_path, derive_ed25519_key, derive_secp256k1_key, seed_from_mnemonic,
    SOLANA_COIN_TYPE,
};
use crate::errors::{Result, WalletError};
use crate::ledger::engine::assemble_signature_hex;
use crate::types::{
    AvalancheTransactionRequest, BtcTransactionRequest, CustodyType, DerivationScheme,
    MessageData, NetworkInfo, PubKeyType, RpcMethod, VMKind,
};
use crate::wallet::{avalanche_signing_paths, ReadOnlySigner, Wallet};

#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MnemonicWallet {
    seed: [u8; 64],
}

impl MnemonicWallet {
    pub fn new(mnemonic: &str) -> Result<Self> {
        let seed = seed_from_mnemonic(mnemonic)?;
        Ok(Self { seed })
    }

    fn key_at(&self, path: &str) -> Result<SigningKey> {
        Ok(derive_secp256k1_key(&self.seed, path)?)
    }

    fn evm_key(&self, account_index: u32) -> Result<SigningKey> {
        self.key_at(&derivation_path(
            VMKind::Evm,
            account_index,
            DerivationScheme::Bip44,
        ))
    }

    fn avax_key(&self, account_index: u32) -> Result<SigningKey> {
        self.key_at(&derivation_path(
            VMKind::Avm,
            account_index,
            DerivationScheme::Bip44,
        ))
    }

    fn sign_digest(key: &SigningKey, digest: &[u8; 32]) -> Result<([u8; 32], [u8; 32], u8)> {
        let (signature, recovery_id) = key
            .sign_prehash_recoverable(digest)
            .map_err(|e| WalletError::Provider(anyhow::anyhow!("signing failed: {e}")))?;
        let bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Ok((r, s, recovery_id.to_byte()))
    }

    fn compressed_pubkey(key: &SigningKey) -> Vec<u8> {
        key.verifying_key().to_encoded_point(true).as_bytes().to_vec()
    }

    fn uncompressed_pubkey(key: &SigningKey) -> Vec<u8> {
        key.verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec()
    }
}

#[async_trait]
impl Wallet for MnemonicWallet {
    fn custody_type(&self) -> CustodyType {
        CustodyType::Mnemonic
    }

    async fn sign_evm_transaction(
        &self,
        tx: &EvmTransactionRequest,
        account_index: u32,
    ) -> Result<String> {
        let key = self.evm_key(account_index)?;
        let (r, s, recovery_id) = Self::sign_digest(&key, &tx.sighash())?;
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
            let key = self.key_at(&format!("m/44'/9000'/0'/{path}"))?;
            let (r, s, v) = Self::sign_digest(&key, &digest)?;
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
        let key = self.key_at(&derivation_path(
            VMKind::Bitcoin,
            account_index,
            DerivationScheme::Bip44,
        ))?;
        let tx = btc::sign_p2wpkh(request, key.to_bytes().as_slice(), network)?;
        Ok(hex::encode(bitcoin::consensus::encode::serialize(&tx)))
    }

    async fn sign_svm_transaction(
        &self,
        _request: &SolanaTransactionRequest,
        _account_index: u32,
    ) -> Result<String> {
        Err(WalletError::UnsupportedOperation(
            "solana signing requires a hardware or remote backend",
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
                let digest = ethers_core::utils::hash_message(message.as_bytes()).0;
                let key = self.evm_key(account_index)?;
                let (r, s, recovery_id) = Self::sign_digest(&key, &digest)?;
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
                let key = self.evm_key(account_index)?;
                let (r, s, recovery_id) = Self::sign_digest(&key, &digest)?;
                Ok(assemble_signature_hex(&r, &s, 27 + recovery_id))
            }
            (RpcMethod::AvalancheSignMessage, MessageData::Raw(message)) => {
                let digest = avalanche::message_digest(message.as_bytes());
                let key = self.avax_key(account_index)?;
                let (r, s, v) = Self::sign_digest(&key, &digest)?;
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
        let evm = hex::encode(Self::compressed_pubkey(&self.evm_key(account_index)?));
        let xp = hex::encode(Self::compressed_pubkey(&self.avax_key(account_index)?));
        Ok(PubKeyType { evm, xp: Some(xp) })
    }

    async fn get_addresses(
        &self,
        account_index: u32,
        context: &AvalancheContext,
        btc_network: Network,
    ) -> Result<HashMap<VMKind, String>> {
        let evm_key = self.evm_key(account_index)?;
        let avax_key = self.avax_key(account_index)?;
        let evm_compressed = Self::compressed_pubkey(&evm_key);
        let avax_compressed = Self::compressed_pubkey(&avax_key);

        let solana_seed = derive_ed25519_key(
            &self.seed,
            &[44, SOLANA_COIN_TYPE, account_index, 0],
        );
        let solana_pubkey = ed25519_dalek::SigningKey::from_bytes(&solana_seed)
            .verifying_key()
            .to_bytes();

        let mut addresses = HashMap::new();
        addresses.insert(
            VMKind::Evm,
            evm::address_from_pubkey(&Self::uncompressed_pubkey(&evm_key))?,
        );
        addresses.insert(
            VMKind::Bitcoin,
            btc::p2wpkh_address(&evm_compressed, btc_network)?,
        );
        addresses.insert(
            VMKind::Avm,
            avalanche::address_from_pubkey(ChainAlias::X, &context.hrp, &avax_compressed)?,
        );
        addresses.insert(
            VMKind::Pvm,
            avalanche::address_from_pubkey(ChainAlias::P, &context.hrp, &avax_compressed)?,
        );
        addresses.insert(
            VMKind::CoreEth,
            avalanche::address_from_pubkey(ChainAlias::C, &context.hrp, &evm_compressed)?,
        );
        addresses.insert(VMKind::Solana, solana::address_from_pubkey(&solana_pubkey)?);
        Ok(addresses)
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
    use crate::chains::avalanche::tx::{AvaxTxKind, AvaxUtxo, TransferOutput, UnsignedAvaxTx};
    use ethereum_types::H160;
    use std::str::FromStr;

    const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn wallet() -> MnemonicWallet {
        MnemonicWallet::new(MNEMONIC).unwrap()
    }

    fn context() -> AvalancheContext {
        AvalancheContext {
            network_id: 1,
            hrp: "avax".to_string(),
            avax_asset_id: "avax".to_string(),
            base_tx_fee: 1_000_000,
            is_testnet: false,
        }
    }

    fn network() -> NetworkInfo {
        NetworkInfo {
            vm: VMKind::Evm,
            chain_id: 43114,
            is_testnet: false,
        }
    }

    #[test]
    fn test_known_first_evm_address() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let addresses = rt
            .block_on(wallet().get_addresses(0, &context(), Network::Bitcoin))
            .unwrap();
        // Reference address for the standard test mnemonic at m/44'/60'/0'/0/0
        assert_eq!(
            addresses[&VMKind::Evm],
            "0x9858EfFD232B4033E47d90003D41EC34EcaEda94"
        );
        assert!(addresses[&VMKind::Pvm].starts_with("P-avax1"));
        assert_eq!(&addresses[&VMKind::Avm][2..], &addresses[&VMKind::Pvm][2..]);
        assert!(addresses[&VMKind::Bitcoin].starts_with("bc1q"));
    }

    #[tokio::test]
    async fn test_evm_transaction_signs_and_serializes() {
        let tx = EvmTransactionRequest {
            from: None,
            to: Some(H160::from_str("0x9858EfFD232B4033E47d90003D41EC34EcaEda94").unwrap()),
            value: U256::from(1u64),
            data: vec![],
            nonce: Some(0),
            gas_limit: 21_000,
            gas_price: U256::from(25_000_000_000u64),
            chain_id: 43114,
        };
        let signed = wallet().sign_evm_transaction(&tx, 0).await.unwrap();
        assert!(signed.starts_with("0x"));
        assert!(signed.len() > 100);
    }

    #[tokio::test]
    async fn test_avalanche_signing_attaches_ordered_credentials() {
        let request = AvalancheTransactionRequest {
            tx: UnsignedAvaxTx {
                vm: VMKind::Pvm,
                network_id: 1,
                kind: AvaxTxKind::BaseP,
                inputs: vec![AvaxUtxo {
                    utxo_id: "a".to_string(),
                    asset_id: "avax".to_string(),
                    amount: 2_000_000,
                    owner_address: "P-avax1qq".to_string(),
                }],
                outputs: vec![TransferOutput {
                    address: "P-avax1xx".to_string(),
                    amount: 1_000_000,
                }],
                staked_outputs: vec![],
                evm_nonce: None,
            },
            external_indices: Some(vec![0, 1]),
            internal_indices: Some(vec![0]),
        };
        let json = wallet().sign_avalanche_transaction(&request, 0).await.unwrap();
        let signed: SignedAvaxTx = serde_json::from_str(&json).unwrap();
        assert_eq!(signed.credentials.len(), 3);
        assert_eq!(signed.credentials[0].signing_path, "0/0");
        assert_eq!(signed.credentials[2].signing_path, "1/0");
        for credential in &signed.credentials {
            assert_eq!(credential.signature.len(), 132);
            assert!(credential.signature.starts_with("0x"));
        }
        // Different paths, different keys, different signatures
        assert_ne!(
            signed.credentials[0].signature,
            signed.credentials[1].signature
        );
    }

    #[tokio::test]
    async fn test_personal_sign_recovers() {
        let wallet = wallet();
        let signature = wallet
            .sign_message(
                RpcMethod::PersonalSign,
                &MessageData::Raw("hello".to_string()),
                0,
                &network(),
            )
            .await
            .unwrap();
        assert_eq!(signature.len(), 132);
        let v = u8::from_str_radix(&signature[130..], 16).unwrap();
        assert!(v == 27 || v == 28);
    }

    #[tokio::test]
    async fn test_solana_and_v1_typed_data_are_unsupported() {
        let wallet = wallet();
        let request = SolanaTransactionRequest {
            account: "1111".to_string(),
            serialized_tx: String::new(),
        };
        assert!(matches!(
            wallet.sign_svm_transaction(&request, 0).await,
            Err(WalletError::UnsupportedOperation(_))
        ));
        assert!(matches!(
            wallet
                .sign_message(
                    RpcMethod::SignTypedDataV1,
                    &MessageData::TypedDataV1(serde_json::json!([])),
                    0,
                    &network(),
                )
                .await,
            Err(WalletError::UnsupportedOperation(_))
        ));
    }
}
