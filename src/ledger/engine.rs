//! The hardware signing engine.
//!
//! Translates wallet-level signing calls into app-scoped device round-trips
//! and assembles the raw device signatures into the formats the rest of the
//! core consumes.

use std::sync::Arc;

use ethers_core::types::transaction::eip712::{Eip712, TypedData};
use ethers_core::types::{Signature, U256};
use tracing::{debug, info};

use crate::chains::avalanche::tx::{SignedAvaxTx, UnsignedAvaxTx};
use crate::chains::evm::{legacy_v, EvmTransactionRequest};
use crate::derivation::{extended_public_key_path, relative_signing_path};
use crate::errors::{DeviceError, Result, WalletError};
use crate::ledger::session::DeviceSession;
use crate::ledger::transport::{
    AppType, DeviceRequest, DeviceResponse, LedgerTransport, RawSignature,
};
use crate::policy::{parse_policy_details, WPKH_DESCRIPTOR_TEMPLATE};
use crate::types::{BtcTransactionRequest, BtcWalletPolicy, VMKind};

/// Hex signature in the wallet's canonical shape:
/// `0x` + r (64 chars, left-padded) + s (64 chars) + v (2 chars).
pub fn assemble_signature_hex(r: &[u8], s: &[u8], v: u8) -> String {
    format!("0x{:0>64}{:0>64}{:02x}", hex::encode(r), hex::encode(s), v)
}

pub struct LedgerEngine {
    session: DeviceSession,
}

impl LedgerEngine {
    pub fn new(transport: Arc<dyn LedgerTransport>) -> Self {
        Self {
            session: DeviceSession::new(transport),
        }
    }

    pub fn with_session(session: DeviceSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &DeviceSession {
        &self.session
    }

    async fn exchange(&self, app: AppType, request: DeviceRequest) -> Result<DeviceResponse> {
        Ok(self.session.execute(app, request).await?)
    }

    fn single_signature(response: DeviceResponse) -> Result<RawSignature> {
        match response {
            DeviceResponse::Signature(sig) => Ok(sig),
            _ => Err(DeviceError::UnexpectedResponse.into()),
        }
    }

    // ========== Key export ==========

    /// Account-level extended public key and master fingerprint.
    pub async fn get_extended_public_key(
        &self,
        app: AppType,
        path: &str,
    ) -> Result<(String, String)> {
        let response = self
            .exchange(
                app,
                DeviceRequest::GetExtendedPublicKey {
                    path: path.to_string(),
                },
            )
            .await?;
        match response {
            DeviceResponse::ExtendedPublicKey {
                xpub,
                master_fingerprint,
            } => Ok((xpub, master_fingerprint)),
            _ => Err(DeviceError::UnexpectedResponse.into()),
        }
    }

    /// Address-level public key, hex encoded.
    pub async fn get_public_key(&self, app: AppType, path: &str) -> Result<String> {
        let response = self
            .exchange(
                app,
                DeviceRequest::GetPublicKey {
                    path: path.to_string(),
                },
            )
            .await?;
        match response {
            DeviceResponse::PublicKey { key_hex } => Ok(key_hex),
            _ => Err(DeviceError::UnexpectedResponse.into()),
        }
    }

    // ========== EVM ==========

    pub async fn sign_evm_transaction(
        &self,
        path: &str,
        tx: &EvmTransactionRequest,
    ) -> Result<Signature> {
        let response = self
            .exchange(
                AppType::Ethereum,
                DeviceRequest::SignEvmTransaction {
                    path: path.to_string(),
                    rlp: tx.rlp(),
                },
            )
            .await?;
        let raw = Self::single_signature(response)?;
        Ok(Signature {
            r: U256::from_big_endian(&raw.r),
            s: U256::from_big_endian(&raw.s),
            v: legacy_v(raw.v, tx.chain_id),
        })
    }

    /// personal_sign / eth_sign over an already-prefixed message.
    pub async fn sign_evm_message(&self, path: &str, message: &[u8]) -> Result<String> {
        let response = self
            .exchange(
                AppType::Ethereum,
                DeviceRequest::SignEvmMessage {
                    path: path.to_string(),
                    message: message.to_vec(),
                },
            )
            .await?;
        let raw = Self::single_signature(response)?;
        Ok(assemble_signature_hex(&raw.r, &raw.s, raw.v))
    }

    /// EIP-712 signing. Structured signing is attempted first; only a
    /// capability error triggers the hashed fallback (domain separator and
    /// struct hash recomputed client-side for the declared primary type).
    /// User rejections and transport failures propagate untouched.
    pub async fn sign_typed_data(&self, path: &str, typed: &TypedData) -> Result<String> {
        let typed_data_json = serde_json::to_string(typed)
            .map_err(|e| WalletError::InvalidTypedData(e.to_string()))?;

        let first = self
            .session
            .execute(
                AppType::Ethereum,
                DeviceRequest::SignTypedData {
                    path: path.to_string(),
                    typed_data_json,
                },
            )
            .await;

        let response = match first {
            Ok(response) => response,
            Err(e) if e.is_capability_error() => {
                debug!("firmware lacks structured eip-712, retrying with hashes");
                let domain_separator = typed
                    .domain_separator()
                    .map_err(|e| WalletError::InvalidTypedData(e.to_string()))?;
                let struct_hash = typed
                    .struct_hash()
                    .map_err(|e| WalletError::InvalidTypedData(e.to_string()))?;
                self.session
                    .execute(
                        AppType::Ethereum,
                        DeviceRequest::SignHashedTypedData {
                            path: path.to_string(),
                            domain_separator,
                            struct_hash,
                        },
                    )
                    .await?
            }
            Err(e) => return Err(e.into()),
        };

        let raw = Self::single_signature(response)?;
        Ok(assemble_signature_hex(&raw.r, &raw.s, raw.v))
    }

    // ========== Avalanche ==========

    /// Sign an Avalanche transaction, one credential per signing path, in
    /// request order. An empty path set defaults to the account's first
    /// receive address.
    pub async fn sign_avalanche_tx(
        &self,
        account_path: &str,
        tx: &UnsignedAvaxTx,
        signing_paths: &[String],
    ) -> Result<SignedAvaxTx> {
        let paths = if signing_paths.is_empty() {
            vec![relative_signing_path(0, 0)]
        } else {
            signing_paths.to_vec()
        };

        let response = self
            .exchange(
                AppType::Avalanche,
                DeviceRequest::SignAvalancheTx {
                    account_path: account_path.to_string(),
                    tx_bytes: tx.to_bytes()?,
                    signing_paths: paths.clone(),
                },
            )
            .await?;
        let DeviceResponse::Signatures(signatures) = response else {
            return Err(DeviceError::UnexpectedResponse.into());
        };
        if signatures.len() != paths.len() {
            return Err(DeviceError::UnexpectedResponse.into());
        }

        let mut signed = SignedAvaxTx::new(tx.clone());
        for (raw, path) in signatures.iter().zip(paths) {
            signed.add_signature(assemble_signature_hex(&raw.r, &raw.s, raw.v), path);
        }
        info!(credentials = signed.credentials.len(), "signed avalanche tx");
        Ok(signed)
    }

    pub async fn sign_avalanche_message(&self, account_path: &str, message: &[u8]) -> Result<String> {
        let response = self
            .exchange(
                AppType::Avalanche,
                DeviceRequest::SignAvalancheMessage {
                    account_path: account_path.to_string(),
                    signing_path: relative_signing_path(0, 0),
                    message: message.to_vec(),
                },
            )
            .await?;
        let raw = Self::single_signature(response)?;
        Ok(assemble_signature_hex(&raw.r, &raw.s, raw.v))
    }

    // ========== Solana ==========

    /// Returns the raw 64-byte ed25519 signature.
    pub async fn sign_solana_tx(&self, path: &str, message: &[u8]) -> Result<Vec<u8>> {
        let response = self
            .exchange(
                AppType::Solana,
                DeviceRequest::SignSolanaTx {
                    path: path.to_string(),
                    message: message.to_vec(),
                },
            )
            .await?;
        let raw = Self::single_signature(response)?;
        let mut signature = Vec::with_capacity(64);
        signature.extend_from_slice(&raw.r);
        signature.extend_from_slice(&raw.s);
        Ok(signature)
    }

    // ========== Bitcoin ==========

    /// Interactive wallet-policy registration: exports the account xpub and
    /// fingerprint, registers the descriptor on-device and returns the full
    /// credential for persistence.
    pub async fn register_btc_policy(
        &self,
        account_index: u32,
        wallet_name: &str,
    ) -> Result<BtcWalletPolicy> {
        let path = extended_public_key_path(VMKind::Bitcoin, account_index);
        let (xpub, master_fingerprint) = self
            .get_extended_public_key(AppType::Bitcoin, &path)
            .await?;

        let key_origin = format!(
            "[{}/44'/60'/{}']{}",
            master_fingerprint.to_lowercase(),
            account_index,
            xpub
        );
        let response = self
            .exchange(
                AppType::Bitcoin,
                DeviceRequest::RegisterBtcPolicy {
                    name: wallet_name.to_string(),
                    descriptor_template: WPKH_DESCRIPTOR_TEMPLATE.to_string(),
                    keys: vec![key_origin],
                },
            )
            .await?;
        let DeviceResponse::PolicyRegistered { hmac_hex } = response else {
            return Err(DeviceError::UnexpectedResponse.into());
        };
        info!(account_index, "registered bitcoin wallet policy");

        Ok(BtcWalletPolicy {
            master_fingerprint,
            xpub,
            name: wallet_name.to_string(),
            hmac_hex,
        })
    }

    /// Sign a Bitcoin transaction under an already-registered policy.
    pub async fn sign_btc_transaction(
        &self,
        request: &BtcTransactionRequest,
        policy: &BtcWalletPolicy,
        account_index: u32,
    ) -> Result<String> {
        let details = parse_policy_details(policy, account_index)?;
        let response = self
            .exchange(
                AppType::Bitcoin,
                DeviceRequest::SignBtcTransaction {
                    request: request.clone(),
                    descriptor_template: details.descriptor_template,
                    keys: details.keys,
                    policy_hmac: details.hmac,
                },
            )
            .await?;
        match response {
            DeviceResponse::SignedBtcTransaction { tx_hex } => Ok(tx_hex),
            _ => Err(DeviceError::UnexpectedResponse.into()),
        }
    }
}
