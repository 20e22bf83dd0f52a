//! Hardware wallet backend.
//!
//! Holds no key material; every operation is a device round-trip through the
//! signing engine. Derived public keys and the Bitcoin wallet policy live in
//! the injected secret store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::Network;
use tracing::info;

use crate::chains::avalanche::AvalancheContext;
use crate::chains::evm::EvmTransactionRequest;
use crate::chains::solana::SolanaTransactionRequest;
use crate::derivation::{derivation_path, extended_public_key_path};
use crate::errors::{Result, WalletError};
use crate::keystore::{load_wallet_data, save_wallet_data, SecretStore, StoredWalletData};
use crate::ledger::engine::LedgerEngine;
use crate::ledger::transport::{AppType, LedgerTransport};
use crate::policy::{find_policy, store_policy};
use crate::types::{
    AvalancheTransactionRequest, BtcTransactionRequest, Curve, CustodyType, DerivationScheme,
    MessageData, NetworkInfo, PubKeyType, PublicKeyRecord, RpcMethod, VMKind,
};
use crate::wallet::{avalanche_signing_paths, ReadOnlySigner, Wallet};

pub struct LedgerWallet {
    engine: LedgerEngine,
    store: Arc<dyn SecretStore>,
    wallet_id: String,
    scheme: DerivationScheme,
}

impl LedgerWallet {
    pub fn new(
        transport: Arc<dyn LedgerTransport>,
        store: Arc<dyn SecretStore>,
        wallet_id: String,
        scheme: DerivationScheme,
    ) -> Self {
        Self {
            engine: LedgerEngine::new(transport),
            store,
            wallet_id,
            scheme,
        }
    }

    /// First-run key export: account-level extended public keys plus the
    /// address-level public keys for the first `account_count` indices, all
    /// persisted in one record. Skipped when a record already exists.
    pub async fn initialize(&self, account_count: u32) -> Result<()> {
        if load_wallet_data(self.store.as_ref(), &self.wallet_id)?.is_some() {
            return Ok(());
        }

        let (xpub, _) = self
            .engine
            .get_extended_public_key(AppType::Ethereum, &extended_public_key_path(VMKind::Evm, 0))
            .await?;
        let (xpub_xp, _) = self
            .engine
            .get_extended_public_key(
                AppType::Avalanche,
                &extended_public_key_path(VMKind::Avm, 0),
            )
            .await?;

        let mut public_keys = Vec::new();
        for index in 0..account_count {
            let evm_path = derivation_path(VMKind::Evm, index, self.scheme);
            let key = self.engine.get_public_key(AppType::Ethereum, &evm_path).await?;
            public_keys.push(PublicKeyRecord {
                key,
                derivation_path: evm_path,
                curve: Curve::Secp256k1,
                btc_wallet_policy: None,
            });

            let xp_path = derivation_path(VMKind::Avm, index, DerivationScheme::Bip44);
            let key = self
                .engine
                .get_public_key(AppType::Avalanche, &xp_path)
                .await?;
            public_keys.push(PublicKeyRecord {
                key,
                derivation_path: xp_path,
                curve: Curve::Secp256k1,
                btc_wallet_policy: None,
            });
        }

        save_wallet_data(
            self.store.as_ref(),
            &self.wallet_id,
            &StoredWalletData {
                mnemonic: None,
                xpub: Some(xpub),
                xpub_xp: Some(xpub_xp),
                public_keys,
            },
        )?;
        info!(accounts = account_count, "exported hardware public keys");
        Ok(())
    }

    fn records(&self) -> Result<Vec<PublicKeyRecord>> {
        Ok(load_wallet_data(self.store.as_ref(), &self.wallet_id)?
            .map(|data| data.public_keys)
            .unwrap_or_default())
    }

    fn stored_key(&self, path: &str) -> Result<Vec<u8>> {
        crate::wallet::record_key(&self.records()?, path)
    }

    fn evm_path(&self, account_index: u32) -> String {
        derivation_path(VMKind::Evm, account_index, self.scheme)
    }

    /// Register the Bitcoin wallet policy for an account and persist the
    /// resulting credential. Returns whether persistence succeeded.
    pub async fn register_btc_policy(&self, account_index: u32, name: &str) -> Result<bool> {
        let policy = self.engine.register_btc_policy(account_index, name).await?;
        Ok(store_policy(
            self.store.as_ref(),
            &self.wallet_id,
            policy,
            account_index,
            self.scheme,
        ))
    }
}

#[async_trait]
impl Wallet for LedgerWallet {
    fn custody_type(&self) -> CustodyType {
        CustodyType::Ledger
    }

    async fn sign_evm_transaction(
        &self,
        tx: &EvmTransactionRequest,
        account_index: u32,
    ) -> Result<String> {
        let signature = self
            .engine
            .sign_evm_transaction(&self.evm_path(account_index), tx)
            .await?;
        Ok(format!("0x{}", hex::encode(tx.rlp_signed(&signature))))
    }

    async fn sign_avalanche_transaction(
        &self,
        request: &AvalancheTransactionRequest,
        _account_index: u32,
    ) -> Result<String> {
        let account_path = extended_public_key_path(VMKind::Avm, 0);
        let paths = avalanche_signing_paths(request);
        let signed = self
            .engine
            .sign_avalanche_tx(&account_path, &request.tx, &paths)
            .await?;
        signed.to_json()
    }

    async fn sign_btc_transaction(
        &self,
        request: &BtcTransactionRequest,
        account_index: u32,
        _network: Network,
    ) -> Result<String> {
        let records = self.records()?;
        let policy = find_policy(&records, account_index, self.scheme)
            .ok_or(WalletError::PolicyRegistrationRequired { account_index })?;
        self.engine
            .sign_btc_transaction(request, policy, account_index)
            .await
    }

    async fn sign_svm_transaction(
        &self,
        request: &SolanaTransactionRequest,
        account_index: u32,
    ) -> Result<String> {
        let path = derivation_path(VMKind::Solana, account_index, DerivationScheme::Bip44);
        let signature = self
            .engine
            .sign_solana_tx(&path, &request.message_bytes()?)
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
                self.engine
                    .sign_evm_message(&self.evm_path(account_index), message.as_bytes())
                    .await
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
                self.engine
                    .sign_typed_data(&self.evm_path(account_index), typed)
                    .await
            }
            (RpcMethod::AvalancheSignMessage, MessageData::Raw(message)) => {
                let account_path = extended_public_key_path(VMKind::Avm, 0);
                self.engine
                    .sign_avalanche_message(&account_path, message.as_bytes())
                    .await
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
        let evm = hex::encode(self.stored_key(&self.evm_path(account_index))?);
        let xp_path = derivation_path(VMKind::Avm, account_index, DerivationScheme::Bip44);
        let xp = self.stored_key(&xp_path).ok().map(hex::encode);
        Ok(PubKeyType { evm, xp })
    }

    async fn get_addresses(
        &self,
        account_index: u32,
        context: &AvalancheContext,
        btc_network: Network,
    ) -> Result<HashMap<VMKind, String>> {
        crate::wallet::addresses_from_records(
            &self.records()?,
            account_index,
            self.scheme,
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
