//! Caller-facing wallet service.
//!
//! One facade over the wallet factory and the Avalanche transaction
//! builders: lifecycle, signing dispatch, message signing, address and key
//! queries. RPC-facing layers talk to this type only.

use std::sync::Arc;

use bitcoin::Network;
use std::collections::HashMap;
use tracing::debug;

use crate::chains::avalanche::builder::AvalancheTxBuilder;
use crate::chains::avalanche::tx::{AvaxUtxo, UnsignedAvaxTx};
use crate::chains::avalanche::{AvalancheProvider, ChainAlias};
use crate::errors::{Result, WalletError};
use crate::keystore::SecretStore;
use crate::types::{
    CustodyType, MessageData, NetworkInfo, PubKeyType, RpcMethod, SignTransactionRequest,
    StakeParameters, VMKind,
};
use crate::wallet::factory::{WalletFactory, WalletInit};
use crate::wallet::ReadOnlySigner;

pub struct WalletService {
    factory: WalletFactory,
    avalanche: Arc<dyn AvalancheProvider>,
    builder: AvalancheTxBuilder,
}

impl WalletService {
    pub fn new(store: Arc<dyn SecretStore>, avalanche: Arc<dyn AvalancheProvider>) -> Self {
        Self {
            factory: WalletFactory::new(store),
            builder: AvalancheTxBuilder::new(avalanche.clone()),
            avalanche,
        }
    }

    pub fn factory(&self) -> &WalletFactory {
        &self.factory
    }

    fn btc_network(network: &NetworkInfo) -> Network {
        if network.is_testnet {
            Network::Testnet
        } else {
            Network::Bitcoin
        }
    }

    // ========== Lifecycle ==========

    pub async fn init(&self, init: WalletInit) -> Result<()> {
        self.factory.initialize(init).await?;
        Ok(())
    }

    /// Drop the active backend and its in-memory secrets.
    pub async fn terminate(&self, custody_type: CustodyType) {
        self.factory.terminate(custody_type).await;
    }

    /// Terminate and delete the persisted wallet record.
    pub async fn destroy(&self, custody_type: CustodyType) -> Result<()> {
        self.factory.destroy(custody_type).await
    }

    // ========== Signing ==========

    /// Sign a transaction with the active backend. The request arm must
    /// match the network's VM.
    pub async fn sign(
        &self,
        custody_type: CustodyType,
        request: &SignTransactionRequest,
        account_index: u32,
        network: &NetworkInfo,
    ) -> Result<String> {
        let wallet = self.factory.create_wallet(custody_type).await?;
        debug!(custody = custody_type.as_str(), vm = ?network.vm, "signing transaction");
        match (request, network.vm) {
            (SignTransactionRequest::Evm(tx), VMKind::Evm) => {
                wallet.sign_evm_transaction(tx, account_index).await
            }
            (
                SignTransactionRequest::Avalanche(tx),
                VMKind::Avm | VMKind::Pvm | VMKind::CoreEth,
            ) => wallet.sign_avalanche_transaction(tx, account_index).await,
            (SignTransactionRequest::Btc(tx), VMKind::Bitcoin) => {
                wallet
                    .sign_btc_transaction(tx, account_index, Self::btc_network(network))
                    .await
            }
            (SignTransactionRequest::Solana(tx), VMKind::Solana) => {
                wallet.sign_svm_transaction(tx, account_index).await
            }
            (SignTransactionRequest::Evm(_), _) => Err(WalletError::WrongProvider("evm")),
            (SignTransactionRequest::Avalanche(_), _) => {
                Err(WalletError::WrongProvider("avalanche"))
            }
            (SignTransactionRequest::Btc(_), _) => Err(WalletError::WrongProvider("bitcoin")),
            (SignTransactionRequest::Solana(_), _) => Err(WalletError::WrongProvider("solana")),
        }
    }

    pub async fn sign_message(
        &self,
        custody_type: CustodyType,
        rpc_method: RpcMethod,
        data: &MessageData,
        account_index: u32,
        network: &NetworkInfo,
    ) -> Result<String> {
        let wallet = self.factory.create_wallet(custody_type).await?;
        wallet
            .sign_message(rpc_method, data, account_index, network)
            .await
    }

    // ========== Queries ==========

    pub async fn get_addresses(
        &self,
        custody_type: CustodyType,
        account_index: u32,
        network: &NetworkInfo,
    ) -> Result<HashMap<VMKind, String>> {
        let wallet = self.factory.create_wallet(custody_type).await?;
        let context = self.avalanche.context().await?;
        wallet
            .get_addresses(account_index, &context, Self::btc_network(network))
            .await
    }

    pub async fn get_public_key(
        &self,
        custody_type: CustodyType,
        account_index: u32,
    ) -> Result<PubKeyType> {
        let wallet = self.factory.create_wallet(custody_type).await?;
        wallet.get_public_key(account_index).await
    }

    pub async fn get_read_only_signer(
        &self,
        custody_type: CustodyType,
        account_index: u32,
    ) -> Result<ReadOnlySigner> {
        let wallet = self.factory.create_wallet(custody_type).await?;
        wallet.get_read_only_signer(account_index).await
    }

    // ========== Avalanche builders ==========

    pub async fn create_export_c_tx(
        &self,
        from_address: &str,
        to_address: &str,
        amount: u64,
        evm_base_fee: u64,
        destination_chain: ChainAlias,
    ) -> Result<UnsignedAvaxTx> {
        self.builder
            .export_c(from_address, to_address, amount, evm_base_fee, destination_chain)
            .await
    }

    pub async fn create_export_p_tx(
        &self,
        amount: u64,
        destination_chain: ChainAlias,
        to_address: &str,
        change_address: &str,
        addresses: &[String],
    ) -> Result<UnsignedAvaxTx> {
        self.builder
            .export_p(amount, destination_chain, to_address, change_address, addresses)
            .await
    }

    pub async fn create_import_p_tx(
        &self,
        source_chain: ChainAlias,
        to_address: &str,
        addresses: &[String],
    ) -> Result<UnsignedAvaxTx> {
        self.builder.import_p(source_chain, to_address, addresses).await
    }

    pub async fn create_import_c_tx(
        &self,
        source_chain: ChainAlias,
        to_address: &str,
        addresses: &[String],
        evm_base_fee: Option<u64>,
    ) -> Result<UnsignedAvaxTx> {
        self.builder
            .import_c(source_chain, to_address, addresses, evm_base_fee)
            .await
    }

    pub async fn create_send_p_tx(
        &self,
        amount: u64,
        to_address: Option<&str>,
        change_address: &str,
        addresses: &[String],
    ) -> Result<UnsignedAvaxTx> {
        self.builder
            .send_p(amount, to_address, change_address, addresses)
            .await
    }

    pub async fn create_send_x_tx(
        &self,
        amount: u64,
        to_address: Option<&str>,
        change_address: &str,
        addresses: &[String],
    ) -> Result<UnsignedAvaxTx> {
        self.builder
            .send_x(amount, to_address, change_address, addresses)
            .await
    }

    pub async fn create_add_delegator_tx(
        &self,
        params: &StakeParameters,
        change_address: &str,
        addresses: &[String],
    ) -> Result<UnsignedAvaxTx> {
        self.builder
            .add_delegator(params, change_address, addresses)
            .await
    }

    pub async fn simulate_export_c_tx(
        &self,
        from_address: &str,
        to_address: &str,
        amount: u64,
        evm_base_fee: u64,
        destination_chain: ChainAlias,
    ) -> Result<UnsignedAvaxTx> {
        self.builder
            .simulate_export_c(from_address, to_address, amount, evm_base_fee, destination_chain)
            .await
    }

    pub async fn simulate_export_p_tx(
        &self,
        amount: u64,
        destination_chain: ChainAlias,
        to_address: &str,
        change_address: &str,
        addresses: &[String],
    ) -> Result<UnsignedAvaxTx> {
        self.builder
            .simulate_export_p(amount, destination_chain, to_address, change_address, addresses)
            .await
    }

    pub async fn simulate_import_c_tx(
        &self,
        source_chain: ChainAlias,
        to_address: &str,
        addresses: &[String],
        evm_base_fee: Option<u64>,
    ) -> Result<UnsignedAvaxTx> {
        self.builder
            .simulate_import_c(source_chain, to_address, addresses, evm_base_fee)
            .await
    }

    pub async fn simulate_import_p_tx(
        &self,
        source_chain: ChainAlias,
        to_address: &str,
        addresses: &[String],
    ) -> Result<UnsignedAvaxTx> {
        self.builder
            .simulate_import_p(source_chain, to_address, addresses)
            .await
    }

    pub async fn simulate_add_delegator_tx(
        &self,
        params: &StakeParameters,
        change_address: &str,
        addresses: &[String],
    ) -> Result<UnsignedAvaxTx> {
        self.builder
            .simulate_add_delegator(params, change_address, addresses)
            .await
    }

    pub async fn get_atomic_utxos(
        &self,
        source_chain: ChainAlias,
        destination_chain: ChainAlias,
        addresses: &[String],
    ) -> Result<Vec<AvaxUtxo>> {
        self.builder
            .get_atomic_utxos(source_chain, destination_chain, addresses)
            .await
    }
}
