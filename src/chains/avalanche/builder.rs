//! Avalanche transaction builders.
//!
//! Each builder fetches chain state once, assembles an [`UnsignedAvaxTx`] and
//! runs burn validation before returning. Validation failures are fatal; the
//! simulate variants exist for fee estimation and skip them.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::chains::avalanche::tx::{AvaxTxKind, AvaxUtxo, TransferOutput, UnsignedAvaxTx};
use crate::chains::avalanche::{
    is_valid_p_address, AvalancheContext, AvalancheProvider, ChainAlias,
};
use crate::errors::{Result, WalletError};
use crate::fee::{validate_burned_amount, EVM_FEE_TOLERANCE};
use crate::types::{StakeParameters, VMKind};

// ========== Network constants ==========

/// Hard cap on serialized P-chain transaction size.
pub const MAX_TX_SIZE_BYTES: usize = 64 * 1024;
/// Serialization overhead reserved for the non-input transaction fields.
const TX_OVERHEAD_BYTES: usize = 1024;

pub const MIN_STAKE_MAINNET_NAVAX: u64 = 25_000_000_000;
pub const MIN_STAKE_TESTNET_NAVAX: u64 = 1_000_000_000;
pub const MIN_STAKE_DURATION_MAINNET_SECS: i64 = 14 * 24 * 60 * 60;
pub const MIN_STAKE_DURATION_TESTNET_SECS: i64 = 24 * 60 * 60;

// ========== Stake validation ==========

/// Validate delegation parameters in a fixed order: node id, amount, start
/// date, duration, reward address. The first failure is returned; nothing
/// network-bound happens before all five pass.
pub fn validate_stake_parameters(
    params: &StakeParameters,
    context: &AvalancheContext,
    now: i64,
) -> Result<()> {
    if !params.node_id.starts_with("NodeID-") {
        return Err(WalletError::InvalidNodeId(params.node_id.clone()));
    }

    let minimum = if context.is_testnet {
        MIN_STAKE_TESTNET_NAVAX
    } else {
        MIN_STAKE_MAINNET_NAVAX
    };
    if params.stake_amount < minimum {
        return Err(WalletError::StakeBelowMinimum {
            minimum,
            actual: params.stake_amount,
        });
    }

    if params.start_time <= now {
        return Err(WalletError::StartDateInPast {
            start: params.start_time,
        });
    }

    let min_duration = if context.is_testnet {
        MIN_STAKE_DURATION_TESTNET_SECS
    } else {
        MIN_STAKE_DURATION_MAINNET_SECS
    };
    let minimum_end = params.start_time + min_duration;
    if params.end_time < minimum_end {
        return Err(WalletError::StakeDurationTooShort { minimum_end });
    }

    if !is_valid_p_address(&params.reward_address, &context.hrp) {
        return Err(WalletError::InvalidRewardAddress(
            params.reward_address.clone(),
        ));
    }

    Ok(())
}

// ========== UTXO helpers ==========

fn select_utxos(mut utxos: Vec<AvaxUtxo>, needed: u64) -> Result<Vec<AvaxUtxo>> {
    utxos.sort_by(|a, b| b.amount.cmp(&a.amount));
    let mut selected = Vec::new();
    let mut total = 0u64;
    for utxo in utxos {
        if total >= needed {
            break;
        }
        total += utxo.amount;
        selected.push(utxo);
    }
    if total < needed {
        return Err(WalletError::InsufficientBalance {
            needed,
            available: total,
        });
    }
    Ok(selected)
}

/// Cap a candidate UTXO set so the resulting transaction stays under
/// `max_bytes`. Keeps the largest-value UTXOs; trimming never fails by
/// itself, a too-small remainder surfaces later as `InsufficientBalance`.
pub fn trim_utxos_to_size(mut utxos: Vec<AvaxUtxo>, max_bytes: usize) -> Vec<AvaxUtxo> {
    utxos.sort_by(|a, b| b.amount.cmp(&a.amount));
    let mut kept = Vec::new();
    let mut used = TX_OVERHEAD_BYTES;
    for utxo in utxos {
        let size = serde_json::to_vec(&utxo).map(|b| b.len() + 1).unwrap_or(0);
        if used + size > max_bytes {
            break;
        }
        used += size;
        kept.push(utxo);
    }
    kept
}

fn total_amount(utxos: &[AvaxUtxo]) -> u64 {
    utxos.iter().map(|u| u.amount).sum()
}

// ========== Builder ==========

pub struct AvalancheTxBuilder {
    provider: Arc<dyn AvalancheProvider>,
}

impl AvalancheTxBuilder {
    pub fn new(provider: Arc<dyn AvalancheProvider>) -> Self {
        Self { provider }
    }

    fn check_burn(
        &self,
        tx: &UnsignedAvaxTx,
        context: &AvalancheContext,
        evm_base_fee: Option<u64>,
        should_validate: bool,
    ) -> Result<()> {
        if !should_validate {
            return Ok(());
        }
        let result = validate_burned_amount(tx, context, evm_base_fee, EVM_FEE_TOLERANCE)?;
        if !result.is_valid {
            return Err(WalletError::ExcessiveBurnAmount {
                expected_fee: result.expected_fee,
            });
        }
        Ok(())
    }

    async fn build_export_c(
        &self,
        from_address: &str,
        to_address: &str,
        amount: u64,
        evm_base_fee: u64,
        destination_chain: ChainAlias,
        should_validate: bool,
    ) -> Result<UnsignedAvaxTx> {
        let context = self.provider.context().await?;
        let nonce = self.provider.evm_nonce(from_address).await?;

        let tx = UnsignedAvaxTx {
            vm: VMKind::CoreEth,
            network_id: context.network_id,
            kind: AvaxTxKind::ExportC { destination_chain },
            inputs: vec![AvaxUtxo {
                utxo_id: format!("evm:{from_address}:{nonce}"),
                asset_id: context.avax_asset_id.clone(),
                amount: amount + evm_base_fee,
                owner_address: from_address.to_string(),
            }],
            outputs: vec![TransferOutput {
                address: to_address.to_string(),
                amount,
            }],
            staked_outputs: vec![],
            evm_nonce: Some(nonce),
        };

        self.check_burn(&tx, &context, Some(evm_base_fee), should_validate)?;
        Ok(tx)
    }

    /// C-chain atomic export. The EVM account funds the export, so the fee is
    /// the caller-observed EVM base fee and a nonce is attached.
    pub async fn export_c(
        &self,
        from_address: &str,
        to_address: &str,
        amount: u64,
        evm_base_fee: u64,
        destination_chain: ChainAlias,
    ) -> Result<UnsignedAvaxTx> {
        let tx = self
            .build_export_c(
                from_address,
                to_address,
                amount,
                evm_base_fee,
                destination_chain,
                true,
            )
            .await?;
        info!(amount, %destination_chain, "built c-chain export");
        Ok(tx)
    }

    /// Fee-estimation variant of [`export_c`](Self::export_c); skips burn
    /// validation.
    pub async fn simulate_export_c(
        &self,
        from_address: &str,
        to_address: &str,
        amount: u64,
        evm_base_fee: u64,
        destination_chain: ChainAlias,
    ) -> Result<UnsignedAvaxTx> {
        self.build_export_c(
            from_address,
            to_address,
            amount,
            evm_base_fee,
            destination_chain,
            false,
        )
        .await
    }

    async fn build_export_p(
        &self,
        amount: u64,
        destination_chain: ChainAlias,
        to_address: &str,
        change_address: &str,
        addresses: &[String],
        should_validate: bool,
    ) -> Result<UnsignedAvaxTx> {
        let context = self.provider.context().await?;
        let utxos = self.provider.get_utxos(ChainAlias::P, addresses).await?;

        let fee = context.base_tx_fee;
        let needed = amount + fee;
        let selected = select_utxos(utxos, needed)?;
        let change = total_amount(&selected) - needed;

        let mut outputs = vec![TransferOutput {
            address: to_address.to_string(),
            amount,
        }];
        if change > 0 {
            outputs.push(TransferOutput {
                address: change_address.to_string(),
                amount: change,
            });
        }

        let tx = UnsignedAvaxTx {
            vm: VMKind::Pvm,
            network_id: context.network_id,
            kind: AvaxTxKind::ExportP { destination_chain },
            inputs: selected,
            outputs,
            staked_outputs: vec![],
            evm_nonce: None,
        };

        self.check_burn(&tx, &context, None, should_validate)?;
        Ok(tx)
    }

    /// P-chain export toward another primary-network chain.
    pub async fn export_p(
        &self,
        amount: u64,
        destination_chain: ChainAlias,
        to_address: &str,
        change_address: &str,
        addresses: &[String],
    ) -> Result<UnsignedAvaxTx> {
        let tx = self
            .build_export_p(
                amount,
                destination_chain,
                to_address,
                change_address,
                addresses,
                true,
            )
            .await?;
        info!(amount, %destination_chain, "built p-chain export");
        Ok(tx)
    }

    /// Fee-estimation variant of [`export_p`](Self::export_p); skips burn
    /// validation.
    pub async fn simulate_export_p(
        &self,
        amount: u64,
        destination_chain: ChainAlias,
        to_address: &str,
        change_address: &str,
        addresses: &[String],
    ) -> Result<UnsignedAvaxTx> {
        self.build_export_p(
            amount,
            destination_chain,
            to_address,
            change_address,
            addresses,
            false,
        )
        .await
    }

    async fn build_import_p(
        &self,
        source_chain: ChainAlias,
        to_address: &str,
        addresses: &[String],
        should_validate: bool,
    ) -> Result<UnsignedAvaxTx> {
        let context = self.provider.context().await?;
        let utxos = self
            .provider
            .get_atomic_utxos(source_chain, ChainAlias::P, addresses)
            .await?;

        let fee = context.base_tx_fee;
        let total = total_amount(&utxos);
        if total <= fee && should_validate {
            return Err(WalletError::InsufficientBalance {
                needed: fee,
                available: total,
            });
        }

        let tx = UnsignedAvaxTx {
            vm: VMKind::Pvm,
            network_id: context.network_id,
            kind: AvaxTxKind::ImportP { source_chain },
            outputs: vec![TransferOutput {
                address: to_address.to_string(),
                amount: total.saturating_sub(fee),
            }],
            inputs: utxos,
            staked_outputs: vec![],
            evm_nonce: None,
        };

        self.check_burn(&tx, &context, None, should_validate)?;
        debug!(total, %source_chain, "built p-chain import");
        Ok(tx)
    }

    /// Import pending atomic UTXOs onto the P-chain. The fee is burned out of
    /// the imported value.
    pub async fn import_p(
        &self,
        source_chain: ChainAlias,
        to_address: &str,
        addresses: &[String],
    ) -> Result<UnsignedAvaxTx> {
        self.build_import_p(source_chain, to_address, addresses, true)
            .await
    }

    /// Fee-estimation variant of [`import_p`](Self::import_p); skips burn and
    /// balance validation so it works with an empty atomic set.
    pub async fn simulate_import_p(
        &self,
        source_chain: ChainAlias,
        to_address: &str,
        addresses: &[String],
    ) -> Result<UnsignedAvaxTx> {
        self.build_import_p(source_chain, to_address, addresses, false)
            .await
    }

    async fn build_import_c(
        &self,
        source_chain: ChainAlias,
        to_address: &str,
        addresses: &[String],
        evm_base_fee: Option<u64>,
        should_validate: bool,
    ) -> Result<UnsignedAvaxTx> {
        let context = self.provider.context().await?;
        let fee = evm_base_fee.ok_or(WalletError::MissingFeeData)?;
        let utxos = self
            .provider
            .get_atomic_utxos(source_chain, ChainAlias::C, addresses)
            .await?;

        let total = total_amount(&utxos);
        if total <= fee && should_validate {
            return Err(WalletError::InsufficientBalance {
                needed: fee,
                available: total,
            });
        }

        let tx = UnsignedAvaxTx {
            vm: VMKind::CoreEth,
            network_id: context.network_id,
            kind: AvaxTxKind::ImportC { source_chain },
            outputs: vec![TransferOutput {
                address: to_address.to_string(),
                amount: total.saturating_sub(fee),
            }],
            inputs: utxos,
            staked_outputs: vec![],
            evm_nonce: None,
        };

        self.check_burn(&tx, &context, Some(fee), should_validate)?;
        debug!(total, %source_chain, "built c-chain import");
        Ok(tx)
    }

    /// Import pending atomic UTXOs onto the C-chain. Requires the observed
    /// EVM base fee since the import fee is paid in C-chain terms.
    pub async fn import_c(
        &self,
        source_chain: ChainAlias,
        to_address: &str,
        addresses: &[String],
        evm_base_fee: Option<u64>,
    ) -> Result<UnsignedAvaxTx> {
        self.build_import_c(source_chain, to_address, addresses, evm_base_fee, true)
            .await
    }

    /// Fee-estimation variant of [`import_c`](Self::import_c); skips burn and
    /// balance validation so it works with an empty atomic set.
    pub async fn simulate_import_c(
        &self,
        source_chain: ChainAlias,
        to_address: &str,
        addresses: &[String],
        evm_base_fee: Option<u64>,
    ) -> Result<UnsignedAvaxTx> {
        self.build_import_c(source_chain, to_address, addresses, evm_base_fee, false)
            .await
    }

    async fn build_base_transfer(
        &self,
        chain: ChainAlias,
        vm: VMKind,
        kind: AvaxTxKind,
        amount: u64,
        to_address: Option<&str>,
        change_address: &str,
        addresses: &[String],
    ) -> Result<UnsignedAvaxTx> {
        let to_address = to_address.ok_or(WalletError::MissingDestinationAddress)?;
        let context = self.provider.context().await?;
        let mut utxos = self.provider.get_utxos(chain, addresses).await?;
        if vm == VMKind::Pvm {
            utxos = trim_utxos_to_size(utxos, MAX_TX_SIZE_BYTES);
        }

        let fee = context.base_tx_fee;
        let needed = amount + fee;
        let selected = select_utxos(utxos, needed)?;
        let change = total_amount(&selected) - needed;

        let mut outputs = vec![TransferOutput {
            address: to_address.to_string(),
            amount,
        }];
        if change > 0 {
            outputs.push(TransferOutput {
                address: change_address.to_string(),
                amount: change,
            });
        }

        let tx = UnsignedAvaxTx {
            vm,
            network_id: context.network_id,
            kind,
            inputs: selected,
            outputs,
            staked_outputs: vec![],
            evm_nonce: None,
        };

        self.check_burn(&tx, &context, None, true)?;
        Ok(tx)
    }

    /// P-chain base transfer. Applies the maximum-transaction-size UTXO trim.
    pub async fn send_p(
        &self,
        amount: u64,
        to_address: Option<&str>,
        change_address: &str,
        addresses: &[String],
    ) -> Result<UnsignedAvaxTx> {
        self.build_base_transfer(
            ChainAlias::P,
            VMKind::Pvm,
            AvaxTxKind::BaseP,
            amount,
            to_address,
            change_address,
            addresses,
        )
        .await
    }

    /// X-chain base transfer.
    pub async fn send_x(
        &self,
        amount: u64,
        to_address: Option<&str>,
        change_address: &str,
        addresses: &[String],
    ) -> Result<UnsignedAvaxTx> {
        self.build_base_transfer(
            ChainAlias::X,
            VMKind::Avm,
            AvaxTxKind::BaseX,
            amount,
            to_address,
            change_address,
            addresses,
        )
        .await
    }

    async fn build_add_delegator(
        &self,
        params: &StakeParameters,
        change_address: &str,
        addresses: &[String],
        should_validate: bool,
    ) -> Result<UnsignedAvaxTx> {
        let context = self.provider.context().await?;

        if should_validate {
            validate_stake_parameters(params, &context, Utc::now().timestamp())?;
        }

        let utxos = trim_utxos_to_size(
            self.provider.get_utxos(ChainAlias::P, addresses).await?,
            MAX_TX_SIZE_BYTES,
        );

        let fee = context.base_tx_fee;
        let needed = params.stake_amount + fee;
        let selected = select_utxos(utxos, needed)?;
        let change = total_amount(&selected) - needed;

        let mut outputs = Vec::new();
        if change > 0 {
            outputs.push(TransferOutput {
                address: change_address.to_string(),
                amount: change,
            });
        }

        let tx = UnsignedAvaxTx {
            vm: VMKind::Pvm,
            network_id: context.network_id,
            kind: AvaxTxKind::AddDelegator {
                node_id: params.node_id.clone(),
                start_time: params.start_time,
                end_time: params.end_time,
                reward_address: params.reward_address.clone(),
            },
            inputs: selected,
            outputs,
            staked_outputs: vec![TransferOutput {
                address: change_address.to_string(),
                amount: params.stake_amount,
            }],
            evm_nonce: None,
        };

        self.check_burn(&tx, &context, None, should_validate)?;
        Ok(tx)
    }

    /// P-chain delegation. All five stake invariants are checked before any
    /// UTXO is fetched.
    pub async fn add_delegator(
        &self,
        params: &StakeParameters,
        change_address: &str,
        addresses: &[String],
    ) -> Result<UnsignedAvaxTx> {
        let tx = self
            .build_add_delegator(params, change_address, addresses, true)
            .await?;
        info!(
            node_id = %params.node_id,
            stake = params.stake_amount,
            "built add-delegator"
        );
        Ok(tx)
    }

    /// Fee-estimation variant of [`add_delegator`](Self::add_delegator);
    /// skips stake and burn validation.
    pub async fn simulate_add_delegator(
        &self,
        params: &StakeParameters,
        change_address: &str,
        addresses: &[String],
    ) -> Result<UnsignedAvaxTx> {
        self.build_add_delegator(params, change_address, addresses, false)
            .await
    }

    /// UTXOs exported toward `destination_chain` and not yet imported.
    pub async fn get_atomic_utxos(
        &self,
        source_chain: ChainAlias,
        destination_chain: ChainAlias,
        addresses: &[String],
    ) -> Result<Vec<AvaxUtxo>> {
        Ok(self
            .provider
            .get_atomic_utxos(source_chain, destination_chain, addresses)
            .await?)
    }
}
