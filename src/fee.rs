//! Burn-amount validation for Avalanche transactions.
//!
//! Runs after assembly and before any signature is requested. A transaction
//! whose burned value strays outside the tolerance band around the expected
//! fee is refused outright; there is no clamping or silent retry.

use tracing::debug;

use crate::chains::avalanche::tx::UnsignedAvaxTx;
use crate::chains::avalanche::AvalancheContext;
use crate::errors::{Result, WalletError};
use crate::types::{FeeValidationResult, VMKind};

/// Default tolerance, in percent, around the expected fee.
pub const EVM_FEE_TOLERANCE: u32 = 50;

/// Compare the transaction's burned value against the expected fee.
///
/// The expected fee for C-chain atomic (CoreEth) transactions is the
/// caller-observed EVM base fee; for X/P transactions it is the network's
/// flat base transaction fee. The band is symmetric and the boundaries are
/// inclusive: burned == expected*(100+tol)/100 is still valid.
pub fn validate_burned_amount(
    tx: &UnsignedAvaxTx,
    context: &AvalancheContext,
    evm_base_fee: Option<u64>,
    tolerance_percent: u32,
) -> Result<FeeValidationResult> {
    let expected_fee = match tx.vm {
        VMKind::CoreEth => evm_base_fee.ok_or(WalletError::MissingFeeData)?,
        VMKind::Avm | VMKind::Pvm => context.base_tx_fee,
        _ => {
            return Err(WalletError::UnsupportedOperation(
                "burn validation only applies to avalanche transactions",
            ))
        }
    };

    let burned = tx.burned_amount()?;

    let tolerance = u128::from(tolerance_percent);
    let expected = u128::from(expected_fee);
    let lower = expected * (100u128.saturating_sub(tolerance)) / 100;
    let upper = expected * (100 + tolerance) / 100;
    let is_valid = u128::from(burned) >= lower && u128::from(burned) <= upper;

    debug!(
        vm = ?tx.vm,
        burned,
        expected_fee,
        tolerance_percent,
        is_valid,
        "validated burned amount"
    );

    Ok(FeeValidationResult {
        is_valid,
        expected_fee,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::avalanche::tx::{AvaxTxKind, AvaxUtxo, TransferOutput};

    fn context() -> AvalancheContext {
        AvalancheContext {
            network_id: 1,
            hrp: "avax".to_string(),
            avax_asset_id: "avax".to_string(),
            base_tx_fee: 1_000_000,
            is_testnet: false,
        }
    }

    fn tx_burning(vm: VMKind, burned: u64) -> UnsignedAvaxTx {
        UnsignedAvaxTx {
            vm,
            network_id: 1,
            kind: AvaxTxKind::BaseP,
            inputs: vec![AvaxUtxo {
                utxo_id: "a".to_string(),
                asset_id: "avax".to_string(),
                amount: 10_000_000 + burned,
                owner_address: "P-avax1qq".to_string(),
            }],
            outputs: vec![TransferOutput {
                address: "P-avax1xx".to_string(),
                amount: 10_000_000,
            }],
            staked_outputs: vec![],
            evm_nonce: None,
        }
    }

    #[test]
    fn test_exact_fee_is_valid() {
        let result =
            validate_burned_amount(&tx_burning(VMKind::Pvm, 1_000_000), &context(), None, 50)
                .unwrap();
        assert!(result.is_valid);
        assert_eq!(result.expected_fee, 1_000_000);
    }

    #[test]
    fn test_tolerance_band_boundaries() {
        let ctx = context();
        // 40% over the expected fee: inside the 50% band
        assert!(
            validate_burned_amount(&tx_burning(VMKind::Pvm, 1_400_000), &ctx, None, 50)
                .unwrap()
                .is_valid
        );
        // 60% over: outside
        assert!(
            !validate_burned_amount(&tx_burning(VMKind::Pvm, 1_600_000), &ctx, None, 50)
                .unwrap()
                .is_valid
        );
        // The upper boundary itself is valid, one nAVAX above is not
        assert!(
            validate_burned_amount(&tx_burning(VMKind::Pvm, 1_500_000), &ctx, None, 50)
                .unwrap()
                .is_valid
        );
        assert!(
            !validate_burned_amount(&tx_burning(VMKind::Pvm, 1_500_001), &ctx, None, 50)
                .unwrap()
                .is_valid
        );
        // Same for the lower boundary
        assert!(
            validate_burned_amount(&tx_burning(VMKind::Pvm, 500_000), &ctx, None, 50)
                .unwrap()
                .is_valid
        );
        assert!(
            !validate_burned_amount(&tx_burning(VMKind::Pvm, 499_999), &ctx, None, 50)
                .unwrap()
                .is_valid
        );
    }

    #[test]
    fn test_core_eth_requires_evm_base_fee() {
        let tx = tx_burning(VMKind::CoreEth, 2_000_000);
        assert!(matches!(
            validate_burned_amount(&tx, &context(), None, 50),
            Err(WalletError::MissingFeeData)
        ));

        let result = validate_burned_amount(&tx, &context(), Some(2_000_000), 50).unwrap();
        assert!(result.is_valid);
        assert_eq!(result.expected_fee, 2_000_000);
    }

    #[test]
    fn test_non_avalanche_vm_is_rejected() {
        assert!(matches!(
            validate_burned_amount(&tx_burning(VMKind::Evm, 0), &context(), None, 50),
            Err(WalletError::UnsupportedOperation(_))
        ));
    }
}
