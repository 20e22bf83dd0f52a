//! End-to-end scenarios over the wallet service with mocked chain providers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;

use summit_core::chains::avalanche::builder::MIN_STAKE_TESTNET_NAVAX;
use summit_core::chains::avalanche::tx::{AvaxUtxo, SignedAvaxTx};
use summit_core::chains::avalanche::{
    address_from_pubkey, AvalancheContext, AvalancheProvider, ChainAlias,
};
use summit_core::fee::{validate_burned_amount, EVM_FEE_TOLERANCE};
use summit_core::wallet::factory::WalletInit;
use summit_core::{
    AvalancheTransactionRequest, CustodyType, DerivationScheme, MemorySecretStore, NetworkInfo,
    SignTransactionRequest, StakeParameters, VMKind, WalletError, WalletService,
};

const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("summit_core=debug")
        .with_test_writer()
        .try_init();
}

struct MockProvider {
    context: AvalancheContext,
    utxos: Vec<AvaxUtxo>,
    utxo_fetches: AtomicUsize,
}

#[async_trait::async_trait]
impl AvalancheProvider for MockProvider {
    async fn context(&self) -> anyhow::Result<AvalancheContext> {
        Ok(self.context.clone())
    }

    async fn get_utxos(
        &self,
        _chain: ChainAlias,
        _addresses: &[String],
    ) -> anyhow::Result<Vec<AvaxUtxo>> {
        self.utxo_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.utxos.clone())
    }

    async fn get_atomic_utxos(
        &self,
        _source: ChainAlias,
        _destination: ChainAlias,
        _addresses: &[String],
    ) -> anyhow::Result<Vec<AvaxUtxo>> {
        self.utxo_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(vec![])
    }

    async fn evm_nonce(&self, _address: &str) -> anyhow::Result<u64> {
        Ok(0)
    }
}

fn fuji_context() -> AvalancheContext {
    AvalancheContext {
        network_id: 5,
        hrp: "fuji".to_string(),
        avax_asset_id: "avax".to_string(),
        base_tx_fee: 1_000_000,
        is_testnet: true,
    }
}

fn utxo(id: &str, amount: u64) -> AvaxUtxo {
    AvaxUtxo {
        utxo_id: id.to_string(),
        asset_id: "avax".to_string(),
        amount,
        owner_address: "P-fuji1qq".to_string(),
    }
}

fn service_with(utxos: Vec<AvaxUtxo>) -> (WalletService, Arc<MockProvider>) {
    let provider = Arc::new(MockProvider {
        context: fuji_context(),
        utxos,
        utxo_fetches: AtomicUsize::new(0),
    });
    (
        WalletService::new(Arc::new(MemorySecretStore::new()), provider.clone()),
        provider,
    )
}

fn mnemonic_init() -> WalletInit {
    WalletInit {
        wallet_id: "primary".to_string(),
        custody_type: CustodyType::Mnemonic,
        derivation_scheme: DerivationScheme::Bip44,
        account_count: 1,
        mnemonic: Some(MNEMONIC.to_string()),
        transport: None,
        qr_signer: None,
        remote_signer: None,
        master_fingerprint: None,
        public_keys: vec![],
    }
}

fn stake_params(now: i64) -> StakeParameters {
    StakeParameters {
        node_id: "NodeID-7Xhw2mDxuDS44j42TCB6U5579esbSt3Lg".to_string(),
        stake_amount: 2_000_000_000,
        start_time: now + 600,
        end_time: now + 600 + 2 * 24 * 60 * 60,
        reward_address: address_from_pubkey(ChainAlias::P, "fuji", &[2u8; 33]).unwrap(),
    }
}

// Scenario A: a valid delegation is built, burn-validated and signed, and
// the credentials land in path order.
#[tokio::test]
async fn delegation_builds_and_signs_end_to_end() {
    init_tracing();
    let (service, _) = service_with(vec![utxo("a", 3_000_000_000)]);
    service.init(mnemonic_init()).await.unwrap();

    let tx = service
        .create_add_delegator_tx(
            &stake_params(Utc::now().timestamp()),
            "P-fuji1change",
            &["P-fuji1qq".to_string()],
        )
        .await
        .unwrap();
    assert_eq!(tx.staked_total(), 2_000_000_000);
    assert_eq!(tx.burned_amount().unwrap(), 1_000_000);

    let request = SignTransactionRequest::Avalanche(AvalancheTransactionRequest {
        tx,
        external_indices: Some(vec![0]),
        internal_indices: None,
    });
    let network = NetworkInfo {
        vm: VMKind::Pvm,
        chain_id: 0,
        is_testnet: true,
    };
    let json = service
        .sign(CustodyType::Mnemonic, &request, 0, &network)
        .await
        .unwrap();

    let signed: SignedAvaxTx = serde_json::from_str(&json).unwrap();
    assert_eq!(signed.credentials.len(), 1);
    assert_eq!(signed.credentials[0].signing_path, "0/0");
    assert_eq!(signed.credentials[0].signature.len(), 132);
}

// Scenario B: a below-minimum stake fails before any chain state is read.
#[tokio::test]
async fn below_minimum_stake_fetches_nothing() {
    init_tracing();
    let (service, provider) = service_with(vec![utxo("a", 3_000_000_000)]);
    service.init(mnemonic_init()).await.unwrap();

    let mut params = stake_params(Utc::now().timestamp());
    params.stake_amount = MIN_STAKE_TESTNET_NAVAX - 1;
    let err = service
        .create_add_delegator_tx(&params, "P-fuji1change", &["P-fuji1qq".to_string()])
        .await
        .unwrap_err();

    assert!(matches!(err, WalletError::StakeBelowMinimum { .. }));
    assert_eq!(provider.utxo_fetches.load(Ordering::SeqCst), 0);
}

// Scenario C: a transaction burning 60% over the expected fee is invalid,
// one burning 40% over is accepted. The builders always burn the exact base
// fee, so over-burning transactions are hand-built here the way a buggy or
// hostile dapp payload would arrive.
#[tokio::test]
async fn burn_tolerance_band_is_enforced() {
    use summit_core::chains::avalanche::tx::{AvaxTxKind, TransferOutput, UnsignedAvaxTx};

    let burning = |burned: u64| UnsignedAvaxTx {
        vm: VMKind::Pvm,
        network_id: 5,
        kind: AvaxTxKind::BaseP,
        inputs: vec![utxo("a", 10_000_000 + burned)],
        outputs: vec![TransferOutput {
            address: "P-fuji1dest".to_string(),
            amount: 10_000_000,
        }],
        staked_outputs: vec![],
        evm_nonce: None,
    };

    // 40% over the 1,000,000 nAVAX base fee: inside the band
    let result =
        validate_burned_amount(&burning(1_400_000), &fuji_context(), None, EVM_FEE_TOLERANCE)
            .unwrap();
    assert!(result.is_valid);
    assert_eq!(result.expected_fee, 1_000_000);

    // 60% over: rejected
    let result =
        validate_burned_amount(&burning(1_600_000), &fuji_context(), None, EVM_FEE_TOLERANCE)
            .unwrap();
    assert!(!result.is_valid);

    // A builder-produced transfer burns exactly the base fee and passes
    let (service, _) = service_with(vec![utxo("a", 12_000_000)]);
    service.init(mnemonic_init()).await.unwrap();
    let tx = service
        .create_send_p_tx(
            10_000_000,
            Some("P-fuji1dest"),
            "P-fuji1change",
            &["P-fuji1qq".to_string()],
        )
        .await
        .unwrap();
    assert_eq!(tx.burned_amount().unwrap(), 1_000_000);
}

#[tokio::test]
async fn termination_is_idempotent_and_blocks_signing() {
    let (service, _) = service_with(vec![]);
    service.init(mnemonic_init()).await.unwrap();

    service.terminate(CustodyType::Mnemonic).await;
    service.terminate(CustodyType::Mnemonic).await;

    let err = service
        .get_public_key(CustodyType::Mnemonic, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::WalletNotInitialized(_)));
}

#[tokio::test]
async fn request_arm_must_match_network_vm() {
    let (service, _) = service_with(vec![]);
    service.init(mnemonic_init()).await.unwrap();

    let request = SignTransactionRequest::Evm(Default::default());
    let network = NetworkInfo {
        vm: VMKind::Bitcoin,
        chain_id: 0,
        is_testnet: false,
    };
    let err = service
        .sign(CustodyType::Mnemonic, &request, 0, &network)
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::WrongProvider("evm")));
}

#[tokio::test]
async fn addresses_cover_every_vm() {
    let (service, _) = service_with(vec![]);
    service.init(mnemonic_init()).await.unwrap();

    let network = NetworkInfo {
        vm: VMKind::Evm,
        chain_id: 43113,
        is_testnet: true,
    };
    let addresses = service
        .get_addresses(CustodyType::Mnemonic, 0, &network)
        .await
        .unwrap();
    assert!(addresses[&VMKind::Evm].starts_with("0x"));
    assert!(addresses[&VMKind::Pvm].starts_with("P-fuji1"));
    assert!(addresses[&VMKind::Avm].starts_with("X-fuji1"));
    assert!(addresses[&VMKind::CoreEth].starts_with("C-fuji1"));
    assert!(addresses[&VMKind::Bitcoin].starts_with("tb1"));
    assert!(!addresses[&VMKind::Solana].is_empty());
}
