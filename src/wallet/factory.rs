//! Wallet lifecycle: initialization, session-singleton access and
//! termination.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::errors::{Result, WalletError};
use crate::keystore::{remove_wallet_data, save_wallet_data, SecretStore, StoredWalletData};
use crate::ledger::transport::LedgerTransport;
use crate::types::{CustodyType, DerivationScheme, PublicKeyRecord};
use crate::wallet::keystone::{KeystoneWallet, QrSigner};
use crate::wallet::ledger::LedgerWallet;
use crate::wallet::mnemonic::MnemonicWallet;
use crate::wallet::seedless::{RemoteSigner, SeedlessWallet};
use crate::wallet::Wallet;

/// Everything needed to bring one custody backend up. Only the fields for
/// the chosen custody type are read.
pub struct WalletInit {
    pub wallet_id: String,
    pub custody_type: CustodyType,
    pub derivation_scheme: DerivationScheme,
    /// Derived account indices to activate up front
    pub account_count: u32,
    pub mnemonic: Option<String>,
    pub transport: Option<Arc<dyn LedgerTransport>>,
    pub qr_signer: Option<Arc<dyn QrSigner>>,
    pub remote_signer: Option<Arc<dyn RemoteSigner>>,
    pub master_fingerprint: Option<String>,
    /// Pre-synced public keys for QR/remote backends
    pub public_keys: Vec<PublicKeyRecord>,
}

struct ActiveWallet {
    wallet_id: String,
    wallet: Arc<dyn Wallet>,
}

/// Builds and owns the custody backends. Mnemonic and hardware wallets are
/// session singletons; QR and remote backends are rebuilt from cached public
/// keys on demand.
pub struct WalletFactory {
    store: Arc<dyn SecretStore>,
    active: Mutex<HashMap<CustodyType, ActiveWallet>>,
}

impl WalletFactory {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self {
            store,
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn SecretStore> {
        &self.store
    }

    /// Build the backend for `init`, persist what it needs for later
    /// sessions and make it the active wallet for its custody type.
    pub async fn initialize(&self, init: WalletInit) -> Result<Arc<dyn Wallet>> {
        let wallet: Arc<dyn Wallet> = match init.custody_type {
            CustodyType::Mnemonic => {
                let mnemonic = init
                    .mnemonic
                    .ok_or(WalletError::WalletNotInitialized("mnemonic"))?;
                let wallet = MnemonicWallet::new(&mnemonic)?;
                save_wallet_data(
                    self.store.as_ref(),
                    &init.wallet_id,
                    &StoredWalletData {
                        mnemonic: Some(mnemonic),
                        ..Default::default()
                    },
                )?;
                Arc::new(wallet)
            }
            CustodyType::Ledger => {
                let transport = init
                    .transport
                    .ok_or(WalletError::WalletNotInitialized("ledger"))?;
                let wallet = LedgerWallet::new(
                    transport,
                    self.store.clone(),
                    init.wallet_id.clone(),
                    init.derivation_scheme,
                );
                wallet.initialize(init.account_count).await?;
                Arc::new(wallet)
            }
            CustodyType::Keystone => {
                let signer = init
                    .qr_signer
                    .ok_or(WalletError::WalletNotInitialized("keystone"))?;
                let fingerprint = init
                    .master_fingerprint
                    .ok_or(WalletError::WalletNotInitialized("keystone"))?;
                save_wallet_data(
                    self.store.as_ref(),
                    &init.wallet_id,
                    &StoredWalletData {
                        public_keys: init.public_keys.clone(),
                        ..Default::default()
                    },
                )?;
                Arc::new(KeystoneWallet::new(fingerprint, init.public_keys, signer))
            }
            CustodyType::Seedless => {
                let signer = init
                    .remote_signer
                    .ok_or(WalletError::WalletNotInitialized("seedless"))?;
                save_wallet_data(
                    self.store.as_ref(),
                    &init.wallet_id,
                    &StoredWalletData {
                        public_keys: init.public_keys.clone(),
                        ..Default::default()
                    },
                )?;
                Arc::new(SeedlessWallet::new(init.public_keys, signer))
            }
        };

        info!(custody = init.custody_type.as_str(), "wallet initialized");
        self.active.lock().await.insert(
            init.custody_type,
            ActiveWallet {
                wallet_id: init.wallet_id,
                wallet: wallet.clone(),
            },
        );
        Ok(wallet)
    }

    /// The active backend for a custody type. No signing call succeeds
    /// before [`initialize`](Self::initialize).
    pub async fn create_wallet(&self, custody_type: CustodyType) -> Result<Arc<dyn Wallet>> {
        self.active
            .lock()
            .await
            .get(&custody_type)
            .map(|active| active.wallet.clone())
            .ok_or(WalletError::WalletNotInitialized(custody_type.as_str()))
    }

    /// Drop the active backend, wiping in-memory secrets. Idempotent; a
    /// second termination is a no-op.
    pub async fn terminate(&self, custody_type: CustodyType) {
        if self.active.lock().await.remove(&custody_type).is_some() {
            info!(custody = custody_type.as_str(), "wallet terminated");
        }
    }

    /// Terminate and remove the persisted record. Idempotent.
    pub async fn destroy(&self, custody_type: CustodyType) -> Result<()> {
        let wallet_id = {
            let mut active = self.active.lock().await;
            active.remove(&custody_type).map(|a| a.wallet_id)
        };
        if let Some(wallet_id) = wallet_id {
            remove_wallet_data(self.store.as_ref(), &wallet_id)?;
        }
        Ok(())
    }
}
