//! Signing and transaction-construction core for a multi-chain wallet.
//!
//! This crate builds unsigned transactions for several virtual machines
//! (Avalanche P/X/C chains, generic EVM chains, Bitcoin, Solana) and signs
//! them through one of four interchangeable custody backends:
//! - local mnemonic (secrets in process memory)
//! - Ledger hardware device over an injected BLE/APDU transport
//! - Keystone QR-based offline signer
//! - Seedless remote custodial signer
//!
//! UI, balance polling, RPC clients and persistence encryption are external
//! collaborators; they are consumed through the traits in [`keystore`],
//! [`chains`] and [`ledger::transport`].

pub mod chains;
pub mod derivation;
pub mod errors;
pub mod fee;
pub mod keystore;
pub mod ledger;
pub mod policy;
pub mod service;
pub mod types;
pub mod wallet;

// Re-export main types
pub use errors::{DeviceError, Result, WalletError};
pub use keystore::{MemorySecretStore, SecretStore, StoredWalletData};
pub use service::WalletService;
pub use types::*;
pub use wallet::{factory::WalletFactory, Wallet};
