//! Derivation-path construction for every supported VM and scheme, plus the
//! seed-based key derivation used by backends that hold local key material.

use anyhow::{Context, Result};
use bip39::{Language, Mnemonic};
use coins_bip32::path::DerivationPath;
use coins_bip32::prelude::*;
use k256::ecdsa::SigningKey;

use crate::types::{DerivationScheme, VMKind};

/// SLIP-44 coin type shared by EVM, CoreEth and (historically) Bitcoin
/// accounts in this wallet.
pub const EVM_COIN_TYPE: u32 = 60;
/// SLIP-44 coin type for Avalanche X/P chains.
pub const AVAX_COIN_TYPE: u32 = 9000;
/// SLIP-44 coin type for Solana.
pub const SOLANA_COIN_TYPE: u32 = 501;

/// Address-level derivation path for the given account index, VM and scheme.
///
/// BIP44 keeps a single hardened account and fans accounts out over the
/// address index; Ledger Live hardens the account index itself.
pub fn derivation_path(vm: VMKind, account_index: u32, scheme: DerivationScheme) -> String {
    match vm {
        VMKind::Evm | VMKind::CoreEth | VMKind::Bitcoin => match scheme {
            DerivationScheme::Bip44 => format!("m/44'/{EVM_COIN_TYPE}'/0'/0/{account_index}"),
            DerivationScheme::LedgerLive => format!("m/44'/{EVM_COIN_TYPE}'/{account_index}'/0/0"),
        },
        VMKind::Avm | VMKind::Pvm => {
            format!("m/44'/{AVAX_COIN_TYPE}'/0'/0/{account_index}")
        }
        VMKind::Solana => format!("m/44'/{SOLANA_COIN_TYPE}'/{account_index}'/0'"),
    }
}

/// Account-level (hardened) path used for hardware xpub export and Bitcoin
/// wallet-policy registration.
pub fn extended_public_key_path(vm: VMKind, account_index: u32) -> String {
    match vm {
        VMKind::Avm | VMKind::Pvm => format!("m/44'/{AVAX_COIN_TYPE}'/{account_index}'"),
        _ => format!("m/44'/{EVM_COIN_TYPE}'/{account_index}'"),
    }
}

/// Signing path relative to the account-level path, as expected by the
/// Avalanche device app: `{change}/{index}`.
pub fn relative_signing_path(change: u32, index: u32) -> String {
    format!("{change}/{index}")
}

/// Parse a BIP39 mnemonic and produce the BIP32 seed.
pub fn seed_from_mnemonic(mnemonic: &str) -> Result<[u8; 64]> {
    let mnemonic = Mnemonic::parse_in(Language::English, mnemonic).context("Invalid mnemonic")?;
    Ok(mnemonic.to_seed(""))
}

/// Derive a secp256k1 signing key from a seed at the given path.
pub fn derive_secp256k1_key(seed: &[u8], path: &str) -> Result<SigningKey> {
    let derivation_path = path
        .parse::<DerivationPath>()
        .context("Invalid derivation path")?;

    let master_key = XPriv::root_from_seed(seed, None).context("Failed to derive master key")?;
    let derived_key = master_key
        .derive_path(&derivation_path)
        .context("Failed to derive key")?;

    let signing_key: &SigningKey = derived_key.as_ref();
    Ok(signing_key.clone())
}

/// Compressed secp256k1 public key bytes for a seed and path.
pub fn derive_secp256k1_pubkey(seed: &[u8], path: &str) -> Result<Vec<u8>> {
    let signing_key = derive_secp256k1_key(seed, path)?;
    Ok(signing_key
        .verifying_key()
        .to_encoded_point(true)
        .as_bytes()
        .to_vec())
}

/// Derive an ed25519 signing key using hardened SLIP-0010-style derivation
/// (used for Solana address display only; Solana signing stays on the
/// hardware backend).
pub fn derive_ed25519_key(seed: &[u8], path: &[u32]) -> [u8; 32] {
    use sha2::{Digest, Sha512};

    let mut key = seed.to_vec();

    for &index in path {
        let hardened_index = index | 0x8000_0000;

        let mut hasher = Sha512::new();
        hasher.update(b"ed25519 seed");
        hasher.update(&key);
        hasher.update(hardened_index.to_be_bytes());
        let derived = hasher.finalize();

        key = derived[..32].to_vec();
    }

    key[0] &= 248;
    key[31] &= 127;
    key[31] |= 64;

    let mut result = [0u8; 32];
    result.copy_from_slice(&key);
    result
}
