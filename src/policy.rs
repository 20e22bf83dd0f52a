//! Bitcoin wallet-policy credentials for hardware signing.
//!
//! The device's Bitcoin app only signs for wallets it has registered; the
//! registration yields an HMAC the host must replay on every signing request.
//! That credential is persisted inside the `PublicKeyRecord` whose derivation
//! path is the account's EVM address path under the wallet's own derivation
//! scheme, so the record set stays a single flat list.

use tracing::warn;

use crate::derivation::derivation_path;
use crate::errors::{Result, WalletError};
use crate::keystore::{load_wallet_data, save_wallet_data, SecretStore};
use crate::types::{BtcWalletPolicy, Curve, DerivationScheme, PublicKeyRecord, VMKind};

/// Descriptor template for single-key segwit accounts; `@0` is the sole
/// registered key, `/**` covers both the receive and change branches.
pub const WPKH_DESCRIPTOR_TEMPLATE: &str = "wpkh(@0/**)";

/// A policy decoded into the form the device's registration and signing
/// instructions consume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDetails {
    pub name: String,
    pub descriptor_template: String,
    /// Key-origin annotated extended public key, e.g.
    /// `[f5abc1d2/44'/60'/0']xpub6Bmn...`
    pub keys: Vec<String>,
    pub hmac: Vec<u8>,
}

fn policy_record_path(account_index: u32, scheme: DerivationScheme) -> String {
    derivation_path(VMKind::Evm, account_index, scheme)
}

/// Find the stored policy for an account index, if any. The scheme must be
/// the one the wallet persisted its EVM records under.
pub fn find_policy<'a>(
    records: &'a [PublicKeyRecord],
    account_index: u32,
    scheme: DerivationScheme,
) -> Option<&'a BtcWalletPolicy> {
    let path = policy_record_path(account_index, scheme);
    records
        .iter()
        .find(|r| r.curve == Curve::Secp256k1 && r.derivation_path == path)
        .and_then(|r| r.btc_wallet_policy.as_ref())
}

/// True when Bitcoin signing for this account would need an interactive
/// registration round first.
pub fn needs_registration(
    records: &[PublicKeyRecord],
    account_index: u32,
    scheme: DerivationScheme,
) -> bool {
    find_policy(records, account_index, scheme).is_none()
}

/// Persist a freshly registered policy into the wallet's record set.
///
/// Reads the whole record set, mutates only the matching record's policy
/// field and writes the set back. Returns `false` without erroring when the
/// record is absent or storage fails; callers then fall back to interactive
/// re-registration on the next signing attempt.
pub fn store_policy(
    store: &dyn SecretStore,
    wallet_id: &str,
    policy: BtcWalletPolicy,
    account_index: u32,
    scheme: DerivationScheme,
) -> bool {
    let mut data = match load_wallet_data(store, wallet_id) {
        Ok(Some(data)) => data,
        Ok(None) => {
            warn!(wallet_id, "no wallet record to attach bitcoin policy to");
            return false;
        }
        Err(e) => {
            warn!(wallet_id, error = %e, "failed to load wallet record for bitcoin policy");
            return false;
        }
    };

    let path = policy_record_path(account_index, scheme);
    let Some(record) = data
        .public_keys
        .iter_mut()
        .find(|r| r.curve == Curve::Secp256k1 && r.derivation_path == path)
    else {
        warn!(account_index, "no public key record for bitcoin policy path");
        return false;
    };
    record.btc_wallet_policy = Some(policy);

    if let Err(e) = save_wallet_data(store, wallet_id, &data) {
        warn!(wallet_id, error = %e, "failed to persist bitcoin policy");
        return false;
    }
    true
}

/// Rebuild the device-facing registration details from a stored policy.
pub fn parse_policy_details(
    policy: &BtcWalletPolicy,
    account_index: u32,
) -> Result<PolicyDetails> {
    let hmac = hex::decode(&policy.hmac_hex)
        .map_err(|e| WalletError::CorruptWalletData(format!("bad policy hmac: {e}")))?;

    let key_origin = format!(
        "[{}/44'/60'/{}']{}",
        policy.master_fingerprint.to_lowercase(),
        account_index,
        policy.xpub
    );

    Ok(PolicyDetails {
        name: policy.name.clone(),
        descriptor_template: WPKH_DESCRIPTOR_TEMPLATE.to_string(),
        keys: vec![key_origin],
        hmac,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::{MemorySecretStore, StoredWalletData};

    fn record(path: &str, curve: Curve) -> PublicKeyRecord {
        PublicKeyRecord {
            key: "02aa".to_string(),
            derivation_path: path.to_string(),
            curve,
            btc_wallet_policy: None,
        }
    }

    fn sample_policy() -> BtcWalletPolicy {
        BtcWalletPolicy {
            master_fingerprint: "F5ABC1D2".to_string(),
            xpub: "xpub6Bmn000".to_string(),
            name: "Core - 0".to_string(),
            hmac_hex: "deadbeef".to_string(),
        }
    }

    #[test]
    fn test_find_policy_matches_evm_path_and_curve() {
        let mut records = vec![
            record("m/44'/60'/0'/0/0", Curve::Secp256k1),
            record("m/44'/501'/0'/0'", Curve::Ed25519),
        ];
        assert!(find_policy(&records, 0, DerivationScheme::Bip44).is_none());
        assert!(needs_registration(&records, 0, DerivationScheme::Bip44));

        records[0].btc_wallet_policy = Some(sample_policy());
        assert_eq!(
            find_policy(&records, 0, DerivationScheme::Bip44),
            Some(&sample_policy())
        );
        assert!(!needs_registration(&records, 0, DerivationScheme::Bip44));
        // A different account index still has no policy
        assert!(needs_registration(&records, 1, DerivationScheme::Bip44));
    }

    #[test]
    fn test_policy_lookup_follows_ledger_live_paths() {
        let mut records = vec![
            record("m/44'/60'/1'/0/0", Curve::Secp256k1),
            record("m/44'/9000'/0'/0/1", Curve::Secp256k1),
        ];
        records[0].btc_wallet_policy = Some(sample_policy());

        // The record sits at the LedgerLive path for index 1; only a lookup
        // under the same scheme may find it.
        assert_eq!(
            find_policy(&records, 1, DerivationScheme::LedgerLive),
            Some(&sample_policy())
        );
        assert!(!needs_registration(&records, 1, DerivationScheme::LedgerLive));
        assert!(find_policy(&records, 1, DerivationScheme::Bip44).is_none());
    }

    #[test]
    fn test_store_policy_at_ledger_live_path() {
        let store = MemorySecretStore::new();
        let data = StoredWalletData {
            public_keys: vec![record("m/44'/60'/1'/0/0", Curve::Secp256k1)],
            ..Default::default()
        };
        crate::keystore::save_wallet_data(&store, "w1", &data).unwrap();

        // Storing under the wrong scheme must not attach anything
        assert!(!store_policy(
            &store,
            "w1",
            sample_policy(),
            1,
            DerivationScheme::Bip44
        ));
        assert!(store_policy(
            &store,
            "w1",
            sample_policy(),
            1,
            DerivationScheme::LedgerLive
        ));

        let stored = load_wallet_data(&store, "w1").unwrap().unwrap();
        assert_eq!(
            find_policy(&stored.public_keys, 1, DerivationScheme::LedgerLive),
            Some(&sample_policy())
        );
    }

    #[test]
    fn test_store_policy_preserves_unrelated_records() {
        let store = MemorySecretStore::new();
        let data = StoredWalletData {
            public_keys: vec![
                record("m/44'/60'/0'/0/0", Curve::Secp256k1),
                record("m/44'/60'/0'/0/1", Curve::Secp256k1),
                record("m/44'/501'/0'/0'", Curve::Ed25519),
            ],
            ..Default::default()
        };
        crate::keystore::save_wallet_data(&store, "w1", &data).unwrap();

        assert!(store_policy(
            &store,
            "w1",
            sample_policy(),
            0,
            DerivationScheme::Bip44
        ));

        let stored = load_wallet_data(&store, "w1").unwrap().unwrap();
        assert_eq!(
            stored.public_keys[0].btc_wallet_policy,
            Some(sample_policy())
        );
        assert_eq!(stored.public_keys[1], data.public_keys[1]);
        assert_eq!(stored.public_keys[2], data.public_keys[2]);
    }

    #[test]
    fn test_store_policy_returns_false_when_record_missing() {
        let store = MemorySecretStore::new();
        crate::keystore::save_wallet_data(&store, "w1", &StoredWalletData::default()).unwrap();
        assert!(!store_policy(
            &store,
            "w1",
            sample_policy(),
            0,
            DerivationScheme::Bip44
        ));
        // No record at all
        assert!(!store_policy(
            &store,
            "other",
            sample_policy(),
            0,
            DerivationScheme::Bip44
        ));
    }

    #[test]
    fn test_parse_policy_details() {
        let details = parse_policy_details(&sample_policy(), 2).unwrap();
        assert_eq!(details.descriptor_template, "wpkh(@0/**)");
        assert_eq!(details.keys, vec!["[f5abc1d2/44'/60'/2']xpub6Bmn000"]);
        assert_eq!(details.hmac, vec![0xde, 0xad, 0xbe, 0xef]);

        let bad = BtcWalletPolicy {
            hmac_hex: "zz".to_string(),
            ..sample_policy()
        };
        assert!(matches!(
            parse_policy_details(&bad, 0),
            Err(WalletError::CorruptWalletData(_))
        ));
    }
}
