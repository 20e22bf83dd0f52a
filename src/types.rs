use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::chains::avalanche::tx::UnsignedAvaxTx;
use crate::chains::bitcoin::{BitcoinTxInput, BitcoinTxOutput};
use crate::chains::evm::EvmTransactionRequest;
use crate::chains::solana::SolanaTransactionRequest;

// ========== Virtual machines & curves ==========

/// The virtual machines this core can construct and sign transactions for.
/// Closed set; adding a VM is a breaking schema change for persisted data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VMKind {
    /// Generic EVM chains (including the Avalanche C-chain in EVM mode)
    Evm,
    /// Avalanche X-chain
    Avm,
    /// Avalanche P-chain
    Pvm,
    /// Avalanche C-chain in atomic (bech32 address) mode
    CoreEth,
    Bitcoin,
    Solana,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Curve {
    Secp256k1,
    Ed25519,
}

/// Address derivation scheme. Only the hardware backend supports both;
/// every other backend uses BIP44.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DerivationScheme {
    Bip44,
    LedgerLive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CustodyType {
    Mnemonic,
    Ledger,
    Keystone,
    Seedless,
}

impl CustodyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustodyType::Mnemonic => "mnemonic",
            CustodyType::Ledger => "ledger",
            CustodyType::Keystone => "keystone",
            CustodyType::Seedless => "seedless",
        }
    }
}

// ========== Persisted key records ==========

/// A hardware device's acknowledgment of a registered output-descriptor
/// wallet. Required once per account index before Bitcoin signing can run
/// without an interactive re-registration prompt. Never mutated, only
/// replaced wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BtcWalletPolicy {
    pub master_fingerprint: String,
    pub xpub: String,
    pub name: String,
    pub hmac_hex: String,
}

/// A derived public key owned by the active custody backend's persisted key
/// set. Immutable once derived for an (index, curve, path) triple, apart
/// from the optional Bitcoin wallet-policy credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyRecord {
    /// Hex-encoded public key bytes
    pub key: String,
    pub derivation_path: String,
    pub curve: Curve,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub btc_wallet_policy: Option<BtcWalletPolicy>,
}

/// EVM and X/P-chain public keys for one account, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubKeyType {
    pub evm: String,
    pub xp: Option<String>,
}

/// An activated derivation index and its derived addresses.
/// Addresses are derived, never mutated, until the account is removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub index: u32,
    pub addresses: HashMap<VMKind, String>,
}

// ========== Network context ==========

/// The slice of network metadata the signing core needs. Chain providers own
/// everything else (RPC endpoints, fee markets, explorers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub vm: VMKind,
    pub chain_id: u64,
    pub is_testnet: bool,
}

// ========== Transaction requests ==========

/// Unsigned-transaction request, tagged by VM. Exactly one arm is populated;
/// builders never mix VM payload shapes.
#[derive(Debug, Clone)]
pub enum SignTransactionRequest {
    Evm(EvmTransactionRequest),
    Avalanche(AvalancheTransactionRequest),
    Btc(BtcTransactionRequest),
    Solana(SolanaTransactionRequest),
}

/// An Avalanche transaction plus the UTXO-owning address offsets (within the
/// account's derived fan-out) that must contribute signatures.
#[derive(Debug, Clone)]
pub struct AvalancheTransactionRequest {
    pub tx: UnsignedAvaxTx,
    /// Offsets of external (receive) addresses that own consumed UTXOs.
    pub external_indices: Option<Vec<u32>>,
    /// Offsets of internal (change) addresses that own consumed UTXOs.
    pub internal_indices: Option<Vec<u32>>,
}

#[derive(Debug, Clone)]
pub struct BtcTransactionRequest {
    pub inputs: Vec<BitcoinTxInput>,
    pub outputs: Vec<BitcoinTxOutput>,
}

// ========== Messages ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcMethod {
    EthSign,
    PersonalSign,
    SignTypedData,
    SignTypedDataV1,
    SignTypedDataV3,
    SignTypedDataV4,
    AvalancheSignMessage,
    SolanaSignMessage,
}

/// Message payload for `sign_message`. The v1 (array-form) typed-data arm is
/// kept distinct so backends can reject it without inspecting JSON.
#[derive(Debug, Clone)]
pub enum MessageData {
    Raw(String),
    TypedDataV1(serde_json::Value),
    TypedData(Box<ethers_core::types::transaction::eip712::TypedData>),
}

// ========== Fees & staking ==========

/// Outcome of burn-amount validation. Ephemeral, produced and consumed
/// within one signing flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeValidationResult {
    pub is_valid: bool,
    pub expected_fee: u64,
}

/// P-chain delegation parameters. All invariants are enforced at
/// construction time, not at signing time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakeParameters {
    pub node_id: String,
    /// Stake amount in nAVAX
    pub stake_amount: u64,
    /// Unix seconds
    pub start_time: i64,
    /// Unix seconds
    pub end_time: i64,
    pub reward_address: String,
}
