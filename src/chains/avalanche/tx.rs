//! Internal unsigned-transaction model for the Avalanche chains.
//!
//! This is not the Avalanche wire format; nodes never see these bytes.
//! The model exists so the builder, the burn validator and the signing
//! backends agree on one shape, and the canonical JSON encoding gives a
//! stable byte payload to hash and a stable size to bound.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::chains::avalanche::ChainAlias;
use crate::errors::{Result, WalletError};
use crate::types::VMKind;

/// A spendable UTXO as reported by the Avalanche provider. Amounts are nAVAX.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvaxUtxo {
    pub utxo_id: String,
    pub asset_id: String,
    pub amount: u64,
    pub owner_address: String,
}

/// One value-bearing output. Amounts are nAVAX.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferOutput {
    pub address: String,
    pub amount: u64,
}

/// The transaction families the builders emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AvaxTxKind {
    BaseX,
    BaseP,
    ExportC {
        destination_chain: ChainAlias,
    },
    ExportP {
        destination_chain: ChainAlias,
    },
    ImportP {
        source_chain: ChainAlias,
    },
    ImportC {
        source_chain: ChainAlias,
    },
    AddDelegator {
        node_id: String,
        start_time: i64,
        end_time: i64,
        reward_address: String,
    },
}

/// An unsigned Avalanche transaction. `vm` is `Avm`, `Pvm` or `CoreEth`;
/// builders never emit any other kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedAvaxTx {
    pub vm: VMKind,
    pub network_id: u32,
    pub kind: AvaxTxKind,
    pub inputs: Vec<AvaxUtxo>,
    pub outputs: Vec<TransferOutput>,
    /// Locked stake for delegation txs; returned after the staking period,
    /// so never counted as burned.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub staked_outputs: Vec<TransferOutput>,
    /// EVM account nonce, present only for C-chain atomic exports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evm_nonce: Option<u64>,
}

impl UnsignedAvaxTx {
    pub fn input_total(&self) -> u64 {
        self.inputs.iter().map(|i| i.amount).sum()
    }

    pub fn output_total(&self) -> u64 {
        self.outputs.iter().map(|o| o.amount).sum()
    }

    pub fn staked_total(&self) -> u64 {
        self.staked_outputs.iter().map(|o| o.amount).sum()
    }

    /// Value consumed but not paid out or staked. This is the fee the
    /// network keeps.
    pub fn burned_amount(&self) -> Result<u64> {
        let spent = self.output_total() + self.staked_total();
        self.input_total()
            .checked_sub(spent)
            .ok_or(WalletError::InsufficientBalance {
                needed: spent,
                available: self.input_total(),
            })
    }

    /// Canonical byte encoding, used for hashing and size bounds.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| WalletError::CorruptWalletData(e.to_string()))
    }

    /// sha256 over the canonical encoding; this is what secp256k1 backends
    /// actually sign.
    pub fn signing_hash(&self) -> Result<[u8; 32]> {
        let bytes = self.to_bytes()?;
        Ok(Sha256::digest(&bytes).into())
    }

    pub fn byte_size(&self) -> Result<usize> {
        Ok(self.to_bytes()?.len())
    }
}

/// One signature over the transaction hash, tagged with the relative signing
/// path (`{change}/{index}`) that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvaxCredential {
    /// `0x` + 130 hex chars (r ‖ s ‖ v)
    pub signature: String,
    pub signing_path: String,
}

/// A transaction plus its ordered credentials, serialized as JSON for the
/// broadcasting layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedAvaxTx {
    pub tx: UnsignedAvaxTx,
    pub credentials: Vec<AvaxCredential>,
}

impl SignedAvaxTx {
    pub fn new(tx: UnsignedAvaxTx) -> Self {
        Self {
            tx,
            credentials: Vec::new(),
        }
    }

    /// Credentials must be attached in the same order the signing indices
    /// were requested; the broadcaster maps them positionally.
    pub fn add_signature(&mut self, signature: String, signing_path: String) {
        self.credentials.push(AvaxCredential {
            signature,
            signing_path,
        });
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| WalletError::CorruptWalletData(e.to_string()))
    }
}
