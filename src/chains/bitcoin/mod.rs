//! Bitcoin UTXO selection, transaction assembly and p2wpkh signing.

use async_trait::async_trait;
use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{Message, Secp256k1, SecretKey};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{
    Address, Network, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

use crate::errors::{Result, WalletError};
use crate::types::BtcTransactionRequest;

// ========== Constants ==========

/// Outputs below this are unspendable in practice; change under the limit is
/// folded into the fee instead.
pub const DUST_LIMIT_SATS: u64 = 546;

// vsize estimates for fee computation (p2wpkh)
const TX_OVERHEAD_VSIZE: u64 = 11;
const INPUT_VSIZE: u64 = 68;
const OUTPUT_VSIZE: u64 = 31;

// ========== Types ==========

/// A spendable output as reported by the Bitcoin provider. Amounts are
/// satoshis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitcoinUtxo {
    pub txid: String,
    pub vout: u32,
    pub amount: u64,
}

/// Transaction input. `raw_tx_hex` carries the whole previous transaction;
/// hardware backends refuse to sign without it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitcoinTxInput {
    pub prev_hash: String,
    pub prev_index: u32,
    pub amount: u64,
    pub raw_tx_hex: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitcoinTxOutput {
    pub address: String,
    pub amount: u64,
    pub is_change: bool,
}

// ========== Provider boundary ==========

/// Chain data the assembly step cannot compute locally.
#[async_trait]
pub trait BitcoinProvider: Send + Sync {
    async fn get_utxos(&self, address: &str) -> anyhow::Result<Vec<BitcoinUtxo>>;
    async fn get_raw_transaction(&self, txid: &str) -> anyhow::Result<String>;
}

// ========== Assembly ==========

fn estimated_fee(fee_rate: u64, inputs: usize, outputs: usize) -> u64 {
    fee_rate * (TX_OVERHEAD_VSIZE + inputs as u64 * INPUT_VSIZE + outputs as u64 * OUTPUT_VSIZE)
}

/// Select UTXOs largest-first and assemble an unsigned transfer with change.
/// Change below the dust limit is folded into the fee.
pub fn build_transaction(
    mut utxos: Vec<BitcoinUtxo>,
    to_address: &str,
    amount: u64,
    fee_rate: u64,
    change_address: &str,
) -> Result<BtcTransactionRequest> {
    utxos.sort_by(|a, b| b.amount.cmp(&a.amount));

    let mut selected: Vec<BitcoinUtxo> = Vec::new();
    let mut total = 0u64;
    let mut fee = 0u64;
    for utxo in utxos {
        if total >= amount + fee && !selected.is_empty() {
            break;
        }
        total += utxo.amount;
        selected.push(utxo);
        fee = estimated_fee(fee_rate, selected.len(), 2);
    }

    if total < amount + fee {
        return Err(WalletError::InsufficientBalance {
            needed: amount + fee,
            available: total,
        });
    }

    let mut outputs = vec![BitcoinTxOutput {
        address: to_address.to_string(),
        amount,
        is_change: false,
    }];
    let change = total - amount - fee;
    if change >= DUST_LIMIT_SATS {
        outputs.push(BitcoinTxOutput {
            address: change_address.to_string(),
            amount: change,
            is_change: true,
        });
    }

    debug!(
        inputs = selected.len(),
        amount, fee, change, "assembled bitcoin transfer"
    );

    Ok(BtcTransactionRequest {
        inputs: selected
            .into_iter()
            .map(|u| BitcoinTxInput {
                prev_hash: u.txid,
                prev_index: u.vout,
                amount: u.amount,
                raw_tx_hex: None,
            })
            .collect(),
        outputs,
    })
}

/// Hydrate every input with its previous raw transaction, as required by
/// hardware signing.
pub async fn prepare_for_device(
    request: &mut BtcTransactionRequest,
    provider: &dyn BitcoinProvider,
) -> Result<()> {
    for input in &mut request.inputs {
        if input.raw_tx_hex.is_none() {
            let raw = provider.get_raw_transaction(&input.prev_hash).await?;
            input.raw_tx_hex = Some(raw);
        }
    }
    Ok(())
}

/// Build the unsigned `bitcoin::Transaction` skeleton, validating every
/// address against the target network.
pub fn to_unsigned_transaction(
    request: &BtcTransactionRequest,
    network: Network,
) -> Result<Transaction> {
    let mut input = Vec::with_capacity(request.inputs.len());
    for txin in &request.inputs {
        let txid = Txid::from_str(&txin.prev_hash)
            .map_err(|e| WalletError::CorruptWalletData(format!("bad txid: {e}")))?;
        input.push(TxIn {
            previous_output: OutPoint {
                txid,
                vout: txin.prev_index,
            },
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
            witness: Witness::new(),
        });
    }

    let mut output = Vec::with_capacity(request.outputs.len());
    for txout in &request.outputs {
        let address = Address::from_str(&txout.address)
            .map_err(|e| WalletError::CorruptWalletData(format!("bad address: {e}")))?
            .require_network(network)
            .map_err(|e| WalletError::CorruptWalletData(format!("wrong network: {e}")))?;
        output.push(TxOut {
            value: txout.amount,
            script_pubkey: address.script_pubkey(),
        });
    }

    Ok(Transaction {
        version: 2,
        lock_time: LockTime::ZERO,
        input,
        output,
    })
}

// ========== Local signing ==========

/// Sign every input as p2wpkh with one key. The mnemonic backend derives all
/// receive addresses from a single path, so one key covers the whole input
/// set.
pub fn sign_p2wpkh(
    request: &BtcTransactionRequest,
    secret_key_bytes: &[u8],
    network: Network,
) -> Result<Transaction> {
    let secp = Secp256k1::new();
    let secret_key = SecretKey::from_slice(secret_key_bytes)
        .map_err(|e| WalletError::CorruptWalletData(format!("bad secret key: {e}")))?;
    let public_key = bitcoin::PublicKey::new(secret_key.public_key(&secp));
    let script_code = ScriptBuf::new_p2pkh(&public_key.pubkey_hash());

    let mut tx = to_unsigned_transaction(request, network)?;
    let mut cache = SighashCache::new(&tx);
    let mut witnesses = Vec::with_capacity(request.inputs.len());
    for (index, input) in request.inputs.iter().enumerate() {
        let sighash = cache
            .segwit_signature_hash(index, &script_code, input.amount, EcdsaSighashType::All)
            .map_err(|e| WalletError::CorruptWalletData(format!("sighash: {e}")))?;
        let message = Message::from_slice(&sighash.to_byte_array())
            .map_err(|e| WalletError::CorruptWalletData(format!("sighash: {e}")))?;
        let signature = secp.sign_ecdsa(&message, &secret_key);

        let mut sig_push = signature.serialize_der().to_vec();
        sig_push.push(EcdsaSighashType::All as u8);
        let key_push = public_key.to_bytes();
        witnesses.push(Witness::from_slice(&[
            sig_push.as_slice(),
            key_push.as_slice(),
        ]));
    }

    for (txin, witness) in tx.input.iter_mut().zip(witnesses) {
        txin.witness = witness;
    }
    Ok(tx)
}

/// Per-input p2wpkh sighashes for backends whose secret key lives elsewhere.
/// Returns the unsigned transaction and one digest per input.
pub fn segwit_sighashes(
    request: &BtcTransactionRequest,
    pubkey: &[u8],
    network: Network,
) -> Result<(Transaction, Vec<[u8; 32]>)> {
    let public_key = bitcoin::PublicKey::from_slice(pubkey)
        .map_err(|e| WalletError::CorruptWalletData(format!("bad public key: {e}")))?;
    let script_code = ScriptBuf::new_p2pkh(&public_key.pubkey_hash());

    let tx = to_unsigned_transaction(request, network)?;
    let mut cache = SighashCache::new(&tx);
    let mut digests = Vec::with_capacity(request.inputs.len());
    for (index, input) in request.inputs.iter().enumerate() {
        let sighash = cache
            .segwit_signature_hash(index, &script_code, input.amount, EcdsaSighashType::All)
            .map_err(|e| WalletError::CorruptWalletData(format!("sighash: {e}")))?;
        digests.push(sighash.to_byte_array());
    }
    drop(cache);
    Ok((tx, digests))
}

/// Attach p2wpkh witnesses built from externally produced compact (r||s)
/// signatures, one per input, in input order.
pub fn attach_p2wpkh_witnesses(
    tx: &mut Transaction,
    signatures: &[Vec<u8>],
    pubkey: &[u8],
) -> Result<()> {
    if signatures.len() != tx.input.len() {
        return Err(WalletError::CorruptWalletData(format!(
            "{} signatures for {} inputs",
            signatures.len(),
            tx.input.len()
        )));
    }
    for (txin, compact) in tx.input.iter_mut().zip(signatures) {
        if compact.len() < 64 {
            return Err(WalletError::CorruptWalletData(format!(
                "signature too short: {} bytes",
                compact.len()
            )));
        }
        // A trailing recovery byte, if present, is ignored
        let signature = k256::ecdsa::Signature::from_slice(&compact[..64])
            .map_err(|e| WalletError::CorruptWalletData(format!("bad signature: {e}")))?;
        let mut sig_push = signature.to_der().as_bytes().to_vec();
        sig_push.push(EcdsaSighashType::All as u8);
        txin.witness = Witness::from_slice(&[sig_push.as_slice(), pubkey]);
    }
    Ok(())
}

// ========== Addresses ==========

/// Native segwit address from a compressed secp256k1 public key.
pub fn p2wpkh_address(pubkey: &[u8], network: Network) -> Result<String> {
    let public_key = bitcoin::PublicKey::from_slice(pubkey)
        .map_err(|e| WalletError::CorruptWalletData(format!("bad public key: {e}")))?;
    let address = Address::p2wpkh(&public_key, network)
        .map_err(|e| WalletError::CorruptWalletData(format!("uncompressed key: {e}")))?;
    Ok(address.to_string())
}
