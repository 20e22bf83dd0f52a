//! Per-VM transaction models and builders.
//!
//! Each submodule owns one virtual machine's request shape, address
//! derivation and (where the VM is built locally) transaction assembly:
//! - `avalanche` - X/P/C-atomic internal tx model and builder
//! - `bitcoin` - UTXO selection and p2wpkh assembly
//! - `evm` - pass-through EVM requests normalized to legacy RLP
//! - `solana` - serialized-transaction pass-through

pub mod avalanche;
pub mod bitcoin;
pub mod evm;
pub mod solana;
