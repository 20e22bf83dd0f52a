//! Typed transport boundary for the hardware device.
//!
//! The BLE/USB plumbing lives outside this crate; callers inject a
//! [`LedgerTransport`] and the engine drives it with typed request/response
//! round-trips. Raw APDU status words never cross this boundary, the
//! transport classifies them into [`DeviceError`](crate::errors::DeviceError)
//! via `DeviceError::from_status`.

use async_trait::async_trait;

use crate::errors::DeviceError;
use crate::types::BtcTransactionRequest;

/// Device applications the engine can drive. Exactly one is open at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppType {
    Avalanche,
    Ethereum,
    Bitcoin,
    Solana,
}

impl AppType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppType::Avalanche => "Avalanche",
            AppType::Ethereum => "Ethereum",
            AppType::Bitcoin => "Bitcoin",
            AppType::Solana => "Solana",
        }
    }
}

impl std::fmt::Display for AppType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw secp256k1/ed25519 signature as returned by the device.
/// For ed25519, `r`/`s` carry the two 32-byte halves and `v` is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub v: u8,
}

/// One request to the device, already app-scoped.
#[derive(Debug, Clone)]
pub enum DeviceRequest {
    GetExtendedPublicKey {
        path: String,
    },
    GetPublicKey {
        path: String,
    },
    SignEvmTransaction {
        path: String,
        rlp: Vec<u8>,
    },
    SignEvmMessage {
        path: String,
        message: Vec<u8>,
    },
    SignTypedData {
        path: String,
        typed_data_json: String,
    },
    /// Fallback for firmware without full EIP-712 support.
    SignHashedTypedData {
        path: String,
        domain_separator: [u8; 32],
        struct_hash: [u8; 32],
    },
    SignAvalancheTx {
        account_path: String,
        tx_bytes: Vec<u8>,
        signing_paths: Vec<String>,
    },
    SignAvalancheMessage {
        account_path: String,
        signing_path: String,
        message: Vec<u8>,
    },
    SignSolanaTx {
        path: String,
        message: Vec<u8>,
    },
    RegisterBtcPolicy {
        name: String,
        descriptor_template: String,
        keys: Vec<String>,
    },
    SignBtcTransaction {
        request: BtcTransactionRequest,
        descriptor_template: String,
        keys: Vec<String>,
        policy_hmac: Vec<u8>,
    },
}

/// The device's answer to one [`DeviceRequest`].
#[derive(Debug, Clone)]
pub enum DeviceResponse {
    ExtendedPublicKey {
        xpub: String,
        master_fingerprint: String,
    },
    /// Compressed (or ed25519) public key bytes, hex encoded.
    PublicKey {
        key_hex: String,
    },
    Signature(RawSignature),
    /// One signature per requested signing path, in request order.
    Signatures(Vec<RawSignature>),
    PolicyRegistered {
        hmac_hex: String,
    },
    SignedBtcTransaction {
        tx_hex: String,
    },
}

/// Injected device plumbing. Implementations serialize nothing themselves;
/// the session layer guarantees one in-flight operation per device.
#[async_trait]
pub trait LedgerTransport: Send + Sync {
    /// Establish (or re-establish) the physical connection.
    async fn ensure_connection(&self) -> Result<(), DeviceError>;

    /// The app currently open on the device, if identifiable.
    async fn current_app(&self) -> Result<Option<AppType>, DeviceError>;

    /// Ask the device to switch apps. Returns once the request is sent;
    /// readiness is polled separately.
    async fn open_app(&self, app: AppType) -> Result<(), DeviceError>;

    /// One typed round-trip against the currently open app.
    async fn exchange(
        &self,
        app: AppType,
        request: DeviceRequest,
    ) -> Result<DeviceResponse, DeviceError>;
}
