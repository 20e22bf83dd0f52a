use thiserror::Error;

use crate::ledger::transport::AppType;

/// Errors surfaced by the hardware signing engine.
///
/// Every variant maps to a distinct user-actionable condition: reconnect the
/// device, open the requested app, approve on-device, or (for capability
/// errors) nothing at all since the engine falls back internally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("device disconnected")]
    Disconnected,

    #[error("{0} app not ready on device")]
    AppNotReady(AppType),

    #[error("user rejected the operation on the device")]
    UserRejected,

    /// The device firmware lacks the requested instruction
    /// (e.g. 0x6d00 INS_NOT_SUPPORTED, 0x6e00 CLA_NOT_SUPPORTED).
    #[error("device capability unsupported (status {status:#06x})")]
    CapabilityUnsupported { status: u16 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response from device")]
    UnexpectedResponse,
}

impl DeviceError {
    /// Classify a raw APDU status word.
    pub fn from_status(status: u16) -> Self {
        match status {
            0x6985 | 0x5501 => DeviceError::UserRejected,
            0x6d00 | 0x6e00 => DeviceError::CapabilityUnsupported { status },
            _ => DeviceError::Transport(format!("status {status:#06x}")),
        }
    }

    /// True only for errors that indicate missing firmware capability.
    /// User rejections and transport failures must never be treated as
    /// capability errors (they would otherwise trigger a silent retry and a
    /// duplicate approval prompt).
    pub fn is_capability_error(&self) -> bool {
        matches!(self, DeviceError::CapabilityUnsupported { .. })
    }
}

#[derive(Error, Debug)]
pub enum WalletError {
    // ---- Construction-time validation (never retried automatically) ----
    #[error("invalid node id: {0}")]
    InvalidNodeId(String),

    #[error("stake amount {actual} below minimum {minimum} nAVAX")]
    StakeBelowMinimum { minimum: u64, actual: u64 },

    #[error("stake start date {start} must be in the future")]
    StartDateInPast { start: i64 },

    #[error("stake duration too short, end date must be at least {minimum_end}")]
    StakeDurationTooShort { minimum_end: i64 },

    #[error("reward address must be a valid P-chain address: {0}")]
    InvalidRewardAddress(String),

    #[error("destination address must be set")]
    MissingDestinationAddress,

    #[error("insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: u64, available: u64 },

    // ---- Fee / burn validation ----
    #[error("excessive burn amount, expected fee {expected_fee} nAVAX")]
    ExcessiveBurnAmount { expected_fee: u64 },

    #[error("missing evm fee data")]
    MissingFeeData,

    // ---- Device protocol ----
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("bitcoin wallet policy not registered for account {account_index}")]
    PolicyRegistrationRequired { account_index: u32 },

    // ---- Storage (degrade gracefully, never panic) ----
    #[error("corrupt wallet data: {0}")]
    CorruptWalletData(String),

    #[error("failed to load secret from secure storage")]
    SecretLoadFailed,

    #[error("failed to store secret in secure storage")]
    SecretStoreFailed,

    // ---- Capability ----
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    #[error("wallet not initialized for custody type {0}")]
    WalletNotInitialized(&'static str),

    #[error("no public key found for derivation path {path} and curve {curve}")]
    PublicKeyNotFound { path: String, curve: String },

    #[error("invalid typed data: {0}")]
    InvalidTypedData(String),

    #[error("wrong provider obtained for {0} network")]
    WrongProvider(&'static str),

    // ---- Collaborator boundary ----
    #[error("provider error: {0}")]
    Provider(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, WalletError>;
