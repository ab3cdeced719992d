//! Error taxonomy shared by the payout adapters.
//!
//! Each chain crate has its own detailed error enum; all of them convert into
//! [`PayoutError`], whose [`ErrorKind`] tells the caller where a failure came
//! from without inspecting chain-specific variants.

use thiserror::Error;

/// A precondition violated before any network call was made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("batch has {recipients} recipients but {amounts} amounts")]
    LengthMismatch { recipients: usize, amounts: usize },
    #[error("batch is empty")]
    EmptyBatch,
    #[error("invalid recipient address at index {index} ({address}): {reason}")]
    InvalidAddress {
        index: usize,
        address: String,
        reason: String,
    },
    #[error("invalid account address ({address}): {reason}")]
    InvalidAccount { address: String, reason: String },
    #[error("amount at index {index} does not fit the chain's {bits}-bit integer")]
    AmountOutOfRange { index: usize, bits: u32 },
    #[error("batch total does not fit the chain's {bits}-bit integer")]
    TotalOutOfRange { bits: u32 },
    #[error("missing required configuration: {0}")]
    MissingConfig(&'static str),
    #[error("malformed configuration value for {field}: {reason}")]
    MalformedConfig { field: &'static str, reason: String },
}

/// Coarse origin of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input or configuration; nothing was sent.
    Validation,
    /// The node could not be reached or dropped the connection.
    Transport,
    /// The contract reverted/faulted or the node refused the transaction.
    Rejected,
    /// Invalid key material or a signing failure.
    Signing,
    /// ABI or script encoding/decoding failed.
    Encoding,
    /// A deploy artifact was missing, unreadable, or malformed.
    Artifact,
}

/// Chain-independent payout failure.
#[derive(Debug, Error)]
pub enum PayoutError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rejected by chain: {0}")]
    Rejected(String),
    #[error("signing error: {0}")]
    Signing(String),
    #[error("encoding error: {0}")]
    Encoding(String),
    #[error("artifact error: {0}")]
    Artifact(String),
}

impl PayoutError {
    /// Returns the failure's origin.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Rejected(_) => ErrorKind::Rejected,
            Self::Signing(_) => ErrorKind::Signing,
            Self::Encoding(_) => ErrorKind::Encoding,
            Self::Artifact(_) => ErrorKind::Artifact,
        }
    }
}
