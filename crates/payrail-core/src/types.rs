//! Common types shared across payrail crates.

use std::fmt;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A payout amount in the chain-native minimal unit (wei, GAS fractions).
///
/// Unbounded here; each adapter checks it against its chain's integer width.
pub type Amount = BigUint;

/// The chain family an adapter targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainKind {
    /// Account-based EVM chain with the `fill`/`release` payout contract.
    Evm,
    /// NEO N3 chain with the `batchPayout` contract.
    Neo,
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Evm => f.write_str("evm"),
            Self::Neo => f.write_str("neo"),
        }
    }
}

/// A 20-byte EVM account address, as derived by the signer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(pub [u8; 20]);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// A single recipient line of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutEntry {
    /// Human-readable recipient address, validated by the adapter.
    pub recipient: String,
    /// Amount owed to the recipient.
    pub amount: Amount,
}

/// An ordered, non-empty sequence of (recipient, amount) pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutBatch {
    entries: Vec<PayoutEntry>,
}

impl PayoutBatch {
    /// Builds a batch from two parallel arrays.
    ///
    /// Fails when the arrays differ in length or are empty.
    pub fn new(recipients: Vec<String>, amounts: Vec<Amount>) -> Result<Self, ValidationError> {
        if recipients.len() != amounts.len() {
            return Err(ValidationError::LengthMismatch {
                recipients: recipients.len(),
                amounts: amounts.len(),
            });
        }
        let entries = recipients
            .into_iter()
            .zip(amounts)
            .map(|(recipient, amount)| PayoutEntry { recipient, amount })
            .collect();
        Self::from_entries(entries)
    }

    /// Builds a batch from already-paired entries.
    pub fn from_entries(entries: Vec<PayoutEntry>) -> Result<Self, ValidationError> {
        if entries.is_empty() {
            return Err(ValidationError::EmptyBatch);
        }
        Ok(Self { entries })
    }

    /// Convenience constructor from `(address, amount)` pairs.
    pub fn from_pairs<A, N>(
        pairs: impl IntoIterator<Item = (A, N)>,
    ) -> Result<Self, ValidationError>
    where
        A: Into<String>,
        N: Into<Amount>,
    {
        let entries = pairs
            .into_iter()
            .map(|(recipient, amount)| PayoutEntry {
                recipient: recipient.into(),
                amount: amount.into(),
            })
            .collect();
        Self::from_entries(entries)
    }

    /// The batch lines in submission order.
    pub fn entries(&self) -> &[PayoutEntry] {
        &self.entries
    }

    /// Number of recipients.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always `false` for a constructed batch.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Recipient addresses in order.
    pub fn recipients(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.recipient.as_str())
    }

    /// Amounts in order.
    pub fn amounts(&self) -> impl Iterator<Item = &Amount> {
        self.entries.iter().map(|e| &e.amount)
    }

    /// Sum of all amounts.
    pub fn total(&self) -> Amount {
        self.amounts().sum()
    }
}

/// A chain-native transaction identifier (0x-prefixed hex).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(String);

impl TxId {
    /// Wraps an already formatted identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a contract deployment: the registration transaction and the
/// address/hash the contract lives at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployOutcome {
    /// Transaction that registered the contract.
    pub tx_id: TxId,
    /// Contract address (EVM) or script hash (NEO), 0x-prefixed.
    pub contract: String,
}
