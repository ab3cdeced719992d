//! N3 transaction layout and binary serialization.

use crate::types::{sha256, ScriptHash, TxHash};

/// Which contracts a signer's witness is valid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WitnessScope {
    /// Only the entry script and contracts it calls directly.
    CalledByEntry,
    Global,
}

impl WitnessScope {
    pub fn as_byte(&self) -> u8 {
        match self {
            Self::CalledByEntry => 0x01,
            Self::Global => 0x80,
        }
    }

    /// Name used in JSON-RPC signer objects.
    pub fn as_rpc_str(&self) -> &'static str {
        match self {
            Self::CalledByEntry => "CalledByEntry",
            Self::Global => "Global",
        }
    }
}

/// A transaction signer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signer {
    pub account: ScriptHash,
    pub scopes: WitnessScope,
}

/// Invocation (signatures) and verification (public key check) scripts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Witness {
    pub invocation: Vec<u8>,
    pub verification: Vec<u8>,
}

/// An N3 transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: u8,
    pub nonce: u32,
    /// GAS burned by script execution, in fractions.
    pub system_fee: i64,
    /// GAS paid for size and verification, in fractions.
    pub network_fee: i64,
    pub valid_until_block: u32,
    pub signers: Vec<Signer>,
    pub script: Vec<u8>,
    pub witnesses: Vec<Witness>,
}

impl Transaction {
    /// Serialized transaction without witnesses; this is what gets hashed.
    pub fn unsigned_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64 + self.script.len());
        out.push(self.version);
        out.extend_from_slice(&self.nonce.to_le_bytes());
        out.extend_from_slice(&self.system_fee.to_le_bytes());
        out.extend_from_slice(&self.network_fee.to_le_bytes());
        out.extend_from_slice(&self.valid_until_block.to_le_bytes());
        write_var_int(&mut out, self.signers.len() as u64);
        for signer in &self.signers {
            out.extend_from_slice(signer.account.as_bytes());
            out.push(signer.scopes.as_byte());
        }
        // No attributes.
        write_var_int(&mut out, 0);
        write_var_bytes(&mut out, &self.script);
        out
    }

    /// Full wire encoding including witnesses.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.unsigned_bytes();
        write_var_int(&mut out, self.witnesses.len() as u64);
        for witness in &self.witnesses {
            write_var_bytes(&mut out, &witness.invocation);
            write_var_bytes(&mut out, &witness.verification);
        }
        out
    }

    pub fn hash(&self) -> TxHash {
        TxHash(sha256(&self.unsigned_bytes()))
    }

    /// Bytes a witness signs: network magic followed by the hash.
    pub fn sign_data(&self, network_magic: u32) -> Vec<u8> {
        let mut data = Vec::with_capacity(36);
        data.extend_from_slice(&network_magic.to_le_bytes());
        data.extend_from_slice(&self.hash().0);
        data
    }
}

/// Variable-length integer prefix.
pub fn write_var_int(out: &mut Vec<u8>, value: u64) {
    if value < 0xfd {
        out.push(value as u8);
    } else if value <= 0xffff {
        out.push(0xfd);
        out.extend_from_slice(&(value as u16).to_le_bytes());
    } else if value <= 0xffff_ffff {
        out.push(0xfe);
        out.extend_from_slice(&(value as u32).to_le_bytes());
    } else {
        out.push(0xff);
        out.extend_from_slice(&value.to_le_bytes());
    }
}

pub fn write_var_bytes(out: &mut Vec<u8>, data: &[u8]) {
    write_var_int(out, data.len() as u64);
    out.extend_from_slice(data);
}
