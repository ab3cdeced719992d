//! NeoVM script emission.
//!
//! Only the subset needed to call a contract method with typed arguments.

use num_bigint::{BigInt, Sign};
use thiserror::Error;

use crate::types::{sha256, ScriptHash};

/// NeoVM opcodes used by the emitter.
pub mod opcode {
    pub const PUSHINT8: u8 = 0x00;
    pub const PUSHDATA1: u8 = 0x0c;
    pub const PUSHDATA2: u8 = 0x0d;
    pub const PUSHDATA4: u8 = 0x0e;
    pub const PUSHM1: u8 = 0x0f;
    pub const PUSH0: u8 = 0x10;
    pub const ABORT: u8 = 0x38;
    pub const SYSCALL: u8 = 0x41;
    pub const PACK: u8 = 0xc0;
    pub const NEWARRAY0: u8 = 0xc2;
}

/// Widest integer the VM accepts, in bytes.
const MAX_INT_BYTES: usize = 32;

/// Errors from script emission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("integer needs {0} bytes, the VM limit is 32")]
    IntegerTooWide(usize),
}

/// Result alias for script emission.
pub type Result<T> = std::result::Result<T, ScriptError>;

/// Permissions a contract call grants the callee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallFlags(pub u8);

impl CallFlags {
    /// Read and write states, call other contracts, notify.
    pub const ALL: Self = Self(0x0f);
}

/// Interop service id: the first four bytes of SHA-256 of its name.
pub fn interop_id(name: &str) -> [u8; 4] {
    let digest = sha256(name.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

/// A typed contract argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractParam {
    Integer(BigInt),
    ByteArray(Vec<u8>),
    /// Pushed as its 20 raw bytes.
    Hash160(ScriptHash),
    /// Compressed secp256r1 public key.
    PublicKey([u8; 33]),
    Array(Vec<ContractParam>),
}

/// Builds a NeoVM script.
#[derive(Debug, Default, Clone)]
pub struct ScriptBuilder {
    buf: Vec<u8>,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_opcode(&mut self, op: u8) -> &mut Self {
        self.buf.push(op);
        self
    }

    /// Pushes an integer with the shortest encoding.
    ///
    /// `-1..=16` use the single-byte constants; anything else is written as
    /// little-endian two's complement, sign-extended to the next PUSHINT width.
    pub fn push_int(&mut self, value: &BigInt) -> Result<&mut Self> {
        if let Some(small) = i64::try_from(value).ok().filter(|v| (-1..=16).contains(v)) {
            return Ok(self.push_i64(small));
        }
        let bytes = value.to_signed_bytes_le();
        let (op, width) =
            pushint_width(bytes.len()).ok_or(ScriptError::IntegerTooWide(bytes.len()))?;
        Ok(self.emit_pushint(op, width, bytes, value.sign() == Sign::Minus))
    }

    pub fn push_i64(&mut self, value: i64) -> &mut Self {
        match value {
            -1 => self.push_opcode(opcode::PUSHM1),
            0..=16 => self.push_opcode(opcode::PUSH0 + value as u8),
            _ => {
                let bytes = BigInt::from(value).to_signed_bytes_le();
                // At most eight bytes.
                let (op, width) =
                    pushint_width(bytes.len()).unwrap_or((opcode::PUSHINT8 + 3, 8));
                self.emit_pushint(op, width, bytes, value < 0)
            }
        }
    }

    fn emit_pushint(
        &mut self,
        op: u8,
        width: usize,
        mut bytes: Vec<u8>,
        negative: bool,
    ) -> &mut Self {
        bytes.resize(width, if negative { 0xff } else { 0x00 });
        self.buf.push(op);
        self.buf.extend_from_slice(&bytes);
        self
    }

    /// Pushes a byte string with the smallest PUSHDATA prefix.
    pub fn push_bytes(&mut self, data: &[u8]) -> &mut Self {
        let len = data.len();
        if len < 0x100 {
            self.buf.push(opcode::PUSHDATA1);
            self.buf.push(len as u8);
        } else if len < 0x10000 {
            self.buf.push(opcode::PUSHDATA2);
            self.buf.extend_from_slice(&(len as u16).to_le_bytes());
        } else {
            self.buf.push(opcode::PUSHDATA4);
            self.buf.extend_from_slice(&(len as u32).to_le_bytes());
        }
        self.buf.extend_from_slice(data);
        self
    }

    pub fn push_string(&mut self, value: &str) -> &mut Self {
        self.push_bytes(value.as_bytes())
    }

    pub fn push_param(&mut self, param: &ContractParam) -> Result<&mut Self> {
        match param {
            ContractParam::Integer(i) => self.push_int(i),
            ContractParam::ByteArray(b) => Ok(self.push_bytes(b)),
            ContractParam::Hash160(h) => Ok(self.push_bytes(h.as_bytes())),
            ContractParam::PublicKey(k) => Ok(self.push_bytes(k)),
            ContractParam::Array(items) => self.push_array(items),
        }
    }

    /// Pushes items in reverse, then the count and PACK.
    pub fn push_array(&mut self, items: &[ContractParam]) -> Result<&mut Self> {
        if items.is_empty() {
            return Ok(self.push_opcode(opcode::NEWARRAY0));
        }
        for item in items.iter().rev() {
            self.push_param(item)?;
        }
        self.push_i64(items.len() as i64);
        Ok(self.push_opcode(opcode::PACK))
    }

    pub fn syscall(&mut self, name: &str) -> &mut Self {
        self.buf.push(opcode::SYSCALL);
        self.buf.extend_from_slice(&interop_id(name));
        self
    }

    /// `System.Contract.Call(contract, method, flags, args)`.
    pub fn contract_call(
        &mut self,
        contract: &ScriptHash,
        method: &str,
        flags: CallFlags,
        args: &[ContractParam],
    ) -> Result<&mut Self> {
        self.push_array(args)?;
        self.push_i64(i64::from(flags.0));
        self.push_string(method);
        self.push_bytes(contract.as_bytes());
        Ok(self.syscall("System.Contract.Call"))
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.buf.clone()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// PUSHINT opcode and operand width for a two's complement value of `len` bytes.
fn pushint_width(len: usize) -> Option<(u8, usize)> {
    match len {
        0..=1 => Some((opcode::PUSHINT8, 1)),
        2 => Some((opcode::PUSHINT8 + 1, 2)),
        3..=4 => Some((opcode::PUSHINT8 + 2, 4)),
        5..=8 => Some((opcode::PUSHINT8 + 3, 8)),
        9..=16 => Some((opcode::PUSHINT8 + 4, 16)),
        17..=MAX_INT_BYTES => Some((opcode::PUSHINT8 + 5, MAX_INT_BYTES)),
        _ => None,
    }
}

/// Single-signature verification script for a compressed public key.
pub fn verification_script(public_key: &[u8; 33]) -> Vec<u8> {
    let mut sb = ScriptBuilder::new();
    sb.push_bytes(public_key).syscall("System.Crypto.CheckSig");
    sb.into_bytes()
}
