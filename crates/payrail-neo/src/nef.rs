//! Deployment artifacts: the compiled NEF script and its JSON manifest.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::script::{opcode, ScriptBuilder};
use crate::tx::{write_var_bytes, write_var_int};
use crate::types::{sha256, ScriptHash};

/// "NEF3" read as a little-endian u32.
pub const NEF_MAGIC: u32 = 0x3346_454e;

const COMPILER_LEN: usize = 64;
const MAX_SOURCE_LEN: u64 = 256;
const MAX_TOKENS: u64 = 128;
const MAX_METHOD_LEN: u64 = 32;
const MAX_SCRIPT_LEN: u64 = 512 * 1024;

/// Errors from decoding a NEF file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NefError {
    #[error("unexpected end of data")]
    Truncated,
    #[error("bad magic 0x{0:08x}")]
    BadMagic(u32),
    #[error("reserved field is not zero")]
    Reserved,
    #[error("{field} length {len} exceeds limit")]
    TooLong { field: &'static str, len: u64 },
    #[error("{0} is not valid UTF-8")]
    Utf8(&'static str),
    #[error("script is empty")]
    EmptyScript,
    #[error("checksum mismatch: file says 0x{stored:08x}, content hashes to 0x{computed:08x}")]
    Checksum { stored: u32, computed: u32 },
    #[error("{0} trailing bytes")]
    TrailingBytes(usize),
}

/// Errors from loading deployment artifacts.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed NEF file {path}: {source}")]
    Nef {
        path: PathBuf,
        #[source]
        source: NefError,
    },
    #[error("malformed manifest {path}: {reason}")]
    Manifest { path: PathBuf, reason: String },
}

/// A static call to another contract recorded in the NEF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodToken {
    pub hash: ScriptHash,
    pub method: String,
    pub params_count: u16,
    pub has_return_value: bool,
    pub call_flags: u8,
}

/// A parsed NEF (NEO Executable Format) file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NefFile {
    pub compiler: String,
    pub source: String,
    pub tokens: Vec<MethodToken>,
    pub script: Vec<u8>,
    pub checksum: u32,
}

impl NefFile {
    /// Builds a NEF around `script` with a freshly computed checksum.
    pub fn new(compiler: &str, script: Vec<u8>) -> Self {
        let mut nef = Self {
            compiler: compiler.to_string(),
            source: String::new(),
            tokens: Vec::new(),
            script,
            checksum: 0,
        };
        nef.checksum = checksum(&nef.body_bytes());
        nef
    }

    /// Decodes and checksum-verifies a NEF file.
    pub fn parse(bytes: &[u8]) -> Result<Self, NefError> {
        let mut r = Reader::new(bytes);

        let magic = r.u32()?;
        if magic != NEF_MAGIC {
            return Err(NefError::BadMagic(magic));
        }
        let compiler_raw = r.take(COMPILER_LEN)?;
        let end = compiler_raw
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(COMPILER_LEN);
        let compiler = std::str::from_utf8(&compiler_raw[..end])
            .map_err(|_| NefError::Utf8("compiler"))?
            .to_string();
        let source = r.var_string("source", MAX_SOURCE_LEN)?;
        if r.u8()? != 0 {
            return Err(NefError::Reserved);
        }

        let count = r.var_int()?;
        if count > MAX_TOKENS {
            return Err(NefError::TooLong {
                field: "tokens",
                len: count,
            });
        }
        let mut tokens = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(r.take(20)?);
            tokens.push(MethodToken {
                hash: ScriptHash(hash),
                method: r.var_string("method", MAX_METHOD_LEN)?,
                params_count: r.u16()?,
                has_return_value: r.u8()? != 0,
                call_flags: r.u8()?,
            });
        }
        if r.u16()? != 0 {
            return Err(NefError::Reserved);
        }

        let script = r.var_bytes("script", MAX_SCRIPT_LEN)?.to_vec();
        if script.is_empty() {
            return Err(NefError::EmptyScript);
        }

        let body_len = r.pos;
        let stored = r.u32()?;
        if r.remaining() != 0 {
            return Err(NefError::TrailingBytes(r.remaining()));
        }
        let computed = checksum(&bytes[..body_len]);
        if stored != computed {
            return Err(NefError::Checksum { stored, computed });
        }

        Ok(Self {
            compiler,
            source,
            tokens,
            script,
            checksum: stored,
        })
    }

    /// Serialized file including the checksum.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.body_bytes();
        out.extend_from_slice(&self.checksum.to_le_bytes());
        out
    }

    fn body_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(80 + self.script.len());
        out.extend_from_slice(&NEF_MAGIC.to_le_bytes());
        let mut compiler = [0u8; COMPILER_LEN];
        let name = self.compiler.as_bytes();
        let n = name.len().min(COMPILER_LEN);
        compiler[..n].copy_from_slice(&name[..n]);
        out.extend_from_slice(&compiler);
        write_var_bytes(&mut out, self.source.as_bytes());
        out.push(0);
        write_var_int(&mut out, self.tokens.len() as u64);
        for token in &self.tokens {
            out.extend_from_slice(token.hash.as_bytes());
            write_var_bytes(&mut out, token.method.as_bytes());
            out.extend_from_slice(&token.params_count.to_le_bytes());
            out.push(u8::from(token.has_return_value));
            out.push(token.call_flags);
        }
        out.extend_from_slice(&[0, 0]);
        write_var_bytes(&mut out, &self.script);
        out
    }
}

/// First four bytes of double SHA-256, little-endian.
pub fn checksum(body: &[u8]) -> u32 {
    let digest = sha256(&sha256(body));
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// The parts of a contract manifest the deployer needs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Manifest {
    pub name: String,
}

impl Manifest {
    pub fn parse(bytes: &[u8]) -> Result<Self, String> {
        let manifest: Self = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
        if manifest.name.trim().is_empty() {
            return Err("contract name is empty".into());
        }
        Ok(manifest)
    }
}

/// NEF and manifest, parsed and kept alongside the exact bytes that get
/// submitted.
#[derive(Debug, Clone)]
pub struct DeployArtifacts {
    pub nef: NefFile,
    pub nef_bytes: Vec<u8>,
    pub manifest: Manifest,
    pub manifest_bytes: Vec<u8>,
}

impl DeployArtifacts {
    /// Reads and validates both files.
    pub fn load(nef_path: &Path, manifest_path: &Path) -> Result<Self, ArtifactError> {
        let nef_bytes = read(nef_path)?;
        let manifest_bytes = read(manifest_path)?;

        let nef = NefFile::parse(&nef_bytes).map_err(|source| ArtifactError::Nef {
            path: nef_path.to_path_buf(),
            source,
        })?;
        let manifest =
            Manifest::parse(&manifest_bytes).map_err(|reason| ArtifactError::Manifest {
                path: manifest_path.to_path_buf(),
                reason,
            })?;

        Ok(Self {
            nef,
            nef_bytes,
            manifest,
            manifest_bytes,
        })
    }

    /// Hash the contract will have once `sender` deploys it.
    pub fn contract_hash(&self, sender: &ScriptHash) -> ScriptHash {
        contract_hash(sender, self.nef.checksum, &self.manifest.name)
    }
}

fn read(path: &Path) -> Result<Vec<u8>, ArtifactError> {
    std::fs::read(path).map_err(|source| ArtifactError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Contract hash derived from deployer, NEF checksum and contract name.
pub fn contract_hash(sender: &ScriptHash, nef_checksum: u32, name: &str) -> ScriptHash {
    let mut sb = ScriptBuilder::new();
    sb.push_opcode(opcode::ABORT)
        .push_bytes(sender.as_bytes())
        .push_i64(i64::from(nef_checksum))
        .push_string(name);
    ScriptHash::from_script(&sb.into_bytes())
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], NefError> {
        if self.remaining() < n {
            return Err(NefError::Truncated);
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, NefError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, NefError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, NefError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn var_int(&mut self) -> Result<u64, NefError> {
        Ok(match self.u8()? {
            0xfd => u64::from(self.u16()?),
            0xfe => u64::from(self.u32()?),
            0xff => {
                let b = self.take(8)?;
                let mut le = [0u8; 8];
                le.copy_from_slice(b);
                u64::from_le_bytes(le)
            }
            n => u64::from(n),
        })
    }

    fn var_bytes(&mut self, field: &'static str, max: u64) -> Result<&'a [u8], NefError> {
        let len = self.var_int()?;
        if len > max {
            return Err(NefError::TooLong { field, len });
        }
        self.take(len as usize)
    }

    fn var_string(&mut self, field: &'static str, max: u64) -> Result<String, NefError> {
        let bytes = self.var_bytes(field, max)?;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| NefError::Utf8(field))
    }
}
