//! JSON-RPC seam for the NEO adapter.
//!
//! [`NeoRpc`] covers the node calls the payout adapter needs; [`NeoClient`]
//! implements it over a jsonrpsee HTTP client. Binary payloads travel as
//! base64, script hashes as 0x-prefixed display hex.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::tx::Signer;
use crate::types::{ScriptHash, TxHash};

/// Errors from node calls.
#[derive(Debug, Clone, Error)]
pub enum NeoRpcError {
    #[error("RPC transport error: {0}")]
    Transport(String),
    #[error("node rejected request: {0}")]
    Rejected(String),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("URL parse error: {0}")]
    UrlParse(String),
}

/// Result alias for node calls.
pub type Result<T> = std::result::Result<T, NeoRpcError>;

impl From<jsonrpsee::core::ClientError> for NeoRpcError {
    fn from(err: jsonrpsee::core::ClientError) -> Self {
        use jsonrpsee::core::ClientError;
        match err {
            ClientError::Call(obj) => {
                Self::Rejected(format!("{} (code {})", obj.message(), obj.code()))
            }
            ClientError::ParseError(e) => Self::Decode(e.to_string()),
            other => Self::Transport(other.to_string()),
        }
    }
}

/// Protocol settings reported by `getversion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionInfo {
    /// Network magic mixed into every signature.
    pub network: u32,
    /// How far ahead of the current height a transaction may stay valid.
    pub max_valid_until_block_increment: u32,
}

/// Outcome of a test invocation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InvokeResult {
    /// `HALT` on success, `FAULT` when the VM aborted.
    pub state: String,
    #[serde(rename = "gasconsumed", deserialize_with = "lenient_i64")]
    pub gas_consumed: i64,
    #[serde(default)]
    pub exception: Option<String>,
}

impl InvokeResult {
    pub fn is_halt(&self) -> bool {
        self.state == "HALT"
    }
}

/// A deployed contract as reported by `getcontractstate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractState {
    pub id: i32,
    pub update_counter: u32,
    pub hash: ScriptHash,
    pub name: String,
}

/// Node calls used by the payout adapter.
#[async_trait]
pub trait NeoRpc: Send + Sync {
    async fn get_version(&self) -> Result<VersionInfo>;

    /// Number of blocks in the chain, i.e. the next block's index.
    async fn get_block_count(&self) -> Result<u32>;

    /// Runs `script` without persisting it, as if signed by `signers`.
    async fn invoke_script(&self, script: &[u8], signers: &[Signer]) -> Result<InvokeResult>;

    /// Network fee for a serialized transaction whose witnesses carry
    /// verification scripts only.
    async fn calculate_network_fee(&self, tx: &[u8]) -> Result<i64>;

    /// Broadcasts a signed transaction and returns its hash.
    async fn send_raw_transaction(&self, tx: &[u8]) -> Result<TxHash>;

    /// Hash of a native contract by name, e.g. `ContractManagement`.
    async fn get_native_contract_hash(&self, name: &str) -> Result<ScriptHash>;

    /// State of a deployed contract, or `None` when the node does not know it.
    async fn get_contract_state(&self, hash: &ScriptHash) -> Result<Option<ContractState>>;
}

/// Default timeout for node requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A NEO node client connected to a specific RPC endpoint.
#[derive(Clone)]
pub struct NeoClient {
    client: HttpClient,
    rpc_url: String,
}

impl std::fmt::Debug for NeoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NeoClient")
            .field("rpc_url", &self.rpc_url)
            .finish()
    }
}

impl NeoClient {
    /// Creates a new client for the given RPC URL.
    pub fn new(rpc_url: &str) -> Result<Self> {
        Self::with_timeout(rpc_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(rpc_url: &str, timeout: Duration) -> Result<Self> {
        let client = HttpClientBuilder::default()
            .request_timeout(timeout)
            .build(rpc_url)
            .map_err(|e| NeoRpcError::UrlParse(e.to_string()))?;
        Ok(Self {
            client,
            rpc_url: rpc_url.to_string(),
        })
    }

    /// Returns the RPC URL.
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }
}

#[derive(Deserialize)]
struct VersionResponse {
    protocol: ProtocolResponse,
}

#[derive(Deserialize)]
struct ProtocolResponse {
    network: u32,
    #[serde(rename = "maxvaliduntilblockincrement")]
    max_valid_until_block_increment: u32,
}

#[derive(Deserialize)]
struct NetworkFeeResponse {
    #[serde(rename = "networkfee", deserialize_with = "lenient_i64")]
    network_fee: i64,
}

#[derive(Deserialize)]
struct SendResponse {
    hash: String,
}

#[derive(Deserialize)]
struct NativeContract {
    hash: String,
    manifest: ManifestName,
}

#[derive(Deserialize)]
struct ContractStateResponse {
    id: i32,
    #[serde(rename = "updatecounter")]
    update_counter: u32,
    hash: String,
    manifest: ManifestName,
}

#[derive(Deserialize)]
struct ManifestName {
    name: String,
}

impl TryFrom<ContractStateResponse> for ContractState {
    type Error = NeoRpcError;

    fn try_from(raw: ContractStateResponse) -> Result<Self> {
        let hash = raw
            .hash
            .parse()
            .map_err(|e| NeoRpcError::Decode(format!("contract hash: {e}")))?;
        Ok(Self {
            id: raw.id,
            update_counter: raw.update_counter,
            hash,
            name: raw.manifest.name,
        })
    }
}

/// Nodes answer `getcontractstate` for an unregistered hash with an
/// "Unknown contract" error rather than a null result.
fn is_unknown_contract(err: &jsonrpsee::core::ClientError) -> bool {
    match err {
        jsonrpsee::core::ClientError::Call(obj) => obj
            .message()
            .to_ascii_lowercase()
            .contains("unknown contract"),
        _ => false,
    }
}

/// Signer as the node expects it in `invokescript`.
#[derive(Serialize)]
struct RpcSigner {
    account: String,
    scopes: &'static str,
}

impl From<&Signer> for RpcSigner {
    fn from(signer: &Signer) -> Self {
        Self {
            account: signer.account.to_string(),
            scopes: signer.scopes.as_rpc_str(),
        }
    }
}

/// Fees and gas arrive as decimal strings from most nodes, as numbers from some.
fn lenient_i64<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn decode<T: DeserializeOwned>(value: serde_json::Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| NeoRpcError::Decode(e.to_string()))
}

#[async_trait]
impl NeoRpc for NeoClient {
    async fn get_version(&self) -> Result<VersionInfo> {
        let raw: serde_json::Value = self
            .client
            .request("getversion", rpc_params![])
            .await?;
        let version: VersionResponse = decode(raw)?;
        Ok(VersionInfo {
            network: version.protocol.network,
            max_valid_until_block_increment: version.protocol.max_valid_until_block_increment,
        })
    }

    async fn get_block_count(&self) -> Result<u32> {
        let count: u32 = self.client.request("getblockcount", rpc_params![]).await?;
        Ok(count)
    }

    async fn invoke_script(&self, script: &[u8], signers: &[Signer]) -> Result<InvokeResult> {
        let signers: Vec<RpcSigner> = signers.iter().map(RpcSigner::from).collect();
        let raw: serde_json::Value = self
            .client
            .request("invokescript", rpc_params![BASE64.encode(script), signers])
            .await?;
        decode(raw)
    }

    async fn calculate_network_fee(&self, tx: &[u8]) -> Result<i64> {
        let raw: serde_json::Value = self
            .client
            .request("calculatenetworkfee", rpc_params![BASE64.encode(tx)])
            .await?;
        let fee: NetworkFeeResponse = decode(raw)?;
        Ok(fee.network_fee)
    }

    async fn send_raw_transaction(&self, tx: &[u8]) -> Result<TxHash> {
        let raw: serde_json::Value = self
            .client
            .request("sendrawtransaction", rpc_params![BASE64.encode(tx)])
            .await?;
        let sent: SendResponse = decode(raw)?;
        sent.hash
            .parse()
            .map_err(|e| NeoRpcError::Decode(format!("transaction hash: {e}")))
    }

    async fn get_native_contract_hash(&self, name: &str) -> Result<ScriptHash> {
        let raw: serde_json::Value = self
            .client
            .request("getnativecontracts", rpc_params![])
            .await?;
        let contracts: Vec<NativeContract> = decode(raw)?;
        let contract = contracts
            .into_iter()
            .find(|c| c.manifest.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| NeoRpcError::Decode(format!("native contract {name} not listed")))?;
        contract
            .hash
            .parse()
            .map_err(|e| NeoRpcError::Decode(format!("{name} hash: {e}")))
    }

    async fn get_contract_state(&self, hash: &ScriptHash) -> Result<Option<ContractState>> {
        let response: std::result::Result<serde_json::Value, _> = self
            .client
            .request("getcontractstate", rpc_params![hash.to_string()])
            .await;
        match response {
            Ok(raw) => {
                let state: ContractStateResponse = decode(raw)?;
                Ok(Some(state.try_into()?))
            }
            Err(e) if is_unknown_contract(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
