//! The NEO payout adapter.
//!
//! Each batch becomes one `batchPayout(addresses, amounts)` application call,
//! wrapped in an N3 transaction signed by the owner account.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use num_bigint::BigInt;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use payrail_core::config::NeoConfig;
use payrail_core::{
    ChainKind, DeployOutcome, PayoutAdapter, PayoutBatch, PayoutError, TxId, ValidationError,
};

use crate::nef::{ArtifactError, DeployArtifacts};
use crate::rpc::{NeoClient, NeoRpc, NeoRpcError, VersionInfo};
use crate::script::{CallFlags, ContractParam, ScriptBuilder, ScriptError};
use crate::signer::{NeoSigner, NeoSignerError};
use crate::tx::{Signer, Transaction, Witness, WitnessScope};
use crate::types::{ScriptHash, TxHash};

/// Contract method every payout calls.
pub const PAYOUT_METHOD: &str = "batchPayout";

/// Native contract that registers new contracts.
pub const MANAGEMENT_CONTRACT: &str = "ContractManagement";

/// Integer width of VM amounts.
const INT_BITS: u32 = 256;

/// Errors from NEO payout operations.
#[derive(Debug, Error)]
pub enum NeoPayoutError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error("RPC transport error: {0}")]
    Transport(String),
    #[error("node rejected transaction: {0}")]
    Rejected(String),
    #[error("script faulted: {0}")]
    Fault(String),
    #[error("fee estimation failed: {0}")]
    FeeEstimation(String),
    #[error("signing error: {0}")]
    Signing(String),
    #[error("encoding error: {0}")]
    Encoding(String),
}

/// Result alias for NEO payout operations.
pub type Result<T> = std::result::Result<T, NeoPayoutError>;

impl From<NeoRpcError> for NeoPayoutError {
    fn from(err: NeoRpcError) -> Self {
        match err {
            NeoRpcError::Transport(msg) => Self::Transport(msg),
            NeoRpcError::Rejected(msg) => Self::Rejected(msg),
            NeoRpcError::Decode(msg) => Self::Encoding(msg),
            NeoRpcError::UrlParse(reason) => Self::Validation(ValidationError::MalformedConfig {
                field: "neo.rpc_url",
                reason,
            }),
        }
    }
}

impl From<NeoSignerError> for NeoPayoutError {
    fn from(err: NeoSignerError) -> Self {
        Self::Signing(err.to_string())
    }
}

impl From<ScriptError> for NeoPayoutError {
    fn from(err: ScriptError) -> Self {
        Self::Encoding(err.to_string())
    }
}

impl From<NeoPayoutError> for PayoutError {
    fn from(err: NeoPayoutError) -> Self {
        match err {
            NeoPayoutError::Validation(e) => PayoutError::Validation(e),
            NeoPayoutError::Artifact(e) => PayoutError::Artifact(e.to_string()),
            NeoPayoutError::Transport(msg) => PayoutError::Transport(msg),
            NeoPayoutError::Rejected(msg) => PayoutError::Rejected(msg),
            e @ NeoPayoutError::Fault(_) => PayoutError::Rejected(e.to_string()),
            e @ NeoPayoutError::FeeEstimation(_) => PayoutError::Rejected(e.to_string()),
            NeoPayoutError::Signing(msg) => PayoutError::Signing(msg),
            NeoPayoutError::Encoding(msg) => PayoutError::Encoding(msg),
        }
    }
}

/// Fee queries fail either in transport or because the node cannot price
/// the transaction; only the former stays a transport error.
fn fee_error(err: NeoRpcError) -> NeoPayoutError {
    match err {
        NeoRpcError::Transport(msg) => NeoPayoutError::Transport(msg),
        other => NeoPayoutError::FeeEstimation(other.to_string()),
    }
}

/// Payout adapter bound to one owner account and one contract hash.
pub struct NeoPayoutAdapter<R = NeoClient> {
    rpc: R,
    signer: NeoSigner,
    contract: ScriptHash,
    version: OnceCell<VersionInfo>,
}

impl<R> std::fmt::Debug for NeoPayoutAdapter<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NeoPayoutAdapter")
            .field("sender", &self.signer.address())
            .field("contract", &self.contract.to_string())
            .finish()
    }
}

impl NeoPayoutAdapter<NeoClient> {
    /// Builds an adapter bound to the configured contract hash.
    ///
    /// Fails without touching the network when the key, URL or hash is
    /// missing or malformed.
    pub fn connect(config: &NeoConfig) -> Result<Self> {
        let signer = NeoSigner::from_wif(config.private_key.expose())?;
        let rpc = NeoClient::new(&config.rpc_url)?;
        Self::new(rpc, signer, config.contract.as_deref())
    }

    /// Like [`NeoPayoutAdapter::bootstrap`], building the client and signer
    /// from configuration.
    pub async fn from_config(config: &NeoConfig) -> Result<(Self, Option<DeployOutcome>)> {
        let signer = NeoSigner::from_wif(config.private_key.expose())?;
        let rpc = NeoClient::new(&config.rpc_url)?;
        Self::bootstrap(rpc, signer, config).await
    }
}

impl<R: NeoRpc> NeoPayoutAdapter<R> {
    /// Creates an adapter for an already deployed contract.
    ///
    /// `contract` is either `0x`-prefixed display hex or unprefixed hex in
    /// serialization order. It is validated here so that a bad configuration
    /// never reaches the node.
    pub fn new(rpc: R, signer: NeoSigner, contract: Option<&str>) -> Result<Self> {
        let contract = contract
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(ValidationError::MissingConfig("neo.contract"))?;
        let contract = ScriptHash::from_str(contract).map_err(|e| {
            ValidationError::MalformedConfig {
                field: "neo.contract",
                reason: e.to_string(),
            }
        })?;
        Ok(Self::with_contract_hash(rpc, signer, contract))
    }

    pub fn with_contract_hash(rpc: R, signer: NeoSigner, contract: ScriptHash) -> Self {
        Self {
            rpc,
            signer,
            contract,
            version: OnceCell::new(),
        }
    }

    /// Deploys first when the configuration asks for it, otherwise binds to
    /// the configured hash.
    pub async fn bootstrap(
        rpc: R,
        signer: NeoSigner,
        config: &NeoConfig,
    ) -> Result<(Self, Option<DeployOutcome>)> {
        if config.deploy {
            Self::deploy(rpc, signer, &config.nef_path, &config.manifest_path).await
        } else {
            Ok((Self::new(rpc, signer, config.contract.as_deref())?, None))
        }
    }

    /// Registers the contract through `ContractManagement.deploy` and returns
    /// an adapter bound to its hash.
    ///
    /// Both artifacts are read and validated before any node call. When the
    /// node already knows the derived hash nothing is submitted and the
    /// outcome is `None`.
    pub async fn deploy(
        rpc: R,
        signer: NeoSigner,
        nef_path: &Path,
        manifest_path: &Path,
    ) -> Result<(Self, Option<DeployOutcome>)> {
        let artifacts = DeployArtifacts::load(nef_path, manifest_path)?;
        let contract = artifacts.contract_hash(&signer.script_hash());
        let adapter = Self::with_contract_hash(rpc, signer, contract);

        if let Some(state) = adapter.rpc.get_contract_state(&contract).await? {
            info!(
                contract = %contract,
                id = state.id,
                name = %state.name,
                "payout contract already deployed"
            );
            return Ok((adapter, None));
        }

        let management = adapter
            .rpc
            .get_native_contract_hash(MANAGEMENT_CONTRACT)
            .await?;
        let mut sb = ScriptBuilder::new();
        sb.contract_call(
            &management,
            "deploy",
            CallFlags::ALL,
            &[
                ContractParam::ByteArray(artifacts.nef_bytes),
                ContractParam::ByteArray(artifacts.manifest_bytes),
                ContractParam::PublicKey(*adapter.signer.public_key()),
            ],
        )?;
        // Deployment calls back into the new contract, so the witness has to
        // reach beyond the entry script.
        let tx = adapter.submit(sb.into_bytes(), WitnessScope::Global).await?;

        let outcome = DeployOutcome {
            tx_id: tx_id(&tx.hash()),
            contract: contract.to_string(),
        };
        info!(
            contract = %outcome.contract,
            name = %artifacts.manifest.name,
            tx = %outcome.tx_id,
            "payout contract deployed"
        );
        Ok((adapter, Some(outcome)))
    }

    /// The contract this adapter calls.
    pub fn contract(&self) -> ScriptHash {
        self.contract
    }

    /// The owner account that signs payouts.
    pub fn sender(&self) -> ScriptHash {
        self.signer.script_hash()
    }

    /// Submits one `batchPayout` transaction paying every recipient in `batch`.
    pub async fn payout(&self, batch: &PayoutBatch) -> Result<TxId> {
        let script = batch_payout_script(&self.contract, batch)?;
        let tx = self.submit(script, WitnessScope::CalledByEntry).await?;
        let id = tx_id(&tx.hash());
        info!(
            tx = %id,
            recipients = batch.len(),
            total = %batch.total(),
            system_fee = tx.system_fee,
            network_fee = tx.network_fee,
            "payout submitted"
        );
        Ok(id)
    }

    async fn version(&self) -> Result<VersionInfo> {
        let version = self
            .version
            .get_or_try_init(|| async { self.rpc.get_version().await })
            .await?;
        Ok(*version)
    }

    /// Test-invoke, price, sign and broadcast `script`.
    ///
    /// A FAULT during the test invocation stops here; nothing is signed or
    /// sent for a script the VM would abort.
    async fn submit(&self, script: Vec<u8>, scopes: WitnessScope) -> Result<Transaction> {
        let version = self.version().await?;
        let signer = Signer {
            account: self.signer.script_hash(),
            scopes,
        };

        let invoke = self
            .rpc
            .invoke_script(&script, &[signer])
            .await
            .map_err(fee_error)?;
        if !invoke.is_halt() {
            let reason = invoke.exception.unwrap_or(invoke.state);
            return Err(NeoPayoutError::Fault(reason));
        }

        let height = self.rpc.get_block_count().await?;
        let valid_until_block = height
            .saturating_add(version.max_valid_until_block_increment)
            .saturating_sub(1);

        let mut tx = Transaction {
            version: 0,
            nonce: rand::random(),
            system_fee: invoke.gas_consumed,
            network_fee: 0,
            valid_until_block,
            signers: vec![signer],
            script,
            witnesses: vec![Witness {
                invocation: Vec::new(),
                verification: self.signer.verification_script(),
            }],
        };
        tx.network_fee = self
            .rpc
            .calculate_network_fee(&tx.to_bytes())
            .await
            .map_err(fee_error)?;
        tx.witnesses = vec![self.signer.witness(&tx, version.network)];
        debug!(
            nonce = tx.nonce,
            system_fee = tx.system_fee,
            network_fee = tx.network_fee,
            valid_until_block,
            "signed transaction"
        );

        let acknowledged = self.rpc.send_raw_transaction(&tx.to_bytes()).await?;
        if acknowledged != tx.hash() {
            warn!(
                local = %tx.hash(),
                node = %acknowledged,
                "node acknowledged a different transaction hash"
            );
        }
        Ok(tx)
    }
}

#[async_trait]
impl<R: NeoRpc> PayoutAdapter for NeoPayoutAdapter<R> {
    fn chain(&self) -> ChainKind {
        ChainKind::Neo
    }

    fn payer(&self) -> String {
        self.signer.address()
    }

    async fn payout(&self, batch: &PayoutBatch) -> std::result::Result<TxId, PayoutError> {
        Ok(NeoPayoutAdapter::payout(self, batch).await?)
    }
}

/// Builds the `batchPayout` invocation for `batch` against `contract`.
///
/// Every address and amount is checked before any byte is emitted.
pub fn batch_payout_script(contract: &ScriptHash, batch: &PayoutBatch) -> Result<Vec<u8>> {
    let mut accounts = Vec::with_capacity(batch.len());
    let mut amounts = Vec::with_capacity(batch.len());

    for (index, entry) in batch.entries().iter().enumerate() {
        let account = ScriptHash::from_address(entry.recipient.trim()).map_err(|e| {
            ValidationError::InvalidAddress {
                index,
                address: entry.recipient.clone(),
                reason: e.to_string(),
            }
        })?;
        // Signed 256-bit: the top bit is the sign.
        if entry.amount.bits() >= u64::from(INT_BITS) {
            return Err(ValidationError::AmountOutOfRange {
                index,
                bits: INT_BITS,
            }
            .into());
        }
        accounts.push(ContractParam::Hash160(account));
        amounts.push(ContractParam::Integer(BigInt::from(entry.amount.clone())));
    }

    let mut sb = ScriptBuilder::new();
    sb.contract_call(
        contract,
        PAYOUT_METHOD,
        CallFlags::ALL,
        &[ContractParam::Array(accounts), ContractParam::Array(amounts)],
    )?;
    Ok(sb.into_bytes())
}

fn tx_id(hash: &TxHash) -> TxId {
    TxId::new(hash.to_string())
}
