//! In-memory NEO node used by the adapter tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use payrail_neo::rpc::{ContractState, InvokeResult, NeoRpc, NeoRpcError, VersionInfo};
use payrail_neo::tx::{Signer, Transaction, Witness, WitnessScope};
use payrail_neo::{NeoSigner, ScriptHash, TxHash};

pub const OWNER_WIF: &str = "L3tgppXLgdaeqSGSFw1Go3skBiy8vQAM7YMXvTHsKQtE16PBncSU";
pub const OWNER_ADDRESS: &str = "NMACuhqEaNAeDSQVipcUPYiJ9TVgVyUxGV";
/// Addresses of script hashes `[0x11; 20]` and `[0x22; 20]`.
pub const A: &str = "NMUD7q5tYaFtw4w4hXk3feupGSGnv9jcrQ";
pub const B: &str = "NP2T3uNWTaxMXAUY6pqCdfPwB8tb6E6erL";

pub const NETWORK: u32 = 860_833_102;
pub const MAX_INCREMENT: u32 = 5760;
pub const BLOCK_COUNT: u32 = 1000;
pub const GAS_CONSUMED: i64 = 997_775;
pub const NETWORK_FEE: i64 = 1_230_610;

pub fn management_hash() -> ScriptHash {
    ScriptHash([0xfd; 20])
}

pub fn owner() -> NeoSigner {
    NeoSigner::from_wif(OWNER_WIF).unwrap()
}

struct State {
    calls: Mutex<Vec<&'static str>>,
    invoke_state: Mutex<(String, Option<String>)>,
    invoke_error: Mutex<Option<NeoRpcError>>,
    fee_error: Mutex<Option<NeoRpcError>>,
    invoked: Mutex<Vec<(Vec<u8>, Vec<Signer>)>>,
    fee_requests: Mutex<Vec<Vec<u8>>>,
    sent: Mutex<Vec<Vec<u8>>>,
    deployed: Mutex<Vec<ScriptHash>>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            calls: Mutex::default(),
            invoke_state: Mutex::new(("HALT".into(), None)),
            invoke_error: Mutex::default(),
            fee_error: Mutex::default(),
            invoked: Mutex::default(),
            fee_requests: Mutex::default(),
            sent: Mutex::default(),
            deployed: Mutex::default(),
        }
    }
}

/// A scripted [`NeoRpc`] that records every call.
#[derive(Clone, Default)]
pub struct MockNeo {
    state: Arc<State>,
}

impl MockNeo {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, method: &'static str) {
        self.state.calls.lock().unwrap().push(method);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls().iter().filter(|m| **m == method).count()
    }

    /// Makes test invocations end in FAULT with `exception`.
    pub fn fault_with(&self, exception: &str) {
        *self.state.invoke_state.lock().unwrap() = ("FAULT".into(), Some(exception.into()));
    }

    pub fn fail_invoke_with(&self, err: NeoRpcError) {
        *self.state.invoke_error.lock().unwrap() = Some(err);
    }

    pub fn fail_network_fee_with(&self, err: NeoRpcError) {
        *self.state.fee_error.lock().unwrap() = Some(err);
    }

    /// Makes `getcontractstate` report `hash` as registered.
    pub fn mark_deployed(&self, hash: ScriptHash) {
        self.state.deployed.lock().unwrap().push(hash);
    }

    /// Scripts and signers passed to `invokescript`.
    pub fn invoked(&self) -> Vec<(Vec<u8>, Vec<Signer>)> {
        self.state.invoked.lock().unwrap().clone()
    }

    /// Transactions passed to `calculatenetworkfee`.
    pub fn fee_requests(&self) -> Vec<Vec<u8>> {
        self.state.fee_requests.lock().unwrap().clone()
    }

    /// Transactions passed to `sendrawtransaction`.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.state.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NeoRpc for MockNeo {
    async fn get_version(&self) -> Result<VersionInfo, NeoRpcError> {
        self.record("getversion");
        Ok(VersionInfo {
            network: NETWORK,
            max_valid_until_block_increment: MAX_INCREMENT,
        })
    }

    async fn get_block_count(&self) -> Result<u32, NeoRpcError> {
        self.record("getblockcount");
        Ok(BLOCK_COUNT)
    }

    async fn invoke_script(
        &self,
        script: &[u8],
        signers: &[Signer],
    ) -> Result<InvokeResult, NeoRpcError> {
        self.record("invokescript");
        self.state
            .invoked
            .lock()
            .unwrap()
            .push((script.to_vec(), signers.to_vec()));
        if let Some(err) = self.state.invoke_error.lock().unwrap().clone() {
            return Err(err);
        }
        let (state, exception) = self.state.invoke_state.lock().unwrap().clone();
        Ok(InvokeResult {
            state,
            gas_consumed: GAS_CONSUMED,
            exception,
        })
    }

    async fn calculate_network_fee(&self, tx: &[u8]) -> Result<i64, NeoRpcError> {
        self.record("calculatenetworkfee");
        self.state.fee_requests.lock().unwrap().push(tx.to_vec());
        match self.state.fee_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(NETWORK_FEE),
        }
    }

    async fn send_raw_transaction(&self, tx: &[u8]) -> Result<TxHash, NeoRpcError> {
        self.record("sendrawtransaction");
        self.state.sent.lock().unwrap().push(tx.to_vec());
        Ok(decode_tx(tx).hash())
    }

    async fn get_native_contract_hash(&self, name: &str) -> Result<ScriptHash, NeoRpcError> {
        self.record("getnativecontracts");
        assert_eq!(name, "ContractManagement");
        Ok(management_hash())
    }

    async fn get_contract_state(
        &self,
        hash: &ScriptHash,
    ) -> Result<Option<ContractState>, NeoRpcError> {
        self.record("getcontractstate");
        let known = self.state.deployed.lock().unwrap().contains(hash);
        Ok(known.then(|| ContractState {
            id: 1,
            update_counter: 0,
            hash: *hash,
            name: "PayoutNeo".into(),
        }))
    }
}

/// Parses a serialized transaction back into its fields.
pub fn decode_tx(raw: &[u8]) -> Transaction {
    let mut r = Cursor { buf: raw, pos: 0 };
    let version = r.take(1)[0];
    let nonce = u32::from_le_bytes(r.take(4).try_into().unwrap());
    let system_fee = i64::from_le_bytes(r.take(8).try_into().unwrap());
    let network_fee = i64::from_le_bytes(r.take(8).try_into().unwrap());
    let valid_until_block = u32::from_le_bytes(r.take(4).try_into().unwrap());

    let signer_count = r.var_int();
    let signers = (0..signer_count)
        .map(|_| {
            let account = ScriptHash(r.take(20).try_into().unwrap());
            let scopes = match r.take(1)[0] {
                0x01 => WitnessScope::CalledByEntry,
                0x80 => WitnessScope::Global,
                other => panic!("unexpected scope 0x{other:02x}"),
            };
            Signer { account, scopes }
        })
        .collect();
    assert_eq!(r.var_int(), 0, "no attributes expected");
    let script = r.var_bytes();

    let witness_count = r.var_int();
    let witnesses = (0..witness_count)
        .map(|_| Witness {
            invocation: r.var_bytes(),
            verification: r.var_bytes(),
        })
        .collect();
    assert_eq!(r.pos, raw.len(), "trailing bytes");

    Transaction {
        version,
        nonce,
        system_fee,
        network_fee,
        valid_until_block,
        signers,
        script,
        witnesses,
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> &'a [u8] {
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        out
    }

    fn var_int(&mut self) -> u64 {
        match self.take(1)[0] {
            0xfd => u64::from(u16::from_le_bytes(self.take(2).try_into().unwrap())),
            0xfe => u64::from(u32::from_le_bytes(self.take(4).try_into().unwrap())),
            0xff => u64::from_le_bytes(self.take(8).try_into().unwrap()),
            n => u64::from(n),
        }
    }

    fn var_bytes(&mut self) -> Vec<u8> {
        let len = self.var_int() as usize;
        self.take(len).to_vec()
    }
}
