//! Payout contract ABI definitions using alloy's `sol!` macro.
//!
//! The contract is a payment splitter: the owner `fill`s balances for many
//! recipients in one payable call, recipients `release` their own balance.

use alloy::sol;
use alloy::sol_types::{Revert, SolError};

sol! {
    /// Payout splitter interface.
    interface IPayout {
        event PaymentReleased(address to, uint256 amount);

        function balanceOf(address account) external view returns (uint256);
        function fill(address[] addresses, uint256[] balances) external payable;
        function release() external;
    }
}

/// Creation bytecode of the payout splitter (solc 0.7.6). The deployer
/// becomes the owner allowed to call `fill`.
pub const PAYOUT_CREATION_CODE: &str = concat!(
    "608060405234801561001057600080fd5b50600180546001600160a01b03191633179055610585806100326000396000",
    "f3fe6080604052600436106100345760003560e01c80633bc4baa41461003957806370a082311461016257806386d1a6",
    "9f146101a7575b600080fd5b6101606004803603604081101561004f57600080fd5b8101906020810181356401000000",
    "0081111561006a57600080fd5b82018360208201111561007c57600080fd5b8035906020019184602083028401116401",
    "000000008311171561009e57600080fd5b91908080602002602001604051908101604052809392919081815260200183",
    "836020028082843760009201919091525092959493602081019350359150506401000000008111156100ee57600080fd",
    "5b82018360208201111561010057600080fd5b8035906020019184602083028401116401000000008311171561012257",
    "600080fd5b91908080602002602001604051908101604052809392919081815260200183836020028082843760009201",
    "91909152509295506101bc945050505050565b005b34801561016e57600080fd5b506101956004803603602081101561",
    "018557600080fd5b50356001600160a01b031661035f565b60408051918252519081900360200190f35b3480156101b3",
    "57600080fd5b5061016061037a565b6001546001600160a01b031633146102055760405162461bcd60e51b8152600401",
    "80806020018281038252602281526020018061052e6022913960400191505060405180910390fd5b8051825114610245",
    "5760405162461bcd60e51b81526004018080602001828103825260368152602001806104ce6036913960400191505060",
    "405180910390fd5b6000805b835181101561031a576102af83828151811061026157fe5b602002602001015160008087",
    "858151811061027857fe5b60200260200101516001600160a01b03166001600160a01b03168152602001908152602001",
    "6000205461044590919063ffffffff16565b6000808684815181106102be57fe5b60200260200101516001600160a01b",
    "03166001600160a01b03168152602001908152602001600020819055506103108382815181106102f957fe5b60200260",
    "200101518361044590919063ffffffff16565b9150600101610249565b503481111561035a5760405162461bcd60e51b",
    "815260040180806020018281038252602a815260200180610504602a913960400191505060405180910390fd5b505050",
    "565b6001600160a01b031660009081526020819052604090205490565b336000908152602081905260409020546103c5",
    "5760405162461bcd60e51b81526004018080602001828103825260278152602001806104a76027913960400191505060",
    "405180910390fd5b33600081815260208190526040808220805490839055905190929183156108fc0291849181818185",
    "8888f19350505050158015610406573d6000803e3d6000fd5b50604080513381526020810183905281517fdf20fd1e76",
    "bc69d672e4814fafb2c449bba3a5369d8359adf9e05e6fde87b056929181900390910190a150565b6000828201838110",
    "1561049f576040805162461bcd60e51b815260206004820152601b60248201527f536166654d6174683a206164646974",
    "696f6e206f766572666c6f770000000000604482015290519081900360640190fd5b939250505056fe5061796d656e74",
    "53706c69747465723a206163636f756e7420686173206e6f2062616c616e636541646472657373657320616e64206261",
    "6c616e636573206172726179206d7573742068617665207468652073616d65206c656e67746853756d206f662062616c",
    "616e63657320697320686967686572207468616e207061696420616d6f756e744f6e6c7920746865206f776e65722063",
    "616e20616464206e6577207061796f757473a26469706673582212202b8cf79a36e7f57cce5c7a341bb9923cfb47ef35",
    "5ee9dc62e6b7f5754c61938a64736f6c63430007060033",);

/// Decodes [`PAYOUT_CREATION_CODE`] into bytes.
pub fn creation_code() -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(PAYOUT_CREATION_CODE)
}

const NO_BALANCE: &str = "PaymentSplitter: account has no balance";
const LENGTH_MISMATCH: &str = "Addresses and balances array must have the same length";
const INSUFFICIENT_VALUE: &str = "Sum of balances is higher than paid amount";
const NOT_OWNER: &str = "Only the owner can add new payouts";

/// A decoded payout contract revert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayoutRevert {
    /// `release` called by an account with nothing owed.
    NoBalance,
    /// `fill` arrays differ in length.
    LengthMismatch,
    /// `msg.value` is below the sum of the filled balances.
    InsufficientValue,
    /// `fill` called by an account other than the owner.
    NotOwner,
    /// Any other revert, with the best reason available.
    Other(String),
}

impl PayoutRevert {
    /// Maps a revert reason string onto a known contract failure.
    pub fn from_reason(reason: &str) -> Self {
        if reason.contains(NO_BALANCE) {
            Self::NoBalance
        } else if reason.contains(LENGTH_MISMATCH) {
            Self::LengthMismatch
        } else if reason.contains(INSUFFICIENT_VALUE) {
            Self::InsufficientValue
        } else if reason.contains(NOT_OWNER) {
            Self::NotOwner
        } else {
            Self::Other(reason.to_string())
        }
    }

    /// Decodes `Error(string)` revert data, falling back to the node's
    /// error message when the data is absent or not a string revert.
    pub fn decode(data: Option<&[u8]>, message: &str) -> Self {
        match data.and_then(|d| Revert::abi_decode(d).ok()) {
            Some(revert) => Self::from_reason(&revert.reason),
            None => Self::from_reason(message),
        }
    }
}

impl std::fmt::Display for PayoutRevert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoBalance => f.write_str(NO_BALANCE),
            Self::LengthMismatch => f.write_str(LENGTH_MISMATCH),
            Self::InsufficientValue => f.write_str(INSUFFICIENT_VALUE),
            Self::NotOwner => f.write_str(NOT_OWNER),
            Self::Other(reason) => write!(f, "reverted: {reason}"),
        }
    }
}
