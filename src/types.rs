// src/types.rs
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use ethers::types::{Address, Bytes, Log, TransactionReceipt, H160, H256, U256, U64};
use serde::{de, Deserialize, Deserializer, Serialize};

use crate::error::{BundlerError, BundlerResult};
use crate::quantity::{self, DecimalQuantity, QuantityError};

/// A signed user operation in the EntryPoint v0.6 layout, ready for
/// `eth_sendUserOperation`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    #[serde(deserialize_with = "quantity::strict_address::deserialize")]
    pub sender: Address,
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster_and_data: Bytes,
    pub signature: Bytes,
}

impl UserOperation {
    pub fn sender(mut self, sender: Address) -> Self {
        self.sender = sender;
        self
    }

    pub fn nonce(mut self, nonce: U256) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn call_data(mut self, call_data: Bytes) -> Self {
        self.call_data = call_data;
        self
    }

    pub fn call_gas_limit(mut self, call_gas_limit: U256) -> Self {
        self.call_gas_limit = call_gas_limit;
        self
    }

    pub fn verification_gas_limit(mut self, verification_gas_limit: U256) -> Self {
        self.verification_gas_limit = verification_gas_limit;
        self
    }

    pub fn pre_verification_gas(mut self, pre_verification_gas: U256) -> Self {
        self.pre_verification_gas = pre_verification_gas;
        self
    }

    pub fn max_fee_per_gas(mut self, max_fee_per_gas: U256) -> Self {
        self.max_fee_per_gas = max_fee_per_gas;
        self
    }

    pub fn max_priority_fee_per_gas(mut self, max_priority_fee_per_gas: U256) -> Self {
        self.max_priority_fee_per_gas = max_priority_fee_per_gas;
        self
    }

    pub fn paymaster_and_data(mut self, paymaster_and_data: Bytes) -> Self {
        self.paymaster_and_data = paymaster_and_data;
        self
    }

    pub fn signature(mut self, signature: Bytes) -> Self {
        self.signature = signature;
        self
    }
}

/// The estimation input: a user operation without `callGasLimit`,
/// `verificationGasLimit` and `preVerificationGas`. Those fields are not
/// optional here, they do not exist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationPartial {
    #[serde(deserialize_with = "quantity::strict_address::deserialize")]
    pub sender: Address,
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster_and_data: Bytes,
    /// Usually a dummy signature of the right length.
    pub signature: Bytes,
}

impl UserOperationPartial {
    /// Fills in the gas limits from an estimate, producing an operation that
    /// still needs its final signature.
    pub fn with_gas_estimate(self, estimate: &UserOperationGasEstimate) -> BundlerResult<UserOperation> {
        let call_gas_limit = estimate.call_gas_limit.ok_or_else(|| {
            BundlerError::InvalidArgument("gas estimate has no callGasLimit".to_string())
        })?;

        Ok(UserOperation {
            sender: self.sender,
            nonce: self.nonce,
            init_code: self.init_code,
            call_data: self.call_data,
            call_gas_limit: call_gas_limit.into(),
            verification_gas_limit: estimate.verification_gas_limit.into(),
            pre_verification_gas: estimate.pre_verification_gas.into(),
            max_fee_per_gas: self.max_fee_per_gas,
            max_priority_fee_per_gas: self.max_priority_fee_per_gas,
            paymaster_and_data: self.paymaster_and_data,
            signature: self.signature,
        })
    }
}

impl From<UserOperation> for UserOperationPartial {
    fn from(op: UserOperation) -> Self {
        Self {
            sender: op.sender,
            nonce: op.nonce,
            init_code: op.init_code,
            call_data: op.call_data,
            max_fee_per_gas: op.max_fee_per_gas,
            max_priority_fee_per_gas: op.max_priority_fee_per_gas,
            paymaster_and_data: op.paymaster_and_data,
            signature: op.signature,
        }
    }
}

/// Hash of a user operation as computed by the entry point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct UserOperationHash(pub H256);

impl<'de> Deserialize<'de> for UserOperationHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(de::Error::custom)
    }
}

impl From<H256> for UserOperationHash {
    fn from(value: H256) -> Self {
        Self(value)
    }
}

impl From<UserOperationHash> for H256 {
    fn from(value: UserOperationHash) -> Self {
        value.0
    }
}

impl FromStr for UserOperationHash {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        quantity::parse_hash(s).map(Self)
    }
}

impl fmt::Display for UserOperationHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// Address of the entry point contract an operation targets. Passed through
/// to the bundler unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct EntryPointAddress(pub Address);

impl<'de> Deserialize<'de> for EntryPointAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(de::Error::custom)
    }
}

impl EntryPointAddress {
    pub const V0_6: Self = Self(H160([
        0x5f, 0xf1, 0x37, 0xd4, 0xb0, 0xfd, 0xcd, 0x49, 0xdc, 0xa3, 0x0c, 0x7c, 0xf5, 0x7e, 0x57,
        0x8a, 0x02, 0x6d, 0x27, 0x89,
    ]));

    pub const V0_7: Self = Self(H160([
        0x00, 0x00, 0x00, 0x00, 0x71, 0x72, 0x7d, 0xe2, 0x2e, 0x5e, 0x9d, 0x8b, 0xaf, 0x0e, 0xda,
        0xc6, 0xf3, 0x7d, 0xa0, 0x32,
    ]));

    pub fn address(&self) -> Address {
        self.0
    }
}

impl From<Address> for EntryPointAddress {
    fn from(value: Address) -> Self {
        Self(value)
    }
}

impl FromStr for EntryPointAddress {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        quantity::parse_address(s).map(Self)
    }
}

impl fmt::Display for EntryPointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// Simulated account state for one address, used only by gas estimation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<U64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<Bytes>,
    /// Replaces the whole storage of the account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<HashMap<H256, H256>>,
    /// Patches individual storage slots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_diff: Option<HashMap<H256, H256>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateOverride(pub HashMap<Address, AccountOverride>);

impl StateOverride {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account(&mut self, address: Address) -> &mut AccountOverride {
        self.0.entry(address).or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `state` and `stateDiff` cannot both be set for one account.
    pub fn validate(&self) -> BundlerResult<()> {
        for (address, account) in &self.0 {
            if account.state.is_some() && account.state_diff.is_some() {
                return Err(BundlerError::InvalidArgument(format!(
                    "state override for {address:?} sets both state and stateDiff"
                )));
            }
        }
        Ok(())
    }
}

/// Result of `eth_estimateUserOperationGas`. All values are decimal strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationGasEstimate {
    pub pre_verification_gas: DecimalQuantity,
    pub verification_gas_limit: DecimalQuantity,
    /// Some bundlers cannot estimate this without a real signature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_gas_limit: Option<DecimalQuantity>,
    pub max_priority_fee_per_gas: DecimalQuantity,
    pub max_fee_per_gas: DecimalQuantity,
}

/// Result of `eth_getUserOperationByHash`. The inclusion fields are `None`
/// while the operation is still in the bundler's mempool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationByHash {
    #[serde(flatten)]
    pub user_operation: UserOperation,
    pub entry_point: EntryPointAddress,
    #[serde(default, deserialize_with = "quantity::optional_hash::deserialize")]
    pub transaction_hash: Option<H256>,
    #[serde(default, deserialize_with = "quantity::optional_hash::deserialize")]
    pub block_hash: Option<H256>,
    #[serde(default)]
    pub block_number: Option<U64>,
}

impl UserOperationByHash {
    pub fn is_pending(&self) -> bool {
        self.transaction_hash.is_none()
    }
}

/// Outcome of a mined user operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationReceipt {
    pub user_op_hash: UserOperationHash,
    pub entry_point: EntryPointAddress,
    #[serde(deserialize_with = "quantity::strict_address::deserialize")]
    pub sender: Address,
    pub nonce: U256,
    #[serde(default, with = "quantity::optional_paymaster")]
    pub paymaster: Option<Address>,
    pub actual_gas_cost: U256,
    pub actual_gas_used: U256,
    #[serde(with = "quantity::success_flag")]
    pub success: bool,
    #[serde(default, deserialize_with = "quantity::nullable_string::deserialize")]
    pub reason: String,
    #[serde(default)]
    pub logs: Vec<Log>,
    /// Receipt of the whole bundle transaction, not only this operation.
    pub receipt: TransactionReceipt,
}

impl UserOperationReceipt {
    /// A successful receipt carries no revert reason and a failed one must.
    pub fn validate(&self) -> BundlerResult<()> {
        match (self.success, self.reason.is_empty()) {
            (true, false) => Err(BundlerError::InvalidResponse(format!(
                "receipt for {} succeeded but has revert reason {:?}",
                self.user_op_hash, self.reason
            ))),
            (false, true) => Err(BundlerError::InvalidResponse(format!(
                "receipt for {} failed without a revert reason",
                self.user_op_hash
            ))),
            _ => Ok(()),
        }
    }

    pub fn transaction_hash(&self) -> H256 {
        self.receipt.transaction_hash
    }
}

/// Result of the vendor gas-fee oracle. Both values are decimal strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasFeeValues {
    pub max_priority_fee_per_gas: DecimalQuantity,
    pub max_fee_per_gas: DecimalQuantity,
}

/// Result of the vendor status method. `state` values are defined by the
/// bundler deployment; compare them exactly, never parse them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOpStatus {
    pub state: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "quantity::optional_hash::deserialize"
    )]
    pub transaction_hash: Option<H256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_operation_receipt: Option<UserOperationReceipt>,
}

impl UserOpStatus {
    pub fn is_state(&self, state: &str) -> bool {
        self.state == state
    }

    pub fn is_resolved(&self) -> bool {
        self.transaction_hash.is_some() || self.user_operation_receipt.is_some()
    }
}
