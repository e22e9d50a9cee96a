// src/schema.rs
//! The closed set of methods a bundler serves, their positional parameters and
//! their results, plus the JSON-RPC 2.0 envelopes that carry them.

use std::borrow::Cow;
use std::fmt;

use ethers::types::U64;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BundlerError, BundlerResult, JsonRpcError};
use crate::types::{
    EntryPointAddress, GasFeeValues, StateOverride, UserOpStatus, UserOperation,
    UserOperationByHash, UserOperationGasEstimate, UserOperationHash, UserOperationPartial,
    UserOperationReceipt,
};

pub const JSONRPC_VERSION: &str = "2.0";

/// Every method of the bundler contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BundlerMethod {
    SendUserOperation,
    EstimateUserOperationGas,
    SupportedEntryPoints,
    ChainId,
    GetUserOperationByHash,
    GetUserOperationReceipt,
    /// Vendor extension, `<namespace>_getGasFeeValues`.
    GetGasFeeValues,
    /// Vendor extension, `<namespace>_getUserOperationStatus`.
    GetUserOperationStatus,
}

impl BundlerMethod {
    pub const ALL: [BundlerMethod; 8] = [
        Self::SendUserOperation,
        Self::EstimateUserOperationGas,
        Self::SupportedEntryPoints,
        Self::ChainId,
        Self::GetUserOperationByHash,
        Self::GetUserOperationReceipt,
        Self::GetGasFeeValues,
        Self::GetUserOperationStatus,
    ];

    /// Method name without its namespace.
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::SendUserOperation => "sendUserOperation",
            Self::EstimateUserOperationGas => "estimateUserOperationGas",
            Self::SupportedEntryPoints => "supportedEntryPoints",
            Self::ChainId => "chainId",
            Self::GetUserOperationByHash => "getUserOperationByHash",
            Self::GetUserOperationReceipt => "getUserOperationReceipt",
            Self::GetGasFeeValues => "getGasFeeValues",
            Self::GetUserOperationStatus => "getUserOperationStatus",
        }
    }

    pub fn is_vendor_extension(&self) -> bool {
        matches!(self, Self::GetGasFeeValues | Self::GetUserOperationStatus)
    }

    /// Full wire name. Vendor extensions need the deployment's namespace.
    pub fn name(&self, vendor_namespace: Option<&str>) -> BundlerResult<Cow<'static, str>> {
        if !self.is_vendor_extension() {
            return Ok(Cow::Owned(format!("eth_{}", self.suffix())));
        }
        match vendor_namespace {
            Some(namespace) if !namespace.is_empty() => {
                Ok(Cow::Owned(format!("{namespace}_{}", self.suffix())))
            }
            _ => Err(BundlerError::VendorExtensionUnavailable(self.suffix())),
        }
    }

    /// Inverse of [`BundlerMethod::name`].
    pub fn from_name(name: &str, vendor_namespace: Option<&str>) -> Option<Self> {
        let (namespace, suffix) = name.split_once('_')?;
        Self::ALL.into_iter().find(|method| {
            method.suffix() == suffix
                && if method.is_vendor_extension() {
                    vendor_namespace == Some(namespace)
                } else {
                    namespace == "eth"
                }
        })
    }
}

impl fmt::Display for BundlerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name(None) {
            Ok(name) => f.write_str(&name),
            Err(_) => write!(f, "<vendor>_{}", self.suffix()),
        }
    }
}

/// A (method, parameters, result) triple of the contract.
pub trait BundlerRpcMethod {
    const METHOD: BundlerMethod;
    /// Positional parameters, as a tuple.
    type Params: Serialize + Send;
    type Output: DeserializeOwned + Serialize + Send;
}

pub struct SendUserOperation;
pub struct EstimateUserOperationGas;
pub struct SupportedEntryPoints;
pub struct ChainId;
pub struct GetUserOperationByHash;
pub struct GetUserOperationReceipt;
pub struct GetGasFeeValues;
pub struct GetUserOperationStatus;

impl BundlerRpcMethod for SendUserOperation {
    const METHOD: BundlerMethod = BundlerMethod::SendUserOperation;
    type Params = (UserOperation, EntryPointAddress);
    type Output = UserOperationHash;
}

impl BundlerRpcMethod for EstimateUserOperationGas {
    const METHOD: BundlerMethod = BundlerMethod::EstimateUserOperationGas;
    type Params = (UserOperationPartial, EntryPointAddress, Option<StateOverride>);
    type Output = UserOperationGasEstimate;
}

impl BundlerRpcMethod for SupportedEntryPoints {
    const METHOD: BundlerMethod = BundlerMethod::SupportedEntryPoints;
    type Params = ();
    type Output = Vec<EntryPointAddress>;
}

impl BundlerRpcMethod for ChainId {
    const METHOD: BundlerMethod = BundlerMethod::ChainId;
    type Params = ();
    type Output = U64;
}

impl BundlerRpcMethod for GetUserOperationByHash {
    const METHOD: BundlerMethod = BundlerMethod::GetUserOperationByHash;
    type Params = (UserOperationHash,);
    /// `None` means not indexed yet, not an error.
    type Output = Option<UserOperationByHash>;
}

impl BundlerRpcMethod for GetUserOperationReceipt {
    const METHOD: BundlerMethod = BundlerMethod::GetUserOperationReceipt;
    type Params = (UserOperationHash,);
    /// `None` means not mined yet, not an error.
    type Output = Option<UserOperationReceipt>;
}

impl BundlerRpcMethod for GetGasFeeValues {
    const METHOD: BundlerMethod = BundlerMethod::GetGasFeeValues;
    type Params = ();
    type Output = GasFeeValues;
}

impl BundlerRpcMethod for GetUserOperationStatus {
    const METHOD: BundlerMethod = BundlerMethod::GetUserOperationStatus;
    type Params = (UserOperationHash,);
    type Output = UserOpStatus;
}

/// Serializes a parameter tuple into its positional JSON array. Trailing
/// `null`s from unset optional parameters are dropped.
pub fn positional_params<P: Serialize>(params: &P) -> Result<Vec<Value>, serde_json::Error> {
    let mut values = match serde_json::to_value(params)? {
        Value::Null => Vec::new(),
        Value::Array(values) => values,
        other => vec![other],
    };
    while matches!(values.last(), Some(Value::Null)) {
        values.pop();
    }
    Ok(values)
}

/// A request to any method of the contract.
#[derive(Debug, Clone, PartialEq)]
pub enum BundlerRequest {
    SendUserOperation {
        user_operation: UserOperation,
        entry_point: EntryPointAddress,
    },
    EstimateUserOperationGas {
        user_operation: UserOperationPartial,
        entry_point: EntryPointAddress,
        state_override: Option<StateOverride>,
    },
    SupportedEntryPoints,
    ChainId,
    GetUserOperationByHash(UserOperationHash),
    GetUserOperationReceipt(UserOperationHash),
    GetGasFeeValues,
    GetUserOperationStatus(UserOperationHash),
}

impl BundlerRequest {
    pub fn method(&self) -> BundlerMethod {
        match self {
            Self::SendUserOperation { .. } => BundlerMethod::SendUserOperation,
            Self::EstimateUserOperationGas { .. } => BundlerMethod::EstimateUserOperationGas,
            Self::SupportedEntryPoints => BundlerMethod::SupportedEntryPoints,
            Self::ChainId => BundlerMethod::ChainId,
            Self::GetUserOperationByHash(_) => BundlerMethod::GetUserOperationByHash,
            Self::GetUserOperationReceipt(_) => BundlerMethod::GetUserOperationReceipt,
            Self::GetGasFeeValues => BundlerMethod::GetGasFeeValues,
            Self::GetUserOperationStatus(_) => BundlerMethod::GetUserOperationStatus,
        }
    }

    pub fn params(&self) -> Result<Vec<Value>, serde_json::Error> {
        match self {
            Self::SendUserOperation {
                user_operation,
                entry_point,
            } => positional_params(&(user_operation, entry_point)),
            Self::EstimateUserOperationGas {
                user_operation,
                entry_point,
                state_override,
            } => positional_params(&(user_operation, entry_point, state_override)),
            Self::SupportedEntryPoints | Self::ChainId | Self::GetGasFeeValues => {
                Ok(Vec::new())
            }
            Self::GetUserOperationByHash(hash)
            | Self::GetUserOperationReceipt(hash)
            | Self::GetUserOperationStatus(hash) => positional_params(&(hash,)),
        }
    }

    pub fn to_json_rpc(&self, id: u64, vendor_namespace: Option<&str>) -> BundlerResult<JsonRpcRequest> {
        Ok(JsonRpcRequest::new(
            id,
            self.method().name(vendor_namespace)?,
            self.params()?,
        ))
    }
}

/// The result of any method of the contract.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BundlerResponse {
    SendUserOperation(UserOperationHash),
    EstimateUserOperationGas(UserOperationGasEstimate),
    SupportedEntryPoints(Vec<EntryPointAddress>),
    ChainId(U64),
    GetUserOperationByHash(Option<UserOperationByHash>),
    GetUserOperationReceipt(Option<UserOperationReceipt>),
    GetGasFeeValues(GasFeeValues),
    GetUserOperationStatus(UserOpStatus),
}

impl BundlerResponse {
    /// Decodes a `result` value according to the method that produced it.
    pub fn decode(method: BundlerMethod, result: Value) -> Result<Self, serde_json::Error> {
        Ok(match method {
            BundlerMethod::SendUserOperation => Self::SendUserOperation(serde_json::from_value(result)?),
            BundlerMethod::EstimateUserOperationGas => {
                Self::EstimateUserOperationGas(serde_json::from_value(result)?)
            }
            BundlerMethod::SupportedEntryPoints => {
                Self::SupportedEntryPoints(serde_json::from_value(result)?)
            }
            BundlerMethod::ChainId => Self::ChainId(serde_json::from_value(result)?),
            BundlerMethod::GetUserOperationByHash => {
                Self::GetUserOperationByHash(serde_json::from_value(result)?)
            }
            BundlerMethod::GetUserOperationReceipt => {
                Self::GetUserOperationReceipt(serde_json::from_value(result)?)
            }
            BundlerMethod::GetGasFeeValues => Self::GetGasFeeValues(serde_json::from_value(result)?),
            BundlerMethod::GetUserOperationStatus => {
                Self::GetUserOperationStatus(serde_json::from_value(result)?)
            }
        })
    }

    pub fn method(&self) -> BundlerMethod {
        match self {
            Self::SendUserOperation(_) => BundlerMethod::SendUserOperation,
            Self::EstimateUserOperationGas(_) => BundlerMethod::EstimateUserOperationGas,
            Self::SupportedEntryPoints(_) => BundlerMethod::SupportedEntryPoints,
            Self::ChainId(_) => BundlerMethod::ChainId,
            Self::GetUserOperationByHash(_) => BundlerMethod::GetUserOperationByHash,
            Self::GetUserOperationReceipt(_) => BundlerMethod::GetUserOperationReceipt,
            Self::GetGasFeeValues(_) => BundlerMethod::GetGasFeeValues,
            Self::GetUserOperationStatus(_) => BundlerMethod::GetUserOperationStatus,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: Vec<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonRpcPayload<T> {
    Result(T),
    Error(JsonRpcError),
}

/// A JSON-RPC response whose success payload is typed per method and whose
/// error payload is the shared [`JsonRpcError`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse<T> {
    #[serde(default)]
    pub jsonrpc: String,
    /// `null` when the server could not read the request id.
    pub id: Value,
    #[serde(flatten)]
    pub payload: JsonRpcPayload<T>,
}

impl<T> JsonRpcResponse<T> {
    pub fn into_result(self) -> Result<T, JsonRpcError> {
        match self.payload {
            JsonRpcPayload::Result(result) => Ok(result),
            JsonRpcPayload::Error(err) => Err(err),
        }
    }
}
