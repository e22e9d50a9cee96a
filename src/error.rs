// src/error.rs
use std::fmt;

use ethers::types::Address;
use jsonrpsee::types::ErrorObjectOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::quantity::QuantityError;

/// The code of a JSON-RPC error. Codes are numeric per JSON-RPC 2.0, but some
/// bundlers send strings, so both are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcErrorCode {
    Number(i64),
    Text(String),
}

impl JsonRpcErrorCode {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(code) => Some(*code),
            Self::Text(code) => code.parse().ok(),
        }
    }
}

impl fmt::Display for JsonRpcErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(code) => write!(f, "{code}"),
            Self::Text(code) => f.write_str(code),
        }
    }
}

impl From<i64> for JsonRpcErrorCode {
    fn from(code: i64) -> Self {
        Self::Number(code)
    }
}

/// The `error` member of a failed JSON-RPC response, shared by every method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: JsonRpcErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    pub fn new(code: impl Into<JsonRpcErrorCode>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl From<ErrorObjectOwned> for JsonRpcError {
    fn from(err: ErrorObjectOwned) -> Self {
        // Undecodable data is kept as the raw text rather than dropped.
        let data = err.data().map(|raw| {
            serde_json::from_str(raw.get())
                .unwrap_or_else(|_| serde_json::Value::String(raw.get().to_string()))
        });
        Self {
            code: JsonRpcErrorCode::Number(i64::from(err.code())),
            message: err.message().to_string(),
            data,
        }
    }
}

#[derive(Error, Debug)]
pub enum BundlerError {
    /// No response was received. A submission may or may not have been accepted.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Bundler returned an error: {0}")]
    Rpc(JsonRpcError),

    #[error("Invalid bundler response: {0}")]
    InvalidResponse(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid quantity: {0}")]
    Quantity(#[from] QuantityError),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Chain id mismatch: expected {expected}, bundler reports {actual}")]
    ChainIdMismatch { expected: u64, actual: u64 },

    #[error("Entry point {0:?} is not supported by the bundler")]
    UnsupportedEntryPoint(Address),

    #[error("Vendor extension {0} requires a configured vendor namespace")]
    VendorExtensionUnavailable(&'static str),
}

impl BundlerError {
    /// True when the request may have reached the bundler without an answer
    /// coming back. Resubmitting after such a failure can double-submit.
    pub fn is_submission_ambiguous(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub fn rpc_error(&self) -> Option<&JsonRpcError> {
        match self {
            Self::Rpc(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BundlerError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// For callers of the generated `BundlerApiClient`. jsonrpsee only reads
/// numeric error codes, so a string code arrives here as `InvalidResponse`.
impl From<jsonrpsee::core::Error> for BundlerError {
    fn from(err: jsonrpsee::core::Error) -> Self {
        use jsonrpsee::core::Error;

        match err {
            Error::Call(obj) => Self::Rpc(obj.into()),
            Error::ParseError(e) => Self::InvalidResponse(e.to_string()),
            Error::RequestTimeout => Self::Transport("request timed out".to_string()),
            Error::Transport(e) => Self::Transport(e.to_string()),
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for BundlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidArgument(format!("JSON serializing error: {err}"))
    }
}

pub type BundlerResult<T> = Result<T, BundlerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use jsonrpsee::types::ErrorObject;
    use serde_json::json;

    #[test]
    fn error_object_keeps_code_message_and_data() {
        let obj = ErrorObject::owned(-32602, "invalid params", Some(json!({"field": "sender"})));
        let err = JsonRpcError::from(obj);
        assert_eq!(err.code.as_i64(), Some(-32602));
        assert_eq!(err.message, "invalid params");
        assert_eq!(err.data, Some(json!({"field": "sender"})));
    }

    #[test]
    fn string_codes_are_accepted() {
        let err: JsonRpcError =
            serde_json::from_value(json!({"code": "-32500", "message": "AA21"})).unwrap();
        assert_eq!(err.code, JsonRpcErrorCode::Text("-32500".into()));
        assert_eq!(err.code.as_i64(), Some(-32500));
        assert!(err.data.is_none());
    }

    #[test]
    fn only_transport_failures_are_ambiguous() {
        assert!(BundlerError::Transport("connection reset".into()).is_submission_ambiguous());
        let rpc = BundlerError::Rpc(JsonRpcError::new(-32602i64, "bad"));
        assert!(!rpc.is_submission_ambiguous());
        assert_eq!(rpc.rpc_error().map(|e| e.message.as_str()), Some("bad"));
    }
}
