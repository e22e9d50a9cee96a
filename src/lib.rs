// src/lib.rs
//! Typed client for the JSON-RPC contract served by ERC-4337 bundlers.
//!
//! [`schema`] describes the closed set of methods and their parameter and
//! result shapes, [`types`] the records they carry, and [`BundlerClient`]
//! issues them over HTTP. [`rpc`] exposes the same contract as a jsonrpsee
//! trait for server implementations.

pub mod client;
pub mod config;
pub mod error;
pub mod quantity;
pub mod rpc;
pub mod schema;
pub mod types;

pub use client::BundlerClient;
pub use config::{BundlerClientConfig, BICONOMY_NAMESPACE};
pub use error::{BundlerError, BundlerResult, JsonRpcError, JsonRpcErrorCode};
pub use quantity::DecimalQuantity;
pub use schema::{BundlerMethod, BundlerRequest, BundlerResponse, BundlerRpcMethod};
pub use types::{
    AccountOverride, EntryPointAddress, GasFeeValues, StateOverride, UserOpStatus, UserOperation,
    UserOperationByHash, UserOperationGasEstimate, UserOperationHash, UserOperationPartial,
    UserOperationReceipt,
};
