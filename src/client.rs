// src/client.rs
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use reqwest::Url;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::BundlerClientConfig;
use crate::error::{BundlerError, BundlerResult};
use crate::schema::{
    self, BundlerRequest, BundlerResponse, BundlerRpcMethod, JsonRpcRequest, JsonRpcResponse,
};
use crate::types::{
    EntryPointAddress, GasFeeValues, StateOverride, UserOpStatus, UserOperation,
    UserOperationByHash, UserOperationGasEstimate, UserOperationHash, UserOperationPartial,
    UserOperationReceipt,
};

/// Client for a bundler's JSON-RPC endpoint.
///
/// Every call is an independent request. Nothing is cached, retried or
/// deduplicated: two sends with the same sender and nonce are both issued and
/// the bundler decides which one it admits.
///
/// Responses are decoded through [`JsonRpcResponse`], so error envelopes
/// with string codes reach the caller unchanged.
#[derive(Debug, Clone)]
pub struct BundlerClient {
    http: reqwest::Client,
    url: Url,
    config: BundlerClientConfig,
    next_id: Arc<AtomicU64>,
    permits: Arc<Semaphore>,
}

impl BundlerClient {
    pub fn new(config: BundlerClientConfig) -> BundlerResult<Self> {
        let url = Url::parse(&config.url)
            .map_err(|e| BundlerError::InvalidArgument(format!("invalid bundler url {}: {e}", config.url)))?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BundlerError::InvalidArgument(format!("failed to build HTTP client: {e}")))?;

        debug!("Created bundler client for {}", url);
        Ok(Self {
            http,
            url,
            permits: Arc::new(Semaphore::new(config.max_concurrent_requests.max(1))),
            next_id: Arc::new(AtomicU64::new(0)),
            config,
        })
    }

    pub fn config(&self) -> &BundlerClientConfig {
        &self.config
    }

    /// Issues one method of the contract with its positional parameters.
    pub async fn call<M: BundlerRpcMethod>(&self, params: M::Params) -> BundlerResult<M::Output> {
        let method = M::METHOD.name(self.config.vendor_namespace.as_deref())?;
        let request = JsonRpcRequest::new(
            self.next_id.fetch_add(1, Ordering::Relaxed),
            method.as_ref(),
            schema::positional_params(&params)?,
        );

        debug!("Sending {} to {}", method, self.url);
        let result = self.send(&request).await.map_err(|err| {
            match &err {
                BundlerError::Transport(reason) => warn!("{} got no response: {}", method, reason),
                BundlerError::Rpc(rpc) => debug!("{} failed: {}", method, rpc),
                _ => {}
            }
            err
        })?;

        serde_json::from_value(result)
            .map_err(|e| BundlerError::InvalidResponse(format!("{method} result: {e}")))
    }

    /// Posts one request and returns its `result`, or the `error` envelope as
    /// [`BundlerError::Rpc`].
    async fn send(&self, request: &JsonRpcRequest) -> BundlerResult<Value> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| BundlerError::Transport(e.to_string()))?;

        let response = self.http.post(self.url.clone()).json(request).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        let response: JsonRpcResponse<Value> = match serde_json::from_slice(&body) {
            Ok(response) => response,
            Err(e) if status.is_success() => {
                return Err(BundlerError::InvalidResponse(format!("undecodable response: {e}")))
            }
            // A proxy or load balancer answered instead of the bundler.
            Err(_) => return Err(BundlerError::Transport(format!("HTTP {status}"))),
        };

        if !response.id.is_null() && response.id != Value::from(request.id) {
            return Err(BundlerError::InvalidResponse(format!(
                "response id {} does not match request id {}",
                response.id, request.id
            )));
        }
        response.into_result().map_err(BundlerError::Rpc)
    }

    /// Submits a signed operation. Never retried: after a transport failure
    /// use [`BundlerClient::is_user_operation_known`] before resubmitting.
    pub async fn send_user_operation(
        &self,
        user_operation: UserOperation,
        entry_point: EntryPointAddress,
    ) -> BundlerResult<UserOperationHash> {
        let sender = user_operation.sender;
        let nonce = user_operation.nonce;
        let hash = self
            .call::<schema::SendUserOperation>((user_operation, entry_point))
            .await?;

        info!("Submitted user operation {} (sender {:?}, nonce {})", hash, sender, nonce);
        Ok(hash)
    }

    pub async fn estimate_user_operation_gas(
        &self,
        user_operation: UserOperationPartial,
        entry_point: EntryPointAddress,
        state_override: Option<StateOverride>,
    ) -> BundlerResult<UserOperationGasEstimate> {
        if let Some(overrides) = &state_override {
            overrides.validate()?;
        }
        self.call::<schema::EstimateUserOperationGas>((user_operation, entry_point, state_override))
            .await
    }

    pub async fn supported_entry_points(&self) -> BundlerResult<Vec<EntryPointAddress>> {
        self.call::<schema::SupportedEntryPoints>(()).await
    }

    pub async fn chain_id(&self) -> BundlerResult<u64> {
        let chain_id = self.call::<schema::ChainId>(()).await?;
        Ok(chain_id.as_u64())
    }

    /// `Ok(None)` means the bundler has not indexed the hash, not a failure.
    pub async fn get_user_operation_by_hash(
        &self,
        hash: UserOperationHash,
    ) -> BundlerResult<Option<UserOperationByHash>> {
        self.call::<schema::GetUserOperationByHash>((hash,)).await
    }

    /// `Ok(None)` means the operation is still pending.
    pub async fn get_user_operation_receipt(
        &self,
        hash: UserOperationHash,
    ) -> BundlerResult<Option<UserOperationReceipt>> {
        let receipt = self.call::<schema::GetUserOperationReceipt>((hash,)).await?;
        if let Some(receipt) = &receipt {
            receipt.validate()?;
        }
        Ok(receipt)
    }

    /// Vendor gas-fee oracle. Requires a configured vendor namespace.
    pub async fn get_gas_fee_values(&self) -> BundlerResult<GasFeeValues> {
        self.call::<schema::GetGasFeeValues>(()).await
    }

    /// Vendor status lookup. Requires a configured vendor namespace.
    pub async fn get_user_operation_status(
        &self,
        hash: UserOperationHash,
    ) -> BundlerResult<UserOpStatus> {
        let status = self.call::<schema::GetUserOperationStatus>((hash,)).await?;
        if let Some(receipt) = &status.user_operation_receipt {
            receipt.validate()?;
        }
        Ok(status)
    }

    /// Runs any request of the contract and returns the matching response variant.
    pub async fn dispatch(&self, request: BundlerRequest) -> BundlerResult<BundlerResponse> {
        Ok(match request {
            BundlerRequest::SendUserOperation {
                user_operation,
                entry_point,
            } => BundlerResponse::SendUserOperation(
                self.send_user_operation(user_operation, entry_point).await?,
            ),
            BundlerRequest::EstimateUserOperationGas {
                user_operation,
                entry_point,
                state_override,
            } => BundlerResponse::EstimateUserOperationGas(
                self.estimate_user_operation_gas(user_operation, entry_point, state_override)
                    .await?,
            ),
            BundlerRequest::SupportedEntryPoints => {
                BundlerResponse::SupportedEntryPoints(self.supported_entry_points().await?)
            }
            BundlerRequest::ChainId => {
                BundlerResponse::ChainId(self.call::<schema::ChainId>(()).await?)
            }
            BundlerRequest::GetUserOperationByHash(hash) => {
                BundlerResponse::GetUserOperationByHash(self.get_user_operation_by_hash(hash).await?)
            }
            BundlerRequest::GetUserOperationReceipt(hash) => {
                BundlerResponse::GetUserOperationReceipt(self.get_user_operation_receipt(hash).await?)
            }
            BundlerRequest::GetGasFeeValues => {
                BundlerResponse::GetGasFeeValues(self.get_gas_fee_values().await?)
            }
            BundlerRequest::GetUserOperationStatus(hash) => {
                BundlerResponse::GetUserOperationStatus(self.get_user_operation_status(hash).await?)
            }
        })
    }

    pub async fn ensure_chain_id(&self, expected: u64) -> BundlerResult<()> {
        let actual = self.chain_id().await?;
        if actual != expected {
            return Err(BundlerError::ChainIdMismatch { expected, actual });
        }
        Ok(())
    }

    /// The supported set can change between calls, so this is not cached.
    pub async fn ensure_entry_point_supported(&self, entry_point: EntryPointAddress) -> BundlerResult<()> {
        let supported = self.supported_entry_points().await?;
        if !supported.contains(&entry_point) {
            return Err(BundlerError::UnsupportedEntryPoint(entry_point.address()));
        }
        Ok(())
    }

    /// Whether the bundler knows the operation. Check this before resubmitting
    /// after an ambiguous send failure.
    pub async fn is_user_operation_known(&self, hash: UserOperationHash) -> BundlerResult<bool> {
        Ok(self.get_user_operation_by_hash(hash).await?.is_some())
    }

    /// Polls for the receipt until it appears or the configured timeout
    /// elapses. Any failed poll ends the wait with that error.
    pub async fn wait_for_user_operation_receipt(
        &self,
        hash: UserOperationHash,
    ) -> BundlerResult<UserOperationReceipt> {
        let timeout = self.config.receipt_timeout;

        match tokio::time::timeout(timeout, self.poll_receipt(hash)).await {
            Ok(result) => {
                if let Ok(receipt) = &result {
                    info!("User operation {} mined (success: {})", hash, receipt.success);
                }
                result
            }
            Err(_) => Err(BundlerError::Timeout(format!(
                "no receipt for {hash} within {timeout:?}"
            ))),
        }
    }

    async fn poll_receipt(&self, hash: UserOperationHash) -> BundlerResult<UserOperationReceipt> {
        loop {
            if let Some(receipt) = self.get_user_operation_receipt(hash).await? {
                return Ok(receipt);
            }
            debug!("Receipt for {} not available yet", hash);
            tokio::time::sleep(self.config.receipt_poll_interval).await;
        }
    }
}
