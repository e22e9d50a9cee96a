#![allow(dead_code)]

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aa_bundler_client::rpc::{bundler_module, start_server, BundlerApiServer, VendorApi};
use aa_bundler_client::{
    BundlerClient, BundlerClientConfig, EntryPointAddress, GasFeeValues, StateOverride,
    UserOpStatus, UserOperation, UserOperationByHash, UserOperationGasEstimate, UserOperationHash,
    UserOperationPartial, UserOperationReceipt, BICONOMY_NAMESPACE,
};
use async_trait::async_trait;
use ethers::types::{H256, U64};
use jsonrpsee::core::RpcResult;
use jsonrpsee::server::ServerHandle;
use jsonrpsee::types::ErrorObject;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const CHAIN_ID: u64 = 0x7a69;

#[derive(Default)]
pub struct DummyState {
    pub sends: AtomicUsize,
    pub receipt_polls: AtomicUsize,
    /// Receipt becomes visible once this many polls have happened.
    pub receipt_after_polls: AtomicUsize,
    pub operations: Mutex<HashMap<UserOperationHash, UserOperationByHash>>,
    pub receipts: Mutex<HashMap<UserOperationHash, UserOperationReceipt>>,
    pub estimates: Mutex<Vec<(UserOperationPartial, Option<StateOverride>)>>,
}

/// An in-memory bundler that accepts anything with a signature.
#[derive(Clone, Default)]
pub struct DummyBundler {
    pub state: Arc<DummyState>,
}

#[async_trait]
impl BundlerApiServer for DummyBundler {
    async fn send_user_operation(
        &self,
        user_operation: UserOperation,
        entry_point: EntryPointAddress,
    ) -> RpcResult<UserOperationHash> {
        if user_operation.signature.is_empty() {
            return Err(ErrorObject::owned(
                -32602,
                "invalid UserOperation signature",
                Some(json!({"field": "signature"})),
            )
            .into());
        }

        let count = self.state.sends.fetch_add(1, Ordering::SeqCst) as u64 + 1;
        let hash = UserOperationHash(H256::from_low_u64_be(count));
        let by_hash = UserOperationByHash {
            user_operation,
            entry_point,
            transaction_hash: Some(H256::from_low_u64_be(1000 + count)),
            block_hash: Some(H256::from_low_u64_be(2000 + count)),
            block_number: Some(U64::from(count)),
        };
        self.state.operations.lock().unwrap().insert(hash, by_hash);
        Ok(hash)
    }

    async fn estimate_user_operation_gas(
        &self,
        user_operation: UserOperationPartial,
        _entry_point: EntryPointAddress,
        state_override: Option<StateOverride>,
    ) -> RpcResult<UserOperationGasEstimate> {
        let without_signature = user_operation.signature.is_empty();
        self.state
            .estimates
            .lock()
            .unwrap()
            .push((user_operation, state_override));

        Ok(UserOperationGasEstimate {
            pre_verification_gas: 45_000u64.into(),
            verification_gas_limit: 150_000u64.into(),
            call_gas_limit: if without_signature {
                None
            } else {
                Some(80_000u64.into())
            },
            max_priority_fee_per_gas: 1_500_000_000u64.into(),
            max_fee_per_gas: 30_000_000_000u64.into(),
        })
    }

    async fn supported_entry_points(&self) -> RpcResult<Vec<EntryPointAddress>> {
        Ok(vec![EntryPointAddress::V0_6])
    }

    async fn chain_id(&self) -> RpcResult<U64> {
        Ok(U64::from(CHAIN_ID))
    }

    async fn get_user_operation_by_hash(
        &self,
        hash: UserOperationHash,
    ) -> RpcResult<Option<UserOperationByHash>> {
        Ok(self.state.operations.lock().unwrap().get(&hash).cloned())
    }

    async fn get_user_operation_receipt(
        &self,
        hash: UserOperationHash,
    ) -> RpcResult<Option<UserOperationReceipt>> {
        let polls = self.state.receipt_polls.fetch_add(1, Ordering::SeqCst) + 1;
        if polls < self.state.receipt_after_polls.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(self.state.receipts.lock().unwrap().get(&hash).cloned())
    }
}

#[async_trait]
impl VendorApi for DummyBundler {
    async fn gas_fee_values(&self) -> RpcResult<GasFeeValues> {
        Ok(GasFeeValues {
            max_priority_fee_per_gas: 1_500_000_000u64.into(),
            max_fee_per_gas: 30_000_000_000u64.into(),
        })
    }

    async fn user_operation_status(&self, hash: UserOperationHash) -> RpcResult<UserOpStatus> {
        if let Some(receipt) = self.state.receipts.lock().unwrap().get(&hash) {
            return Ok(UserOpStatus {
                state: "CONFIRMED".to_string(),
                transaction_hash: Some(receipt.transaction_hash()),
                user_operation_receipt: Some(receipt.clone()),
            });
        }
        let state = if self.state.operations.lock().unwrap().contains_key(&hash) {
            "BUNDLER_MEMPOOL"
        } else {
            "NOT_FOUND"
        };
        Ok(UserOpStatus {
            state: state.to_string(),
            transaction_hash: None,
            user_operation_receipt: None,
        })
    }
}

pub struct TestBundler {
    pub bundler: DummyBundler,
    pub addr: SocketAddr,
    pub handle: ServerHandle,
}

impl TestBundler {
    pub async fn start() -> Self {
        Self::start_with_namespace(Some(BICONOMY_NAMESPACE)).await
    }

    pub async fn start_with_namespace(namespace: Option<&str>) -> Self {
        let bundler = DummyBundler::default();
        let module = bundler_module(bundler.clone(), namespace).unwrap();
        let (addr, handle) = start_server(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)), module)
            .await
            .unwrap();
        Self {
            bundler,
            addr,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn config(&self) -> BundlerClientConfig {
        BundlerClientConfig::new(self.url())
            .with_request_timeout(Duration::from_secs(5))
            .with_receipt_polling(Duration::from_millis(10), Duration::from_secs(2))
    }

    pub fn client(&self) -> BundlerClient {
        BundlerClient::new(self.config().with_vendor_namespace(BICONOMY_NAMESPACE)).unwrap()
    }

    pub fn generic_client(&self) -> BundlerClient {
        BundlerClient::new(self.config()).unwrap()
    }

    pub fn insert_receipt(&self, receipt: UserOperationReceipt) {
        self.bundler
            .state
            .receipts
            .lock()
            .unwrap()
            .insert(receipt.user_op_hash, receipt);
    }
}

/// Answers every request with a fixed JSON-RPC payload and the request's id.
/// Used for replies a jsonrpsee server never produces.
pub struct RawResponder {
    pub addr: SocketAddr,
}

impl RawResponder {
    pub async fn start(payload: Value) -> Self {
        let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(respond(stream, payload.clone()));
            }
        });
        Self { addr }
    }

    pub fn client(&self) -> BundlerClient {
        BundlerClient::new(
            BundlerClientConfig::new(format!("http://{}", self.addr))
                .with_request_timeout(Duration::from_secs(5))
                .with_vendor_namespace(BICONOMY_NAMESPACE),
        )
        .unwrap()
    }
}

async fn respond(mut stream: TcpStream, mut payload: Value) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let body = loop {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);

        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let headers = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
        let len = headers
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buf.len() >= end + 4 + len {
            break buf[end + 4..end + 4 + len].to_vec();
        }
    };

    let request: Value = serde_json::from_slice(&body).unwrap();
    payload["jsonrpc"] = json!("2.0");
    payload["id"] = request["id"].clone();
    let reply = payload.to_string();
    let response = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        reply.len(),
        reply
    );
    stream.write_all(response.as_bytes()).await.unwrap();
    let _ = stream.shutdown().await;
}

pub fn signed_operation(nonce: u64) -> UserOperation {
    UserOperation::default()
        .sender("0x9c5754De1443984659E1b3a8d1931D83475ba29C".parse().unwrap())
        .nonce(nonce.into())
        .call_gas_limit(200_000.into())
        .verification_gas_limit(100_000.into())
        .pre_verification_gas(21_000.into())
        .max_fee_per_gas(3_000_000_000u64.into())
        .max_priority_fee_per_gas(1_000_000_000.into())
        .signature("0x7cb39607585dee8e297d0d7a669ad8c5e43975220b6773c10a138deadbc8ec864981de4b9b3c735288a217115fb33f8326a61ddabc60a534e3b5536515c70f931c".parse().unwrap())
}

pub fn receipt(hash: UserOperationHash, success: bool, reason: &str) -> UserOperationReceipt {
    serde_json::from_value(json!({
        "userOpHash": hash,
        "entryPoint": EntryPointAddress::V0_6,
        "sender": "0x9c5754De1443984659E1b3a8d1931D83475ba29C",
        "nonce": "0x0",
        "paymaster": "",
        "actualGasCost": "0x2386f26fc10000",
        "actualGasUsed": "0x1e8480",
        "success": if success { "true" } else { "false" },
        "reason": reason,
        "logs": [],
        "receipt": {
            "transactionHash": format!("0x{}", "22".repeat(32)),
            "transactionIndex": "0x0",
            "blockHash": format!("0x{}", "33".repeat(32)),
            "blockNumber": "0x10",
            "from": "0x9c5754De1443984659E1b3a8d1931D83475ba29C",
            "to": "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789",
            "cumulativeGasUsed": "0x1e8480",
            "gasUsed": "0x1e8480",
            "contractAddress": null,
            "logs": [],
            "status": "0x1",
            "logsBloom": format!("0x{}", "00".repeat(256)),
        }
    }))
    .unwrap()
}
