// src/rpc.rs
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::server::{ServerBuilder, ServerHandle};
use jsonrpsee::RpcModule;
use tracing::{debug, info};

use ethers::types::U64;

use crate::schema::BundlerMethod;
use crate::types::{
    EntryPointAddress, GasFeeValues, StateOverride, UserOpStatus, UserOperation,
    UserOperationByHash, UserOperationGasEstimate, UserOperationHash, UserOperationPartial,
    UserOperationReceipt,
};

/// The standard `eth` namespace of an ERC-4337 bundler. The generated
/// `BundlerApiClient` works over any jsonrpsee client and `BundlerApiServer`
/// is what a bundler (or a test double) implements.
#[rpc(client, server, namespace = "eth")]
pub trait BundlerApi {
    /// Submits a signed user operation and returns its hash.
    #[method(name = "sendUserOperation")]
    async fn send_user_operation(
        &self,
        user_operation: UserOperation,
        entry_point: EntryPointAddress,
    ) -> RpcResult<UserOperationHash>;

    /// Estimates gas limits for an operation that does not have them yet.
    #[method(name = "estimateUserOperationGas")]
    async fn estimate_user_operation_gas(
        &self,
        user_operation: UserOperationPartial,
        entry_point: EntryPointAddress,
        state_override: Option<StateOverride>,
    ) -> RpcResult<UserOperationGasEstimate>;

    #[method(name = "supportedEntryPoints")]
    async fn supported_entry_points(&self) -> RpcResult<Vec<EntryPointAddress>>;

    #[method(name = "chainId")]
    async fn chain_id(&self) -> RpcResult<U64>;

    /// `None` until the operation is indexed.
    #[method(name = "getUserOperationByHash")]
    async fn get_user_operation_by_hash(
        &self,
        hash: UserOperationHash,
    ) -> RpcResult<Option<UserOperationByHash>>;

    /// `None` until the operation is mined.
    #[method(name = "getUserOperationReceipt")]
    async fn get_user_operation_receipt(
        &self,
        hash: UserOperationHash,
    ) -> RpcResult<Option<UserOperationReceipt>>;
}

/// Vendor extensions. Their namespace is chosen per deployment, so they are
/// registered at runtime with [`register_vendor_methods`] instead of through
/// the `rpc` macro.
#[async_trait]
pub trait VendorApi: Send + Sync + 'static {
    async fn gas_fee_values(&self) -> RpcResult<GasFeeValues>;

    async fn user_operation_status(&self, hash: UserOperationHash) -> RpcResult<UserOpStatus>;
}

/// jsonrpsee keys its method table by `&'static str`. Each distinct name is
/// leaked once and reused by later modules.
fn vendor_method_name(method: BundlerMethod, namespace: &str) -> anyhow::Result<&'static str> {
    static NAMES: OnceLock<Mutex<HashMap<String, &'static str>>> = OnceLock::new();

    let name = method.name(Some(namespace))?.into_owned();
    let mut names = NAMES
        .get_or_init(Default::default)
        .lock()
        .map_err(|_| anyhow::anyhow!("vendor method name cache poisoned"))?;
    Ok(*names
        .entry(name)
        .or_insert_with_key(|name| Box::leak(name.clone().into_boxed_str())))
}

pub fn register_vendor_methods<T: VendorApi>(
    module: &mut RpcModule<T>,
    namespace: &str,
) -> anyhow::Result<()> {
    let gas_fee_values = vendor_method_name(BundlerMethod::GetGasFeeValues, namespace)?;
    module.register_async_method(gas_fee_values, |_params, context| async move {
        debug!("Received gas fee values request");
        context.gas_fee_values().await
    })?;

    let status = vendor_method_name(BundlerMethod::GetUserOperationStatus, namespace)?;
    module.register_async_method(status, |params, context| async move {
        let hash = params.one::<UserOperationHash>()?;
        debug!("Received status request for {}", hash);
        context.user_operation_status(hash).await
    })?;

    info!("Registered vendor methods under namespace {}", namespace);
    Ok(())
}

/// Builds an `RpcModule` serving both the standard methods and the vendor
/// extensions of one implementation.
pub fn bundler_module<T>(bundler: T, vendor_namespace: Option<&str>) -> anyhow::Result<RpcModule<()>>
where
    T: BundlerApiServer + VendorApi,
{
    let bundler = Arc::new(bundler);
    let mut module = RpcModule::new(());
    module.merge(ArcBundler(bundler.clone()).into_rpc())?;

    if let Some(namespace) = vendor_namespace {
        let mut vendor = RpcModule::new(ArcBundler(bundler));
        register_vendor_methods(&mut vendor, namespace)?;
        module.merge(vendor)?;
    }

    Ok(module)
}

/// Lets one shared implementation back both the macro-generated module and
/// the runtime-registered vendor module.
struct ArcBundler<T>(Arc<T>);

#[async_trait]
impl<T: BundlerApiServer> BundlerApiServer for ArcBundler<T> {
    async fn send_user_operation(
        &self,
        user_operation: UserOperation,
        entry_point: EntryPointAddress,
    ) -> RpcResult<UserOperationHash> {
        self.0.send_user_operation(user_operation, entry_point).await
    }

    async fn estimate_user_operation_gas(
        &self,
        user_operation: UserOperationPartial,
        entry_point: EntryPointAddress,
        state_override: Option<StateOverride>,
    ) -> RpcResult<UserOperationGasEstimate> {
        self.0
            .estimate_user_operation_gas(user_operation, entry_point, state_override)
            .await
    }

    async fn supported_entry_points(&self) -> RpcResult<Vec<EntryPointAddress>> {
        self.0.supported_entry_points().await
    }

    async fn chain_id(&self) -> RpcResult<U64> {
        self.0.chain_id().await
    }

    async fn get_user_operation_by_hash(
        &self,
        hash: UserOperationHash,
    ) -> RpcResult<Option<UserOperationByHash>> {
        self.0.get_user_operation_by_hash(hash).await
    }

    async fn get_user_operation_receipt(
        &self,
        hash: UserOperationHash,
    ) -> RpcResult<Option<UserOperationReceipt>> {
        self.0.get_user_operation_receipt(hash).await
    }
}

#[async_trait]
impl<T: VendorApi> VendorApi for ArcBundler<T> {
    async fn gas_fee_values(&self) -> RpcResult<GasFeeValues> {
        self.0.gas_fee_values().await
    }

    async fn user_operation_status(&self, hash: UserOperationHash) -> RpcResult<UserOpStatus> {
        self.0.user_operation_status(hash).await
    }
}

/// Serves `module` on `addr` and returns the bound address, which differs
/// from `addr` when port 0 is requested.
pub async fn start_server(
    addr: SocketAddr,
    module: RpcModule<()>,
) -> anyhow::Result<(SocketAddr, ServerHandle)> {
    let server = ServerBuilder::default().build(addr).await?;
    let local_addr = server.local_addr()?;
    let handle = server.start(module);

    info!("Bundler RPC server listening on {}", local_addr);
    Ok((local_addr, handle))
}
