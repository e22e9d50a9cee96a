// src/main.rs
use std::time::Duration;

use aa_bundler_client::{
    BundlerClient, BundlerClientConfig, BundlerRequest, EntryPointAddress, UserOperationHash,
};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Query an ERC-4337 bundler", long_about = None)]
struct Args {
    #[clap(short, long, default_value = "http://127.0.0.1:4337")]
    rpc_url: String,

    /// Namespace of the bundler's vendor extensions, e.g. `biconomy`
    #[clap(short, long)]
    vendor_namespace: Option<String>,

    #[clap(long, default_value_t = 30)]
    request_timeout_secs: u64,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// eth_chainId
    ChainId,
    /// eth_supportedEntryPoints
    EntryPoints,
    /// Fails unless the bundler serves the given entry point
    CheckEntryPoint { entry_point: EntryPointAddress },
    /// eth_getUserOperationByHash
    Operation { hash: UserOperationHash },
    /// eth_getUserOperationReceipt
    Receipt { hash: UserOperationHash },
    /// Polls eth_getUserOperationReceipt until the operation is mined
    Wait {
        hash: UserOperationHash,
        #[clap(long, default_value_t = 120)]
        timeout_secs: u64,
        #[clap(long, default_value_t = 2000)]
        interval_ms: u64,
    },
    /// Vendor gas-fee oracle
    GasFees,
    /// Vendor operation status
    Status { hash: UserOperationHash },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let mut config = BundlerClientConfig::new(args.rpc_url)
        .with_request_timeout(Duration::from_secs(args.request_timeout_secs));
    if let Some(namespace) = args.vendor_namespace {
        config = config.with_vendor_namespace(namespace);
    }

    let request = match args.command {
        Command::ChainId => BundlerRequest::ChainId,
        Command::EntryPoints => BundlerRequest::SupportedEntryPoints,
        Command::Operation { hash } => BundlerRequest::GetUserOperationByHash(hash),
        Command::Receipt { hash } => BundlerRequest::GetUserOperationReceipt(hash),
        Command::GasFees => BundlerRequest::GetGasFeeValues,
        Command::Status { hash } => BundlerRequest::GetUserOperationStatus(hash),
        Command::CheckEntryPoint { entry_point } => {
            let client = BundlerClient::new(config)?;
            client.ensure_entry_point_supported(entry_point).await?;
            info!("Entry point {} is supported", entry_point);
            return Ok(());
        }
        Command::Wait {
            hash,
            timeout_secs,
            interval_ms,
        } => {
            config = config.with_receipt_polling(
                Duration::from_millis(interval_ms),
                Duration::from_secs(timeout_secs),
            );
            let client = BundlerClient::new(config)?;
            let receipt = client.wait_for_user_operation_receipt(hash).await?;
            println!("{}", serde_json::to_string_pretty(&receipt)?);
            return Ok(());
        }
    };

    let client = BundlerClient::new(config)?;
    let method = request.method();
    let response = client.dispatch(request).await?;
    info!("{} succeeded", method);
    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(())
}
