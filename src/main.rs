mod api;
mod config;
mod page;
mod serve;
mod session;
mod waiter;

use clap::{Parser, Subcommand};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::waiter::SignatureWaiter;

/// A Rust CLI tool that captures a browser wallet signature through a
/// short-lived local server and exchanges it against the remote minting API.
#[derive(Parser, Debug)]
#[command(name = "mintgate", version, about)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "mintgate.toml")]
    config: PathBuf,

    /// Override the signature wait ceiling in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a capture session and wait for a wallet signature
    Sign,
    /// Capture a signature, then mint a license token with it
    MintLicense {
        #[arg(long)]
        ip_asset: String,
        #[arg(long)]
        receiver: String,
    },
    /// Mint an IP asset job record (no signature required)
    MintIpJob {
        #[arg(long)]
        receiver: String,
        #[arg(long)]
        job_id: String,
        #[arg(long)]
        biosample_serial: i64,
        #[arg(long)]
        opencravat_version: String,
        #[arg(long)]
        num_unique_var: String,
        #[arg(long)]
        owner: String,
        #[arg(long)]
        submission_time: String,
        #[arg(long)]
        assembly: String,
        #[arg(long, default_value = "")]
        ip_asset: String,
    },
    /// Capture a signature and fetch ancestry results
    Ancestry,
    /// Capture a signature and mint the ancestry results as an IP asset
    MintAncestry,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .init();

    if let Err(e) = run(cli).await {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load(&cli.config)?;
    let interval = config.poll.interval();
    let max_attempts = match cli.timeout_secs {
        Some(secs) => config.poll.attempts_for_ceiling(secs),
        None => config.poll.max_attempts,
    };

    let session = Arc::new(session::SignatureSession::new());
    let waiter = SignatureWaiter::new(session.clone(), config.server.clone());
    let client = api::MintClient::new(
        &config.api.base_url,
        Duration::from_secs(config.api.timeout_secs),
    )?;

    match cli.command {
        Command::Sign => {
            cancellable(&waiter, waiter.acquire(interval, max_attempts)).await?;
            println!("{}", waiter.check_status());
        }
        Command::MintLicense { ip_asset, receiver } => {
            let result = cancellable(
                &waiter,
                api::mint_license_token_flow(
                    &client,
                    &waiter,
                    interval,
                    max_attempts,
                    &ip_asset,
                    &receiver,
                ),
            )
            .await?;
            println!("License token minted:");
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::MintIpJob {
            receiver,
            job_id,
            biosample_serial,
            opencravat_version,
            num_unique_var,
            owner,
            submission_time,
            assembly,
            ip_asset,
        } => {
            let job = api::IpJobRequest {
                receiver,
                job_id,
                biosample_serial,
                opencravat_version,
                num_unique_var,
                owner,
                submission_time,
                assembly,
                ip_asset,
            };
            let result = client.mint_ip_job(&job).await?;
            println!("IP job minted:");
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Ancestry => {
            cancellable(&waiter, waiter.acquire(interval, max_attempts)).await?;
            let result = client.ancestry_results(&session).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::MintAncestry => {
            cancellable(&waiter, waiter.acquire(interval, max_attempts)).await?;
            let result = client.mint_ancestry_ip_asset(&session).await?;
            println!("Ancestry IP asset minted:");
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}

/// Race a capture-bearing operation against Ctrl-C; on interrupt the capture
/// server is stopped before we bail, so no listener outlives the process's
/// intent to wait.
async fn cancellable<T, E>(
    waiter: &SignatureWaiter,
    operation: impl Future<Output = Result<T, E>>,
) -> Result<T, Box<dyn std::error::Error>>
where
    E: std::error::Error + 'static,
{
    tokio::select! {
        result = operation => result.map_err(|e| Box::new(e) as Box<dyn std::error::Error>),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, stopping capture server");
            waiter.force_stop().await;
            Err("interrupted by user".into())
        }
    }
}
