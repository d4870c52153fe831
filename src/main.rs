//! Tesseract Submitter - command-line front end
//!
//! Loads settings, connects to the configured RPC endpoints, submits one
//! transaction (or performs one read) and reports the outcome. Ctrl-C stops a
//! confirmation wait without touching the broadcast transaction.

use anyhow::{bail, Context, Result};
use clap::Parser;
use ethers::types::{Address, U256};
use serde::Serialize;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};

mod cli;

use cli::{Cli, Commands};
use tesseract_submitter::chain::{
    CancelSignal, ChainProvider, ConfirmationProgress, ConfirmationResult, LedgerClient,
};
use tesseract_submitter::config::{Settings, WalletConfig};
use tesseract_submitter::contract::{decode_bytecode, Counter, CounterMethod};
use tesseract_submitter::metrics;
use tesseract_submitter::tx::{
    parse_address, parse_amount, SigningIdentity, Submission, TransactionSubmitter,
};

/// Terminal report for a submitted transaction
#[derive(Debug, Serialize)]
struct Outcome<'a> {
    submission: &'a Submission,
    result: &'static str,
    block_number: Option<u64>,
    resource_used: Option<U256>,
    contract_address: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    initial_count: Option<U256>,
    events: Vec<serde_json::Value>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging();

    info!("Starting Tesseract Submitter v{}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    let provider = ChainProvider::connect(&settings.network)
        .await
        .context("failed to connect to the network")?;
    let client: Arc<dyn LedgerClient> = Arc::new(provider);

    let outcome = run(cli.command, cli.json, &settings, client).await;

    if settings.metrics.enabled {
        eprintln!("{}", metrics::render());
    }

    outcome
}

async fn run(
    command: Commands,
    json: bool,
    settings: &Settings,
    client: Arc<dyn LedgerClient>,
) -> Result<()> {
    match command {
        Commands::Count { contract } => {
            let counter = Counter::new(parse_address(&contract)?, client);
            let count = counter.count().await?;
            print_value(json, "count", &count.to_string())
        }

        Commands::Balance { address } => {
            let address = match address {
                Some(address) => parse_address(&address)?,
                None => load_identity(&settings.wallet)?.address(),
            };
            let balance = client.balance(address).await?;
            print_value(json, "balance", &ethers::utils::format_ether(balance))
        }

        Commands::Transfer { to, amount } => {
            let value = parse_amount(&amount)?;
            if value.is_zero() {
                bail!("transfer amount must be greater than zero");
            }
            let identity = load_identity(&settings.wallet)?;
            let submitter = submitter(client, settings).await?;

            let submission = submitter.send_transfer(&identity, &to, value).await?;
            let result = confirm(&submitter, &submission).await;
            report(json, &submission, result, None, |_| Ok(Vec::new()))
        }

        Commands::Invoke {
            contract,
            method,
            value,
        } => {
            let method = CounterMethod::parse(&method, value.as_deref())?;
            let identity = load_identity(&settings.wallet)?;
            let submitter = submitter(client, settings).await?;

            info!("Calling {} on {}", method.name(), contract);
            let submission = submitter
                .invoke(&identity, &contract, method.encode(), U256::zero())
                .await?;
            let result = confirm(&submitter, &submission).await;
            report(json, &submission, result, None, |receipt| {
                Counter::receipt_events(receipt)?
                    .into_iter()
                    .map(|event| serde_json::to_value(&event.event).map_err(Into::into))
                    .collect()
            })
        }

        Commands::Deploy { bytecode } => {
            let code = match &bytecode {
                Some(path) => {
                    let text = tokio::fs::read_to_string(path)
                        .await
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    decode_bytecode(&text)?
                }
                None => Counter::creation_bytecode()?,
            };

            let identity = load_identity(&settings.wallet)?;
            let submitter = submitter(client.clone(), settings).await?;

            let submission = submitter.deploy(&identity, code, U256::zero()).await?;
            let result = confirm(&submitter, &submission).await;

            // A freshly deployed Counter is read back to show it answers
            let deployed = result
                .receipt()
                .filter(|r| r.succeeded())
                .and_then(|r| r.contract_address);
            let initial_count = match (bytecode.is_none(), deployed) {
                (true, Some(address)) => Some(Counter::new(address, client).count().await?),
                _ => None,
            };

            report(json, &submission, result, initial_count, |_| Ok(Vec::new()))
        }
    }
}

async fn submitter(
    client: Arc<dyn LedgerClient>,
    settings: &Settings,
) -> Result<TransactionSubmitter> {
    let (progress_tx, mut progress_rx) = mpsc::channel::<ConfirmationProgress>(16);

    tokio::spawn(async move {
        while let Some(progress) = progress_rx.recv().await {
            info!(
                "Waiting for {:?}: {}s elapsed, {} polls",
                progress.tx_hash,
                progress.elapsed.as_secs(),
                progress.polls
            );
        }
    });

    Ok(TransactionSubmitter::connect(client, settings)
        .await?
        .with_progress(progress_tx))
}

/// Read the signing key from the environment variable named in the config
fn load_identity(wallet: &WalletConfig) -> Result<SigningIdentity> {
    let key = std::env::var(&wallet.private_key_env)
        .with_context(|| format!("{} is not set", wallet.private_key_env))?;
    Ok(SigningIdentity::from_hex(&key)?)
}

/// Wait for `submission`, cancelling on Ctrl-C
async fn confirm(submitter: &TransactionSubmitter, submission: &Submission) -> ConfirmationResult {
    info!(
        "Submitted {:?} with nonce {}, waiting for confirmation",
        submission.tx_hash, submission.nonce
    );

    let (handle, cancel) = CancelSignal::pair();
    let interrupt = tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupted, no longer waiting (the transaction stays broadcast)");
                handle.cancel();
            }
            Err(e) => warn!("Failed to install Ctrl-C handler: {}", e),
        }
    });

    let result = submitter.await_confirmation(submission, cancel).await;
    interrupt.abort();
    result
}

fn report<F>(
    json: bool,
    submission: &Submission,
    result: ConfirmationResult,
    initial_count: Option<U256>,
    events: F,
) -> Result<()>
where
    F: FnOnce(&tesseract_submitter::TransactionReceipt) -> Result<Vec<serde_json::Value>>,
{
    let receipt = result.receipt();
    let outcome = Outcome {
        submission,
        result: result.label(),
        block_number: receipt.map(|r| r.included_in_block),
        resource_used: receipt.and_then(|r| r.resource_used),
        contract_address: receipt.and_then(|r| r.contract_address),
        initial_count,
        events: match receipt {
            Some(r) if r.succeeded() => events(r)?,
            _ => Vec::new(),
        },
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }

    result.into_result(submission.tx_hash)?;
    Ok(())
}

fn print_outcome(outcome: &Outcome<'_>) {
    println!("transaction: {:?}", outcome.submission.tx_hash);
    println!("nonce:       {}", outcome.submission.nonce);
    println!("result:      {}", outcome.result);
    if let Some(block) = outcome.block_number {
        println!("block:       {}", block);
    }
    if let Some(used) = outcome.resource_used {
        println!("gas used:    {}", used);
    }
    if let Some(address) = outcome.contract_address {
        println!("contract:    {:?}", address);
    }
    if let Some(count) = outcome.initial_count {
        println!("count:       {}", count);
    }
    for event in &outcome.events {
        println!("event:       {}", event);
    }
}

fn print_value(json: bool, name: &str, value: &str) -> Result<()> {
    if json {
        let mut object = serde_json::Map::new();
        object.insert(name.to_string(), serde_json::Value::from(value));
        println!("{}", serde_json::Value::Object(object));
    } else {
        println!("{}: {}", name, value);
    }
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tesseract_submitter=debug,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_writer(std::io::stderr),
        )
        .init();
}
