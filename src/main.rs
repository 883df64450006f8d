mod burn;
mod chain;
mod distributor;
mod fees;
mod progress;
mod recipients;
mod retry;

use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use ethers::types::{Address, U256};
use ethers::utils::{format_units, keccak256, parse_units};

use crate::chain::{ChainEndpoint, RpcEndpoint};
use crate::distributor::{DistributeConfig, Distributor};
use crate::fees::FeePolicy;
use crate::progress::ProgressStore;

#[derive(Parser)]
#[clap(author, version, about = "Batched ERC-20 distribution over JSON-RPC", long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Distribute tokens to every address in the input list
    Distribute(DistributeArgs),
    /// Burn 1% of the token's total supply from the operator wallet
    Burn(BurnArgs),
    /// Generate a synthetic recipient CSV for rehearsal runs
    GenerateRecipients(GenerateArgs),
}

#[derive(Parser)]
struct DistributeArgs {
    /// Input CSV with candidate recipient addresses
    #[clap(long)]
    input_csv: PathBuf,

    /// ERC-20 token contract address
    #[clap(long, env = "TOKEN_ADDRESS")]
    token: String,

    /// Airdrop contract exposing airdropTokens(address[])
    #[clap(long, env = "AIRDROP_CONTRACT_ADDRESS")]
    airdrop_contract: String,

    /// JSON-RPC endpoint URL
    #[clap(long, env = "RPC_URL", default_value = "https://mainnet.optimism.io")]
    rpc_url: String,

    /// Operator private key; supply via the environment, not the command line
    #[clap(long, env = "PRIVATE_KEY", hide_env_values = true)]
    private_key: String,

    /// File tracking already-settled recipients
    #[clap(long, default_value = "holders.json")]
    progress_file: PathBuf,

    /// Whole tokens sent to each recipient
    #[clap(long, default_value = "1000000000")]
    amount: String,

    /// Recipients per airdrop call
    #[clap(long, default_value = "300")]
    batch_size: usize,

    /// Submission attempts per batch before giving up
    #[clap(long, default_value = "3")]
    max_attempts: u32,

    /// Seconds to wait for a confirmation before the fallback status check
    #[clap(long, default_value = "60")]
    confirm_timeout: u64,

    /// Milliseconds to pause between batches
    #[clap(long, default_value = "1000")]
    batch_delay_ms: u64,

    /// Backoff step in milliseconds, scaled by the attempt count
    #[clap(long, default_value = "2000")]
    backoff_ms: u64,

    /// Buffered recipients before an automatic checkpoint write
    #[clap(long, default_value = "1000")]
    flush_every: usize,

    /// Base fee price in wei per gas
    #[clap(long, default_value = "627")]
    base_fee_wei: u64,

    /// Extra wei per gas added on each retry
    #[clap(long, default_value = "1")]
    fee_bump_wei: u64,

    /// Gas limit ceiling per airdrop call
    #[clap(long, default_value = "8500000")]
    gas_limit: u64,

    /// Submission rate limit (requests per second)
    #[clap(long, default_value = "10")]
    rate_limit: u32,

    /// Print the plan without submitting anything
    #[clap(long)]
    dry_run: bool,

    /// Skip the confirmation prompt
    #[clap(long)]
    yes: bool,
}

#[derive(Parser)]
struct BurnArgs {
    /// ERC-20 token contract address
    #[clap(long, env = "TOKEN_ADDRESS")]
    token: String,

    /// JSON-RPC endpoint URL
    #[clap(long, env = "RPC_URL", default_value = "https://mainnet.optimism.io")]
    rpc_url: String,

    /// Operator private key; supply via the environment, not the command line
    #[clap(long, env = "PRIVATE_KEY", hide_env_values = true)]
    private_key: String,

    /// Seconds to wait for a confirmation before the fallback status check
    #[clap(long, default_value = "60")]
    confirm_timeout: u64,

    /// Submission rate limit (requests per second)
    #[clap(long, default_value = "10")]
    rate_limit: u32,
}

#[derive(Parser)]
struct GenerateArgs {
    /// Number of recipients
    #[clap(long)]
    count: usize,

    /// Output CSV file
    #[clap(long)]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Distribute(args) => distribute(args).await,
        Commands::Burn(args) => burn_tokens(args).await,
        Commands::GenerateRecipients(args) => generate_recipients(args),
    }
}

async fn distribute(args: DistributeArgs) -> Result<()> {
    println!("\n🚀 Starting token distribution...");

    let token: Address = args.token.parse().context("invalid --token address")?;
    let airdrop: Address = args
        .airdrop_contract
        .parse()
        .context("invalid --airdrop-contract address")?;
    let rate_limit = NonZeroU32::new(args.rate_limit).context("--rate-limit must be non-zero")?;

    let candidates = recipients::extract_addresses(&args.input_csv)?;
    println!(
        "Found {} valid addresses in {}",
        candidates.len(),
        args.input_csv.display()
    );

    let mut progress = ProgressStore::load(&args.progress_file, args.flush_every)?;
    if progress.done_count() > 0 {
        println!(
            "📊 {} recipients already settled per {}",
            progress.done_count(),
            args.progress_file.display()
        );
    }

    let endpoint =
        RpcEndpoint::connect(&args.rpc_url, &args.private_key, token, airdrop, rate_limit).await?;
    let decimals = u32::from(endpoint.token_decimals().await?);
    let amount: U256 = parse_units(&args.amount, decimals)
        .map_err(|e| anyhow!("invalid --amount: {e}"))?
        .into();

    let contract_balance = endpoint
        .token_balance(endpoint.distribution_contract())
        .await?;
    println!(
        "Contract balance: {} tokens",
        format_units(contract_balance, decimals)?
    );

    let fee_policy = FeePolicy::new(args.base_fee_wei, args.fee_bump_wei, args.gas_limit);
    let eligible = candidates
        .iter()
        .filter(|addr| !progress.contains(addr))
        .count();

    if args.dry_run {
        return dry_run_summary(eligible, amount, args.batch_size, decimals, &fee_policy);
    }

    if eligible > 0 && !args.yes {
        println!("\nReady to distribute to {eligible} recipients? [y/N] ");
        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let config = DistributeConfig {
        amount_per_recipient: amount,
        batch_size: args.batch_size,
        max_attempts: args.max_attempts,
        confirm_wait: Duration::from_secs(args.confirm_timeout),
        batch_pause: Duration::from_millis(args.batch_delay_ms),
        backoff_step: Duration::from_millis(args.backoff_ms),
        decimals,
    };
    let distributor = Distributor::new(endpoint, fee_policy, config);
    let report = distributor.run(&candidates, &mut progress).await?;

    println!("\n✅ Distribution complete!");
    println!(
        "This run: {} recipients across {} batches",
        report.paid, report.batches
    );
    println!("Total settled: {}", progress.done_count());
    Ok(())
}

fn dry_run_summary(
    eligible: usize,
    amount: U256,
    batch_size: usize,
    decimals: u32,
    fees: &FeePolicy,
) -> Result<()> {
    println!("\n=== DRY RUN SUMMARY ===");
    println!("Eligible recipients: {eligible}");
    let batches = eligible.div_ceil(batch_size.max(1));
    println!("Batches of up to {batch_size}: {batches}");
    println!(
        "Tokens required: {}",
        format_units(U256::from(eligible) * amount, decimals)?
    );
    let quote = fees.quote(0);
    let ceiling = quote.gas_limit * quote.max_fee_per_gas * U256::from(batches);
    println!(
        "Fee ceiling: {} wei/gas × {} gas × {batches} calls ≤ {} ETH",
        quote.max_fee_per_gas,
        quote.gas_limit,
        format_units(ceiling, 18)?
    );
    Ok(())
}

async fn burn_tokens(args: BurnArgs) -> Result<()> {
    let token: Address = args.token.parse().context("invalid --token address")?;
    let rate_limit = NonZeroU32::new(args.rate_limit).context("--rate-limit must be non-zero")?;

    // The burn never touches the airdrop contract.
    let endpoint = RpcEndpoint::connect(
        &args.rpc_url,
        &args.private_key,
        token,
        Address::zero(),
        rate_limit,
    )
    .await?;
    let decimals = u32::from(endpoint.token_decimals().await?);
    burn::run(&endpoint, Duration::from_secs(args.confirm_timeout), decimals).await
}

fn generate_recipients(args: GenerateArgs) -> Result<()> {
    println!("Generating {} recipients...", args.count);

    let mut writer = csv::Writer::from_path(&args.output)?;
    writer.write_record(["HolderAddress"])?;

    // Seed with the clock so repeated runs produce fresh address sets.
    let stamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    for i in 0..args.count {
        let digest = keccak256(format!("recipient_{stamp}_{i}").as_bytes());
        let addr = Address::from_slice(&digest[12..]);
        writer.write_record([format!("{addr:#x}")])?;
    }
    writer.flush()?;

    println!(
        "Generated {} recipients in {}",
        args.count,
        args.output.display()
    );
    Ok(())
}
