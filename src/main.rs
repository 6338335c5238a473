//! Flash-loan arbitrage bot for Solana.

mod block_engine;
mod composer;
mod config;
mod discovery;
mod engine;
mod error;
mod flash_loan;
mod metrics;
mod oracle;
mod profit;
mod provider;
mod scanner;
mod types;
mod wallet;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eyre::{eyre, Result, WrapErr};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signer::Signer;
use solana_sdk::transaction::Transaction;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::block_engine::BlockEngineClient;
use crate::composer::TransactionComposer;
use crate::config::{
    oracle_feeds, parse_pairs, BotConfig, TipRegion, DEFAULT_AGGREGATOR_URL,
    DEFAULT_LITE_QUOTE_URL, METRICS_SUMMARY_INTERVAL_SECS, TRIANGULAR_MIN_CU_LIMIT,
};
use crate::discovery::{BackrunListener, PoolDiscoveryListener};
use crate::engine::Engine;
use crate::error::BotError;
use crate::flash_loan::{FlashLoanProgram, FlashPoolState};
use crate::metrics::BotMetrics;
use crate::oracle::OracleReader;
use crate::profit::GasParams;
use crate::provider::ProviderGateway;
use crate::scanner::{route_catalog, TriangularScanner, TwoLegScanner};

#[derive(Parser, Debug)]
#[command(name = "flash-arb-bot")]
#[command(about = "Flash-loan arbitrage bot: two-leg and triangular cycles via an aggregator")]
struct Args {
    /// RPC endpoint
    #[arg(long, env = "RPC_URL", default_value = "https://api.mainnet-beta.solana.com")]
    rpc: String,

    /// Websocket endpoint for log subscriptions
    #[arg(long, env = "WS_URL", default_value = "wss://api.mainnet-beta.solana.com")]
    ws: String,

    /// Path to the signer keypair file
    #[arg(long, env = "WALLET_PATH", default_value = "wallet.json")]
    wallet: String,

    /// Comma-separated TARGET/QUOTE pairs; quote side is the flash-loan token
    #[arg(
        long,
        env = "PAIRS",
        default_value = "SOL/USDC,JUP/USDC,JTO/USDC,BONK/USDC,WIF/USDC,RAY/USDC,ORCA/USDC,PYTH/USDC,MSOL/USDC,JITOSOL/USDC,BSOL/USDC,WEN/USDC,POPCAT/USDC"
    )]
    pairs: String,

    /// Borrow size in flash-token raw units
    #[arg(long, env = "BORROW_AMOUNT", default_value = "500000000")]
    borrow_amount: u64,

    /// Admissibility threshold in basis points
    #[arg(long, env = "MIN_PROFIT_BPS", default_value = "5")]
    min_profit_bps: i32,

    /// Slippage tolerance in basis points
    #[arg(long, env = "SLIPPAGE_BPS", default_value = "50")]
    slippage: u16,

    /// Main loop period in milliseconds
    #[arg(long, env = "POLL_INTERVAL_MS", default_value = "2000")]
    poll_interval: u64,

    /// Priority fee in micro-lamports per compute unit
    #[arg(long, env = "PRIORITY_FEE_MICRO_LAMPORTS", default_value = "25000")]
    priority_fee: u64,

    /// Compute unit limit for two-leg transactions
    #[arg(long, env = "COMPUTE_UNIT_LIMIT", default_value = "400000")]
    compute_unit_limit: u32,

    /// Flash-loan program id
    #[arg(long, env = "FLASH_LOAN_PROGRAM_ID")]
    program_id: String,

    /// Flash-loan token mint (the borrow/quote token)
    #[arg(
        long,
        env = "FLASH_TOKEN_MINT",
        default_value = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"
    )]
    token_mint: String,

    /// Scan and log opportunities without executing
    #[arg(long, env = "DRY_RUN")]
    dry_run: bool,

    /// Submit through the block engine with a tip transfer
    #[arg(long, env = "USE_TIP")]
    tip: bool,

    /// Block-engine region
    #[arg(long, env = "TIP_REGION", value_enum, default_value_t = TipRegion::Default)]
    tip_region: TipRegion,

    /// Tip size in lamports
    #[arg(long, env = "TIP_LAMPORTS", default_value = "100000")]
    tip_lamports: u64,

    /// Debug-level logging
    #[arg(long, env = "VERBOSE")]
    verbose: bool,

    /// Primary aggregator base URL
    #[arg(long, env = "AGGREGATOR_URL", default_value = DEFAULT_AGGREGATOR_URL)]
    aggregator_url: String,

    /// Lite quote source base URL
    #[arg(long, env = "LITE_QUOTE_URL", default_value = DEFAULT_LITE_QUOTE_URL)]
    lite_quote_url: String,

    /// API key forwarded to the aggregator
    #[arg(long, env = "AGGREGATOR_API_KEY")]
    api_key: Option<String>,

    /// Kill-switch threshold: consecutive failing cycles before halting
    #[arg(long, env = "MAX_CONSECUTIVE_FAILURES", default_value = "10")]
    max_consecutive_failures: u32,

    /// Admin: update the pool fee to this value and exit
    #[arg(long, env = "SET_POOL_FEE_BPS")]
    set_pool_fee_bps: Option<u16>,
}

fn init_tracing(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match std::env::var("LOG_FILE") {
        Ok(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .wrap_err_with(|| format!("cannot open LOG_FILE {path}"))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Arc::new(file))
                .with_ansi(false)
                .init();
        }
        Err(_) => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
    Ok(())
}

fn build_config(args: &Args) -> Result<BotConfig> {
    let pairs = parse_pairs(&args.pairs).map_err(|e| eyre!("{e}"))?;
    let flash_loan_program: Pubkey = args
        .program_id
        .parse()
        .wrap_err("invalid --program-id")?;
    let flash_token_mint: Pubkey = args.token_mint.parse().wrap_err("invalid --token-mint")?;

    Ok(BotConfig {
        rpc_url: args.rpc.clone(),
        ws_url: args.ws.clone(),
        wallet_path: args.wallet.clone(),
        pairs,
        borrow_amount: args.borrow_amount,
        min_profit_bps: args.min_profit_bps,
        slippage_bps: args.slippage,
        poll_interval_ms: args.poll_interval,
        priority_fee_micro: args.priority_fee,
        compute_unit_limit: args.compute_unit_limit,
        flash_loan_program,
        flash_token_mint,
        dry_run: args.dry_run,
        use_tip: args.tip,
        tip_region: args.tip_region,
        tip_lamports: args.tip_lamports,
        aggregator_url: args.aggregator_url.clone(),
        lite_quote_url: args.lite_quote_url.clone(),
        aggregator_api_key: args.api_key.clone(),
        max_consecutive_failures: args.max_consecutive_failures,
    })
}

/// One-shot admin path: update the pool fee and exit.
async fn run_fee_update(
    rpc: &RpcClient,
    keypair: &Arc<solana_sdk::signature::Keypair>,
    config: &BotConfig,
    fee_bps: u16,
) -> Result<()> {
    let pool =
        FlashLoanProgram::pool_address(&config.flash_loan_program, &config.flash_token_mint);
    let account = rpc
        .get_account(&pool)
        .await
        .wrap_err("flash-loan pool unavailable")?;
    let state = FlashPoolState::decode(&account.data).map_err(|e| eyre!("{e}"))?;
    if state.admin != keypair.pubkey() {
        return Err(eyre!("{}", BotError::Unauthorized));
    }

    let flash_loan = FlashLoanProgram::new(
        config.flash_loan_program,
        pool,
        state.vault,
        config.flash_token_mint,
    );
    let instruction = flash_loan.set_fee(keypair.pubkey(), fee_bps);
    let blockhash = rpc.get_latest_blockhash().await?;
    let tx = Transaction::new_signed_with_payer(
        &[instruction],
        Some(&keypair.pubkey()),
        &[keypair.as_ref()],
        blockhash,
    );
    let signature = rpc.send_and_confirm_transaction(&tx).await?;
    info!(%signature, old_fee_bps = state.fee_basis_points, new_fee_bps = fee_bps, "pool fee updated");
    Ok(())
}

fn spawn_signal_handler(stop: Arc<AtomicBool>) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        info!("shutdown requested; finishing in-flight cycle");
        stop.store(true, Ordering::Relaxed);
    });
}

fn spawn_metrics_summary(
    metrics: Arc<BotMetrics>,
    two_leg: Arc<TwoLegScanner>,
    stop: Arc<AtomicBool>,
) {
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(METRICS_SUMMARY_INTERVAL_SECS));
        ticker.tick().await;
        while !stop.load(Ordering::Relaxed) {
            ticker.tick().await;
            metrics.log_summary();
            let spreads = two_leg.spread_summary();
            if !spreads.is_empty() {
                info!(target: "metrics", "best spreads: {spreads}");
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.verbose)?;

    let config = build_config(&args)?;
    info!(
        pairs = config.pairs.len(),
        borrow = config.borrow_amount,
        min_profit_bps = config.min_profit_bps,
        dry_run = config.dry_run,
        tip = config.use_tip,
        "flash-arb-bot starting"
    );

    let rpc = Arc::new(RpcClient::new_with_commitment(
        config.rpc_url.clone(),
        CommitmentConfig::confirmed(),
    ));
    let keypair = Arc::new(wallet::load_keypair(&config.wallet_path).map_err(|e| eyre!("{e}"))?);
    info!(signer = %keypair.pubkey(), "wallet loaded");

    // Admin one-shot path runs and exits before anything else spins up.
    if let Some(fee_bps) = args.set_pool_fee_bps {
        return run_fee_update(&rpc, &keypair, &config, fee_bps).await;
    }

    let preflight = Engine::preflight(&config, &rpc, &keypair)
        .await
        .map_err(|e| eyre!("{e}"))?;
    let ata_balance = wallet::token_balance(&rpc, &preflight.borrow_ata).await;
    info!(
        borrow_ata = %preflight.borrow_ata,
        balance = ata_balance,
        flash_fee_bps = preflight.flash_fee_bps,
        "preflight complete"
    );

    let stop = Arc::new(AtomicBool::new(false));
    let metrics = BotMetrics::new();
    let gateway = Arc::new(ProviderGateway::new(&config, rpc.clone()));
    let oracle = OracleReader::new(rpc.clone(), oracle_feeds());

    let gas = GasParams {
        priority_fee_micro: config.priority_fee_micro,
        compute_unit_limit: config.compute_unit_limit,
        tip_lamports: config.tip_lamports,
        use_tip: config.use_tip,
    };
    let triangular_gas = GasParams {
        compute_unit_limit: config.compute_unit_limit.max(TRIANGULAR_MIN_CU_LIMIT),
        ..gas
    };

    let two_leg = Arc::new(TwoLegScanner::new(
        gateway.clone(),
        config.min_profit_bps,
        config.slippage_bps,
        preflight.flash_fee_bps,
        gas,
    ));
    let triangular = TriangularScanner::new(
        gateway.clone(),
        route_catalog(),
        config.min_profit_bps,
        config.slippage_bps,
        preflight.flash_fee_bps,
        triangular_gas,
    );
    let composer = TransactionComposer::new(
        gateway.clone(),
        rpc.clone(),
        keypair.clone(),
        preflight.flash_loan,
        config.priority_fee_micro,
        config.compute_unit_limit,
    );
    let block_engine = BlockEngineClient::new(config.tip_region);

    let (event_tx, event_rx) = mpsc::channel(256);
    let pool_listener = PoolDiscoveryListener::new(
        config.ws_url.clone(),
        rpc.clone(),
        gateway.clone(),
        event_tx.clone(),
        stop.clone(),
        metrics.clone(),
    );
    let backrun_listener = BackrunListener::new(
        config.ws_url.clone(),
        rpc.clone(),
        event_tx,
        stop.clone(),
        metrics.clone(),
    );
    let mut listener_handles = pool_listener.spawn();
    listener_handles.extend(backrun_listener.spawn());

    spawn_signal_handler(stop.clone());
    spawn_metrics_summary(metrics.clone(), two_leg.clone(), stop.clone());

    let mut engine = Engine::new(
        config,
        rpc,
        keypair,
        metrics.clone(),
        oracle,
        two_leg,
        triangular,
        composer,
        block_engine,
        stop.clone(),
        event_rx,
        &preflight,
    );

    let outcome = engine.run().await;
    stop.store(true, Ordering::Relaxed);
    for handle in listener_handles {
        handle.abort();
    }
    metrics.log_summary();

    match outcome {
        Ok(()) => Ok(()),
        Err(e) => {
            warn!(error = %e, "engine halted with error");
            Err(eyre!("{e}"))
        }
    }
}
