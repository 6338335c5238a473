//! Engine: preflight, the main scan loop, and the execution pipeline.
//!
//! The loop is strictly sequential across phases: discovery events, static
//! pairs (hot set plus a rotating cold batch), dynamic pairs, then one
//! triangular batch. Opportunities execute one at a time; the signer's
//! flash-loan receipt permits only one outstanding borrow, so a second
//! submission never starts before the prior confirmation resolves.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcSendTransactionConfig, RpcSimulateTransactionConfig};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::signer::Signer;
use solana_sdk::system_instruction;
use solana_sdk::transaction::VersionedTransaction;
use solana_transaction_status::TransactionConfirmationStatus;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::block_engine::BlockEngineClient;
use crate::composer::{ComposedTransaction, TransactionComposer};
use crate::config::{
    known_quote_mints, resolve_token, BotConfig, COLD_BATCH_SIZE, DYNAMIC_PAIR_MAX_FAILURES,
    DYNAMIC_SCAN_SIZE, GAS_FLOOR_LAMPORTS, HOT_TARGETS, SLOT_TIME_MS, SNIPE_PROBE_SIZES,
    BACKRUN_PROBE_SIZES, USDC_MINT,
};
use crate::discovery::{BackrunSignal, DiscoveryEvent, NewPoolEvent};
use crate::error::{BotError, Result};
use crate::flash_loan::{FlashLoanProgram, FlashPoolState};
use crate::metrics::BotMetrics;
use crate::oracle::OracleReader;
use crate::profit::{gas_lamports, GasParams};
use crate::scanner::{TriangularScanner, TwoLegScanner};
use crate::types::{ArbitrageOpportunity, Pair, TokenInfo, TriangularOpportunity};
use crate::wallet;

/// Consecutive-failure tracker behind the loop's emergency stop.
pub struct KillSwitch {
    consecutive: u32,
    max: u32,
}

impl KillSwitch {
    pub fn new(max: u32) -> Self {
        Self {
            consecutive: 0,
            max,
        }
    }

    /// Record a failing cycle. Returns `true` when the threshold is hit and
    /// the loop must halt.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive += 1;
        self.consecutive >= self.max
    }

    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    pub fn count(&self) -> u32 {
        self.consecutive
    }
}

struct DynamicPair {
    pair: Pair,
    consecutive_unroutable: u32,
}

/// Everything preflight establishes before the loop starts.
pub struct PreflightReport {
    pub flash_loan: FlashLoanProgram,
    pub flash_fee_bps: u16,
    pub borrow_ata: Pubkey,
    /// Target mints whose ATA could not be created; their pairs are skipped.
    pub skipped_targets: HashSet<Pubkey>,
}

pub struct Engine {
    config: BotConfig,
    rpc: Arc<RpcClient>,
    keypair: Arc<Keypair>,
    metrics: Arc<BotMetrics>,
    oracle: OracleReader,
    two_leg: Arc<TwoLegScanner>,
    triangular: TriangularScanner,
    composer: TransactionComposer,
    block_engine: BlockEngineClient,
    stop: Arc<AtomicBool>,
    events: mpsc::Receiver<DiscoveryEvent>,
    dynamic_pairs: DashMap<Pubkey, DynamicPair>,
    hot_pairs: Vec<Pair>,
    cold_pairs: Vec<Pair>,
    cold_offset: usize,
    borrow_ata: Pubkey,
    gas: GasParams,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: BotConfig,
        rpc: Arc<RpcClient>,
        keypair: Arc<Keypair>,
        metrics: Arc<BotMetrics>,
        oracle: OracleReader,
        two_leg: Arc<TwoLegScanner>,
        triangular: TriangularScanner,
        composer: TransactionComposer,
        block_engine: BlockEngineClient,
        stop: Arc<AtomicBool>,
        events: mpsc::Receiver<DiscoveryEvent>,
        preflight: &PreflightReport,
    ) -> Self {
        let (hot_pairs, cold_pairs) = partition_pairs(&config.pairs, &preflight.skipped_targets);
        info!(
            hot = hot_pairs.len(),
            cold = cold_pairs.len(),
            skipped = preflight.skipped_targets.len(),
            "pair partitions ready"
        );
        let gas = GasParams {
            priority_fee_micro: config.priority_fee_micro,
            compute_unit_limit: config.compute_unit_limit,
            tip_lamports: config.tip_lamports,
            use_tip: config.use_tip,
        };
        Self {
            config,
            rpc,
            keypair,
            metrics,
            oracle,
            two_leg,
            triangular,
            composer,
            block_engine,
            stop,
            events,
            dynamic_pairs: DashMap::new(),
            hot_pairs,
            cold_pairs,
            cold_offset: 0,
            borrow_ata: preflight.borrow_ata,
            gas,
        }
    }

    /// Startup checks: gas floor, pool state, token accounts.
    pub async fn preflight(
        config: &BotConfig,
        rpc: &Arc<RpcClient>,
        keypair: &Arc<Keypair>,
    ) -> Result<PreflightReport> {
        let owner = keypair.pubkey();
        let balance = wallet::lamport_balance(rpc, &owner).await.unwrap_or(0);
        info!(lamports = balance, "signer balance");
        if balance < GAS_FLOOR_LAMPORTS {
            if config.dry_run {
                warn!(
                    lamports = balance,
                    floor = GAS_FLOOR_LAMPORTS,
                    "balance below gas floor; continuing in dry-run"
                );
            } else {
                return Err(BotError::PreflightFailed(format!(
                    "signer balance {balance} lamports below gas floor {GAS_FLOOR_LAMPORTS}"
                )));
            }
        }

        let pool = FlashLoanProgram::pool_address(&config.flash_loan_program, &config.flash_token_mint);
        let (vault, fee_bps) = match rpc.get_account(&pool).await {
            Ok(account) => {
                let state = FlashPoolState::decode(&account.data)?;
                if !state.is_active {
                    if config.dry_run {
                        warn!(%pool, "flash-loan pool is paused");
                    } else {
                        return Err(BotError::PoolPaused);
                    }
                }
                if state.total_deposits < config.borrow_amount {
                    warn!(
                        error = %BotError::InsufficientLiquidity,
                        deposits = state.total_deposits,
                        borrow = config.borrow_amount,
                        "pool deposits below configured borrow"
                    );
                }
                info!(
                    %pool,
                    fee_bps = state.fee_basis_points,
                    deposits = state.total_deposits,
                    "flash-loan pool loaded"
                );
                (state.vault, state.fee_basis_points)
            }
            Err(e) if config.dry_run => {
                warn!(%pool, error = %e, "pool account unavailable; using defaults in dry-run");
                (Pubkey::default(), 9)
            }
            Err(e) => {
                return Err(BotError::PreflightFailed(format!(
                    "flash-loan pool {pool} unavailable: {e}"
                )))
            }
        };
        let flash_loan = FlashLoanProgram::new(
            config.flash_loan_program,
            pool,
            vault,
            config.flash_token_mint,
        );

        // The borrow-token ATA is load-bearing; everything else degrades to
        // a skipped pair.
        let borrow_ata = if config.dry_run {
            match wallet::ensure_ata(rpc, keypair, &config.flash_token_mint).await {
                Ok(ata) => ata,
                Err(e) => {
                    warn!(error = %e, "borrow-token ATA unavailable in dry-run");
                    wallet::ata_address(&owner, &config.flash_token_mint, &crate::config::TOKEN_PROGRAM)
                }
            }
        } else {
            wallet::ensure_ata(rpc, keypair, &config.flash_token_mint)
                .await
                .map_err(|e| {
                    BotError::PreflightFailed(format!("borrow-token ATA unavailable: {e}"))
                })?
        };

        let mut wanted: Vec<Pubkey> = config.pairs.iter().map(|p| p.target_mint()).collect();
        for route in crate::scanner::route_catalog() {
            for mint in [route.token_b, route.token_c] {
                if !wanted.contains(&mint) {
                    wanted.push(mint);
                }
            }
        }
        let mut skipped_targets = HashSet::new();
        for mint in wanted {
            if mint == config.flash_token_mint {
                continue;
            }
            if let Err(e) = wallet::ensure_ata(rpc, keypair, &mint).await {
                warn!(%mint, error = %e, "ATA unavailable, pair will be skipped");
                skipped_targets.insert(mint);
            }
        }

        Ok(PreflightReport {
            flash_loan,
            flash_fee_bps: fee_bps,
            borrow_ata,
            skipped_targets,
        })
    }

    /// The main loop. Returns when stopped or when the kill switch trips.
    pub async fn run(&mut self) -> Result<()> {
        let mut kill_switch = KillSwitch::new(self.config.max_consecutive_failures);
        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.config.poll_interval_ms));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(
            pairs = self.hot_pairs.len() + self.cold_pairs.len(),
            poll_ms = self.config.poll_interval_ms,
            dry_run = self.config.dry_run,
            "engine loop starting"
        );

        while !self.stopped() {
            ticker.tick().await;
            if self.stopped() {
                break;
            }
            let cycle_start = tokio::time::Instant::now();
            BotMetrics::incr(&self.metrics.scan_cycles);

            match self.run_cycle().await {
                Ok(()) => kill_switch.record_success(),
                Err(e) => {
                    warn!(error = %e, failures = kill_switch.count() + 1, "scan cycle failed");
                    if kill_switch.record_failure() {
                        error!(
                            failures = kill_switch.count(),
                            "kill switch tripped, halting loop"
                        );
                        return Err(e);
                    }
                }
            }
            debug!(
                elapsed_ms = cycle_start.elapsed().as_millis() as u64,
                "cycle complete"
            );
        }
        info!("engine loop stopped");
        Ok(())
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    async fn run_cycle(&mut self) -> Result<()> {
        self.drain_discovery_events().await;
        self.scan_static_pairs().await?;
        self.scan_dynamic_pairs().await;
        self.scan_triangular().await?;
        Ok(())
    }

    async fn drain_discovery_events(&mut self) {
        // Listener callbacks run here, on the orchestrator's task.
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        for event in events {
            match event {
                DiscoveryEvent::NewPool(event) => self.handle_new_pool(event).await,
                DiscoveryEvent::Backrun(signal) => self.handle_backrun(signal).await,
            }
        }
    }

    async fn scan_static_pairs(&mut self) -> Result<()> {
        let mut batch: Vec<Pair> = self.hot_pairs.clone();
        if !self.cold_pairs.is_empty() {
            for i in 0..COLD_BATCH_SIZE.min(self.cold_pairs.len()) {
                batch.push(self.cold_pairs[(self.cold_offset + i) % self.cold_pairs.len()].clone());
            }
            self.cold_offset =
                (self.cold_offset + COLD_BATCH_SIZE) % self.cold_pairs.len().max(1);
        }

        for pair in &batch {
            if self.stopped() {
                return Ok(());
            }
            let best = self.probe_pair(pair, &self.config.probe_sizes()).await?;
            if let Some(opportunity) = best {
                BotMetrics::incr(&self.metrics.opportunities_found);
                self.advise_oracle(&opportunity).await;
                self.dispatch_two_leg(opportunity).await;
            }
        }
        Ok(())
    }

    /// Probe a pair at several borrow sizes, keeping the most profitable.
    /// `NoRoute` is a soft miss; any other error fails the cycle.
    async fn probe_pair(
        &self,
        pair: &Pair,
        sizes: &[u64],
    ) -> Result<Option<ArbitrageOpportunity>> {
        let mut best: Option<ArbitrageOpportunity> = None;
        for &size in sizes {
            match self.two_leg.scan_pair(pair, size).await {
                Ok(Some(opportunity)) => {
                    let better = best
                        .as_ref()
                        .map_or(true, |b| opportunity.profit_bps > b.profit_bps);
                    if better {
                        best = Some(opportunity);
                    }
                }
                Ok(None) => {}
                Err(e) if e.is_no_opportunity() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(best)
    }

    async fn scan_dynamic_pairs(&self) {
        let mut dropped = Vec::new();
        let targets: Vec<Pubkey> = self.dynamic_pairs.iter().map(|e| *e.key()).collect();
        for target in targets {
            if self.stopped() {
                return;
            }
            let Some(pair) = self.dynamic_pairs.get(&target).map(|e| e.pair.clone()) else {
                continue;
            };
            match self.two_leg.scan_pair(&pair, DYNAMIC_SCAN_SIZE).await {
                Ok(Some(opportunity)) => {
                    self.reset_dynamic_failures(&target);
                    BotMetrics::incr(&self.metrics.opportunities_found);
                    self.dispatch_two_leg(opportunity).await;
                }
                Ok(None) => self.reset_dynamic_failures(&target),
                Err(e) if e.is_no_opportunity() => {
                    if let Some(mut entry) = self.dynamic_pairs.get_mut(&target) {
                        entry.consecutive_unroutable += 1;
                        if entry.consecutive_unroutable >= DYNAMIC_PAIR_MAX_FAILURES {
                            dropped.push(target);
                        }
                    }
                }
                Err(e) => debug!(pair = %pair.label, error = %e, "dynamic scan failed"),
            }
        }
        for target in dropped {
            if let Some((_, entry)) = self.dynamic_pairs.remove(&target) {
                info!(pair = %entry.pair.label, "dynamic pair dropped after unroutable scans");
            }
        }
    }

    fn reset_dynamic_failures(&self, target: &Pubkey) {
        if let Some(mut entry) = self.dynamic_pairs.get_mut(target) {
            entry.consecutive_unroutable = 0;
        }
    }

    async fn scan_triangular(&self) -> Result<()> {
        match self.triangular.scan_next_batch().await {
            Ok(Some(opportunity)) => {
                BotMetrics::incr(&self.metrics.triangular_opportunities);
                self.dispatch_triangular(opportunity).await;
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) if e.is_no_opportunity() => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn advise_oracle(&self, opportunity: &ArbitrageOpportunity) {
        // Advisory only; logs a warning inside on large deviation.
        let _ = self
            .oracle
            .validate_quote(
                opportunity.token_a,
                opportunity.token_b,
                opportunity.borrow_amount,
                opportunity.leg1_out,
                opportunity.pair.quote.decimals,
                opportunity.pair.target.decimals,
            )
            .await;
    }

    async fn dispatch_two_leg(&self, opportunity: ArbitrageOpportunity) {
        info!(
            pair = %opportunity.pair.label,
            borrow = opportunity.borrow_amount,
            leg1_out = opportunity.leg1_out,
            leg2_out = opportunity.leg2_out,
            flash_fee = opportunity.flash_fee,
            gas_in_token = opportunity.sol_costs_in_token,
            impact_leg1 = opportunity.price_impact_leg1,
            impact_leg2 = opportunity.price_impact_leg2,
            profit_bps = opportunity.profit_bps,
            expected = opportunity.expected_profit,
            "two-leg opportunity"
        );
        if self.config.dry_run {
            info!(pair = %opportunity.pair.label, "dry-run: skipping execution");
            return;
        }
        if let Err(e) = self.execute_two_leg(&opportunity).await {
            warn!(pair = %opportunity.pair.label, error = %e, "execution aborted");
        }
    }

    async fn dispatch_triangular(&self, opportunity: TriangularOpportunity) {
        info!(
            route = opportunity.route.name,
            borrow = opportunity.route.borrow_amount,
            leg1_out = opportunity.leg1_out,
            leg2_out = opportunity.leg2_out,
            leg3_out = opportunity.leg3_out,
            flash_fee = opportunity.flash_fee,
            gas_in_token = opportunity.sol_costs_in_token,
            profit_bps = opportunity.profit_bps,
            expected = opportunity.expected_profit,
            "triangular opportunity"
        );
        if self.config.dry_run {
            info!(route = opportunity.route.name, "dry-run: skipping execution");
            return;
        }
        if let Err(e) = self.execute_triangular(&opportunity).await {
            warn!(route = opportunity.route.name, error = %e, "execution aborted");
        }
    }

    async fn execute_two_leg(&self, opportunity: &ArbitrageOpportunity) -> Result<()> {
        wallet::ensure_ata(&self.rpc, &self.keypair, &opportunity.token_b).await?;
        let tip = self.build_tip();
        let composed = self
            .composer
            .compose_two_leg(opportunity, self.borrow_ata, tip)
            .await?;
        self.simulate_submit_confirm(composed, opportunity.expected_profit)
            .await
    }

    async fn execute_triangular(&self, opportunity: &TriangularOpportunity) -> Result<()> {
        wallet::ensure_ata(&self.rpc, &self.keypair, &opportunity.route.token_b).await?;
        wallet::ensure_ata(&self.rpc, &self.keypair, &opportunity.route.token_c).await?;
        let tip = self.build_tip();
        let composed = self
            .composer
            .compose_triangular(opportunity, self.borrow_ata, tip)
            .await?;
        self.simulate_submit_confirm(composed, opportunity.expected_profit)
            .await
    }

    fn build_tip(&self) -> Option<Instruction> {
        self.config.use_tip.then(|| {
            let tip_account = BlockEngineClient::random_tip_account();
            system_instruction::transfer(
                &self.keypair.pubkey(),
                &tip_account,
                self.config.tip_lamports,
            )
        })
    }

    async fn simulate_submit_confirm(
        &self,
        composed: ComposedTransaction,
        expected_profit: i128,
    ) -> Result<()> {
        self.simulate(&composed.tx).await.inspect_err(|_| {
            BotMetrics::incr(&self.metrics.simulation_failures);
        })?;

        let signature = self.submit(&composed.tx).await?;
        info!(%signature, "transaction submitted");

        match self
            .confirm(&signature, &composed.blockhash, composed.last_valid_block_height)
            .await
        {
            Ok(()) => {
                BotMetrics::incr(&self.metrics.successful_arbs);
                self.metrics.add_profit(expected_profit);
                self.metrics.add_gas(gas_lamports(&self.gas));
                info!(%signature, expected_profit, "arbitrage landed");
                Ok(())
            }
            Err(e) => {
                BotMetrics::incr(&self.metrics.execution_failures);
                Err(e)
            }
        }
    }

    async fn simulate(&self, tx: &VersionedTransaction) -> Result<()> {
        let result = self
            .rpc
            .simulate_transaction_with_config(
                tx,
                RpcSimulateTransactionConfig {
                    commitment: Some(CommitmentConfig::confirmed()),
                    ..RpcSimulateTransactionConfig::default()
                },
            )
            .await?;
        if let Some(err) = result.value.err {
            let logs = result.value.logs.unwrap_or_default();
            let tail: Vec<String> = logs.iter().rev().take(5).rev().cloned().collect();
            return Err(BotError::SimulationFailed {
                logs_tail: format!("{err}: {}", tail.join(" | ")),
                units: result.value.units_consumed.unwrap_or(0),
            });
        }
        Ok(())
    }

    async fn submit(&self, tx: &VersionedTransaction) -> Result<Signature> {
        if self.config.use_tip {
            let signature = self.block_engine.send_transaction(tx).await?;
            BotMetrics::incr(&self.metrics.jito_submissions);
            signature
                .parse()
                .map_err(|_| BotError::Payload("block engine returned a bad signature".into()))
        } else {
            // Preflight already ran as an explicit simulation.
            Ok(self
                .rpc
                .send_transaction_with_config(
                    tx,
                    RpcSendTransactionConfig {
                        skip_preflight: true,
                        max_retries: Some(2),
                        ..RpcSendTransactionConfig::default()
                    },
                )
                .await?)
        }
    }

    /// Await confirmation against the block reference captured at build
    /// time; expiry of that reference means the transaction is dead.
    async fn confirm(
        &self,
        signature: &Signature,
        _blockhash: &Hash,
        last_valid_block_height: u64,
    ) -> Result<()> {
        loop {
            if self.stopped() {
                return Err(BotError::ChainError {
                    err: "shutdown during confirmation".into(),
                });
            }
            let statuses = self.rpc.get_signature_statuses(&[*signature]).await?;
            if let Some(Some(status)) = statuses.value.first() {
                if let Some(err) = &status.err {
                    return Err(BotError::ChainError {
                        err: err.to_string(),
                    });
                }
                if matches!(
                    status.confirmation_status,
                    Some(TransactionConfirmationStatus::Confirmed)
                        | Some(TransactionConfirmationStatus::Finalized)
                ) {
                    return Ok(());
                }
            }
            let block_height = self.rpc.get_block_height().await?;
            if block_height > last_valid_block_height {
                return Err(BotError::ChainError {
                    err: format!(
                        "block reference expired at height {block_height} (valid to {last_valid_block_height})"
                    ),
                });
            }
            tokio::time::sleep(Duration::from_millis(SLOT_TIME_MS)).await;
        }
    }

    async fn handle_new_pool(&self, event: NewPoolEvent) {
        let quotes = known_quote_mints();
        let known: Vec<Pubkey> = event
            .mints
            .iter()
            .copied()
            .filter(|m| quotes.contains(m))
            .collect();
        let unknown: Vec<Pubkey> = event
            .mints
            .iter()
            .copied()
            .filter(|m| !quotes.contains(m))
            .collect();

        // Both sides already covered by the static list, or nothing
        // recognizable to quote against.
        if unknown.is_empty() || known.is_empty() {
            return;
        }
        // Only USDC-quoted discoveries become dynamic pairs.
        if !known.contains(&USDC_MINT) {
            return;
        }
        let target = unknown[0];
        if self.dynamic_pairs.contains_key(&target) {
            return;
        }
        if self
            .config
            .pairs
            .iter()
            .any(|p| p.target_mint() == target)
        {
            return;
        }

        let pair = Pair::new(
            TokenInfo::unknown(target),
            resolve_token("USDC").expect("USDC in registry"),
        );
        info!(pair = %pair.label, source = ?event.source, "dynamic pair added");
        self.dynamic_pairs.insert(
            target,
            DynamicPair {
                pair: pair.clone(),
                consecutive_unroutable: 0,
            },
        );

        // Immediate snipe probe at two small sizes.
        match self.probe_pair(&pair, &SNIPE_PROBE_SIZES).await {
            Ok(Some(opportunity)) => {
                BotMetrics::incr(&self.metrics.opportunities_found);
                self.dispatch_two_leg(opportunity).await;
            }
            Ok(None) => {}
            Err(e) => debug!(pair = %pair.label, error = %e, "snipe probe failed"),
        }
    }

    async fn handle_backrun(&self, signal: BackrunSignal) {
        let quotes = known_quote_mints();
        let target = [signal.token_out, signal.token_in]
            .into_iter()
            .find(|m| !quotes.contains(m));
        let Some(target) = target else {
            return;
        };

        let info = self
            .config
            .pairs
            .iter()
            .find(|p| p.target_mint() == target)
            .map(|p| p.target.clone())
            .unwrap_or_else(|| TokenInfo::unknown(target));
        let pair = Pair::new(info, resolve_token("USDC").expect("USDC in registry"));

        debug!(pair = %pair.label, signature = %signal.signature, "backrun probe");
        match self.probe_pair(&pair, &BACKRUN_PROBE_SIZES).await {
            Ok(Some(opportunity)) => {
                BotMetrics::incr(&self.metrics.opportunities_found);
                self.dispatch_two_leg(opportunity).await;
            }
            Ok(None) => {}
            Err(e) => debug!(pair = %pair.label, error = %e, "backrun probe failed"),
        }
    }
}

fn partition_pairs(pairs: &[Pair], skipped: &HashSet<Pubkey>) -> (Vec<Pair>, Vec<Pair>) {
    let mut hot = Vec::new();
    let mut cold = Vec::new();
    for pair in pairs {
        if skipped.contains(&pair.target_mint()) {
            continue;
        }
        let is_hot = pair
            .target
            .symbol
            .as_deref()
            .is_some_and(|s| HOT_TARGETS.contains(&s));
        if is_hot {
            hot.push(pair.clone());
        } else {
            cold.push(pair.clone());
        }
    }
    (hot, cold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_pairs, NATIVE_MINT};

    #[test]
    fn kill_switch_trips_after_exact_threshold() {
        let mut kill_switch = KillSwitch::new(3);
        assert!(!kill_switch.record_failure());
        assert!(!kill_switch.record_failure());
        assert!(kill_switch.record_failure());
        assert_eq!(kill_switch.count(), 3);
    }

    #[test]
    fn kill_switch_resets_on_success() {
        let mut kill_switch = KillSwitch::new(3);
        assert!(!kill_switch.record_failure());
        assert!(!kill_switch.record_failure());
        kill_switch.record_success();
        assert_eq!(kill_switch.count(), 0);
        assert!(!kill_switch.record_failure());
        assert!(!kill_switch.record_failure());
        assert!(kill_switch.record_failure());
    }

    #[test]
    fn partition_respects_hot_set_and_skips() {
        let pairs = parse_pairs("SOL/USDC,JUP/USDC,RAY/USDC,ORCA/USDC").unwrap();
        let mut skipped = HashSet::new();
        skipped.insert(pairs[2].target_mint()); // RAY

        let (hot, cold) = partition_pairs(&pairs, &skipped);
        let hot_labels: Vec<_> = hot.iter().map(|p| p.label.as_str()).collect();
        let cold_labels: Vec<_> = cold.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(hot_labels, vec!["SOL/USDC", "JUP/USDC"]);
        assert_eq!(cold_labels, vec!["ORCA/USDC"]);
    }

    #[test]
    fn hot_targets_include_native_pair() {
        let pairs = parse_pairs("SOL/USDC").unwrap();
        let (hot, cold) = partition_pairs(&pairs, &HashSet::new());
        assert_eq!(hot.len(), 1);
        assert!(cold.is_empty());
        assert_eq!(hot[0].target_mint(), NATIVE_MINT);
    }
}
