//! Backrun listener: detects large swaps worth probing.
//!
//! Watches the same venue programs as pool discovery, filters for
//! swap-indicating log lines, and reconstructs the swap from token-balance
//! deltas. The parsed-transaction fetch is expensive, so parses are capped
//! per time window. The delta heuristic takes the first owner whose
//! balances show exactly one spent and one received mint; in multi-hop
//! transactions this can mislabel the pair, which costs one wasted probe.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use solana_client::nonblocking::pubsub_client::PubsubClient;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcTransactionConfig, RpcTransactionLogsConfig, RpcTransactionLogsFilter};
use solana_client::rpc_response::RpcLogsResponse;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_transaction_status::option_serializer::OptionSerializer;
use solana_transaction_status::{UiTransactionEncoding, UiTransactionTokenBalance};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use super::{BackrunSignal, DiscoveryEvent, SeenSignatures};
use crate::config::{
    monitored_venue_programs, BACKRUN_PARSE_LIMIT, BACKRUN_PARSE_WINDOW_MS,
    BACKRUN_SOL_THRESHOLD, BACKRUN_USDC_THRESHOLD, DISCOVERY_SUBSCRIBE_STAGGER_MS, NATIVE_MINT,
    SWAP_LOG_PATTERNS, USDC_MINT,
};
use crate::error::{BotError, Result};
use crate::metrics::BotMetrics;

/// Sliding-window budget for expensive transaction parses.
pub(crate) struct ParseBudget {
    window: VecDeque<Instant>,
    limit: usize,
    window_ms: u64,
}

impl ParseBudget {
    pub(crate) fn new(limit: usize, window_ms: u64) -> Self {
        Self {
            window: VecDeque::with_capacity(limit),
            limit,
            window_ms,
        }
    }

    pub(crate) fn try_acquire(&mut self) -> bool {
        let now = Instant::now();
        while let Some(front) = self.window.front() {
            if now.duration_since(*front).as_millis() as u64 > self.window_ms {
                self.window.pop_front();
            } else {
                break;
            }
        }
        if self.window.len() >= self.limit {
            return false;
        }
        self.window.push_back(now);
        true
    }
}

/// Flattened token-balance record used by the delta heuristic.
#[derive(Debug, Clone)]
pub(crate) struct TokenBalanceEntry {
    pub owner: String,
    pub mint: Pubkey,
    pub amount: u64,
}

pub struct BackrunListener {
    ws_url: String,
    rpc: Arc<RpcClient>,
    events: mpsc::Sender<DiscoveryEvent>,
    stop: Arc<AtomicBool>,
    metrics: Arc<BotMetrics>,
    seen: Mutex<SeenSignatures>,
    budget: Mutex<ParseBudget>,
}

impl BackrunListener {
    pub fn new(
        ws_url: String,
        rpc: Arc<RpcClient>,
        events: mpsc::Sender<DiscoveryEvent>,
        stop: Arc<AtomicBool>,
        metrics: Arc<BotMetrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            ws_url,
            rpc,
            events,
            stop,
            metrics,
            seen: Mutex::new(SeenSignatures::new()),
            budget: Mutex::new(ParseBudget::new(BACKRUN_PARSE_LIMIT, BACKRUN_PARSE_WINDOW_MS)),
        })
    }

    pub fn spawn(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        for (i, program) in monitored_venue_programs().into_iter().enumerate() {
            let listener = self.clone();
            handles.push(tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(
                    i as u64 * DISCOVERY_SUBSCRIBE_STAGGER_MS,
                ))
                .await;
                listener.run_log_stream(program).await;
            }));
        }
        handles
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    async fn run_log_stream(&self, program: Pubkey) {
        info!(%program, "backrun log stream starting");
        while !self.stopped() {
            if let Err(e) = self.stream_once(program).await {
                debug!(%program, error = %e, "backrun log stream interrupted");
            }
            if self.stopped() {
                break;
            }
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    }

    async fn stream_once(&self, program: Pubkey) -> Result<()> {
        let client = PubsubClient::new(&self.ws_url)
            .await
            .map_err(|e| BotError::ChainError { err: e.to_string() })?;
        let (mut stream, unsubscribe) = client
            .logs_subscribe(
                RpcTransactionLogsFilter::Mentions(vec![program.to_string()]),
                RpcTransactionLogsConfig {
                    commitment: Some(CommitmentConfig::confirmed()),
                },
            )
            .await
            .map_err(|e| BotError::ChainError { err: e.to_string() })?;

        while !self.stopped() {
            tokio::select! {
                next = stream.next() => match next {
                    Some(response) => self.handle_logs(response.value).await,
                    None => break,
                },
                _ = tokio::time::sleep(Duration::from_millis(500)) => {}
            }
        }
        unsubscribe().await;
        Ok(())
    }

    async fn handle_logs(&self, value: RpcLogsResponse) {
        if value.err.is_some() {
            return;
        }
        let is_swap = value
            .logs
            .iter()
            .any(|line| SWAP_LOG_PATTERNS.iter().any(|p| line.contains(p)));
        if !is_swap {
            return;
        }
        if !self.seen.lock().insert(&value.signature) {
            return;
        }
        if !self.budget.lock().try_acquire() {
            debug!(signature = %value.signature, "parse budget exhausted, skipping");
            return;
        }

        match self.parse_swap(&value.signature).await {
            Ok(Some(signal)) => {
                BotMetrics::incr(&self.metrics.backrun_signals);
                info!(
                    signature = %signal.signature,
                    token_in = %signal.token_in,
                    token_out = %signal.token_out,
                    amount_in = signal.amount_in,
                    "large swap detected"
                );
                let _ = self.events.send(DiscoveryEvent::Backrun(signal)).await;
            }
            Ok(None) => {}
            Err(e) => debug!(signature = %value.signature, error = %e, "backrun parse failed"),
        }
    }

    async fn parse_swap(&self, signature: &str) -> Result<Option<BackrunSignal>> {
        let parsed_signature: Signature = signature
            .parse()
            .map_err(|_| BotError::Payload("bad signature in log stream".into()))?;
        let tx = self
            .rpc
            .get_transaction_with_config(
                &parsed_signature,
                RpcTransactionConfig {
                    encoding: Some(UiTransactionEncoding::JsonParsed),
                    commitment: Some(CommitmentConfig::confirmed()),
                    max_supported_transaction_version: Some(0),
                },
            )
            .await?;

        let Some(meta) = tx.transaction.meta else {
            return Ok(None);
        };
        let pre = entries(balances_of(&meta.pre_token_balances));
        let post = entries(balances_of(&meta.post_token_balances));

        Ok(classify_swap(&pre, &post).map(|(token_in, token_out, amount_in, amount_out)| {
            BackrunSignal {
                signature: signature.to_string(),
                token_in,
                token_out,
                amount_in,
                amount_out,
            }
        }))
    }
}

fn balances_of<'a>(
    balances: &'a OptionSerializer<Vec<UiTransactionTokenBalance>>,
) -> &'a [UiTransactionTokenBalance] {
    match balances {
        OptionSerializer::Some(v) => v.as_slice(),
        _ => &[],
    }
}

fn entries(balances: &[UiTransactionTokenBalance]) -> Vec<TokenBalanceEntry> {
    balances
        .iter()
        .filter_map(|b| {
            let owner = match &b.owner {
                OptionSerializer::Some(owner) => owner.clone(),
                _ => return None,
            };
            let mint = b.mint.parse::<Pubkey>().ok()?;
            let amount = b.ui_token_amount.amount.parse::<u64>().ok()?;
            Some(TokenBalanceEntry {
                owner,
                mint,
                amount,
            })
        })
        .collect()
}

/// First owner whose deltas show exactly one spent and one received mint,
/// with at least one side in USDC or SOL and clearing the "large" bar.
pub(crate) fn classify_swap(
    pre: &[TokenBalanceEntry],
    post: &[TokenBalanceEntry],
) -> Option<(Pubkey, Pubkey, u64, u64)> {
    // (owner, mint) -> delta, preserving owner first-appearance order
    let mut owners: Vec<String> = Vec::new();
    let mut deltas: Vec<((String, Pubkey), i128)> = Vec::new();

    let mut apply = |entry: &TokenBalanceEntry, sign: i128| {
        if !owners.contains(&entry.owner) {
            owners.push(entry.owner.clone());
        }
        let key = (entry.owner.clone(), entry.mint);
        match deltas.iter_mut().find(|(k, _)| *k == key) {
            Some((_, delta)) => *delta += sign * entry.amount as i128,
            None => deltas.push((key, sign * entry.amount as i128)),
        }
    };
    for entry in pre {
        apply(entry, -1);
    }
    for entry in post {
        apply(entry, 1);
    }

    for owner in &owners {
        let owner_deltas: Vec<(Pubkey, i128)> = deltas
            .iter()
            .filter(|((o, _), delta)| o == owner && *delta != 0)
            .map(|((_, mint), delta)| (*mint, *delta))
            .collect();

        let spent: Vec<_> = owner_deltas.iter().filter(|(_, d)| *d < 0).collect();
        let received: Vec<_> = owner_deltas.iter().filter(|(_, d)| *d > 0).collect();
        if spent.len() != 1 || received.len() != 1 {
            continue;
        }

        let (token_in, spent_delta) = *spent[0];
        let (token_out, received_delta) = *received[0];
        let amount_in = spent_delta.unsigned_abs() as u64;
        let amount_out = received_delta as u64;

        let anchored = [token_in, token_out]
            .iter()
            .any(|m| *m == USDC_MINT || *m == NATIVE_MINT);
        if !anchored {
            continue;
        }

        let large = is_large(token_in, amount_in) || is_large(token_out, amount_out);
        if large {
            return Some((token_in, token_out, amount_in, amount_out));
        }
    }
    None
}

fn is_large(mint: Pubkey, amount: u64) -> bool {
    (mint == USDC_MINT && amount > BACKRUN_USDC_THRESHOLD)
        || (mint == NATIVE_MINT && amount > BACKRUN_SOL_THRESHOLD)
}
