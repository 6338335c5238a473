//! Pool discovery: venue-program log streams plus a pair-listing poll.
//!
//! Two independent strategies feed the same channel. The log stream watches
//! for pool-initialization patterns and extracts candidate mints from the
//! transaction's token-balance records; the HTTP poll cross-checks fresh
//! listings with one small feeler quote before emitting.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use serde::Deserialize;
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
use tracing::{debug, info};

use super::{DiscoveryEvent, NewPoolEvent, PoolSource, SeenSignatures};
use crate::config::{
    monitored_venue_programs, DISCOVERY_MAX_PROBES_PER_CYCLE, DISCOVERY_POLL_INTERVAL_SECS,
    DISCOVERY_SUBSCRIBE_STAGGER_MS, PAIR_LISTING_CHAIN, PAIR_LISTING_URL, POOL_INIT_PATTERNS,
    REQUEST_TIMEOUT_MS, USDC_MINT,
};
use crate::error::{BotError, Result};
use crate::metrics::BotMetrics;
use crate::provider::ProviderGateway;

#[derive(Debug, Deserialize)]
struct TokenProfile {
    #[serde(rename = "chainId")]
    chain_id: String,
    #[serde(rename = "tokenAddress")]
    token_address: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    pairs: Vec<ListedPair>,
}

#[derive(Debug, Deserialize)]
struct ListedPair {
    #[serde(rename = "chainId")]
    chain_id: String,
    #[serde(rename = "baseToken")]
    base_token: ListedToken,
}

#[derive(Debug, Deserialize)]
struct ListedToken {
    address: String,
}

pub struct PoolDiscoveryListener {
    ws_url: String,
    rpc: Arc<RpcClient>,
    gateway: Arc<ProviderGateway>,
    events: mpsc::Sender<DiscoveryEvent>,
    stop: Arc<AtomicBool>,
    metrics: Arc<BotMetrics>,
    seen: Mutex<SeenSignatures>,
}

impl PoolDiscoveryListener {
    pub fn new(
        ws_url: String,
        rpc: Arc<RpcClient>,
        gateway: Arc<ProviderGateway>,
        events: mpsc::Sender<DiscoveryEvent>,
        stop: Arc<AtomicBool>,
        metrics: Arc<BotMetrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            ws_url,
            rpc,
            gateway,
            events,
            stop,
            metrics,
            seen: Mutex::new(SeenSignatures::new()),
        })
    }

    /// Spawn one log-stream task per monitored venue plus the listing poll.
    /// Subscriptions are staggered so the push endpoint does not reject the
    /// burst.
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
        let listener = self.clone();
        handles.push(tokio::spawn(async move {
            listener.run_listing_poll().await;
        }));
        handles
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    async fn run_log_stream(&self, program: Pubkey) {
        info!(%program, "pool log stream starting");
        while !self.stopped() {
            if let Err(e) = self.stream_once(program).await {
                debug!(%program, error = %e, "pool log stream interrupted");
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
        let is_pool_init = value
            .logs
            .iter()
            .any(|line| POOL_INIT_PATTERNS.iter().any(|p| line.contains(p)));
        if !is_pool_init {
            return;
        }
        if !self.seen.lock().insert(&value.signature) {
            return;
        }

        match self.extract_mints(&value.signature).await {
            Ok(mints) if mints.len() >= 2 => {
                BotMetrics::incr(&self.metrics.new_pools_detected);
                let event = NewPoolEvent {
                    source: PoolSource::LogStream,
                    signature: Some(value.signature),
                    mints,
                };
                let _ = self.events.send(DiscoveryEvent::NewPool(event)).await;
            }
            Ok(_) => {}
            Err(e) => debug!(signature = %value.signature, error = %e, "mint extraction failed"),
        }
    }

    async fn extract_mints(&self, signature: &str) -> Result<Vec<Pubkey>> {
        let signature: Signature = signature
            .parse()
            .map_err(|_| BotError::Payload("bad signature in log stream".into()))?;
        let tx = self
            .rpc
            .get_transaction_with_config(
                &signature,
                RpcTransactionConfig {
                    encoding: Some(UiTransactionEncoding::JsonParsed),
                    commitment: Some(CommitmentConfig::confirmed()),
                    max_supported_transaction_version: Some(0),
                },
            )
            .await?;

        let Some(meta) = tx.transaction.meta else {
            return Ok(Vec::new());
        };
        let pre = option_vec(&meta.pre_token_balances);
        let post = option_vec(&meta.post_token_balances);
        Ok(distinct_mints(pre, post))
    }

    async fn run_listing_poll(&self) {
        let http = reqwest::Client::new();
        let mut seen_listings: HashSet<String> = HashSet::new();
        let mut ticker =
            tokio::time::interval(Duration::from_secs(DISCOVERY_POLL_INTERVAL_SECS));
        while !self.stopped() {
            ticker.tick().await;
            if self.stopped() {
                break;
            }
            if let Err(e) = self.poll_listings_once(&http, &mut seen_listings).await {
                debug!(error = %e, "pair-listing poll failed");
            }
        }
    }

    async fn poll_listings_once(
        &self,
        http: &reqwest::Client,
        seen_listings: &mut HashSet<String>,
    ) -> Result<()> {
        let mut candidates: Vec<String> = Vec::new();

        let url = format!("{PAIR_LISTING_URL}/token-profiles/latest/v1");
        let profiles: Vec<TokenProfile> = http
            .get(&url)
            .timeout(Duration::from_millis(REQUEST_TIMEOUT_MS))
            .send()
            .await?
            .json()
            .await?;
        candidates.extend(
            profiles
                .into_iter()
                .filter(|p| p.chain_id == PAIR_LISTING_CHAIN)
                .map(|p| p.token_address),
        );

        // Second angle on the same feed: freshly indexed pairs.
        let url = format!("{PAIR_LISTING_URL}/latest/dex/search?q={PAIR_LISTING_CHAIN}");
        match http
            .get(&url)
            .timeout(Duration::from_millis(REQUEST_TIMEOUT_MS))
            .send()
            .await
        {
            Ok(response) => match response.json::<SearchResponse>().await {
                Ok(search) => candidates.extend(
                    search
                        .pairs
                        .into_iter()
                        .filter(|p| p.chain_id == PAIR_LISTING_CHAIN)
                        .map(|p| p.base_token.address),
                ),
                Err(e) => debug!(error = %e, "pair search payload malformed"),
            },
            Err(e) => debug!(error = %e, "pair search unavailable"),
        }

        let mut probes = 0usize;
        for candidate in candidates {
            if probes >= DISCOVERY_MAX_PROBES_PER_CYCLE {
                break;
            }
            if !seen_listings.insert(candidate.clone()) {
                continue;
            }
            let Ok(mint) = candidate.parse::<Pubkey>() else {
                continue;
            };
            probes += 1;

            // One small feeler: 1 USDC, wide slippage, direct routes only.
            match self.gateway.quote(USDC_MINT, mint, 1_000_000, 100, true).await {
                Ok(quote) if quote.out_amount > 0 => {
                    BotMetrics::incr(&self.metrics.new_pools_detected);
                    let event = NewPoolEvent {
                        source: PoolSource::Listing,
                        signature: None,
                        mints: vec![USDC_MINT, mint],
                    };
                    let _ = self.events.send(DiscoveryEvent::NewPool(event)).await;
                }
                Ok(_) => {}
                Err(e) => debug!(%mint, error = %e, "listing probe unroutable"),
            }
        }
        Ok(())
    }
}

fn option_vec<'a>(
    balances: &'a OptionSerializer<Vec<UiTransactionTokenBalance>>,
) -> &'a [UiTransactionTokenBalance] {
    match balances {
        OptionSerializer::Some(v) => v.as_slice(),
        _ => &[],
    }
}

/// Distinct mints across the pre/post token-balance records.
fn distinct_mints(
    pre: &[UiTransactionTokenBalance],
    post: &[UiTransactionTokenBalance],
) -> Vec<Pubkey> {
    let mut mints = Vec::new();
    for balance in pre.iter().chain(post) {
        if let Ok(mint) = balance.mint.parse::<Pubkey>() {
            if !mints.contains(&mint) {
                mints.push(mint);
            }
        }
    }
    mints
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_account_decoder::parse_token::UiTokenAmount;

    fn balance(mint: &Pubkey, amount: &str) -> UiTransactionTokenBalance {
        UiTransactionTokenBalance {
            account_index: 0,
            mint: mint.to_string(),
            owner: OptionSerializer::None,
            program_id: OptionSerializer::None,
            ui_token_amount: UiTokenAmount {
                ui_amount: None,
                decimals: 6,
                amount: amount.to_string(),
                ui_amount_string: String::new(),
            },
        }
    }

    #[test]
    fn distinct_mints_dedups_across_pre_and_post() {
        let mint_a = Pubkey::new_unique();
        let mint_b = Pubkey::new_unique();
        let pre = vec![balance(&mint_a, "100"), balance(&mint_b, "5")];
        let post = vec![balance(&mint_a, "90"), balance(&mint_b, "10")];
        let mints = distinct_mints(&pre, &post);
        assert_eq!(mints.len(), 2);
        assert!(mints.contains(&mint_a));
        assert!(mints.contains(&mint_b));
    }

    #[test]
    fn single_mint_transaction_yields_one() {
        let mint = Pubkey::new_unique();
        let pre = vec![balance(&mint, "1")];
        let mints = distinct_mints(&pre, &[]);
        assert_eq!(mints.len(), 1);
    }
}
