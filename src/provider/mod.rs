//! Rate-limited provider gateway.
//!
//! Single process-wide entry point for everything the scanners and the
//! composer need from the aggregator: quotes (cached, rate-limited, with a
//! free lite source tried first), swap-instruction bundles, and address
//! lookup tables. Cooldown and bucket state live here so every caller shares
//! the same budget.

mod aggregator;
mod quote_cache;
mod rate_limiter;

pub use aggregator::{
    AggregatorClient, LiteQuoteClient, Quote, QuoteRequest, QuoteSource, SwapInstructionBundle,
};
pub use quote_cache::{QuoteCache, QuoteKey};
pub use rate_limiter::TokenBucket;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::address_lookup_table::state::AddressLookupTable;
use solana_sdk::address_lookup_table::AddressLookupTableAccount;
use solana_sdk::pubkey::Pubkey;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::{
    BotConfig, BACKOFF_BASE_MS, COOLDOWN_MS, MAX_RETRIES, QUOTE_CACHE_MAX_ENTRIES,
    QUOTE_CACHE_TTL_MS, RATE_LIMIT_CAPACITY, RATE_LIMIT_REFILL_PER_SEC,
};
use crate::error::{BotError, Result};

const LOOKUP_TABLE_BATCH: usize = 10;

pub struct ProviderGateway {
    limiter: TokenBucket,
    cache: QuoteCache,
    lite: Arc<dyn QuoteSource>,
    primary: Arc<dyn QuoteSource>,
    aggregator: Arc<AggregatorClient>,
    rpc: Arc<RpcClient>,
    cooldowns: Mutex<HashMap<&'static str, Instant>>,
    cooldown_ms: u64,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl ProviderGateway {
    pub fn new(config: &BotConfig, rpc: Arc<RpcClient>) -> Self {
        let aggregator = Arc::new(AggregatorClient::new(
            config.aggregator_url.clone(),
            config.aggregator_api_key.clone(),
        ));
        Self {
            limiter: TokenBucket::new(RATE_LIMIT_CAPACITY, RATE_LIMIT_REFILL_PER_SEC),
            cache: QuoteCache::new(QUOTE_CACHE_TTL_MS, QUOTE_CACHE_MAX_ENTRIES),
            lite: Arc::new(LiteQuoteClient::new(config.lite_quote_url.clone())),
            primary: aggregator.clone(),
            aggregator,
            rpc,
            cooldowns: Mutex::new(HashMap::new()),
            cooldown_ms: COOLDOWN_MS,
            max_retries: MAX_RETRIES,
            backoff_base_ms: BACKOFF_BASE_MS,
        }
    }

    /// Fetch a quote, serving from cache when possible and sparing the paid
    /// source until the lite source fails or cools down.
    pub async fn quote(
        &self,
        input_mint: Pubkey,
        output_mint: Pubkey,
        amount: u64,
        slippage_bps: u16,
        direct_only: bool,
    ) -> Result<Quote> {
        let key = QuoteKey {
            input_mint,
            output_mint,
            in_amount: amount,
        };
        if let Some(quote) = self.cache.get(&key) {
            return Ok(quote);
        }

        let req = QuoteRequest {
            input_mint,
            output_mint,
            amount,
            slippage_bps,
            direct_only,
        };

        if !self.in_cooldown(self.lite.name()) {
            match self.lite.fetch_quote(&req).await {
                Ok(quote) => {
                    self.cache.insert(key, quote.clone());
                    return Ok(quote);
                }
                Err(BotError::ProviderRateLimited) => {
                    self.start_cooldown(self.lite.name());
                    self.limiter.drain();
                    warn!(
                        source = self.lite.name(),
                        cooldown_ms = self.cooldown_ms,
                        "quote source throttled, cooling down"
                    );
                }
                Err(e) => {
                    debug!(source = self.lite.name(), error = %e, "lite quote failed");
                }
            }
        }

        let mut attempt = 0u32;
        loop {
            self.limiter.acquire().await;
            match self.primary.fetch_quote(&req).await {
                Ok(quote) => {
                    self.cache.insert(key, quote.clone());
                    return Ok(quote);
                }
                Err(e) => {
                    if !Self::retriable(&e) || attempt >= self.max_retries {
                        return Err(e);
                    }
                    if matches!(e, BotError::ProviderRateLimited) {
                        self.limiter.drain();
                    }
                    let delay = self.backoff_base_ms * (1u64 << attempt);
                    debug!(attempt, delay_ms = delay, error = %e, "retrying primary quote");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Fetch a swap-instruction bundle for a previously returned quote. The
    /// quote's raw blob is forwarded verbatim.
    pub async fn swap_instructions(
        &self,
        quote: &Quote,
        user: Pubkey,
        wrap_native: bool,
        use_token_ledger: bool,
    ) -> Result<SwapInstructionBundle> {
        let mut attempt = 0u32;
        loop {
            self.limiter.acquire().await;
            match self
                .aggregator
                .swap_instructions(quote, user, wrap_native, use_token_ledger)
                .await
            {
                Ok(bundle) => return Ok(bundle),
                Err(e) => {
                    if !Self::retriable(&e) || attempt >= self.max_retries {
                        return Err(e);
                    }
                    if matches!(e, BotError::ProviderRateLimited) {
                        self.limiter.drain();
                    }
                    tokio::time::sleep(Duration::from_millis(
                        self.backoff_base_ms * (1u64 << attempt),
                    ))
                    .await;
                    attempt += 1;
                }
            }
        }
    }

    /// Resolve lookup-table accounts in batches. Tables that fail to decode
    /// are skipped; the composed transaction just compresses less.
    pub async fn load_lookup_tables(
        &self,
        addresses: &[Pubkey],
    ) -> Result<Vec<AddressLookupTableAccount>> {
        let mut tables = Vec::with_capacity(addresses.len());
        for chunk in addresses.chunks(LOOKUP_TABLE_BATCH) {
            let accounts = self.rpc.get_multiple_accounts(chunk).await?;
            for (address, account) in chunk.iter().zip(accounts) {
                let Some(account) = account else {
                    debug!(%address, "lookup table account missing");
                    continue;
                };
                match AddressLookupTable::deserialize(&account.data) {
                    Ok(table) => tables.push(AddressLookupTableAccount {
                        key: *address,
                        addresses: table.addresses.to_vec(),
                    }),
                    Err(e) => debug!(%address, error = %e, "lookup table decode failed"),
                }
            }
        }
        Ok(tables)
    }

    /// Zero the token bucket and flush the quote cache.
    #[allow(dead_code)]
    pub fn drain(&self) {
        self.limiter.drain();
        self.cache.drain();
    }

    fn retriable(e: &BotError) -> bool {
        match e {
            BotError::ProviderRateLimited | BotError::Timeout { .. } => true,
            BotError::ProviderRequest { status, .. } => *status >= 500,
            _ => false,
        }
    }

    fn in_cooldown(&self, source: &'static str) -> bool {
        self.cooldowns
            .lock()
            .get(source)
            .is_some_and(|deadline| *deadline > Instant::now())
    }

    fn start_cooldown(&self, source: &'static str) {
        self.cooldowns
            .lock()
            .insert(source, Instant::now() + Duration::from_millis(self.cooldown_ms));
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Stub quote sources for tests elsewhere in the crate.

    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Script = Box<dyn Fn(&QuoteRequest) -> Result<Quote> + Send + Sync>;

    pub(crate) struct ScriptedSource {
        label: &'static str,
        calls: AtomicUsize,
        script: Script,
    }

    impl ScriptedSource {
        pub(crate) fn new(
            label: &'static str,
            script: impl Fn(&QuoteRequest) -> Result<Quote> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                label,
                calls: AtomicUsize::new(0),
                script: Box::new(script),
            })
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QuoteSource for ScriptedSource {
        async fn fetch_quote(&self, req: &QuoteRequest) -> Result<Quote> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.script)(req)
        }

        fn name(&self) -> &'static str {
            self.label
        }
    }

    /// Gateway wired to stub sources; the aggregator and RPC endpoints are
    /// never reached by the quote path.
    pub(crate) fn stub_gateway(
        lite: Arc<dyn QuoteSource>,
        primary: Arc<dyn QuoteSource>,
    ) -> ProviderGateway {
        ProviderGateway {
            limiter: TokenBucket::new(100, 1_000.0),
            cache: QuoteCache::new(QUOTE_CACHE_TTL_MS, QUOTE_CACHE_MAX_ENTRIES),
            lite,
            primary,
            aggregator: Arc::new(AggregatorClient::new("http://127.0.0.1:0", None)),
            rpc: Arc::new(RpcClient::new("http://127.0.0.1:8899".to_string())),
            cooldowns: Mutex::new(HashMap::new()),
            cooldown_ms: COOLDOWN_MS,
            max_retries: MAX_RETRIES,
            backoff_base_ms: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum StubMode {
        Ok,
        RateLimited,
        ClientError(u16),
        FailThenOk(AtomicUsize),
    }

    struct StubSource {
        label: &'static str,
        calls: AtomicUsize,
        mode: StubMode,
    }

    impl StubSource {
        fn new(label: &'static str, mode: StubMode) -> Arc<Self> {
            Arc::new(Self {
                label,
                calls: AtomicUsize::new(0),
                mode,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QuoteSource for StubSource {
        async fn fetch_quote(&self, req: &QuoteRequest) -> Result<Quote> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.mode {
                StubMode::Ok => Ok(Quote::synthetic(
                    req.input_mint,
                    req.output_mint,
                    req.amount,
                    req.amount + 1,
                )),
                StubMode::RateLimited => Err(BotError::ProviderRateLimited),
                StubMode::ClientError(status) => Err(BotError::ProviderRequest {
                    status: *status,
                    body: "bad request".into(),
                }),
                StubMode::FailThenOk(failures_left) => {
                    if failures_left
                        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                        .is_ok()
                    {
                        Err(BotError::ProviderRateLimited)
                    } else {
                        Ok(Quote::synthetic(
                            req.input_mint,
                            req.output_mint,
                            req.amount,
                            req.amount + 1,
                        ))
                    }
                }
            }
        }

        fn name(&self) -> &'static str {
            self.label
        }
    }

    fn gateway_with(lite: Arc<dyn QuoteSource>, primary: Arc<dyn QuoteSource>) -> ProviderGateway {
        ProviderGateway {
            limiter: TokenBucket::new(10, 100.0),
            cache: QuoteCache::new(5_000, 200),
            lite,
            primary,
            aggregator: Arc::new(AggregatorClient::new("http://127.0.0.1:0", None)),
            rpc: Arc::new(RpcClient::new("http://127.0.0.1:8899".to_string())),
            cooldowns: Mutex::new(HashMap::new()),
            cooldown_ms: 90_000,
            max_retries: 1,
            backoff_base_ms: 10,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cached_quote_issues_one_underlying_request() {
        let lite = StubSource::new("lite", StubMode::Ok);
        let primary = StubSource::new("aggregator", StubMode::Ok);
        let gateway = gateway_with(lite.clone(), primary.clone());

        let input = Pubkey::new_unique();
        let output = Pubkey::new_unique();
        let first = gateway.quote(input, output, 1_000, 50, false).await.unwrap();
        let second = gateway.quote(input, output, 1_000, 50, false).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(lite.calls(), 1);
        assert_eq!(primary.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_lite_source_cools_down() {
        let lite = StubSource::new("lite", StubMode::RateLimited);
        let primary = StubSource::new("aggregator", StubMode::Ok);
        let gateway = gateway_with(lite.clone(), primary.clone());

        let input = Pubkey::new_unique();
        let output = Pubkey::new_unique();

        gateway.quote(input, output, 1, 50, false).await.unwrap();
        assert_eq!(lite.calls(), 1);
        assert_eq!(primary.calls(), 1);

        // During the cooldown window the throttled source sees zero requests.
        for amount in 2..5u64 {
            gateway.quote(input, output, amount, 50, false).await.unwrap();
        }
        assert_eq!(lite.calls(), 1);
        assert_eq!(primary.calls(), 4);

        // After the window expires the lite source is tried again.
        tokio::time::advance(Duration::from_millis(90_001)).await;
        gateway.quote(input, output, 99, 50, false).await.unwrap();
        assert_eq!(lite.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn primary_rate_limit_retries_with_backoff() {
        let lite = StubSource::new("lite", StubMode::ClientError(404));
        let primary = StubSource::new("aggregator", StubMode::FailThenOk(AtomicUsize::new(1)));
        let gateway = gateway_with(lite.clone(), primary.clone());

        let quote = gateway
            .quote(Pubkey::new_unique(), Pubkey::new_unique(), 10, 50, false)
            .await
            .unwrap();
        assert_eq!(quote.in_amount, 10);
        assert_eq!(primary.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn client_errors_are_not_retried() {
        let lite = StubSource::new("lite", StubMode::ClientError(404));
        let primary = StubSource::new("aggregator", StubMode::ClientError(400));
        let gateway = gateway_with(lite.clone(), primary.clone());

        let err = gateway
            .quote(Pubkey::new_unique(), Pubkey::new_unique(), 10, 50, false)
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::ProviderRequest { status: 400, .. }));
        assert_eq!(primary.calls(), 1);
    }
}
