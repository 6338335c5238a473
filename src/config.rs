//! Configuration constants and runtime settings.

use solana_sdk::pubkey;
use solana_sdk::pubkey::Pubkey;

use crate::error::{BotError, Result};
use crate::types::{Pair, TokenInfo};

// Network timing
pub const SLOT_TIME_MS: u64 = 400;

// Wrapped SOL (native mint)
pub const NATIVE_MINT: Pubkey = pubkey!("So11111111111111111111111111111111111111112");
pub const USDC_MINT: Pubkey = pubkey!("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v");
pub const USDT_MINT: Pubkey = pubkey!("Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB");
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

// Token programs. ATA derivation must use whichever program owns the mint.
pub const TOKEN_PROGRAM: Pubkey = pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");
pub const TOKEN_2022_PROGRAM: Pubkey = pubkey!("TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb");

// Monitored venue programs for pool discovery and backrun detection
pub const RAYDIUM_AMM_V4: Pubkey = pubkey!("675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8");
pub const RAYDIUM_CLMM: Pubkey = pubkey!("CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK");
pub const METEORA_DLMM: Pubkey = pubkey!("LBUZKhRxPF3XUpBCjp4YzTKgLccjZhTSDM9YuVaPwxo");
pub const ORCA_WHIRLPOOL: Pubkey = pubkey!("whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc");

pub fn monitored_venue_programs() -> Vec<Pubkey> {
    vec![RAYDIUM_AMM_V4, RAYDIUM_CLMM, METEORA_DLMM, ORCA_WHIRLPOOL]
}

/// Log substrings that indicate pool initialization on the monitored venues.
pub const POOL_INIT_PATTERNS: &[&str] = &[
    "initialize2",
    "create_pool",
    "InitializeLbPair",
    "InitializePool",
    "Instruction: CreatePool",
];

/// Log substrings that indicate a swap on the monitored venues.
pub const SWAP_LOG_PATTERNS: &[&str] = &[
    "Instruction: Swap",
    "Instruction: SwapV2",
    "Instruction: SwapExactIn",
    "ray_log",
];

// Aggregator endpoints
pub const DEFAULT_AGGREGATOR_URL: &str = "https://quote-api.jup.ag/v6";
pub const DEFAULT_LITE_QUOTE_URL: &str = "https://lite-api.jup.ag/swap/v1";

// Pair-listing endpoint
pub const PAIR_LISTING_URL: &str = "https://api.dexscreener.com";
pub const PAIR_LISTING_CHAIN: &str = "solana";

// Provider gateway tuning
pub const QUOTE_CACHE_TTL_MS: u64 = 5_000;
pub const QUOTE_CACHE_MAX_ENTRIES: usize = 200;
pub const RATE_LIMIT_CAPACITY: u32 = 10;
pub const RATE_LIMIT_REFILL_PER_SEC: f64 = 2.0;
pub const COOLDOWN_MS: u64 = 90_000;
pub const REQUEST_TIMEOUT_MS: u64 = 8_000;
pub const BACKOFF_BASE_MS: u64 = 500;
pub const MAX_RETRIES: u32 = 1;
pub const MAX_QUOTE_ACCOUNTS: u8 = 20;

// Oracle
pub const ORACLE_CACHE_WINDOW_MS: u64 = 5_000;
pub const ORACLE_STALE_SLOTS: u64 = 75;
pub const ORACLE_DEVIATION_WARN_BPS: i64 = 100;

// Engine
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
pub const COLD_BATCH_SIZE: usize = 8;
pub const TRIANGULAR_BATCH_SIZE: usize = 10;
pub const DYNAMIC_PAIR_MAX_FAILURES: u32 = 5;
pub const MAX_CONSECUTIVE_FAILURES: u32 = 10;
pub const GAS_FLOOR_LAMPORTS: u64 = 50_000_000;
pub const METRICS_SUMMARY_INTERVAL_SECS: u64 = 60;

// Freshness windows enforced by the composer
pub const TWO_LEG_FRESHNESS_MS: u64 = 10_000;
pub const TRIANGULAR_FRESHNESS_MS: u64 = 30_000;
pub const TRIANGULAR_MIN_CU_LIMIT: u32 = 600_000;

// Probe sizes in USDC raw units (6 decimals)
pub const SNIPE_PROBE_SIZES: [u64; 2] = [10_000_000, 100_000_000];
pub const BACKRUN_PROBE_SIZES: [u64; 2] = [50_000_000, 500_000_000];

// Backrun classification thresholds
pub const BACKRUN_USDC_THRESHOLD: u64 = 1_000_000_000; // 1,000 USDC
pub const BACKRUN_SOL_THRESHOLD: u64 = 5_000_000_000; // 5 SOL
pub const BACKRUN_PARSE_LIMIT: usize = 3;
pub const BACKRUN_PARSE_WINDOW_MS: u64 = 10_000;

// Pool discovery
pub const DISCOVERY_POLL_INTERVAL_SECS: u64 = 30;
pub const DISCOVERY_MAX_PROBES_PER_CYCLE: usize = 3;
pub const DISCOVERY_SUBSCRIBE_STAGGER_MS: u64 = 500;
pub const SEEN_SIGNATURES_CAP: usize = 10_000;
pub const SEEN_SIGNATURES_RETAIN: usize = 5_000;

/// Pairs whose target symbol is in this set are scanned every cycle.
pub const HOT_TARGETS: &[&str] = &["SOL", "JUP", "JTO", "BONK"];

/// Quote-side mints the static pair list already covers. Discovery events
/// where both mints are in this set carry no new pair.
pub fn known_quote_mints() -> [Pubkey; 3] {
    [USDC_MINT, NATIVE_MINT, USDT_MINT]
}

/// Borrow size for re-scans of dynamically discovered pairs.
pub const DYNAMIC_SCAN_SIZE: u64 = 50_000_000;

/// Block-engine tip accounts; one is picked uniformly at random per tip.
pub const TIP_ACCOUNTS: [Pubkey; 8] = [
    pubkey!("96gYZGLnJYVFmbjzopPSU6QiEV5fGqZNyN9nmNhvrZU5"),
    pubkey!("HFqU5x63VTqvQss8hp11i4wVV8bD44PvwucfZ2bU7gRe"),
    pubkey!("Cw8CFyM9FkoMi7K7Crf6HNQqf4uEMzpKw6QNghXLvLkY"),
    pubkey!("ADaUMid9yfUytqMBgopwjb2DTLSokTSzL1zt6iGPaS49"),
    pubkey!("DfXygSm4jCyNCybVYYK6DwvWqjKee8pbDmJGcLWNDXjh"),
    pubkey!("ADuUkR4vqLUMWXxW9gh6D6L8pMSawimctcNZ5pGwDcEt"),
    pubkey!("DttWaMuVvTiduZRnguLF7jNxTgiMBZ1hyAumKUiL2KRL"),
    pubkey!("3AVi9Tg9Uo68tJfuvoKvqKNWKkC5wPdSSdeBnizKZ6jT"),
];

/// Block-engine region. Maps to a regional base URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TipRegion {
    Default,
    Ny,
    Amsterdam,
    Frankfurt,
    Tokyo,
    Slc,
}

impl std::fmt::Display for TipRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TipRegion::Default => "default",
            TipRegion::Ny => "ny",
            TipRegion::Amsterdam => "amsterdam",
            TipRegion::Frankfurt => "frankfurt",
            TipRegion::Tokyo => "tokyo",
            TipRegion::Slc => "slc",
        };
        f.write_str(name)
    }
}

impl TipRegion {
    pub fn base_url(&self) -> &'static str {
        match self {
            TipRegion::Default => "https://mainnet.block-engine.jito.wtf",
            TipRegion::Ny => "https://ny.mainnet.block-engine.jito.wtf",
            TipRegion::Amsterdam => "https://amsterdam.mainnet.block-engine.jito.wtf",
            TipRegion::Frankfurt => "https://frankfurt.mainnet.block-engine.jito.wtf",
            TipRegion::Tokyo => "https://tokyo.mainnet.block-engine.jito.wtf",
            TipRegion::Slc => "https://slc.mainnet.block-engine.jito.wtf",
        }
    }
}

/// Known tokens: symbol, mint, decimals.
pub fn token_registry() -> Vec<TokenInfo> {
    vec![
        TokenInfo::known("SOL", NATIVE_MINT, 9),
        TokenInfo::known("USDC", USDC_MINT, 6),
        TokenInfo::known("USDT", pubkey!("Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB"), 6),
        TokenInfo::known("JUP", pubkey!("JUPyiwrYJFskUPiHa7hkeR8VUtAeFoSYbKedZNsDvCN"), 6),
        TokenInfo::known("JTO", pubkey!("jtojtomepa8beP8AuQc6eXt5FriJwfFMwQx2v2f9mCL"), 9),
        TokenInfo::known("BONK", pubkey!("DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263"), 5),
        TokenInfo::known("WIF", pubkey!("EKpQGSJtjMFqKZ9KQanSqYXRcF8fBopzLHYxdM65zcjm"), 6),
        TokenInfo::known("RAY", pubkey!("4k3Dyjzvzp8eMZWUXbBCjEvwSkkk59S5iCNLY3QrkX6R"), 6),
        TokenInfo::known("ORCA", pubkey!("orcaEKTdK7LKz57vaAYr9QeNsVEPfiu6QeMU1kektZE"), 6),
        TokenInfo::known("PYTH", pubkey!("HZ1JovNiVvGrGNiiYvEozEVgZ58xaU3RKwX8eACQBCt3"), 6),
        TokenInfo::known("MSOL", pubkey!("mSoLzYCxHdYgdzU16g5QSh3i5K3z3KZK7ytfqcJm7So"), 9),
        TokenInfo::known("JITOSOL", pubkey!("J1toso1uCk3RLmjorhTtrVwY9HJ7X8V9yYac6Y7kGCPn"), 9),
        TokenInfo::known("BSOL", pubkey!("bSo13r4TkiE4KumL71LsHTPpL2euBYLFx6h9HP3piy1"), 9),
        TokenInfo::known("INF", pubkey!("5oVNBeEEQvYi1cX3ir8Dx5n1P7pdxydbGF2X4TxVusJm"), 9),
        TokenInfo::known("WEN", pubkey!("WENWENvqqNya429ubCdR81ZmD69brwQaaBYY6p3LCpk"), 5),
        TokenInfo::known("POPCAT", pubkey!("7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr"), 9),
    ]
}

/// Look a token up by symbol (case-insensitive) or base58 mint.
pub fn resolve_token(s: &str) -> Option<TokenInfo> {
    let upper = s.to_uppercase();
    if let Some(info) = token_registry()
        .into_iter()
        .find(|t| t.symbol.as_deref() == Some(upper.as_str()))
    {
        return Some(info);
    }
    s.parse::<Pubkey>().ok().map(TokenInfo::unknown)
}

/// Parse a comma-separated pair list, e.g. `"SOL/USDC,JUP/USDC"`.
/// The quote side must be a known symbol; the target side may be a raw mint.
pub fn parse_pairs(s: &str) -> Result<Vec<Pair>> {
    let mut pairs = Vec::new();
    for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (target_s, quote_s) = entry
            .split_once('/')
            .ok_or_else(|| BotError::Payload(format!("invalid pair (want TARGET/QUOTE): {entry}")))?;
        let target = resolve_token(target_s)
            .ok_or_else(|| BotError::Payload(format!("unknown target token: {target_s}")))?;
        let quote = resolve_token(quote_s)
            .filter(|t| t.symbol.is_some())
            .ok_or_else(|| BotError::Payload(format!("unknown quote token: {quote_s}")))?;
        pairs.push(Pair::new(target, quote));
    }
    if pairs.is_empty() {
        return Err(BotError::Payload("empty pair list".into()));
    }
    Ok(pairs)
}

/// Pyth-shaped price-feed accounts for the mints we track.
pub fn oracle_feeds() -> Vec<(Pubkey, Pubkey)> {
    vec![
        (NATIVE_MINT, pubkey!("H6ARHf6YXhGYeQfUzQNGk6rDNnLBQKrenN712K4AQJEG")),
        (USDC_MINT, pubkey!("Gnt27xtC473ZT2Mw5u8wZ68Z3gULkSTb5DuxJy7eJotD")),
        (
            pubkey!("Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB"),
            pubkey!("3vxLXJqLqF3JG5TCbYycbKWRBbCJQLxQmBGCkyqEEefL"),
        ),
        (
            pubkey!("DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263"),
            pubkey!("8ihFLu5FimgTQ1Unh4dVyEHUGodJ5gJQCrQf4KUVB9bN"),
        ),
        (
            pubkey!("JUPyiwrYJFskUPiHa7hkeR8VUtAeFoSYbKedZNsDvCN"),
            pubkey!("g6eRCbboSwK4tSWngn773RCMexr1APQr4uA9bGZBYfo"),
        ),
        (
            pubkey!("mSoLzYCxHdYgdzU16g5QSh3i5K3z3KZK7ytfqcJm7So"),
            pubkey!("E4v1BBgoso9s64TQvmyownAVJbhbEPGyzA3qn4n46qj9"),
        ),
    ]
}

/// Runtime settings assembled from CLI arguments and their environment
/// counterparts by `main.rs`.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub rpc_url: String,
    pub ws_url: String,
    pub wallet_path: String,
    pub pairs: Vec<Pair>,
    pub borrow_amount: u64,
    pub min_profit_bps: i32,
    pub slippage_bps: u16,
    pub poll_interval_ms: u64,
    pub priority_fee_micro: u64,
    pub compute_unit_limit: u32,
    pub flash_loan_program: Pubkey,
    pub flash_token_mint: Pubkey,
    pub dry_run: bool,
    pub use_tip: bool,
    pub tip_region: TipRegion,
    pub tip_lamports: u64,
    pub aggregator_url: String,
    pub lite_quote_url: String,
    pub aggregator_api_key: Option<String>,
    pub max_consecutive_failures: u32,
}

impl BotConfig {
    /// Per-pair probe sizes: a small feeler and the full configured borrow.
    pub fn probe_sizes(&self) -> [u64; 2] {
        [(self.borrow_amount / 10).max(1), self.borrow_amount]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_pairs_resolves_symbols() {
        let pairs = parse_pairs("SOL/USDC, JUP/USDC").unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].label, "SOL/USDC");
        assert_eq!(pairs[0].target_mint(), NATIVE_MINT);
        assert_eq!(pairs[1].quote_mint(), USDC_MINT);
    }

    #[test]
    fn parse_pairs_accepts_raw_mint_target() {
        let mint = Pubkey::new_unique().to_string();
        let pairs = parse_pairs(&format!("{mint}/USDC")).unwrap();
        assert_eq!(pairs[0].target.symbol, None);
        assert_eq!(pairs[0].target.decimals, 6);
    }

    #[test]
    fn parse_pairs_rejects_unknown_quote() {
        assert!(parse_pairs("SOL/NOPE").is_err());
        assert!(parse_pairs("SOL").is_err());
        assert!(parse_pairs("").is_err());
    }

    #[test]
    fn registry_has_unique_mints() {
        let registry = token_registry();
        let mut mints: Vec<_> = registry.iter().map(|t| t.mint).collect();
        mints.sort();
        mints.dedup();
        assert_eq!(mints.len(), registry.len());
    }
}
