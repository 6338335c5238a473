//! Core data model: pairs, opportunities, spread telemetry.
//!
//! Scanners only ever emit opportunities that already carry their quotes;
//! the composer consumes those quotes verbatim and re-fetches nothing but
//! the per-leg swap-instruction bundles.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use solana_sdk::pubkey::Pubkey;

use crate::provider::Quote;

/// Milliseconds since the UNIX epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Token metadata. Symbol may be absent for dynamically discovered mints;
/// decimals default to 6 for unknown tokens.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub symbol: Option<String>,
    pub mint: Pubkey,
    pub decimals: u8,
}

impl TokenInfo {
    pub fn known(symbol: &str, mint: Pubkey, decimals: u8) -> Self {
        Self {
            symbol: Some(symbol.to_string()),
            mint,
            decimals,
        }
    }

    pub fn unknown(mint: Pubkey) -> Self {
        Self {
            symbol: None,
            mint,
            decimals: 6,
        }
    }

    /// Short printable name: the symbol if known, otherwise a mint prefix.
    pub fn display(&self) -> String {
        match &self.symbol {
            Some(s) => s.clone(),
            None => {
                let b58 = self.mint.to_string();
                b58[..b58.len().min(8)].to_string()
            }
        }
    }
}

/// An ordered trading pair `TARGET/QUOTE`. The quote side is always the
/// flash-loan token.
#[derive(Debug, Clone)]
pub struct Pair {
    pub label: String,
    pub target: TokenInfo,
    pub quote: TokenInfo,
}

impl Pair {
    pub fn new(target: TokenInfo, quote: TokenInfo) -> Self {
        let label = format!("{}/{}", target.display(), quote.display());
        Self {
            label,
            target,
            quote,
        }
    }

    pub fn target_mint(&self) -> Pubkey {
        self.target.mint
    }

    pub fn quote_mint(&self) -> Pubkey {
        self.quote.mint
    }
}

/// Two-leg opportunity: borrow -> target -> borrow. Both quotes attached.
#[derive(Debug, Clone)]
pub struct ArbitrageOpportunity {
    pub pair: Pair,
    /// Borrow (flash-loan) token.
    pub token_a: Pubkey,
    pub token_b: Pubkey,
    pub borrow_amount: u64,
    pub leg1_out: u64,
    pub leg2_out: u64,
    pub flash_fee: u64,
    pub sol_costs_in_token: u64,
    pub expected_profit: i128,
    pub profit_bps: i32,
    pub price_impact_leg1: f64,
    pub price_impact_leg2: f64,
    pub timestamp_ms: u64,
    pub quote_leg1: Quote,
    pub quote_leg2: Quote,
}

/// A static triangular route: borrow -> B -> C -> borrow.
#[derive(Debug, Clone)]
pub struct TriangularRoute {
    pub name: &'static str,
    pub token_a: Pubkey,
    pub token_b: Pubkey,
    pub token_c: Pubkey,
    pub borrow_amount: u64,
}

#[derive(Debug, Clone)]
pub struct TriangularOpportunity {
    pub route: TriangularRoute,
    pub leg1_out: u64,
    pub leg2_out: u64,
    pub leg3_out: u64,
    pub flash_fee: u64,
    pub sol_costs_in_token: u64,
    pub expected_profit: i128,
    pub profit_bps: i32,
    pub timestamp_ms: u64,
    pub quote_leg1: Quote,
    pub quote_leg2: Quote,
    pub quote_leg3: Quote,
}

/// Best observed spread for a pair, kept even when below threshold.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BestSpread {
    pub bps: i32,
    pub timestamp_ms: u64,
}

impl BestSpread {
    pub fn observe(&mut self, bps: i32) {
        if bps > self.bps {
            self.bps = bps;
            self.timestamp_ms = now_ms();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_label_uses_symbols_when_known() {
        let target = TokenInfo::known("JUP", Pubkey::new_unique(), 6);
        let quote = TokenInfo::known("USDC", Pubkey::new_unique(), 6);
        let pair = Pair::new(target, quote);
        assert_eq!(pair.label, "JUP/USDC");
    }

    #[test]
    fn unknown_token_displays_mint_prefix() {
        let mint = Pubkey::new_unique();
        let info = TokenInfo::unknown(mint);
        assert_eq!(info.decimals, 6);
        assert_eq!(info.display(), mint.to_string()[..8].to_string());
    }

    #[test]
    fn best_spread_keeps_maximum() {
        let mut spread = BestSpread {
            bps: 10,
            timestamp_ms: 0,
        };
        spread.observe(5);
        assert_eq!(spread.bps, 10);
        spread.observe(25);
        assert_eq!(spread.bps, 25);
    }
}
