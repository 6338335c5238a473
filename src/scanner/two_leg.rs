//! Two-leg scanner: borrow -> target -> borrow.
//!
//! Every scan updates the per-pair best-spread table even when the cycle is
//! unprofitable; only cycles clearing the profit threshold surface as
//! opportunities, with both quotes attached for the composer.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::error::{BotError, Result};
use crate::profit::{compute_profit, GasParams};
use crate::provider::{ProviderGateway, Quote};
use crate::types::{now_ms, ArbitrageOpportunity, BestSpread, Pair};

pub struct TwoLegScanner {
    gateway: Arc<ProviderGateway>,
    best_spreads: DashMap<String, BestSpread>,
    min_profit_bps: i32,
    slippage_bps: u16,
    flash_fee_bps: u16,
    gas: GasParams,
}

impl TwoLegScanner {
    pub fn new(
        gateway: Arc<ProviderGateway>,
        min_profit_bps: i32,
        slippage_bps: u16,
        flash_fee_bps: u16,
        gas: GasParams,
    ) -> Self {
        Self {
            gateway,
            best_spreads: DashMap::new(),
            min_profit_bps,
            slippage_bps,
            flash_fee_bps,
            gas,
        }
    }

    /// Quote both legs for one pair at one borrow size. `Err(NoRoute)` means
    /// the aggregator found no path; `Ok(None)` means routable but below
    /// threshold.
    pub async fn scan_pair(
        &self,
        pair: &Pair,
        borrow: u64,
    ) -> Result<Option<ArbitrageOpportunity>> {
        let leg1 = self
            .quote_leg(pair.quote_mint(), pair.target_mint(), borrow)
            .await?;
        let leg2 = self
            .quote_leg(pair.target_mint(), pair.quote_mint(), leg1.out_amount)
            .await?;

        let breakdown = compute_profit(
            borrow,
            leg1.out_amount,
            leg2.out_amount,
            self.flash_fee_bps,
            &self.gas,
            pair.quote_mint(),
            pair.target_mint(),
        );
        self.record_spread(&pair.label, breakdown.profit_bps);

        if breakdown.profit_bps < self.min_profit_bps {
            debug!(
                pair = %pair.label,
                borrow,
                profit_bps = breakdown.profit_bps,
                hops = leg1.route_hops + leg2.route_hops,
                slippage_bps = leg1.slippage_bps,
                "below threshold"
            );
            return Ok(None);
        }

        Ok(Some(ArbitrageOpportunity {
            token_a: pair.quote_mint(),
            token_b: pair.target_mint(),
            borrow_amount: borrow,
            leg1_out: leg1.out_amount,
            leg2_out: leg2.out_amount,
            flash_fee: breakdown.flash_fee,
            sol_costs_in_token: breakdown.gas_in_token,
            expected_profit: breakdown.expected_profit,
            profit_bps: breakdown.profit_bps,
            price_impact_leg1: leg1.price_impact_pct,
            price_impact_leg2: leg2.price_impact_pct,
            timestamp_ms: now_ms(),
            quote_leg1: leg1,
            quote_leg2: leg2,
            pair: pair.clone(),
        }))
    }

    async fn quote_leg(
        &self,
        input: solana_sdk::pubkey::Pubkey,
        output: solana_sdk::pubkey::Pubkey,
        amount: u64,
    ) -> Result<Quote> {
        if amount == 0 {
            return Err(BotError::NoRoute);
        }
        let quote = self
            .gateway
            .quote(input, output, amount, self.slippage_bps, false)
            .await?;
        if quote.out_amount == 0 {
            return Err(BotError::NoRoute);
        }
        Ok(quote)
    }

    fn record_spread(&self, label: &str, bps: i32) {
        self.best_spreads
            .entry(label.to_string())
            .and_modify(|s| s.observe(bps))
            .or_insert(BestSpread {
                bps,
                timestamp_ms: now_ms(),
            });
    }

    pub fn best_spread(&self, label: &str) -> Option<BestSpread> {
        self.best_spreads.get(label).map(|s| *s)
    }

    /// Spread table as `pair=bps` fragments, best first, for the summary log.
    pub fn spread_summary(&self) -> String {
        let mut entries: Vec<(String, i32)> = self
            .best_spreads
            .iter()
            .map(|e| (e.key().clone(), e.bps))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries
            .into_iter()
            .map(|(label, bps)| format!("{label}={bps}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NATIVE_MINT, USDC_MINT};
    use crate::provider::testing::{stub_gateway, ScriptedSource};
    use crate::types::TokenInfo;

    fn sol_usdc() -> Pair {
        Pair::new(
            TokenInfo::known("SOL", NATIVE_MINT, 9),
            TokenInfo::known("USDC", USDC_MINT, 6),
        )
    }

    fn gas() -> GasParams {
        GasParams {
            priority_fee_micro: 25_000,
            compute_unit_limit: 400_000,
            tip_lamports: 0,
            use_tip: false,
        }
    }

    /// Gateway whose quotes multiply the input by a fixed ratio per leg
    /// direction: borrow->target returns `num/den`, target->borrow 1:1.
    fn scanner_with_ratio(leg2_num: u64, leg2_den: u64, min_profit_bps: i32) -> TwoLegScanner {
        let source = ScriptedSource::new("lite", move |req| {
            let out = if req.input_mint == USDC_MINT {
                // borrow -> target: 1000 USDC buys 5 SOL
                req.amount / 200
            } else {
                // target -> borrow
                req.amount.saturating_mul(leg2_num) / leg2_den * 200
            };
            Ok(Quote::synthetic(req.input_mint, req.output_mint, req.amount, out))
        });
        let primary = ScriptedSource::new("aggregator", |req| {
            Ok(Quote::synthetic(req.input_mint, req.output_mint, req.amount, req.amount))
        });
        TwoLegScanner::new(
            Arc::new(stub_gateway(source, primary)),
            min_profit_bps,
            50,
            9,
            gas(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn profitable_pair_emits_opportunity_with_quotes() {
        // Leg 2 returns 1% more than it took in.
        let scanner = scanner_with_ratio(101, 100, 5);
        let pair = sol_usdc();
        let opp = scanner
            .scan_pair(&pair, 1_000_000_000)
            .await
            .unwrap()
            .expect("expected an opportunity");

        assert_eq!(opp.borrow_amount, 1_000_000_000);
        assert_eq!(opp.leg1_out, 5_000_000);
        assert_eq!(opp.quote_leg1.out_amount, opp.leg1_out);
        assert_eq!(opp.quote_leg2.in_amount, opp.leg1_out);
        assert!(opp.profit_bps >= 5);
        assert!(opp.expected_profit > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn flat_market_updates_spread_but_emits_nothing() {
        let scanner = scanner_with_ratio(1, 1, 5);
        let pair = sol_usdc();
        let result = scanner.scan_pair(&pair, 1_000_000_000).await.unwrap();
        assert!(result.is_none());

        let spread = scanner.best_spread(&pair.label).expect("spread recorded");
        assert!(spread.bps < 0);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_output_is_no_route() {
        let source = ScriptedSource::new("lite", |req| {
            Ok(Quote::synthetic(req.input_mint, req.output_mint, req.amount, 0))
        });
        let primary = ScriptedSource::new("aggregator", |req| {
            Ok(Quote::synthetic(req.input_mint, req.output_mint, req.amount, 0))
        });
        let scanner = TwoLegScanner::new(
            Arc::new(stub_gateway(source, primary)),
            5,
            50,
            9,
            gas(),
        );
        let err = scanner.scan_pair(&sol_usdc(), 1_000_000).await.unwrap_err();
        assert!(matches!(err, BotError::NoRoute));
    }

    #[tokio::test(start_paused = true)]
    async fn spread_summary_orders_best_first() {
        let scanner = scanner_with_ratio(1, 1, 5);
        scanner.record_spread("A/USDC", -10);
        scanner.record_spread("B/USDC", 20);
        let summary = scanner.spread_summary();
        assert!(summary.starts_with("B/USDC=20"));
        assert!(summary.contains("A/USDC=-10"));
    }
}
