//! Triangular scanner: borrow -> B -> C -> borrow over a static catalog.
//!
//! Routes are quoted with direct routes only so the composed three-leg
//! transaction stays under the wire-size limit. Scanning is deliberately
//! sequential and batched: a fixed slice of the catalog per cycle, first
//! profitable route wins. Triangular hits are rare; fanning out would waste
//! rate budget for nothing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::config::{resolve_token, TRIANGULAR_BATCH_SIZE};
use crate::error::{BotError, Result};
use crate::profit::{compute_profit, GasParams};
use crate::provider::{ProviderGateway, Quote};
use crate::types::{now_ms, TriangularOpportunity, TriangularRoute};

fn mint(symbol: &str) -> solana_sdk::pubkey::Pubkey {
    resolve_token(symbol).expect("catalog symbol in registry").mint
}

fn route(name: &'static str, b: &str, c: &str, borrow_amount: u64) -> TriangularRoute {
    TriangularRoute {
        name,
        token_a: mint("USDC"),
        token_b: mint(b),
        token_c: mint(c),
        borrow_amount,
    }
}

/// The static route catalog, grouped by category. All routes borrow USDC.
pub fn route_catalog() -> Vec<TriangularRoute> {
    let mut routes = Vec::new();

    // SOL-hub blue chips
    routes.push(route("usdc-sol-jup", "SOL", "JUP", 500_000_000));
    routes.push(route("usdc-sol-jto", "SOL", "JTO", 500_000_000));
    routes.push(route("usdc-sol-ray", "SOL", "RAY", 500_000_000));
    routes.push(route("usdc-sol-orca", "SOL", "ORCA", 500_000_000));
    routes.push(route("usdc-sol-pyth", "SOL", "PYTH", 500_000_000));
    routes.push(route("usdc-sol-wif", "SOL", "WIF", 500_000_000));

    // Liquid-staking tokens
    routes.push(route("usdc-sol-msol", "SOL", "MSOL", 500_000_000));
    routes.push(route("usdc-sol-jitosol", "SOL", "JITOSOL", 500_000_000));
    routes.push(route("usdc-sol-bsol", "SOL", "BSOL", 500_000_000));
    routes.push(route("usdc-sol-inf", "SOL", "INF", 500_000_000));

    // Meme triangles, smaller sizes
    routes.push(route("usdc-sol-bonk", "SOL", "BONK", 200_000_000));
    routes.push(route("usdc-sol-wen", "SOL", "WEN", 200_000_000));
    routes.push(route("usdc-sol-popcat", "SOL", "POPCAT", 200_000_000));
    routes.push(route("usdc-bonk-wif", "BONK", "WIF", 200_000_000));

    // Stablecoin legs
    routes.push(route("usdc-usdt-sol", "USDT", "SOL", 1_000_000_000));
    routes.push(route("usdc-usdt-jup", "USDT", "JUP", 1_000_000_000));
    routes.push(route("usdc-usdt-bonk", "USDT", "BONK", 500_000_000));

    // Reverse direction of the hub routes
    routes.push(route("usdc-jup-sol", "JUP", "SOL", 500_000_000));
    routes.push(route("usdc-jto-sol", "JTO", "SOL", 500_000_000));
    routes.push(route("usdc-ray-sol", "RAY", "SOL", 500_000_000));
    routes.push(route("usdc-msol-sol", "MSOL", "SOL", 500_000_000));
    routes.push(route("usdc-jitosol-sol", "JITOSOL", "SOL", 500_000_000));
    routes.push(route("usdc-bonk-sol", "BONK", "SOL", 200_000_000));
    routes.push(route("usdc-wif-sol", "WIF", "SOL", 200_000_000));

    // No-hub triangles
    routes.push(route("usdc-jup-jto", "JUP", "JTO", 200_000_000));
    routes.push(route("usdc-jup-pyth", "JUP", "PYTH", 200_000_000));
    routes.push(route("usdc-ray-orca", "RAY", "ORCA", 200_000_000));
    routes.push(route("usdc-orca-ray", "ORCA", "RAY", 200_000_000));
    routes.push(route("usdc-msol-jitosol", "MSOL", "JITOSOL", 500_000_000));

    routes
}

pub struct TriangularScanner {
    gateway: Arc<ProviderGateway>,
    routes: Vec<TriangularRoute>,
    offset: AtomicUsize,
    batch_size: usize,
    min_profit_bps: i32,
    slippage_bps: u16,
    flash_fee_bps: u16,
    gas: GasParams,
}

impl TriangularScanner {
    pub fn new(
        gateway: Arc<ProviderGateway>,
        routes: Vec<TriangularRoute>,
        min_profit_bps: i32,
        slippage_bps: u16,
        flash_fee_bps: u16,
        gas: GasParams,
    ) -> Self {
        Self {
            gateway,
            routes,
            offset: AtomicUsize::new(0),
            batch_size: TRIANGULAR_BATCH_SIZE,
            min_profit_bps,
            slippage_bps,
            flash_fee_bps,
            gas,
        }
    }

    /// Scan the next catalog slice; the first route clearing the threshold
    /// wins the cycle.
    pub async fn scan_next_batch(&self) -> Result<Option<TriangularOpportunity>> {
        if self.routes.is_empty() {
            return Ok(None);
        }
        let start = self.offset.fetch_add(self.batch_size, Ordering::Relaxed) % self.routes.len();
        for i in 0..self.batch_size.min(self.routes.len()) {
            let route = &self.routes[(start + i) % self.routes.len()];
            match self.scan_route(route).await {
                Ok(Some(opportunity)) => return Ok(Some(opportunity)),
                Ok(None) => {}
                Err(e) if e.is_no_opportunity() => {}
                Err(e) => debug!(route = route.name, error = %e, "triangular scan failed"),
            }
        }
        Ok(None)
    }

    async fn scan_route(&self, route: &TriangularRoute) -> Result<Option<TriangularOpportunity>> {
        let leg1 = self
            .quote_leg(route.token_a, route.token_b, route.borrow_amount)
            .await?;
        let leg2 = self
            .quote_leg(route.token_b, route.token_c, leg1.out_amount)
            .await?;
        let leg3 = self
            .quote_leg(route.token_c, route.token_a, leg2.out_amount)
            .await?;

        let breakdown = compute_profit(
            route.borrow_amount,
            leg1.out_amount,
            leg3.out_amount,
            self.flash_fee_bps,
            &self.gas,
            route.token_a,
            route.token_b,
        );

        if breakdown.profit_bps < self.min_profit_bps {
            return Ok(None);
        }

        debug!(
            route = route.name,
            profit_bps = breakdown.profit_bps,
            expected = breakdown.expected_profit,
            hops = leg1.route_hops + leg2.route_hops + leg3.route_hops,
            "triangular candidate"
        );

        Ok(Some(TriangularOpportunity {
            route: route.clone(),
            leg1_out: leg1.out_amount,
            leg2_out: leg2.out_amount,
            leg3_out: leg3.out_amount,
            flash_fee: breakdown.flash_fee,
            sol_costs_in_token: breakdown.gas_in_token,
            expected_profit: breakdown.expected_profit,
            profit_bps: breakdown.profit_bps,
            timestamp_ms: now_ms(),
            quote_leg1: leg1,
            quote_leg2: leg2,
            quote_leg3: leg3,
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
        // direct_only keeps the composed three-leg transaction within the
        // encoded-size limit.
        let quote = self
            .gateway
            .quote(input, output, amount, self.slippage_bps, true)
            .await?;
        if quote.out_amount == 0 {
            return Err(BotError::NoRoute);
        }
        Ok(quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::USDC_MINT;
    use crate::provider::testing::{stub_gateway, ScriptedSource};

    fn gas() -> GasParams {
        GasParams {
            priority_fee_micro: 25_000,
            compute_unit_limit: 600_000,
            tip_lamports: 0,
            use_tip: false,
        }
    }

    #[test]
    fn catalog_routes_borrow_usdc_and_are_distinct() {
        let routes = route_catalog();
        assert!(routes.len() >= 25);
        let mut names: Vec<_> = routes.iter().map(|r| r.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), routes.len());
        for route in &routes {
            assert_eq!(route.token_a, USDC_MINT, "route {} must borrow USDC", route.name);
            assert_ne!(route.token_b, route.token_c, "route {} is degenerate", route.name);
            assert!(route.borrow_amount > 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn batch_offset_rotates_and_wraps() {
        // A gateway that never routes, so scans exercise only the rotation.
        let none = ScriptedSource::new("lite", |req| {
            Ok(Quote::synthetic(req.input_mint, req.output_mint, req.amount, 0))
        });
        let primary = ScriptedSource::new("aggregator", |req| {
            Ok(Quote::synthetic(req.input_mint, req.output_mint, req.amount, 0))
        });
        let scanner = TriangularScanner::new(
            Arc::new(stub_gateway(none, primary)),
            route_catalog(),
            5,
            50,
            9,
            gas(),
        );

        let total = scanner.routes.len();
        assert!(total < 30, "three batches must wrap the catalog");
        assert!(scanner.scan_next_batch().await.unwrap().is_none());
        assert!(scanner.scan_next_batch().await.unwrap().is_none());
        assert!(scanner.scan_next_batch().await.unwrap().is_none());
        // The fourth batch starts inside the catalog again, past the wrap.
        let next_start = scanner.offset.load(Ordering::Relaxed) % total;
        assert_eq!(next_start, 30 % total);
        assert!(next_start < total);
    }

    #[tokio::test(start_paused = true)]
    async fn profitable_route_is_emitted_with_all_quotes() {
        // Every leg pays out 2% over its input.
        let growing = ScriptedSource::new("lite", |req| {
            Ok(Quote::synthetic(
                req.input_mint,
                req.output_mint,
                req.amount,
                req.amount + req.amount / 50,
            ))
        });
        let primary = ScriptedSource::new("aggregator", |req| {
            Ok(Quote::synthetic(req.input_mint, req.output_mint, req.amount, req.amount))
        });
        let scanner = TriangularScanner::new(
            Arc::new(stub_gateway(growing, primary)),
            route_catalog(),
            5,
            50,
            9,
            gas(),
        );

        let opp = scanner
            .scan_next_batch()
            .await
            .unwrap()
            .expect("first route should win");
        assert_eq!(opp.route.name, "usdc-sol-jup");
        assert_eq!(opp.quote_leg2.in_amount, opp.leg1_out);
        assert_eq!(opp.quote_leg3.in_amount, opp.leg2_out);
        assert!(opp.leg3_out > opp.route.borrow_amount);
        assert!(opp.profit_bps > 0);
    }
}
