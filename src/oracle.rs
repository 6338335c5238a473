//! On-chain price-feed reader.
//!
//! Decodes oracle accounts at fixed byte offsets and compares DEX-implied
//! prices against the feed. Advisory only: a large deviation is logged,
//! never blocks execution, and the reads stay out of the hot path behind a
//! per-mint cache window.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::pubkey::Pubkey;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::{ORACLE_CACHE_WINDOW_MS, ORACLE_DEVIATION_WARN_BPS, ORACLE_STALE_SLOTS};

// Fixed offsets into the feed account layout.
const EXPO_OFFSET: usize = 20;
const PRICE_OFFSET: usize = 208;
const CONF_OFFSET: usize = 216;
const SLOT_OFFSET: usize = 240;
const MIN_ACCOUNT_LEN: usize = 248;

#[derive(Debug, Clone, Copy)]
pub struct OraclePrice {
    pub price: i64,
    pub confidence: u64,
    pub exponent: i32,
    pub slot: u64,
    /// Feed has not published for more than `ORACLE_STALE_SLOTS` slots.
    pub stale: bool,
}

impl OraclePrice {
    /// Price as a unit value, exponent applied.
    pub fn value(&self) -> f64 {
        self.price as f64 * 10f64.powi(self.exponent)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DeviationReport {
    pub deviation_bps: i64,
    pub dex_price: f64,
    pub oracle_price: f64,
    pub stale: bool,
}

pub struct OracleReader {
    rpc: Arc<RpcClient>,
    feeds: HashMap<Pubkey, Pubkey>,
    cache: DashMap<Pubkey, (OraclePrice, Instant)>,
}

impl OracleReader {
    pub fn new(rpc: Arc<RpcClient>, feeds: Vec<(Pubkey, Pubkey)>) -> Self {
        Self {
            rpc,
            feeds: feeds.into_iter().collect(),
            cache: DashMap::new(),
        }
    }

    /// Latest price for `mint`, if a feed is configured. Stale prices are
    /// still returned, annotated.
    pub async fn price(&self, mint: Pubkey) -> Option<OraclePrice> {
        let feed = *self.feeds.get(&mint)?;
        if let Some(entry) = self.cache.get(&mint) {
            let (price, fetched) = *entry;
            if fetched.elapsed().as_millis() as u64 <= ORACLE_CACHE_WINDOW_MS {
                return Some(price);
            }
        }

        let account = match self.rpc.get_account(&feed).await {
            Ok(account) => account,
            Err(e) => {
                debug!(%mint, %feed, error = %e, "oracle account fetch failed");
                return None;
            }
        };
        let mut price = decode_price_account(&account.data)?;
        if let Ok(current_slot) = self.rpc.get_slot().await {
            price.stale = current_slot.saturating_sub(price.slot) > ORACLE_STALE_SLOTS;
        }
        self.cache.insert(mint, (price, Instant::now()));
        Some(price)
    }

    /// Compare a DEX-implied price to the oracle. Returns `None` when either
    /// side has no feed.
    pub async fn validate_quote(
        &self,
        in_mint: Pubkey,
        out_mint: Pubkey,
        in_amount: u64,
        out_amount: u64,
        in_decimals: u8,
        out_decimals: u8,
    ) -> Option<DeviationReport> {
        if in_amount == 0 || out_amount == 0 {
            return None;
        }
        let in_price = self.price(in_mint).await?;
        let out_price = self.price(out_mint).await?;

        let dex_price = (out_amount as f64 / 10f64.powi(out_decimals as i32))
            / (in_amount as f64 / 10f64.powi(in_decimals as i32));
        let oracle_price = in_price.value() / out_price.value();
        if !oracle_price.is_finite() || oracle_price <= 0.0 {
            return None;
        }

        let report = DeviationReport {
            deviation_bps: deviation_bps(dex_price, oracle_price),
            dex_price,
            oracle_price,
            stale: in_price.stale || out_price.stale,
        };
        if report.deviation_bps.abs() > ORACLE_DEVIATION_WARN_BPS {
            warn!(
                %in_mint,
                %out_mint,
                deviation_bps = report.deviation_bps,
                dex_price = report.dex_price,
                oracle_price = report.oracle_price,
                stale = report.stale,
                "DEX price deviates from oracle"
            );
        }
        Some(report)
    }
}

fn deviation_bps(dex_price: f64, oracle_price: f64) -> i64 {
    ((dex_price - oracle_price) / oracle_price * 10_000.0).round() as i64
}

fn decode_price_account(data: &[u8]) -> Option<OraclePrice> {
    if data.len() < MIN_ACCOUNT_LEN {
        return None;
    }
    let exponent = i32::from_le_bytes(data[EXPO_OFFSET..EXPO_OFFSET + 4].try_into().ok()?);
    let price = i64::from_le_bytes(data[PRICE_OFFSET..PRICE_OFFSET + 8].try_into().ok()?);
    let confidence = u64::from_le_bytes(data[CONF_OFFSET..CONF_OFFSET + 8].try_into().ok()?);
    let slot = u64::from_le_bytes(data[SLOT_OFFSET..SLOT_OFFSET + 8].try_into().ok()?);
    if price <= 0 {
        return None;
    }
    Some(OraclePrice {
        price,
        confidence,
        exponent,
        slot,
        stale: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_account(price: i64, confidence: u64, exponent: i32, slot: u64) -> Vec<u8> {
        let mut data = vec![0u8; MIN_ACCOUNT_LEN];
        data[EXPO_OFFSET..EXPO_OFFSET + 4].copy_from_slice(&exponent.to_le_bytes());
        data[PRICE_OFFSET..PRICE_OFFSET + 8].copy_from_slice(&price.to_le_bytes());
        data[CONF_OFFSET..CONF_OFFSET + 8].copy_from_slice(&confidence.to_le_bytes());
        data[SLOT_OFFSET..SLOT_OFFSET + 8].copy_from_slice(&slot.to_le_bytes());
        data
    }

    #[test]
    fn decode_reads_fixed_offsets() {
        let data = feed_account(14_000_000_000, 5_000_000, -8, 123_456);
        let price = decode_price_account(&data).unwrap();
        assert_eq!(price.price, 14_000_000_000);
        assert_eq!(price.confidence, 5_000_000);
        assert_eq!(price.exponent, -8);
        assert_eq!(price.slot, 123_456);
        assert!((price.value() - 140.0).abs() < 1e-9);
    }

    #[test]
    fn decode_rejects_short_or_nonpositive() {
        assert!(decode_price_account(&[0u8; 100]).is_none());
        let data = feed_account(-1, 0, -8, 1);
        assert!(decode_price_account(&data).is_none());
    }

    #[test]
    fn deviation_is_signed_and_rounded() {
        // DEX 1% above oracle -> +100 bps
        assert_eq!(deviation_bps(1.01, 1.0), 100);
        assert_eq!(deviation_bps(0.99, 1.0), -100);
        assert_eq!(deviation_bps(1.00004, 1.0), 0);
        assert_eq!(deviation_bps(1.00006, 1.0), 1);
    }
}
