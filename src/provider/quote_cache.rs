//! Short-TTL quote cache.
//!
//! Keyed by `(input_mint, output_mint, in_amount)`. Entries older than the
//! TTL are ignored on read; inserts over the size bound prune expired
//! entries first and clear outright if pruning was not enough.

use dashmap::DashMap;
use solana_sdk::pubkey::Pubkey;
use tokio::time::Instant;

use super::Quote;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QuoteKey {
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub in_amount: u64,
}

struct CachedQuote {
    quote: Quote,
    inserted: Instant,
}

pub struct QuoteCache {
    entries: DashMap<QuoteKey, CachedQuote>,
    ttl_ms: u64,
    max_entries: usize,
}

impl QuoteCache {
    pub fn new(ttl_ms: u64, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl_ms,
            max_entries,
        }
    }

    pub fn get(&self, key: &QuoteKey) -> Option<Quote> {
        let entry = self.entries.get(key)?;
        if entry.inserted.elapsed().as_millis() as u64 > self.ttl_ms {
            return None;
        }
        Some(entry.quote.clone())
    }

    pub fn insert(&self, key: QuoteKey, quote: Quote) {
        if self.entries.len() > self.max_entries {
            let ttl_ms = self.ttl_ms;
            self.entries
                .retain(|_, v| v.inserted.elapsed().as_millis() as u64 <= ttl_ms);
            if self.entries.len() > self.max_entries {
                self.entries.clear();
            }
        }
        self.entries.insert(
            key,
            CachedQuote {
                quote,
                inserted: Instant::now(),
            },
        );
    }

    pub fn drain(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn quote_for(key: &QuoteKey, out: u64) -> Quote {
        Quote::synthetic(key.input_mint, key.output_mint, key.in_amount, out)
    }

    fn key(amount: u64) -> QuoteKey {
        QuoteKey {
            input_mint: Pubkey::new_unique(),
            output_mint: Pubkey::new_unique(),
            in_amount: amount,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hit_within_ttl_returns_equal_quote() {
        let cache = QuoteCache::new(5_000, 200);
        let k = key(1_000_000);
        let q = quote_for(&k, 42);
        cache.insert(k, q.clone());

        tokio::time::advance(Duration::from_millis(4_000)).await;
        assert_eq!(cache.get(&k), Some(q));
    }

    #[tokio::test(start_paused = true)]
    async fn entry_expires_after_ttl() {
        let cache = QuoteCache::new(5_000, 200);
        let k = key(1_000_000);
        cache.insert(k, quote_for(&k, 42));

        tokio::time::advance(Duration::from_millis(5_001)).await;
        assert_eq!(cache.get(&k), None);
    }

    #[tokio::test(start_paused = true)]
    async fn over_bound_insert_prunes_expired() {
        let cache = QuoteCache::new(5_000, 3);
        for amount in 0..4 {
            let k = key(amount);
            cache.insert(k, quote_for(&k, amount));
        }
        tokio::time::advance(Duration::from_millis(6_000)).await;

        // All four are expired; the next insert prunes them.
        let k = key(99);
        cache.insert(k, quote_for(&k, 99));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&k).is_some());
    }

    #[tokio::test]
    async fn drain_clears_everything() {
        let cache = QuoteCache::new(5_000, 200);
        let k = key(7);
        cache.insert(k, quote_for(&k, 7));
        cache.drain();
        assert_eq!(cache.len(), 0);
    }
}
