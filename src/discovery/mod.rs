//! Discovery side channels: new-pool detection and backrun signals.
//!
//! Listener tasks are best-effort. They swallow their own errors into debug
//! logs and talk to the orchestrator over a single mpsc channel; the
//! orchestrator handles events on its own task between scan phases.

mod backrun;
mod pool_listener;

pub use backrun::BackrunListener;
pub use pool_listener::PoolDiscoveryListener;

use std::collections::{HashSet, VecDeque};

use solana_sdk::pubkey::Pubkey;

use crate::config::{SEEN_SIGNATURES_CAP, SEEN_SIGNATURES_RETAIN};

/// Where a new-pool candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolSource {
    /// Venue-program log stream.
    LogStream,
    /// Pair-listing HTTP poll.
    Listing,
}

#[derive(Debug, Clone)]
pub struct NewPoolEvent {
    pub source: PoolSource,
    pub signature: Option<String>,
    pub mints: Vec<Pubkey>,
}

/// A large swap worth probing for a follow-up arbitrage.
#[derive(Debug, Clone)]
pub struct BackrunSignal {
    pub signature: String,
    pub token_in: Pubkey,
    pub token_out: Pubkey,
    pub amount_in: u64,
    pub amount_out: u64,
}

#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    NewPool(NewPoolEvent),
    Backrun(BackrunSignal),
}

/// Bounded first-seen set of transaction signatures. On overflow the oldest
/// half is discarded, keeping the most recent entries.
pub struct SeenSignatures {
    set: HashSet<String>,
    order: VecDeque<String>,
    cap: usize,
    retain: usize,
}

impl SeenSignatures {
    pub fn new() -> Self {
        Self::with_bounds(SEEN_SIGNATURES_CAP, SEEN_SIGNATURES_RETAIN)
    }

    pub fn with_bounds(cap: usize, retain: usize) -> Self {
        Self {
            set: HashSet::with_capacity(cap),
            order: VecDeque::with_capacity(cap),
            cap,
            retain,
        }
    }

    /// Record a signature. Returns `true` the first time it is seen.
    pub fn insert(&mut self, signature: &str) -> bool {
        if self.set.contains(signature) {
            return false;
        }
        if self.order.len() >= self.cap {
            while self.order.len() > self.retain {
                if let Some(old) = self.order.pop_front() {
                    self.set.remove(&old);
                }
            }
        }
        self.set.insert(signature.to_string());
        self.order.push_back(signature.to_string());
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }
}
