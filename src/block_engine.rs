//! Block-engine client: priority-auction submission path.
//!
//! Transactions ranked by a tip transfer are posted to a regional endpoint
//! as JSON-RPC over HTTP, base58-encoded. Bundles carry 1-5 ordered
//! transactions; the caller guarantees the last one includes the tip.

use rand::seq::SliceRandom;
use reqwest::StatusCode;
use serde_json::{json, Value};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::VersionedTransaction;
use std::time::Duration;

use crate::config::{TipRegion, REQUEST_TIMEOUT_MS, TIP_ACCOUNTS};
use crate::error::{BotError, Result};

pub const MAX_BUNDLE_TRANSACTIONS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleStatus {
    Invalid,
    Pending,
    Failed,
    Landed,
}

impl BundleStatus {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "Invalid" => Some(Self::Invalid),
            "Pending" => Some(Self::Pending),
            "Failed" => Some(Self::Failed),
            "Landed" => Some(Self::Landed),
            _ => None,
        }
    }
}

pub struct BlockEngineClient {
    http: reqwest::Client,
    base_url: String,
}

impl BlockEngineClient {
    pub fn new(region: TipRegion) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: region.base_url().to_string(),
        }
    }

    /// One tip account, chosen uniformly at random per submission.
    pub fn random_tip_account() -> Pubkey {
        *TIP_ACCOUNTS
            .choose(&mut rand::thread_rng())
            .expect("tip account list is non-empty")
    }

    /// Submit a single tipped transaction. Returns its signature.
    pub async fn send_transaction(&self, tx: &VersionedTransaction) -> Result<String> {
        let encoded = encode_base58(tx)?;
        let result = self
            .rpc_call(
                "/api/v1/transactions",
                "sendTransaction",
                json!([encoded, {"encoding": "base58"}]),
            )
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| BotError::Payload("sendTransaction result is not a string".into()))
    }

    /// Submit 1-5 ordered transactions as one bundle. Returns the bundle id.
    /// The caller guarantees the last transaction carries the tip transfer.
    #[allow(dead_code)]
    pub async fn send_bundle(&self, txs: &[VersionedTransaction]) -> Result<String> {
        if txs.is_empty() || txs.len() > MAX_BUNDLE_TRANSACTIONS {
            return Err(BotError::Payload(format!(
                "bundle must hold 1-{MAX_BUNDLE_TRANSACTIONS} transactions, got {}",
                txs.len()
            )));
        }
        let encoded = txs
            .iter()
            .map(encode_base58)
            .collect::<Result<Vec<_>>>()?;
        let result = self
            .rpc_call(
                "/api/v1/bundles",
                "sendBundle",
                json!([encoded, {"encoding": "base58"}]),
            )
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| BotError::Payload("sendBundle result is not a string".into()))
    }

    /// Poll in-flight bundle statuses.
    #[allow(dead_code)]
    pub async fn get_bundle_statuses(&self, bundle_ids: &[String]) -> Result<Vec<BundleStatus>> {
        let result = self
            .rpc_call("/api/v1/bundles", "getBundleStatuses", json!([bundle_ids]))
            .await?;
        Ok(parse_statuses(&result))
    }

    async fn rpc_call(&self, path: &str, method: &str, params: Value) -> Result<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .timeout(Duration::from_millis(REQUEST_TIMEOUT_MS))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BotError::Timeout {
                        ms: REQUEST_TIMEOUT_MS,
                    }
                } else {
                    BotError::Http(e)
                }
            })?;

        let status = response.status();
        let body = response.text().await?;
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(BotError::ProviderRateLimited);
        }
        if !status.is_success() {
            return Err(BotError::ProviderRequest {
                status: status.as_u16(),
                body,
            });
        }
        let value: Value = serde_json::from_str(&body)?;
        if let Some(error) = value.get("error") {
            return Err(BotError::ChainError {
                err: error.to_string(),
            });
        }
        value
            .get("result")
            .cloned()
            .ok_or_else(|| BotError::Payload("block-engine response missing result".into()))
    }
}

fn encode_base58(tx: &VersionedTransaction) -> Result<String> {
    let bytes = bincode::serialize(tx).map_err(|e| BotError::Build(e.to_string()))?;
    Ok(bs58::encode(bytes).into_string())
}

fn parse_statuses(result: &Value) -> Vec<BundleStatus> {
    result
        .get("value")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .map(|entry| {
                    entry
                        .get("status")
                        .and_then(Value::as_str)
                        .and_then(BundleStatus::parse)
                        .unwrap_or(BundleStatus::Invalid)
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tip_account_comes_from_the_fixed_list() {
        for _ in 0..32 {
            let account = BlockEngineClient::random_tip_account();
            assert!(TIP_ACCOUNTS.contains(&account));
        }
    }

    #[test]
    fn statuses_parse_all_variants() {
        let result = json!({
            "value": [
                {"bundle_id": "a", "status": "Landed"},
                {"bundle_id": "b", "status": "Pending"},
                {"bundle_id": "c", "status": "Failed"},
                {"bundle_id": "d", "status": "Bogus"},
            ]
        });
        assert_eq!(
            parse_statuses(&result),
            vec![
                BundleStatus::Landed,
                BundleStatus::Pending,
                BundleStatus::Failed,
                BundleStatus::Invalid,
            ]
        );
    }

    #[tokio::test]
    async fn oversized_bundle_is_rejected_locally() {
        let client = BlockEngineClient::new(TipRegion::Default);
        let txs = vec![VersionedTransaction::default(); 6];
        let err = client.send_bundle(&txs).await.unwrap_err();
        assert!(matches!(err, BotError::Payload(_)));
    }

    #[test]
    fn regions_map_to_distinct_hosts() {
        let urls: Vec<&str> = [
            TipRegion::Default,
            TipRegion::Ny,
            TipRegion::Amsterdam,
            TipRegion::Frankfurt,
            TipRegion::Tokyo,
            TipRegion::Slc,
        ]
        .iter()
        .map(|r| r.base_url())
        .collect();
        let mut unique = urls.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), urls.len());
    }
}
