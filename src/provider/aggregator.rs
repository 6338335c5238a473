//! Aggregator HTTP clients and wire types.
//!
//! Two quote sources share one response shape: the primary aggregator
//! (which also serves swap-instruction bundles) and a free "lite" host used
//! first to spare the paid rate budget. The raw quote JSON is kept verbatim
//! because the swap-instruction endpoint requires it back unmodified.

use async_trait::async_trait;
use base64::Engine;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use std::time::Duration;

use crate::config::{MAX_QUOTE_ACCOUNTS, REQUEST_TIMEOUT_MS};
use crate::error::{BotError, Result};

/// Normalized quote: typed view over the raw aggregator response.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub in_amount: u64,
    pub out_amount: u64,
    pub slippage_bps: u16,
    pub price_impact_pct: f64,
    pub route_hops: usize,
    /// Verbatim response body; passed back when requesting instructions.
    pub raw: Value,
}

impl Quote {
    pub fn from_raw(raw: Value) -> Result<Self> {
        let str_field = |key: &str| -> Result<&str> {
            raw.get(key)
                .and_then(Value::as_str)
                .ok_or_else(|| BotError::Payload(format!("quote missing {key}")))
        };
        let parse_amount = |key: &str| -> Result<u64> {
            str_field(key)?
                .parse::<u64>()
                .map_err(|_| BotError::Payload(format!("quote field {key} is not a u64")))
        };
        let parse_mint = |key: &str| -> Result<Pubkey> {
            str_field(key)?
                .parse::<Pubkey>()
                .map_err(|_| BotError::Payload(format!("quote field {key} is not a pubkey")))
        };

        Ok(Self {
            input_mint: parse_mint("inputMint")?,
            output_mint: parse_mint("outputMint")?,
            in_amount: parse_amount("inAmount")?,
            out_amount: parse_amount("outAmount")?,
            slippage_bps: raw.get("slippageBps").and_then(Value::as_u64).unwrap_or(0) as u16,
            price_impact_pct: raw
                .get("priceImpactPct")
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.0),
            route_hops: raw
                .get("routePlan")
                .and_then(Value::as_array)
                .map(Vec::len)
                .unwrap_or(0),
            raw,
        })
    }

    /// Hand-built quote for tests; the raw blob matches the typed view.
    #[cfg(test)]
    pub fn synthetic(input_mint: Pubkey, output_mint: Pubkey, in_amount: u64, out_amount: u64) -> Self {
        let raw = json!({
            "inputMint": input_mint.to_string(),
            "outputMint": output_mint.to_string(),
            "inAmount": in_amount.to_string(),
            "outAmount": out_amount.to_string(),
            "slippageBps": 50,
            "priceImpactPct": "0.01",
            "routePlan": [{}],
        });
        Quote::from_raw(raw).unwrap()
    }
}

/// Parameters of one quote lookup.
#[derive(Debug, Clone, Copy)]
pub struct QuoteRequest {
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub amount: u64,
    pub slippage_bps: u16,
    pub direct_only: bool,
}

/// Anything that can serve quotes. The gateway routes between sources; the
/// seam also lets tests count underlying requests.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn fetch_quote(&self, req: &QuoteRequest) -> Result<Quote>;
    fn name(&self) -> &'static str;
}

/// Per-venue swap instruction bundle as returned by the aggregator.
#[derive(Debug, Clone)]
pub struct SwapInstructionBundle {
    pub setup: Vec<Instruction>,
    pub token_ledger: Option<Instruction>,
    pub swap: Instruction,
    pub cleanup: Option<Instruction>,
    pub lookup_tables: Vec<Pubkey>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAccountMeta {
    pubkey: String,
    is_signer: bool,
    is_writable: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireInstruction {
    program_id: String,
    accounts: Vec<WireAccountMeta>,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapInstructionsResponse {
    #[serde(default)]
    token_ledger_instruction: Option<WireInstruction>,
    #[serde(default)]
    setup_instructions: Vec<WireInstruction>,
    swap_instruction: WireInstruction,
    #[serde(default)]
    cleanup_instruction: Option<WireInstruction>,
    #[serde(default)]
    address_lookup_table_addresses: Vec<String>,
}

impl WireInstruction {
    fn into_instruction(self) -> Result<Instruction> {
        let program_id = self
            .program_id
            .parse::<Pubkey>()
            .map_err(|_| BotError::Payload("bad program id in instruction".into()))?;
        let accounts = self
            .accounts
            .into_iter()
            .map(|a| {
                let pubkey = a
                    .pubkey
                    .parse::<Pubkey>()
                    .map_err(|_| BotError::Payload("bad account pubkey in instruction".into()))?;
                Ok(AccountMeta {
                    pubkey,
                    is_signer: a.is_signer,
                    is_writable: a.is_writable,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let data = base64::engine::general_purpose::STANDARD
            .decode(&self.data)
            .map_err(|_| BotError::Payload("bad base64 instruction data".into()))?;
        Ok(Instruction {
            program_id,
            accounts,
            data,
        })
    }
}

impl SwapInstructionsResponse {
    fn into_bundle(self) -> Result<SwapInstructionBundle> {
        let lookup_tables = self
            .address_lookup_table_addresses
            .iter()
            .map(|s| {
                s.parse::<Pubkey>()
                    .map_err(|_| BotError::Payload("bad lookup table address".into()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(SwapInstructionBundle {
            setup: self
                .setup_instructions
                .into_iter()
                .map(WireInstruction::into_instruction)
                .collect::<Result<Vec<_>>>()?,
            token_ledger: self
                .token_ledger_instruction
                .map(WireInstruction::into_instruction)
                .transpose()?,
            swap: self.swap_instruction.into_instruction()?,
            cleanup: self
                .cleanup_instruction
                .map(WireInstruction::into_instruction)
                .transpose()?,
            lookup_tables,
        })
    }
}

fn quote_query(base_url: &str, req: &QuoteRequest) -> String {
    let mut url = format!(
        "{}/quote?inputMint={}&outputMint={}&amount={}&slippageBps={}&maxAccounts={}",
        base_url, req.input_mint, req.output_mint, req.amount, req.slippage_bps, MAX_QUOTE_ACCOUNTS,
    );
    if req.direct_only {
        url.push_str("&onlyDirectRoutes=true");
    }
    url
}

fn map_send_error(e: reqwest::Error) -> BotError {
    if e.is_timeout() {
        BotError::Timeout {
            ms: REQUEST_TIMEOUT_MS,
        }
    } else {
        BotError::Http(e)
    }
}

async fn read_json(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let body = response.text().await.map_err(map_send_error)?;
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(BotError::ProviderRateLimited);
    }
    if !status.is_success() {
        return Err(BotError::ProviderRequest {
            status: status.as_u16(),
            body,
        });
    }
    serde_json::from_str(&body).map_err(Into::into)
}

/// Primary aggregator: quotes plus swap-instruction bundles.
pub struct AggregatorClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl AggregatorClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }

    fn apply_key(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("x-api-key", key),
            None => req,
        }
    }

    /// Fetch the instruction bundle for `quote`. The raw quote blob is sent
    /// back exactly as received.
    pub async fn swap_instructions(
        &self,
        quote: &Quote,
        user: Pubkey,
        wrap_native: bool,
        use_token_ledger: bool,
    ) -> Result<SwapInstructionBundle> {
        let body = json!({
            "quoteResponse": quote.raw,
            "userPublicKey": user.to_string(),
            "wrapAndUnwrapSol": wrap_native,
            "useTokenLedger": use_token_ledger,
            "dynamicComputeUnitLimit": true,
            "prioritizationFeeLamports": 0,
        });
        let response = self
            .apply_key(self.http.post(format!("{}/swap-instructions", self.base_url)))
            .timeout(Duration::from_millis(REQUEST_TIMEOUT_MS))
            .json(&body)
            .send()
            .await
            .map_err(map_send_error)?;
        let value = read_json(response).await?;
        serde_json::from_value::<SwapInstructionsResponse>(value)?.into_bundle()
    }
}

#[async_trait]
impl QuoteSource for AggregatorClient {
    async fn fetch_quote(&self, req: &QuoteRequest) -> Result<Quote> {
        let response = self
            .apply_key(self.http.get(quote_query(&self.base_url, req)))
            .timeout(Duration::from_millis(REQUEST_TIMEOUT_MS))
            .send()
            .await
            .map_err(map_send_error)?;
        Quote::from_raw(read_json(response).await?)
    }

    fn name(&self) -> &'static str {
        "aggregator"
    }
}

/// Free-tier quote host. Same response shape, no instruction endpoint.
pub struct LiteQuoteClient {
    http: reqwest::Client,
    base_url: String,
}

impl LiteQuoteClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl QuoteSource for LiteQuoteClient {
    async fn fetch_quote(&self, req: &QuoteRequest) -> Result<Quote> {
        let response = self
            .http
            .get(quote_query(&self.base_url, req))
            .timeout(Duration::from_millis(REQUEST_TIMEOUT_MS))
            .send()
            .await
            .map_err(map_send_error)?;
        Quote::from_raw(read_json(response).await?)
    }

    fn name(&self) -> &'static str {
        "lite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_parses_typed_view_and_keeps_raw() {
        let input = Pubkey::new_unique();
        let output = Pubkey::new_unique();
        let raw = json!({
            "inputMint": input.to_string(),
            "outputMint": output.to_string(),
            "inAmount": "1000000",
            "outAmount": "998500",
            "slippageBps": 50,
            "priceImpactPct": "0.0013",
            "routePlan": [{"swapInfo": {}}, {"swapInfo": {}}],
            "contextSlot": 123456,
        });
        let quote = Quote::from_raw(raw.clone()).unwrap();
        assert_eq!(quote.input_mint, input);
        assert_eq!(quote.in_amount, 1_000_000);
        assert_eq!(quote.out_amount, 998_500);
        assert_eq!(quote.slippage_bps, 50);
        assert_eq!(quote.route_hops, 2);
        assert!((quote.price_impact_pct - 0.0013).abs() < 1e-12);
        // The raw blob survives untouched, unknown fields included.
        assert_eq!(quote.raw, raw);
    }

    #[test]
    fn quote_rejects_missing_amounts() {
        let raw = json!({
            "inputMint": Pubkey::new_unique().to_string(),
            "outputMint": Pubkey::new_unique().to_string(),
        });
        assert!(Quote::from_raw(raw).is_err());
    }

    #[test]
    fn wire_instruction_decodes_base64_data() {
        let program = Pubkey::new_unique();
        let account = Pubkey::new_unique();
        let wire = WireInstruction {
            program_id: program.to_string(),
            accounts: vec![WireAccountMeta {
                pubkey: account.to_string(),
                is_signer: true,
                is_writable: false,
            }],
            data: base64::engine::general_purpose::STANDARD.encode([9u8, 1, 2, 3]),
        };
        let ix = wire.into_instruction().unwrap();
        assert_eq!(ix.program_id, program);
        assert_eq!(ix.accounts[0].pubkey, account);
        assert!(ix.accounts[0].is_signer);
        assert_eq!(ix.data, vec![9, 1, 2, 3]);
    }

    #[test]
    fn swap_instructions_response_builds_bundle() {
        let mk = |data: &[u8]| WireInstruction {
            program_id: Pubkey::new_unique().to_string(),
            accounts: vec![],
            data: base64::engine::general_purpose::STANDARD.encode(data),
        };
        let response = SwapInstructionsResponse {
            token_ledger_instruction: Some(mk(&[1])),
            setup_instructions: vec![mk(&[2]), mk(&[3])],
            swap_instruction: mk(&[4]),
            cleanup_instruction: None,
            address_lookup_table_addresses: vec![Pubkey::new_unique().to_string()],
        };
        let bundle = response.into_bundle().unwrap();
        assert_eq!(bundle.setup.len(), 2);
        assert!(bundle.token_ledger.is_some());
        assert!(bundle.cleanup.is_none());
        assert_eq!(bundle.lookup_tables.len(), 1);
        assert_eq!(bundle.swap.data, vec![4]);
    }

    #[test]
    fn direct_only_flag_lands_in_query() {
        let req = QuoteRequest {
            input_mint: Pubkey::new_unique(),
            output_mint: Pubkey::new_unique(),
            amount: 5,
            slippage_bps: 50,
            direct_only: true,
        };
        let url = quote_query("https://example.invalid/v6", &req);
        assert!(url.contains("onlyDirectRoutes=true"));
        assert!(url.contains("amount=5"));
    }
}
