//! Error taxonomy shared across the bot.
//!
//! Listener tasks swallow their own errors into debug logs; the main loop
//! catches per-cycle errors and feeds the kill switch. Only preflight errors
//! abort startup (outside dry-run).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BotError>;

#[derive(Debug, Error)]
pub enum BotError {
    /// Non-retriable 4xx from any HTTP source.
    #[error("provider request failed: HTTP {status}: {body}")]
    ProviderRequest { status: u16, body: String },

    /// 429 or provider-specific throttling, after retries are exhausted.
    #[error("provider rate limited")]
    ProviderRateLimited,

    /// Request exceeded its per-request deadline.
    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// Aggregator returned a zero output. Never fatal: scanners treat this
    /// as "no opportunity".
    #[error("no route for requested swap")]
    NoRoute,

    /// Composer rejected an opportunity whose quotes aged out.
    #[error("quotes stale: {age_ms}ms old, max {max_ms}ms")]
    QuotesStale { age_ms: u64, max_ms: u64 },

    /// Encoded transaction exceeds the wire limit. Not retried by the
    /// composer; the caller may rebuild with direct routes.
    #[error("transaction too large: {bytes} bytes, max {max}")]
    TransactionTooLarge { bytes: usize, max: usize },

    #[error("simulation failed ({units} units): {logs_tail}")]
    SimulationFailed { logs_tail: String, units: u64 },

    /// Post-submission on-chain revert.
    #[error("chain error: {err}")]
    ChainError { err: String },

    /// Insufficient gas balance outside dry-run. Fatal.
    #[error("preflight failed: {0}")]
    PreflightFailed(String),

    #[error("flash-loan pool is paused")]
    PoolPaused,

    #[error("flash-loan pool liquidity below requested borrow")]
    InsufficientLiquidity,

    /// Admin path only: signer is not the pool admin.
    #[error("unauthorized: signer is not the pool admin")]
    Unauthorized,

    #[error("rpc error: {0}")]
    Rpc(#[from] Box<solana_client::client_error::ClientError>),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed provider payload: {0}")]
    Payload(String),

    #[error("transaction build failed: {0}")]
    Build(String),
}

impl From<solana_client::client_error::ClientError> for BotError {
    fn from(e: solana_client::client_error::ClientError) -> Self {
        BotError::Rpc(Box::new(e))
    }
}

impl From<serde_json::Error> for BotError {
    fn from(e: serde_json::Error) -> Self {
        BotError::Payload(e.to_string())
    }
}

impl BotError {
    /// Whether the scanner layer should treat this as a soft miss rather
    /// than a cycle failure.
    pub fn is_no_opportunity(&self) -> bool {
        matches!(self, BotError::NoRoute)
    }
}
