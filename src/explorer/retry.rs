use std::future::Future;
use std::time::Duration;

use ethers_core::types::U256;
use ethers_core::utils::format_units;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::eval_stats::EvalStats;
use crate::models::{Address, Transaction};

/// Substring the explorer puts in `result` when throttling, alongside HTTP 200.
pub const RATE_LIMIT_SENTINEL: &str = "Max calls per sec rate limit";

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("transient provider error: {0}")]
    Transient(String),
    #[error("provider rate limit reached")]
    RateLimited,
    #[error("unexpected payload: {0}")]
    Unexpected(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Transient(err.to_string())
    }
}

/// Retry budget and backoff multipliers per error class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub transient_multiplier: f64,
    pub rate_limited_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            transient_multiplier: 1.0,
            rate_limited_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Sleep before the next attempt, or `None` when the error must not be retried.
    pub fn backoff(&self, err: &FetchError, delay: Duration, attempt: u32) -> Option<Duration> {
        let multiplier = match err {
            FetchError::Transient(_) => self.transient_multiplier,
            FetchError::RateLimited => self.rate_limited_multiplier,
            FetchError::Unexpected(_) => return None,
        };
        Some(delay.mul_f64(f64::from(attempt + 1) * multiplier))
    }
}

/// Classifies a string `result` that should have been data.
pub fn classify_error_message(message: &str) -> FetchError {
    if message.contains(RATE_LIMIT_SENTINEL) {
        FetchError::RateLimited
    } else {
        FetchError::Unexpected(message.to_string())
    }
}

/// Wei balance as a decimal string, converted to ether.
pub fn classify_balance(result: &Value) -> Result<f64, FetchError> {
    let raw = match result {
        Value::String(s) => s,
        other => return Err(FetchError::Unexpected(other.to_string())),
    };
    let wei = match U256::from_dec_str(raw) {
        Ok(wei) => wei,
        Err(_) => return Err(classify_error_message(raw)),
    };
    let ether = format_units(wei, "ether").map_err(|e| FetchError::Unexpected(e.to_string()))?;
    ether
        .parse::<f64>()
        .map_err(|e| FetchError::Unexpected(e.to_string()))
}

pub fn classify_transactions(result: Value) -> Result<Vec<Transaction>, FetchError> {
    match result {
        Value::Array(_) => serde_json::from_value(result)
            .map_err(|e| FetchError::Unexpected(format!("malformed transaction list: {e}"))),
        Value::String(message) => Err(classify_error_message(&message)),
        other => Err(FetchError::Unexpected(other.to_string())),
    }
}

/// Runs `op` until it succeeds, fails fast, or exhausts the policy's budget.
/// Every failure is absorbed here; callers substitute their neutral value on `None`.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    delay: Duration,
    what: &str,
    address: &Address,
    stats: &EvalStats,
    mut op: F,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    for attempt in 0..policy.max_retries {
        stats.inc_fetch_attempts(1);
        let err = match op().await {
            Ok(value) => return Some(value),
            Err(err) => err,
        };

        let Some(backoff) = policy.backoff(&err, delay, attempt) else {
            error!(%address, what, error = %err, "giving up on unexpected payload");
            stats.inc_neutral_results(1);
            return None;
        };
        if matches!(err, FetchError::RateLimited) {
            stats.inc_rate_limited(1);
            warn!(%address, what, attempt = attempt + 1, "rate limit reached, backing off");
        } else {
            warn!(%address, what, attempt = attempt + 1, error = %err, "fetch failed, retrying");
        }

        if attempt + 1 < policy.max_retries {
            debug!(%address, what, backoff_ms = backoff.as_millis() as u64, "sleeping before retry");
            tokio::time::sleep(backoff).await;
        }
    }

    error!(%address, what, retries = policy.max_retries, "retries exhausted");
    stats.inc_neutral_results(1);
    None
}
