pub mod retry;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::eval_stats::EvalStats;
use crate::evaluator::NodeDataSource;
use crate::models::{Address, Transaction};

use self::retry::{classify_balance, classify_transactions, with_retry, FetchError, RetryPolicy};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const TX_PAGE_SIZE: u32 = 100;

/// Etherscan-style account API client (balance and txlist).
#[derive(Clone)]
pub struct ExplorerClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
    policy: RetryPolicy,
    stats: Arc<EvalStats>,
}

impl ExplorerClient {
    pub fn new(base_url: &str, api_key: impl Into<String>, stats: Arc<EvalStats>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .no_proxy()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build reqwest client")?;
        let base_url = Url::parse(base_url).context("invalid EXPLORER_API_URL")?;
        Ok(Self {
            http,
            base_url,
            api_key: api_key.into(),
            policy: RetryPolicy::default(),
            stats,
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn account_url(&self, action: &str, address: &Address, extra: &[(&str, String)]) -> Url {
        let mut url = self.base_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("module", "account")
                .append_pair("action", action)
                .append_pair("address", address.as_str());
            for (key, value) in extra {
                query.append_pair(key, value);
            }
            query.append_pair("apikey", &self.api_key);
        }
        url
    }

    /// The `result` field of a response body; `Null` if absent.
    async fn get_result(&self, url: Url) -> Result<Value, FetchError> {
        let mut body: Value = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body
            .get_mut("result")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    /// Balance in ether, or `None` if the provider never answered usefully.
    pub async fn fetch_balance(&self, address: &Address, delay: Duration) -> Option<f64> {
        let url = self.account_url("balance", address, &[("tag", "latest".to_string())]);
        let url = &url;
        with_retry(&self.policy, delay, "balance", address, &self.stats, move || async move {
            let result = self.get_result(url.clone()).await?;
            classify_balance(&result)
        })
        .await
    }

    /// Up to one page of transactions, newest first. `None` once retries are
    /// exhausted; `Some(vec![])` when the address has no history.
    pub async fn fetch_transactions(
        &self,
        address: &Address,
        delay: Duration,
    ) -> Option<Vec<Transaction>> {
        let url = self.account_url(
            "txlist",
            address,
            &[
                ("sort", "desc".to_string()),
                ("page", "1".to_string()),
                ("offset", TX_PAGE_SIZE.to_string()),
            ],
        );
        let url = &url;
        with_retry(&self.policy, delay, "transactions", address, &self.stats, move || async move {
            let result = self.get_result(url.clone()).await?;
            classify_transactions(result)
        })
        .await
    }
}

#[async_trait]
impl NodeDataSource for ExplorerClient {
    async fn fetch_balance(&self, address: &Address, delay: Duration) -> Option<f64> {
        ExplorerClient::fetch_balance(self, address, delay).await
    }

    async fn fetch_transactions(
        &self,
        address: &Address,
        delay: Duration,
    ) -> Option<Vec<Transaction>> {
        ExplorerClient::fetch_transactions(self, address, delay).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_url_carries_all_params() {
        let client = ExplorerClient::new(
            "https://api.example.io/api",
            "KEY",
            Arc::new(EvalStats::new()),
        )
        .unwrap();
        let address: Address = "0x00000000000000000000000000000000000000aa".parse().unwrap();
        let url = client.account_url("txlist", &address, &[("sort", "desc".to_string())]);
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("module".to_string(), "account".to_string()),
                ("action".to_string(), "txlist".to_string()),
                ("address".to_string(), address.to_string()),
                ("sort".to_string(), "desc".to_string()),
                ("apikey".to_string(), "KEY".to_string()),
            ]
        );
    }
}
