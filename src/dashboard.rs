use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use url::Url;

use crate::models::Address;

const DASHBOARD_TIMEOUT: Duration = Duration::from_secs(15);

/// Node metrics from the network dashboard, passed through uninterpreted.
#[derive(Clone)]
pub struct DashboardClient {
    http: reqwest::Client,
    base_url: Url,
}

impl DashboardClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .no_proxy()
            .timeout(DASHBOARD_TIMEOUT)
            .build()
            .context("failed to build reqwest client")?;
        let base_url = Url::parse(base_url).context("invalid DASHBOARD_API_URL")?;
        Ok(Self { http, base_url })
    }

    pub fn node_stats_url(&self, address: &Address) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["stats", "node", address.as_str()]);
        }
        url
    }

    /// Stats JSON for `address`, or an empty object if the dashboard is unreachable.
    pub async fn fetch_node_stats(&self, address: &Address) -> Value {
        match self.try_fetch(address).await {
            Ok(stats) => stats,
            Err(err) => {
                tracing::error!(%address, "node stats error: {:#}", err);
                Value::Object(Default::default())
            }
        }
    }

    async fn try_fetch(&self, address: &Address) -> Result<Value> {
        let stats = self
            .http
            .get(self.node_stats_url(address))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("dashboard returned invalid JSON")?;
        Ok(stats)
    }
}
