use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::alerts::{self, AlertReport};
use crate::eval_stats::EvalStats;
use crate::models::{Address, HealthReport, Transaction};
use crate::rate_limit::RateBudget;
use crate::window::{self, HealthPolicy};

/// Where balances and transaction history come from. Implementations absorb
/// every failure and return `None` once they give up, so an unreachable
/// provider is distinguishable from an address with no history.
#[async_trait]
pub trait NodeDataSource: Send + Sync {
    async fn fetch_balance(&self, address: &Address, delay: Duration) -> Option<f64>;
    async fn fetch_transactions(
        &self,
        address: &Address,
        delay: Duration,
    ) -> Option<Vec<Transaction>>;
}

/// Provider ceiling the per-batch delay is derived from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSettings {
    pub max_calls_per_second: f64,
    pub floor_delay_secs: f64,
}

impl Default for RateSettings {
    fn default() -> Self {
        Self {
            max_calls_per_second: 0.5,
            floor_delay_secs: 3.0,
        }
    }
}

pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Spaces consecutive outbound calls by the batch delay.
struct Pacer {
    delay: Duration,
    started: bool,
}

impl Pacer {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            started: false,
        }
    }

    /// Returns `false` if cancelled while waiting.
    async fn wait(&mut self, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        if !self.started {
            self.started = true;
            return true;
        }
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.delay) => true,
        }
    }
}

pub struct NodeHealthEvaluator {
    source: Arc<dyn NodeDataSource>,
    policy: HealthPolicy,
    rate: RateSettings,
    stats: Arc<EvalStats>,
    clock: fn() -> i64,
}

impl NodeHealthEvaluator {
    pub fn new(
        source: Arc<dyn NodeDataSource>,
        policy: HealthPolicy,
        rate: RateSettings,
        stats: Arc<EvalStats>,
    ) -> Self {
        Self {
            source,
            policy,
            rate,
            stats,
            clock: unix_now,
        }
    }

    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> &HealthPolicy {
        &self.policy
    }

    fn batch<'a>(&self, addresses: &'a [Address]) -> &'a [Address] {
        let limit = addresses.len().min(self.policy.max_addresses_per_batch);
        if limit < addresses.len() {
            warn!(
                requested = addresses.len(),
                limit, "batch truncated to maximum addresses"
            );
        }
        &addresses[..limit]
    }

    fn budget(&self, address_count: usize, calls_per_address: usize) -> RateBudget {
        RateBudget::for_batch(
            address_count,
            calls_per_address,
            self.rate.max_calls_per_second,
            self.rate.floor_delay_secs,
        )
    }

    /// One report per address, in input order. Addresses left unevaluated by
    /// cancellation are reported as unavailable.
    pub async fn evaluate(
        &self,
        addresses: &[Address],
        cancel: &CancellationToken,
    ) -> Vec<HealthReport> {
        let batch = self.batch(addresses);
        let budget = self.budget(batch.len(), 2);
        let delay = budget.delay();
        self.stats.inc_batches(1);
        info!(
            addresses = batch.len(),
            delay_secs = budget.delay_secs,
            "evaluating node health"
        );

        let mut pacer = Pacer::new(delay);
        let mut reports = Vec::with_capacity(batch.len());
        for address in batch {
            if !pacer.wait(cancel).await {
                break;
            }
            let balance = self.source.fetch_balance(address, delay).await.unwrap_or(0.0);
            if !pacer.wait(cancel).await {
                break;
            }
            let report = match self.source.fetch_transactions(address, delay).await {
                Some(txs) => {
                    build_report(address.clone(), balance, &txs, (self.clock)(), &self.policy)
                }
                None => {
                    warn!(%address, "transaction history unavailable");
                    HealthReport {
                        balance,
                        ..HealthReport::unavailable(address.clone(), self.policy.group_count())
                    }
                }
            };
            debug!(%address, status = ?report.online_status, stall = ?report.stall_status, "node evaluated");
            reports.push(report);
        }

        if reports.len() < batch.len() {
            warn!(
                evaluated = reports.len(),
                skipped = batch.len() - reports.len(),
                "evaluation cancelled"
            );
            let groups = self.policy.group_count();
            reports.extend(
                batch[reports.len()..]
                    .iter()
                    .map(|address| HealthReport::unavailable(address.clone(), groups)),
            );
        }

        self.stats.inc_reports(reports.len() as u64);
        reports
    }

    /// Inactivity and stall alerts, one transaction fetch per address.
    /// Stops early on cancellation. Only addresses whose history was fetched
    /// are returned; an unreachable provider raises no alert.
    pub async fn check_alerts(
        &self,
        addresses: &[Address],
        cancel: &CancellationToken,
    ) -> Vec<AlertReport> {
        let batch = self.batch(addresses);
        let budget = self.budget(batch.len(), 1);
        let delay = budget.delay();
        self.stats.inc_batches(1);

        let mut pacer = Pacer::new(delay);
        let mut out = Vec::with_capacity(batch.len());
        for address in batch {
            if !pacer.wait(cancel).await {
                warn!(checked = out.len(), "alert check cancelled");
                break;
            }
            let Some(txs) = self.source.fetch_transactions(address, delay).await else {
                warn!(%address, "skipping alert check, history unavailable");
                continue;
            };
            let alert = alerts::check_alerts(&txs, (self.clock)(), &self.policy);
            if let Some(alert) = &alert {
                info!(%address, ?alert, "alert raised");
            }
            out.push(AlertReport {
                address: address.clone(),
                alert,
            });
        }
        out
    }
}

/// Assembles a report from already-fetched data.
pub fn build_report(
    address: Address,
    balance: f64,
    txs: &[Transaction],
    now: i64,
    policy: &HealthPolicy,
) -> HealthReport {
    HealthReport {
        address,
        balance,
        online_status: window::compute_online_status(
            txs,
            now,
            policy.online_threshold,
            policy.empty_online_status,
        ),
        last_activity_age: window::compute_last_activity_age(txs, now),
        health_strip: window::compute_health_strip(txs, policy.window_size, policy.group_size),
        stall_status: window::compute_stall_status(
            txs,
            policy.window_size,
            &policy.heartbeat_selector,
        ),
        stall_detail: window::find_last_substantive_transaction(txs, policy)
            .map(|activity| window::stall_detail(&activity, now)),
    }
}
