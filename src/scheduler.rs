//! Periodic per-chat evaluation jobs.
//!
//! Each chat gets its own task and cancellation token. Batches for different
//! chats run independently and each computes its own throttle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::alerts::AlertReport;
use crate::evaluator::{unix_now, NodeHealthEvaluator};
use crate::models::{Address, HealthReport};
use crate::storage::{self, ChatId, DbPool, WatchlistError};

#[derive(Debug, Clone, Serialize)]
pub struct ChatReports {
    pub generated_at: i64,
    pub reports: Vec<HealthReport>,
    pub alerts: Vec<AlertReport>,
}

/// Latest scheduled reports per chat.
pub type ReportStore = Arc<RwLock<HashMap<ChatId, ChatReports>>>;

struct JobHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct Scheduler {
    pool: DbPool,
    evaluator: Arc<NodeHealthEvaluator>,
    reports: ReportStore,
    jobs: Mutex<HashMap<ChatId, JobHandle>>,
}

impl Scheduler {
    pub fn new(pool: DbPool, evaluator: Arc<NodeHealthEvaluator>, reports: ReportStore) -> Self {
        Self {
            pool,
            evaluator,
            reports,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Starts (or restarts) the periodic job for `chat_id`.
    pub fn start_chat(&self, chat_id: ChatId, every: Duration) {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_chat_loop(
            self.pool.clone(),
            self.evaluator.clone(),
            self.reports.clone(),
            chat_id,
            every,
            cancel.clone(),
        ));

        let previous = self
            .jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(chat_id, JobHandle { cancel, task });
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }
        info!(chat_id, every_secs = every.as_secs_f64(), "auto update scheduled");
    }

    /// Returns whether a job was running.
    pub fn stop_chat(&self, chat_id: ChatId) -> bool {
        let removed = self
            .jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&chat_id);
        match removed {
            Some(job) => {
                job.cancel.cancel();
                info!(chat_id, "auto update stopped");
                true
            }
            None => false,
        }
    }

    pub fn running(&self) -> Vec<ChatId> {
        let mut ids: Vec<ChatId> = self
            .jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Schedules every stored chat at its configured interval.
    pub async fn start_all(&self, default_interval_secs: f64) -> Result<usize, WatchlistError> {
        let chats = storage::list_chats(&self.pool).await?;
        for &chat_id in &chats {
            let secs = storage::update_interval(&self.pool, chat_id, default_interval_secs).await?;
            self.start_chat(chat_id, Duration::from_secs_f64(secs));
        }
        Ok(chats.len())
    }

    /// Cancels every job and waits for them to finish.
    pub async fn shutdown(&self) {
        let jobs: Vec<JobHandle> = self
            .jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain()
            .map(|(_, job)| job)
            .collect();
        for job in &jobs {
            job.cancel.cancel();
        }
        for job in jobs {
            let _ = job.task.await;
        }
        info!("scheduler stopped");
    }
}

async fn run_chat_loop(
    pool: DbPool,
    evaluator: Arc<NodeHealthEvaluator>,
    reports: ReportStore,
    chat_id: ChatId,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(err) = run_chat_update(&pool, &evaluator, &reports, chat_id, &cancel).await {
                    error!(chat_id, "auto update failed: {}", err);
                }
            }
        }
    }
}

/// Evaluates a chat's watchlist once, runs its alert checks and publishes both.
pub async fn run_chat_update(
    pool: &DbPool,
    evaluator: &NodeHealthEvaluator,
    reports: &ReportStore,
    chat_id: ChatId,
    cancel: &CancellationToken,
) -> Result<usize, WatchlistError> {
    let addresses: Vec<Address> = storage::list_addresses(pool, chat_id)
        .await?
        .into_iter()
        .map(|entry| entry.address)
        .collect();
    if addresses.is_empty() {
        info!(chat_id, "no addresses to evaluate");
        return Ok(0);
    }

    let batch = evaluator.evaluate(&addresses, cancel).await;
    let alerts = evaluator.check_alerts(&addresses, cancel).await;
    let raised = alerts.iter().filter(|report| report.alert.is_some()).count();
    if raised > 0 {
        warn!(chat_id, raised, "alerts raised for watchlist");
    }

    let count = batch.len();
    reports.write().await.insert(
        chat_id,
        ChatReports {
            generated_at: unix_now(),
            reports: batch,
            alerts,
        },
    );
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::Alert;
    use crate::eval_stats::EvalStats;
    use crate::evaluator::{NodeDataSource, RateSettings};
    use crate::models::{Transaction, WatchedAddress};
    use crate::window::HealthPolicy;
    use async_trait::async_trait;

    struct Silent;

    #[async_trait]
    impl NodeDataSource for Silent {
        async fn fetch_balance(&self, _: &Address, _: Duration) -> Option<f64> {
            Some(0.0)
        }

        async fn fetch_transactions(&self, _: &Address, _: Duration) -> Option<Vec<Transaction>> {
            Some(Vec::new())
        }
    }

    async fn setup() -> (DbPool, Arc<NodeHealthEvaluator>, ReportStore) {
        let path = std::env::temp_dir().join(format!(
            "node_health_sentinel_scheduler_{}_{}.sqlite",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        let pool = storage::init_pool(&format!("sqlite://{}", path.to_string_lossy()))
            .await
            .unwrap();
        let evaluator = NodeHealthEvaluator::new(
            Arc::new(Silent),
            HealthPolicy::default(),
            RateSettings {
                max_calls_per_second: 100.0,
                floor_delay_secs: 0.0,
            },
            Arc::new(EvalStats::new()),
        );
        (pool, Arc::new(evaluator), ReportStore::default())
    }

    #[tokio::test]
    async fn update_publishes_reports_in_watchlist_order() {
        let (pool, evaluator, reports) = setup().await;
        for n in [3u8, 1, 2] {
            let entry = WatchedAddress::parse(&format!("0x{:040x}", n)).unwrap();
            storage::add_address(&pool, 7, &entry).await.unwrap();
        }

        let count = run_chat_update(&pool, &evaluator, &reports, 7, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(count, 3);

        let store = reports.read().await;
        let order: Vec<String> = store[&7]
            .reports
            .iter()
            .map(|r| r.address.to_string())
            .collect();
        assert_eq!(
            order,
            vec![
                format!("0x{:040x}", 3),
                format!("0x{:040x}", 1),
                format!("0x{:040x}", 2)
            ]
        );
    }

    #[tokio::test]
    async fn update_publishes_alerts_next_to_reports() {
        let (pool, evaluator, reports) = setup().await;
        for n in [4u8, 8] {
            let entry = WatchedAddress::parse(&format!("0x{:040x}", n)).unwrap();
            storage::add_address(&pool, 3, &entry).await.unwrap();
        }

        run_chat_update(&pool, &evaluator, &reports, 3, &CancellationToken::new())
            .await
            .unwrap();

        let store = reports.read().await;
        let alerts = &store[&3].alerts;
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].address.to_string(), format!("0x{:040x}", 4));
        assert!(alerts
            .iter()
            .all(|report| report.alert == Some(Alert::NoTransactions)));
    }

    #[tokio::test]
    async fn empty_watchlist_publishes_nothing() {
        let (pool, evaluator, reports) = setup().await;
        let count = run_chat_update(&pool, &evaluator, &reports, 1, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert!(reports.read().await.is_empty());
    }

    #[tokio::test]
    async fn jobs_start_replace_and_stop() {
        let (pool, evaluator, reports) = setup().await;
        storage::set_update_interval(&pool, 5, 120.0).await.unwrap();
        storage::set_update_interval(&pool, 9, 60.0).await.unwrap();
        let scheduler = Scheduler::new(pool, evaluator, reports);

        assert_eq!(scheduler.start_all(300.0).await.unwrap(), 2);
        assert_eq!(scheduler.running(), vec![5, 9]);

        scheduler.start_chat(5, Duration::from_secs(90));
        assert_eq!(scheduler.running(), vec![5, 9]);

        assert!(scheduler.stop_chat(5));
        assert!(!scheduler.stop_chat(5));
        assert_eq!(scheduler.running(), vec![9]);

        scheduler.shutdown().await;
        assert!(scheduler.running().is_empty());
    }
}
