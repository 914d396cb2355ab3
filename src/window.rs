//! Activity analysis over a newest-first transaction list.
//!
//! Every function here is total: empty input yields a neutral value, never an error.

use std::time::Duration;

use crate::models::{
    GroupVerdict, OnlineStatus, StallDetail, StallStatus, SubstantiveActivity, Transaction,
};

/// Thresholds and selector tables used to judge a node's activity.
#[derive(Debug, Clone)]
pub struct HealthPolicy {
    pub online_threshold: Duration,
    pub window_size: usize,
    pub group_size: usize,
    pub heartbeat_selector: String,
    /// Selector prefix to label, checked in order.
    pub allowed_selectors: Vec<(String, String)>,
    pub fallback_name_substring: String,
    pub fallback_label: String,
    pub alert_threshold: Duration,
    pub max_addresses_per_batch: usize,
    /// Online status reported when an address has no transactions at all.
    pub empty_online_status: OnlineStatus,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            online_threshold: Duration::from_secs(5 * 60),
            window_size: 25,
            group_size: 5,
            heartbeat_selector: "0x5c36b186".to_string(),
            allowed_selectors: [
                ("0xf21a494b", "Commit"),
                ("0x65c815a5", "Precommit"),
                ("0xca6726d9", "Prepare"),
                ("0x198e2b8a", "Create"),
            ]
            .into_iter()
            .map(|(sel, label)| (sel.to_string(), label.to_string()))
            .collect(),
            fallback_name_substring: "create".to_string(),
            fallback_label: "Create".to_string(),
            alert_threshold: Duration::from_secs(15 * 60),
            max_addresses_per_batch: 25,
            empty_online_status: OnlineStatus::Offline,
        }
    }
}

impl HealthPolicy {
    /// Width of the health strip, `ceil(window_size / group_size)`.
    pub fn group_count(&self) -> usize {
        if self.group_size == 0 {
            return 0;
        }
        self.window_size.div_ceil(self.group_size)
    }
}

/// Seconds elapsed since `timestamp`; timestamps in the future count as zero.
pub fn age_of(timestamp: i64, now: i64) -> Duration {
    Duration::from_secs(now.saturating_sub(timestamp).max(0) as u64)
}

pub fn compute_online_status(
    txs: &[Transaction],
    now: i64,
    threshold: Duration,
    empty_default: OnlineStatus,
) -> OnlineStatus {
    match txs.first() {
        None => empty_default,
        Some(newest) if age_of(newest.timestamp, now) <= threshold => OnlineStatus::Online,
        Some(_) => OnlineStatus::Offline,
    }
}

pub fn compute_last_activity_age(txs: &[Transaction], now: i64) -> Option<Duration> {
    txs.first().map(|newest| age_of(newest.timestamp, now))
}

/// Fixed-width strip of per-group verdicts over the newest `window_size` transactions.
pub fn compute_health_strip(
    txs: &[Transaction],
    window_size: usize,
    group_size: usize,
) -> Vec<GroupVerdict> {
    if group_size == 0 {
        return Vec::new();
    }
    let window = &txs[..txs.len().min(window_size)];
    (0..window_size.div_ceil(group_size))
        .map(|i| {
            let start = (i * group_size).min(window.len());
            let end = ((i + 1) * group_size).min(window.len());
            let group = &window[start..end];
            if group.is_empty() {
                GroupVerdict::Empty
            } else if group.iter().all(Transaction::succeeded) {
                GroupVerdict::Healthy
            } else {
                GroupVerdict::Unhealthy
            }
        })
        .collect()
}

/// Stalled only when at least `window_size` transactions exist and the newest
/// `window_size` of them are all heartbeats.
pub fn compute_stall_status(
    txs: &[Transaction],
    window_size: usize,
    heartbeat_selector: &str,
) -> StallStatus {
    if window_size == 0 || txs.len() < window_size {
        return StallStatus::Normal;
    }
    if txs[..window_size]
        .iter()
        .all(|tx| tx.has_selector(heartbeat_selector))
    {
        StallStatus::Stalled
    } else {
        StallStatus::Normal
    }
}

/// Newest successful, non-heartbeat transaction matching the allow-list, or
/// failing that whose function name contains the fallback substring.
pub fn find_last_substantive_transaction(
    txs: &[Transaction],
    policy: &HealthPolicy,
) -> Option<SubstantiveActivity> {
    let needle = policy.fallback_name_substring.to_lowercase();
    for tx in txs {
        if tx.has_selector(&policy.heartbeat_selector) || !tx.succeeded() {
            continue;
        }
        if let Some((_, label)) = policy
            .allowed_selectors
            .iter()
            .find(|(selector, _)| tx.has_selector(selector))
        {
            return Some(SubstantiveActivity {
                label: label.clone(),
                timestamp: tx.timestamp,
            });
        }
        let name_matches = tx
            .function_name
            .as_deref()
            .is_some_and(|name| !needle.is_empty() && name.to_lowercase().contains(&needle));
        if name_matches {
            return Some(SubstantiveActivity {
                label: policy.fallback_label.clone(),
                timestamp: tx.timestamp,
            });
        }
    }
    None
}

pub fn stall_detail(activity: &SubstantiveActivity, now: i64) -> StallDetail {
    StallDetail {
        label: activity.label.clone(),
        age: age_of(activity.timestamp, now),
    }
}
