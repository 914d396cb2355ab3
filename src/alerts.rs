use std::time::Duration;

use serde::Serialize;

use crate::models::{Address, Transaction};
use crate::window::{age_of, find_last_substantive_transaction, HealthPolicy};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Alert {
    NoTransactions,
    Inactive {
        #[serde(rename = "idle_secs", serialize_with = "secs")]
        idle: Duration,
    },
    StallDetected {
        label: String,
        #[serde(rename = "age_secs", serialize_with = "secs")]
        age: Duration,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertReport {
    pub address: Address,
    pub alert: Option<Alert>,
}

fn secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

/// Inactivity takes precedence over a stall: a node that sent nothing recently
/// is reported as inactive even if its last real work is older still.
pub fn check_alerts(txs: &[Transaction], now: i64, policy: &HealthPolicy) -> Option<Alert> {
    let Some(newest) = txs.first() else {
        return Some(Alert::NoTransactions);
    };
    let idle = age_of(newest.timestamp, now);
    if idle > policy.alert_threshold {
        return Some(Alert::Inactive { idle });
    }
    let activity = find_last_substantive_transaction(txs, policy)?;
    let age = age_of(activity.timestamp, now);
    (age > policy.alert_threshold).then(|| Alert::StallDetected {
        label: activity.label,
        age,
    })
}
