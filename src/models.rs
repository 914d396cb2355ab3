use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

/// Lowercase `0x`-prefixed 20-byte hex address. Format-only, no checksum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Address(String);

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum AddressError {
    #[error("address must start with 0x and be 42 characters long, got {0:?}")]
    InvalidFormat(String),
    #[error("address contains non-hex characters: {0:?}")]
    NotHex(String),
}

impl Address {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        if !lower.starts_with("0x") || lower.len() != 42 {
            return Err(AddressError::InvalidFormat(s.to_string()));
        }
        if !lower[2..].chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AddressError::NotHex(s.to_string()));
        }
        Ok(Self(lower))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An address on a chat's watchlist, with an optional display label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchedAddress {
    pub address: Address,
    pub label: Option<String>,
}

impl WatchedAddress {
    /// Parses `<address>[,<label>]`.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let mut parts = input.splitn(2, ',').map(str::trim);
        let address = parts.next().unwrap_or_default().parse()?;
        let label = parts
            .next()
            .filter(|l| !l.is_empty())
            .map(str::to_string);
        Ok(Self { address, label })
    }
}

/// One row of the explorer's `txlist` response. Numeric fields arrive as strings.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Transaction {
    #[serde(default)]
    pub hash: String,
    #[serde(rename = "timeStamp")]
    #[serde_as(as = "DisplayFromStr")]
    pub timestamp: i64,
    #[serde(rename = "isError", default)]
    pub is_error: String,
    #[serde(rename = "input", default)]
    pub input_data: String,
    #[serde(rename = "functionName", default)]
    pub function_name: Option<String>,
}

impl Transaction {
    pub fn succeeded(&self) -> bool {
        self.is_error == "0"
    }

    /// Case-insensitive match of the method selector against `selector`.
    pub fn has_selector(&self, selector: &str) -> bool {
        self.input_data
            .get(..selector.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(selector))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OnlineStatus {
    Online,
    Offline,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupVerdict {
    Healthy,
    Unhealthy,
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StallStatus {
    Stalled,
    Normal,
    Unknown,
}

/// The most recent successful non-heartbeat transaction of an allowed kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubstantiveActivity {
    pub label: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StallDetail {
    pub label: String,
    #[serde(rename = "age_secs", serialize_with = "duration_secs")]
    pub age: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub address: Address,
    pub balance: f64,
    pub online_status: OnlineStatus,
    #[serde(rename = "last_activity_age_secs", serialize_with = "opt_duration_secs")]
    pub last_activity_age: Option<Duration>,
    pub health_strip: Vec<GroupVerdict>,
    pub stall_status: StallStatus,
    pub stall_detail: Option<StallDetail>,
}

impl HealthReport {
    /// Report for an address with no usable history: never evaluated, or the
    /// provider gave up on it.
    pub fn unavailable(address: Address, groups: usize) -> Self {
        Self {
            address,
            balance: 0.0,
            online_status: OnlineStatus::Unknown,
            last_activity_age: None,
            health_strip: vec![GroupVerdict::Empty; groups],
            stall_status: StallStatus::Unknown,
            stall_detail: None,
        }
    }
}

fn duration_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

fn opt_duration_secs<S: serde::Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match d {
        Some(d) => s.serialize_some(&d.as_secs()),
        None => s.serialize_none(),
    }
}
