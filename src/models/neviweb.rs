//! Models for the subset of the Neviweb (GT125 gateway) API this crate talks to.
//!
//! Notes
//! - Only fields the sensors use are typed; everything else is kept in `extra`
//!   so the status payloads can still be exposed verbatim.
//! - Neviweb mixes camelCase and `something$id` keys; both are renamed here.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// =====================
// Scalar ID newtype wrappers
// =====================

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub i64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub i64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationId(pub i64);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =====================
// Occupancy
// =====================

/// Location-wide occupancy mode accepted by the set-status service.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OccupancyMode {
    Home,
    Away,
}

impl OccupancyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OccupancyMode::Home => "home",
            OccupancyMode::Away => "away",
        }
    }
}

impl fmt::Display for OccupancyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OccupancyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "home" => Ok(OccupancyMode::Home),
            "away" => Ok(OccupancyMode::Away),
            other => Err(format!("invalid mode {:?}; expected \"home\" or \"away\"", other)),
        }
    }
}

// =====================
// Session / discovery
// =====================

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub interface: &'a str,
    #[serde(rename = "stayConnected")]
    pub stay_connected: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub session: String,
    pub account: Account,
}

/// `{"error": {"code": "USRSESSEXP"}}` style payload, returned with HTTP 200.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(default)]
    pub error: Option<ErrorDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSignature {
    #[serde(default)]
    pub model: Option<i64>,
}

/// One entry of the gateway device list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayDevice {
    pub id: DeviceId,
    pub name: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(rename = "location$id")]
    pub location_id: LocationId,
    #[serde(default)]
    pub signature: Option<DeviceSignature>,
}

impl GatewayDevice {
    pub fn model(&self) -> Option<i64> {
        self.signature.as_ref().and_then(|s| s.model)
    }
}

// =====================
// Status payloads
// =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub status: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationStatus {
    #[serde(rename = "occupancyMode")]
    pub occupancy_mode: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

// =====================
// Energy statistics
// =====================

/// One hour-bucket of energy usage. `date` is kept as the raw string so a
/// malformed timestamp only drops this entry, not the whole response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyStatEntry {
    #[serde(default)]
    pub date: Option<String>,
    /// Energy used during the hour, in Wh.
    #[serde(default)]
    pub period: Option<f64>,
}

impl HourlyStatEntry {
    #[cfg(test)]
    pub fn new(date: impl Into<String>, period_wh: f64) -> Self {
        HourlyStatEntry {
            date: Some(date.into()),
            period: Some(period_wh),
        }
    }

    pub fn period_wh(&self) -> f64 {
        self.period.unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HourlyStatsResponse {
    #[serde(default, alias = "values")]
    pub history: Option<Vec<HourlyStatEntry>>,
}
