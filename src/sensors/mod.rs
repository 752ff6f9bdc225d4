//! Sensor entities exposed for each GT125 thermostat plus the account-wide
//! request counter.
//!
//! Each sensor owns its typed state and is refreshed by an explicit poll; none
//! of them schedules anything on its own.

pub mod daily_energy;
pub mod request_quota;
pub mod status;

use serde::Serialize;

use crate::models::neviweb::DeviceId;

pub use daily_energy::{DailyEnergySensor, DailyEnergyState};
pub use request_quota::{DailyRequestSensor, RequestQuotaState};
pub use status::{StatusSensor, StatusState};

pub const DOMAIN: &str = "neviweb";
pub const MANUFACTURER: &str = "Schluter";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Energy,
}

/// How a numeric state aggregates over time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateClass {
    /// Can go up and down; resets are announced through `last_reset`.
    Total,
}

/// Groups entities under one physical device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub identifier: String,
    pub name: String,
    pub manufacturer: &'static str,
    pub model: Option<String>,
}

/// Static identity and presentation of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensorDescriptor {
    pub unique_id: String,
    pub entity_id: String,
    pub name: String,
    pub icon: Option<&'static str>,
    pub unit_of_measurement: Option<&'static str>,
    pub device_class: Option<DeviceClass>,
    pub state_class: Option<StateClass>,
    pub device_info: Option<DeviceInfo>,
}

impl SensorDescriptor {
    pub fn new(unique_id: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        SensorDescriptor {
            unique_id: unique_id.into(),
            entity_id: format!("sensor.{}", crate::utils::slugify(&name)),
            name,
            icon: None,
            unit_of_measurement: None,
            device_class: None,
            state_class: None,
            device_info: None,
        }
    }
}

/// Current exposed state of one entity, for logging or export.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SensorSnapshot {
    Status {
        #[serde(flatten)]
        descriptor: SensorDescriptor,
        #[serde(flatten)]
        state: StatusState,
    },
    DailyEnergy {
        #[serde(flatten)]
        descriptor: SensorDescriptor,
        #[serde(flatten)]
        state: DailyEnergyState,
        id: DeviceId,
        sku: Option<String>,
    },
    DailyRequests {
        #[serde(flatten)]
        descriptor: SensorDescriptor,
        #[serde(flatten)]
        state: RequestQuotaState,
        limit: u64,
    },
}
