//! The set of entities created for one Neviweb account, polled as a unit.
//!
//! Each entity is polled in turn and its failure is logged here; one entity
//! failing never keeps the others from being polled.

use chrono::{DateTime, Utc};
use core::fmt;
use log::{debug, error, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::client::NeviwebClientError;
use crate::models::neviweb::OccupancyMode;
use crate::sensors::{DailyEnergySensor, DailyRequestSensor, SensorDescriptor, SensorSnapshot, StatusSensor};

pub enum NeviwebEntity {
    Status(StatusSensor),
    DailyEnergy(DailyEnergySensor),
    DailyRequests(DailyRequestSensor),
}

impl NeviwebEntity {
    pub fn descriptor(&self) -> &SensorDescriptor {
        match self {
            NeviwebEntity::Status(s) => s.descriptor(),
            NeviwebEntity::DailyEnergy(s) => s.descriptor(),
            NeviwebEntity::DailyRequests(s) => s.descriptor(),
        }
    }

    pub fn descriptor_mut(&mut self) -> &mut SensorDescriptor {
        match self {
            NeviwebEntity::Status(s) => s.descriptor_mut(),
            NeviwebEntity::DailyEnergy(s) => s.descriptor_mut(),
            NeviwebEntity::DailyRequests(s) => s.descriptor_mut(),
        }
    }

    pub fn snapshot(&self) -> SensorSnapshot {
        match self {
            NeviwebEntity::Status(s) => SensorSnapshot::Status {
                descriptor: s.descriptor().clone(),
                state: s.state().clone(),
            },
            NeviwebEntity::DailyEnergy(s) => SensorSnapshot::DailyEnergy {
                descriptor: s.descriptor().clone(),
                state: s.state().clone(),
                id: s.device_id(),
                sku: s.sku().map(str::to_string),
            },
            NeviwebEntity::DailyRequests(s) => SensorSnapshot::DailyRequests {
                descriptor: s.descriptor().clone(),
                state: s.state().clone(),
                limit: s.limit(),
            },
        }
    }

    /// Poll once. Only the status sensor surfaces errors; the others log their own.
    pub fn poll(&mut self, now: DateTime<Utc>) -> Result<(), NeviwebClientError> {
        match self {
            NeviwebEntity::Status(s) => s.update_at(now),
            NeviwebEntity::DailyEnergy(s) => {
                let outcome = s.update_at(now);
                debug!("{}: {:?}", s.descriptor().name, outcome);
                Ok(())
            }
            NeviwebEntity::DailyRequests(s) => {
                s.update();
                Ok(())
            }
        }
    }
}

#[derive(Debug)]
pub enum ServiceError {
    InvalidMode(String),
    Api(NeviwebClientError),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::InvalidMode(e) => write!(f, "{}", e),
            ServiceError::Api(e) => write!(f, "api error: {}", e),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ServiceError::Api(e) => Some(e),
            _ => None,
        }
    }
}

impl From<NeviwebClientError> for ServiceError {
    fn from(value: NeviwebClientError) -> Self {
        ServiceError::Api(value)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollSummary {
    pub polled: usize,
    pub failed: usize,
}

pub struct Platform {
    entities: Vec<NeviwebEntity>,
}

impl Platform {
    pub fn new(entities: Vec<NeviwebEntity>) -> Self {
        Platform { entities }
    }

    pub fn entities(&self) -> &[NeviwebEntity] {
        &self.entities
    }

    pub fn snapshots(&self) -> Vec<SensorSnapshot> {
        self.entities.iter().map(NeviwebEntity::snapshot).collect()
    }

    pub fn poll_all(&mut self, now: DateTime<Utc>) -> PollSummary {
        let mut summary = PollSummary::default();
        for entity in &mut self.entities {
            summary.polled += 1;
            if let Err(e) = entity.poll(now) {
                summary.failed += 1;
                error!("Polling {} failed: {}", entity.descriptor().entity_id, e);
            }
        }
        summary
    }

    /// `set_neviweb_status` service. The mode is validated first; an entity id
    /// that matches no status sensor is a logged no-op returning `Ok(false)`.
    /// On success the entity is polled again right away.
    pub fn set_neviweb_status(&mut self, entity_id: &str, mode: &str, now: DateTime<Utc>) -> Result<bool, ServiceError> {
        let mode: OccupancyMode = mode.parse().map_err(ServiceError::InvalidMode)?;

        let Some(entity) = self.entities.iter_mut().find(|e| e.descriptor().entity_id == entity_id) else {
            warn!("set_neviweb_status: no entity {}; ignoring", entity_id);
            return Ok(false);
        };
        let NeviwebEntity::Status(sensor) = entity else {
            warn!("set_neviweb_status: {} does not carry an occupancy mode; ignoring", entity_id);
            return Ok(false);
        };

        sensor.set_neviweb_status(mode)?;
        if let Err(e) = sensor.update_at(now) {
            error!("Refreshing {} after set_neviweb_status failed: {}", entity_id, e);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::NeviwebApi;
    use crate::models::neviweb::{DeviceId, DeviceSignature, GatewayDevice, HourlyStatEntry, LocationId};
    use crate::quota::{RequestCounter, RequestQuotaSource};
    use crate::sensors::testing::{FakeApi, RecordingNotifier};
    use chrono::TimeZone;
    use std::rc::Rc;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 9, 2, 10, 0).unwrap()
    }

    fn platform(api: &Rc<FakeApi>) -> Platform {
        let device = GatewayDevice {
            id: DeviceId(412_345),
            name: "Bathroom Floor".into(),
            sku: Some("DHERT105".into()),
            location_id: LocationId(9001),
            signature: Some(DeviceSignature { model: Some(740) }),
        };
        let client: Rc<dyn NeviwebApi> = api.clone();
        let counter: Rc<dyn RequestQuotaSource> = Rc::new(RequestCounter::new(now()));
        Platform::new(vec![
            NeviwebEntity::DailyRequests(DailyRequestSensor::new(counter, Box::new(RecordingNotifier::default()))),
            NeviwebEntity::Status(StatusSensor::new(client.clone(), &device)),
            NeviwebEntity::DailyEnergy(DailyEnergySensor::new(client, &device, now())),
        ])
    }

    #[test]
    fn one_failing_entity_does_not_stop_the_others() {
        let api = Rc::new(FakeApi::default());
        api.push_hourly(vec![HourlyStatEntry::new("2026-02-09T00:00:00Z", 1800.0)]);
        let mut p = platform(&api);

        let summary = p.poll_all(now());
        assert_eq!(summary, PollSummary { polled: 3, failed: 1 });
        match &p.snapshots()[2] {
            SensorSnapshot::DailyEnergy { state, .. } => assert_eq!(state.cumulative_kwh, 1.8),
            other => panic!("unexpected snapshot {:?}", other),
        }
    }

    #[test]
    fn set_status_routes_to_status_sensor_and_refreshes() {
        let api = Rc::new(FakeApi::with_status("online", "home"));
        let mut p = platform(&api);

        let handled = p.set_neviweb_status("sensor.bathroom_floor", "away", now()).unwrap();
        assert!(handled);
        assert_eq!(*api.set_calls.borrow(), vec![(LocationId(9001), OccupancyMode::Away)]);
        match &p.snapshots()[1] {
            SensorSnapshot::Status { state, .. } => assert_eq!(state.occupancy_mode.as_deref(), Some("away")),
            other => panic!("unexpected snapshot {:?}", other),
        }
    }

    #[test]
    fn unknown_entity_is_a_no_op() {
        let api = Rc::new(FakeApi::with_status("online", "home"));
        let mut p = platform(&api);

        assert!(!p.set_neviweb_status("sensor.kitchen", "home", now()).unwrap());
        assert!(!p.set_neviweb_status("sensor.bathroom_floor_daily_energy", "home", now()).unwrap());
        assert!(api.set_calls.borrow().is_empty());
    }

    #[test]
    fn invalid_mode_is_rejected_before_lookup() {
        let api = Rc::new(FakeApi::with_status("online", "home"));
        let mut p = platform(&api);

        let err = p.set_neviweb_status("sensor.bathroom_floor", "vacation", now()).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidMode(_)));
        assert!(api.set_calls.borrow().is_empty());
    }

    #[test]
    fn snapshots_serialize_with_kind_tag() {
        let api = Rc::new(FakeApi::default());
        let p = platform(&api);
        let json = serde_json::to_value(p.snapshots()).unwrap();
        assert_eq!(json[0]["kind"], "daily_requests");
        assert_eq!(json[0]["limit"], 30_000);
        assert_eq!(json[2]["kind"], "daily_energy");
        assert_eq!(json[2]["unique_id"], "412345_daily_energy");
        assert_eq!(json[2]["state_class"], "total");
        assert_eq!(json[2]["id"], 412_345);
        assert_eq!(json[2]["sku"], "DHERT105");
        assert_eq!(json[2]["cumulative_kwh"], 0.0);
    }
}
