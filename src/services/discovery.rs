use crate::client::{NeviwebApi, NeviwebClient};
use crate::models::neviweb::{GatewayDevice, Location};
use crate::notify::Notifier;
use crate::quota::RequestQuotaSource;
use crate::sensors::{DailyEnergySensor, DailyRequestSensor, StatusSensor};
use crate::services::platform::NeviwebEntity;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::rc::Rc;

/// DITRA-HEAT-E-RS1
pub const IMPLEMENTED_THERMOSTAT_MODELS: [i64; 1] = [740];

/// Locations to poll: those named in `networks`, or all of them when none are named.
pub fn select_locations(locations: Vec<Location>, networks: &[String]) -> Vec<Location> {
    if networks.is_empty() {
        return locations;
    }
    let selected: Vec<Location> = locations
        .into_iter()
        .filter(|loc| loc.name.as_ref().is_some_and(|n| networks.iter().any(|w| w == n)))
        .collect();
    if selected.len() < networks.len() {
        warn!(
            "Only {} of {} configured network(s) found on the account",
            selected.len(),
            networks.len()
        );
    }
    selected
}

pub fn is_supported(device: &GatewayDevice) -> bool {
    device
        .model()
        .is_some_and(|m| IMPLEMENTED_THERMOSTAT_MODELS.contains(&m))
}

/// Fetch every supported thermostat from the selected locations.
pub fn discover_devices(client: &NeviwebClient, networks: &[String]) -> Result<Vec<GatewayDevice>, String> {
    let locations = client
        .get_locations()
        .map_err(|e| format!("get_locations failed: {}", e))?;
    let locations = select_locations(locations, networks);
    if locations.is_empty() {
        return Err("No matching Neviweb locations found".into());
    }

    let mut devices = Vec::new();
    for loc in &locations {
        let all = client
            .get_devices(loc.id)
            .map_err(|e| format!("get_devices({}) failed: {}", loc.id, e))?;
        let total = all.len();
        devices.extend(all.into_iter().filter(is_supported));
        info!(
            "Location {} ({}): {} device(s), {} supported so far",
            loc.id,
            loc.name.as_deref().unwrap_or("-"),
            total,
            devices.len()
        );
    }
    Ok(devices)
}

/// A status and a daily energy sensor per device, then the account's request
/// sensor. The request sensor goes last so each poll reports the calls made by
/// the sensors before it in the same tick.
pub fn build_entities(
    client: Rc<dyn NeviwebApi>,
    devices: &[GatewayDevice],
    quota: Rc<dyn RequestQuotaSource>,
    notifier: Box<dyn Notifier>,
    now: DateTime<Utc>,
) -> Vec<NeviwebEntity> {
    let mut entities = Vec::new();
    for device in devices.iter().filter(|d| is_supported(d)) {
        debug!("Creating sensors for {} ({})", device.name, device.id);
        entities.push(NeviwebEntity::Status(StatusSensor::new(client.clone(), device)));
        entities.push(NeviwebEntity::DailyEnergy(DailyEnergySensor::new(
            client.clone(),
            device,
            now,
        )));
    }
    entities.push(NeviwebEntity::DailyRequests(DailyRequestSensor::new(quota, notifier)));
    dedupe_entity_ids(&mut entities);
    entities
}

/// Later entities whose id is already taken get `_2`, `_3`, ... appended.
fn dedupe_entity_ids(entities: &mut [NeviwebEntity]) {
    let mut taken = HashSet::new();
    for entity in entities.iter_mut() {
        let descriptor = entity.descriptor_mut();
        if !taken.contains(&descriptor.entity_id) {
            taken.insert(descriptor.entity_id.clone());
            continue;
        }
        let base = descriptor.entity_id.clone();
        let mut n = 2;
        while taken.contains(&format!("{}_{}", base, n)) {
            n += 1;
        }
        descriptor.entity_id = format!("{}_{}", base, n);
        warn!("Entity id {} already in use; registered as {}", base, descriptor.entity_id);
        taken.insert(descriptor.entity_id.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::neviweb::{DeviceId, DeviceSignature, LocationId, OccupancyMode};
    use crate::services::platform::Platform;
    use crate::quota::RequestCounter;
    use crate::sensors::testing::{FakeApi, RecordingNotifier};
    use chrono::TimeZone;

    fn load_devices() -> Vec<GatewayDevice> {
        let json = std::fs::read_to_string("tests/data/devices.json").expect("fixture present");
        serde_json::from_str(&json).expect("parse devices")
    }

    fn loc(id: i64, name: Option<&str>) -> Location {
        Location {
            id: LocationId(id),
            name: name.map(str::to_string),
        }
    }

    #[test]
    fn only_model_740_is_supported() {
        let devices = load_devices();
        let supported: Vec<_> = devices.iter().filter(|d| is_supported(d)).map(|d| d.id.0).collect();
        assert_eq!(supported, vec![412_345]);
    }

    #[test]
    fn builds_two_per_device_then_request_sensor() {
        let now = Utc.with_ymd_and_hms(2026, 2, 9, 8, 0, 0).unwrap();
        let client: Rc<dyn NeviwebApi> = Rc::new(FakeApi::default());
        let quota: Rc<dyn RequestQuotaSource> = Rc::new(RequestCounter::new(now));
        let entities = build_entities(
            client,
            &load_devices(),
            quota,
            Box::new(RecordingNotifier::default()),
            now,
        );
        let ids: Vec<_> = entities.iter().map(|e| e.descriptor().unique_id.clone()).collect();
        assert_eq!(ids, vec!["412345", "412345_daily_energy", "neviweb_daily_requests"]);
    }

    #[test]
    fn selects_named_networks_or_everything() {
        let all = vec![loc(1, Some("Home")), loc(2, Some("Cottage")), loc(3, None)];
        assert_eq!(select_locations(all.clone(), &[]).len(), 3);

        let picked = select_locations(all.clone(), &["Cottage".to_string()]);
        assert_eq!(picked.iter().map(|l| l.id.0).collect::<Vec<_>>(), vec![2]);

        let picked = select_locations(all, &["Home".to_string(), "Chalet".to_string()]);
        assert_eq!(picked.len(), 1);
    }

    fn floor(id: i64, location: i64) -> GatewayDevice {
        GatewayDevice {
            id: DeviceId(id),
            name: "Floor".into(),
            sku: None,
            location_id: LocationId(location),
            signature: Some(DeviceSignature { model: Some(740) }),
        }
    }

    #[test]
    fn same_named_devices_get_distinct_entity_ids() {
        let now = Utc.with_ymd_and_hms(2026, 2, 9, 8, 0, 0).unwrap();
        let api = Rc::new(FakeApi::with_status("online", "home"));
        let client: Rc<dyn NeviwebApi> = api.clone();
        let quota: Rc<dyn RequestQuotaSource> = Rc::new(RequestCounter::new(now));
        let entities = build_entities(
            client,
            &[floor(1, 100), floor(2, 200)],
            quota,
            Box::new(RecordingNotifier::default()),
            now,
        );
        let ids: Vec<_> = entities.iter().map(|e| e.descriptor().entity_id.clone()).collect();
        assert_eq!(
            ids,
            vec![
                "sensor.floor",
                "sensor.floor_daily_energy",
                "sensor.floor_2",
                "sensor.floor_daily_energy_2",
                "sensor.neviweb_daily_requests",
            ]
        );

        let mut platform = Platform::new(entities);
        assert!(platform.set_neviweb_status("sensor.floor_2", "away", now).unwrap());
        assert_eq!(*api.set_calls.borrow(), vec![(LocationId(200), OccupancyMode::Away)]);
    }
}
