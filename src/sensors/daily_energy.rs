//! Daily energy total for one thermostat, rebuilt from Neviweb's hourly statistics.
//!
//! The poll is throttled to one refresh per clock-hour (UTC), and never in the
//! first [`GRACE_MINUTES`] of the hour so the API has time to close the hour
//! that just ended. Each refresh recomputes the total from every hourly entry
//! at or after today's UTC midnight; nothing is accumulated incrementally.

use chrono::{DateTime, Timelike, Utc};
use log::{debug, error};
use serde::Serialize;
use std::rc::Rc;

use super::{DeviceClass, DeviceInfo, MANUFACTURER, SensorDescriptor, StateClass};
use crate::client::{NeviwebApi, NeviwebClientError};
use crate::models::neviweb::{DeviceId, GatewayDevice, HourlyStatEntry};
use crate::utils::{parse_iso_timestamp, round_to, utc_midnight};

pub const GRACE_MINUTES: u32 = 5;
const KWH_DECIMALS: i32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyEnergyState {
    pub cumulative_kwh: f64,
    /// UTC midnight the current total counts from.
    pub last_reset: DateTime<Utc>,
    /// Hour (UTC) of the last refresh attempt; `None` until the first one.
    pub last_update_hour: Option<u32>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyUpdated,
    GracePeriod,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnergyPollOutcome {
    Skipped(SkipReason),
    Updated { kwh: f64, entries: usize },
    /// Nothing at or after midnight; previous reading kept.
    NoEntries,
    /// Fetch failed; previous reading kept.
    Failed,
}

pub struct DailyEnergySensor {
    descriptor: SensorDescriptor,
    device_id: DeviceId,
    sku: Option<String>,
    client: Rc<dyn NeviwebApi>,
    state: DailyEnergyState,
}

impl DailyEnergySensor {
    pub fn new(client: Rc<dyn NeviwebApi>, device: &GatewayDevice, now: DateTime<Utc>) -> Self {
        let mut descriptor = SensorDescriptor::new(
            format!("{}_daily_energy", device.id),
            format!("{} Daily Energy", device.name),
        );
        descriptor.icon = Some("mdi:flash");
        descriptor.unit_of_measurement = Some("kWh");
        descriptor.device_class = Some(DeviceClass::Energy);
        descriptor.state_class = Some(StateClass::Total);
        descriptor.device_info = Some(DeviceInfo {
            identifier: device.id.to_string(),
            name: device.name.clone(),
            manufacturer: MANUFACTURER,
            model: device.sku.clone(),
        });

        debug!("Setting up daily energy sensor {} for device {}", descriptor.name, device.id);
        DailyEnergySensor {
            descriptor,
            device_id: device.id,
            sku: device.sku.clone(),
            client,
            state: DailyEnergyState {
                cumulative_kwh: 0.0,
                last_reset: utc_midnight(now),
                last_update_hour: None,
            },
        }
    }

    pub fn descriptor(&self) -> &SensorDescriptor {
        &self.descriptor
    }

    pub fn descriptor_mut(&mut self) -> &mut SensorDescriptor {
        &mut self.descriptor
    }

    pub fn state(&self) -> &DailyEnergyState {
        &self.state
    }

    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    pub fn sku(&self) -> Option<&str> {
        self.sku.as_deref()
    }

    pub fn update_at(&mut self, now: DateTime<Utc>) -> EnergyPollOutcome {
        let hour = now.hour();
        if self.state.last_update_hour == Some(hour) {
            return EnergyPollOutcome::Skipped(SkipReason::AlreadyUpdated);
        }
        if now.minute() < GRACE_MINUTES {
            return EnergyPollOutcome::Skipped(SkipReason::GracePeriod);
        }

        let outcome = match self.refresh(now) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Error updating daily energy for {}: {}", self.descriptor.name, e);
                EnergyPollOutcome::Failed
            }
        };
        // advance even on failure: one attempt per hour
        self.state.last_update_hour = Some(hour);
        outcome
    }

    fn refresh(&mut self, now: DateTime<Utc>) -> Result<EnergyPollOutcome, NeviwebClientError> {
        let stats = self.client.get_device_hourly_stats(self.device_id)?;
        debug!("Hourly stats for {}: {} entries", self.descriptor.name, stats.len());
        if stats.is_empty() {
            debug!("No hourly stats available for {}", self.descriptor.name);
            return Ok(EnergyPollOutcome::NoEntries);
        }

        let midnight = utc_midnight(now);
        let (total_wh, count) = sum_since(&stats, midnight, &self.descriptor.name);
        if count == 0 {
            debug!("No entries from current day for {}", self.descriptor.name);
            return Ok(EnergyPollOutcome::NoEntries);
        }

        let kwh = round_to(total_wh / 1000.0, KWH_DECIMALS);
        self.state.cumulative_kwh = kwh;
        self.state.last_reset = midnight;
        debug!(
            "Updated cumulative daily energy for {}: {} kWh ({} entries since midnight)",
            self.descriptor.name, kwh, count
        );
        Ok(EnergyPollOutcome::Updated { kwh, entries: count })
    }
}

/// Sum `period` (Wh) of the entries stamped at or after `since`. Returns the sum
/// and the number of entries counted.
fn sum_since(entries: &[HourlyStatEntry], since: DateTime<Utc>, sensor: &str) -> (f64, usize) {
    let mut total = 0.0;
    let mut count = 0;
    for entry in entries {
        let Some(raw) = entry.date.as_deref() else {
            debug!("Skipping hourly entry without date for {}", sensor);
            continue;
        };
        match parse_iso_timestamp(raw) {
            Ok(ts) if ts >= since => {
                total += entry.period_wh();
                count += 1;
            }
            Ok(_) => {}
            Err(e) => error!("Failed to parse timestamp for {}: {}", sensor, e),
        }
    }
    (total, count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::neviweb::{DeviceSignature, LocationId};
    use crate::sensors::testing::FakeApi;
    use chrono::TimeZone;

    fn device() -> GatewayDevice {
        GatewayDevice {
            id: DeviceId(412_345),
            name: "Bathroom Floor".into(),
            sku: Some("DHERT105".into()),
            location_id: LocationId(9001),
            signature: Some(DeviceSignature { model: Some(740) }),
        }
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 9, h, m, 0).unwrap()
    }

    fn sensor(api: &Rc<FakeApi>) -> DailyEnergySensor {
        let client: Rc<dyn NeviwebApi> = api.clone();
        DailyEnergySensor::new(client, &device(), at(0, 1))
    }

    fn night_entries() -> Vec<HourlyStatEntry> {
        vec![
            HourlyStatEntry::new("2026-02-08T23:00:00.000Z", 500.0),
            HourlyStatEntry::new("2026-02-09T00:30:00.000Z", 1000.0),
            HourlyStatEntry::new("2026-02-09T01:15:00.000Z", 2000.0),
        ]
    }

    #[test]
    fn identity_and_metadata() {
        let api = Rc::new(FakeApi::default());
        let s = sensor(&api);
        let d = s.descriptor();
        assert_eq!(d.unique_id, "412345_daily_energy");
        assert_eq!(d.entity_id, "sensor.bathroom_floor_daily_energy");
        assert_eq!(d.unit_of_measurement, Some("kWh"));
        assert_eq!(d.state_class, Some(StateClass::Total));
        assert_eq!(d.device_info.as_ref().map(|i| i.manufacturer), Some("Schluter"));
        assert_eq!(s.sku(), Some("DHERT105"));
        assert_eq!(s.state().cumulative_kwh, 0.0);
        assert_eq!(s.state().last_reset, at(0, 0));
        assert_eq!(s.state().last_update_hour, None);
    }

    #[test]
    fn sums_only_entries_since_utc_midnight() {
        let api = Rc::new(FakeApi::default());
        api.push_hourly(night_entries());
        let mut s = sensor(&api);

        let outcome = s.update_at(at(2, 10));
        assert_eq!(outcome, EnergyPollOutcome::Updated { kwh: 3.0, entries: 2 });
        assert_eq!(s.state().cumulative_kwh, 3.0);
        assert_eq!(s.state().last_reset, at(0, 0));
        assert_eq!(s.state().last_update_hour, Some(2));
    }

    #[test]
    fn entry_exactly_at_midnight_is_included() {
        let api = Rc::new(FakeApi::default());
        api.push_hourly(vec![
            HourlyStatEntry::new("2026-02-08T23:59:59.999Z", 400.0),
            HourlyStatEntry::new("2026-02-09T00:00:00.000Z", 1234.0),
        ]);
        let mut s = sensor(&api);
        s.update_at(at(1, 6));
        assert_eq!(s.state().cumulative_kwh, 1.234);
    }

    #[test]
    fn at_most_one_fetch_per_hour() {
        let api = Rc::new(FakeApi::default());
        api.push_hourly(night_entries());
        api.push_hourly(night_entries());
        let mut s = sensor(&api);

        assert!(matches!(s.update_at(at(2, 5)), EnergyPollOutcome::Updated { .. }));
        for minute in [6, 30, 59] {
            assert_eq!(
                s.update_at(at(2, minute)),
                EnergyPollOutcome::Skipped(SkipReason::AlreadyUpdated)
            );
        }
        assert_eq!(api.hourly_calls.get(), 1);

        assert!(matches!(s.update_at(at(3, 7)), EnergyPollOutcome::Updated { .. }));
        assert_eq!(api.hourly_calls.get(), 2);
    }

    #[test]
    fn grace_period_is_exclusive_of_minute_five() {
        let api = Rc::new(FakeApi::default());
        api.push_hourly(night_entries());
        let mut s = sensor(&api);

        assert_eq!(s.update_at(at(2, 3)), EnergyPollOutcome::Skipped(SkipReason::GracePeriod));
        assert_eq!(s.state().last_update_hour, None);
        assert_eq!(api.hourly_calls.get(), 0);

        assert!(matches!(s.update_at(at(2, 5)), EnergyPollOutcome::Updated { .. }));
        assert_eq!(s.state().last_update_hour, Some(2));
    }

    #[test]
    fn malformed_timestamp_is_excluded() {
        let api = Rc::new(FakeApi::default());
        let mut entries = night_entries();
        entries.insert(1, HourlyStatEntry::new("not-a-date", 9999.0));
        entries.push(HourlyStatEntry {
            date: None,
            period: Some(750.0),
        });
        api.push_hourly(entries);
        let mut s = sensor(&api);

        assert_eq!(s.update_at(at(2, 10)), EnergyPollOutcome::Updated { kwh: 3.0, entries: 2 });
    }

    #[test]
    fn missing_period_counts_as_zero() {
        let api = Rc::new(FakeApi::default());
        api.push_hourly(vec![
            HourlyStatEntry::new("2026-02-09T00:00:00Z", 1500.0),
            HourlyStatEntry {
                date: Some("2026-02-09T01:00:00Z".into()),
                period: None,
            },
        ]);
        let mut s = sensor(&api);
        assert_eq!(s.update_at(at(2, 10)), EnergyPollOutcome::Updated { kwh: 1.5, entries: 2 });
    }

    #[test]
    fn empty_day_keeps_previous_reading() {
        let api = Rc::new(FakeApi::default());
        api.push_hourly(vec![HourlyStatEntry::new("2026-02-09T00:00:00Z", 5200.0)]);
        api.push_hourly(vec![HourlyStatEntry::new("2026-02-08T22:00:00Z", 800.0)]);
        api.push_hourly(Vec::new());
        let mut s = sensor(&api);

        s.update_at(at(1, 10));
        assert_eq!(s.state().cumulative_kwh, 5.2);

        assert_eq!(s.update_at(at(2, 10)), EnergyPollOutcome::NoEntries);
        assert_eq!(s.state().cumulative_kwh, 5.2);

        assert_eq!(s.update_at(at(3, 10)), EnergyPollOutcome::NoEntries);
        assert_eq!(s.state().cumulative_kwh, 5.2);
        assert_eq!(s.state().last_update_hour, Some(3));
    }

    #[test]
    fn fetch_failure_keeps_reading_and_advances_hour() {
        let api = Rc::new(FakeApi::default());
        api.push_hourly(vec![HourlyStatEntry::new("2026-02-09T00:00:00Z", 2500.0)]);
        api.push_hourly_error(NeviwebClientError::Transport("timed out".into()));
        let mut s = sensor(&api);

        s.update_at(at(1, 10));
        assert_eq!(s.update_at(at(2, 10)), EnergyPollOutcome::Failed);
        assert_eq!(s.state().cumulative_kwh, 2.5);
        assert_eq!(s.state().last_update_hour, Some(2));

        assert_eq!(
            s.update_at(at(2, 40)),
            EnergyPollOutcome::Skipped(SkipReason::AlreadyUpdated)
        );
        assert_eq!(api.hourly_calls.get(), 2);
    }

    #[test]
    fn recomputes_and_resets_on_new_day() {
        let api = Rc::new(FakeApi::default());
        api.push_hourly(vec![
            HourlyStatEntry::new("2026-02-09T21:00:00Z", 3000.0),
            HourlyStatEntry::new("2026-02-09T22:00:00Z", 3000.0),
        ]);
        api.push_hourly(vec![
            HourlyStatEntry::new("2026-02-09T22:00:00Z", 3000.0),
            HourlyStatEntry::new("2026-02-09T23:00:00Z", 3000.0),
            HourlyStatEntry::new("2026-02-10T00:00:00Z", 420.0),
        ]);
        let mut s = sensor(&api);

        s.update_at(at(23, 10));
        assert_eq!(s.state().cumulative_kwh, 6.0);

        let next_day = Utc.with_ymd_and_hms(2026, 2, 10, 1, 5, 0).unwrap();
        assert_eq!(s.update_at(next_day), EnergyPollOutcome::Updated { kwh: 0.42, entries: 1 });
        assert_eq!(s.state().last_reset, Utc.with_ymd_and_hms(2026, 2, 10, 0, 0, 0).unwrap());
    }

    #[test]
    fn fixture_sums_to_three_kwh() {
        let json = std::fs::read_to_string("tests/data/hourly-stats.json").expect("fixture present");
        let resp: crate::models::neviweb::HourlyStatsResponse = serde_json::from_str(&json).expect("parse");
        let entries = resp.history.unwrap_or_default();
        let (wh, count) = sum_since(&entries, at(0, 0), "fixture");
        assert_eq!(wh, 3000.0);
        assert_eq!(count, 3);
    }
}
