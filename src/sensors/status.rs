//! Gateway status and location occupancy for one thermostat.

use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use std::rc::Rc;
use std::time::Instant;

use super::SensorDescriptor;
use crate::client::{NeviwebApi, NeviwebClientError};
use crate::models::neviweb::{DeviceId, GatewayDevice, LocationId, OccupancyMode};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusState {
    pub gateway_status: Option<String>,
    pub occupancy_mode: Option<String>,
    pub sku: Option<String>,
    pub location: LocationId,
    pub last_polled: Option<DateTime<Utc>>,
}

pub struct StatusSensor {
    descriptor: SensorDescriptor,
    device_id: DeviceId,
    client: Rc<dyn NeviwebApi>,
    state: StatusState,
}

impl StatusSensor {
    pub fn new(client: Rc<dyn NeviwebApi>, device: &GatewayDevice) -> Self {
        let descriptor = SensorDescriptor::new(device.id.to_string(), device.name.clone());
        debug!("Setting up {}: device {} at location {}", descriptor.name, device.id, device.location_id);
        StatusSensor {
            descriptor,
            device_id: device.id,
            client,
            state: StatusState {
                gateway_status: None,
                occupancy_mode: None,
                sku: device.sku.clone(),
                location: device.location_id,
                last_polled: None,
            },
        }
    }

    pub fn descriptor(&self) -> &SensorDescriptor {
        &self.descriptor
    }

    pub fn descriptor_mut(&mut self) -> &mut SensorDescriptor {
        &mut self.descriptor
    }

    pub fn state(&self) -> &StatusState {
        &self.state
    }

    /// Both calls must succeed before anything is stored.
    pub fn update_at(&mut self, now: DateTime<Utc>) -> Result<(), NeviwebClientError> {
        let start = Instant::now();
        let device_status = self.client.get_device_status(self.device_id)?;
        let location_status = self.client.get_neviweb_status(self.state.location)?;
        debug!(
            "Updating {} ({:.3} sec): status={} occupancy={}",
            self.descriptor.name,
            start.elapsed().as_secs_f64(),
            device_status.status,
            location_status.occupancy_mode
        );
        self.state.gateway_status = Some(device_status.status);
        self.state.occupancy_mode = Some(location_status.occupancy_mode);
        self.state.last_polled = Some(now);
        Ok(())
    }

    /// Set the occupancy mode of the whole location this device belongs to.
    pub fn set_neviweb_status(&self, mode: OccupancyMode) -> Result<(), NeviwebClientError> {
        self.client.set_neviweb_status(self.state.location, mode)
    }
}
