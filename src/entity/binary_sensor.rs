use crate::datapoints::{DatapointValue, Datapoints};
use crate::entity::{Entity, EntityCategory, EntityKind};
use crate::profile::DeviceProfile;
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, strum::Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BinarySensorDeviceClass {
    Problem,
}

/// Reports a problem while the water flow protection of the heat pump is tripped.
///
/// Shares the fault datapoint with the climate entity's `error` attribute.
pub struct WaterFlowSensor {
    profile: &'static DeviceProfile,
}

impl WaterFlowSensor {
    pub fn new(profile: &'static DeviceProfile) -> Self {
        Self { profile }
    }

    /// `None` while the fault datapoint is unavailable.
    pub fn is_on(&self, dps: &Datapoints) -> Option<bool> {
        let key = &self.profile.error;
        match dps.get(key) {
            DatapointValue::Integer(code) => Some(*code == self.profile.water_flow_fault),
            DatapointValue::Absent => None,
            value => {
                tracing::debug!(%key, ?value, "could not parse fault code from device");
                None
            }
        }
    }

    pub fn device_class(&self) -> BinarySensorDeviceClass {
        BinarySensorDeviceClass::Problem
    }
}

impl Entity for WaterFlowSensor {
    fn entity_id(&self) -> &'static str {
        "binary_sensor_water_flow"
    }

    fn kind(&self) -> EntityKind {
        EntityKind::BinarySensor
    }

    fn category(&self) -> Option<EntityCategory> {
        Some(EntityCategory::Diagnostic)
    }

    fn attributes(&self, dps: &Datapoints) -> Map<String, Value> {
        let state = match self.is_on(dps) {
            Some(true) => "on",
            Some(false) => "off",
            None => "unavailable",
        };
        let mut attributes = Map::with_capacity(2);
        attributes.insert("state".into(), state.into());
        attributes.insert("device_class".into(), self.device_class().to_string().into());
        attributes
    }
}
