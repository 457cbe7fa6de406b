pub mod binary_sensor;
pub mod climate;

use crate::datapoints::Datapoints;
use crate::profile::{DeviceProfile, TemperatureUnit};
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Climate,
    BinarySensor,
}

/// Secondary entities are not part of the primary device controls.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, strum::Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EntityCategory {
    Config,
    Diagnostic,
}

/// A user-facing view over a subset of the device datapoints.
pub trait Entity: Send + Sync {
    fn entity_id(&self) -> &'static str;
    fn kind(&self) -> EntityKind;
    fn category(&self) -> Option<EntityCategory> {
        None
    }
    /// Every attribute of the entity, as computed from the current datapoint state.
    ///
    /// The `state` attribute is always present.
    fn attributes(&self, dps: &Datapoints) -> Map<String, Value>;
}

/// All entities exposed for a device built according to `profile`.
pub fn entities(profile: &'static DeviceProfile, unit: TemperatureUnit) -> Vec<Box<dyn Entity>> {
    vec![
        Box::new(climate::Climate::new(profile, unit)) as Box<dyn Entity>,
        Box::new(binary_sensor::WaterFlowSensor::new(profile)) as _,
    ]
}
