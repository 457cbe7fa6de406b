//! The climate entity of a pool heat pump.
//!
//! Reading translates the raw datapoints into the HVAC mode, preset, temperatures and the decoded
//! fault code. Writing goes the other way: each setter produces the batch of datapoint writes that
//! has to be submitted to the device. Nothing in here talks to the device; see
//! [`crate::heatpump`] for that.

use crate::datapoints::{DatapointValue, DatapointWrites, Datapoints};
use crate::entity::{Entity, EntityKind};
use crate::profile::{DeviceProfile, TemperatureUnit};
use serde_json::{Map, Value};
use strum::VariantArray as _;

pub const SUPPORT_TARGET_TEMPERATURE: u32 = 1;
pub const SUPPORT_PRESET_MODE: u32 = 16;

/// The modes the climate entity can be switched into.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    serde::Serialize,
    strum::Display,
    strum::EnumString,
    strum::VariantArray,
    clap::ValueEnum,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum HvacMode {
    Off,
    Heat,
}

/// The mode the climate entity is currently in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, strum::Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum HvacState {
    Off,
    Heat,
    Unavailable,
}

impl From<HvacMode> for HvacState {
    fn from(value: HvacMode) -> Self {
        match value {
            HvacMode::Off => HvacState::Off,
            HvacMode::Heat => HvacState::Heat,
        }
    }
}

/// Decoded value of the fault datapoint.
///
/// Codes missing from the device's table are reported as-is.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(untagged)]
pub enum ErrorState {
    Known(&'static str),
    Unknown(i64),
}

impl std::fmt::Display for ErrorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorState::Known(description) => f.write_str(description),
            ErrorState::Unknown(code) => f.write_fmt(format_args!("{code}")),
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("`{0}` is not a preset supported by this device")]
    InvalidPreset(String),
    #[error("target temperature {requested} is outside of the supported range {min}..={max}")]
    TemperatureOutOfRange { requested: i64, min: i64, max: i64 },
}

pub struct Climate {
    profile: &'static DeviceProfile,
    temperature_unit: TemperatureUnit,
}

impl Climate {
    pub fn new(profile: &'static DeviceProfile, temperature_unit: TemperatureUnit) -> Self {
        Self { profile, temperature_unit }
    }

    pub fn profile(&self) -> &'static DeviceProfile {
        self.profile
    }

    pub fn hvac_mode(&self, dps: &Datapoints) -> HvacState {
        let key = &self.profile.hvac_mode;
        match dps.get(key) {
            DatapointValue::Boolean(true) => HvacState::Heat,
            DatapointValue::Boolean(false) => HvacState::Off,
            DatapointValue::Absent => HvacState::Unavailable,
            value => {
                tracing::debug!(%key, ?value, "could not parse hvac mode from device");
                HvacState::Unavailable
            }
        }
    }

    pub fn hvac_modes(&self) -> &'static [HvacMode] {
        HvacMode::VARIANTS
    }

    /// The label of the active preset.
    ///
    /// Preset codes the profile does not know about are reported as no preset at all.
    pub fn preset_mode(&self, dps: &Datapoints) -> Option<&'static str> {
        let key = &self.profile.preset;
        let value = dps.get(key);
        let raw = value.as_str()?;
        let Some(entry) = self.profile.preset_by_raw(raw) else {
            tracing::debug!(%key, raw, "device reported an unknown preset");
            return None;
        };
        Some(entry.label)
    }

    pub fn preset_modes(&self) -> impl Iterator<Item = &'static str> {
        self.profile.presets.iter().map(|p| p.label)
    }

    pub fn error_state(&self, dps: &Datapoints) -> Option<ErrorState> {
        let code = dps.get(&self.profile.error).as_integer()?;
        Some(match self.profile.error_description(code) {
            Some(description) => ErrorState::Known(description),
            None => ErrorState::Unknown(code),
        })
    }

    pub fn current_temperature(&self, dps: &Datapoints) -> Option<i64> {
        dps.get(&self.profile.current_temperature).as_integer()
    }

    pub fn target_temperature(&self, dps: &Datapoints) -> Option<i64> {
        dps.get(&self.profile.target_temperature).as_integer()
    }

    pub fn min_temp(&self) -> i64 {
        self.profile.min_temperature
    }

    pub fn max_temp(&self) -> i64 {
        self.profile.max_temperature
    }

    pub fn temperature_unit(&self) -> TemperatureUnit {
        self.temperature_unit
    }

    pub fn supported_features(&self) -> u32 {
        SUPPORT_TARGET_TEMPERATURE | SUPPORT_PRESET_MODE
    }

    pub fn icon(&self, dps: &Datapoints) -> Option<&'static str> {
        match self.hvac_mode(dps) {
            HvacState::Heat => Some(self.profile.heat_icon),
            HvacState::Off => Some(self.profile.off_icon),
            HvacState::Unavailable => None,
        }
    }

    pub fn extra_state_attributes(&self, dps: &Datapoints) -> Map<String, Value> {
        let mut attributes = Map::with_capacity(1);
        let error = self.error_state(dps).map(|e| serde_json::json!(e));
        attributes.insert("error".into(), error.unwrap_or(Value::Null));
        attributes
    }

    pub fn set_hvac_mode(&self, mode: HvacMode) -> DatapointWrites {
        DatapointWrites::single(self.profile.hvac_mode.clone(), mode == HvacMode::Heat)
    }

    pub fn set_preset_mode(&self, label: &str) -> Result<DatapointWrites, Error> {
        let entry = self
            .profile
            .preset_by_label(label)
            .ok_or_else(|| Error::InvalidPreset(label.to_string()))?;
        Ok(DatapointWrites::single(self.profile.preset.clone(), entry.raw))
    }

    pub fn set_target_temperature(&self, temperature: i64) -> Result<DatapointWrites, Error> {
        let (min, max) = (self.min_temp(), self.max_temp());
        if !(min..=max).contains(&temperature) {
            return Err(Error::TemperatureOutOfRange { requested: temperature, min, max });
        }
        Ok(DatapointWrites::single(self.profile.target_temperature.clone(), temperature))
    }

    /// Set the target temperature and the preset in one go.
    ///
    /// Older clients pass the preset along with the temperature. Whatever is given ends up in a
    /// single batch, so the device sees one combined request. Both parts are validated before
    /// anything is produced; an empty batch is returned if neither is given.
    pub fn set_temperature(
        &self,
        temperature: Option<i64>,
        preset_mode: Option<&str>,
    ) -> Result<DatapointWrites, Error> {
        let mut writes = DatapointWrites::new();
        if let Some(temperature) = temperature {
            writes.merge(self.set_target_temperature(temperature)?);
        }
        if let Some(label) = preset_mode {
            writes.merge(self.set_preset_mode(label)?);
        }
        Ok(writes)
    }
}

impl Entity for Climate {
    fn entity_id(&self) -> &'static str {
        "climate"
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Climate
    }

    fn attributes(&self, dps: &Datapoints) -> Map<String, Value> {
        let mut attributes = Map::new();
        attributes.insert("state".into(), self.hvac_mode(dps).to_string().into());
        attributes.insert("hvac_modes".into(), serde_json::json!(self.hvac_modes()));
        attributes.insert("preset_mode".into(), self.preset_mode(dps).into());
        attributes.insert("preset_modes".into(), self.preset_modes().collect::<Vec<_>>().into());
        attributes.insert("temperature".into(), self.target_temperature(dps).into());
        attributes.insert("current_temperature".into(), self.current_temperature(dps).into());
        attributes.insert("min_temp".into(), self.min_temp().into());
        attributes.insert("max_temp".into(), self.max_temp().into());
        attributes.insert("temperature_unit".into(), self.temperature_unit().to_string().into());
        attributes.insert("supported_features".into(), self.supported_features().into());
        attributes.insert("icon".into(), self.icon(dps).into());
        attributes.extend(self.extra_state_attributes(dps));
        attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datapoints::DatapointKey;
    use crate::profile::POOLEX_QLINE;

    const HVACMODE_DPS: DatapointKey = DatapointKey::new_const("1");
    const PRESET_DPS: DatapointKey = DatapointKey::new_const("2");
    const TEMPERATURE_DPS: DatapointKey = DatapointKey::new_const("4");
    const ERROR_DPS: DatapointKey = DatapointKey::new_const("15");
    const CURRENTTEMP_DPS: DatapointKey = DatapointKey::new_const("16");

    fn subject() -> Climate {
        Climate::new(&POOLEX_QLINE, TemperatureUnit::Celsius)
    }

    fn with(key: DatapointKey, value: impl Into<DatapointValue>) -> Datapoints {
        let mut dps = Datapoints::new();
        dps.set(key, value.into());
        dps
    }

    #[test]
    fn hvac_mode() {
        let subject = subject();
        assert_eq!(subject.hvac_mode(&with(HVACMODE_DPS, true)), HvacState::Heat);
        assert_eq!(subject.hvac_mode(&with(HVACMODE_DPS, false)), HvacState::Off);
        assert_eq!(
            subject.hvac_mode(&with(HVACMODE_DPS, DatapointValue::Absent)),
            HvacState::Unavailable
        );
        assert_eq!(subject.hvac_mode(&with(HVACMODE_DPS, "on")), HvacState::Unavailable);
    }

    #[test]
    fn hvac_modes() {
        assert_eq!(subject().hvac_modes(), [HvacMode::Off, HvacMode::Heat]);
    }

    #[test]
    fn icon() {
        let subject = subject();
        assert_eq!(subject.icon(&with(HVACMODE_DPS, true)), Some("mdi:hot-tub"));
        assert_eq!(subject.icon(&with(HVACMODE_DPS, false)), Some("mdi:hvac-off"));
        assert_eq!(subject.icon(&Datapoints::new()), None);
    }

    #[test]
    fn supported_features() {
        assert_eq!(subject().supported_features(), SUPPORT_TARGET_TEMPERATURE | SUPPORT_PRESET_MODE);
    }

    #[test]
    fn temperature_unit_returns_device_temperature_unit() {
        let subject = Climate::new(&POOLEX_QLINE, TemperatureUnit::Fahrenheit);
        assert_eq!(subject.temperature_unit(), TemperatureUnit::Fahrenheit);
    }

    #[test]
    fn current_temperature() {
        assert_eq!(subject().current_temperature(&with(CURRENTTEMP_DPS, 25_i64)), Some(25));
        assert_eq!(subject().current_temperature(&Datapoints::new()), None);
    }

    #[test]
    fn target_temperature() {
        let subject = subject();
        assert_eq!(subject.target_temperature(&with(TEMPERATURE_DPS, 28_i64)), Some(28));
        assert_eq!(subject.min_temp(), 15);
        assert_eq!(subject.max_temp(), 40);
    }

    #[test]
    fn preset_mode() {
        let subject = subject();
        assert_eq!(subject.preset_mode(&with(PRESET_DPS, "heating")), Some("Heat"));
        assert_eq!(subject.preset_mode(&with(PRESET_DPS, "cold")), Some("Cool"));
        assert_eq!(subject.preset_mode(&with(PRESET_DPS, "mute")), Some("Silent Heat"));
        assert_eq!(subject.preset_mode(&with(PRESET_DPS, DatapointValue::Absent)), None);
        assert_eq!(subject.preset_mode(&with(PRESET_DPS, "turbo")), None);
    }

    #[test]
    fn preset_modes() {
        let modes = subject().preset_modes().collect::<Vec<_>>();
        assert_eq!(modes, ["Heat", "Cool", "Silent Heat"]);
    }

    #[test]
    fn preset_labels_round_trip_to_raw_codes() {
        let subject = subject();
        for entry in POOLEX_QLINE.presets {
            let dps = with(PRESET_DPS, entry.raw);
            assert_eq!(subject.preset_mode(&dps), Some(entry.label));
            let writes = subject.set_preset_mode(entry.label).unwrap();
            assert_eq!(writes, DatapointWrites::single(PRESET_DPS, entry.raw));
        }
    }

    #[test]
    fn set_unknown_preset_is_rejected() {
        assert_eq!(
            subject().set_preset_mode("Turbo"),
            Err(Error::InvalidPreset("Turbo".to_string()))
        );
    }

    #[test]
    fn error_state() {
        let subject = subject();
        let attributes = |code: i64| subject.extra_state_attributes(&with(ERROR_DPS, code));
        assert_eq!(Value::Object(attributes(0)), serde_json::json!({"error": "OK"}));
        assert_eq!(
            Value::Object(attributes(1)),
            serde_json::json!({"error": "Water Flow Protection"})
        );
        assert_eq!(Value::Object(attributes(2)), serde_json::json!({"error": 2}));
        assert_eq!(subject.error_state(&with(ERROR_DPS, 2_i64)), Some(ErrorState::Unknown(2)));
        assert_eq!(subject.error_state(&Datapoints::new()), None);
    }

    #[test]
    fn turn_on_and_off() {
        let subject = subject();
        assert_eq!(subject.set_hvac_mode(HvacMode::Heat), DatapointWrites::single(HVACMODE_DPS, true));
        assert_eq!(subject.set_hvac_mode(HvacMode::Off), DatapointWrites::single(HVACMODE_DPS, false));
    }

    #[test]
    fn set_target_temperature_respects_range() {
        let subject = subject();
        assert_eq!(
            subject.set_target_temperature(24),
            Ok(DatapointWrites::single(TEMPERATURE_DPS, 24_i64))
        );
        assert!(subject.set_target_temperature(15).is_ok());
        assert!(subject.set_target_temperature(40).is_ok());
        assert_eq!(
            subject.set_target_temperature(41),
            Err(Error::TemperatureOutOfRange { requested: 41, min: 15, max: 40 })
        );
        assert!(subject.set_target_temperature(14).is_err());
    }

    #[test]
    fn legacy_set_temperature_with_preset_mode() {
        let writes = subject().set_temperature(None, Some("Cool")).unwrap();
        assert_eq!(writes, DatapointWrites::single(PRESET_DPS, "cold"));
    }

    #[test]
    fn legacy_set_temperature_with_both_properties() {
        let writes = subject().set_temperature(Some(26), Some("Heat")).unwrap();
        let mut expected = DatapointWrites::single(TEMPERATURE_DPS, 26_i64);
        expected.insert(PRESET_DPS, "heating");
        assert_eq!(writes, expected);
        assert_eq!(writes.len(), 2);
    }

    #[test]
    fn legacy_set_temperature_validates_everything_first() {
        let subject = subject();
        assert!(subject.set_temperature(Some(26), Some("Turbo")).is_err());
        assert!(subject.set_temperature(Some(99), Some("Heat")).is_err());
        assert_eq!(subject.set_temperature(None, None), Ok(DatapointWrites::new()));
    }

    #[test]
    fn attributes_cover_the_entity_state() {
        let mut dps = with(HVACMODE_DPS, true);
        dps.set(PRESET_DPS, "mute".into());
        dps.set(TEMPERATURE_DPS, 27_i64.into());
        dps.set(CURRENTTEMP_DPS, 22_i64.into());
        dps.set(ERROR_DPS, 0_i64.into());
        let attributes = subject().attributes(&dps);
        assert_eq!(
            Value::Object(attributes),
            serde_json::json!({
                "state": "heat",
                "hvac_modes": ["off", "heat"],
                "preset_mode": "Silent Heat",
                "preset_modes": ["Heat", "Cool", "Silent Heat"],
                "temperature": 27,
                "current_temperature": 22,
                "min_temp": 15,
                "max_temp": 40,
                "temperature_unit": "°C",
                "supported_features": 17,
                "icon": "mdi:hot-tub",
                "error": "OK",
            })
        );
    }
}
