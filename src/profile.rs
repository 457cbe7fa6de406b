//! Static descriptions of the supported heat pump models.
//!
//! A profile ties the model-specific datapoint keys to the lookup tables used when translating
//! raw values into entity state and back. Everything in here is immutable and lives for the
//! entire duration of the program.

use crate::datapoints::DatapointKey;

/// A preset as known to the device (`raw`) and as shown to the user (`label`).
#[derive(Debug)]
pub struct PresetEntry {
    pub raw: &'static str,
    pub label: &'static str,
}

#[derive(Debug)]
pub struct ErrorCodeEntry {
    pub code: i64,
    pub description: &'static str,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, strum::Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DatapointKind {
    Boolean,
    Integer,
    String,
}

#[derive(Debug, serde::Serialize)]
pub struct DatapointSchema {
    pub key: DatapointKey,
    pub name: &'static str,
    pub kind: DatapointKind,
    pub writable: bool,
    pub minimum: Option<i64>,
    pub maximum: Option<i64>,
    pub description: &'static str,
}

impl DatapointSchema {
    pub fn is_match(&self, pattern: &str) -> bool {
        let pattern = pattern.to_lowercase();
        self.key.as_str() == pattern
            || self.name.contains(&pattern)
            || self.description.to_lowercase().contains(&pattern)
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    serde::Serialize,
    strum::Display,
    strum::EnumString,
    clap::ValueEnum,
)]
pub enum TemperatureUnit {
    #[default]
    #[strum(to_string = "°C", serialize = "celsius")]
    #[serde(rename = "°C")]
    Celsius,
    #[strum(to_string = "°F", serialize = "fahrenheit")]
    #[serde(rename = "°F")]
    Fahrenheit,
}

#[derive(Debug)]
pub struct DeviceProfile {
    pub name: &'static str,
    /// Boolean power switch: `true` heats, `false` is off.
    pub hvac_mode: DatapointKey,
    pub preset: DatapointKey,
    pub target_temperature: DatapointKey,
    pub current_temperature: DatapointKey,
    pub error: DatapointKey,
    pub min_temperature: i64,
    pub max_temperature: i64,
    pub presets: &'static [PresetEntry],
    pub error_codes: &'static [ErrorCodeEntry],
    pub heat_icon: &'static str,
    pub off_icon: &'static str,
    /// Value of the error datapoint that indicates the water flow protection has tripped.
    pub water_flow_fault: i64,
    pub datapoints: &'static [DatapointSchema],
}

impl DeviceProfile {
    pub fn preset_by_raw(&self, raw: &str) -> Option<&'static PresetEntry> {
        self.presets.iter().find(|p| p.raw == raw)
    }

    pub fn preset_by_label(&self, label: &str) -> Option<&'static PresetEntry> {
        self.presets.iter().find(|p| p.label == label)
    }

    pub fn error_description(&self, code: i64) -> Option<&'static str> {
        self.error_codes.iter().find(|e| e.code == code).map(|e| e.description)
    }

    pub fn schema(&self, key: &DatapointKey) -> Option<&'static DatapointSchema> {
        self.datapoints.iter().find(|d| &d.key == key)
    }
}

static POOLEX_QLINE_PRESETS: [PresetEntry; 3] = [
    PresetEntry { raw: "heating", label: "Heat" },
    PresetEntry { raw: "cold", label: "Cool" },
    PresetEntry { raw: "mute", label: "Silent Heat" },
];

static POOLEX_QLINE_ERRORS: [ErrorCodeEntry; 2] = [
    ErrorCodeEntry { code: 0, description: "OK" },
    ErrorCodeEntry { code: 1, description: "Water Flow Protection" },
];

static POOLEX_QLINE_DATAPOINTS: [DatapointSchema; 5] = [
    DatapointSchema {
        key: DatapointKey::new_const("1"),
        name: "power",
        kind: DatapointKind::Boolean,
        writable: true,
        minimum: None,
        maximum: None,
        description: "Heat pump running (heat) or stopped (off)",
    },
    DatapointSchema {
        key: DatapointKey::new_const("2"),
        name: "preset",
        kind: DatapointKind::String,
        writable: true,
        minimum: None,
        maximum: None,
        description: "Operating mode: heating, cold or mute",
    },
    DatapointSchema {
        key: DatapointKey::new_const("4"),
        name: "target_temperature",
        kind: DatapointKind::Integer,
        writable: true,
        minimum: Some(15),
        maximum: Some(40),
        description: "Water temperature setpoint",
    },
    DatapointSchema {
        key: DatapointKey::new_const("15"),
        name: "error",
        kind: DatapointKind::Integer,
        writable: false,
        minimum: None,
        maximum: None,
        description: "Fault code, 0 when the unit is healthy",
    },
    DatapointSchema {
        key: DatapointKey::new_const("16"),
        name: "current_temperature",
        kind: DatapointKind::Integer,
        writable: false,
        minimum: None,
        maximum: None,
        description: "Measured water temperature",
    },
];

/// Poolex Q-Line pool heat pump.
pub static POOLEX_QLINE: DeviceProfile = DeviceProfile {
    name: "Poolex Q-Line heat pump",
    hvac_mode: DatapointKey::new_const("1"),
    preset: DatapointKey::new_const("2"),
    target_temperature: DatapointKey::new_const("4"),
    current_temperature: DatapointKey::new_const("16"),
    error: DatapointKey::new_const("15"),
    min_temperature: 15,
    max_temperature: 40,
    presets: &POOLEX_QLINE_PRESETS,
    error_codes: &POOLEX_QLINE_ERRORS,
    heat_icon: "mdi:hot-tub",
    off_icon: "mdi:hvac-off",
    water_flow_fault: 1,
    datapoints: &POOLEX_QLINE_DATAPOINTS,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn preset_table_is_injective() {
        let raws = POOLEX_QLINE.presets.iter().map(|p| p.raw).collect::<BTreeSet<_>>();
        let labels = POOLEX_QLINE.presets.iter().map(|p| p.label).collect::<BTreeSet<_>>();
        assert_eq!(raws.len(), POOLEX_QLINE.presets.len());
        assert_eq!(labels.len(), POOLEX_QLINE.presets.len());
    }

    #[test]
    fn every_entity_datapoint_has_a_schema() {
        let profile = &POOLEX_QLINE;
        for key in [
            &profile.hvac_mode,
            &profile.preset,
            &profile.target_temperature,
            &profile.current_temperature,
            &profile.error,
        ] {
            assert!(profile.schema(key).is_some(), "no schema for datapoint {key}");
        }
        let target = profile.schema(&profile.target_temperature).unwrap();
        assert_eq!(target.minimum, Some(profile.min_temperature));
        assert_eq!(target.maximum, Some(profile.max_temperature));
    }

    #[test]
    fn schema_search() {
        let matches = |pattern: &str| {
            let found = POOLEX_QLINE.datapoints.iter().filter(|d| d.is_match(pattern));
            found.map(|d| d.name).collect::<Vec<_>>()
        };
        assert_eq!(matches("15"), ["error"]);
        assert_eq!(matches("TEMPERATURE"), ["target_temperature", "current_temperature"]);
        assert!(matches("nothing-like-this").is_empty());
    }

    #[test]
    fn temperature_unit_parses_both_spellings() {
        assert_eq!("°C".parse::<TemperatureUnit>().unwrap(), TemperatureUnit::Celsius);
        assert_eq!("fahrenheit".parse::<TemperatureUnit>().unwrap(), TemperatureUnit::Fahrenheit);
        assert_eq!(TemperatureUnit::default().to_string(), "°C");
    }
}
