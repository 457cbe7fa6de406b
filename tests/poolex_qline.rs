use poolex_heatpump_tools::connection::{self, DeviceConnection};
use poolex_heatpump_tools::datapoints::{DatapointKey, DatapointValue, DatapointWrites, Datapoints};
use poolex_heatpump_tools::entity::climate::{self, HvacMode, HvacState};
use poolex_heatpump_tools::heatpump::{self, Heatpump};
use poolex_heatpump_tools::profile::{POOLEX_QLINE, TemperatureUnit};
use std::sync::Mutex;

const HVACMODE_DPS: DatapointKey = DatapointKey::new_const("1");
const PRESET_DPS: DatapointKey = DatapointKey::new_const("2");
const TEMPERATURE_DPS: DatapointKey = DatapointKey::new_const("4");
const ERROR_DPS: DatapointKey = DatapointKey::new_const("15");
const CURRENTTEMP_DPS: DatapointKey = DatapointKey::new_const("16");

/// Records every batch it is asked to write and applies it to its state like a device would.
#[derive(Default)]
struct FakeDevice {
    dps: Mutex<Datapoints>,
    writes: Mutex<Vec<DatapointWrites>>,
}

impl FakeDevice {
    fn with(dps: Datapoints) -> Self {
        Self { dps: Mutex::new(dps), writes: Mutex::default() }
    }
}

impl DeviceConnection for FakeDevice {
    fn datapoints(&self) -> Datapoints {
        self.dps.lock().unwrap().clone()
    }

    async fn set_properties(&self, writes: DatapointWrites) -> Result<(), connection::Error> {
        self.dps.lock().unwrap().apply(writes.clone());
        self.writes.lock().unwrap().push(writes);
        Ok(())
    }
}

fn payload() -> Datapoints {
    [
        (HVACMODE_DPS, DatapointValue::Boolean(true)),
        (PRESET_DPS, DatapointValue::String("heating".into())),
        (TEMPERATURE_DPS, DatapointValue::Integer(27)),
        (ERROR_DPS, DatapointValue::Integer(0)),
        (CURRENTTEMP_DPS, DatapointValue::Integer(25)),
    ]
    .into_iter()
    .collect()
}

fn subject() -> Heatpump<FakeDevice> {
    Heatpump::new(&POOLEX_QLINE, TemperatureUnit::Celsius, FakeDevice::with(payload()))
}

/// Asserts the device was asked to write exactly `expected`, in a single request.
fn assert_device_properties_set(subject: &Heatpump<FakeDevice>, expected: &[(DatapointKey, DatapointValue)]) {
    let mut batch = DatapointWrites::new();
    for (key, value) in expected {
        batch.insert(key.clone(), value.clone());
    }
    assert_eq!(*subject.connection().writes.lock().unwrap(), [batch]);
}

#[test]
fn reads_the_device_payload() {
    let subject = subject();
    let dps = subject.datapoints();
    let climate = subject.climate();
    assert_eq!(climate.hvac_mode(&dps), HvacState::Heat);
    assert_eq!(climate.preset_mode(&dps), Some("Heat"));
    assert_eq!(climate.target_temperature(&dps), Some(27));
    assert_eq!(climate.current_temperature(&dps), Some(25));
    assert_eq!(climate.error_state(&dps), Some(climate::ErrorState::Known("OK")));
    assert_eq!(subject.water_flow().is_on(&dps), Some(false));
}

#[tokio::test]
async fn turn_on() {
    let subject = subject();
    subject.set_hvac_mode(HvacMode::Heat).await.unwrap();
    assert_device_properties_set(&subject, &[(HVACMODE_DPS, DatapointValue::Boolean(true))]);
}

#[tokio::test]
async fn turn_off() {
    let subject = subject();
    subject.set_hvac_mode(HvacMode::Off).await.unwrap();
    assert_device_properties_set(&subject, &[(HVACMODE_DPS, DatapointValue::Boolean(false))]);
    assert_eq!(subject.climate().hvac_mode(&subject.datapoints()), HvacState::Off);
}

#[tokio::test]
async fn set_preset_mode_to_heat() {
    let subject = subject();
    subject.set_preset_mode("Heat").await.unwrap();
    assert_device_properties_set(&subject, &[(PRESET_DPS, "heating".into())]);
}

#[tokio::test]
async fn set_preset_mode_to_cool() {
    let subject = subject();
    subject.set_preset_mode("Cool").await.unwrap();
    assert_device_properties_set(&subject, &[(PRESET_DPS, "cold".into())]);
}

#[tokio::test]
async fn set_preset_mode_to_mute() {
    let subject = subject();
    subject.set_preset_mode("Silent Heat").await.unwrap();
    assert_device_properties_set(&subject, &[(PRESET_DPS, "mute".into())]);
    assert_eq!(subject.climate().preset_mode(&subject.datapoints()), Some("Silent Heat"));
}

#[tokio::test]
async fn invalid_preset_is_never_transmitted() {
    let subject = subject();
    let result = subject.set_preset_mode("Turbo").await;
    assert!(matches!(
        result,
        Err(heatpump::Error::InvalidCommand(climate::Error::InvalidPreset(_)))
    ));
    assert!(subject.connection().writes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn set_target_temperature() {
    let subject = subject();
    subject.set_target_temperature(30).await.unwrap();
    assert_device_properties_set(&subject, &[(TEMPERATURE_DPS, DatapointValue::Integer(30))]);
}

#[tokio::test]
async fn set_target_temperature_out_of_range_is_never_transmitted() {
    let subject = subject();
    assert!(subject.set_target_temperature(41).await.is_err());
    assert!(subject.set_target_temperature(14).await.is_err());
    assert!(subject.connection().writes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn legacy_set_temperature_with_preset_mode() {
    let subject = subject();
    subject.set_temperature(None, Some("Cool")).await.unwrap();
    assert_device_properties_set(&subject, &[(PRESET_DPS, "cold".into())]);
}

#[tokio::test]
async fn legacy_set_temperature_with_both_properties() {
    let subject = subject();
    subject.set_temperature(Some(26), Some("Heat")).await.unwrap();
    assert_device_properties_set(
        &subject,
        &[(TEMPERATURE_DPS, DatapointValue::Integer(26)), (PRESET_DPS, "heating".into())],
    );
}

#[tokio::test]
async fn legacy_set_temperature_without_arguments_sends_nothing() {
    let subject = subject();
    subject.set_temperature(None, None).await.unwrap();
    assert!(subject.connection().writes.lock().unwrap().is_empty());
}

#[test]
fn water_flow_protection() {
    let mut dps = payload();
    dps.set(ERROR_DPS, DatapointValue::Integer(1));
    let subject = Heatpump::new(&POOLEX_QLINE, TemperatureUnit::Celsius, FakeDevice::with(dps));
    let dps = subject.datapoints();
    assert_eq!(subject.water_flow().is_on(&dps), Some(true));
    assert_eq!(
        subject.climate().error_state(&dps),
        Some(climate::ErrorState::Known("Water Flow Protection"))
    );
}

#[test]
fn entities_render_from_the_device_state() {
    let subject = subject();
    let dps = subject.datapoints();
    let entities = subject.entities();
    assert_eq!(entities.len(), 2);
    let climate = entities[0].attributes(&dps);
    assert_eq!(climate["state"], "heat");
    assert_eq!(climate["preset_mode"], "Heat");
    assert_eq!(climate["error"], "OK");
    let water_flow = entities[1].attributes(&dps);
    assert_eq!(water_flow["state"], "off");
}
