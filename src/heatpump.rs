use crate::connection::{self, DeviceConnection};
use crate::datapoints::{DatapointWrites, Datapoints};
use crate::entity::binary_sensor::WaterFlowSensor;
use crate::entity::climate::{self, Climate, HvacMode};
use crate::entity::{self, Entity};
use crate::profile::{DeviceProfile, TemperatureUnit};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("the command is not valid for this device")]
    InvalidCommand(#[source] climate::Error),
    #[error("could not apply the command on the device")]
    Connection(#[source] connection::Error),
}

/// A heat pump reachable over `connection`.
///
/// Commands are validated and encoded into a single batch of datapoint writes before anything
/// is sent to the device.
pub struct Heatpump<C> {
    climate: Climate,
    water_flow: WaterFlowSensor,
    unit: TemperatureUnit,
    connection: C,
}

impl<C: DeviceConnection> Heatpump<C> {
    pub fn new(profile: &'static DeviceProfile, unit: TemperatureUnit, connection: C) -> Self {
        Self {
            climate: Climate::new(profile, unit),
            water_flow: WaterFlowSensor::new(profile),
            unit,
            connection,
        }
    }

    pub fn climate(&self) -> &Climate {
        &self.climate
    }

    pub fn water_flow(&self) -> &WaterFlowSensor {
        &self.water_flow
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn into_connection(self) -> C {
        self.connection
    }

    pub fn datapoints(&self) -> Datapoints {
        self.connection.datapoints()
    }

    pub fn entities(&self) -> Vec<Box<dyn Entity>> {
        entity::entities(self.climate.profile(), self.unit)
    }

    pub async fn set_hvac_mode(&self, mode: HvacMode) -> Result<(), Error> {
        self.submit(self.climate.set_hvac_mode(mode)).await
    }

    pub async fn set_preset_mode(&self, label: &str) -> Result<(), Error> {
        let writes = self.climate.set_preset_mode(label).map_err(Error::InvalidCommand)?;
        self.submit(writes).await
    }

    pub async fn set_target_temperature(&self, temperature: i64) -> Result<(), Error> {
        let writes = self.climate.set_target_temperature(temperature).map_err(Error::InvalidCommand)?;
        self.submit(writes).await
    }

    /// See [`Climate::set_temperature`].
    pub async fn set_temperature(
        &self,
        temperature: Option<i64>,
        preset_mode: Option<&str>,
    ) -> Result<(), Error> {
        let writes = self
            .climate
            .set_temperature(temperature, preset_mode)
            .map_err(Error::InvalidCommand)?;
        self.submit(writes).await
    }

    /// Send `writes` to the device as one request and wait for the acknowledgement.
    pub async fn submit(&self, writes: DatapointWrites) -> Result<(), Error> {
        if writes.is_empty() {
            tracing::debug!("nothing to write");
            return Ok(());
        }
        tracing::debug!(datapoints = writes.len(), ?writes, "submitting datapoint writes");
        self.connection.set_properties(writes).await.map_err(Error::Connection)
    }
}
