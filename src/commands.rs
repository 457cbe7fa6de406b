fn runtime() -> Result<tokio::runtime::Runtime, std::io::Error> {
    tokio::runtime::Builder::new_current_thread().enable_all().build()
}

pub mod datapoints {
    use crate::output;
    use crate::profile::POOLEX_QLINE;

    /// Search and output the datapoints known for the heat pump.
    #[derive(clap::Parser)]
    pub struct Args {
        filter: Option<String>,
        #[clap(flatten)]
        output: output::Args,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum Error {
        #[error("could not output the datapoint list")]
        Output(#[from] output::Error),
    }

    pub fn run(args: Args) -> Result<(), Error> {
        let mut output = args.output.to_output()?;
        output.table_headers(vec!["Key", "Name", "Type", "Mode", "Min", "Max", "Description"])?;
        for datapoint in POOLEX_QLINE.datapoints {
            if let Some(pattern) = &args.filter {
                if !datapoint.is_match(pattern) {
                    continue;
                }
            }
            output.result(
                || {
                    vec![
                        datapoint.key.to_string(),
                        datapoint.name.to_string(),
                        datapoint.kind.to_string(),
                        if datapoint.writable { "RW".to_string() } else { "R-".to_string() },
                        datapoint.minimum.map(|v| v.to_string()).unwrap_or_default(),
                        datapoint.maximum.map(|v| v.to_string()).unwrap_or_default(),
                        datapoint.description.to_string(),
                    ]
                },
                || datapoint,
            )?;
        }
        Ok(output.commit()?)
    }
}

pub mod status {
    use std::path::{Path, PathBuf};

    use crate::connection::{self, GatewayConnection};
    use crate::datapoints::Datapoints;
    use crate::entity;
    use crate::output;
    use crate::profile::{POOLEX_QLINE, TemperatureUnit};

    /// Show the state of every entity exposed by the heat pump.
    #[derive(clap::Parser)]
    pub struct Args {
        /// Read the datapoints from a JSON file instead of querying the gateway.
        #[arg(long, short = 's')]
        snapshot: Option<PathBuf>,
        /// The temperature unit the device is configured for.
        #[arg(long, value_enum, default_value_t = TemperatureUnit::Celsius)]
        unit: TemperatureUnit,
        #[clap(flatten)]
        connection: connection::Args,
        #[clap(flatten)]
        output: output::Args,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum Error {
        #[error("could not read the datapoint snapshot at {1:?}")]
        ReadSnapshot(#[source] std::io::Error, PathBuf),
        #[error("could not parse the datapoint snapshot at {1:?}")]
        ParseSnapshot(#[source] serde_json::Error, PathBuf),
        #[error("could not start the async runtime")]
        Runtime(#[source] std::io::Error),
        #[error("could not query the device state")]
        Connection(#[source] connection::Error),
        #[error("could not output the entity state")]
        Output(#[from] output::Error),
    }

    fn read_snapshot(path: &Path) -> Result<Datapoints, Error> {
        let data = std::fs::read(path).map_err(|e| Error::ReadSnapshot(e, path.into()))?;
        serde_json::from_slice(&data).map_err(|e| Error::ParseSnapshot(e, path.into()))
    }

    async fn query(args: connection::Args) -> Result<Datapoints, connection::Error> {
        let connection = GatewayConnection::new(args).await?;
        let datapoints = connection.refresh().await?;
        connection.shutdown().await?;
        Ok(datapoints)
    }

    pub fn run(args: Args) -> Result<(), Error> {
        let datapoints = match &args.snapshot {
            Some(path) => read_snapshot(path)?,
            None => {
                let runtime = super::runtime().map_err(Error::Runtime)?;
                runtime.block_on(query(args.connection)).map_err(Error::Connection)?
            }
        };
        tracing::debug!(?datapoints, "rendering entities");
        let mut output = args.output.to_output()?;
        output.table_headers(vec!["Entity", "Attribute", "Value"])?;
        for entity in entity::entities(&POOLEX_QLINE, args.unit) {
            let entity_id = entity.entity_id();
            for (attribute, value) in entity.attributes(&datapoints) {
                output.result(
                    || {
                        let value = match &value {
                            serde_json::Value::String(s) => s.clone(),
                            serde_json::Value::Null => String::new(),
                            value => value.to_string(),
                        };
                        vec![entity_id.to_string(), attribute.clone(), value]
                    },
                    || serde_json::json!({ "entity": entity_id, "attribute": attribute, "value": value }),
                )?;
            }
        }
        Ok(output.commit()?)
    }
}

pub mod set {
    use crate::connection::{self, GatewayConnection};
    use crate::datapoints::DatapointWrites;
    use crate::entity::climate::{self, Climate, HvacMode};
    use crate::heatpump::{self, Heatpump};
    use crate::profile::{POOLEX_QLINE, TemperatureUnit};

    /// Change the heat pump settings.
    ///
    /// Everything given is sent to the device as a single request.
    #[derive(clap::Parser)]
    pub struct Args {
        #[arg(long, value_enum, required_unless_present_any = ["preset", "temperature"])]
        hvac_mode: Option<HvacMode>,
        /// Preset label, such as `Heat`, `Cool` or `Silent Heat`.
        #[arg(long)]
        preset: Option<String>,
        /// Target water temperature.
        #[arg(long)]
        temperature: Option<i64>,
        /// Print the datapoint writes as JSON instead of sending them out.
        #[arg(long)]
        dry_run: bool,
        #[clap(flatten)]
        connection: connection::Args,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum Error {
        #[error("the requested settings are not valid for the device")]
        Encode(#[source] climate::Error),
        #[error("could not serialize the datapoint writes")]
        SerializeJson(#[source] serde_json::Error),
        #[error("could not start the async runtime")]
        Runtime(#[source] std::io::Error),
        #[error("could not connect to the device")]
        Connection(#[source] connection::Error),
        #[error("could not change the device settings")]
        Apply(#[source] heatpump::Error),
    }

    fn encode(args: &Args) -> Result<DatapointWrites, Error> {
        let climate = Climate::new(&POOLEX_QLINE, TemperatureUnit::default());
        let mut writes = climate
            .set_temperature(args.temperature, args.preset.as_deref())
            .map_err(Error::Encode)?;
        if let Some(mode) = args.hvac_mode {
            writes.merge(climate.set_hvac_mode(mode));
        }
        Ok(writes)
    }

    async fn apply(args: connection::Args, writes: DatapointWrites) -> Result<(), Error> {
        let connection = GatewayConnection::new(args).await.map_err(Error::Connection)?;
        let heatpump = Heatpump::new(&POOLEX_QLINE, TemperatureUnit::default(), connection);
        heatpump.submit(writes).await.map_err(Error::Apply)?;
        heatpump.into_connection().shutdown().await.map_err(Error::Connection)
    }

    pub fn run(args: Args) -> Result<(), Error> {
        let writes = encode(&args)?;
        if args.dry_run {
            let json = serde_json::to_string(&writes).map_err(Error::SerializeJson)?;
            println!("{json}");
            return Ok(());
        }
        let runtime = super::runtime().map_err(Error::Runtime)?;
        runtime.block_on(apply(args.connection, writes))
    }

}
