use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::Parser;

use crate::sink::PointLayout;

/// Forwards readings from the room station board to InfluxDB.
#[derive(Parser, Debug, Clone)]
#[command(name = "roomstation")]
pub struct Config {
    /// Serial device the board is attached to
    #[arg(long, env = "ROOMSTATION_SERIAL_PORT", default_value = "/dev/ttyACM0")]
    pub serial_port: String,

    #[arg(long, env = "ROOMSTATION_BAUD_RATE", default_value_t = 9600)]
    pub baud_rate: u32,

    /// How long a serial read waits for data (the UART caps this at 25.5 s)
    #[arg(
        long,
        env = "ROOMSTATION_READ_TIMEOUT_MS",
        default_value_t = 1000,
        value_parser = clap::value_parser!(u64).range(1..=25500)
    )]
    pub read_timeout_ms: u64,

    #[arg(long, env = "ROOMSTATION_INFLUX_URL", default_value = "http://localhost:8086")]
    pub influx_url: String,

    #[arg(long, env = "ROOMSTATION_ORG", default_value = "RoomStation")]
    pub org: String,

    #[arg(long, env = "ROOMSTATION_BUCKET", default_value = "RoomStation")]
    pub bucket: String,

    /// API token, sent as `Authorization: Token ...`
    #[arg(long, env = "ROOMSTATION_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[arg(long, env = "ROOMSTATION_MEASUREMENT", default_value = "RoomStation")]
    pub measurement: String,

    /// Value of the `location` tag
    #[arg(long, env = "ROOMSTATION_LOCATION", default_value = "Room")]
    pub location: String,

    /// Value of the `version` field
    #[arg(long, env = "ROOMSTATION_VERSION_TAG", default_value = "1.0")]
    pub version_tag: String,

    /// Log points instead of writing them
    #[arg(long, env = "ROOMSTATION_DRY_RUN", value_parser = BoolishValueParser::new())]
    pub dry_run: bool,
}

impl Config {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn layout(&self) -> PointLayout {
        PointLayout {
            measurement: self.measurement.clone(),
            location: self.location.clone(),
            version: self.version_tag.clone(),
        }
    }
}
