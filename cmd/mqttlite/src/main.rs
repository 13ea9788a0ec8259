//! mqttlite - print BME280 sensor readings published over MQTT.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use mqttlite::{BoxError, Client, ClientConfig};

/// Subscribe to an MQTT broker and print sensor readings.
///
/// Every message whose topic ends with the suffix is expected to carry a
/// JSON record with a `BME280` object holding `Temperature` and `Humidity`.
#[derive(Parser, Debug)]
#[command(name = "mqttlite")]
#[command(about = "Print sensor readings received over MQTT")]
#[command(version)]
struct Args {
    /// Broker hostname or IP address
    host: String,

    /// Broker port
    #[arg(short, long, default_value_t = 1883)]
    port: u16,

    /// Only topics ending with this suffix are handled
    #[arg(long, default_value = "/SENSOR")]
    topic_suffix: String,

    /// Topic filter to subscribe to
    #[arg(long, default_value = "#")]
    subscribe: String,

    /// Client ID (empty lets the broker assign one)
    #[arg(long, default_value = "")]
    client_id: String,

    /// Keep alive interval in seconds
    #[arg(long, default_value_t = 60)]
    keep_alive: u16,

    /// Verbose output
    #[arg(short = 'v', long)]
    verbose: bool,
}

#[derive(Debug, Deserialize)]
struct SensorMessage {
    #[serde(rename = "BME280")]
    bme280: Bme280,
}

#[derive(Debug, Deserialize)]
struct Bme280 {
    #[serde(rename = "Temperature")]
    temperature: f64,
    #[serde(rename = "Humidity")]
    humidity: f64,
}

fn format_reading(value: serde_json::Value) -> std::result::Result<String, BoxError> {
    let msg: SensorMessage = serde_json::from_value(value)?;
    Ok(format!(
        "Got data temp={} humidity={}",
        msg.bme280.temperature, msg.bme280.humidity
    ))
}

fn print_reading(value: serde_json::Value) -> std::result::Result<(), BoxError> {
    let line = format_reading(value)?;
    println!("{} {}", chrono::Local::now(), line);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    let addr = format!("{}:{}", args.host, args.port);
    let config = ClientConfig::new(&addr)
        .with_client_id(&args.client_id)
        .with_keep_alive(args.keep_alive)
        .with_subscription(&args.subscribe);

    let mut client = Client::open(config)
        .await
        .with_context(|| format!("failed to reach broker at {}", addr))?;
    client.connect().await.context("MQTT connect failed")?;
    client.subscribe().await.context("MQTT subscribe failed")?;

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupted, shutting down");
            token.cancel();
        }
    });

    client.run(&args.topic_suffix, &cancel, print_reading).await?;
    client.disconnect().await?;

    Ok(())
}
