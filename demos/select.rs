//! A device with a select and a sensor, reporting the selected option

use clap::Parser;
use mqtt_entity::connector::{ClientConfig, ConnectorOptions, MqttClient};
use mqtt_entity::model::{
    Command, CommandHandler, Device, DeviceInfo, Entity, EntityBase, Origin, Select, Sensor,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::MissedTickBehavior;

#[derive(Debug, clap::Parser)]
struct Cli {
    #[command(flatten)]
    connector: ConnectorOptions,

    /// Topic for our own availability
    #[arg(long, env = "AVAILABILITY_TOPIC", default_value = "mqtt-entity-demo/available")]
    availability_topic: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    log::info!("Starting up example");

    let selected = Arc::new(Mutex::new(String::from("low")));

    let select = Entity::try_from(Select {
        base: EntityBase {
            unique_id: "demo1_mode".into(),
            name: "Mode".into(),
            state_topic: "mqtt-entity-demo/mode".into(),
            ..Default::default()
        },
        command: Command::new("mqtt-entity-demo/mode/set").with_handler(CommandHandler::from_fn({
            let selected = selected.clone();
            move |option| {
                log::info!("Selected: {option}");
                *selected.lock().map_err(|err| err.to_string())? = option;
                Ok(())
            }
        })),
        options: vec!["low".into(), "medium".into(), "high".into()],
    })?;

    let sensor = Entity::try_from(Sensor {
        base: EntityBase {
            unique_id: "demo1_level".into(),
            name: "Level".into(),
            state_topic: "mqtt-entity-demo/level".into(),
            unit_of_measurement: Some("%".into()),
            ..Default::default()
        },
        ..Default::default()
    })?;

    let info = DeviceInfo {
        name: Some("Demo Device 1".into()),
        manufacturer: Some("mqtt-entity".into()),
        ..DeviceInfo::new(["demo1"])
    };

    let client = MqttClient::new(ClientConfig {
        availability_topic: Some(cli.availability_topic),
        ..ClientConfig::new(Origin::new("mqtt-entity demo"))
    });
    client.set_devices(vec![Device::with_entities(
        info,
        [select.clone(), sensor.clone()],
    )?]);

    let monitor = client.publish_discovery_info_when_online();
    client.connect(&cli.connector).await?;
    client.publish_discovery_info(true).await?;

    let mut interval = tokio::time::interval(Duration::from_secs(5));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => break,
        }

        let option = selected
            .lock()
            .map_err(|err| anyhow::anyhow!("{err}"))?
            .clone();
        let level = match option.as_str() {
            "low" => "10",
            "medium" => "50",
            _ => "90",
        };

        if let Err(err) = client.update_state(&select, option).await {
            log::warn!("Failed to update state: {err}");
        }
        if let Err(err) = client.update_state(&sensor, level).await {
            log::warn!("Failed to update state: {err}");
        }
    }

    monitor.abort();
    client.disconnect();

    log::info!("Exiting");

    Ok(())
}
