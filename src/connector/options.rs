use crate::model::Origin;
use crate::utils::is_default;
use rand::{distributions::Alphanumeric, Rng};
use std::time::Duration;

/// How to reach the broker.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[cfg_attr(feature = "clap", derive(clap::Parser))]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub struct ConnectorOptions {
    /// The MQTT client id, defaults to a random ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "clap", arg(long = "mqtt-client-id", env = "MQTT_CLIENT_ID"))]
    pub client_id: Option<String>,

    /// The MQTT's servers/brokers hostname
    #[serde(default = "default_host")]
    #[cfg_attr(
        feature = "clap",
        arg(long = "mqtt-host", env = "MQTT_HOST", default_value = "core-mosquitto")
    )]
    pub host: String,

    /// The MQTT's server/brokers port, defaults to 1883 without TLS and 8883 with TLS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "clap", arg(long = "mqtt-port", env = "MQTT_PORT"))]
    pub port: Option<u16>,

    /// Use TLS to connect to the broker.
    #[serde(default, skip_serializing_if = "is_default")]
    #[cfg_attr(feature = "clap", arg(long = "mqtt-tls", env = "MQTT_TLS"))]
    pub tls: bool,

    #[serde(default = "default_keep_alive", skip_serializing_if = "is_default")]
    #[serde(with = "humantime_serde")]
    #[cfg_attr(feature = "clap", arg(long = "mqtt-keep-alive", env = "MQTT_KEEP_ALIVE", value_parser = DurationValueParser, default_value = "5s"))]
    #[cfg_attr(feature = "schemars", schemars(schema_with = "humantime_duration"))]
    pub keep_alive: Duration,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "clap", arg(long = "mqtt-username", env = "MQTT_USERNAME"))]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "clap", arg(long = "mqtt-password", env = "MQTT_PASSWORD"))]
    pub password: Option<String>,
}

impl Default for ConnectorOptions {
    fn default() -> Self {
        Self {
            client_id: None,
            host: default_host(),
            port: None,
            tls: false,
            keep_alive: default_keep_alive(),
            username: None,
            password: None,
        }
    }
}

impl ConnectorOptions {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(if self.tls { 8883 } else { 1883 })
    }

    /// The configured client id, or a new random one.
    pub fn client_id(&self) -> String {
        self.client_id.clone().unwrap_or_else(random_client_id)
    }
}

/// The shape of the discovery information.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMode {
    /// One document per device, on `{prefix}/device/{device_id}/config`.
    #[default]
    Device,
    /// One document per entity, on `{prefix}/{platform}/{device_id}/{object_id}/config`.
    Entity,
}

/// Client behavior, independent of the broker being used.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub struct ClientConfig {
    pub origin: Origin,

    /// Topic for `online`/`offline` messages, also used as last will.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_topic: Option<String>,

    /// Discovery prefix, defaults to `homeassistant`
    #[serde(default = "default_prefix")]
    pub discovery_prefix: String,

    #[serde(default, skip_serializing_if = "is_default")]
    pub discovery_mode: DiscoveryMode,

    /// Number of times to check for an established connection before giving up.
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,

    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    #[cfg_attr(feature = "schemars", schemars(schema_with = "humantime_duration"))]
    pub connect_poll_interval: Duration,

    /// Time to wait for the broker to deliver all retained discovery messages.
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    #[cfg_attr(feature = "schemars", schemars(schema_with = "humantime_duration"))]
    pub prune_settle: Duration,

    /// Topic on which the hub announces its status, defaults to `{prefix}/status`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hub_status_topic: Option<String>,
}

impl ClientConfig {
    pub fn new(origin: Origin) -> Self {
        Self {
            origin,
            availability_topic: None,
            discovery_prefix: default_prefix(),
            discovery_mode: DiscoveryMode::default(),
            connect_retries: default_connect_retries(),
            connect_poll_interval: default_poll_interval(),
            prune_settle: default_poll_interval(),
            hub_status_topic: None,
        }
    }

    pub fn hub_status_topic(&self) -> String {
        self.hub_status_topic
            .clone()
            .unwrap_or_else(|| format!("{}/status", self.discovery_prefix))
    }
}

#[cfg(feature = "schemars")]
fn humantime_duration(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
    use schemars::schema::*;
    use schemars::JsonSchema;
    use serde_json::json;

    let mut schema: SchemaObject = <String>::json_schema(gen).into();
    schema.metadata = Some(Box::new(Metadata {
        id: None,
        title: None,
        description: Some(r#"A duration in the humantime format. For example: '30s' for 30 seconds. '5m' for 5 minutes."#.to_string()),
        default: None,
        deprecated: false,
        read_only: false,
        write_only: false,
        examples: vec![json!("500ms"), json!("5s")],
    }));
    schema.into()
}

#[cfg(feature = "clap")]
#[derive(Clone)]
pub struct DurationValueParser;

#[cfg(feature = "clap")]
impl clap::builder::TypedValueParser for DurationValueParser {
    type Value = Duration;

    fn parse_ref(
        &self,
        cmd: &clap::Command,
        _arg: Option<&clap::Arg>,
        value: &std::ffi::OsStr,
    ) -> Result<Self::Value, clap::Error> {
        use std::str::FromStr;
        Ok(humantime::Duration::from_str(&value.to_string_lossy())
            .map_err(|_err| clap::Error::new(clap::error::ErrorKind::Format).with_cmd(cmd))?
            .into())
    }
}

fn random_client_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(23)
        .map(char::from)
        .collect()
}

fn default_host() -> String {
    "core-mosquitto".into()
}

fn default_keep_alive() -> Duration {
    Duration::from_secs(5)
}

fn default_prefix() -> String {
    "homeassistant".into()
}

fn default_connect_retries() -> u32 {
    10
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(500)
}
