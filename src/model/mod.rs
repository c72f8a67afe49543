mod component;
mod device;
mod device_class;
mod entity;
mod error;
mod topic;

pub mod discovery;

pub use component::*;
pub use device::*;
pub use device_class::*;
pub use entity::*;
pub use error::*;
pub use topic::*;

/// Presence of an entity, tied to the last will of the publishing client.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Availability {
    pub topic: String,

    #[serde(default = "default_online", skip_serializing_if = "is_online")]
    pub payload_available: String,

    #[serde(default = "default_offline", skip_serializing_if = "is_offline")]
    pub payload_not_available: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_template: Option<String>,
}

impl Availability {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload_available: default_online(),
            payload_not_available: default_offline(),
            value_template: None,
        }
    }
}

fn default_online() -> String {
    "online".into()
}

fn default_offline() -> String {
    "offline".into()
}

fn is_online(value: &str) -> bool {
    value == "online"
}

fn is_offline(value: &str) -> bool {
    value == "offline"
}

/// The application publishing the discovery information.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub struct Origin {
    /// The name of the application that is the origin the discovered MQTT item.
    ///
    /// This option is required.
    pub name: String,

    /// Software version of the application that supplies the discovered MQTT item.
    #[serde(alias = "sw")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sw_version: Option<String>,

    /// Support URL of the application that supplies the discovered MQTT item.
    #[serde(alias = "url")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_url: Option<String>,
}

impl Origin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sw_version: None,
            support_url: None,
        }
    }
}
