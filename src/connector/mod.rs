//! Connection to the broker.
//!
//! The [`MqttClient`] connects through a [`Transport`], publishes the discovery information of
//! its devices and routes command messages to the handlers of their entities.

mod client;
mod discovery;
mod error;
mod monitor;
mod options;
mod router;
mod transport;

#[cfg(test)]
pub(crate) mod mock;

pub use client::*;
pub use error::*;
pub use monitor::HubStatus;
pub use options::*;
pub use transport::*;

pub use rumqttc::QoS;
