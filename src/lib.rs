//! Publish Home Assistant entities over MQTT.
//!
//! The [`model`] module describes devices and their component entities and renders them into
//! the hub's discovery format. The [`connector`] module manages the broker connection, publishes
//! (and prunes) discovery information and routes inbound command messages to entity handlers.

pub mod connector;
pub mod model;

mod utils;
