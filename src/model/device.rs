use crate::model::{discovery, topic, Availability, Entity, Origin, ValidationError};
use serde_json::Value;

/// Display metadata of a device, as sent in the `device` block of the discovery information.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DeviceInfo {
    /// The first identifier is used as the device id.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identifiers: Vec<String>,

    /// Pairs of connection type and connection identifier, e.g. `("mac", "02:5b:26:a8:dc:12")`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<(String, String)>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_area: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sw_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hw_version: Option<String>,

    /// Identifier of a device that routes messages between this device and the hub.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via_device: Option<String>,
}

impl DeviceInfo {
    pub fn new<I, S>(identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            identifiers: identifiers.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }
}

/// A device, grouping component entities.
#[derive(Clone, Debug)]
pub struct Device {
    info: DeviceInfo,
    availability: Vec<Availability>,
    components: Vec<(String, Entity)>,
}

impl Device {
    /// Create a new device, without components.
    pub fn new(info: DeviceInfo) -> Result<Self, ValidationError> {
        if info.identifiers.is_empty() {
            return Err(ValidationError::NoIdentifiers);
        }

        Ok(Self {
            info,
            availability: Vec::new(),
            components: Vec::new(),
        })
    }

    /// Create a new device, using the entities' unique ids as component ids.
    pub fn with_entities(
        info: DeviceInfo,
        entities: impl IntoIterator<Item = Entity>,
    ) -> Result<Self, ValidationError> {
        let mut device = Self::new(info)?;
        for entity in entities {
            device.add_component(entity.unique_id().to_string(), entity)?;
        }
        Ok(device)
    }

    /// Add a component, keeping insertion order.
    pub fn add_component(
        &mut self,
        id: impl Into<String>,
        entity: Entity,
    ) -> Result<(), ValidationError> {
        let id = id.into();
        if self.components.iter().any(|(existing, _)| *existing == id) {
            return Err(ValidationError::DuplicateComponent(id));
        }
        self.components.push((id, entity));
        Ok(())
    }

    /// Set the availability used by all components which don't have their own.
    pub fn with_availability(mut self, availability: Vec<Availability>) -> Self {
        self.availability = availability;
        self
    }

    /// The device id, which is the first identifier.
    pub fn id(&self) -> &str {
        // guaranteed by the constructor
        &self.info.identifiers[0]
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn availability(&self) -> &[Availability] {
        &self.availability
    }

    pub fn components(&self) -> &[(String, Entity)] {
        &self.components
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.components.iter().map(|(_, entity)| entity)
    }

    /// The discovery topic and document of the device, `None` if it has no components.
    pub fn discovery_info(
        &self,
        prefix: &str,
        origin: &Origin,
        availability_topic: Option<&str>,
    ) -> Option<(String, Value)> {
        let document = discovery::device_document(self, origin, availability_topic)?;
        Some((topic::device_config_topic(prefix, self.id()), document))
    }

    /// The discovery topics and documents of each component, using the older per-entity shape.
    pub fn entity_discovery_info(
        &self,
        prefix: &str,
        origin: &Origin,
        availability_topic: Option<&str>,
    ) -> Vec<(String, Value)> {
        self.entities()
            .map(|entity| {
                (
                    topic::entity_config_topic(
                        prefix,
                        entity.platform(),
                        self.id(),
                        entity.object_id(self.id()),
                    ),
                    discovery::entity_document(self, entity, origin, availability_topic),
                )
            })
            .collect()
    }
}
