use crate::model::{Availability, Device, Entity, Origin};
use serde_json::{Map, Value};

// also see: https://www.home-assistant.io/integrations/mqtt/#discovery-messages

/// Long key to abbreviated key, as accepted by the hub's discovery schema.
///
/// Both columns are unique, so the mapping can be reversed.
pub const ABBREVIATIONS: &[(&str, &str)] = &[
    ("automation_type", "atype"),
    ("availability", "avty"),
    ("availability_mode", "avty_mode"),
    ("availability_template", "avty_tpl"),
    ("availability_topic", "avty_t"),
    ("command_template", "cmd_tpl"),
    ("command_topic", "cmd_t"),
    ("components", "cmps"),
    ("device", "dev"),
    ("device_class", "dev_cla"),
    ("enabled_by_default", "en"),
    ("entity_category", "ent_cat"),
    ("expire_after", "exp_aft"),
    ("icon", "ic"),
    ("json_attributes_template", "json_attr_tpl"),
    ("json_attributes_topic", "json_attr_t"),
    ("object_id", "obj_id"),
    ("options", "ops"),
    ("origin", "o"),
    ("pattern", "ptrn"),
    ("payload", "pl"),
    ("payload_available", "pl_avail"),
    ("payload_not_available", "pl_not_avail"),
    ("payload_off", "pl_off"),
    ("payload_on", "pl_on"),
    ("platform", "p"),
    ("state_class", "stat_cla"),
    ("state_topic", "stat_t"),
    ("subtype", "stype"),
    ("suggested_display_precision", "sug_dsp_prc"),
    ("topic", "t"),
    ("unique_id", "uniq_id"),
    ("unit_of_measurement", "unit_of_meas"),
    ("value_template", "val_tpl"),
];

/// Abbreviate a key, unknown keys are returned as they are.
pub fn abbreviate(key: &str) -> &str {
    ABBREVIATIONS
        .iter()
        .find(|(long, _)| *long == key)
        .map(|(_, short)| *short)
        .unwrap_or(key)
}

/// Expand an abbreviated key, unknown keys are returned as they are.
pub fn expand(key: &str) -> &str {
    ABBREVIATIONS
        .iter()
        .find(|(_, short)| *short == key)
        .map(|(long, _)| *long)
        .unwrap_or(key)
}

/// A single discovery attribute of an entity.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub key: &'static str,
    pub value: Value,
    /// The value the hub assumes when the attribute is missing.
    pub default: Option<Value>,
}

impl Field {
    pub fn new(key: &'static str, value: impl Into<Value>) -> Self {
        Self {
            key,
            value: value.into(),
            default: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Whether the field can be left out of the discovery document.
    ///
    /// That is the case for empty values, and for values equal to the documented default.
    pub fn is_elided(&self) -> bool {
        let empty = match &self.value {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Array(a) => a.is_empty(),
            Value::Object(o) => o.is_empty(),
            Value::Bool(_) | Value::Number(_) => false,
        };
        empty || self.default.as_ref() == Some(&self.value)
    }
}

/// Render fields into a discovery mapping.
///
/// Elided fields are dropped, then `extra` is applied on top, overriding computed fields with the
/// same key. If `abbreviated` is set, all keys are rewritten through [`ABBREVIATIONS`].
pub fn render(
    fields: impl IntoIterator<Item = Field>,
    extra: &Map<String, Value>,
    abbreviated: bool,
) -> Map<String, Value> {
    let mut result = Map::new();

    for field in fields {
        if !field.is_elided() {
            result.insert(field.key.to_string(), field.value);
        }
    }

    for (key, value) in extra {
        result.insert(key.clone(), value.clone());
    }

    if !abbreviated {
        return result;
    }

    let mut short = Map::with_capacity(result.len());
    for (key, value) in result {
        short.insert(abbreviate(&key).to_string(), value);
    }
    short
}

/// Render the discovery attributes of an entity, including its platform.
pub fn discovery_dict(entity: &Entity, abbreviated: bool) -> Map<String, Value> {
    let mut fields = entity.fields();
    fields.push(Field::new("platform", entity.platform().as_ref()));
    render(fields, entity.discovery_extra(), abbreviated)
}

// serializing the plain model structs can't fail
fn to_value(value: impl serde::Serialize) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn effective_availability(
    own: &[Availability],
    device: &Device,
    default_topic: Option<&str>,
) -> Vec<Availability> {
    if !own.is_empty() {
        own.to_vec()
    } else if !device.availability().is_empty() {
        device.availability().to_vec()
    } else {
        default_topic.map(Availability::new).into_iter().collect()
    }
}

/// Build the single document describing a device and all its components.
///
/// Returns `None` if the device has no components.
pub(crate) fn device_document(
    device: &Device,
    origin: &Origin,
    default_availability: Option<&str>,
) -> Option<Value> {
    if device.components().is_empty() {
        return None;
    }

    let mut components = Map::new();
    for (id, entity) in device.components() {
        components.insert(id.clone(), Value::Object(discovery_dict(entity, true)));
    }

    let mut document = Map::new();
    document.insert(abbreviate("device").into(), to_value(device.info()));
    document.insert(abbreviate("origin").into(), to_value(origin));

    let availability = effective_availability(&[], device, default_availability);
    if !availability.is_empty() {
        document.insert(
            abbreviate("availability").into(),
            to_value(&availability),
        );
    }

    document.insert(abbreviate("components").into(), Value::Object(components));

    Some(Value::Object(document))
}

/// Build the per-entity document of the older discovery shape, using long keys.
pub(crate) fn entity_document(
    device: &Device,
    entity: &Entity,
    origin: &Origin,
    default_availability: Option<&str>,
) -> Value {
    let mut document = render(entity.fields(), &Map::new(), false);

    document.insert("device".into(), to_value(device.info()));
    document.insert("origin".into(), to_value(origin));

    // device triggers don't support availability
    if entity.base().is_some() {
        let availability =
            effective_availability(entity.availability(), device, default_availability);
        if !availability.is_empty() {
            document.insert("availability".into(), to_value(&availability));
        }
    }

    for (key, value) in entity.discovery_extra() {
        document.insert(key.clone(), value.clone());
    }

    Value::Object(document)
}
