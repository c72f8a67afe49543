use crate::model::{
    discovery::Field, Availability, EntityCategory, Platform, StateClass, ValidationError,
};
use futures_util::future::BoxFuture;
use serde_json::{Map, Value};
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::sync::Arc;

// also see: https://developers.home-assistant.io/docs/core/entity/

/// The error type returned by command handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

type SyncHandler = dyn Fn(String) -> Result<(), HandlerError> + Send + Sync;
type AsyncHandler = dyn Fn(String) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync;

/// Called with the (UTF-8) payload of every message received on an entity's command topic.
#[derive(Clone)]
pub enum CommandHandler {
    /// Invoked inline, on the task delivering messages. Keep it short.
    Sync(Arc<SyncHandler>),
    /// Spawned as a new task on the runtime which established the connection.
    Async(Arc<AsyncHandler>),
}

impl CommandHandler {
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(String) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(f))
    }

    pub fn from_async_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        Self::Async(Arc::new(move |payload| Box::pin(f(payload))))
    }
}

impl Debug for CommandHandler {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("CommandHandler::Sync"),
            Self::Async(_) => f.write_str("CommandHandler::Async"),
        }
    }
}

/// The command side of a writable entity.
#[derive(Clone, Debug, Default)]
pub struct Command {
    pub topic: String,
    pub template: Option<String>,
    pub handler: Option<CommandHandler>,
}

impl Command {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Default::default()
        }
    }

    pub fn with_handler(mut self, handler: CommandHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    fn fields(&self) -> [Field; 2] {
        [
            Field::new("command_topic", self.topic.clone()),
            Field::new("command_template", self.template.clone()),
        ]
    }
}

impl From<&str> for Command {
    fn from(topic: &str) -> Self {
        Self::new(topic)
    }
}

impl From<String> for Command {
    fn from(topic: String) -> Self {
        Self::new(topic)
    }
}

/// Attributes shared by all stateful entities.
///
/// This can't be published on its own, it must be wrapped into one of the entity variants and
/// converted into an [`Entity`].
#[derive(Clone, Debug, PartialEq)]
pub struct EntityBase {
    pub unique_id: String,
    pub name: String,
    pub state_topic: String,
    /// Falls back to the device's availability, or the client's default topic, when empty.
    pub availability: Vec<Availability>,
    pub availability_mode: Option<String>,
    pub device_class: Option<String>,
    pub unit_of_measurement: Option<String>,
    pub state_class: Option<StateClass>,
    /// Seconds after which the state expires, `0` never expires.
    pub expire_after: u32,
    pub enabled_by_default: bool,
    pub entity_category: Option<EntityCategory>,
    pub icon: Option<String>,
    pub json_attributes_topic: Option<String>,
    pub json_attributes_template: Option<String>,
    pub value_template: Option<String>,
    /// Added to the discovery information last, overriding any computed field.
    pub discovery_extra: Map<String, Value>,
}

impl Default for EntityBase {
    fn default() -> Self {
        Self {
            unique_id: String::new(),
            name: String::new(),
            state_topic: String::new(),
            availability: Vec::new(),
            availability_mode: None,
            device_class: None,
            unit_of_measurement: None,
            state_class: None,
            expire_after: 0,
            enabled_by_default: true,
            entity_category: None,
            icon: None,
            json_attributes_topic: None,
            json_attributes_template: None,
            value_template: None,
            discovery_extra: Map::new(),
        }
    }
}

impl EntityBase {
    fn validate(mut self) -> Result<Self, ValidationError> {
        if self.unique_id.is_empty() {
            return Err(ValidationError::MissingField("unique_id"));
        }
        if self.state_topic.is_empty() {
            return Err(ValidationError::MissingField("state_topic"));
        }
        if self.state_class.is_none() && self.device_class.as_deref() == Some("energy") {
            self.state_class = Some(StateClass::TotalIncreasing);
        }
        Ok(self)
    }

    fn fields(&self) -> Vec<Field> {
        vec![
            Field::new("name", self.name.clone()),
            Field::new("unique_id", self.unique_id.clone()),
            Field::new("state_topic", self.state_topic.clone()),
            Field::new(
                "availability",
                serde_json::to_value(&self.availability).unwrap_or(Value::Null),
            ),
            Field::new("availability_mode", self.availability_mode.clone()).with_default("latest"),
            Field::new("device_class", self.device_class.clone()),
            Field::new("unit_of_measurement", self.unit_of_measurement.clone()),
            Field::new(
                "state_class",
                self.state_class.map(|s| s.as_ref().to_string()),
            ),
            Field::new("expire_after", self.expire_after).with_default(0),
            Field::new("enabled_by_default", self.enabled_by_default).with_default(true),
            Field::new(
                "entity_category",
                self.entity_category.map(|c| c.as_ref().to_string()),
            ),
            Field::new("icon", self.icon.clone()),
            Field::new("json_attributes_topic", self.json_attributes_topic.clone()),
            Field::new(
                "json_attributes_template",
                self.json_attributes_template.clone(),
            ),
            Field::new("value_template", self.value_template.clone()),
        ]
    }
}

fn validate_command(base: &EntityBase, command: &Command) -> Result<(), ValidationError> {
    if command.topic.len() < 2 {
        return Err(ValidationError::MissingCommandTopic {
            unique_id: base.unique_id.clone(),
        });
    }
    Ok(())
}

#[derive(Clone, Debug, Default)]
pub struct Sensor {
    pub base: EntityBase,
    pub suggested_display_precision: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct BinarySensor {
    pub base: EntityBase,
    pub payload_on: String,
    pub payload_off: String,
}

impl Default for BinarySensor {
    fn default() -> Self {
        Self {
            base: Default::default(),
            payload_on: "ON".into(),
            payload_off: "OFF".into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Switch {
    pub base: EntityBase,
    pub command: Command,
    pub payload_on: String,
    pub payload_off: String,
}

impl Default for Switch {
    fn default() -> Self {
        Self {
            base: Default::default(),
            command: Default::default(),
            payload_on: "ON".into(),
            payload_off: "OFF".into(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Select {
    pub base: EntityBase,
    pub command: Command,
    pub options: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct Number {
    pub base: EntityBase,
    pub command: Command,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    /// One of `auto`, `box` or `slider`.
    pub mode: String,
}

impl Default for Number {
    fn default() -> Self {
        Self {
            base: Default::default(),
            command: Default::default(),
            min: 1.0,
            max: 100.0,
            step: 1.0,
            mode: "auto".into(),
        }
    }
}

/// A writable text entity.
#[derive(Clone, Debug)]
pub struct Text {
    pub base: EntityBase,
    pub command: Command,
    /// Minimum length of the text.
    pub min: u32,
    /// Maximum length of the text.
    pub max: u32,
    /// Either `text` or `password`.
    pub mode: String,
    pub pattern: Option<String>,
}

impl Default for Text {
    fn default() -> Self {
        Self {
            base: Default::default(),
            command: Default::default(),
            min: 0,
            max: 255,
            mode: "text".into(),
            pattern: None,
        }
    }
}

/// A device trigger, see: <https://www.home-assistant.io/integrations/device_trigger.mqtt/>
#[derive(Clone, Debug, Default)]
pub struct DeviceTrigger {
    pub trigger_type: String,
    pub subtype: String,
    pub payload: Option<String>,
    pub topic: String,
    pub value_template: Option<String>,
    pub discovery_extra: Map<String, Value>,
}

#[derive(Clone, Debug)]
pub enum EntityKind {
    Sensor(Sensor),
    BinarySensor(BinarySensor),
    Switch(Switch),
    Select(Select),
    Number(Number),
    Text(Text),
    DeviceTrigger(DeviceTrigger),
}

/// A validated entity, ready to be published.
///
/// Created by converting one of the variants, e.g. `Entity::try_from(Sensor { .. })`.
#[derive(Clone, Debug)]
pub struct Entity {
    unique_id: String,
    kind: EntityKind,
}

impl TryFrom<Sensor> for Entity {
    type Error = ValidationError;

    fn try_from(mut value: Sensor) -> Result<Self, Self::Error> {
        value.base = value.base.validate()?;
        Ok(Self::new(EntityKind::Sensor(value)))
    }
}

impl TryFrom<BinarySensor> for Entity {
    type Error = ValidationError;

    fn try_from(mut value: BinarySensor) -> Result<Self, Self::Error> {
        value.base = value.base.validate()?;
        Ok(Self::new(EntityKind::BinarySensor(value)))
    }
}

impl TryFrom<Switch> for Entity {
    type Error = ValidationError;

    fn try_from(mut value: Switch) -> Result<Self, Self::Error> {
        value.base = value.base.validate()?;
        validate_command(&value.base, &value.command)?;
        Ok(Self::new(EntityKind::Switch(value)))
    }
}

impl TryFrom<Select> for Entity {
    type Error = ValidationError;

    fn try_from(mut value: Select) -> Result<Self, Self::Error> {
        value.base = value.base.validate()?;
        validate_command(&value.base, &value.command)?;
        if value.options.is_empty() {
            return Err(ValidationError::MissingOptions {
                unique_id: value.base.unique_id,
            });
        }
        Ok(Self::new(EntityKind::Select(value)))
    }
}

impl TryFrom<Number> for Entity {
    type Error = ValidationError;

    fn try_from(mut value: Number) -> Result<Self, Self::Error> {
        value.base = value.base.validate()?;
        validate_command(&value.base, &value.command)?;
        Ok(Self::new(EntityKind::Number(value)))
    }
}

impl TryFrom<Text> for Entity {
    type Error = ValidationError;

    fn try_from(mut value: Text) -> Result<Self, Self::Error> {
        value.base = value.base.validate()?;
        validate_command(&value.base, &value.command)?;
        Ok(Self::new(EntityKind::Text(value)))
    }
}

impl TryFrom<DeviceTrigger> for Entity {
    type Error = ValidationError;

    fn try_from(value: DeviceTrigger) -> Result<Self, Self::Error> {
        if value.topic.is_empty() {
            return Err(ValidationError::MissingField("topic"));
        }
        if value.trigger_type.is_empty() {
            return Err(ValidationError::MissingField("trigger_type"));
        }
        if value.subtype.is_empty() {
            return Err(ValidationError::MissingField("subtype"));
        }
        Ok(Self::new(EntityKind::DeviceTrigger(value)))
    }
}

impl Entity {
    fn new(kind: EntityKind) -> Self {
        let unique_id = match &kind {
            EntityKind::DeviceTrigger(t) => format!("{}_{}", t.trigger_type, t.subtype),
            EntityKind::Sensor(Sensor { base, .. })
            | EntityKind::BinarySensor(BinarySensor { base, .. })
            | EntityKind::Switch(Switch { base, .. })
            | EntityKind::Select(Select { base, .. })
            | EntityKind::Number(Number { base, .. })
            | EntityKind::Text(Text { base, .. }) => base.unique_id.clone(),
        };
        Self { unique_id, kind }
    }

    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    /// The unique id. For device triggers, this is `{type}_{subtype}`.
    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn platform(&self) -> Platform {
        match &self.kind {
            EntityKind::Sensor(_) => Platform::Sensor,
            EntityKind::BinarySensor(_) => Platform::BinarySensor,
            EntityKind::Switch(_) => Platform::Switch,
            EntityKind::Select(_) => Platform::Select,
            EntityKind::Number(_) => Platform::Number,
            EntityKind::Text(_) => Platform::Text,
            EntityKind::DeviceTrigger(_) => Platform::DeviceTrigger,
        }
    }

    /// The shared attributes, `None` for device triggers.
    pub fn base(&self) -> Option<&EntityBase> {
        match &self.kind {
            EntityKind::Sensor(e) => Some(&e.base),
            EntityKind::BinarySensor(e) => Some(&e.base),
            EntityKind::Switch(e) => Some(&e.base),
            EntityKind::Select(e) => Some(&e.base),
            EntityKind::Number(e) => Some(&e.base),
            EntityKind::Text(e) => Some(&e.base),
            EntityKind::DeviceTrigger(_) => None,
        }
    }

    /// The command side, only present for writable entities.
    pub fn command(&self) -> Option<&Command> {
        match &self.kind {
            EntityKind::Switch(e) => Some(&e.command),
            EntityKind::Select(e) => Some(&e.command),
            EntityKind::Number(e) => Some(&e.command),
            EntityKind::Text(e) => Some(&e.command),
            EntityKind::Sensor(_) | EntityKind::BinarySensor(_) | EntityKind::DeviceTrigger(_) => {
                None
            }
        }
    }

    pub fn state_topic(&self) -> Option<&str> {
        self.base().map(|base| base.state_topic.as_str())
    }

    pub fn json_attributes_topic(&self) -> Option<&str> {
        self.base()
            .and_then(|base| base.json_attributes_topic.as_deref())
    }

    pub fn availability(&self) -> &[Availability] {
        self.base()
            .map(|base| base.availability.as_slice())
            .unwrap_or_default()
    }

    pub fn discovery_extra(&self) -> &Map<String, Value> {
        match &self.kind {
            EntityKind::Sensor(e) => &e.base.discovery_extra,
            EntityKind::BinarySensor(e) => &e.base.discovery_extra,
            EntityKind::Switch(e) => &e.base.discovery_extra,
            EntityKind::Select(e) => &e.base.discovery_extra,
            EntityKind::Number(e) => &e.base.discovery_extra,
            EntityKind::Text(e) => &e.base.discovery_extra,
            EntityKind::DeviceTrigger(t) => &t.discovery_extra,
        }
    }

    /// The object id used in per-entity discovery topics.
    ///
    /// This is the unique id, without a leading device id.
    pub fn object_id(&self, device_id: &str) -> &str {
        match self.unique_id.strip_prefix(device_id) {
            Some(rest) if !rest.trim_matches('_').is_empty() => rest.trim_matches('_'),
            _ => &self.unique_id,
        }
    }

    /// The discovery attributes of the entity, in declaration order.
    pub fn fields(&self) -> Vec<Field> {
        match &self.kind {
            EntityKind::Sensor(e) => {
                let mut fields = e.base.fields();
                fields.push(Field::new(
                    "suggested_display_precision",
                    e.suggested_display_precision,
                ));
                fields
            }
            EntityKind::BinarySensor(e) => {
                let mut fields = e.base.fields();
                fields.push(Field::new("payload_on", e.payload_on.clone()).with_default("ON"));
                fields.push(Field::new("payload_off", e.payload_off.clone()).with_default("OFF"));
                fields
            }
            EntityKind::Switch(e) => {
                let mut fields = e.base.fields();
                fields.extend(e.command.fields());
                fields.push(Field::new("payload_on", e.payload_on.clone()).with_default("ON"));
                fields.push(Field::new("payload_off", e.payload_off.clone()).with_default("OFF"));
                fields
            }
            EntityKind::Select(e) => {
                let mut fields = e.base.fields();
                fields.extend(e.command.fields());
                fields.push(Field::new("options", e.options.clone()));
                fields
            }
            EntityKind::Number(e) => {
                let mut fields = e.base.fields();
                fields.extend(e.command.fields());
                fields.push(Field::new("min", e.min).with_default(1.0));
                fields.push(Field::new("max", e.max).with_default(100.0));
                fields.push(Field::new("step", e.step).with_default(1.0));
                fields.push(Field::new("mode", e.mode.clone()).with_default("auto"));
                fields
            }
            EntityKind::Text(e) => {
                let mut fields = e.base.fields();
                fields.extend(e.command.fields());
                fields.push(Field::new("min", e.min).with_default(0));
                fields.push(Field::new("max", e.max).with_default(255));
                fields.push(Field::new("mode", e.mode.clone()).with_default("text"));
                fields.push(Field::new("pattern", e.pattern.clone()));
                fields
            }
            EntityKind::DeviceTrigger(t) => vec![
                Field::new("automation_type", "trigger"),
                Field::new("topic", t.topic.clone()),
                Field::new("type", t.trigger_type.clone()),
                Field::new("subtype", t.subtype.clone()),
                Field::new("payload", t.payload.clone()),
                Field::new("value_template", t.value_template.clone()),
                Field::new("platform", Platform::DeviceTrigger.as_ref()),
            ],
        }
    }
}
