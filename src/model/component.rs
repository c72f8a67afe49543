/// The hub platform an entity is published on.
#[derive(
    Copy,
    Clone,
    Eq,
    PartialEq,
    Hash,
    Debug,
    strum::AsRefStr,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum Platform {
    Sensor,
    BinarySensor,
    Switch,
    Select,
    Number,
    Text,
    #[strum(serialize = "device_automation")]
    DeviceTrigger,
}

impl Platform {
    /// If entities of this platform accept commands.
    pub fn is_writable(&self) -> bool {
        matches!(self, Self::Switch | Self::Select | Self::Number | Self::Text)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_names() {
        assert_eq!(Platform::BinarySensor.as_ref(), "binary_sensor");
        assert_eq!(Platform::DeviceTrigger.to_string(), "device_automation");
        assert_eq!(
            Platform::from_str("device_automation").ok(),
            Some(Platform::DeviceTrigger)
        );

        for platform in Platform::iter() {
            assert_eq!(Platform::from_str(platform.as_ref()).ok(), Some(platform));
        }
    }
}
