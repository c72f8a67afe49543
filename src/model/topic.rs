use crate::model::Platform;

/// The discovery topic of a device: `{prefix}/device/{device_id}/config`.
pub fn device_config_topic(prefix: &str, device_id: &str) -> String {
    format!("{prefix}/device/{device_id}/config")
}

/// The discovery topic of a single entity: `{prefix}/{platform}/{device_id}/{object_id}/config`.
pub fn entity_config_topic(
    prefix: &str,
    platform: Platform,
    device_id: &str,
    object_id: &str,
) -> String {
    format!("{prefix}/{platform}/{device_id}/{object_id}/config")
}

/// Subscription filters matching every discovery topic of a device, in either shape.
pub fn device_config_filters(prefix: &str, device_id: &str) -> [String; 2] {
    [
        device_config_topic(prefix, device_id),
        format!("{prefix}/+/{device_id}/+/config"),
    ]
}

/// Extract the device id from a discovery topic of either shape.
pub fn device_id_from_topic<'t>(prefix: &str, topic: &'t str) -> Option<&'t str> {
    let rest = topic.strip_prefix(prefix)?.strip_prefix('/')?;
    let segments: Vec<_> = rest.split('/').collect();

    match segments.as_slice() {
        ["device", device_id, "config"] => Some(*device_id),
        [_platform, device_id, _object_id, "config"] => Some(*device_id),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_topics() {
        assert_eq!(
            device_config_topic("homeassistant", "d1"),
            "homeassistant/device/d1/config"
        );
        assert_eq!(
            entity_config_topic("homeassistant", Platform::BinarySensor, "d1", "motion"),
            "homeassistant/binary_sensor/d1/motion/config"
        );
    }

    #[test]
    fn test_device_id_from_topic() {
        assert_eq!(
            device_id_from_topic("homeassistant", "homeassistant/device/d1/config"),
            Some("d1")
        );
        assert_eq!(
            device_id_from_topic("homeassistant", "homeassistant/sensor/d1/old_x/config"),
            Some("d1")
        );
        assert_eq!(
            device_id_from_topic("homeassistant", "homeassistant/status"),
            None
        );
        assert_eq!(
            device_id_from_topic("homeassistant", "other/sensor/d1/x/config"),
            None
        );
        assert_eq!(
            device_id_from_topic("homeassistant", "homeassistant/sensor/d1/x/state"),
            None
        );
    }
}
