#[derive(Copy, Clone, Eq, PartialEq, Debug, serde::Serialize, serde::Deserialize, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StateClass {
    Measurement,
    Total,
    TotalIncreasing,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, serde::Serialize, serde::Deserialize, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityCategory {
    Config,
    Diagnostic,
}

/// The device class the hub expects for a sensor reporting in `unit`.
///
/// Returns `None` for units without a matching class (including `kVAh`, which is *not* energy).
pub fn device_class_for_unit(unit: &str) -> Option<&'static str> {
    match unit {
        "W" | "kW" => Some("power"),
        "VA" | "kVA" => Some("apparent_power"),
        "V" => Some("voltage"),
        "kWh" => Some("energy"),
        "A" => Some("current"),
        "°C" => Some("temperature"),
        "%" => Some("battery"),
        _ => None,
    }
}

/// A default icon for writable entities using `unit`.
pub fn default_icon_for_unit(unit: &str) -> Option<&'static str> {
    match unit {
        "W" => Some("mdi:flash"),
        "V" => Some("mdi:sine-wave"),
        "A" => Some("mdi:current-ac"),
        "%" => Some("mdi:battery-lock"),
        _ => None,
    }
}
