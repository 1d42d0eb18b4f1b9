// Homely REST API response types
//
// Models for `GET /homely/locations` and `GET /homely/home/{id}`. Fields use
// `#[serde(default)]` liberally because the vendor is inconsistent about
// field presence and the shape has drifted over time.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// ── Location ─────────────────────────────────────────────────────────

/// Identity of a monitored site, from `GET /homely/locations`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub user_id: String,
    pub location_id: String,
    #[serde(default, rename = "gatewayserial", alias = "gatewaySerial")]
    pub gateway_serial: String,
}

// ── Home ─────────────────────────────────────────────────────────────

/// Full snapshot of a location, from `GET /homely/home/{locationId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Home {
    #[serde(default)]
    pub name: String,
    pub location_id: String,
    #[serde(default, rename = "gatewayserial", alias = "gatewaySerial")]
    pub gateway_serial: String,
    #[serde(default)]
    pub user_role_at_location: String,
    /// Last known alarm state, e.g. `"DISARMED"`, `"ARMED_AWAY"`.
    #[serde(default)]
    pub alarm_state: String,
    #[serde(default)]
    pub devices: Vec<Device>,
}

// ── Device ───────────────────────────────────────────────────────────

/// A sensor or gateway attached to a location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Stable, opaque, vendor-assigned identifier.
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub serial_number: String,
    /// Freeform placement, conventionally `"<floor> - <room>"`.
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub model_id: String,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub features: Features,
}

/// Feature blocks a device may expose. Each is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Features {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup: Option<Feature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alarm: Option<Feature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<Feature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery: Option<Feature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<Feature>,
}

impl Features {
    /// Iterate the present feature blocks with their names, in a fixed order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Feature)> {
        [
            ("setup", self.setup.as_ref()),
            ("alarm", self.alarm.as_ref()),
            ("temperature", self.temperature.as_ref()),
            ("battery", self.battery.as_ref()),
            ("diagnostic", self.diagnostic.as_ref()),
        ]
        .into_iter()
        .filter_map(|(name, feature)| feature.map(|f| (name, f)))
    }

    /// Every state value across all features, in feature then source order.
    pub fn states(&self) -> impl Iterator<Item = (&str, &State)> {
        self.iter()
            .flat_map(|(_, feature)| feature.states.iter().map(|(k, v)| (k.as_str(), v)))
    }
}

/// A feature block: named state values, e.g. `alarm`, `tamper`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub states: IndexMap<String, State>,
}

/// A single state value with its last update time.
///
/// The value is kept untyped: booleans, integers, floats and strings all
/// occur and are passed through to the bus as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

// ── Tests ────────────────────────────────────────────────────────────
