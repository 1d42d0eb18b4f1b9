// ── Topic paths ──
//
// Relative topic paths as handed to the message bus. The bus scopes them
// under its configured root, so a path must never start with a separator
// and no level may be empty.

use std::fmt;

use crate::error::CoreError;
use crate::registry::DeviceDescriptor;

pub const HOME_ALARM: &str = "home/alarm";
pub const HOME_NAME: &str = "home/name";
pub const HOME_LOCATION_ID: &str = "home/location_id";
pub const LAST_UPDATE: &str = "homely2mqtt/lastupdate";
pub const STATUS: &str = "homely2mqtt/status";

const SEPARATOR: char = '/';

/// A validated, relative topic path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic(String);

impl Topic {
    pub fn new(path: impl Into<String>) -> Result<Self, CoreError> {
        let path = path.into();
        let reason = if path.is_empty() {
            Some("topic is empty")
        } else if path.starts_with(SEPARATOR) {
            Some("topic must be relative (cannot begin with a separator)")
        } else if path.split(SEPARATOR).any(str::is_empty) {
            Some("topic contains an empty level")
        } else if path.contains(['+', '#']) {
            Some("topic contains a wildcard")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(CoreError::InvalidTopic {
                topic: path,
                reason,
            }),
            None => Ok(Self(path)),
        }
    }

    /// Join path segments with the separator and validate the result.
    pub fn from_segments<I, S>(segments: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = segments
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect::<Vec<_>>()
            .join("/");
        Self::new(joined)
    }

    /// This path placed under `root`, e.g. `homely/home/alarm`.
    pub fn scoped(&self, root: &str) -> Result<Self, CoreError> {
        let root = root.trim_end_matches(SEPARATOR);
        if root.is_empty() {
            return Ok(self.clone());
        }
        Self::new(format!("{root}/{}", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ── Naming ───────────────────────────────────────────────────────────

/// The per-change topics for one state value of a device:
///
/// - `location/<location_slug>/<device_slug>/<state>` (skipped when the
///   device has no location)
/// - `device/<device_slug>/<state>`
/// - `<device_id>/<state>`
pub fn state_topics(
    device: &DeviceDescriptor,
    state_name: &str,
) -> Vec<Result<Topic, CoreError>> {
    let mut topics = Vec::with_capacity(3);
    if !device.location_slug.is_empty() {
        topics.push(Topic::from_segments([
            "location",
            device.location_slug.as_str(),
            device.slug.as_str(),
            state_name,
        ]));
    }
    topics.push(Topic::from_segments(["device", device.slug.as_str(), state_name]));
    topics.push(Topic::from_segments([device.id.as_str(), state_name]));
    topics
}

/// `device/<device_slug>/<field>` for static inventory fields.
pub fn inventory_topic(device: &DeviceDescriptor, field: &str) -> Result<Topic, CoreError> {
    Topic::from_segments(["device", device.slug.as_str(), field])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::registry::{Placement, SensorKind};

    fn descriptor(location: &str) -> DeviceDescriptor {
        DeviceDescriptor {
            id: "abc".into(),
            name: "Living Room".into(),
            slug: "living_room".into(),
            sensor: SensorKind::Motion,
            location: location.into(),
            location_slug: crate::registry::slug(location),
            placement: Placement::parse(location),
            online: true,
        }
    }

    #[test]
    fn accepts_relative_paths() {
        assert_eq!(Topic::new("home/alarm").unwrap().as_str(), "home/alarm");
        assert_eq!(Topic::new("abc").unwrap().to_string(), "abc");
    }

    #[test]
    fn rejects_empty_and_absolute_paths() {
        assert!(matches!(
            Topic::new(""),
            Err(CoreError::InvalidTopic { reason: "topic is empty", .. })
        ));
        assert!(Topic::new("/home/alarm").is_err());
    }

    #[test]
    fn rejects_empty_levels_and_wildcards() {
        assert!(Topic::new("home//alarm").is_err());
        assert!(Topic::new("home/alarm/").is_err());
        assert!(Topic::new("device/+/temperature").is_err());
        assert!(Topic::new("device/#").is_err());
    }

    #[test]
    fn empty_segment_is_rejected() {
        assert!(Topic::from_segments(["device", "", "temperature"]).is_err());
    }

    #[test]
    fn scoped_prefixes_root() {
        let t = Topic::new("home/alarm").unwrap();
        assert_eq!(t.scoped("homely").unwrap().as_str(), "homely/home/alarm");
        assert_eq!(t.scoped("home/homely/").unwrap().as_str(), "home/homely/home/alarm");
        assert_eq!(t.scoped("").unwrap(), t);
        assert!(t.scoped("/home/homely").is_err());
    }

    #[test]
    fn state_topics_cover_three_forms() {
        let topics: Vec<String> = state_topics(&descriptor("Floor 0 - Living room"), "temperature")
            .into_iter()
            .map(|t| t.unwrap().to_string())
            .collect();
        assert_eq!(
            topics,
            [
                "location/floor_0_-_living_room/living_room/temperature",
                "device/living_room/temperature",
                "abc/temperature",
            ]
        );
    }

    #[test]
    fn state_topics_skip_location_when_absent() {
        let topics = state_topics(&descriptor(""), "alarm");
        assert_eq!(topics.len(), 2);
    }

    #[test]
    fn inventory_topic_under_device() {
        let t = inventory_topic(&descriptor("Hall"), "sensor").unwrap();
        assert_eq!(t.as_str(), "device/living_room/sensor");
    }
}
