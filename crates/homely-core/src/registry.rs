// ── Device registry ──
//
// Resolves an opaque device id to the presentation metadata used for
// topic naming. Built once from the home snapshot; descriptors are derived
// on first lookup and memoized in a `DashMap`, so concurrent readers never
// block each other and at most one writer derives a given id.

use std::sync::Arc;

use dashmap::DashMap;
use homely_api::{Device, Home};
use strum::{AsRefStr, Display, EnumString};
use tracing::trace;

use crate::error::CoreError;

/// Separator between floor and room in a device's location string.
const PLACEMENT_SEPARATOR: &str = " - ";

// ── Sensor classification ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum SensorKind {
    Motion,
    Smoke,
    Entry,
    Unknown,
}

impl SensorKind {
    /// Classify by substring match on the model name.
    ///
    /// Checked in priority order motion > smoke > entry; the first match
    /// wins. Matching is case-sensitive.
    pub fn classify(model_name: &str) -> Self {
        [
            ("Motion", Self::Motion),
            ("Smoke", Self::Smoke),
            ("Entry", Self::Entry),
        ]
        .into_iter()
        .find_map(|(needle, kind)| model_name.contains(needle).then_some(kind))
        .unwrap_or(Self::Unknown)
    }
}

// ── Descriptor ───────────────────────────────────────────────────────

/// Topic-safe rendering of a display string: lower-cased, spaces
/// replaced with underscores.
pub fn slug(s: &str) -> String {
    s.to_lowercase().replace(' ', "_")
}

/// Floor and room parsed from a `"<floor> - <room>"` location string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub floor: String,
    pub room: String,
    pub floor_slug: String,
    pub room_slug: String,
}

impl Placement {
    /// Exactly two parts, or no placement at all.
    pub fn parse(location: &str) -> Option<Self> {
        let mut parts = location.split(PLACEMENT_SEPARATOR);
        let (Some(floor), Some(room), None) = (parts.next(), parts.next(), parts.next()) else {
            return None;
        };
        Some(Self {
            floor: floor.to_string(),
            room: room.to_string(),
            floor_slug: slug(floor),
            room_slug: slug(room),
        })
    }
}

/// Derived, cached presentation metadata for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub sensor: SensorKind,
    /// Raw location string, e.g. `"Floor 0 - Entrance"`.
    pub location: String,
    /// Slug of the full location string; empty when the device has none.
    pub location_slug: String,
    pub placement: Option<Placement>,
    pub online: bool,
}

impl DeviceDescriptor {
    pub fn from_device(device: &Device) -> Self {
        Self {
            id: device.id.clone(),
            name: device.name.clone(),
            slug: slug(&device.name),
            sensor: SensorKind::classify(&device.model_name),
            location: device.location.clone(),
            location_slug: slug(&device.location),
            placement: Placement::parse(&device.location),
            online: device.online,
        }
    }
}

// ── Registry ─────────────────────────────────────────────────────────

pub struct DeviceRegistry {
    devices: Vec<Device>,
    cache: DashMap<String, Arc<DeviceDescriptor>>,
}

impl DeviceRegistry {
    pub fn new(devices: Vec<Device>) -> Self {
        Self {
            devices,
            cache: DashMap::new(),
        }
    }

    pub fn from_home(home: &Home) -> Self {
        Self::new(home.devices.clone())
    }

    /// Snapshot devices in their original order.
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Resolve a device id to its descriptor.
    ///
    /// The first lookup of an id scans the snapshot; later lookups hit the
    /// cache. Unknown ids are reported, never fatal.
    pub fn resolve(&self, device_id: &str) -> Result<Arc<DeviceDescriptor>, CoreError> {
        if let Some(hit) = self.cache.get(device_id) {
            return Ok(Arc::clone(&hit));
        }

        let device = self
            .devices
            .iter()
            .find(|d| d.id == device_id)
            .ok_or_else(|| CoreError::DeviceNotFound {
                identifier: device_id.to_string(),
            })?;

        trace!(device_id, "deriving device descriptor");
        let entry = self
            .cache
            .entry(device_id.to_string())
            .or_insert_with(|| Arc::new(DeviceDescriptor::from_device(device)));
        Ok(Arc::clone(&entry))
    }

    #[cfg(test)]
    fn cached(&self) -> usize {
        self.cache.len()
    }
}

// ── Tests ────────────────────────────────────────────────────────────
