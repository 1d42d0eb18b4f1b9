//! Domain events and the normalizer that produces them.
//!
//! The channel delivers envelopes of the shape `{ "type": ..., "data": {...} }`.
//! [`normalize`] dispatches on `type` and turns the envelope into a
//! [`HomeEvent`], or explains why it could not.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::payload::{self, ExtractError};

pub const DEVICE_STATE_CHANGED: &str = "device-state-changed";
pub const ALARM_STATE_CHANGED: &str = "alarm-state-changed";

// ── Domain events ────────────────────────────────────────────────────

/// One changed state value on a device.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChange {
    pub state_name: String,
    /// Passed through opaquely.
    pub value: Value,
}

/// A device reported one or more changed state values.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStateChanged {
    pub device_id: String,
    /// In source order.
    pub changes: Vec<StateChange>,
}

/// The location's alarm state changed.
///
/// Sub-event envelopes vary: an arm-pending envelope has no device id, so
/// absent fields are empty rather than an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmStateChanged {
    pub device_id: String,
    pub user_name: String,
    pub state: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// A normalized event from the channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum HomeEvent {
    DeviceStateChanged(DeviceStateChanged),
    AlarmStateChanged(AlarmStateChanged),
}

impl HomeEvent {
    /// The envelope `type` this event was produced from.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DeviceStateChanged(_) => DEVICE_STATE_CHANGED,
            Self::AlarmStateChanged(_) => ALARM_STATE_CHANGED,
        }
    }
}

// ── Errors ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("envelope is {found}, expected a mapping")]
    NotAMapping { found: &'static str },

    #[error("envelope has no usable `type`: {0}")]
    MissingType(ExtractError),

    #[error("unhandled event type `{0}`")]
    UnknownType(String),

    #[error("unable to find device id: {0}")]
    MissingDeviceId(ExtractError),

    #[error("unable to find changes: {0}")]
    MissingChanges(ExtractError),

    /// A single malformed entry fails the whole event.
    #[error("change #{index} is malformed: {source}")]
    MalformedChange {
        index: usize,
        #[source]
        source: ExtractError,
    },

    #[error("alarm data is {found}, expected a mapping")]
    AlarmDataNotAMapping { found: &'static str },
}

// ── Normalization ────────────────────────────────────────────────────

/// Dispatch an envelope on its `type` and normalize it.
pub fn normalize(envelope: &Value) -> Result<HomeEvent, NormalizeError> {
    ensure_mapping(envelope)?;
    let kind: String = payload::extract(envelope, &["type"]).map_err(NormalizeError::MissingType)?;

    match kind.as_str() {
        DEVICE_STATE_CHANGED => device_state_changed(envelope).map(HomeEvent::DeviceStateChanged),
        ALARM_STATE_CHANGED => alarm_state_changed(envelope).map(HomeEvent::AlarmStateChanged),
        _ => Err(NormalizeError::UnknownType(kind)),
    }
}

/// Convert a `device-state-changed` envelope.
///
/// Requires `data.deviceId` (string) and `data.changes` (sequence of
/// mappings each holding `stateName` and `value`).
pub fn device_state_changed(envelope: &Value) -> Result<DeviceStateChanged, NormalizeError> {
    ensure_mapping(envelope)?;

    let device_id: String =
        payload::extract(envelope, &["data", "deviceId"]).map_err(NormalizeError::MissingDeviceId)?;
    let raw_changes: Vec<Value> =
        payload::extract(envelope, &["data", "changes"]).map_err(NormalizeError::MissingChanges)?;

    let changes = raw_changes
        .iter()
        .enumerate()
        .map(|(index, change)| -> Result<StateChange, NormalizeError> {
            let malformed = |source| NormalizeError::MalformedChange { index, source };
            Ok(StateChange {
                state_name: payload::extract(change, &["stateName"]).map_err(malformed)?,
                value: payload::extract(change, &["value"]).map_err(malformed)?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DeviceStateChanged { device_id, changes })
}

/// Convert an `alarm-state-changed` envelope.
///
/// Only fails when the envelope (or a present `data`) is not a mapping.
/// Missing or mistyped fields resolve to empty values.
pub fn alarm_state_changed(envelope: &Value) -> Result<AlarmStateChanged, NormalizeError> {
    ensure_mapping(envelope)?;

    match envelope.get("data") {
        None | Some(Value::Null) => return Ok(AlarmStateChanged::default()),
        Some(data) if !data.is_object() => {
            return Err(NormalizeError::AlarmDataNotAMapping {
                found: payload::kind_of(data),
            });
        }
        Some(_) => {}
    }

    let text = |key| payload::extract::<String>(envelope, &["data", key]).unwrap_or_default();

    Ok(AlarmStateChanged {
        device_id: text("deviceId"),
        user_name: text("userName"),
        state: text("state"),
        timestamp: payload::extract(envelope, &["data", "timestamp"]).ok(),
    })
}

fn ensure_mapping(envelope: &Value) -> Result<(), NormalizeError> {
    if envelope.is_object() {
        Ok(())
    } else {
        Err(NormalizeError::NotAMapping {
            found: payload::kind_of(envelope),
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────────
