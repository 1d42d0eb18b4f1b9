// ── Topic publisher ──
//
// Turns domain events and snapshot data into bus messages. Every failure
// (bad topic, bus refusal) is logged and absorbed: publishing never stops
// the pipeline and is never retried here.

use std::future::Future;

use chrono::{DateTime, Utc};
use homely_api::{Home, StateChange};
use serde_json::Value;
use strum::{AsRefStr, Display};
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::registry::{DeviceDescriptor, DeviceRegistry};
use crate::topic::{self, Topic};

/// Publish primitive of the outbound message bus.
///
/// Implementations enqueue the message and return; delivery confirmation
/// is the bus's own business.
pub trait MessageBus: Send + Sync {
    fn publish(
        &self,
        topic: &Topic,
        payload: &Value,
        retain: bool,
    ) -> impl Future<Output = Result<(), CoreError>> + Send;
}

/// Bridge link state as published on `homely2mqtt/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum LinkStatus {
    Connecting,
    Connected,
    Disconnected,
}

// ── TopicPublisher ───────────────────────────────────────────────────

pub struct TopicPublisher<B> {
    bus: B,
}

impl<B: MessageBus> TopicPublisher<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Publish one message. Returns whether the bus accepted it.
    async fn send(&self, topic: Result<Topic, CoreError>, payload: &Value, retain: bool) -> bool {
        let topic = match topic {
            Ok(topic) => topic,
            Err(e) => {
                warn!(error = %e, "skipping publish");
                return false;
            }
        };

        match self.bus.publish(&topic, payload, retain).await {
            Ok(()) => {
                debug!(%topic, retain, "published");
                true
            }
            Err(e) => {
                warn!(%topic, error = %e, "publish failed");
                false
            }
        }
    }

    /// One state value on all of the device's per-change topics.
    pub async fn publish_state(
        &self,
        device: &DeviceDescriptor,
        state_name: &str,
        value: &Value,
    ) -> usize {
        let mut sent = 0;
        for topic in topic::state_topics(device, state_name) {
            sent += usize::from(self.send(topic, value, true).await);
        }
        sent
    }

    /// Fan a device-state change out to one set of messages per field.
    pub async fn publish_device_change(
        &self,
        device: &DeviceDescriptor,
        changes: &[StateChange],
    ) -> usize {
        let mut sent = 0;
        for change in changes {
            sent += self
                .publish_state(device, &change.state_name, &change.value)
                .await;
        }
        sent
    }

    pub async fn publish_alarm(&self, state: &str) -> bool {
        self.send(
            Topic::new(topic::HOME_ALARM),
            &Value::String(state.to_string()),
            true,
        )
        .await
    }

    /// Location metadata, published once at startup.
    pub async fn publish_home(&self, home: &Home) -> usize {
        let name = self
            .send(
                Topic::new(topic::HOME_NAME),
                &Value::String(home.name.clone()),
                true,
            )
            .await;
        let id = self
            .send(
                Topic::new(topic::HOME_LOCATION_ID),
                &Value::String(home.location_id.clone()),
                true,
            )
            .await;
        usize::from(name) + usize::from(id)
    }

    /// Static inventory plus current feature states for every device.
    pub async fn publish_inventory(&self, registry: &DeviceRegistry) -> usize {
        let mut sent = 0;
        for device in registry.devices() {
            let descriptor = match registry.resolve(&device.id) {
                Ok(d) => d,
                Err(e) => {
                    warn!(error = %e, "skipping inventory entry");
                    continue;
                }
            };

            let mut fields = vec![
                ("id", Value::String(descriptor.id.clone())),
                ("sensor", Value::String(descriptor.sensor.to_string())),
                ("location", Value::String(descriptor.location.clone())),
                ("online", Value::Bool(descriptor.online)),
            ];
            if let Some(placement) = &descriptor.placement {
                fields.push(("floor", Value::String(placement.floor.clone())));
                fields.push(("room", Value::String(placement.room.clone())));
            }

            for (field, value) in &fields {
                let topic = topic::inventory_topic(&descriptor, field);
                sent += usize::from(self.send(topic, value, true).await);
            }

            for (state_name, state) in device.features.states() {
                sent += self.publish_state(&descriptor, state_name, &state.value).await;
            }
        }
        sent
    }

    /// Liveness tick on `homely2mqtt/lastupdate`. Not retained.
    pub async fn publish_heartbeat(&self, at: DateTime<Utc>) -> bool {
        self.send(
            Topic::new(topic::LAST_UPDATE),
            &Value::String(at.to_rfc3339()),
            false,
        )
        .await
    }

    /// Link status on `homely2mqtt/status`. Not retained.
    pub async fn publish_status(&self, status: LinkStatus) -> bool {
        self.send(
            Topic::new(topic::STATUS),
            &Value::String(status.to_string()),
            false,
        )
        .await
    }
}

impl<B: MessageBus> MessageBus for std::sync::Arc<B> {
    fn publish(
        &self,
        topic: &Topic,
        payload: &Value,
        retain: bool,
    ) -> impl Future<Output = Result<(), CoreError>> + Send {
        (**self).publish(topic, payload, retain)
    }
}

// ── MemoryBus ────────────────────────────────────────────────────────


// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::memory::{MemoryBus, Published};
    use super::*;
    use homely_api::Device;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn registry() -> DeviceRegistry {
        let devices: Vec<Device> = serde_json::from_value(json!([
            {
                "id": "abc",
                "name": "Living Room",
                "location": "Floor 0 - Living room",
                "modelName": "Motion Sensor Mini",
                "online": true,
                "features": {
                    "temperature": { "states": {
                        "temperature": { "value": 21.5, "lastUpdated": null }
                    }}
                }
            },
            {
                "id": "def",
                "name": "Hall Smoke",
                "location": "",
                "modelName": "Smoke Alarm",
                "online": false
            }
        ]))
        .unwrap();
        DeviceRegistry::new(devices)
    }

    fn publisher() -> (Arc<MemoryBus>, TopicPublisher<Arc<MemoryBus>>) {
        let bus = Arc::new(MemoryBus::new());
        (Arc::clone(&bus), TopicPublisher::new(bus))
    }

    #[tokio::test]
    async fn device_change_publishes_three_messages() {
        let (bus, publisher) = publisher();
        let registry = registry();
        let device = registry.resolve("abc").unwrap();

        let sent = publisher
            .publish_device_change(
                &device,
                &[StateChange {
                    state_name: "temperature".into(),
                    value: json!(21.5),
                }],
            )
            .await;

        assert_eq!(sent, 3);
        let topics: Vec<String> = bus.messages().into_iter().map(|m| m.topic).collect();
        assert_eq!(
            topics,
            [
                "location/floor_0_-_living_room/living_room/temperature",
                "device/living_room/temperature",
                "abc/temperature",
            ]
        );
        assert!(bus.messages().iter().all(|m| m.payload == json!(21.5) && m.retain));
    }

    #[tokio::test]
    async fn each_change_is_fanned_out() {
        let (bus, publisher) = publisher();
        let registry = registry();
        let device = registry.resolve("abc").unwrap();

        let changes = [
            StateChange {
                state_name: "alarm".into(),
                value: json!(true),
            },
            StateChange {
                state_name: "tamper".into(),
                value: json!(false),
            },
        ];
        assert_eq!(publisher.publish_device_change(&device, &changes).await, 6);
        assert_eq!(bus.on("device/living_room/tamper")[0].payload, json!(false));
    }

    #[tokio::test]
    async fn alarm_is_retained_string() {
        let (bus, publisher) = publisher();
        assert!(publisher.publish_alarm("ARMED_AWAY").await);
        assert_eq!(
            bus.messages(),
            vec![Published {
                topic: "home/alarm".into(),
                payload: json!("ARMED_AWAY"),
                retain: true,
            }]
        );
    }

    #[tokio::test]
    async fn inventory_includes_static_fields_and_states() {
        let (bus, publisher) = publisher();
        let registry = registry();

        let sent = publisher.publish_inventory(&registry).await;

        // abc: id, sensor, location, online, floor, room + 3 temperature topics.
        // def: id, sensor, location, online + nothing else.
        assert_eq!(sent, 13);
        assert_eq!(bus.on("device/living_room/sensor")[0].payload, json!("motion"));
        assert_eq!(bus.on("device/living_room/floor")[0].payload, json!("Floor 0"));
        assert_eq!(bus.on("device/living_room/room")[0].payload, json!("Living room"));
        assert_eq!(bus.on("device/hall_smoke/online")[0].payload, json!(false));
        assert!(bus.on("device/hall_smoke/floor").is_empty());
        assert_eq!(bus.on("abc/temperature")[0].payload, json!(21.5));
    }

    #[tokio::test]
    async fn heartbeat_and_status_are_not_retained() {
        let (bus, publisher) = publisher();
        let at = DateTime::parse_from_rfc3339("2024-01-05T12:30:00Z")
            .unwrap()
            .with_timezone(&Utc);

        publisher.publish_heartbeat(at).await;
        publisher.publish_status(LinkStatus::Connected).await;

        let messages = bus.messages();
        assert_eq!(messages[0].topic, "homely2mqtt/lastupdate");
        assert_eq!(messages[0].payload, json!("2024-01-05T12:30:00+00:00"));
        assert_eq!(messages[1].payload, json!("connected"));
        assert!(messages.iter().all(|m| !m.retain));
    }

    #[tokio::test]
    async fn invalid_topic_is_skipped_not_fatal() {
        let (bus, publisher) = publisher();
        let registry = DeviceRegistry::new(
            serde_json::from_value(json!([{ "id": "x", "name": "", "location": "" }])).unwrap(),
        );
        let device = registry.resolve("x").unwrap();

        // Empty slug: only `x/alarm` is valid.
        let sent = publisher.publish_state(&device, "alarm", &json!(true)).await;
        assert_eq!(sent, 1);
        assert_eq!(bus.messages()[0].topic, "x/alarm");
    }

    struct RefusingBus;

    impl MessageBus for RefusingBus {
        async fn publish(&self, topic: &Topic, _: &Value, _: bool) -> Result<(), CoreError> {
            Err(CoreError::Publish {
                topic: topic.to_string(),
                message: "queue full".into(),
            })
        }
    }

    #[tokio::test]
    async fn bus_failures_are_absorbed() {
        let publisher = TopicPublisher::new(RefusingBus);
        assert!(!publisher.publish_alarm("DISARMED").await);
    }
}
