// homely-core: Device registry, topic mapping and orchestration between homely-api and a message bus.

pub mod bridge;
pub mod config;
pub mod error;
pub mod publisher;
pub mod reconnect;
pub mod registry;
pub mod topic;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bridge::{Bridge, Router, select_location};
pub use config::BridgeConfig;
pub use error::CoreError;
pub use publisher::{LinkStatus, MessageBus, TopicPublisher};
pub use reconnect::{ReconnectConfig, calculate_backoff};
pub use registry::{DeviceDescriptor, DeviceRegistry, Placement, SensorKind, slug};
pub use topic::Topic;
