// homely-api: Async Rust client for the Homely alarm cloud (REST + Socket.IO event channel)

pub mod auth;
pub mod client;
pub mod error;
pub mod event;
pub mod models;
pub mod payload;
pub mod session;
pub mod socketio;
pub mod transport;

pub use auth::{PasswordCredentials, StaticToken, TokenSource};
pub use client::HomelyClient;
pub use error::Error;
pub use event::{AlarmStateChanged, DeviceStateChanged, HomeEvent, NormalizeError, StateChange};
pub use models::{Device, Feature, Features, Home, Location, State};
pub use session::{MalformedEventPolicy, Session, SessionConfig, SessionEnd, SessionState};
pub use transport::{DEFAULT_BASE_URL, TransportConfig};
