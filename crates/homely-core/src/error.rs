// ── Core error types ──
//
// Domain-level failures of the bridge. Consumers never match on HTTP
// status codes or WebSocket errors directly: the `From<homely_api::Error>`
// impl translates wire-layer errors into the variants below.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    // ── Startup ──────────────────────────────────────────────────────
    #[error("No location is visible to this account")]
    NoLocation,

    #[error("{count} locations found; only a single location per process is supported")]
    UnsupportedLocations { count: usize },

    // ── Connection errors ────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Cannot reach Homely: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Event channel gave up after {attempts} attempts: {last_error}")]
    SessionGaveUp { attempts: u32, last_error: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Device not found: {identifier}")]
    DeviceNotFound { identifier: String },

    #[error("Invalid topic `{topic}`: {reason}")]
    InvalidTopic { topic: String, reason: &'static str },

    #[error("Publish to `{topic}` failed: {message}")]
    Publish { topic: String, message: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from wire-layer errors ────────────────────────────────

impl From<homely_api::Error> for CoreError {
    fn from(err: homely_api::Error) -> Self {
        use homely_api::Error as E;

        match err {
            E::Authentication { message } => CoreError::AuthenticationFailed { message },
            E::Transport(ref e) => {
                if e.is_timeout() || e.is_connect() {
                    CoreError::ConnectionFailed {
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            E::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            E::Tls(msg) => CoreError::ConnectionFailed {
                reason: format!("TLS error: {msg}"),
            },
            E::Api { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            E::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            E::WebSocketConnect(_)
            | E::WebSocketClosed { .. }
            | E::Protocol(_)
            | E::Channel(_)
            | E::Disconnected
            | E::PingTimeout { .. } => CoreError::ConnectionFailed {
                reason: err.to_string(),
            },
            E::MalformedEvent(e) => CoreError::Internal(format!("Malformed event: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_auth_error_maps_to_authentication_failed() {
        let err: CoreError = homely_api::Error::Authentication {
            message: "bad password".into(),
        }
        .into();
        assert!(matches!(err, CoreError::AuthenticationFailed { .. }));
    }

    #[test]
    fn channel_errors_map_to_connection_failures() {
        let err: CoreError = homely_api::Error::Disconnected.into();
        assert!(matches!(err, CoreError::ConnectionFailed { .. }));
        assert_eq!(err.to_string(), "Cannot reach Homely: disconnected");
    }

    #[test]
    fn api_status_is_preserved() {
        let err: CoreError = homely_api::Error::Api {
            status: 404,
            message: "no such home".into(),
        }
        .into();
        assert!(matches!(err, CoreError::Api { status: Some(404), .. }));
    }
}
