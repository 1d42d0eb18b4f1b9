use thiserror::Error;

use crate::event::NormalizeError;

/// Top-level error type for the `homely-api` crate.
///
/// Covers every failure mode across both API surfaces: the one-shot REST
/// calls (token, locations, home snapshot) and the long-lived Socket.IO
/// event channel. `homely-core` maps these into domain failures.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Token endpoint rejected the credentials.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS or HTTP client construction error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── REST API ────────────────────────────────────────────────────
    /// Non-success HTTP status from a REST endpoint.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Event channel ───────────────────────────────────────────────
    /// WebSocket dial or read failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed by the server.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// A frame did not follow the Engine.IO / Socket.IO framing.
    #[error("Socket.IO protocol error: {0}")]
    Protocol(String),

    /// The channel delivered an error frame.
    #[error("socketio error: {0}")]
    Channel(String),

    /// The channel signalled a disconnection (graceful or not -- the
    /// vendor does not distinguish the two).
    #[error("disconnected")]
    Disconnected,

    /// No frame arrived within the negotiated ping window.
    #[error("No traffic on event channel for {timeout_secs}s")]
    PingTimeout { timeout_secs: u64 },

    /// An inbound event could not be normalized.
    #[error("Malformed event: {0}")]
    MalformedEvent(#[from] NormalizeError),
}

impl Error {
    /// Returns `true` if the credentials were rejected.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if the server refused the bearer token, either over
    /// REST or on the event channel.
    pub fn rejects_token(&self) -> bool {
        matches!(self, Self::Authentication { .. } | Self::Channel(_))
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::WebSocketConnect(_)
            | Self::WebSocketClosed { .. }
            | Self::Disconnected
            | Self::PingTimeout { .. } => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnect_is_transient() {
        assert!(Error::Disconnected.is_transient());
        assert!(Error::PingTimeout { timeout_secs: 60 }.is_transient());
    }

    #[test]
    fn server_errors_are_transient_client_errors_are_not() {
        let busy = Error::Api {
            status: 503,
            message: "unavailable".into(),
        };
        let missing = Error::Api {
            status: 404,
            message: "no such home".into(),
        };
        assert!(busy.is_transient());
        assert!(!missing.is_transient());
    }

    #[test]
    fn channel_error_frames_reject_the_token() {
        assert!(Error::Channel("Not authorized".into()).rejects_token());
        assert!(!Error::Disconnected.rejects_token());
    }

    #[test]
    fn disconnected_display_matches_channel_wording() {
        assert_eq!(Error::Disconnected.to_string(), "disconnected");
    }
}
