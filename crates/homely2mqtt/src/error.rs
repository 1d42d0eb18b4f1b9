//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` variants into user-facing errors with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use homely_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const CONFIG: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the Homely cloud: {reason}")]
    #[diagnostic(
        code(homely2mqtt::connection_failed),
        help("Check network access to the Homely API and the configured base_url.")
    )]
    ConnectionFailed { reason: String },

    #[error("Event channel gave up after {attempts} attempts")]
    #[diagnostic(
        code(homely2mqtt::channel_gave_up),
        help(
            "Last error: {last_error}\n\
             Raise bridge.max_retries or leave it unset to retry forever."
        )
    )]
    ChannelGaveUp { attempts: u32, last_error: String },

    #[error("Could not connect to MQTT broker at {host}:{port}")]
    #[diagnostic(
        code(homely2mqtt::broker_unreachable),
        help(
            "Reason: {reason}\n\
             Check mqtt.host / mqtt.port, or set MQTT_HOST and MQTT_PORT."
        )
    )]
    BrokerUnreachable {
        host: String,
        port: u16,
        reason: String,
    },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(homely2mqtt::auth_failed),
        help("Verify the Homely user name and password used by the Homely app.")
    )]
    AuthFailed { message: String },

    #[error("No Homely {missing} configured")]
    #[diagnostic(
        code(homely2mqtt::no_credentials),
        help(
            "Set HOMELY_USERNAME and HOMELY_PASSWORD, store the password in the\n\
             system keyring (service `homely2mqtt`, account = user name), or put\n\
             both under [homely] in {path}"
        )
    )]
    NoCredentials { missing: &'static str, path: String },

    // ── Account ──────────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(
        code(homely2mqtt::location),
        help("The account must see exactly one location.")
    )]
    Location { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(homely2mqtt::validation))]
    Validation { field: String, reason: String },

    #[error(transparent)]
    #[diagnostic(code(homely2mqtt::config))]
    Config(Box<figment::Error>),

    // ── Runtime ──────────────────────────────────────────────────────
    #[error("API error: {message}")]
    #[diagnostic(code(homely2mqtt::api_error))]
    Api { message: String },

    #[error("{0}")]
    #[diagnostic(code(homely2mqtt::internal))]
    Internal(String),
}

impl From<figment::Error> for CliError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. }
            | Self::ChannelGaveUp { .. }
            | Self::BrokerUnreachable { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::Validation { .. } | Self::Config(_) => exit_code::CONFIG,
            Self::Location { .. } | Self::Api { .. } | Self::Internal(_) => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { reason } => CliError::ConnectionFailed { reason },

            CoreError::SessionGaveUp {
                attempts,
                last_error,
            } => CliError::ChannelGaveUp {
                attempts,
                last_error,
            },

            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },

            err @ (CoreError::NoLocation | CoreError::UnsupportedLocations { .. }) => {
                CliError::Location {
                    message: err.to_string(),
                }
            }

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            CoreError::Api { message, status } => CliError::Api {
                message: match status {
                    Some(code) => format!("{message} (HTTP {code})"),
                    None => message,
                },
            },

            err @ (CoreError::DeviceNotFound { .. }
            | CoreError::InvalidTopic { .. }
            | CoreError::Publish { .. }
            | CoreError::Internal(_)) => CliError::Internal(err.to_string()),
        }
    }
}

impl From<homely_api::Error> for CliError {
    fn from(err: homely_api::Error) -> Self {
        CoreError::from(err).into()
    }
}
