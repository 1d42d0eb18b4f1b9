//! Binary-owned configuration: TOML file, environment, credential
//! resolution, and translation into the library config types.
//!
//! The libraries never see these types. They receive a pre-built
//! `TransportConfig`, `SessionConfig`, `BridgeConfig` and `MqttSettings`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use homely_api::{DEFAULT_BASE_URL, MalformedEventPolicy, SessionConfig, TransportConfig};
use homely_core::{BridgeConfig, ReconnectConfig};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::mqtt::MqttSettings;

/// Prefix of environment overrides, e.g. `HOMELY2MQTT_MQTT__HOST`.
pub const ENV_PREFIX: &str = "HOMELY2MQTT_";

/// Keyring service under which the Homely password may be stored.
pub const KEYRING_SERVICE: &str = "homely2mqtt";

// ── TOML config structs ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub homely: HomelySection,
    #[serde(default)]
    pub mqtt: MqttSection,
    #[serde(default)]
    pub bridge: BridgeSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HomelySection {
    pub username: Option<String>,
    /// Plaintext password -- prefer the env var or the keyring.
    pub password: Option<String>,
    pub base_url: String,
    /// HTTP request timeout.
    pub timeout: String,
}

impl Default for HomelySection {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            base_url: DEFAULT_BASE_URL.into(),
            timeout: "30s".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MqttSection {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic_root: String,
    pub keep_alive: String,
    /// How long to wait for the broker's CONNACK at startup.
    pub connect_timeout: String,
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: "homely2mqtt_client".into(),
            username: None,
            password: None,
            topic_root: "homely".into(),
            keep_alive: "30s".into(),
            connect_timeout: "10s".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BridgeSection {
    pub heartbeat_interval: String,
    pub startup_delay: String,
    pub handler_timeout: String,
    pub reconnect_initial_delay: String,
    pub reconnect_max_delay: String,
    /// Unset means retry forever.
    pub max_retries: Option<u32>,
    pub stable_after: String,
    pub malformed_events: MalformedEventPolicy,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            heartbeat_interval: "30s".into(),
            startup_delay: "500ms".into(),
            handler_timeout: "5s".into(),
            reconnect_initial_delay: "1s".into(),
            reconnect_max_delay: "5m".into(),
            max_retries: None,
            stable_after: "60s".into(),
            malformed_events: MalformedEventPolicy::Skip,
        }
    }
}

// ── Config file path ─────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("no", "homely2mqtt", "homely2mqtt").map_or_else(
        || PathBuf::from("homely2mqtt.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ───────────────────────────────────────────────────

/// The layered figment: defaults, then the TOML file, then environment.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load the full config from `path` (or the default location) and env.
pub fn load_config(path: Option<&Path>) -> Result<Config, CliError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    let config: Config = figment(&path).extract()?;
    Ok(config)
}

/// Apply command-line overrides on top of the loaded file.
pub fn apply_flags(config: &mut Config, global: &GlobalOpts) {
    if let Some(ref username) = global.username {
        config.homely.username = Some(username.clone());
    }
    if let Some(ref base_url) = global.base_url {
        config.homely.base_url.clone_from(base_url);
    }
    if let Some(ref host) = global.mqtt_host {
        config.mqtt.host.clone_from(host);
    }
    if let Some(port) = global.mqtt_port {
        config.mqtt.port = port;
    }
    if let Some(ref root) = global.topic_root {
        config.mqtt.topic_root.clone_from(root);
    }
    if let Some(policy) = global.malformed {
        config.bridge.malformed_events = policy;
    }
}

// ── Resolution ───────────────────────────────────────────────────────

/// Everything the bridge needs, validated.
#[derive(Debug)]
pub struct Settings {
    pub username: String,
    pub password: SecretString,
    pub transport: TransportConfig,
    pub session: SessionConfig,
    pub bridge: BridgeConfig,
    pub mqtt: MqttSettings,
}

/// Translate the loaded config into library configs.
///
/// This is the single boundary where binary config types cross into
/// library types.
pub fn resolve(config: &Config, global: &GlobalOpts) -> Result<Settings, CliError> {
    let (username, password) = resolve_credentials(&config.homely, global)?;

    let base_url: Url = config
        .homely
        .base_url
        .parse()
        .map_err(|e| validation("homely.base_url", format!("invalid URL: {e}")))?;

    let mut transport = TransportConfig::new(base_url.clone());
    transport.timeout = duration("homely.timeout", &config.homely.timeout)?;

    let b = &config.bridge;
    let mut session = SessionConfig::new(base_url);
    session.malformed = b.malformed_events;

    let bridge = BridgeConfig {
        heartbeat_interval: non_zero("bridge.heartbeat_interval", &b.heartbeat_interval)?,
        startup_delay: duration("bridge.startup_delay", &b.startup_delay)?,
        handler_timeout: non_zero("bridge.handler_timeout", &b.handler_timeout)?,
        reconnect: ReconnectConfig {
            initial_delay: duration("bridge.reconnect_initial_delay", &b.reconnect_initial_delay)?,
            max_delay: duration("bridge.reconnect_max_delay", &b.reconnect_max_delay)?,
            max_retries: b.max_retries,
            stable_after: duration("bridge.stable_after", &b.stable_after)?,
        },
        ..BridgeConfig::default()
    };

    Ok(Settings {
        username,
        password,
        transport,
        session,
        bridge,
        mqtt: resolve_mqtt(&config.mqtt)?,
    })
}

fn resolve_mqtt(m: &MqttSection) -> Result<MqttSettings, CliError> {
    if m.host.trim().is_empty() {
        return Err(validation("mqtt.host", "must not be empty"));
    }
    if m.port == 0 {
        return Err(validation("mqtt.port", "must not be 0"));
    }
    if m.client_id.is_empty() {
        return Err(validation("mqtt.client_id", "must not be empty"));
    }
    if m.topic_root.starts_with('/') || m.topic_root.contains(['+', '#']) {
        return Err(validation(
            "mqtt.topic_root",
            "must not start with '/' or contain wildcards",
        ));
    }
    if m.password.is_some() && m.username.is_none() {
        return Err(validation("mqtt.password", "requires mqtt.username"));
    }

    Ok(MqttSettings {
        host: m.host.clone(),
        port: m.port,
        client_id: m.client_id.clone(),
        username: m.username.clone(),
        password: m.password.clone().map(SecretString::from),
        topic_root: m.topic_root.clone(),
        keep_alive: non_zero("mqtt.keep_alive", &m.keep_alive)?,
        connect_timeout: non_zero("mqtt.connect_timeout", &m.connect_timeout)?,
    })
}

// ── Credential helpers ───────────────────────────────────────────────

/// Resolve the Homely user name and password.
///
/// The password comes from the flag / env var, then the system keyring,
/// then the plaintext config value.
fn resolve_credentials(
    homely: &HomelySection,
    global: &GlobalOpts,
) -> Result<(String, SecretString), CliError> {
    let path = || {
        global
            .config
            .clone()
            .unwrap_or_else(config_path)
            .display()
            .to_string()
    };

    let username = homely
        .username
        .clone()
        .filter(|u| !u.is_empty())
        .ok_or_else(|| CliError::NoCredentials {
            missing: "user name",
            path: path(),
        })?;

    // 1. Flag / env var
    if let Some(ref pw) = global.password {
        return Ok((username, SecretString::from(pw.clone())));
    }

    // 2. Keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &username) {
        if let Ok(pw) = entry.get_password() {
            return Ok((username, SecretString::from(pw)));
        }
    }

    // 3. Plaintext in config
    if let Some(ref pw) = homely.password {
        return Ok((username, SecretString::from(pw.clone())));
    }

    Err(CliError::NoCredentials {
        missing: "password",
        path: path(),
    })
}

// ── Value helpers ────────────────────────────────────────────────────

fn validation(field: &str, reason: impl Into<String>) -> CliError {
    CliError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

fn duration(field: &str, value: &str) -> Result<Duration, CliError> {
    humantime::parse_duration(value)
        .map_err(|e| validation(field, format!("`{value}` is not a duration: {e}")))
}

fn non_zero(field: &str, value: &str) -> Result<Duration, CliError> {
    let d = duration(field, value)?;
    if d.is_zero() {
        return Err(validation(field, "must be greater than zero"));
    }
    Ok(d)
}

/// Render the effective config as TOML with every secret replaced.
pub fn redacted_toml(config: &Config) -> Result<String, CliError> {
    const HIDDEN: &str = "<redacted>";

    let mut shown = config.clone();
    if shown.homely.password.is_some() {
        shown.homely.password = Some(HIDDEN.into());
    }
    if shown.mqtt.password.is_some() {
        shown.mqtt.password = Some(HIDDEN.into());
    }

    toml::to_string_pretty(&shown).map_err(|e| CliError::Internal(format!("render config: {e}")))
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;
    use std::io::Write;

    use crate::cli::Cli;

    fn global(args: &[&str]) -> GlobalOpts {
        let mut argv = vec!["homely2mqtt"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().global
    }

    fn from_toml(text: &str) -> Config {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::string(text))
            .extract()
            .unwrap()
    }

    #[test]
    fn defaults_resolve() {
        let mut config = Config::default();
        config.homely.username = Some("ola@example.com".into());
        config.homely.password = Some("hunter2".into());

        let settings = resolve(&config, &global(&[])).unwrap();

        assert_eq!(settings.username, "ola@example.com");
        assert_eq!(settings.transport.base_url.as_str(), "https://sdk.iotiliti.cloud/");
        assert_eq!(settings.bridge.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(settings.bridge.startup_delay, Duration::from_millis(500));
        assert_eq!(settings.bridge.reconnect.max_delay, Duration::from_secs(300));
        assert_eq!(settings.session.malformed, MalformedEventPolicy::Skip);
        assert_eq!(settings.mqtt.client_id, "homely2mqtt_client");
        assert_eq!(settings.mqtt.topic_root, "homely");
        assert_eq!(settings.mqtt.port, 1883);
    }

    #[test]
    fn toml_sections_override_defaults() {
        let config = from_toml(
            r#"
            [homely]
            username = "ola@example.com"
            password = "hunter2"

            [mqtt]
            host = "broker.lan"
            topic_root = "alarm/homely"

            [bridge]
            heartbeat_interval = "1m"
            max_retries = 10
            malformed_events = "terminate"
            "#,
        );

        let settings = resolve(&config, &global(&[])).unwrap();

        assert_eq!(settings.mqtt.host, "broker.lan");
        assert_eq!(settings.mqtt.topic_root, "alarm/homely");
        assert_eq!(settings.bridge.heartbeat_interval, Duration::from_secs(60));
        assert_eq!(settings.bridge.reconnect.max_retries, Some(10));
        assert_eq!(settings.session.malformed, MalformedEventPolicy::Terminate);
    }

    #[test]
    fn flags_win_over_file() {
        let mut config = from_toml(
            r#"
            [homely]
            username = "file@example.com"
            password = "from-file"
            [mqtt]
            host = "broker.lan"
            "#,
        );
        let flags = global(&[
            "--username",
            "flag@example.com",
            "--mqtt-host",
            "10.0.0.2",
            "--malformed",
            "terminate",
        ]);

        apply_flags(&mut config, &flags);

        assert_eq!(config.homely.username.as_deref(), Some("flag@example.com"));
        assert_eq!(config.mqtt.host, "10.0.0.2");
        assert_eq!(config.bridge.malformed_events, MalformedEventPolicy::Terminate);
    }

    #[test]
    fn password_flag_beats_config_file() {
        let mut config = Config::default();
        config.homely.username = Some("ola@example.com".into());
        config.homely.password = Some("from-file".into());

        let settings = resolve(&config, &global(&["--password", "from-flag"])).unwrap();

        assert_eq!(settings.password.expose_secret(), "from-flag");
    }

    #[test]
    fn missing_username_is_reported() {
        let err = resolve(&Config::default(), &global(&[])).unwrap_err();
        assert!(matches!(
            err,
            CliError::NoCredentials {
                missing: "user name",
                ..
            }
        ));
    }

    #[test]
    fn zero_heartbeat_is_rejected() {
        let mut config = Config::default();
        config.homely.username = Some("ola@example.com".into());
        config.homely.password = Some("pw".into());
        config.bridge.heartbeat_interval = "0s".into();

        let err = resolve(&config, &global(&[])).unwrap_err();
        assert!(
            matches!(err, CliError::Validation { ref field, .. } if field == "bridge.heartbeat_interval")
        );
    }

    #[test]
    fn bad_duration_is_rejected() {
        let mut config = Config::default();
        config.homely.username = Some("ola@example.com".into());
        config.homely.password = Some("pw".into());
        config.bridge.startup_delay = "soon".into();

        let err = resolve(&config, &global(&[])).unwrap_err();
        assert!(err.to_string().contains("bridge.startup_delay"));
    }

    #[test]
    fn topic_root_with_leading_slash_is_rejected() {
        let mut config = Config::default();
        config.homely.username = Some("ola@example.com".into());
        config.homely.password = Some("pw".into());
        config.mqtt.topic_root = "/home/homely".into();

        let err = resolve(&config, &global(&[])).unwrap_err();
        assert!(err.to_string().contains("mqtt.topic_root"));
    }

    #[test]
    fn load_config_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[mqtt]\nport = 8883").unwrap();

        let config = load_config(Some(file.path())).unwrap();

        assert_eq!(config.mqtt.port, 8883);
        assert_eq!(config.mqtt.host, "localhost");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_config(Some(Path::new("/nonexistent/homely2mqtt.toml"))).unwrap();
        assert_eq!(config.mqtt.topic_root, "homely");
    }

    #[test]
    fn redacted_output_hides_passwords() {
        let mut config = Config::default();
        config.homely.username = Some("ola@example.com".into());
        config.homely.password = Some("hunter2".into());
        config.mqtt.username = Some("bridge".into());
        config.mqtt.password = Some("s3cret".into());
        config.bridge.heartbeat_interval = "45s".into();

        let text = redacted_toml(&config).unwrap();

        assert!(!text.contains("hunter2"));
        assert!(!text.contains("s3cret"));
        assert!(text.contains("<redacted>"));
        assert!(text.contains("ola@example.com"));
        assert!(text.contains("45s"));
    }
}
