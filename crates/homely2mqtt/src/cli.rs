//! Clap derive structures for the `homely2mqtt` binary.
//!
//! Every flag that overrides a config value also reads an environment
//! variable, so container deployments need no config file at all.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use homely_api::MalformedEventPolicy;

/// homely2mqtt -- mirror a Homely alarm system onto MQTT
#[derive(Debug, Parser)]
#[command(
    name = "homely2mqtt",
    version,
    about = "Bridge Homely alarm system events to an MQTT broker",
    long_about = "Connects to the Homely cloud, publishes the current state of every\n\
        device under a topic root, then streams live device and alarm changes\n\
        until interrupted.",
    propagate_version = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the bridge (default)
    Run,
    /// Print the effective configuration with secrets redacted
    Config,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "HOMELY2MQTT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Homely account user name
    #[arg(long, short = 'u', env = "HOMELY_USERNAME", global = true)]
    pub username: Option<String>,

    /// Homely account password
    #[arg(long, env = "HOMELY_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    /// Homely API root
    #[arg(long, env = "HOMELY_BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// MQTT broker host
    #[arg(long, env = "MQTT_HOST", global = true)]
    pub mqtt_host: Option<String>,

    /// MQTT broker port
    #[arg(long, env = "MQTT_PORT", global = true)]
    pub mqtt_port: Option<u16>,

    /// Root every published topic is placed under
    #[arg(long, env = "MQTT_TOPIC_ROOT", global = true)]
    pub topic_root: Option<String>,

    /// What to do with an event that cannot be understood
    #[arg(long, env = "HOMELY2MQTT_MALFORMED", value_parser = parse_policy, global = true)]
    pub malformed: Option<MalformedEventPolicy>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log format
    #[arg(long, env = "HOMELY2MQTT_LOG_FORMAT", default_value = "pretty", global = true)]
    pub log_format: LogFormat,

    /// Also write logs to this file
    #[arg(long, env = "HOMELY2MQTT_LOG_FILE", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Pretty,
    /// One JSON object per line
    Json,
}

fn parse_policy(s: &str) -> Result<MalformedEventPolicy, String> {
    s.parse()
}
