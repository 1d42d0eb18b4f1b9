mod cli;
mod config;
mod error;
mod mqtt;

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use homely_api::{HomelyClient, PasswordCredentials, Session};
use homely_core::{Bridge, TopicPublisher};

use crate::cli::{Cli, Command, GlobalOpts, LogFormat};
use crate::error::CliError;
use crate::mqtt::MqttBus;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let guard = init_tracing(
        cli.global.verbose,
        cli.global.log_format,
        cli.global.log_file.as_deref(),
    );

    let result = run(cli).await;

    // Flush the file writer before exiting.
    drop(guard);

    if let Err(err) = result {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8, format: LogFormat, log_file: Option<&Path>) -> Option<WorkerGuard> {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let (writer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path.file_name().unwrap_or_else(|| OsStr::new("homely2mqtt.log"));
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (BoxMakeWriter::new(writer), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stderr), None),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_ansi(log_file.is_none())
        .with_writer(writer);

    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }

    guard
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut cfg = config::load_config(cli.global.config.as_deref())?;
    config::apply_flags(&mut cfg, &cli.global);

    match cli.command.unwrap_or(Command::Run) {
        Command::Config => {
            print!("{}", config::redacted_toml(&cfg)?);
            Ok(())
        }
        Command::Run => run_bridge(&cfg, &cli.global).await,
    }
}

async fn run_bridge(cfg: &config::Config, global: &GlobalOpts) -> Result<(), CliError> {
    let settings = config::resolve(cfg, global)?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("interrupt received, shutting down");
                    cancel.cancel();
                }
                Err(e) => warn!(error = %e, "cannot listen for Ctrl-C"),
            }
        }
    });

    let tokens = Arc::new(PasswordCredentials::new(
        settings.username,
        settings.password,
        &settings.transport,
    )?);
    let client = HomelyClient::new(settings.transport, Arc::clone(&tokens))?;
    let session = Session::new(settings.session, tokens);

    let bus = Arc::new(MqttBus::connect(&settings.mqtt).await?);
    let bridge = Bridge::new(
        client,
        session,
        TopicPublisher::new(Arc::clone(&bus)),
        settings.bridge,
    );

    info!(topic_root = %settings.mqtt.topic_root, "bridge starting");
    let outcome = bridge.run(cancel).await;
    bus.disconnect().await;

    outcome.map_err(CliError::from)
}
