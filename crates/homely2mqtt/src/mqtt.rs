//! `MessageBus` backed by an MQTT broker via `rumqttc`.
//!
//! `rumqttc` splits a connection into an `AsyncClient` (the send half) and
//! an `EventLoop` that must be polled for anything to reach the wire. The
//! loop runs on its own task for the life of the bus; it reconnects on its
//! own when polled again after an error.
//!
//! Publishing never waits for the broker. While it is unreachable the
//! request queue fills and further messages are refused, not queued.

use std::sync::Mutex;
use std::time::Duration;

use homely_core::{CoreError, MessageBus, Topic};
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::CliError;

/// Requests buffered between the client handle and the event loop.
const REQUEST_CAPACITY: usize = 64;

/// Pause before polling again after a connection error.
const RETRY_PAUSE: Duration = Duration::from_secs(1);

/// How long `disconnect` waits for the DISCONNECT packet to go out.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    /// Prefix of every published topic.
    pub topic_root: String,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
}

impl MqttSettings {
    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);
        if let Some(ref user) = self.username {
            let password = self
                .password
                .as_ref()
                .map(|p| p.expose_secret().to_owned())
                .unwrap_or_default();
            options.set_credentials(user, password);
        }
        options
    }
}

pub struct MqttBus {
    client: AsyncClient,
    root: String,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl MqttBus {
    /// Connect to the broker and wait for its CONNACK.
    ///
    /// An unreachable or refusing broker is an error here; after this
    /// returns, connection trouble is only logged.
    pub async fn connect(settings: &MqttSettings) -> Result<Self, CliError> {
        let unreachable = |reason: String| CliError::BrokerUnreachable {
            host: settings.host.clone(),
            port: settings.port,
            reason,
        };

        let (client, mut eventloop) = AsyncClient::new(settings.options(), REQUEST_CAPACITY);

        let handshake = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        return if ack.code == ConnectReturnCode::Success {
                            Ok(())
                        } else {
                            Err(format!("connection refused: {:?}", ack.code))
                        };
                    }
                    Ok(_) => {}
                    Err(e) => return Err(e.to_string()),
                }
            }
        };

        tokio::time::timeout(settings.connect_timeout, handshake)
            .await
            .map_err(|_| {
                unreachable(format!(
                    "no CONNACK within {}",
                    humantime::format_duration(settings.connect_timeout)
                ))
            })?
            .map_err(unreachable)?;

        info!(
            host = %settings.host,
            port = settings.port,
            client_id = %settings.client_id,
            "connected to MQTT broker"
        );

        let driver = tokio::spawn(drive(eventloop));

        Ok(Self {
            client,
            root: settings.topic_root.clone(),
            driver: Mutex::new(Some(driver)),
        })
    }

    /// Send DISCONNECT and stop the event loop task.
    pub async fn disconnect(&self) {
        if let Err(e) = self.client.try_disconnect() {
            debug!(error = %e, "MQTT disconnect request not queued");
        }

        let driver = self.driver.lock().ok().and_then(|mut d| d.take());
        if let Some(mut driver) = driver {
            if tokio::time::timeout(DISCONNECT_GRACE, &mut driver).await.is_err() {
                driver.abort();
            }
        }
        info!("disconnected from MQTT broker");
    }
}

/// Poll the event loop until the client disconnects.
async fn drive(mut eventloop: EventLoop) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                info!(code = ?ack.code, "reconnected to MQTT broker");
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "MQTT connection error, retrying");
                tokio::time::sleep(RETRY_PAUSE).await;
            }
        }
    }
    debug!("MQTT event loop stopped");
}

impl MessageBus for MqttBus {
    async fn publish(&self, topic: &Topic, payload: &Value, retain: bool) -> Result<(), CoreError> {
        let topic = topic.scoped(&self.root)?;
        let bytes = serde_json::to_vec(payload).map_err(|e| CoreError::Publish {
            topic: topic.to_string(),
            message: e.to_string(),
        })?;

        self.client
            .try_publish(topic.as_str(), QoS::AtMostOnce, retain, bytes)
            .map_err(|e| CoreError::Publish {
                topic: topic.to_string(),
                message: e.to_string(),
            })
    }
}

// ── Tests ────────────────────────────────────────────────────────────
