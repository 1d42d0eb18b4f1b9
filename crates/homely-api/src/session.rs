//! Session Manager for the real-time event channel.
//!
//! One [`Session::run`] call is one session: acquire a token, dial the
//! Socket.IO endpoint for a location, and read frames until the channel
//! ends or the caller cancels. Normalized [`HomeEvent`]s are pushed into a
//! caller-supplied `mpsc` channel. The session never re-dials on its own;
//! the caller decides whether (and when) to call `run` again.
//!
//! ```rust,ignore
//! let session = Session::new(SessionConfig::new(base_url), tokens);
//! let (tx, mut rx) = tokio::sync::mpsc::channel(64);
//!
//! match session.run("loc-1", &tx, &cancel).await {
//!     SessionEnd::Cancelled => {}
//!     SessionEnd::Disconnected { error, .. } => tracing::warn!(%error, "channel dropped"),
//! }
//! ```

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::auth::TokenSource;
use crate::error::Error;
use crate::event::{self, HomeEvent};
use crate::socketio::{self, EnginePacket, Handshake, SocketPacket};
use crate::transport::DEFAULT_BASE_URL;

/// Socket.IO event name that carries `{type, data}` envelopes.
const ENVELOPE_EVENT: &str = "event";

// ── Configuration ────────────────────────────────────────────────────

/// What to do with an inbound event that cannot be normalized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedEventPolicy {
    /// Log the event and keep the session alive.
    #[default]
    Skip,
    /// End the session with [`Error::MalformedEvent`].
    Terminate,
}

impl FromStr for MalformedEventPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "terminate" => Ok(Self::Terminate),
            other => Err(format!(
                "unknown malformed-event policy `{other}` (expected `skip` or `terminate`)"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// REST base URL; the channel lives on the same host.
    pub base_url: Url,
    /// Upper bound on the WebSocket handshake.
    pub connect_timeout: Duration,
    /// Client ping cadence until the server's handshake says otherwise.
    pub ping_interval: Duration,
    /// Grace period on top of the ping interval before the channel is
    /// declared dead.
    pub ping_timeout: Duration,
    pub malformed: MalformedEventPolicy,
}

impl SessionConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            connect_timeout: Duration::from_secs(30),
            ping_interval: Duration::from_secs(30),
            ping_timeout: Duration::from_secs(60),
            malformed: MalformedEventPolicy::Skip,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        #[allow(clippy::unwrap_used)] // compile-time constant
        Self::new(Url::parse(DEFAULT_BASE_URL).unwrap())
    }
}

// ── State ────────────────────────────────────────────────────────────

/// Observable lifecycle of the current session attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Dialing,
    Connected,
    Disconnected,
}

/// How a session ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// The caller's cancellation token fired.
    Cancelled,
    /// The channel ended. `uptime` is how long it stayed connected, or
    /// `None` if the server never confirmed the socket connect.
    Disconnected {
        error: Error,
        uptime: Option<Duration>,
    },
}

// ── Session ──────────────────────────────────────────────────────────

pub struct Session<T> {
    config: SessionConfig,
    tokens: Arc<T>,
    state_tx: watch::Sender<SessionState>,
}

impl<T: TokenSource> Session<T> {
    pub fn new(config: SessionConfig, tokens: Arc<T>) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Unauthenticated);
        Self {
            config,
            tokens,
            state_tx,
        }
    }

    /// Subscribe to state transitions.
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Run one session to completion.
    ///
    /// Cancellation and channel termination race; whichever fires first
    /// decides the outcome.
    pub async fn run(
        &self,
        location_id: &str,
        events: &mpsc::Sender<HomeEvent>,
        cancel: &CancellationToken,
    ) -> SessionEnd {
        let mut connected_at = None;
        let result = self
            .connect_and_read(location_id, events, cancel, &mut connected_at)
            .await;
        self.state_tx.send_replace(SessionState::Disconnected);

        match result {
            Ok(()) => {
                debug!(location_id, "session cancelled");
                SessionEnd::Cancelled
            }
            Err(error) => {
                let uptime = connected_at.map(|at: Instant| at.elapsed());
                info!(location_id, error = %error, "session ended");
                if error.rejects_token() {
                    self.tokens.invalidate().await;
                }
                SessionEnd::Disconnected { error, uptime }
            }
        }
    }

    /// Authenticate, dial and read until the channel ends.
    ///
    /// `Ok(())` means the caller cancelled (or dropped the event receiver).
    async fn connect_and_read(
        &self,
        location_id: &str,
        events: &mpsc::Sender<HomeEvent>,
        cancel: &CancellationToken,
        connected_at: &mut Option<Instant>,
    ) -> Result<(), Error> {
        self.state_tx.send_replace(SessionState::Unauthenticated);
        let token = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            token = self.tokens.access_token() => token?,
        };

        self.state_tx.send_replace(SessionState::Dialing);
        let url = socketio::channel_url(&self.config.base_url, location_id, token.expose_secret())?;
        info!(location_id, host = url.host_str().unwrap_or_default(), "dialing event channel");

        let dial = tokio::time::timeout(
            self.config.connect_timeout,
            tokio_tungstenite::connect_async(url.as_str()),
        );
        let (ws_stream, _response) = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            dialed = dial => dialed
                .map_err(|_| Error::WebSocketConnect(format!(
                    "handshake timed out after {}s",
                    self.config.connect_timeout.as_secs()
                )))?
                .map_err(dial_error)?,
        };
        debug!(location_id, "websocket upgraded, waiting for socket connect");

        let (mut write, mut read) = ws_stream.split();

        let mut ping_every = self.config.ping_interval;
        let mut grace = self.config.ping_timeout;
        let mut ping_tick = tokio::time::interval_at(Instant::now() + ping_every, ping_every);
        let mut last_frame = Instant::now();

        loop {
            let silence_deadline = last_frame + ping_every + grace;

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    // Best effort; the connection is dropped either way.
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                frame = read.next() => {
                    last_frame = Instant::now();
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            match interpret(text.as_str(), self.config.malformed) {
                                Step::Continue => {}
                                Step::Reply(reply) => {
                                    write
                                        .send(Message::text(reply))
                                        .await
                                        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
                                }
                                Step::Open(handshake) => {
                                    debug!(sid = %handshake.sid, "engine handshake");
                                    if let Some(interval) = handshake.ping_interval() {
                                        ping_every = interval;
                                        ping_tick = tokio::time::interval_at(
                                            Instant::now() + ping_every,
                                            ping_every,
                                        );
                                    }
                                    if let Some(timeout) = handshake.ping_timeout() {
                                        grace = timeout;
                                    }
                                }
                                Step::Connected => {
                                    *connected_at = Some(Instant::now());
                                    self.state_tx.send_replace(SessionState::Connected);
                                    info!(location_id, "event channel connected");
                                }
                                Step::Deliver(event) => {
                                    tokio::select! {
                                        biased;
                                        () = cancel.cancelled() => return Ok(()),
                                        sent = events.send(event) => {
                                            if sent.is_err() {
                                                debug!("event receiver dropped, closing session");
                                                return Ok(());
                                            }
                                        }
                                    }
                                }
                                Step::End(error) => return Err(error),
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            return Err(match frame {
                                Some(cf) => Error::WebSocketClosed {
                                    code: u16::from(cf.code),
                                    reason: cf.reason.to_string(),
                                },
                                None => Error::Disconnected,
                            });
                        }
                        Some(Ok(_)) => {
                            // Binary, WebSocket-level ping/pong, raw frames.
                        }
                        Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
                        None => {
                            info!("event channel stream ended");
                            return Err(Error::Disconnected);
                        }
                    }
                }
                _ = ping_tick.tick() => {
                    trace!("engine ping");
                    write
                        .send(Message::text(socketio::PING))
                        .await
                        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
                }
                () = tokio::time::sleep_until(silence_deadline) => {
                    return Err(Error::PingTimeout {
                        timeout_secs: (ping_every + grace).as_secs(),
                    });
                }
            }
        }
    }
}

// ── Frame interpretation ─────────────────────────────────────────────

/// What the read loop should do with one text frame.
#[derive(Debug)]
enum Step {
    Continue,
    Reply(String),
    Open(Handshake),
    Connected,
    Deliver(HomeEvent),
    End(Error),
}

fn interpret(text: &str, policy: MalformedEventPolicy) -> Step {
    let packet = match socketio::decode(text) {
        Ok(packet) => packet,
        Err(e) => return malformed(e, policy),
    };

    match packet {
        EnginePacket::Open(handshake) => Step::Open(handshake),
        EnginePacket::Ping(payload) => Step::Reply(format!("{}{payload}", socketio::PONG)),
        EnginePacket::Pong(_) | EnginePacket::Noop | EnginePacket::Upgrade => Step::Continue,
        EnginePacket::Close => Step::End(Error::Disconnected),
        EnginePacket::Message(SocketPacket::Connect { namespace }) => {
            debug!(namespace, "socket connected");
            Step::Connected
        }
        EnginePacket::Message(SocketPacket::Disconnect { namespace }) => {
            info!(namespace, "socket disconnected by server");
            Step::End(Error::Disconnected)
        }
        EnginePacket::Message(SocketPacket::Error(payload)) => {
            let message = match payload {
                Value::String(s) => s,
                other => other.to_string(),
            };
            Step::End(Error::Channel(message))
        }
        EnginePacket::Message(SocketPacket::Event { name, args }) => {
            if name != ENVELOPE_EVENT {
                debug!(name, "ignoring non-envelope socket event");
                return Step::Continue;
            }
            let Some(envelope) = args.first() else {
                return malformed(
                    Error::Protocol("`event` packet without an envelope".into()),
                    policy,
                );
            };
            match event::normalize(envelope) {
                Ok(event) => {
                    trace!(kind = event.kind(), "event normalized");
                    Step::Deliver(event)
                }
                Err(e) => malformed(Error::MalformedEvent(e), policy),
            }
        }
        EnginePacket::Message(SocketPacket::Ack { .. } | SocketPacket::Binary) => Step::Continue,
    }
}

fn dial_error(err: tokio_tungstenite::tungstenite::Error) -> Error {
    use tokio_tungstenite::tungstenite::Error as WsError;

    match err {
        WsError::Http(resp) if resp.status().as_u16() == 401 => Error::Authentication {
            message: "event channel rejected the access token".into(),
        },
        other => Error::WebSocketConnect(other.to_string()),
    }
}

fn malformed(error: Error, policy: MalformedEventPolicy) -> Step {
    match policy {
        MalformedEventPolicy::Skip => {
            warn!(error = %error, "skipping malformed frame");
            Step::Continue
        }
        MalformedEventPolicy::Terminate => Step::End(error),
    }
}

// ── Tests ────────────────────────────────────────────────────────────
