// Engine.IO (protocol 3) and Socket.IO packet framing.
//
// The vendor event channel is Socket.IO carried over a plain WebSocket.
// Each text frame is one Engine.IO packet: a single type digit followed by
// an optional payload. Engine "message" packets carry a Socket.IO packet,
// again a type digit, then an optional `/namespace,`, an optional ack id,
// and a JSON payload.
//
//   0{"sid":"..","pingInterval":25000,"pingTimeout":60000}   open
//   2 / 3                                                    ping / pong
//   40                                                       socket connect
//   42["event",{"type":"device-state-changed","data":{..}}]  socket event

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::error::Error;

/// Engine.IO protocol revision the vendor speaks.
pub const ENGINE_IO_VERSION: &str = "3";

/// Engine ping packet sent by the client.
pub const PING: &str = "2";

/// Engine pong packet answering a server ping.
pub const PONG: &str = "3";

// ── Engine.IO ────────────────────────────────────────────────────────

/// Handshake parameters from the engine `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    #[serde(default)]
    pub sid: String,
    /// Milliseconds between client pings.
    #[serde(default)]
    pub ping_interval: u64,
    /// Milliseconds the server waits for a ping before dropping us.
    #[serde(default)]
    pub ping_timeout: u64,
}

impl Handshake {
    pub fn ping_interval(&self) -> Option<Duration> {
        (self.ping_interval > 0).then(|| Duration::from_millis(self.ping_interval))
    }

    pub fn ping_timeout(&self) -> Option<Duration> {
        (self.ping_timeout > 0).then(|| Duration::from_millis(self.ping_timeout))
    }
}

/// One Engine.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    Message(SocketPacket),
    Upgrade,
    Noop,
}

/// One Socket.IO packet, carried inside [`EnginePacket::Message`].
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect { namespace: String },
    Disconnect { namespace: String },
    Event { name: String, args: Vec<Value> },
    Ack { id: u64, args: Vec<Value> },
    Error(Value),
    /// Binary attachments are never used by the vendor.
    Binary,
}

/// Decode one WebSocket text frame.
pub fn decode(frame: &str) -> Result<EnginePacket, Error> {
    let mut chars = frame.chars();
    let kind = chars
        .next()
        .ok_or_else(|| Error::Protocol("empty frame".into()))?;
    let rest = chars.as_str();

    match kind {
        '0' => {
            let handshake: Handshake = serde_json::from_str(rest)
                .map_err(|e| Error::Protocol(format!("bad open packet: {e}")))?;
            Ok(EnginePacket::Open(handshake))
        }
        '1' => Ok(EnginePacket::Close),
        '2' => Ok(EnginePacket::Ping(rest.to_string())),
        '3' => Ok(EnginePacket::Pong(rest.to_string())),
        '4' => decode_socket(rest).map(EnginePacket::Message),
        '5' => Ok(EnginePacket::Upgrade),
        '6' => Ok(EnginePacket::Noop),
        other => Err(Error::Protocol(format!("unknown engine packet type `{other}`"))),
    }
}

fn decode_socket(body: &str) -> Result<SocketPacket, Error> {
    let mut chars = body.chars();
    let kind = chars
        .next()
        .ok_or_else(|| Error::Protocol("empty socket packet".into()))?;
    let mut rest = chars.as_str();

    // Optional namespace, terminated by a comma.
    let mut namespace = String::from("/");
    if rest.starts_with('/') {
        let end = rest.find(',').unwrap_or(rest.len());
        namespace = rest[..end].to_string();
        rest = rest.get(end + 1..).unwrap_or("");
    }

    // Optional ack id.
    let digits = rest.chars().take_while(char::is_ascii_digit).count();
    let ack_id = if digits > 0 {
        rest[..digits].parse::<u64>().ok()
    } else {
        None
    };
    rest = &rest[digits..];

    match kind {
        '0' => Ok(SocketPacket::Connect { namespace }),
        '1' => Ok(SocketPacket::Disconnect { namespace }),
        '2' => {
            let mut items = parse_array(rest)?.into_iter();
            let name = match items.next() {
                Some(Value::String(name)) => name,
                other => {
                    return Err(Error::Protocol(format!(
                        "event name must be a string, found {other:?}"
                    )));
                }
            };
            Ok(SocketPacket::Event {
                name,
                args: items.collect(),
            })
        }
        '3' => Ok(SocketPacket::Ack {
            id: ack_id.unwrap_or_default(),
            args: parse_array(rest)?,
        }),
        '4' => {
            let payload = if rest.is_empty() {
                Value::Null
            } else {
                serde_json::from_str(rest).unwrap_or_else(|_| Value::String(rest.to_string()))
            };
            Ok(SocketPacket::Error(payload))
        }
        '5' | '6' => Ok(SocketPacket::Binary),
        other => Err(Error::Protocol(format!("unknown socket packet type `{other}`"))),
    }
}

fn parse_array(raw: &str) -> Result<Vec<Value>, Error> {
    match serde_json::from_str(raw) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(other) => Err(Error::Protocol(format!(
            "expected a JSON array payload, found {}",
            crate::payload::kind_of(&other)
        ))),
        Err(e) => Err(Error::Protocol(format!("bad JSON payload: {e}"))),
    }
}

/// Build the WebSocket URL for a location's event channel.
///
/// `{base}/socket.io/?EIO=3&transport=websocket&locationId=..&token=Bearer%20..`
/// with `https` mapped to `wss` and `http` to `ws`.
pub fn channel_url(base: &Url, location_id: &str, token: &str) -> Result<Url, Error> {
    let mut url = base.join("/socket.io/")?;
    let scheme = match base.scheme() {
        "http" | "ws" => "ws",
        _ => "wss",
    };
    url.set_scheme(scheme)
        .map_err(|()| Error::WebSocketConnect(format!("cannot use scheme {scheme} for {base}")))?;

    let encode = |s: &str| url::form_urlencoded::byte_serialize(s.as_bytes()).collect::<String>();
    url.set_query(Some(&format!(
        "EIO={ENGINE_IO_VERSION}&transport=websocket&locationId={}&token=Bearer%20{}",
        encode(location_id),
        encode(token),
    )));
    Ok(url)
}

// ── Tests ────────────────────────────────────────────────────────────
