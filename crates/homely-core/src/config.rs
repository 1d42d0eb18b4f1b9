// ── Runtime bridge configuration ──
//
// These types describe *how* the bridge runs: pacing, timeouts and the
// reconnect policy. They never touch disk; the binary builds a
// `BridgeConfig` from its layered config and hands it in.

use std::time::Duration;

use crate::reconnect::ReconnectConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Interval of the `homely2mqtt/lastupdate` liveness tick.
    pub heartbeat_interval: Duration,
    /// Pause between the location and home snapshot calls, to stay clear
    /// of upstream rate limiting.
    pub startup_delay: Duration,
    /// Upper bound on publishing one event's messages.
    pub handler_timeout: Duration,
    /// Capacity of the session → bridge event queue.
    pub event_buffer: usize,
    pub reconnect: ReconnectConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            startup_delay: Duration::from_millis(500),
            handler_timeout: Duration::from_secs(5),
            event_buffer: 64,
            reconnect: ReconnectConfig::default(),
        }
    }
}
