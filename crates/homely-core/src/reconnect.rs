// ── Reconnect loop ──
//
// Drives the Session Manager repeatedly: run a session, and when it ends
// with an error wait out an exponential backoff before the next attempt.
// A session that stayed up for `stable_after` resets the attempt counter.

use std::sync::Arc;
use std::time::Duration;

use homely_api::{HomeEvent, Session, SessionEnd, TokenSource};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::CoreError;

/// Exponential backoff configuration for event channel reconnection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 5min.
    pub max_delay: Duration,

    /// Maximum consecutive failed attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,

    /// A session connected at least this long counts as healthy and
    /// resets the backoff. Default: 60s.
    pub stable_after: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            max_retries: None,
            stable_after: Duration::from_secs(60),
        }
    }
}

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * jitter`
///
/// Jitter is +-25%, deterministic in the attempt number.
pub fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt.min(30)).unwrap_or(30);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

/// Run sessions for `location_id` until cancelled or out of retries.
///
/// Returns `Ok(())` on cancellation and [`CoreError::SessionGaveUp`] once
/// `max_retries` consecutive attempts have failed.
pub async fn run_sessions<T: TokenSource>(
    session: Arc<Session<T>>,
    location_id: String,
    events: mpsc::Sender<HomeEvent>,
    config: ReconnectConfig,
    cancel: CancellationToken,
) -> Result<(), CoreError> {
    let mut attempt: u32 = 0;

    loop {
        let (error, uptime) = match session.run(&location_id, &events, &cancel).await {
            SessionEnd::Cancelled => break,
            SessionEnd::Disconnected { error, uptime } => (error, uptime),
        };

        if uptime.is_some_and(|up| up >= config.stable_after) {
            debug!(uptime_secs = uptime.map(|u| u.as_secs()), "session was stable, resetting backoff");
            attempt = 0;
        }

        warn!(error = %error, attempt, "event channel lost");

        if let Some(max) = config.max_retries {
            if attempt >= max {
                error!(max_retries = max, "event channel reconnection limit reached, giving up");
                return Err(CoreError::SessionGaveUp {
                    attempts: attempt + 1,
                    last_error: error.to_string(),
                });
            }
        }

        let delay = calculate_backoff(attempt, &config);
        info!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt,
            "waiting before reconnect"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }

        attempt = attempt.saturating_add(1);
    }

    debug!("reconnect loop exiting");
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────────
