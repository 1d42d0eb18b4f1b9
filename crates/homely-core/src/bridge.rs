// ── Bridge orchestration ──
//
// Startup sequence (location → pause → home snapshot → registry → initial
// publish), then the steady-state loop: the reconnect loop runs the event
// channel in the background while this task publishes its events, ticks
// the liveness heartbeat and watches for cancellation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use homely_api::{HomeEvent, HomelyClient, Home, Location, Session, SessionState, TokenSource};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::error::CoreError;
use crate::publisher::{LinkStatus, MessageBus, TopicPublisher};
use crate::reconnect;
use crate::registry::DeviceRegistry;

/// Pick the single location this process serves.
pub fn select_location(mut locations: Vec<Location>) -> Result<Location, CoreError> {
    match locations.len() {
        0 => Err(CoreError::NoLocation),
        1 => locations.pop().ok_or(CoreError::NoLocation),
        count => Err(CoreError::UnsupportedLocations { count }),
    }
}

/// Await one publishing step, giving up after `limit`.
async fn bounded<F: Future>(limit: Duration, what: &'static str, step: F) {
    if tokio::time::timeout(limit, step).await.is_err() {
        warn!(
            what,
            timeout_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            "publishing timed out, dropping"
        );
    }
}

fn link_status(state: SessionState) -> LinkStatus {
    match state {
        SessionState::Unauthenticated | SessionState::Dialing => LinkStatus::Connecting,
        SessionState::Connected => LinkStatus::Connected,
        SessionState::Disconnected => LinkStatus::Disconnected,
    }
}

// ── Router ───────────────────────────────────────────────────────────

/// Owns the home snapshot and routes domain events to the publisher.
pub struct Router<B> {
    home: Home,
    registry: DeviceRegistry,
    publisher: TopicPublisher<B>,
}

impl<B: MessageBus> Router<B> {
    pub fn new(home: Home, publisher: TopicPublisher<B>) -> Self {
        let registry = DeviceRegistry::from_home(&home);
        Self {
            home,
            registry,
            publisher,
        }
    }

    pub fn home(&self) -> &Home {
        &self.home
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn publisher(&self) -> &TopicPublisher<B> {
        &self.publisher
    }

    /// Location metadata, device inventory and the current alarm state.
    pub async fn publish_snapshot(&self) -> usize {
        let mut sent = self.publisher.publish_home(&self.home).await;
        sent += self.publisher.publish_inventory(&self.registry).await;
        sent += usize::from(self.publisher.publish_alarm(&self.home.alarm_state).await);
        sent
    }

    /// Publish one event. Returns the number of messages accepted.
    pub async fn handle(&mut self, event: HomeEvent) -> usize {
        match event {
            HomeEvent::DeviceStateChanged(ev) => match self.registry.resolve(&ev.device_id) {
                Ok(device) => {
                    debug!(device = %device.slug, changes = ev.changes.len(), "device state changed");
                    self.publisher.publish_device_change(&device, &ev.changes).await
                }
                Err(e) => {
                    warn!(error = %e, "skipping device event");
                    0
                }
            },
            HomeEvent::AlarmStateChanged(ev) => {
                if ev.state.is_empty() {
                    debug!(user = %ev.user_name, "alarm event without a state, ignoring");
                    return 0;
                }
                info!(state = %ev.state, user = %ev.user_name, "alarm state changed");
                self.home.alarm_state = ev.state;
                usize::from(self.publisher.publish_alarm(&self.home.alarm_state).await)
            }
        }
    }
}

// ── Bridge ───────────────────────────────────────────────────────────

pub struct Bridge<T, B> {
    client: HomelyClient<T>,
    session: Arc<Session<T>>,
    publisher: TopicPublisher<B>,
    config: BridgeConfig,
}

impl<T, B> Bridge<T, B>
where
    T: TokenSource + 'static,
    B: MessageBus,
{
    pub fn new(
        client: HomelyClient<T>,
        session: Session<T>,
        publisher: TopicPublisher<B>,
        config: BridgeConfig,
    ) -> Self {
        Self {
            client,
            session: Arc::new(session),
            publisher,
            config,
        }
    }

    /// Run until `cancel` fires (`Ok`) or a fatal error occurs.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), CoreError> {
        let Self {
            client,
            session,
            publisher,
            config,
        } = self;

        let location = select_location(client.locations().await?)?;
        info!(
            location = %location.name,
            location_id = %location.location_id,
            "location resolved"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            () = tokio::time::sleep(config.startup_delay) => {}
        }

        let home = client.home(&location.location_id).await?;
        info!(
            devices = home.devices.len(),
            alarm_state = %home.alarm_state,
            "home snapshot loaded"
        );

        let mut router = Router::new(home, publisher);
        let sent = router.publish_snapshot().await;
        info!(messages = sent, "initial state published");

        let (events_tx, mut events_rx) = mpsc::channel(config.event_buffer);
        let mut state_rx = session.state();
        let session_cancel = cancel.child_token();
        let mut sessions = tokio::spawn(reconnect::run_sessions(
            Arc::clone(&session),
            location.location_id.clone(),
            events_tx,
            config.reconnect.clone(),
            session_cancel.clone(),
        ));
        let mut sessions_done = false;

        let mut heartbeat = tokio::time::interval(config.heartbeat_interval);

        let outcome = loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break Ok(()),
                joined = &mut sessions => {
                    sessions_done = true;
                    break match joined {
                        Ok(result) => result,
                        Err(e) => Err(CoreError::Internal(format!("session task failed: {e}"))),
                    };
                }
                Some(event) = events_rx.recv() => {
                    bounded(config.handler_timeout, event.kind(), router.handle(event)).await;
                }
                Ok(()) = state_rx.changed() => {
                    let state = *state_rx.borrow_and_update();
                    let status = router.publisher().publish_status(link_status(state));
                    bounded(config.handler_timeout, "status", status).await;
                }
                _ = heartbeat.tick() => {
                    let tick = router.publisher().publish_heartbeat(Utc::now());
                    bounded(config.handler_timeout, "heartbeat", tick).await;
                }
            }
        };

        // Unblocks a session waiting on a full queue.
        drop(events_rx);
        session_cancel.cancel();
        if !sessions_done {
            if let Err(e) = sessions.await {
                warn!(error = %e, "session task ended abnormally");
            }
        }
        let status = router.publisher().publish_status(LinkStatus::Disconnected);
        bounded(config.handler_timeout, "status", status).await;
        info!("bridge stopped");

        outcome
    }
}

// ── Tests ────────────────────────────────────────────────────────────
