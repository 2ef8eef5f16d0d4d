//! Throttled connectivity tracking

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::{sync::Mutex, time::Instant};
use tracing::{info, warn};

use crate::CacheStore;

#[derive(Debug, Default)]
struct HealthState {
    connected: bool,
    last_probe: Option<Instant>,
    last_probe_at: Option<DateTime<Utc>>,
}

/// Owns the gateway's view of store connectivity.
///
/// The whole state sits behind one async mutex that stays locked for the
/// duration of a probe, so callers racing on an expired interval share a
/// single physical ping.
#[derive(Debug)]
pub struct HealthMonitor {
    interval: Duration,
    probe_timeout: Duration,
    state: Mutex<HealthState>,
}

impl HealthMonitor {
    pub fn new(interval: Duration, probe_timeout: Duration) -> Self {
        Self {
            interval,
            probe_timeout,
            state: Mutex::new(HealthState::default()),
        }
    }

    /// Last known connectivity, probing first if the interval has elapsed.
    ///
    /// The probe timestamp advances on failure as well, so an outage costs one
    /// ping per interval rather than one per call.
    pub async fn check(&self, store: &dyn CacheStore) -> bool {
        let mut state = self.state.lock().await;
        let due = state
            .last_probe
            .map_or(true, |last| last.elapsed() >= self.interval);
        if due {
            self.probe_locked(&mut state, store).await;
        }
        state.connected
    }

    /// Probe now, ignoring the interval
    pub async fn probe(&self, store: &dyn CacheStore) -> bool {
        let mut state = self.state.lock().await;
        self.probe_locked(&mut state, store).await;
        state.connected
    }

    /// Record a failed operation; calls short-circuit until the next probe
    pub async fn mark_disconnected(&self, reason: &str) {
        let mut state = self.state.lock().await;
        if state.connected {
            warn!(reason, "Cache store marked disconnected");
        }
        state.connected = false;
    }

    /// `(connected, last_health_check)` without probing
    pub async fn snapshot(&self) -> (bool, Option<DateTime<Utc>>) {
        let state = self.state.lock().await;
        (state.connected, state.last_probe_at)
    }

    async fn probe_locked(&self, state: &mut HealthState, store: &dyn CacheStore) {
        let outcome = tokio::time::timeout(self.probe_timeout, store.ping()).await;
        let connected = matches!(outcome, Ok(Ok(())));

        match (&outcome, state.connected, connected) {
            (_, false, true) if state.last_probe.is_some() => {
                info!("Cache store connection restored")
            }
            (Ok(Err(e)), true, false) => warn!(error = %e, "Cache health check failed"),
            (Err(_), true, false) => warn!(
                timeout_ms = self.probe_timeout.as_millis() as u64,
                "Cache health check timed out"
            ),
            (_, _, false) if state.last_probe.is_none() => {
                warn!("Cache store unreachable, continuing without cache")
            }
            _ => {}
        }

        state.connected = connected;
        state.last_probe = Some(Instant::now());
        state.last_probe_at = Some(Utc::now());
    }
}
