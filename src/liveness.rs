//! # Liveness Tracking
//!
//! Records the last time traffic was seen on each side of the bridge and
//! decides when the next heartbeat is due.
//!
//! Uses `tokio::time::Instant`, which is monotonic and follows the paused
//! clock in tests.

use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// One side of the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Local half-duplex serial link
    Serial,
    /// Remote peer bridge over UDP
    Network,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Serial => write!(f, "serial"),
            Side::Network => write!(f, "network"),
        }
    }
}

/// Per-side activity timestamps and heartbeat scheduling
#[derive(Debug, Clone)]
pub struct LivenessTracker {
    serial_timeout: Duration,
    network_timeout: Duration,
    heartbeat_interval: Duration,
    last_serial: Option<Instant>,
    last_network: Option<Instant>,
    last_heartbeat: Option<Instant>,
}

impl LivenessTracker {
    /// Create a tracker with both sides disconnected
    pub fn new(
        serial_timeout: Duration,
        network_timeout: Duration,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            serial_timeout,
            network_timeout,
            heartbeat_interval,
            last_serial: None,
            last_network: None,
            last_heartbeat: None,
        }
    }

    /// Record traffic on `side` now
    pub fn mark_activity(&mut self, side: Side) {
        let now = Instant::now();
        match side {
            Side::Serial => self.last_serial = Some(now),
            Side::Network => self.last_network = Some(now),
        }
    }

    /// Time since the last traffic on `side`, `None` if never seen
    pub fn last_activity_elapsed(&self, side: Side) -> Option<Duration> {
        let last = match side {
            Side::Serial => self.last_serial,
            Side::Network => self.last_network,
        };
        last.map(|instant| instant.elapsed())
    }

    /// Whether traffic was seen on `side` within its timeout
    pub fn is_connected(&self, side: Side) -> bool {
        let timeout = match side {
            Side::Serial => self.serial_timeout,
            Side::Network => self.network_timeout,
        };
        self.last_activity_elapsed(side)
            .is_some_and(|elapsed| elapsed < timeout)
    }

    /// Returns true when a heartbeat should be sent, and restarts the interval
    ///
    /// The first call always returns true.
    pub fn due_for_heartbeat(&mut self) -> bool {
        let now = Instant::now();
        let due = self
            .last_heartbeat
            .map_or(true, |last| now.duration_since(last) >= self.heartbeat_interval);

        if due {
            self.last_heartbeat = Some(now);
        }
        due
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }
}
