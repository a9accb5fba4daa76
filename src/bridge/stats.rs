//! Traffic counters shared by the bridge tasks.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Monotonic counters, updated concurrently by the serial and network tasks
#[derive(Debug, Default)]
pub struct BridgeStats {
    pub serial_rx_bytes: AtomicU64,
    pub serial_rx_chunks: AtomicU64,
    pub serial_tx_bytes: AtomicU64,
    pub serial_tx_writes: AtomicU64,
    /// Bytes that arrived while the line was transmitting
    pub serial_bytes_lost: AtomicU64,
    pub serial_errors: AtomicU64,

    pub network_rx_bytes: AtomicU64,
    pub network_rx_datagrams: AtomicU64,
    pub network_tx_bytes: AtomicU64,
    pub network_tx_datagrams: AtomicU64,
    pub network_errors: AtomicU64,
    /// Datagrams dropped for exceeding the receive buffer
    pub oversize_datagrams: AtomicU64,

    pub heartbeats_sent: AtomicU64,
    pub heartbeats_received: AtomicU64,

    pub frames_parsed: AtomicU64,
    /// Bytes skipped while resynchronizing on the frame stream
    pub frame_error_bytes: AtomicU64,
    pub decode_errors: AtomicU64,

    serial_frame_types: Mutex<BTreeMap<u8, u64>>,
    network_frame_types: Mutex<BTreeMap<u8, u64>>,
}

/// Direction a frame travelled through the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameSource {
    /// Read from the local serial wire
    Serial,
    /// Received from the peer bridge
    Network,
}

/// Point-in-time copy of [`BridgeStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub serial_rx_bytes: u64,
    pub serial_rx_chunks: u64,
    pub serial_tx_bytes: u64,
    pub serial_tx_writes: u64,
    pub serial_bytes_lost: u64,
    pub serial_errors: u64,
    pub network_rx_bytes: u64,
    pub network_rx_datagrams: u64,
    pub network_tx_bytes: u64,
    pub network_tx_datagrams: u64,
    pub network_errors: u64,
    pub oversize_datagrams: u64,
    pub heartbeats_sent: u64,
    pub heartbeats_received: u64,
    pub frames_parsed: u64,
    pub frame_error_bytes: u64,
    pub decode_errors: u64,
    /// Frames seen per type, keyed by type code
    pub serial_frame_types: BTreeMap<u8, u64>,
    pub network_frame_types: BTreeMap<u8, u64>,
}

impl BridgeStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(counter: &AtomicU64, value: u64) {
        counter.fetch_add(value, Ordering::Relaxed);
    }

    pub fn incr(counter: &AtomicU64) {
        Self::add(counter, 1);
    }

    /// Count one frame of `frame_type` seen from `source`
    pub fn record_frame_type(&self, source: FrameSource, frame_type: u8) {
        let map = match source {
            FrameSource::Serial => &self.serial_frame_types,
            FrameSource::Network => &self.network_frame_types,
        };
        *map.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(frame_type)
            .or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        let types = |map: &Mutex<BTreeMap<u8, u64>>| {
            map.lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clone()
        };

        StatsSnapshot {
            serial_rx_bytes: load(&self.serial_rx_bytes),
            serial_rx_chunks: load(&self.serial_rx_chunks),
            serial_tx_bytes: load(&self.serial_tx_bytes),
            serial_tx_writes: load(&self.serial_tx_writes),
            serial_bytes_lost: load(&self.serial_bytes_lost),
            serial_errors: load(&self.serial_errors),
            network_rx_bytes: load(&self.network_rx_bytes),
            network_rx_datagrams: load(&self.network_rx_datagrams),
            network_tx_bytes: load(&self.network_tx_bytes),
            network_tx_datagrams: load(&self.network_tx_datagrams),
            network_errors: load(&self.network_errors),
            oversize_datagrams: load(&self.oversize_datagrams),
            heartbeats_sent: load(&self.heartbeats_sent),
            heartbeats_received: load(&self.heartbeats_received),
            frames_parsed: load(&self.frames_parsed),
            frame_error_bytes: load(&self.frame_error_bytes),
            decode_errors: load(&self.decode_errors),
            serial_frame_types: types(&self.serial_frame_types),
            network_frame_types: types(&self.network_frame_types),
        }
    }
}
