//! # Bridge Module
//!
//! Moves bytes between the half-duplex serial wire and the peer bridge.
//!
//! Three tasks run per bridge, next to the half-duplex receive task:
//! - **serial**: takes chunks from the wire, forwards each to the network and,
//!   in the parsing profile, decodes CRSF telemetry from it
//! - **network**: receives datagrams, consumes heartbeats and writes data to
//!   the wire through the half-duplex link
//! - **timer**: sends heartbeats, logs connection changes and emits status
//!   reports
//!
//! Forwarding always happens before parsing, so a slow decoder or handler
//! never changes what reaches the other side.

pub mod stats;

pub use stats::{BridgeStats, FrameSource, StatsSnapshot};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::crsf::{CrsfFrame, FrameParser};
use crate::liveness::{LivenessTracker, Side};
use crate::network::{is_heartbeat, DatagramTransport, HEARTBEAT_DATAGRAM, MAX_DATAGRAM_SIZE};
use crate::serial::{HalfDuplexLink, HalfDuplexReader, ReadOutcome, SerialReader};
use crate::telemetry::{self, TelemetryKind, TelemetryHub, TelemetryRecord, TelemetrySnapshot};

/// Resolution of the timer task
const TIMER_TICK: Duration = Duration::from_millis(100);

/// Pause after a transport error before trying again
const ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// What the bridge does with the bytes it relays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeProfile {
    /// Relay bytes only (handset side)
    Opaque,
    /// Relay bytes and decode CRSF telemetry (module side)
    Parsing,
}

impl std::fmt::Display for BridgeProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeProfile::Opaque => write!(f, "opaque"),
            BridgeProfile::Parsing => write!(f, "parsing"),
        }
    }
}

/// Runtime parameters of a bridge
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub profile: BridgeProfile,
    /// XOR serial bytes with 0xFF before forwarding
    pub invert_serial: bool,
    pub heartbeat_interval: Duration,
    pub serial_timeout: Duration,
    pub network_timeout: Duration,
    pub status_interval: Duration,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl BridgeSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            profile: config.bridge.profile,
            invert_serial: config.bridge.invert_serial,
            heartbeat_interval: Duration::from_millis(config.liveness.heartbeat_interval_ms),
            serial_timeout: Duration::from_millis(config.liveness.serial_timeout_ms),
            network_timeout: Duration::from_millis(config.liveness.network_timeout_ms),
            status_interval: Duration::from_millis(config.bridge.status_interval_ms),
        }
    }
}

/// Periodic summary of the bridge state
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub profile: BridgeProfile,
    pub uptime_ms: u64,
    pub serial_connected: bool,
    pub network_connected: bool,
    /// Time since the last serial traffic, if any was seen
    pub serial_idle_ms: Option<u64>,
    pub network_idle_ms: Option<u64>,
    pub stats: StatsSnapshot,
    pub telemetry: TelemetrySnapshot,
}

/// Handler for raw frames of one type
pub type FrameHandler = Arc<dyn Fn(FrameSource, &CrsfFrame) + Send + Sync>;

/// Handler for periodic status reports
pub type StatusHandler = Arc<dyn Fn(&StatusReport) + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// State shared by the bridge tasks and the handle
struct BridgeShared {
    settings: BridgeSettings,
    started: Instant,
    stats: BridgeStats,
    liveness: Mutex<LivenessTracker>,
    telemetry: TelemetryHub,
    frame_handlers: Mutex<HashMap<u8, Vec<FrameHandler>>>,
    status_handlers: Mutex<Vec<StatusHandler>>,
}

impl BridgeShared {
    fn new(settings: BridgeSettings) -> Self {
        let liveness = LivenessTracker::new(
            settings.serial_timeout,
            settings.network_timeout,
            settings.heartbeat_interval,
        );

        Self {
            settings,
            started: Instant::now(),
            stats: BridgeStats::new(),
            liveness: Mutex::new(liveness),
            telemetry: TelemetryHub::new(),
            frame_handlers: Mutex::new(HashMap::new()),
            status_handlers: Mutex::new(Vec::new()),
        }
    }

    fn liveness(&self) -> MutexGuard<'_, LivenessTracker> {
        lock(&self.liveness)
    }

    fn mark_activity(&self, side: Side) {
        self.liveness().mark_activity(side);
    }

    fn add_frame_handler(&self, frame_type: u8, handler: FrameHandler) {
        lock(&self.frame_handlers)
            .entry(frame_type)
            .or_default()
            .push(handler);
    }

    fn add_status_handler(&self, handler: StatusHandler) {
        lock(&self.status_handlers).push(handler);
    }

    /// Count and dispatch every complete frame in `bytes`
    ///
    /// Telemetry is only extracted from frames read off the serial wire.
    fn process_frames(&self, parser: &mut FrameParser, source: FrameSource, bytes: &[u8]) {
        let outcome = parser.push(bytes);
        BridgeStats::add(&self.stats.frame_error_bytes, outcome.errors as u64);

        for frame in &outcome.frames {
            BridgeStats::incr(&self.stats.frames_parsed);
            self.stats.record_frame_type(source, frame.frame_type);
            trace!("{:?} frame: {}", source, frame);

            let handlers = lock(&self.frame_handlers)
                .get(&frame.frame_type)
                .cloned()
                .unwrap_or_default();
            for handler in &handlers {
                handler(source, frame);
            }

            if source != FrameSource::Serial {
                continue;
            }
            match telemetry::decode(frame) {
                Ok(Some(record)) => self.telemetry.publish(record),
                Ok(None) => {}
                Err(e) => {
                    BridgeStats::incr(&self.stats.decode_errors);
                    debug!("Discarding telemetry: {}", e);
                }
            }
        }
    }

    fn status(&self) -> StatusReport {
        let liveness = self.liveness();
        StatusReport {
            profile: self.settings.profile,
            uptime_ms: millis(self.started.elapsed()),
            serial_connected: liveness.is_connected(Side::Serial),
            network_connected: liveness.is_connected(Side::Network),
            serial_idle_ms: liveness.last_activity_elapsed(Side::Serial).map(millis),
            network_idle_ms: liveness.last_activity_elapsed(Side::Network).map(millis),
            stats: self.stats.snapshot(),
            telemetry: self.telemetry.snapshot(),
        }
    }
}

/// A configured bridge that has not been started yet
pub struct Bridge {
    shared: Arc<BridgeShared>,
    link: Arc<HalfDuplexLink>,
    serial: SerialReader,
    network: Arc<dyn DatagramTransport>,
}

impl Bridge {
    /// Assemble a bridge from its transports
    ///
    /// `serial` is the receive half of the same wire `link` transmits on.
    pub fn new(
        settings: BridgeSettings,
        link: HalfDuplexLink,
        serial: SerialReader,
        network: Arc<dyn DatagramTransport>,
    ) -> Self {
        Self {
            shared: Arc::new(BridgeShared::new(settings)),
            link: Arc::new(link),
            serial,
            network,
        }
    }

    /// Call `handler` with every decoded record of `kind`
    pub fn on_telemetry<F>(&self, kind: TelemetryKind, handler: F)
    where
        F: Fn(&TelemetryRecord) + Send + Sync + 'static,
    {
        self.shared.telemetry.subscribe(kind, handler);
    }

    /// Call `handler` with every frame of `frame_type` (parsing profile only)
    pub fn on_frame<F>(&self, frame_type: u8, handler: F)
    where
        F: Fn(FrameSource, &CrsfFrame) + Send + Sync + 'static,
    {
        self.shared.add_frame_handler(frame_type, Arc::new(handler));
    }

    /// Call `handler` with a status report every status interval
    pub fn on_status<F>(&self, handler: F)
    where
        F: Fn(&StatusReport) + Send + Sync + 'static,
    {
        self.shared.add_status_handler(Arc::new(handler));
    }

    /// Spawn the bridge tasks
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> BridgeHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let reader = self.link.reader(self.serial);

        info!(
            "Starting {} bridge (heartbeat every {:?})",
            self.shared.settings.profile, self.shared.settings.heartbeat_interval
        );

        let tasks = vec![
            tokio::spawn(serial_task(
                self.shared.clone(),
                reader,
                self.network.clone(),
                shutdown_rx.clone(),
            )),
            tokio::spawn(network_task(
                self.shared.clone(),
                self.link.clone(),
                self.network.clone(),
                shutdown_rx.clone(),
            )),
            tokio::spawn(timer_task(self.shared.clone(), self.network.clone(), shutdown_rx)),
        ];

        BridgeHandle {
            shared: self.shared,
            shutdown: shutdown_tx,
            tasks,
            _link: self.link,
            _network: self.network,
        }
    }
}

/// Control and query interface of a running bridge
pub struct BridgeHandle {
    shared: Arc<BridgeShared>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    _link: Arc<HalfDuplexLink>,
    _network: Arc<dyn DatagramTransport>,
}

impl BridgeHandle {
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Latest record of every telemetry variant
    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.shared.telemetry.snapshot()
    }

    pub fn latest(&self, kind: TelemetryKind) -> Option<TelemetryRecord> {
        self.shared.telemetry.latest(kind)
    }

    pub fn is_connected(&self, side: Side) -> bool {
        self.shared.liveness().is_connected(side)
    }

    pub fn status(&self) -> StatusReport {
        self.shared.status()
    }

    pub fn on_telemetry<F>(&self, kind: TelemetryKind, handler: F)
    where
        F: Fn(&TelemetryRecord) + Send + Sync + 'static,
    {
        self.shared.telemetry.subscribe(kind, handler);
    }

    pub fn on_frame<F>(&self, frame_type: u8, handler: F)
    where
        F: Fn(FrameSource, &CrsfFrame) + Send + Sync + 'static,
    {
        self.shared.add_frame_handler(frame_type, Arc::new(handler));
    }

    pub fn on_status<F>(&self, handler: F)
    where
        F: Fn(&StatusReport) + Send + Sync + 'static,
    {
        self.shared.add_status_handler(Arc::new(handler));
    }

    /// Stop all tasks and release the transports
    ///
    /// A serial write already in progress completes first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);

        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("Bridge task ended abnormally: {}", e);
            }
        }

        let stats = self.shared.stats.snapshot();
        info!(
            "Bridge stopped: {} bytes serial->network, {} bytes network->serial",
            stats.serial_rx_bytes, stats.serial_tx_bytes
        );
    }
}

/// Sleep for the error back-off, returning false if shutdown was requested
async fn back_off(shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.changed() => false,
        _ = tokio::time::sleep(ERROR_BACKOFF) => true,
    }
}

async fn serial_task(
    shared: Arc<BridgeShared>,
    mut reader: HalfDuplexReader,
    network: Arc<dyn DatagramTransport>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut parser = FrameParser::new();
    let stats = &shared.stats;

    loop {
        let outcome = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            outcome = reader.read() => outcome,
        };

        match outcome {
            Ok(ReadOutcome::Data(mut chunk)) => {
                let n = chunk.len();
                if shared.settings.invert_serial {
                    chunk.iter_mut().for_each(|byte| *byte ^= 0xFF);
                }

                BridgeStats::add(&stats.serial_rx_bytes, n as u64);
                BridgeStats::incr(&stats.serial_rx_chunks);
                shared.mark_activity(Side::Serial);
                trace!("Serial -> network: {:02X?}", &chunk[..]);

                match network.send(&chunk).await {
                    Ok(sent) => {
                        BridgeStats::add(&stats.network_tx_bytes, sent as u64);
                        BridgeStats::incr(&stats.network_tx_datagrams);
                    }
                    Err(e) => {
                        BridgeStats::incr(&stats.network_errors);
                        warn!("Failed to forward {} serial bytes: {}", n, e);
                    }
                }

                if shared.settings.profile == BridgeProfile::Parsing {
                    shared.process_frames(&mut parser, FrameSource::Serial, &chunk);
                }
            }
            Ok(ReadOutcome::Lost(n)) => {
                BridgeStats::add(&stats.serial_bytes_lost, n as u64);
            }
            Ok(ReadOutcome::Closed) => {
                warn!("Serial port closed, serial reader stopping");
                break;
            }
            Err(e) => {
                BridgeStats::incr(&stats.serial_errors);
                warn!("Serial read failed: {}", e);
            }
        }
    }

    debug!("Serial task stopped");
}

async fn network_task(
    shared: Arc<BridgeShared>,
    link: Arc<HalfDuplexLink>,
    network: Arc<dyn DatagramTransport>,
    mut shutdown: watch::Receiver<bool>,
) {
    // One spare byte to tell an oversized datagram from a full one
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE + 1];
    let mut parser = FrameParser::new();
    let stats = &shared.stats;

    loop {
        let received = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            received = network.recv(&mut buf) => received,
        };

        let (n, from) = match received {
            Ok(received) => received,
            Err(e) => {
                BridgeStats::incr(&stats.network_errors);
                warn!("Network receive failed: {}", e);
                if !back_off(&mut shutdown).await {
                    break;
                }
                continue;
            }
        };

        shared.mark_activity(Side::Network);
        BridgeStats::add(&stats.network_rx_bytes, n as u64);
        BridgeStats::incr(&stats.network_rx_datagrams);

        let datagram = &buf[..n];
        if is_heartbeat(datagram) {
            BridgeStats::incr(&stats.heartbeats_received);
            trace!("Heartbeat from {}", from);
            continue;
        }
        if datagram.is_empty() {
            continue;
        }
        if n > MAX_DATAGRAM_SIZE {
            BridgeStats::incr(&stats.oversize_datagrams);
            warn!(
                "Dropping datagram from {}: larger than {} bytes",
                from, MAX_DATAGRAM_SIZE
            );
            continue;
        }

        trace!("Network -> serial: {:02X?}", datagram);
        // Outside the select so shutdown never cuts a frame short
        match link.write(datagram).await {
            Ok(()) => {
                BridgeStats::add(&stats.serial_tx_bytes, n as u64);
                BridgeStats::incr(&stats.serial_tx_writes);
            }
            Err(e) => {
                BridgeStats::incr(&stats.serial_errors);
                warn!("Failed to write {} bytes to serial: {}", n, e);
            }
        }

        if shared.settings.profile == BridgeProfile::Parsing {
            shared.process_frames(&mut parser, FrameSource::Network, datagram);
        }
    }

    debug!("Network task stopped");
}

async fn timer_task(
    shared: Arc<BridgeShared>,
    network: Arc<dyn DatagramTransport>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(TIMER_TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut serial_up = false;
    let mut network_up = false;
    let mut last_status = Instant::now();

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }

        let heartbeat_due = shared.liveness().due_for_heartbeat();
        if heartbeat_due {
            match network.send(HEARTBEAT_DATAGRAM).await {
                Ok(_) => BridgeStats::incr(&shared.stats.heartbeats_sent),
                Err(e) => {
                    BridgeStats::incr(&shared.stats.network_errors);
                    warn!("Failed to send heartbeat: {}", e);
                }
            }
        }

        let (serial_now, network_now) = {
            let liveness = shared.liveness();
            (
                liveness.is_connected(Side::Serial),
                liveness.is_connected(Side::Network),
            )
        };
        log_transition(Side::Serial, &mut serial_up, serial_now);
        log_transition(Side::Network, &mut network_up, network_now);

        if last_status.elapsed() >= shared.settings.status_interval {
            last_status = Instant::now();
            let report = shared.status();
            let handlers = lock(&shared.status_handlers).clone();
            for handler in &handlers {
                handler(&report);
            }
        }
    }

    debug!("Timer task stopped");
}

fn log_transition(side: Side, was_up: &mut bool, is_up: bool) {
    if *was_up == is_up {
        return;
    }
    if is_up {
        info!("{} link up", side);
    } else {
        warn!("{} link lost", side);
    }
    *was_up = is_up;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crsf::encode_frame;
    use crate::crsf::protocol::{
        CRSF_FRAMETYPE_BATTERY_SENSOR, CRSF_FRAMETYPE_RC_CHANNELS_PACKED,
    };
    use crate::network::mocks::{MockNetwork, MockPeer};
    use crate::serial::port_trait::mocks::MockSerialPort;
    use crate::serial::{LinkTiming, NoDirectionControl};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncWriteExt, DuplexStream};

    struct Harness {
        handle: BridgeHandle,
        device: DuplexStream,
        port: MockSerialPort,
        network: Arc<MockNetwork>,
        peer: MockPeer,
    }

    fn test_settings(profile: BridgeProfile) -> BridgeSettings {
        BridgeSettings {
            profile,
            invert_serial: false,
            heartbeat_interval: Duration::from_secs(1),
            serial_timeout: Duration::from_secs(2),
            network_timeout: Duration::from_secs(5),
            status_interval: Duration::from_secs(1),
        }
    }

    type Parts = (Bridge, DuplexStream, MockSerialPort, Arc<MockNetwork>, MockPeer);

    fn build_bridge(settings: BridgeSettings) -> Parts {
        build_bridge_with_port(settings, MockSerialPort::new())
    }

    fn build_bridge_with_port(settings: BridgeSettings, port: MockSerialPort) -> Parts {
        let link = HalfDuplexLink::new(
            Box::new(port.clone()),
            Box::new(NoDirectionControl),
            LinkTiming::default(),
        )
        .unwrap();
        let (device, host) = tokio::io::duplex(256);
        let (network, peer) = MockNetwork::new();
        let network = Arc::new(network);

        let bridge = Bridge::new(settings, link, Box::new(host), network.clone());
        (bridge, device, port, network, peer)
    }

    fn start(settings: BridgeSettings) -> Harness {
        let (bridge, device, port, network, peer) = build_bridge(settings);
        Harness {
            handle: bridge.start(),
            device,
            port,
            network,
            peer,
        }
    }

    /// Data datagrams sent to the peer, heartbeats excluded
    fn forwarded(network: &MockNetwork) -> Vec<Vec<u8>> {
        network
            .sent()
            .into_iter()
            .filter(|datagram| !is_heartbeat(datagram))
            .collect()
    }

    async fn wait_until<F: Fn() -> bool>(condition: F) {
        for _ in 0..1000 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("Condition not met in time");
    }

    fn battery_frame() -> Vec<u8> {
        // 12.6 V, 5.0 A, 1000 mAh, 80 %
        let payload = vec![0x00, 0x7E, 0x00, 0x32, 0x00, 0x03, 0xE8, 0x50];
        encode_frame(&CrsfFrame::new(CRSF_FRAMETYPE_BATTERY_SENSOR, payload).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_opaque_forwards_serial_bytes_unmodified() {
        let mut h = start(test_settings(BridgeProfile::Opaque));

        h.device.write_all(&[0xAB, 0xCD, 0xEF]).await.unwrap();
        let network = h.network.clone();
        wait_until(|| !forwarded(&network).is_empty()).await;

        assert_eq!(forwarded(&h.network), vec![vec![0xAB, 0xCD, 0xEF]]);
        let stats = h.handle.stats();
        assert_eq!(stats.serial_rx_bytes, 3);
        assert_eq!(stats.network_tx_datagrams, 1);
        assert_eq!(stats.frames_parsed, 0);
        assert!(h.handle.is_connected(Side::Serial));

        h.handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_opaque_profile_does_not_decode() {
        let mut h = start(test_settings(BridgeProfile::Opaque));

        h.device.write_all(&battery_frame()).await.unwrap();
        let network = h.network.clone();
        wait_until(|| !forwarded(&network).is_empty()).await;

        assert!(h.handle.telemetry().is_empty());
        h.handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_invert_serial() {
        let mut settings = test_settings(BridgeProfile::Opaque);
        settings.invert_serial = true;
        let mut h = start(settings);

        h.device.write_all(&[0x00, 0xFF, 0x37]).await.unwrap();
        let network = h.network.clone();
        wait_until(|| !forwarded(&network).is_empty()).await;

        assert_eq!(forwarded(&h.network), vec![vec![0xFF, 0x00, 0xC8]]);
        h.handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_parsing_decodes_battery() {
        let (bridge, mut device, _port, network, _peer) =
            build_bridge(test_settings(BridgeProfile::Parsing));

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        bridge.on_telemetry(TelemetryKind::Battery, move |record| {
            assert!(matches!(record, TelemetryRecord::Battery(_)));
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let handle = bridge.start();

        let frame = battery_frame();
        device.write_all(&frame).await.unwrap();
        wait_until(|| handle.latest(TelemetryKind::Battery).is_some()).await;

        // Raw bytes still forwarded unchanged
        assert_eq!(forwarded(&network), vec![frame]);

        let battery = handle.telemetry().battery.unwrap();
        assert!((battery.voltage - 12.6).abs() < 0.001);
        assert!((battery.current - 5.0).abs() < 0.001);
        assert_eq!(battery.capacity_used, 1000);
        assert_eq!(battery.remaining_percent, 80);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = handle.stats();
        assert_eq!(stats.frames_parsed, 1);
        assert_eq!(stats.serial_frame_types.get(&CRSF_FRAMETYPE_BATTERY_SENSOR), Some(&1));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_split_across_reads() {
        let mut h = start(test_settings(BridgeProfile::Parsing));

        let frame = battery_frame();
        h.device.write_all(&frame[..4]).await.unwrap();
        let network = h.network.clone();
        wait_until(|| forwarded(&network).len() == 1).await;
        assert!(h.handle.latest(TelemetryKind::Battery).is_none());

        h.device.write_all(&frame[4..]).await.unwrap();
        wait_until(|| h.handle.latest(TelemetryKind::Battery).is_some()).await;
        assert_eq!(forwarded(&h.network).concat(), frame);

        h.handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_telemetry_is_counted() {
        let mut h = start(test_settings(BridgeProfile::Parsing));

        let short = encode_frame(
            &CrsfFrame::new(CRSF_FRAMETYPE_BATTERY_SENSOR, vec![0x00, 0x7E, 0x00]).unwrap(),
        );
        h.device.write_all(&short).await.unwrap();
        wait_until(|| h.handle.stats().decode_errors == 1).await;

        assert_eq!(h.handle.stats().frames_parsed, 1);
        assert!(h.handle.latest(TelemetryKind::Battery).is_none());
        assert_eq!(forwarded(&h.network), vec![short]);

        h.handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_datagram_written_to_serial() {
        let h = start(test_settings(BridgeProfile::Opaque));

        h.peer.deliver(&[0x01, 0x02, 0x03]);
        let port = h.port.clone();
        wait_until(|| !port.get_written_data().is_empty()).await;

        assert_eq!(h.port.get_written_data(), vec![vec![0x01, 0x02, 0x03]]);
        let stats = h.handle.stats();
        assert_eq!(stats.serial_tx_bytes, 3);
        assert_eq!(stats.serial_tx_writes, 1);
        assert!(h.handle.is_connected(Side::Network));

        h.handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_frames_counted_in_parsing_profile() {
        let (bridge, _device, port, _network, peer) =
            build_bridge(test_settings(BridgeProfile::Parsing));

        let sources = Arc::new(Mutex::new(Vec::new()));
        let seen = sources.clone();
        bridge.on_frame(CRSF_FRAMETYPE_RC_CHANNELS_PACKED, move |source, frame| {
            assert_eq!(frame.payload.len(), 22);
            seen.lock().unwrap().push(source);
        });
        let handle = bridge.start();

        let rc = encode_frame(
            &CrsfFrame::new(CRSF_FRAMETYPE_RC_CHANNELS_PACKED, vec![0u8; 22]).unwrap(),
        );
        peer.deliver(&rc);
        wait_until(|| handle.stats().frames_parsed == 1).await;

        assert_eq!(port.get_written_data(), vec![rc]);
        assert_eq!(*sources.lock().unwrap(), vec![FrameSource::Network]);
        let stats = handle.stats();
        assert_eq!(
            stats.network_frame_types.get(&CRSF_FRAMETYPE_RC_CHANNELS_PACKED),
            Some(&1)
        );
        // RC channels from the handset are not telemetry
        assert!(handle.telemetry().is_empty());

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_network_send_keeps_window_bytes_lost() {
        let mut port = MockSerialPort::new();
        port.drain_time = Duration::from_millis(10);
        let (bridge, mut device, port, network, peer) =
            build_bridge_with_port(test_settings(BridgeProfile::Opaque), port);
        network.hold_sends();
        let handle = bridge.start();

        // Serial task blocks forwarding the first chunk
        device.write_all(b"first").await.unwrap();
        wait_until(|| handle.stats().serial_rx_chunks == 1).await;

        // A network write opens a transmit window and the wire echoes it
        peer.deliver(b"rc-frame");
        let written = port.clone();
        wait_until(|| !written.get_written_data().is_empty()).await;
        device.write_all(b"echo").await.unwrap();
        wait_until(|| handle.stats().serial_tx_writes == 1).await;

        tokio::time::sleep(Duration::from_millis(2)).await;
        device.write_all(b"reply").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        network.release_sends();

        let sent = network.clone();
        wait_until(|| forwarded(&sent).len() == 2).await;
        assert_eq!(forwarded(&network), vec![b"first".to_vec(), b"reply".to_vec()]);
        assert_eq!(handle.stats().serial_bytes_lost, 4);
        assert_eq!(port.get_written_data(), vec![b"rc-frame".to_vec()]);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversize_datagram_dropped() {
        let h = start(test_settings(BridgeProfile::Opaque));

        h.peer.deliver(&[0x55; MAX_DATAGRAM_SIZE + 100]);
        h.peer.deliver(&[0x01, 0x02]);
        let port = h.port.clone();
        wait_until(|| !port.get_written_data().is_empty()).await;

        assert_eq!(h.port.get_written_data(), vec![vec![0x01, 0x02]]);
        let stats = h.handle.stats();
        assert_eq!(stats.oversize_datagrams, 1);
        assert_eq!(stats.network_rx_datagrams, 2);

        h.handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_size_datagram_written() {
        let h = start(test_settings(BridgeProfile::Opaque));

        h.peer.deliver(&[0x55; MAX_DATAGRAM_SIZE]);
        let port = h.port.clone();
        wait_until(|| !port.get_written_data().is_empty()).await;

        assert_eq!(h.port.get_written_data()[0].len(), MAX_DATAGRAM_SIZE);
        assert_eq!(h.handle.stats().oversize_datagrams, 0);

        h.handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_not_forwarded_to_serial() {
        let h = start(test_settings(BridgeProfile::Parsing));
        assert!(!h.handle.is_connected(Side::Network));

        h.peer.deliver(HEARTBEAT_DATAGRAM);
        wait_until(|| h.handle.stats().heartbeats_received == 1).await;

        assert!(h.port.get_written_data().is_empty());
        assert!(h.handle.is_connected(Side::Network));
        assert_eq!(h.handle.stats().frames_parsed, 0);

        h.handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeats_sent_each_interval() {
        let h = start(test_settings(BridgeProfile::Opaque));

        tokio::time::sleep(Duration::from_millis(3500)).await;

        let heartbeats = h
            .network
            .sent()
            .iter()
            .filter(|datagram| is_heartbeat(datagram))
            .count();
        assert!(heartbeats >= 3, "Expected at least 3 heartbeats, got {}", heartbeats);
        assert_eq!(h.handle.stats().heartbeats_sent, heartbeats as u64);

        h.handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_disconnects_after_timeout() {
        let h = start(test_settings(BridgeProfile::Opaque));

        h.peer.deliver(HEARTBEAT_DATAGRAM);
        wait_until(|| h.handle.is_connected(Side::Network)).await;

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(!h.handle.is_connected(Side::Network));

        h.handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reports_emitted() {
        let (bridge, _device, _port, _network, _peer) =
            build_bridge(test_settings(BridgeProfile::Parsing));

        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = reports.clone();
        bridge.on_status(move |report| sink.lock().unwrap().push(report.clone()));
        let handle = bridge.start();

        tokio::time::sleep(Duration::from_millis(2500)).await;

        let reports = reports.lock().unwrap().clone();
        assert!(reports.len() >= 2);
        let report = &reports[0];
        assert_eq!(report.profile, BridgeProfile::Parsing);
        assert!(!report.serial_connected);
        assert_eq!(report.serial_idle_ms, None);

        let json = serde_json::to_value(report).unwrap();
        assert_eq!(json["profile"], "parsing");
        assert!(json["stats"]["heartbeats_sent"].as_u64().unwrap() >= 1);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_all_tasks() {
        let h = start(test_settings(BridgeProfile::Opaque));
        tokio::time::sleep(Duration::from_millis(10)).await;

        h.handle.shutdown().await;

        let sent = h.network.sent().len();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(h.network.sent().len(), sent);
        // Only the test still holds the transport
        assert_eq!(Arc::strong_count(&h.network), 1);
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = Config::default();
        config.bridge.profile = BridgeProfile::Opaque;
        config.bridge.invert_serial = true;
        config.liveness.heartbeat_interval_ms = 250;

        let settings = BridgeSettings::from_config(&config);
        assert_eq!(settings.profile, BridgeProfile::Opaque);
        assert!(settings.invert_serial);
        assert_eq!(settings.heartbeat_interval, Duration::from_millis(250));
        assert_eq!(settings.network_timeout, Duration::from_millis(15000));
        assert_eq!(settings.status_interval, Duration::from_millis(30000));
    }

    #[test]
    fn test_profile_display() {
        assert_eq!(BridgeProfile::Opaque.to_string(), "opaque");
        assert_eq!(BridgeProfile::Parsing.to_string(), "parsing");
    }
}
