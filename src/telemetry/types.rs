//! Decoded telemetry records.

use serde::Serialize;

use crate::crsf::protocol::{RcChannels, CRSF_NUM_CHANNELS};

/// TX power in mW for each RF power index reported in link statistics
const TX_POWER_MW: [u16; 9] = [0, 10, 25, 100, 500, 1000, 2000, 250, 50];

/// Link statistics telemetry data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkStatistics {
    /// Uplink RSSI (antenna 1) in dBm
    pub uplink_rssi_ant1: i16,

    /// Uplink RSSI (antenna 2) in dBm (diversity)
    pub uplink_rssi_ant2: i16,

    /// Uplink link quality (0-100%)
    pub uplink_link_quality: u8,

    /// Uplink SNR in dB
    pub uplink_snr: i8,

    /// Active antenna (0 or 1)
    pub active_antenna: u8,

    /// RF mode / packet rate
    pub rf_mode: u8,

    /// Uplink TX power index
    pub uplink_tx_power: u8,

    /// Downlink RSSI in dBm
    pub downlink_rssi: i16,

    /// Downlink link quality (0-100%)
    pub downlink_link_quality: u8,

    /// Downlink SNR in dB
    pub downlink_snr: i8,
}

impl LinkStatistics {
    /// Uplink TX power in mW, if the index is known
    pub fn uplink_tx_power_mw(&self) -> Option<u16> {
        TX_POWER_MW.get(self.uplink_tx_power as usize).copied()
    }
}

/// Battery sensor telemetry data
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BatterySensor {
    /// Battery voltage in volts
    pub voltage: f32,

    /// Current draw in amperes
    pub current: f32,

    /// Capacity used in mAh
    pub capacity_used: u32,

    /// Battery remaining percentage (0-100%)
    pub remaining_percent: u8,
}

/// Attitude telemetry data, angles in radians
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Attitude {
    pub pitch: f32,
    pub roll: f32,
    pub yaw: f32,
}

/// Flight mode reported by the flight controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlightMode {
    pub name: String,
}

/// GPS telemetry data
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GpsData {
    /// Latitude in degrees
    pub latitude: f64,

    /// Longitude in degrees
    pub longitude: f64,

    /// Ground speed in km/h
    pub ground_speed: f32,

    /// Heading in degrees
    pub heading: f32,

    /// Altitude in meters
    pub altitude: i32,

    /// Number of satellites
    pub satellites: u8,
}

/// Unpacked RC channel values in CRSF ticks (0-2047)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RcChannelsData {
    pub channels: RcChannels,
}

impl RcChannelsData {
    /// Channel values converted to PWM microseconds
    pub fn to_microseconds(&self) -> [i32; CRSF_NUM_CHANNELS] {
        self.channels.map(ticks_to_us)
    }
}

/// Convert CRSF channel ticks to PWM microseconds (992 → 1500µs)
pub fn ticks_to_us(ticks: u16) -> i32 {
    (ticks as i32 - 992) * 5 / 8 + 1500
}

/// Telemetry record variants
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetryRecord {
    LinkStatistics(LinkStatistics),
    Battery(BatterySensor),
    Attitude(Attitude),
    FlightMode(FlightMode),
    Gps(GpsData),
    RcChannels(RcChannelsData),
}

/// Discriminant of [`TelemetryRecord`], used to register callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryKind {
    LinkStatistics,
    Battery,
    Attitude,
    FlightMode,
    Gps,
    RcChannels,
}

impl TelemetryRecord {
    /// Variant of this record
    pub fn kind(&self) -> TelemetryKind {
        match self {
            TelemetryRecord::LinkStatistics(_) => TelemetryKind::LinkStatistics,
            TelemetryRecord::Battery(_) => TelemetryKind::Battery,
            TelemetryRecord::Attitude(_) => TelemetryKind::Attitude,
            TelemetryRecord::FlightMode(_) => TelemetryKind::FlightMode,
            TelemetryRecord::Gps(_) => TelemetryKind::Gps,
            TelemetryRecord::RcChannels(_) => TelemetryKind::RcChannels,
        }
    }
}

/// Latest record of every variant
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub link_statistics: Option<LinkStatistics>,
    pub battery: Option<BatterySensor>,
    pub attitude: Option<Attitude>,
    pub flight_mode: Option<FlightMode>,
    pub gps: Option<GpsData>,
    pub rc_channels: Option<RcChannelsData>,
}

impl TelemetrySnapshot {
    /// Overwrite the slot for the record's variant
    pub fn update(&mut self, record: TelemetryRecord) {
        match record {
            TelemetryRecord::LinkStatistics(r) => self.link_statistics = Some(r),
            TelemetryRecord::Battery(r) => self.battery = Some(r),
            TelemetryRecord::Attitude(r) => self.attitude = Some(r),
            TelemetryRecord::FlightMode(r) => self.flight_mode = Some(r),
            TelemetryRecord::Gps(r) => self.gps = Some(r),
            TelemetryRecord::RcChannels(r) => self.rc_channels = Some(r),
        }
    }

    /// Latest record of the given variant
    pub fn get(&self, kind: TelemetryKind) -> Option<TelemetryRecord> {
        match kind {
            TelemetryKind::LinkStatistics => {
                self.link_statistics.map(TelemetryRecord::LinkStatistics)
            }
            TelemetryKind::Battery => self.battery.map(TelemetryRecord::Battery),
            TelemetryKind::Attitude => self.attitude.map(TelemetryRecord::Attitude),
            TelemetryKind::FlightMode => self.flight_mode.clone().map(TelemetryRecord::FlightMode),
            TelemetryKind::Gps => self.gps.map(TelemetryRecord::Gps),
            TelemetryKind::RcChannels => self.rc_channels.map(TelemetryRecord::RcChannels),
        }
    }

    /// True when no telemetry has been decoded yet
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
