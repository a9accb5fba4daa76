//! # CRSF Protocol Constants and Types
//!
//! Core protocol definitions for CRSF (Crossfire) communication.

use crate::error::{BridgeError, Result};

/// CRSF frame sync byte (flight controller address, used as generic sync)
pub const CRSF_SYNC_BYTE: u8 = 0xC8;

/// Radio transmitter (handset) address
pub const CRSF_ADDRESS_RADIO: u8 = 0xEA;

/// Receiver address
pub const CRSF_ADDRESS_RECEIVER: u8 = 0xEC;

/// Transmitter module address
pub const CRSF_ADDRESS_TX_MODULE: u8 = 0xEE;

/// Bytes accepted as the first byte of a frame.
///
/// Handsets and modules start frames with the destination address instead of
/// the generic sync byte.
pub const CRSF_SYNC_BYTES: [u8; 4] = [
    CRSF_SYNC_BYTE,
    CRSF_ADDRESS_RADIO,
    CRSF_ADDRESS_RECEIVER,
    CRSF_ADDRESS_TX_MODULE,
];

/// GPS packet type
pub const CRSF_FRAMETYPE_GPS: u8 = 0x02;

/// Battery sensor packet type
pub const CRSF_FRAMETYPE_BATTERY_SENSOR: u8 = 0x08;

/// Heartbeat packet type
pub const CRSF_FRAMETYPE_HEARTBEAT: u8 = 0x0B;

/// Link Statistics packet type
pub const CRSF_FRAMETYPE_LINK_STATISTICS: u8 = 0x14;

/// RC Channels packet type
pub const CRSF_FRAMETYPE_RC_CHANNELS_PACKED: u8 = 0x16;

/// Attitude packet type
pub const CRSF_FRAMETYPE_ATTITUDE: u8 = 0x1E;

/// Flight mode packet type
pub const CRSF_FRAMETYPE_FLIGHT_MODE: u8 = 0x21;

/// Device ping packet type (first extended type)
pub const CRSF_FRAMETYPE_DEVICE_PING: u8 = 0x28;

/// Device info packet type
pub const CRSF_FRAMETYPE_DEVICE_INFO: u8 = 0x29;

/// Frame types at or above this value carry destination and origin addresses
pub const CRSF_FRAMETYPE_EXTENDED_START: u8 = CRSF_FRAMETYPE_DEVICE_PING;

/// Maximum full frame size: sync(1) + length(1) + type(1) + payload(N) + crc(1)
pub const CRSF_MAX_FRAME_SIZE: usize = 64;

/// Maximum CRSF payload size (64 - 4 = 60 bytes)
pub const CRSF_MAX_PAYLOAD_SIZE: usize = 60;

/// Smallest valid length byte (type + crc, empty payload)
pub const CRSF_MIN_LENGTH_BYTE: u8 = 2;

/// Largest valid length byte (type + 60 bytes payload + crc)
pub const CRSF_MAX_LENGTH_BYTE: u8 = (CRSF_MAX_FRAME_SIZE - 2) as u8;

/// RC channels payload size (22 bytes for 16 channels × 11 bits)
pub const CRSF_RC_CHANNELS_PAYLOAD_SIZE: usize = 22;

/// Number of RC channels
pub const CRSF_NUM_CHANNELS: usize = 16;

/// Channel value range (11-bit: 0-2047)
pub const CRSF_CHANNEL_VALUE_MIN: u16 = 0;
pub const CRSF_CHANNEL_VALUE_MAX: u16 = 2047;
pub const CRSF_CHANNEL_VALUE_CENTER: u16 = 992;

/// Link Statistics payload size
pub const CRSF_LINK_STATS_PAYLOAD_SIZE: usize = 10;

/// Battery Sensor payload size
pub const CRSF_BATTERY_SENSOR_PAYLOAD_SIZE: usize = 8;

/// Attitude payload size
pub const CRSF_ATTITUDE_PAYLOAD_SIZE: usize = 6;

/// GPS payload size
pub const CRSF_GPS_PAYLOAD_SIZE: usize = 15;

/// RC channels array type (16 channels, 11-bit values)
pub type RcChannels = [u16; CRSF_NUM_CHANNELS];

/// Returns true if `byte` may start a CRSF frame
pub fn is_sync_byte(byte: u8) -> bool {
    CRSF_SYNC_BYTES.contains(&byte)
}

/// CRSF frame structure
///
/// The wire length byte is derived from the payload and never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrsfFrame {
    /// Leading sync/address byte
    pub sync: u8,

    /// Frame type
    pub frame_type: u8,

    /// Payload data
    pub payload: Vec<u8>,
}

impl CrsfFrame {
    /// Create a new CRSF frame starting with the generic sync byte
    ///
    /// # Arguments
    ///
    /// * `frame_type` - Frame type byte
    /// * `payload` - Payload data (max 60 bytes)
    ///
    /// # Errors
    ///
    /// Returns error if payload exceeds CRSF_MAX_PAYLOAD_SIZE (60 bytes)
    pub fn new(frame_type: u8, payload: Vec<u8>) -> Result<Self> {
        Self::with_sync(CRSF_SYNC_BYTE, frame_type, payload)
    }

    /// Create a new CRSF frame with an explicit sync/address byte
    ///
    /// # Errors
    ///
    /// Returns error if the sync byte is not one of [`CRSF_SYNC_BYTES`] or the
    /// payload exceeds CRSF_MAX_PAYLOAD_SIZE
    pub fn with_sync(sync: u8, frame_type: u8, payload: Vec<u8>) -> Result<Self> {
        if !is_sync_byte(sync) {
            return Err(BridgeError::CrsfProtocol(format!(
                "Invalid sync byte: 0x{:02X}",
                sync
            )));
        }

        if payload.len() > CRSF_MAX_PAYLOAD_SIZE {
            return Err(BridgeError::CrsfProtocol(format!(
                "Payload size {} exceeds maximum {}",
                payload.len(),
                CRSF_MAX_PAYLOAD_SIZE
            )));
        }

        Ok(Self {
            sync,
            frame_type,
            payload,
        })
    }

    /// Get frame length (type + payload + crc)
    ///
    /// Cannot overflow since payload is validated to be ≤ 60 bytes
    pub fn length(&self) -> u8 {
        (1 + self.payload.len() + 1) as u8
    }

    /// Size of the frame on the wire, including sync and length bytes
    pub fn wire_len(&self) -> usize {
        2 + self.length() as usize
    }

    /// Whether this frame carries destination/origin addresses
    pub fn is_extended(&self) -> bool {
        self.frame_type >= CRSF_FRAMETYPE_EXTENDED_START
    }

    /// Destination address of an extended frame
    pub fn destination(&self) -> Option<u8> {
        if self.is_extended() {
            self.payload.first().copied()
        } else {
            None
        }
    }

    /// Origin address of an extended frame
    pub fn origin(&self) -> Option<u8> {
        if self.is_extended() {
            self.payload.get(1).copied()
        } else {
            None
        }
    }
}

impl std::fmt::Display for CrsfFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CRSF[0x{:02X}", self.frame_type)?;
        if let (Some(dest), Some(origin)) = (self.destination(), self.origin()) {
            write!(f, " 0x{:02X}->0x{:02X}", origin, dest)?;
        }
        write!(f, "] len={} payload={}b", self.length(), self.payload.len())
    }
}
