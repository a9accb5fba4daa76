//! # CRSF Packet Encoder
//!
//! Serializes frames into CRSF wire bytes.

use super::crc::crc8_dvb_s2;
use super::protocol::*;

/// Encode a frame into its complete wire representation
///
/// Writes sync, length, type, payload and a freshly computed CRC over
/// type + payload.
///
/// # Examples
///
/// ```
/// use crsf_bridge::crsf::encoder::encode_frame;
/// use crsf_bridge::crsf::protocol::{CrsfFrame, CRSF_FRAMETYPE_BATTERY_SENSOR};
///
/// let frame = CrsfFrame::new(CRSF_FRAMETYPE_BATTERY_SENSOR, vec![0u8; 8])?;
/// let bytes = encode_frame(&frame);
/// assert_eq!(bytes.len(), 12);
/// # Ok::<(), crsf_bridge::error::BridgeError>(())
/// ```
pub fn encode_frame(frame: &CrsfFrame) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(frame.wire_len());
    bytes.push(frame.sync);
    bytes.push(frame.length());
    bytes.push(frame.frame_type);
    bytes.extend_from_slice(&frame.payload);

    // CRC covers type + payload
    let crc = crc8_dvb_s2(&bytes[2..]);
    bytes.push(crc);

    bytes
}
