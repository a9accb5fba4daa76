//! # CRSF Packet Decoder
//!
//! Extracts validated CRSF frames from an arbitrary byte stream.
//!
//! The serial link carries no out-of-band framing, so [`parse`] scans for a
//! sync byte, checks the length byte and the CRC, and skips one byte at a time
//! whenever a candidate frame turns out to be invalid. A partial frame at the
//! end of the buffer is left for the next call.

use bytes::{Buf, BytesMut};
use tracing::trace;

use super::crc::crc8_dvb_s2;
use super::protocol::*;
use crate::error::{BridgeError, Result};

/// Result of scanning a buffer for frames
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseOutcome {
    /// Valid frames in stream order
    pub frames: Vec<CrsfFrame>,

    /// Number of leading bytes the caller may drop
    pub consumed: usize,

    /// Number of bytes skipped while resynchronizing
    pub errors: usize,
}

/// Scan `buffer` for complete, CRC-valid frames
///
/// Never fails: bytes that cannot start a valid frame are counted in
/// [`ParseOutcome::errors`] and skipped. Bytes from `consumed` onwards form
/// an incomplete frame and must be presented again with more data.
///
/// # Examples
///
/// ```
/// use crsf_bridge::crsf::decoder::parse;
/// use crsf_bridge::crsf::encoder::encode_frame;
/// use crsf_bridge::crsf::protocol::{CrsfFrame, CRSF_FRAMETYPE_ATTITUDE};
///
/// let frame = CrsfFrame::new(CRSF_FRAMETYPE_ATTITUDE, vec![0u8; 6])?;
/// let mut stream = vec![0x00, 0x11];
/// stream.extend(encode_frame(&frame));
///
/// let outcome = parse(&stream);
/// assert_eq!(outcome.frames, vec![frame]);
/// assert_eq!(outcome.errors, 2);
/// assert_eq!(outcome.consumed, stream.len());
/// # Ok::<(), crsf_bridge::error::BridgeError>(())
/// ```
pub fn parse(buffer: &[u8]) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();
    let mut pos = 0;

    while pos < buffer.len() {
        if !is_sync_byte(buffer[pos]) {
            pos += 1;
            outcome.errors += 1;
            continue;
        }

        // Length byte not received yet
        let Some(&length) = buffer.get(pos + 1) else {
            break;
        };

        if !(CRSF_MIN_LENGTH_BYTE..=CRSF_MAX_LENGTH_BYTE).contains(&length) {
            trace!("Skipping sync byte with invalid length {}", length);
            pos += 1;
            outcome.errors += 1;
            continue;
        }

        let total = 2 + length as usize;
        if pos + total > buffer.len() {
            break;
        }

        let candidate = &buffer[pos..pos + total];
        match decode_frame(candidate) {
            Ok(frame) => {
                outcome.frames.push(frame);
                pos += total;
            }
            Err(e) => {
                trace!("Resynchronizing: {}", e);
                pos += 1;
                outcome.errors += 1;
            }
        }
    }

    outcome.consumed = pos;
    outcome
}

/// Decode a complete CRSF frame
///
/// # Arguments
///
/// * `frame` - Complete CRSF frame bytes (including sync, length, type, payload, crc)
///
/// # Errors
///
/// Returns error if:
/// - Frame is too short or its size disagrees with the length byte
/// - Sync byte is incorrect
/// - Length byte is out of range
/// - CRC check fails
pub fn decode_frame(frame: &[u8]) -> Result<CrsfFrame> {
    // Minimum frame size: sync(1) + length(1) + type(1) + crc(1) = 4 bytes
    if frame.len() < 4 {
        return Err(BridgeError::CrsfProtocol("Frame too short".to_string()));
    }

    if !is_sync_byte(frame[0]) {
        return Err(BridgeError::CrsfProtocol(format!(
            "Invalid sync byte: 0x{:02X}",
            frame[0]
        )));
    }

    let length = frame[1];
    if !(CRSF_MIN_LENGTH_BYTE..=CRSF_MAX_LENGTH_BYTE).contains(&length) {
        return Err(BridgeError::CrsfProtocol(format!(
            "Invalid length byte: {}",
            length
        )));
    }

    let total = 2 + length as usize;
    if frame.len() != total {
        return Err(BridgeError::CrsfProtocol(format!(
            "Frame size mismatch: expected {} bytes, got {}",
            total,
            frame.len()
        )));
    }

    let received_crc = frame[total - 1];
    let calculated_crc = crc8_dvb_s2(&frame[2..total - 1]);
    if calculated_crc != received_crc {
        return Err(BridgeError::CrsfProtocol(format!(
            "CRC mismatch: expected 0x{:02X}, got 0x{:02X}",
            calculated_crc, received_crc
        )));
    }

    CrsfFrame::with_sync(frame[0], frame[2], frame[3..total - 1].to_vec())
}

/// Resumable frame parser
///
/// Keeps the unconsumed tail of previous chunks so frames split across
/// serial reads or datagrams are still recovered.
#[derive(Debug, Default)]
pub struct FrameParser {
    buffer: BytesMut,
}

impl FrameParser {
    /// Create an empty parser
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(CRSF_MAX_FRAME_SIZE * 4),
        }
    }

    /// Append `data` and return every frame that is now complete
    ///
    /// The returned `consumed` counts bytes dropped from the internal buffer
    /// during this call, including bytes carried over from earlier calls.
    pub fn push(&mut self, data: &[u8]) -> ParseOutcome {
        self.buffer.extend_from_slice(data);
        let outcome = parse(&self.buffer);
        self.buffer.advance(outcome.consumed);
        outcome
    }

    /// Bytes waiting for the rest of their frame
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial frame
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}
