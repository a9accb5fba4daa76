//! Liveness datagram exchanged between the two bridges.
//!
//! Not part of CRSF. The marker starts with `0x43` ('C'), which is not a CRSF
//! sync byte, so a heartbeat can never be mistaken for a frame.

/// Payload of every heartbeat datagram
pub const HEARTBEAT_DATAGRAM: &[u8; 8] = b"CRSFBHB\x01";

/// Whether a received datagram is a heartbeat rather than serial data
pub fn is_heartbeat(datagram: &[u8]) -> bool {
    datagram == HEARTBEAT_DATAGRAM
}
