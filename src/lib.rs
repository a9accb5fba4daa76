//! # CRSF Bridge Library
//!
//! Bridge a half-duplex CRSF serial link across an IP network.
//!
//! One bridge sits next to the handset and relays bytes opaquely. The other
//! sits next to the transmitter module, relays the same way and also decodes
//! CRSF telemetry into structured records.

pub mod bridge;
pub mod config;
pub mod error;
pub mod crsf;
pub mod liveness;
pub mod network;
pub mod serial;
pub mod telemetry;
