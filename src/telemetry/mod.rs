//! # Telemetry Module
//!
//! Turns validated CRSF frames into structured telemetry.
//!
//! This module handles:
//! - Decoding fixed-layout telemetry payloads
//! - Keeping the latest record of each kind
//! - Dispatching records to registered handlers

pub mod decoder;
pub mod hub;
pub mod types;

pub use decoder::decode;
pub use hub::{TelemetryHandler, TelemetryHub};
pub use types::{
    Attitude, BatterySensor, FlightMode, GpsData, LinkStatistics, RcChannelsData,
    TelemetryKind, TelemetryRecord, TelemetrySnapshot,
};
