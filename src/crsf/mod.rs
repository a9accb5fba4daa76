//! # CRSF Protocol Module
//!
//! Implementation of the Crossfire (CRSF) frame codec.
//!
//! This module handles:
//! - Frame synchronization and validation on raw serial streams
//! - Frame serialization
//! - CRC8-DVB-S2 checksum calculation
//! - RC channels payload packing

pub mod protocol;
pub mod encoder;
pub mod decoder;
pub mod crc;

pub use decoder::{decode_frame, parse, FrameParser, ParseOutcome};
pub use encoder::encode_frame;
pub use protocol::CrsfFrame;
