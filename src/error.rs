//! # Error Types
//!
//! Custom error types for CRSF Bridge using `thiserror`.

use thiserror::Error;

/// Main error type for CRSF Bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    /// CRSF framing errors (bad sync, length or CRC)
    #[error("CRSF protocol error: {0}")]
    CrsfProtocol(String),

    /// Telemetry payload does not match the layout of its frame type
    #[error("Malformed payload for frame type 0x{frame_type:02X}: {reason}")]
    MalformedPayload {
        /// Frame type the payload was decoded as
        frame_type: u8,
        /// What was wrong with it
        reason: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// Direction signal (GPIO) errors
    #[error("Direction signal error: {0}")]
    Direction(String),

    /// UDP socket could not be bound
    #[error("Failed to bind UDP port {port}: {source}")]
    NetworkBind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// Remote peer address could not be resolved
    #[error("Cannot resolve remote peer {0}")]
    RemoteResolve(String),
}

/// Result type alias for CRSF Bridge
pub type Result<T> = std::result::Result<T, BridgeError>;
