//! # Serial Communication Module
//!
//! Handles the half-duplex CRSF wire to the handset or transmitter module.
//!
//! This module handles:
//! - Opening the serial port with CRSF settings (8N1, no flow control)
//! - Splitting it into a read half and a draining write half
//! - Driving the transceiver direction signal
//! - Arbitrating transmit and receive on the shared wire

pub mod direction;
pub mod half_duplex;
pub mod port_trait;

pub use direction::{open_direction_control, DirectionControl, NoDirectionControl};
pub use half_duplex::{HalfDuplexLink, HalfDuplexReader, LinkState, LinkTiming, ReadOutcome};
pub use port_trait::{SerialPortIO, TokioSerialPort};

use crate::config::SerialConfig;
use crate::error::{BridgeError, Result};
use tokio::io::AsyncRead;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info};

/// Receive half of the serial port
pub type SerialReader = Box<dyn AsyncRead + Unpin + Send>;

/// An opened CRSF serial port
pub struct SerialEndpoint {
    /// Serial port handle
    port: tokio_serial::SerialStream,
    /// Device path (e.g., /dev/serial0)
    device_path: String,
    baud_rate: u32,
}

impl std::fmt::Debug for SerialEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialEndpoint")
            .field("device_path", &self.device_path)
            .field("baud_rate", &self.baud_rate)
            .finish_non_exhaustive()
    }
}

/// Open the configured serial port
///
/// # Errors
///
/// Returns error if the port cannot be opened
///
/// # Examples
///
/// ```no_run
/// use crsf_bridge::config::SerialConfig;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let endpoint = crsf_bridge::serial::open(&SerialConfig::default())?;
///     println!("Opened {}", endpoint.device_path());
///     Ok(())
/// }
/// ```
pub fn open(config: &SerialConfig) -> Result<SerialEndpoint> {
    SerialEndpoint::open(&config.port, config.baud_rate)
}

impl SerialEndpoint {
    /// Open `path` at `baud_rate`
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        debug!("Opening serial port {} at {} baud", path, baud_rate);
        let port = Self::open_port(path, baud_rate)?;
        info!("Opened serial port {} at {} baud", path, baud_rate);

        Ok(Self {
            port,
            device_path: path.to_string(),
            baud_rate,
        })
    }

    /// Open a specific serial port with CRSF settings
    fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| BridgeError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }

    /// Get the device path of the opened serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Split into the receive half and a write half that waits for the wire
    pub fn into_parts(self) -> (SerialReader, TokioSerialPort) {
        let (reader, writer) = tokio::io::split(self.port);
        (Box::new(reader), TokioSerialPort::new(writer, self.baud_rate))
    }
}
