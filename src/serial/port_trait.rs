//! Trait abstraction for serial port write operations to enable testing

use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, WriteHalf};
use tokio_serial::SerialStream;

/// Bits on the wire per byte with 8N1 framing
const BITS_PER_BYTE: u64 = 10;

/// Trait for serial port output operations
#[async_trait]
pub trait SerialPortIO: Send {
    /// Write all data to the port
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flush the output buffer and wait until the bytes have left the UART
    async fn flush(&mut self) -> io::Result<()>;
}

/// Time needed to shift `bytes` out at `baud_rate`
pub fn wire_time(bytes: usize, baud_rate: u32) -> Duration {
    if baud_rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_micros(bytes as u64 * BITS_PER_BYTE * 1_000_000 / baud_rate as u64)
}

/// Write half of a `tokio_serial::SerialStream` that implements SerialPortIO
///
/// The write half cannot reach `tcdrain`, so `flush` waits for the computed
/// wire time of everything written since the previous flush.
pub struct TokioSerialPort {
    port: WriteHalf<SerialStream>,
    baud_rate: u32,
    unflushed: usize,
}

impl TokioSerialPort {
    pub fn new(port: WriteHalf<SerialStream>, baud_rate: u32) -> Self {
        Self {
            port,
            baud_rate,
            unflushed: 0,
        }
    }
}

#[async_trait]
impl SerialPortIO for TokioSerialPort {
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data).await?;
        self.unflushed += data.len();
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.port.flush().await?;
        let drain = wire_time(self.unflushed, self.baud_rate);
        self.unflushed = 0;
        if !drain.is_zero() {
            tokio::time::sleep(drain).await;
        }
        Ok(())
    }
}
