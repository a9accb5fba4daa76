//! # Half-Duplex Link
//!
//! Arbitrates the single CRSF wire shared by transmit and receive.
//!
//! The line is either `Receiving` (initial) or `Transmitting`. A write asserts
//! the direction signal, waits for the transceiver to turn around, writes and
//! drains the bytes, then releases the line again. Only one write is in flight
//! at a time.
//!
//! The receive side is drained continuously by its own task, which stamps
//! each chunk as it arrives. Chunks that arrive inside a transmit window are
//! reported as lost, however late the consumer gets to them.

use bytes::BytesMut;
use std::io;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{trace, warn};

use super::direction::DirectionControl;
use super::port_trait::SerialPortIO;
use crate::error::{BridgeError, Result};

/// Bytes requested from the port per read
const READ_CHUNK: usize = 256;

/// Pause after a failed port read before reading again
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Turnaround delays around a transmit window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTiming {
    /// Wait after asserting the direction signal, before the first byte
    pub settle: Duration,
    /// Wait after the last byte has drained, before releasing the line
    pub trailing_settle: Duration,
}

impl Default for LinkTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_micros(100),
            trailing_settle: Duration::from_micros(1000),
        }
    }
}

/// Direction of the shared wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Receiving,
    Transmitting,
}

/// One chunk read from the half-duplex line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Real data that arrived while the line was receiving
    Data(BytesMut),
    /// `n` bytes arrived inside a transmit window and were dropped
    Lost(usize),
    /// The underlying port reached end of stream
    Closed,
}

#[derive(Debug, Default)]
struct Windows {
    /// Start of the window in progress
    open: Option<Instant>,
    /// Most recently completed window
    last: Option<(Instant, Instant)>,
}

/// Transmit windows, shared between the write path and the receive task
#[derive(Debug, Default)]
struct LineState {
    windows: StdMutex<Windows>,
}

impl LineState {
    fn windows(&self) -> MutexGuard<'_, Windows> {
        self.windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin_transmit(&self) {
        self.windows().open = Some(Instant::now());
    }

    fn end_transmit(&self) {
        let mut windows = self.windows();
        if let Some(opened) = windows.open.take() {
            windows.last = Some((opened, Instant::now()));
        }
    }

    fn is_transmitting(&self) -> bool {
        self.windows().open.is_some()
    }

    /// Whether a chunk that arrived at `arrived` fell inside a transmit window
    fn in_window(&self, arrived: Instant) -> bool {
        let windows = self.windows();
        let in_open = windows.open.is_some_and(|opened| arrived >= opened);
        let in_last = windows
            .last
            .is_some_and(|(opened, closed)| arrived >= opened && arrived <= closed);
        in_open || in_last
    }
}

struct TxPath {
    port: Box<dyn SerialPortIO>,
    direction: Box<dyn DirectionControl>,
}

/// Exclusive transmit access to a half-duplex serial wire
pub struct HalfDuplexLink {
    tx: Mutex<TxPath>,
    line: Arc<LineState>,
    timing: LinkTiming,
}

impl std::fmt::Debug for HalfDuplexLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HalfDuplexLink")
            .field("state", &self.state())
            .field("timing", &self.timing)
            .finish_non_exhaustive()
    }
}

impl HalfDuplexLink {
    /// Create a link in the `Receiving` state
    ///
    /// # Errors
    ///
    /// Returns error if the direction signal cannot be driven to receive
    pub fn new(
        port: Box<dyn SerialPortIO>,
        mut direction: Box<dyn DirectionControl>,
        timing: LinkTiming,
    ) -> Result<Self> {
        direction.set_direction(false)?;

        Ok(Self {
            tx: Mutex::new(TxPath { port, direction }),
            line: Arc::new(LineState::default()),
            timing,
        })
    }

    pub fn state(&self) -> LinkState {
        if self.line.is_transmitting() {
            LinkState::Transmitting
        } else {
            LinkState::Receiving
        }
    }

    pub fn timing(&self) -> LinkTiming {
        self.timing
    }

    /// Transmit `bytes` in one exclusive window
    ///
    /// Waits for any write already in flight. The direction signal is always
    /// returned to receive, even if writing fails. The window covers the
    /// settle times on both sides.
    ///
    /// # Errors
    ///
    /// Returns error if the direction signal or the port fails
    pub async fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut tx = self.tx.lock().await;

        self.line.begin_transmit();
        if let Err(e) = tx.direction.set_direction(true) {
            self.line.end_transmit();
            return Err(e);
        }

        if !self.timing.settle.is_zero() {
            tokio::time::sleep(self.timing.settle).await;
        }

        let sent = Self::send(tx.port.as_mut(), bytes).await;

        if !self.timing.trailing_settle.is_zero() {
            tokio::time::sleep(self.timing.trailing_settle).await;
        }

        let released = tx.direction.set_direction(false);
        self.line.end_transmit();

        if let Err(e) = &sent {
            warn!("Serial write of {} bytes failed: {}", bytes.len(), e);
        }
        sent?;
        released?;

        trace!("Transmitted {} bytes", bytes.len());
        Ok(())
    }

    async fn send(port: &mut dyn SerialPortIO, bytes: &[u8]) -> Result<()> {
        port.write_all(bytes)
            .await
            .map_err(|e| BridgeError::Serial(format!("Failed to write to serial port: {}", e)))?;
        port.flush()
            .await
            .map_err(|e| BridgeError::Serial(format!("Failed to drain serial port: {}", e)))
    }

    /// Start draining the receive half of the same wire
    ///
    /// Spawns the receive task, so it must be called from within a tokio
    /// runtime. The task stops when the port ends or the reader is dropped.
    pub fn reader<R>(&self, inner: R) -> HalfDuplexReader
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (events, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(receive_task(inner, self.line.clone(), events));
        HalfDuplexReader { rx, task }
    }
}

/// Read the port as fast as bytes arrive and classify every chunk on arrival
///
/// Never waits on the consumer, so a slow consumer cannot move bytes across
/// a window boundary.
async fn receive_task<R>(
    mut inner: R,
    line: Arc<LineState>,
    events: mpsc::UnboundedSender<io::Result<ReadOutcome>>,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(READ_CHUNK);

    loop {
        buf.reserve(READ_CHUNK);
        let event = match inner.read_buf(&mut buf).await {
            Ok(0) => {
                let _ = events.send(Ok(ReadOutcome::Closed));
                return;
            }
            Ok(n) => {
                let chunk = buf.split();
                if line.in_window(Instant::now()) {
                    trace!("Dropped {} bytes received during transmit", n);
                    Ok(ReadOutcome::Lost(n))
                } else {
                    Ok(ReadOutcome::Data(chunk))
                }
            }
            Err(e) => Err(e),
        };

        let failed = event.is_err();
        if events.send(event).is_err() {
            return;
        }
        if failed {
            tokio::time::sleep(READ_ERROR_BACKOFF).await;
        }
    }
}

/// Receive half of the wire, fed by the receive task
pub struct HalfDuplexReader {
    rx: mpsc::UnboundedReceiver<io::Result<ReadOutcome>>,
    task: JoinHandle<()>,
}

impl HalfDuplexReader {
    /// Next chunk from the wire, in arrival order
    ///
    /// Cancel safe. Keeps returning `Closed` once the port has ended.
    ///
    /// # Errors
    ///
    /// Returns error if a port read failed
    pub async fn read(&mut self) -> io::Result<ReadOutcome> {
        match self.rx.recv().await {
            Some(event) => event,
            None => Ok(ReadOutcome::Closed),
        }
    }
}

impl Drop for HalfDuplexReader {
    fn drop(&mut self) {
        self.task.abort();
    }
}
