//! # Line Direction Control
//!
//! Drives the transceiver direction signal of a half-duplex serial line.
//!
//! Three wirings are supported:
//! - no pin (transceivers that switch direction automatically)
//! - one GPIO, asserted while transmitting
//! - separate TX-enable and RX-enable GPIOs
//!
//! GPIOs are requested from the Linux GPIO character device by chip path and
//! line offset. Lines are released when dropped.

use gpiocdev::line::Value;
use gpiocdev::Request;
use tracing::{debug, info};

use crate::config::{DirectionConfig, DirectionMode};
use crate::error::{BridgeError, Result};

/// Consumer label shown by `gpioinfo` for lines held by the bridge
const GPIO_CONSUMER: &str = "crsf-bridge";

/// A single digital output selecting transmit or receive
#[cfg_attr(test, mockall::automock)]
pub trait DirectionControl: Send {
    /// Drive the line towards transmit (`true`) or receive (`false`)
    fn set_direction(&mut self, transmit: bool) -> Result<()>;
}

/// One digital output pin
#[cfg_attr(test, mockall::automock)]
pub trait OutputPin: Send {
    fn set_high(&mut self, high: bool) -> Result<()>;
}

/// For transceivers without a direction pin
#[derive(Debug, Default)]
pub struct NoDirectionControl;

impl DirectionControl for NoDirectionControl {
    fn set_direction(&mut self, _transmit: bool) -> Result<()> {
        Ok(())
    }
}

/// One output line requested from a GPIO chip
pub struct CdevLine {
    request: Request,
    offset: u32,
}

fn level(high: bool) -> Value {
    if high {
        Value::Active
    } else {
        Value::Inactive
    }
}

impl CdevLine {
    /// Request line `offset` of `chip` (e.g. `/dev/gpiochip0`) as an output
    ///
    /// # Errors
    ///
    /// Returns error if the chip cannot be opened or the line is busy
    pub fn request(chip: &str, offset: u32, initial_high: bool) -> Result<Self> {
        let request = Request::builder()
            .on_chip(chip)
            .with_consumer(GPIO_CONSUMER)
            .with_line(offset)
            .as_output(level(initial_high))
            .request()
            .map_err(|e| {
                BridgeError::Direction(format!("Failed to request {} line {}: {}", chip, offset, e))
            })?;
        debug!("{} line {} requested as output", chip, offset);

        Ok(Self { request, offset })
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }
}

impl OutputPin for CdevLine {
    fn set_high(&mut self, high: bool) -> Result<()> {
        self.request
            .set_value(self.offset, level(high))
            .map_err(|e| {
                BridgeError::Direction(format!("Failed to set line {}: {}", self.offset, e))
            })
    }
}

/// One pin, asserted while transmitting
pub struct SingleDirectionPin<P> {
    pin: P,
    active_high: bool,
}

impl<P: OutputPin> SingleDirectionPin<P> {
    pub fn new(pin: P, active_high: bool) -> Self {
        Self { pin, active_high }
    }
}

impl<P: OutputPin> DirectionControl for SingleDirectionPin<P> {
    fn set_direction(&mut self, transmit: bool) -> Result<()> {
        self.pin.set_high(transmit == self.active_high)
    }
}

/// Separate transmit-enable and receive-enable pins
///
/// The active enable is always released before the other one is asserted,
/// so both drivers are never enabled at once.
pub struct DualDirectionPins<P> {
    tx_enable: P,
    rx_enable: P,
    active_high: bool,
}

impl<P: OutputPin> DualDirectionPins<P> {
    pub fn new(tx_enable: P, rx_enable: P, active_high: bool) -> Self {
        Self {
            tx_enable,
            rx_enable,
            active_high,
        }
    }
}

impl<P: OutputPin> DirectionControl for DualDirectionPins<P> {
    fn set_direction(&mut self, transmit: bool) -> Result<()> {
        let on = self.active_high;
        if transmit {
            self.rx_enable.set_high(!on)?;
            self.tx_enable.set_high(on)
        } else {
            self.tx_enable.set_high(!on)?;
            self.rx_enable.set_high(on)
        }
    }
}

/// Build the direction control described by the configuration
///
/// Pins start in the receive state.
///
/// # Errors
///
/// Returns error if a configured GPIO line cannot be requested
pub fn open_direction_control(config: &DirectionConfig) -> Result<Box<dyn DirectionControl>> {
    let chip = config.gpio_chip.as_str();
    let on = config.active_high;

    let control: Box<dyn DirectionControl> = match config.mode {
        DirectionMode::None => Box::new(NoDirectionControl),
        DirectionMode::Single => {
            let pin = CdevLine::request(chip, config.tx_pin, !on)?;
            info!("Direction control on {} line {} (single pin)", chip, pin.offset());
            Box::new(SingleDirectionPin::new(pin, on))
        }
        DirectionMode::Dual => {
            let tx_enable = CdevLine::request(chip, config.tx_pin, !on)?;
            let rx_enable = CdevLine::request(chip, config.rx_pin, on)?;
            info!(
                "Direction control on {} lines {} (TX enable) and {} (RX enable)",
                chip,
                tx_enable.offset(),
                rx_enable.offset()
            );
            Box::new(DualDirectionPins::new(tx_enable, rx_enable, on))
        }
    };

    Ok(control)
}
