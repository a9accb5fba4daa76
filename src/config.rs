//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::bridge::BridgeProfile;
use crate::error::{BridgeError, Result};
use crate::serial::LinkTiming;

/// Baud rates accepted on the CRSF wire
pub const ALLOWED_BAUD_RATES: &[u32] = &[
    115200, 400000, 416666, 420000, 921600, 1870000, 3750000,
];

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub direction: DirectionConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub liveness: LivenessConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Relay behaviour
#[derive(Debug, Deserialize, Clone)]
pub struct BridgeConfig {
    #[serde(default = "default_profile")]
    pub profile: BridgeProfile,

    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,

    /// Invert serial bytes before forwarding (inverted UART without a
    /// hardware inverter)
    #[serde(default)]
    pub invert_serial: bool,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

/// How the transceiver direction is switched
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DirectionMode {
    /// Transceiver switches on its own
    None,
    /// One GPIO, asserted while transmitting
    Single,
    /// Separate TX-enable and RX-enable GPIOs
    Dual,
}

/// Direction signal configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DirectionConfig {
    #[serde(default = "default_direction_mode")]
    pub mode: DirectionMode,

    #[serde(default = "default_tx_pin")]
    pub tx_pin: u32,

    #[serde(default = "default_rx_pin")]
    pub rx_pin: u32,

    /// GPIO character device holding the pins
    #[serde(default = "default_gpio_chip")]
    pub gpio_chip: String,

    #[serde(default = "default_active_high")]
    pub active_high: bool,

    #[serde(default = "default_settle_us")]
    pub settle_us: u64,

    #[serde(default = "default_trailing_settle_us")]
    pub trailing_settle_us: u64,
}

/// UDP peer configuration
#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    #[serde(default = "default_local_port")]
    pub local_port: u16,

    #[serde(default = "default_remote_host")]
    pub remote_host: String,

    #[serde(default = "default_remote_port")]
    pub remote_port: u16,
}

/// Heartbeat and connection timeouts
#[derive(Debug, Deserialize, Clone)]
pub struct LivenessConfig {
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    #[serde(default = "default_serial_timeout_ms")]
    pub serial_timeout_ms: u64,

    #[serde(default = "default_network_timeout_ms")]
    pub network_timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Also write daily-rotated log files here
    #[serde(default)]
    pub directory: Option<String>,
}

// Default value functions
fn default_profile() -> BridgeProfile { BridgeProfile::Parsing }
fn default_status_interval_ms() -> u64 { 30000 }

fn default_serial_port() -> String { "/dev/serial0".to_string() }
fn default_baud_rate() -> u32 { 416666 }

fn default_direction_mode() -> DirectionMode { DirectionMode::None }
fn default_tx_pin() -> u32 { 24 }
fn default_rx_pin() -> u32 { 23 }
fn default_gpio_chip() -> String { "/dev/gpiochip0".to_string() }
fn default_active_high() -> bool { true }
fn default_settle_us() -> u64 { 100 }
fn default_trailing_settle_us() -> u64 { 1000 }

fn default_local_port() -> u16 { 5001 }
fn default_remote_host() -> String { "192.168.1.101".to_string() }
fn default_remote_port() -> u16 { 5000 }

fn default_heartbeat_interval_ms() -> u64 { 5000 }
fn default_serial_timeout_ms() -> u64 { 2000 }
fn default_network_timeout_ms() -> u64 { 15000 }

fn default_log_level() -> String { "info".to_string() }

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            status_interval_ms: default_status_interval_ms(),
            invert_serial: false,
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
        }
    }
}

impl Default for DirectionConfig {
    fn default() -> Self {
        Self {
            mode: default_direction_mode(),
            tx_pin: default_tx_pin(),
            rx_pin: default_rx_pin(),
            gpio_chip: default_gpio_chip(),
            active_high: default_active_high(),
            settle_us: default_settle_us(),
            trailing_settle_us: default_trailing_settle_us(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            local_port: default_local_port(),
            remote_host: default_remote_host(),
            remote_port: default_remote_port(),
        }
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            serial_timeout_ms: default_serial_timeout_ms(),
            network_timeout_ms: default_network_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
        }
    }
}

impl DirectionConfig {
    /// Turnaround delays for the half-duplex link
    pub fn timing(&self) -> LinkTiming {
        LinkTiming {
            settle: Duration::from_micros(self.settle_us),
            trailing_settle: Duration::from_micros(self.trailing_settle_us),
        }
    }
}

fn invalid(message: impl std::fmt::Display) -> BridgeError {
    BridgeError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use crsf_bridge::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.bridge.status_interval_ms == 0 || self.bridge.status_interval_ms > 3_600_000 {
            return Err(invalid("status_interval_ms must be between 1 and 3600000"));
        }

        if self.serial.port.is_empty() {
            return Err(invalid("serial port cannot be empty"));
        }

        if !ALLOWED_BAUD_RATES.contains(&self.serial.baud_rate) {
            return Err(invalid(format!(
                "baud_rate must be one of: {}",
                ALLOWED_BAUD_RATES
                    .iter()
                    .map(|rate| rate.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        if self.direction.mode != DirectionMode::None && self.direction.gpio_chip.is_empty() {
            return Err(invalid("gpio_chip cannot be empty when a direction pin is used"));
        }

        let direction = &self.direction;
        if direction.mode == DirectionMode::Dual && direction.tx_pin == direction.rx_pin {
            return Err(invalid("tx_pin and rx_pin must differ in dual mode"));
        }

        if self.direction.settle_us > 100_000 {
            return Err(invalid("settle_us must be at most 100000"));
        }

        if self.direction.trailing_settle_us > 100_000 {
            return Err(invalid("trailing_settle_us must be at most 100000"));
        }

        if self.network.local_port == 0 {
            return Err(invalid("local_port must be greater than 0"));
        }

        if self.network.remote_host.is_empty() {
            return Err(invalid("remote_host cannot be empty"));
        }

        if self.network.remote_port == 0 {
            return Err(invalid("remote_port must be greater than 0"));
        }

        if self.liveness.heartbeat_interval_ms == 0 || self.liveness.heartbeat_interval_ms > 60000 {
            return Err(invalid("heartbeat_interval_ms must be between 1 and 60000"));
        }

        if self.liveness.serial_timeout_ms == 0 || self.liveness.serial_timeout_ms > 60000 {
            return Err(invalid("serial_timeout_ms must be between 1 and 60000"));
        }

        if self.liveness.network_timeout_ms == 0 || self.liveness.network_timeout_ms > 300_000 {
            return Err(invalid("network_timeout_ms must be between 1 and 300000"));
        }

        // A peer sending heartbeats on time must never look disconnected
        if self.liveness.network_timeout_ms <= self.liveness.heartbeat_interval_ms {
            return Err(invalid("network_timeout_ms must be greater than heartbeat_interval_ms"));
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(invalid(format!(
                "log level must be one of: {}",
                LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }
}
