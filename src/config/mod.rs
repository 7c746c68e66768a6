//! # Configuration Management Module
//!
//! All tunables of the node live in one TOML file. Every section and field has a default,
//! so a partial file (or only `[alert] recipient = "..."`) loads cleanly.
//!
//! ## Configuration Structure
//!
//! - [`ModemConfig`] - serial port and reset timing
//! - [`ProtocolConfig`] - line framing limits, timeout scaling and per-command base timeouts
//! - [`RegistrationConfig`] - bounded registration wait
//! - [`TimeConfig`] - network time interpretation
//! - [`AlertConfig`] - SMS recipient, text and the dead time between alerts
//! - [`StorageConfig`] - where the last-alert record lives
//! - [`PinsConfig`] - trap input and power hold lines
//! - [`LoggingConfig`] - log level and optional log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use trapwatch::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("trapwatch.toml").await?;
//!     config.validate()?;
//!     println!("Modem port: {}", config.modem.port);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [modem]
//! port = "/dev/ttyS1"
//! baud_rate = 9600
//!
//! [alert]
//! recipient = "+64215550100"
//! message = "Trap triggered"
//! dead_time_secs = 1800
//!
//! [pins]
//! trap_input = "/sys/class/gpio/gpio17/value"
//! power_hold = "/sys/class/gpio/gpio27/value"
//! ```

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;

use crate::cellular::YearPolicy;
use crate::modem::{ProtocolLimits, TimeoutPolicy};
use crate::node::pins::LineLevel;

pub const DEFAULT_CONFIG_PATH: &str = "trapwatch.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub modem: ModemConfig,
    pub protocol: ProtocolConfig,
    pub registration: RegistrationConfig,
    pub time: TimeConfig,
    pub alert: AlertConfig,
    pub storage: StorageConfig,
    pub pins: PinsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModemConfig {
    pub port: String,
    pub baud_rate: u32,
    /// DTR low time when opening the port; resets most SIM800 breakout boards.
    pub reset_pulse_ms: u64,
    /// Wait after the reset pulse before stale input is discarded.
    pub settle_ms: u64,
    pub command_terminator: String,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyS1".to_string(),
            baud_rate: 9600,
            reset_pulse_ms: 200,
            settle_ms: 500,
            command_terminator: "\r".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Rows kept per response, including the terminal marker row.
    pub max_lines: usize,
    /// Bytes kept per row; the rest of a long row is dropped.
    pub line_capacity: usize,
    pub poll_tick_ms: u64,
    /// Upper bound on one collection even when the modem keeps talking.
    pub response_ceiling_ms: u64,
    pub baseline_rssi: u8,
    pub unknown_signal_factor: f64,
    pub max_network_timeout_ms: u64,
    pub liveness_ms: u64,
    pub setup_ms: u64,
    pub signal_ms: u64,
    pub registration_ms: u64,
    pub bearer_close_ms: u64,
    pub bearer_open_ms: u64,
    pub time_query_ms: u64,
    pub sms_step_ms: u64,
    pub sms_send_ms: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_lines: 10,
            line_capacity: 96,
            poll_tick_ms: 20,
            response_ceiling_ms: 180_000,
            baseline_rssi: 20,
            unknown_signal_factor: 3.0,
            max_network_timeout_ms: 120_000,
            liveness_ms: 1000,
            setup_ms: 1000,
            signal_ms: 5000,
            registration_ms: 1000,
            bearer_close_ms: 1000,
            bearer_open_ms: 3000,
            time_query_ms: 10_000,
            sms_step_ms: 500,
            sms_send_ms: 10_000,
        }
    }
}

impl ProtocolConfig {
    pub fn timeout_policy(&self) -> TimeoutPolicy {
        TimeoutPolicy {
            baseline_rssi: self.baseline_rssi,
            unknown_factor: self.unknown_signal_factor,
            max_timeout: Duration::from_millis(self.max_network_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    pub max_attempts: u32,
    pub retry_interval_ms: u64,
    /// End the cycle when registration never succeeds instead of trying the time query anyway.
    pub abort_on_failure: bool,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            retry_interval_ms: 2000,
            abort_on_failure: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeConfig {
    pub year_policy: YearPolicy,
    /// Bearer APN; some operators need it for the location service.
    pub apn: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub enabled: bool,
    pub recipient: Option<String>,
    pub message: String,
    /// Minimum spacing between two alerts.
    pub dead_time_secs: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            recipient: None,
            message: "Trap triggered".to_string(),
            dead_time_secs: 1800,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub state_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_file: "data/last_alert.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PinsConfig {
    /// Value file of the trap input line. Absent means the trap is treated as armed.
    pub trap_input: Option<String>,
    /// Level the trap input reads while the trap is disarmed.
    pub trap_disarmed_level: LineLevel,
    /// Value file of the power hold line. Absent means release is only logged.
    pub power_hold: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Write this configuration to `path`.
    pub async fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        Config::default().save(path).await
    }

    /// Reject values the protocol engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        let p = &self.protocol;
        if p.max_lines < 2 {
            return Err(anyhow!(
                "protocol.max_lines must be at least 2 (one data row plus the marker), got {}",
                p.max_lines
            ));
        }
        if p.line_capacity == 0 {
            return Err(anyhow!("protocol.line_capacity must be greater than zero"));
        }
        if p.poll_tick_ms == 0 {
            return Err(anyhow!("protocol.poll_tick_ms must be greater than zero"));
        }
        if p.baseline_rssi > crate::modem::timeout::RSSI_MAX {
            return Err(anyhow!(
                "protocol.baseline_rssi must be within 0..=31, got {}",
                p.baseline_rssi
            ));
        }
        if !p.unknown_signal_factor.is_finite() || p.unknown_signal_factor < 1.0 {
            return Err(anyhow!(
                "protocol.unknown_signal_factor must be at least 1.0, got {}",
                p.unknown_signal_factor
            ));
        }
        if self.modem.command_terminator.is_empty() {
            return Err(anyhow!("modem.command_terminator must not be empty"));
        }
        if self.registration.max_attempts == 0 {
            return Err(anyhow!("registration.max_attempts must be at least 1"));
        }
        if self.alert.enabled {
            let recipient = self.alert.recipient.as_deref().unwrap_or_default();
            crate::validation::validate_recipient(recipient)
                .map_err(|e| anyhow!("alert.recipient: {}", e))?;
            crate::validation::sanitize_sms_body(&self.alert.message)
                .map_err(|e| anyhow!("alert.message: {}", e))?;
        }
        Ok(())
    }

    pub fn dead_time(&self) -> Duration {
        Duration::from_secs(self.alert.dead_time_secs)
    }
}

impl From<&Config> for ProtocolLimits {
    fn from(c: &Config) -> Self {
        let p = &c.protocol;
        ProtocolLimits {
            max_rows: p.max_lines,
            line_capacity: p.line_capacity,
            poll_tick: Duration::from_millis(p.poll_tick_ms),
            response_ceiling: Duration::from_millis(p.response_ceiling_ms),
            terminator: c.modem.command_terminator.as_bytes().to_vec(),
            policy: p.timeout_policy(),
        }
    }
}
