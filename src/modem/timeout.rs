//! Timeout budgets scaled by radio signal quality.
//!
//! A fixed timeout is either too short under a weak signal or wastefully long under a
//! strong one. Network-dependent commands get their base budget stretched by the received
//! power ratio between a baseline RSSI code and the last observed one.
use std::fmt;
use std::time::Duration;

use super::{ModemError, Result};

/// RSSI code the modem reports when the signal strength is not known.
pub const RSSI_UNKNOWN: u8 = 99;
/// Highest meaningful RSSI code (-51 dBm or better).
pub const RSSI_MAX: u8 = 31;

/// Last reported signal quality (`+CSQ` RSSI code).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignalQuality {
    #[default]
    Unknown,
    Rssi(u8),
}

impl SignalQuality {
    /// Interpret a raw RSSI code: `0..=31` are levels, `99` is unknown.
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            c if c == RSSI_UNKNOWN as i32 => Ok(SignalQuality::Unknown),
            c if (0..=RSSI_MAX as i32).contains(&c) => Ok(SignalQuality::Rssi(c as u8)),
            other => Err(ModemError::BadFormat(format!("RSSI code {} out of range", other))),
        }
    }

    /// Approximate received power in dBm (`2 * code - 113`).
    pub fn dbm(&self) -> Option<i32> {
        match self {
            SignalQuality::Rssi(code) => Some(2 * *code as i32 - 113),
            SignalQuality::Unknown => None,
        }
    }

    /// Power ratio of the `baseline` code relative to this one. Greater than one when this
    /// signal is weaker than the baseline. `None` when the quality is unknown.
    pub fn power_ratio(&self, baseline: u8) -> Option<f64> {
        match self {
            SignalQuality::Rssi(observed) => {
                let reference = 10f64.powf((2.0 * baseline as f64 - 114.0) / 10.0);
                let measured = 10f64.powf((2.0 * *observed as f64 - 114.0) / 10.0);
                Some(reference / measured)
            }
            SignalQuality::Unknown => None,
        }
    }
}

impl fmt::Display for SignalQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.dbm() {
            Some(dbm) => write!(f, "{} dBm", dbm),
            None => write!(f, "unknown"),
        }
    }
}

/// Computes effective inactivity budgets.
#[derive(Debug, Clone)]
pub struct TimeoutPolicy {
    /// Reference RSSI code the power ratio is taken against.
    pub baseline_rssi: u8,
    /// Multiplier applied when the signal quality is unknown.
    pub unknown_factor: f64,
    /// Upper clamp for any scaled budget.
    pub max_timeout: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            baseline_rssi: 20,
            unknown_factor: 3.0,
            max_timeout: Duration::from_secs(120),
        }
    }
}

impl TimeoutPolicy {
    /// Budget for one command.
    ///
    /// Local commands keep `base`. Network-dependent commands get `3 * base` under an unknown
    /// signal, otherwise `base + ratio * base`. Scaled budgets never exceed `max_timeout`
    /// (nor drop below `base`).
    pub fn effective(
        &self,
        base: Duration,
        network_dependent: bool,
        signal: SignalQuality,
    ) -> Duration {
        if !network_dependent {
            return base;
        }
        let scaled = match signal.power_ratio(self.baseline_rssi) {
            Some(ratio) => base.as_secs_f64() * (1.0 + ratio),
            None => base.as_secs_f64() * self.unknown_factor,
        };
        let ceiling = self.max_timeout.max(base);
        if !scaled.is_finite() || scaled >= ceiling.as_secs_f64() {
            ceiling
        } else {
            Duration::from_secs_f64(scaled).max(base)
        }
    }
}
