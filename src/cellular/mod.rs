//! # Cellular Services
//!
//! Network-facing operations built on [`crate::modem::CommandSession`]:
//!
//! - [`setup`] - liveness check and SMS/charset configuration after power-up
//! - [`registration`] - bounded wait for network registration with attach requests
//! - [`signal`] - `+CSQ` signal quality, feeding the session's timeout scaling
//! - [`time`] - network time from the GSM location service
//! - [`alert`] - SMS alert transmission
//!
//! Every component borrows the session for the duration of one operation; none of them
//! retries except [`RegistrationWaiter`].

use std::time::Duration;

use crate::config::{Config, ProtocolConfig};

pub mod alert;
pub mod registration;
pub mod setup;
pub mod signal;
pub mod time;

pub use alert::AlertSender;
pub use registration::{RegistrationStatus, RegistrationWaiter};
pub use setup::ModemSetup;
pub use signal::SignalQualityMonitor;
pub use time::{CalendarTimestamp, GsmLocFields, NetworkTimeClient, YearPolicy};

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

impl From<&ProtocolConfig> for ModemSetup {
    fn from(p: &ProtocolConfig) -> Self {
        ModemSetup {
            liveness_timeout: ms(p.liveness_ms),
            liveness_attempts: 3,
            setup_timeout: ms(p.setup_ms),
        }
    }
}

impl From<&ProtocolConfig> for SignalQualityMonitor {
    fn from(p: &ProtocolConfig) -> Self {
        SignalQualityMonitor {
            timeout: ms(p.signal_ms),
        }
    }
}

impl From<&Config> for RegistrationWaiter {
    fn from(c: &Config) -> Self {
        RegistrationWaiter {
            status_timeout: ms(c.protocol.registration_ms),
            attach_timeout: ms(c.protocol.registration_ms),
            retry_interval: ms(c.registration.retry_interval_ms),
        }
    }
}

impl From<&Config> for NetworkTimeClient {
    fn from(c: &Config) -> Self {
        NetworkTimeClient {
            bearer_close_timeout: ms(c.protocol.bearer_close_ms),
            bearer_setup_timeout: ms(c.protocol.setup_ms),
            bearer_open_timeout: ms(c.protocol.bearer_open_ms),
            query_timeout: ms(c.protocol.time_query_ms),
            apn: c.time.apn.clone().filter(|a| !a.trim().is_empty()),
            year_policy: c.time.year_policy,
        }
    }
}

impl From<&Config> for AlertSender {
    fn from(c: &Config) -> Self {
        AlertSender {
            recipient: c.alert.recipient.clone().unwrap_or_default(),
            step_timeout: ms(c.protocol.sms_step_ms),
            send_timeout: ms(c.protocol.sms_send_ms),
        }
    }
}
