//! Bounded wait for network registration.
use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::sleep;

use crate::modem::commands::{ATTACH, CREG_PREFIX, REGISTRATION_STATUS};
use crate::modem::{ByteChannel, CommandSession, ModemError, Result};

/// `<stat>` of a `+CREG` report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStatus {
    NotSearching,
    Home,
    Searching,
    Denied,
    Unknown,
    Roaming,
}

impl RegistrationStatus {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => RegistrationStatus::NotSearching,
            1 => RegistrationStatus::Home,
            2 => RegistrationStatus::Searching,
            3 => RegistrationStatus::Denied,
            4 => RegistrationStatus::Unknown,
            5 => RegistrationStatus::Roaming,
            _ => return None,
        })
    }

    pub fn is_registered(&self) -> bool {
        matches!(self, RegistrationStatus::Home | RegistrationStatus::Roaming)
    }
}

/// Parse `+CREG: <n>,<stat>[,...]` or the unsolicited `+CREG: <stat>` form.
pub fn parse_creg(row: &str) -> Result<RegistrationStatus> {
    let row = row.trim();
    let body = row.strip_prefix(CREG_PREFIX).unwrap_or(row).trim();
    let fields: Vec<&str> = body.split(',').map(str::trim).collect();
    let stat = if fields.len() >= 2 { fields[1] } else { fields[0] };
    stat.parse::<u8>()
        .ok()
        .and_then(RegistrationStatus::from_code)
        .ok_or_else(|| ModemError::BadFormat(format!("registration status {:?}", body)))
}

#[derive(Debug, Clone)]
pub struct RegistrationWaiter {
    pub status_timeout: Duration,
    pub attach_timeout: Duration,
    pub retry_interval: Duration,
}

impl RegistrationWaiter {
    /// Poll registration up to `max_attempts` times. Each unregistered poll issues an attach
    /// request and sleeps `retry_interval` before the next one. Returns `true` as soon as the
    /// modem reports home or roaming registration.
    pub async fn wait_for_registration<C: ByteChannel>(
        &self,
        session: &mut CommandSession<C>,
        max_attempts: u32,
    ) -> Result<bool> {
        for attempt in 1..=max_attempts {
            let outcome = session
                .execute(REGISTRATION_STATUS, self.status_timeout, false)
                .await?;
            let status = match session.require_ok(outcome) {
                Ok(()) => match session.buffer().find_prefixed(CREG_PREFIX) {
                    Some(row) => parse_creg(&row).ok(),
                    None => None,
                },
                Err(e) => {
                    debug!("Registration query failed: {}", e);
                    None
                }
            };

            if let Some(s) = status.filter(RegistrationStatus::is_registered) {
                info!("Registered on network ({:?}) after {} attempt(s)", s, attempt);
                return Ok(true);
            }
            debug!(
                "Registration attempt {}/{}: {:?}; requesting attach",
                attempt, max_attempts, status
            );
            let outcome = session.execute(ATTACH, self.attach_timeout, true).await?;
            if let Err(e) = session.require_ok(outcome) {
                debug!("Attach request not accepted: {}", e);
            }
            if attempt < max_attempts {
                sleep(self.retry_interval).await;
            }
        }
        warn!("Not registered after {} attempts", max_attempts);
        Ok(false)
    }
}
