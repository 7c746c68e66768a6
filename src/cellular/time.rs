//! Network time from the GSM location service (`AT+CIPGSMLOC`).
//!
//! The time-only query answers `+CIPGSMLOC: <code>,<yyyy/MM/dd>,<hh:mm:ss>` on success and
//! just `+CIPGSMLOC: <code>` on failure. The location variant inserts longitude and
//! latitude before the date, so date and time are always taken from the last two fields.
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::modem::commands::{self, GSMLOC_PREFIX};
use crate::modem::{ByteChannel, CommandSession, ModemError, Result};

/// Seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalendarTimestamp(pub i64);

impl CalendarTimestamp {
    pub fn seconds(&self) -> i64 {
        self.0
    }

    /// Signed seconds elapsed from `earlier` to `self`.
    pub fn seconds_since(&self, earlier: CalendarTimestamp) -> i64 {
        self.0.saturating_sub(earlier.0)
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.0, 0)
    }
}

impl fmt::Display for CalendarTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{} ({})", dt.format("%Y-%m-%dT%H:%M:%SZ"), self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

/// How the raw year field is turned into a calendar year.
///
/// Modems differ in whether they report `2024` or `24`, and the legacy firmware fed the
/// field minus 1970 to a 1970-based calendar conversion. Which reading is intended is not
/// settled, so the choice is explicit and configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YearPolicy {
    /// `>= 1970` is a full year, `< 100` is 2000-based, anything else is malformed.
    #[default]
    Auto,
    /// Always a two-digit year in the 2000s.
    #[serde(rename = "two_digit_2000")]
    TwoDigit2000,
    /// Legacy arithmetic: `field - 1970` is an offset from 1970 and must not be negative,
    /// so only full four-digit years are accepted.
    CalendarOffset,
}

impl YearPolicy {
    pub fn resolve(&self, raw: u32) -> Result<i32> {
        let year = match self {
            YearPolicy::Auto if raw >= 1970 => Some(raw as i64),
            YearPolicy::Auto | YearPolicy::TwoDigit2000 if raw < 100 => Some(2000 + raw as i64),
            YearPolicy::CalendarOffset => {
                let offset = raw as i64 - 1970;
                (offset >= 0).then_some(1970 + offset)
            }
            _ => None,
        };
        year.and_then(|y| i32::try_from(y).ok())
            .ok_or_else(|| ModemError::BadFormat(format!("year {} rejected by {:?} policy", raw, self)))
    }
}

/// Fields of a successful `+CIPGSMLOC` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GsmLocFields {
    pub location_code: String,
    /// Raw `(year, month, day)` as reported.
    pub date: (u32, u32, u32),
    /// `(hour, minute, second)`.
    pub time: (u32, u32, u32),
}

impl GsmLocFields {
    /// Calendar conversion (UTC) after resolving the year with `policy`.
    pub fn timestamp(&self, policy: YearPolicy) -> Result<CalendarTimestamp> {
        let year = policy.resolve(self.date.0)?;
        let (_, month, day) = self.date;
        let (hour, minute, second) = self.time;
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(hour, minute, second))
            .map(|dt| CalendarTimestamp(dt.and_utc().timestamp()))
            .ok_or_else(|| {
                ModemError::BadFormat(format!(
                    "invalid calendar value {}/{}/{} {}:{}:{}",
                    year, month, day, hour, minute, second
                ))
            })
    }
}

fn triple(field: &str, sep: char, what: &str) -> Result<(u32, u32, u32)> {
    let parts: Vec<&str> = field.trim().split(sep).collect();
    if parts.len() != 3 {
        return Err(ModemError::BadFormat(format!("{} field {:?}", what, field)));
    }
    let mut values = [0u32; 3];
    for (slot, part) in values.iter_mut().zip(&parts) {
        *slot = part
            .trim()
            .parse()
            .map_err(|_| ModemError::BadFormat(format!("{} field {:?}", what, field)))?;
    }
    Ok((values[0], values[1], values[2]))
}

/// Parse a `+CIPGSMLOC` row (prefix optional) without touching the input.
///
/// A row with no comma, or whose location code is a non-zero number, is
/// [`ModemError::NoFix`]. Non-numeric date/time tokens are [`ModemError::BadFormat`].
pub fn parse_gsmloc(row: &str) -> Result<GsmLocFields> {
    let row = row.trim();
    let body = row.strip_prefix(GSMLOC_PREFIX).unwrap_or(row).trim();
    if !body.contains(',') {
        return Err(ModemError::NoFix(body.to_string()));
    }
    let fields: Vec<&str> = body.split(',').map(str::trim).collect();
    let code = fields[0];
    if !code.is_empty() {
        let value: u32 = code
            .parse()
            .map_err(|_| ModemError::BadFormat(format!("location code {:?}", code)))?;
        if value != 0 {
            return Err(ModemError::NoFix(code.to_string()));
        }
    }
    if fields.len() < 3 {
        return Err(ModemError::BadFormat(format!("expected date and time in {:?}", body)));
    }
    let date = triple(fields[fields.len() - 2], '/', "date")?;
    let time = triple(fields[fields.len() - 1], ':', "time")?;
    Ok(GsmLocFields {
        location_code: code.to_string(),
        date,
        time,
    })
}

/// Opens a bearer and asks the network for the current time.
#[derive(Debug, Clone)]
pub struct NetworkTimeClient {
    pub bearer_close_timeout: Duration,
    pub bearer_setup_timeout: Duration,
    pub bearer_open_timeout: Duration,
    pub query_timeout: Duration,
    pub apn: Option<String>,
    pub year_policy: YearPolicy,
}

impl NetworkTimeClient {
    /// Bearer reset, bearer configuration, bearer open, then the time query (the only
    /// network-dependent step). The bearer is closed again afterwards, best effort.
    pub async fn fetch_time<C: ByteChannel>(
        &self,
        session: &mut CommandSession<C>,
    ) -> Result<CalendarTimestamp> {
        // A stale bearer from a previous wake makes the open fail; an ERROR here is normal.
        session
            .execute(commands::BEARER_CLOSE, self.bearer_close_timeout, false)
            .await?;
        let outcome = session
            .execute(commands::BEARER_CONTYPE, self.bearer_setup_timeout, false)
            .await?;
        if let Err(e) = session.require_ok(outcome) {
            warn!("Bearer content type not accepted: {}", e);
        }
        if let Some(apn) = &self.apn {
            let outcome = session
                .execute(&commands::bearer_apn(apn), self.bearer_setup_timeout, false)
                .await?;
            if let Err(e) = session.require_ok(outcome) {
                warn!("Bearer APN {} not accepted: {}", apn, e);
            }
        }
        let outcome = session
            .execute(commands::BEARER_OPEN, self.bearer_open_timeout, false)
            .await?;
        if let Err(e) = session.require_ok(outcome) {
            warn!("Bearer open failed ({}); trying the time query anyway", e);
        }

        let result = self.query(session).await;

        match session
            .execute(commands::BEARER_CLOSE, self.bearer_close_timeout, false)
            .await
        {
            Ok(outcome) if !outcome.is_completed() => {
                debug!("Bearer close not confirmed: {:?}", outcome)
            }
            Ok(_) => {}
            Err(e) => warn!("Bearer close failed: {}", e),
        }
        result
    }

    async fn query<C: ByteChannel>(&self, session: &mut CommandSession<C>) -> Result<CalendarTimestamp> {
        let outcome = session
            .execute(commands::LOCATION_TIME, self.query_timeout, true)
            .await?;
        session.require_ok(outcome)?;
        let (index, row) = session
            .buffer()
            .find_prefixed_row(GSMLOC_PREFIX)
            .ok_or_else(|| ModemError::BadFormat("no +CIPGSMLOC row in response".to_string()))?;
        debug!("Time response row: {}", row);
        if session.buffer().row_truncated(index) {
            return Err(ModemError::BadFormat(format!(
                "+CIPGSMLOC row cut at {} bytes",
                session.buffer().line_capacity()
            )));
        }
        let fields = parse_gsmloc(&row)?;
        let ts = fields.timestamp(self.year_policy)?;
        info!("Network time is {}", ts);
        Ok(ts)
    }
}
