//! `+CSQ` signal quality.
use std::time::Duration;

use log::{info, warn};

use crate::modem::commands::{CSQ_PREFIX, SIGNAL_QUALITY};
use crate::modem::{ByteChannel, CommandSession, ModemError, Result, SignalQuality};

#[derive(Debug, Clone)]
pub struct SignalQualityMonitor {
    pub timeout: Duration,
}

impl SignalQualityMonitor {
    /// Query the modem and store the result on the session so later network-dependent
    /// commands scale their budgets with it.
    ///
    /// The RSSI is the first comma-separated field of the row before the marker. An unknown
    /// reading (99) is stored as [`SignalQuality::Unknown`], which the timeout policy treats
    /// as worst case. On failure the session keeps its previous value.
    pub async fn refresh<C: ByteChannel>(
        &self,
        session: &mut CommandSession<C>,
    ) -> Result<SignalQuality> {
        let outcome = session.execute(SIGNAL_QUALITY, self.timeout, false).await?;
        session.require_ok(outcome)?;
        let buffer = session.buffer();
        let payload = buffer
            .payload(&outcome)
            .map(|row| row.into_owned())
            .ok_or_else(|| ModemError::BadFormat("empty +CSQ response".to_string()))?;
        if outcome.payload_row().is_some_and(|i| buffer.row_truncated(i)) {
            return Err(ModemError::BadFormat(format!("+CSQ row cut: {:?}", payload)));
        }
        let quality = parse_csq(&payload)?;
        session.set_signal(quality);

        match quality.power_ratio(session.policy().baseline_rssi) {
            Some(ratio) => info!("Signal {} (power ratio {:.2} vs baseline)", quality, ratio),
            None => warn!("Signal quality unknown; network timeouts use the fallback factor"),
        }
        Ok(quality)
    }
}

/// Parse `+CSQ: <rssi>,<ber>` (the prefix is optional).
pub fn parse_csq(row: &str) -> Result<SignalQuality> {
    let row = row.trim();
    let body = row.strip_prefix(CSQ_PREFIX).unwrap_or(row).trim();
    let first = body.split(',').next().unwrap_or_default().trim();
    let code: i32 = first
        .parse()
        .map_err(|_| ModemError::BadFormat(format!("RSSI field {:?} is not numeric", first)))?;
    SignalQuality::from_code(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rssi_field() {
        assert_eq!(parse_csq("+CSQ: 15,99").unwrap(), SignalQuality::Rssi(15));
        assert_eq!(parse_csq("+CSQ: 99,99").unwrap(), SignalQuality::Unknown);
        assert_eq!(parse_csq("7,0").unwrap(), SignalQuality::Rssi(7));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(parse_csq("+CSQ: x,0"), Err(ModemError::BadFormat(_))));
        assert!(matches!(parse_csq("+CSQ: 45,0"), Err(ModemError::BadFormat(_))));
        assert!(parse_csq("").is_err());
    }
}
