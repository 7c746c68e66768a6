//! Modem bring-up after a reset.
use std::time::Duration;

use log::{info, warn};

use crate::modem::{commands, ByteChannel, CommandSession, Result};

/// Liveness check plus the one-time text/charset/notification configuration.
#[derive(Debug, Clone)]
pub struct ModemSetup {
    pub liveness_timeout: Duration,
    /// `AT` checks before giving up (the modem autobauds on the first few).
    pub liveness_attempts: u32,
    pub setup_timeout: Duration,
}

impl ModemSetup {
    /// Check the modem is alive and configure it. Only an unresponsive modem is an error; a rejected
    /// configuration step is logged and skipped.
    pub async fn initialize<C: ByteChannel>(&self, session: &mut CommandSession<C>) -> Result<()> {
        session.flush_input()?;

        let attempts = self.liveness_attempts.max(1);
        let mut alive = Ok(());
        for attempt in 1..=attempts {
            let outcome = session
                .execute(commands::LIVENESS, self.liveness_timeout, false)
                .await?;
            alive = session.require_ok(outcome);
            if alive.is_ok() {
                break;
            }
            warn!("Modem liveness check {}/{} failed", attempt, attempts);
        }
        alive?;
        info!("Modem responding");

        for command in [
            commands::CHARSET_GSM,
            commands::TEXT_MODE,
            commands::NOTIFICATION_ROUTING,
        ] {
            let outcome = session.execute(command, self.setup_timeout, false).await?;
            if let Err(e) = session.require_ok(outcome) {
                warn!("Setup step {} failed: {}", command, e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modem::{ModemError, ProtocolLimits, ScriptedChannel};

    fn setup() -> ModemSetup {
        ModemSetup {
            liveness_timeout: Duration::from_millis(1000),
            liveness_attempts: 3,
            setup_timeout: Duration::from_millis(1000),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn configures_after_late_liveness() {
        let channel = ScriptedChannel::new()
            .with_pending("RDY\r\n+CFUN: 1\r\n")
            .respond("AT", "")
            .respond("AT", "AT\r\r\nOK\r\n")
            .respond_always("AT+CSCS=\"GSM\"", "OK\r\n")
            .respond_always("AT+CMGF=1", "OK\r\n")
            .respond_always("AT+CNMI=1,2,0,0,0", "ERROR\r\n");
        let mut session = CommandSession::new(channel, ProtocolLimits::default());
        setup().initialize(&mut session).await.unwrap();
        let ch = session.channel();
        assert_eq!(ch.count("AT"), 2);
        assert_eq!(ch.count("AT+CNMI=1,2,0,0,0"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_modem_is_an_error() {
        let mut session = CommandSession::new(ScriptedChannel::new(), ProtocolLimits::default());
        let err = setup().initialize(&mut session).await.unwrap_err();
        assert!(matches!(err, ModemError::Timeout(_)));
        assert_eq!(session.channel().count("AT"), 3);
        assert_eq!(session.channel().count("AT+CMGF=1"), 0);
    }
}
