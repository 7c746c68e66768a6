//! SMS alert transmission.
use std::time::Duration;

use log::{info, warn};

use crate::metrics;
use crate::modem::commands::{self, CMGS_PREFIX, MESSAGE_TERMINATOR};
use crate::modem::{ByteChannel, CommandOutcome, CommandSession, Result};
use crate::validation::{sanitize_sms_body, validate_recipient};

#[derive(Debug, Clone)]
pub struct AlertSender {
    pub recipient: String,
    /// Budget for text mode and the `AT+CMGS` prompt.
    pub step_timeout: Duration,
    /// Budget after the Ctrl-Z terminator; network dependent.
    pub send_timeout: Duration,
}

impl AlertSender {
    /// Text mode, `AT+CMGS="<recipient>"`, the body, then Ctrl-Z, waiting on the network
    /// for the final `+CMGS: <ref>` / `OK`.
    ///
    /// The outcome of the final step is returned as-is; a failure is logged and never
    /// retried. Recipient or body validation failures return an error before anything is
    /// written.
    pub async fn send_alert<C: ByteChannel>(
        &self,
        session: &mut CommandSession<C>,
        message: &str,
    ) -> Result<CommandOutcome> {
        let recipient = validate_recipient(&self.recipient)?;
        let body = sanitize_sms_body(message)?;

        let outcome = session
            .execute(commands::TEXT_MODE, self.step_timeout, false)
            .await?;
        if let Err(e) = session.require_ok(outcome) {
            warn!("Text mode not confirmed: {}", e);
        }

        // The modem answers with a bare "> " prompt and no line end, so a quiet timeout is
        // the expected outcome here. Only an explicit error aborts.
        let outcome = session
            .execute(&commands::send_message(&recipient), self.step_timeout, false)
            .await?;
        if let CommandOutcome::Rejected(_) = outcome {
            warn!("Modem refused SMS to {}: {:?}", recipient, session.require_ok(outcome));
            return Ok(outcome);
        }

        session.write_text(&body)?;
        let outcome = session
            .execute_raw(&[MESSAGE_TERMINATOR], self.send_timeout, true)
            .await?;
        match outcome {
            CommandOutcome::Completed(_) => {
                metrics::inc_alert_sent();
                let reference = session.buffer().find_prefixed(CMGS_PREFIX).unwrap_or_default();
                info!("Alert sent to {} (ref {})", recipient, reference);
            }
            other => warn!("Alert to {} not confirmed: {:?}", recipient, other),
        }
        Ok(outcome)
    }
}
