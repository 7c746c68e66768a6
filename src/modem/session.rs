//! One-command-at-a-time AT session.
//!
//! [`CommandSession`] exclusively owns the channel and the response buffer, so no two
//! commands can be in flight and every command starts from a cleared buffer.
use std::time::Duration;

use log::{debug, warn};
use tokio::time::Instant;

use super::collector::{CommandOutcome, ResponseBuffer, ResponseCollector};
use super::timeout::{SignalQuality, TimeoutPolicy};
use super::{ByteChannel, ModemError, Result};
use crate::logutil::{escape_bytes, escape_log};
use crate::metrics;

/// Framing and timing limits for a session, usually built from
/// [`crate::config::ProtocolConfig`].
#[derive(Debug, Clone)]
pub struct ProtocolLimits {
    pub max_rows: usize,
    pub line_capacity: usize,
    pub poll_tick: Duration,
    /// Hard bound on a single collection even if bytes keep arriving.
    pub response_ceiling: Duration,
    /// Appended to every command line.
    pub terminator: Vec<u8>,
    pub policy: TimeoutPolicy,
}

impl Default for ProtocolLimits {
    fn default() -> Self {
        Self {
            max_rows: 10,
            line_capacity: 96,
            poll_tick: Duration::from_millis(20),
            response_ceiling: Duration::from_secs(180),
            terminator: b"\r".to_vec(),
            policy: TimeoutPolicy::default(),
        }
    }
}

pub struct CommandSession<C> {
    channel: C,
    buffer: ResponseBuffer,
    collector: ResponseCollector,
    policy: TimeoutPolicy,
    terminator: Vec<u8>,
    signal: SignalQuality,
    last_budget: Duration,
}

impl<C: ByteChannel> CommandSession<C> {
    pub fn new(channel: C, limits: ProtocolLimits) -> Self {
        Self {
            channel,
            buffer: ResponseBuffer::new(limits.max_rows, limits.line_capacity),
            collector: ResponseCollector::new(limits.poll_tick, limits.response_ceiling),
            policy: limits.policy,
            terminator: limits.terminator,
            signal: SignalQuality::Unknown,
            last_budget: Duration::ZERO,
        }
    }

    /// Send `command` followed by the command terminator and collect the response.
    ///
    /// The inactivity budget is `base` run through the [`TimeoutPolicy`] with the session's
    /// last known signal quality. Only transport failures are errors; a timeout or an error
    /// marker is reported through the returned [`CommandOutcome`].
    pub async fn execute(
        &mut self,
        command: &str,
        base: Duration,
        network_dependent: bool,
    ) -> Result<CommandOutcome> {
        let mut payload = Vec::with_capacity(command.len() + self.terminator.len());
        payload.extend_from_slice(command.as_bytes());
        payload.extend_from_slice(&self.terminator);
        self.transact(&payload, base, network_dependent).await
    }

    /// Like [`execute`](Self::execute) but writes `payload` verbatim, without a terminator.
    pub async fn execute_raw(
        &mut self,
        payload: &[u8],
        base: Duration,
        network_dependent: bool,
    ) -> Result<CommandOutcome> {
        self.transact(payload, base, network_dependent).await
    }

    /// Write text without waiting for any response (SMS body after the `>` prompt).
    pub fn write_text(&mut self, text: &str) -> Result<()> {
        debug!("-> {}", escape_log(text));
        self.channel.write_all(text.as_bytes())
    }

    async fn transact(
        &mut self,
        payload: &[u8],
        base: Duration,
        network_dependent: bool,
    ) -> Result<CommandOutcome> {
        let budget = self.policy.effective(base, network_dependent, self.signal);
        self.last_budget = budget;
        debug!("-> {} (budget {:?})", escape_bytes(payload), budget);
        self.channel.write_all(payload)?;
        metrics::inc_command_sent();

        let started = Instant::now();
        let outcome = self
            .collector
            .collect(&mut self.channel, &mut self.buffer, budget)
            .await?;
        for row in self.buffer.rows() {
            debug!("<- {}", escape_log(&row));
        }

        match outcome {
            CommandOutcome::Completed(_) => metrics::observe_command_completed(started),
            CommandOutcome::Rejected(row) => {
                metrics::inc_command_rejected();
                warn!(
                    "{} rejected: {}",
                    escape_bytes(payload),
                    self.buffer.text(row).unwrap_or_default()
                );
            }
            CommandOutcome::TimedOut(rows) => {
                metrics::inc_command_timeout();
                if self.buffer.pending().is_empty() {
                    warn!("{} timed out after {:?} quiet; {} rows", escape_bytes(payload), budget, rows);
                } else {
                    warn!(
                        "{} timed out after {:?} quiet; {} rows, partial {:?}",
                        escape_bytes(payload),
                        budget,
                        rows,
                        escape_bytes(self.buffer.pending())
                    );
                }
            }
        }
        Ok(outcome)
    }

    /// Turn a non-`OK` outcome into an error.
    pub fn require_ok(&self, outcome: CommandOutcome) -> Result<()> {
        match outcome {
            CommandOutcome::Completed(_) => Ok(()),
            CommandOutcome::Rejected(row) => Err(ModemError::Rejected(
                self.buffer.text(row).unwrap_or_default().into_owned(),
            )),
            CommandOutcome::TimedOut(_) => Err(ModemError::Timeout(self.last_budget)),
        }
    }

    /// Rows of the most recent response. Valid until the next command.
    pub fn buffer(&self) -> &ResponseBuffer {
        &self.buffer
    }

    pub fn signal(&self) -> SignalQuality {
        self.signal
    }

    /// Record the latest signal quality; later network-dependent budgets scale with it.
    pub fn set_signal(&mut self, signal: SignalQuality) {
        self.signal = signal;
    }

    pub fn policy(&self) -> &TimeoutPolicy {
        &self.policy
    }

    /// Budget used by the most recent command.
    pub fn last_budget(&self) -> Duration {
        self.last_budget
    }

    /// Drop stale bytes (boot banners, unsolicited result codes) before a new exchange.
    pub fn flush_input(&mut self) -> Result<usize> {
        let dropped = self.channel.discard_input()?;
        if dropped > 0 {
            debug!("Discarded {} stale bytes from modem", dropped);
        }
        Ok(dropped)
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }
}
