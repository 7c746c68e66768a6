//! One wake cycle of the node, as a state machine.
//!
//! ```text
//! Init -> Registering -> QueryingSignal -> FetchingTime -> Deciding -> (Alerting) -> Done
//! ```
//!
//! The trap position is polled before every stage; a disarmed trap jumps straight to
//! `Done` so the node can drop power as early as possible. No step error escapes
//! [`PowerDecisionEngine::run_cycle`]: each one is logged and mapped to a [`Decision`].
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::Serialize;

use crate::cellular::{
    AlertSender, CalendarTimestamp, ModemSetup, NetworkTimeClient, RegistrationWaiter,
    SignalQualityMonitor,
};
use crate::config::Config;
use crate::metrics;
use crate::modem::{ByteChannel, CommandOutcome, CommandSession, ModemError, SignalQuality};
use crate::node::pins::{TrapSensor, TrapState};
use crate::storage::{PersistedRecord, RecordStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Init,
    Registering,
    QueryingSignal,
    FetchingTime,
    Deciding,
    Alerting,
    Done,
}

/// Why the cycle ended the way it did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decision {
    /// The cycle has not reached a decision yet.
    Pending,
    /// The trap read disarmed at a checkpoint.
    TrapDisarmed,
    /// No `OK` to the liveness check.
    ModemUnresponsive,
    /// Registration failed and `abort_on_failure` is set.
    NotRegistered,
    /// No usable network time, so no decision could be made.
    NoTime { reason: String },
    /// The previous alert is younger than the dead time.
    Suppressed { elapsed_secs: i64 },
    /// An alert was due but alerts are disabled for this run.
    AlertWithheld,
    AlertSent,
    AlertFailed { reason: String },
}

/// Summary of one cycle, logged by the binary and inspected by tests.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    /// Stages entered, in order, ending with `Done`.
    pub stages: Vec<Stage>,
    pub decision: Decision,
    pub registered: Option<bool>,
    pub signal_rssi: Option<u8>,
    pub network_time: Option<CalendarTimestamp>,
    pub previous_alert: Option<CalendarTimestamp>,
    pub persisted: bool,
}

impl CycleReport {
    fn new() -> Self {
        Self {
            stages: Vec::new(),
            decision: Decision::Pending,
            registered: None,
            signal_rssi: None,
            network_time: None,
            previous_alert: None,
            persisted: false,
        }
    }

    /// Last stage entered before `Done`.
    pub fn last_stage(&self) -> Stage {
        self.stages
            .iter()
            .rev()
            .copied()
            .find(|s| *s != Stage::Done)
            .unwrap_or(Stage::Init)
    }

    pub fn alert_sent(&self) -> bool {
        self.decision == Decision::AlertSent
    }
}

/// Everything the engine needs besides the session, trap and store.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub setup: ModemSetup,
    pub registration: RegistrationWaiter,
    pub registration_attempts: u32,
    pub abort_on_registration_failure: bool,
    pub signal: SignalQualityMonitor,
    pub time: NetworkTimeClient,
    pub alert: AlertSender,
    pub alert_message: String,
    pub alerts_enabled: bool,
    pub dead_time: Duration,
}

impl From<&Config> for EngineSettings {
    fn from(c: &Config) -> Self {
        EngineSettings {
            setup: ModemSetup::from(&c.protocol),
            registration: RegistrationWaiter::from(c),
            registration_attempts: c.registration.max_attempts,
            abort_on_registration_failure: c.registration.abort_on_failure,
            signal: SignalQualityMonitor::from(&c.protocol),
            time: NetworkTimeClient::from(c),
            alert: AlertSender::from(c),
            alert_message: c.alert.message.clone(),
            alerts_enabled: c.alert.enabled,
            dead_time: c.dead_time(),
        }
    }
}

pub struct PowerDecisionEngine<T, S> {
    settings: EngineSettings,
    trap: T,
    store: S,
}

impl<T: TrapSensor, S: RecordStore> PowerDecisionEngine<T, S> {
    pub fn new(settings: EngineSettings, trap: T, store: S) -> Self {
        Self {
            settings,
            trap,
            store,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn trap(&self) -> &T {
        &self.trap
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run one full cycle against `session`.
    pub async fn run_cycle<C: ByteChannel>(&mut self, session: &mut CommandSession<C>) -> CycleReport {
        let mut report = CycleReport::new();
        let mut stage = Stage::Init;
        let mut network_time = None;

        loop {
            if stage != Stage::Done && self.trap_disarmed() {
                info!("Trap disarmed before {:?}; ending cycle", stage);
                report.decision = Decision::TrapDisarmed;
                stage = Stage::Done;
            }
            report.stages.push(stage);
            debug!("Entering stage {:?}", stage);

            stage = match stage {
                Stage::Init => match self.settings.setup.initialize(session).await {
                    Ok(()) => Stage::Registering,
                    Err(e) => {
                        error!("Modem did not come up: {}", e);
                        report.decision = Decision::ModemUnresponsive;
                        Stage::Done
                    }
                },
                Stage::Registering => {
                    let attempts = self.settings.registration_attempts;
                    let registered = match self
                        .settings
                        .registration
                        .wait_for_registration(session, attempts)
                        .await
                    {
                        Ok(r) => r,
                        Err(e) => {
                            warn!("Registration wait failed: {}", e);
                            false
                        }
                    };
                    report.registered = Some(registered);
                    if !registered && self.settings.abort_on_registration_failure {
                        warn!("{}", ModemError::RegistrationFailed(attempts));
                        report.decision = Decision::NotRegistered;
                        Stage::Done
                    } else {
                        Stage::QueryingSignal
                    }
                }
                Stage::QueryingSignal => {
                    match self.settings.signal.refresh(session).await {
                        Ok(SignalQuality::Rssi(code)) => report.signal_rssi = Some(code),
                        Ok(SignalQuality::Unknown) => {}
                        Err(e) => warn!("Signal quality unavailable ({}); using unknown", e),
                    }
                    Stage::FetchingTime
                }
                Stage::FetchingTime => match self.settings.time.fetch_time(session).await {
                    Ok(ts) => {
                        network_time = Some(ts);
                        report.network_time = Some(ts);
                        Stage::Deciding
                    }
                    Err(e) => {
                        warn!("No network time this cycle: {}", e);
                        report.decision = Decision::NoTime {
                            reason: e.to_string(),
                        };
                        Stage::Done
                    }
                },
                Stage::Deciding => match network_time {
                    Some(now) => {
                        report.previous_alert = self.load_previous();
                        match self.alert_due(now, report.previous_alert) {
                            Ok(()) => Stage::Alerting,
                            Err(elapsed_secs) => {
                                report.decision = Decision::Suppressed { elapsed_secs };
                                Stage::Done
                            }
                        }
                    }
                    None => {
                        report.decision = Decision::NoTime {
                            reason: "no timestamp".to_string(),
                        };
                        Stage::Done
                    }
                },
                Stage::Alerting => {
                    if let Some(now) = network_time {
                        self.alert(session, now, &mut report).await;
                    }
                    Stage::Done
                }
                Stage::Done => break,
            };
        }

        info!("Cycle finished: {:?}", report.decision);
        match serde_json::to_string(&metrics::snapshot()) {
            Ok(json) => info!("Modem metrics: {}", json),
            Err(e) => debug!("Metrics snapshot not serializable: {}", e),
        }
        report
    }

    fn trap_disarmed(&mut self) -> bool {
        match self.trap.read() {
            Ok(state) => state == TrapState::Disarmed,
            Err(e) => {
                warn!("Trap input unreadable ({}); assuming armed", e);
                false
            }
        }
    }

    fn load_previous(&self) -> Option<CalendarTimestamp> {
        match self.store.load() {
            Ok(record) => record.map(|r| r.last_alert),
            Err(e) => {
                warn!("Last alert record unreadable ({}); treating as missing", e);
                None
            }
        }
    }

    /// `Err(elapsed)` when the previous alert is still inside the dead time.
    fn alert_due(&self, now: CalendarTimestamp, previous: Option<CalendarTimestamp>) -> Result<(), i64> {
        let Some(previous) = previous else {
            info!("No previous alert on record");
            return Ok(());
        };
        let elapsed = now.seconds_since(previous);
        if elapsed < 0 {
            warn!(
                "Last alert {} is after network time {}; treating record as stale",
                previous, now
            );
            return Ok(());
        }
        let dead_time = self.settings.dead_time.as_secs() as i64;
        if elapsed < dead_time {
            info!(
                "Last alert {}s ago, inside the {}s dead time; suppressing",
                elapsed, dead_time
            );
            return Err(elapsed);
        }
        info!("Last alert {}s ago; alert due", elapsed);
        Ok(())
    }

    async fn alert<C: ByteChannel>(
        &mut self,
        session: &mut CommandSession<C>,
        now: CalendarTimestamp,
        report: &mut CycleReport,
    ) {
        if !self.settings.alerts_enabled {
            info!("Alert due but alerts are disabled for this run");
            report.decision = Decision::AlertWithheld;
            return;
        }
        let sent = self
            .settings
            .alert
            .send_alert(session, &self.settings.alert_message)
            .await;
        match sent {
            Ok(CommandOutcome::Completed(_)) => {
                report.decision = Decision::AlertSent;
                match self.store.store(&PersistedRecord::new(now)) {
                    Ok(()) => report.persisted = true,
                    Err(e) => error!("Failed to persist alert time {}: {}", now, e),
                }
            }
            Ok(outcome) => {
                report.decision = Decision::AlertFailed {
                    reason: format!("{:?}", outcome),
                };
            }
            Err(e) => {
                error!("Alert not sent: {}", e);
                report.decision = Decision::AlertFailed {
                    reason: e.to_string(),
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::pins::FixedTrap;
    use crate::storage::MemoryRecordStore;

    fn engine(previous: Option<i64>) -> PowerDecisionEngine<FixedTrap, MemoryRecordStore> {
        let mut config = Config::default();
        config.alert.recipient = Some("+64215550100".to_string());
        PowerDecisionEngine::new(
            EngineSettings::from(&config),
            FixedTrap(TrapState::Armed),
            MemoryRecordStore::new(previous.map(|t| PersistedRecord::new(CalendarTimestamp(t)))),
        )
    }

    #[test]
    fn dead_time_boundary() {
        let e = engine(None);
        let t = CalendarTimestamp(1_705_326_302);
        assert_eq!(e.alert_due(CalendarTimestamp(t.0 + 1700), Some(t)), Err(1700));
        assert_eq!(e.alert_due(CalendarTimestamp(t.0 + 1799), Some(t)), Err(1799));
        assert_eq!(e.alert_due(CalendarTimestamp(t.0 + 1800), Some(t)), Ok(()));
        assert_eq!(e.alert_due(CalendarTimestamp(t.0 + 2000), Some(t)), Ok(()));
    }

    #[test]
    fn missing_or_future_record_permits_alert() {
        let e = engine(None);
        let now = CalendarTimestamp(1_705_326_302);
        assert_eq!(e.alert_due(now, None), Ok(()));
        assert_eq!(e.alert_due(now, Some(CalendarTimestamp(now.0 + 60))), Ok(()));
    }

    #[test]
    fn last_stage_skips_done() {
        let mut report = CycleReport::new();
        report.stages = vec![Stage::Init, Stage::Registering, Stage::Done];
        assert_eq!(report.last_stage(), Stage::Registering);
    }
}
