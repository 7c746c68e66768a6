//! Full wake cycles through the decision engine against a scripted modem.

mod common;

use common::{NETWORK_TIME, RECIPIENT};
use trapwatch::cellular::CalendarTimestamp;
use trapwatch::modem::ScriptedChannel;
use trapwatch::node::{
    Decision, EngineSettings, FixedTrap, PowerDecisionEngine, ScriptedTrap, Stage, TrapSensor,
    TrapState,
};
use trapwatch::storage::{FileRecordStore, MemoryRecordStore, PersistedRecord, RecordStore};

fn store_with(previous: Option<i64>) -> MemoryRecordStore {
    MemoryRecordStore::new(previous.map(|t| PersistedRecord::new(CalendarTimestamp(t))))
}

fn engine<T: TrapSensor>(
    trap: T,
    previous: Option<i64>,
) -> PowerDecisionEngine<T, MemoryRecordStore> {
    PowerDecisionEngine::new(
        EngineSettings::from(&common::config()),
        trap,
        store_with(previous),
    )
}

fn armed() -> FixedTrap {
    FixedTrap(TrapState::Armed)
}

fn cmgs() -> String {
    format!("AT+CMGS=\"{}\"", RECIPIENT)
}

#[tokio::test(start_paused = true)]
async fn inside_dead_time_no_alert_and_no_write() {
    let mut session = common::session(common::healthy_modem());
    let mut engine = engine(armed(), Some(NETWORK_TIME - 1700));

    let report = engine.run_cycle(&mut session).await;

    assert_eq!(report.decision, Decision::Suppressed { elapsed_secs: 1700 });
    assert_eq!(report.last_stage(), Stage::Deciding);
    assert!(!report.persisted);
    assert_eq!(engine.store().writes(), 0);
    assert_eq!(session.channel().count(&cmgs()), 0);
    assert_eq!(session.channel().count("\u{1a}"), 0);
}

#[tokio::test(start_paused = true)]
async fn past_dead_time_alerts_and_persists() {
    let mut session = common::session(common::healthy_modem());
    let mut engine = engine(armed(), Some(NETWORK_TIME - 2000));

    let report = engine.run_cycle(&mut session).await;

    assert_eq!(report.decision, Decision::AlertSent);
    assert_eq!(
        report.stages,
        vec![
            Stage::Init,
            Stage::Registering,
            Stage::QueryingSignal,
            Stage::FetchingTime,
            Stage::Deciding,
            Stage::Alerting,
            Stage::Done,
        ]
    );
    assert_eq!(report.signal_rssi, Some(20));
    assert_eq!(report.registered, Some(true));
    assert!(report.persisted);
    assert_eq!(engine.store().writes(), 1);
    assert_eq!(
        engine.store().current(),
        Some(PersistedRecord::new(CalendarTimestamp(NETWORK_TIME)))
    );
    assert_eq!(session.channel().count("\u{1a}"), 1);
    let written = String::from_utf8_lossy(session.channel().written()).into_owned();
    assert!(written.contains("Trap triggered\u{1a}"));
}

#[tokio::test(start_paused = true)]
async fn first_boot_and_future_record_both_alert() {
    let mut session = common::session(common::healthy_modem());
    let report = engine(armed(), None).run_cycle(&mut session).await;
    assert_eq!(report.decision, Decision::AlertSent);
    assert_eq!(report.previous_alert, None);

    let mut session = common::session(common::healthy_modem());
    let mut stale = engine(armed(), Some(NETWORK_TIME + 3600));
    let report = stale.run_cycle(&mut session).await;
    assert_eq!(report.decision, Decision::AlertSent);
    assert_eq!(
        stale.store().current().map(|r| r.last_alert),
        Some(CalendarTimestamp(NETWORK_TIME))
    );
}

#[tokio::test(start_paused = true)]
async fn disarmed_at_wake_touches_nothing() {
    let mut session = common::session(common::healthy_modem());
    let mut engine = engine(FixedTrap(TrapState::Disarmed), None);

    let report = engine.run_cycle(&mut session).await;

    assert_eq!(report.decision, Decision::TrapDisarmed);
    assert_eq!(report.stages, vec![Stage::Done]);
    assert!(session.channel().written().is_empty());
    assert_eq!(engine.store().writes(), 0);
}

#[tokio::test(start_paused = true)]
async fn disarmed_mid_cycle_stops_at_next_checkpoint() {
    let mut session = common::session(common::healthy_modem());
    let trap = ScriptedTrap::new([TrapState::Armed, TrapState::Armed, TrapState::Disarmed]);
    let mut engine = engine(trap, None);

    let report = engine.run_cycle(&mut session).await;

    assert_eq!(report.decision, Decision::TrapDisarmed);
    assert_eq!(report.stages, vec![Stage::Init, Stage::Registering, Stage::Done]);
    assert_eq!(session.channel().count("AT+CSQ"), 0);
    assert_eq!(session.channel().count("AT+CIPGSMLOC=2,1"), 0);
    assert_eq!(engine.trap().reads(), 3);
}

#[tokio::test(start_paused = true)]
async fn silent_modem_ends_cycle_early() {
    let mut session = common::session(ScriptedChannel::new());
    let mut engine = engine(armed(), None);

    let report = engine.run_cycle(&mut session).await;

    assert_eq!(report.decision, Decision::ModemUnresponsive);
    assert_eq!(report.stages, vec![Stage::Init, Stage::Done]);
    assert_eq!(session.channel().count("AT"), 3);
    assert_eq!(session.channel().count("AT+CREG?"), 0);
}

#[tokio::test(start_paused = true)]
async fn no_fix_skips_decision() {
    let channel = common::healthy_modem()
        .respond("AT+CIPGSMLOC=2,1", "\r\n+CIPGSMLOC: 601\r\n\r\nOK\r\n");
    let mut session = common::session(channel);
    let mut engine = engine(armed(), None);

    let report = engine.run_cycle(&mut session).await;

    assert!(matches!(report.decision, Decision::NoTime { .. }));
    assert_eq!(report.last_stage(), Stage::FetchingTime);
    assert_eq!(report.network_time, None);
    assert_eq!(engine.store().writes(), 0);
    assert_eq!(session.channel().count(&cmgs()), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_send_is_not_persisted() {
    let channel = common::healthy_modem().respond("\u{1a}", "\r\n+CMS ERROR: 500\r\n");
    let mut session = common::session(channel);
    let mut engine = engine(armed(), None);

    let report = engine.run_cycle(&mut session).await;

    assert!(matches!(report.decision, Decision::AlertFailed { .. }));
    assert!(!report.persisted);
    assert_eq!(engine.store().writes(), 0);
    // One attempt only
    assert_eq!(session.channel().count("\u{1a}"), 1);
}

#[tokio::test(start_paused = true)]
async fn alerts_disabled_withholds_send() {
    let mut config = common::config();
    config.alert.enabled = false;
    let mut session = common::session(common::healthy_modem());
    let mut engine = PowerDecisionEngine::new(EngineSettings::from(&config), armed(), store_with(None));

    let report = engine.run_cycle(&mut session).await;

    assert_eq!(report.decision, Decision::AlertWithheld);
    assert_eq!(engine.store().writes(), 0);
    assert_eq!(session.channel().count(&cmgs()), 0);
}

#[tokio::test(start_paused = true)]
async fn registration_failure_abort_is_configurable() {
    let unregistered = || {
        common::healthy_modem()
            .respond("AT+CREG?", "\r\n+CREG: 0,2\r\n\r\nOK\r\n")
            .respond("AT+CREG?", "\r\n+CREG: 0,2\r\n\r\nOK\r\n")
            .respond("AT+CREG?", "\r\n+CREG: 0,2\r\n\r\nOK\r\n")
    };

    let mut config = common::config();
    config.registration.abort_on_failure = true;
    let mut session = common::session(unregistered());
    let mut strict =
        PowerDecisionEngine::new(EngineSettings::from(&config), armed(), store_with(None));
    let report = strict.run_cycle(&mut session).await;
    assert_eq!(report.decision, Decision::NotRegistered);
    assert_eq!(report.registered, Some(false));
    assert_eq!(session.channel().count("AT+CGATT=1"), 3);
    assert_eq!(session.channel().count("AT+CSQ"), 0);

    // Default: carry on, the time query may still succeed
    let mut session = common::session(unregistered());
    let report = engine(armed(), None).run_cycle(&mut session).await;
    assert_eq!(report.registered, Some(false));
    assert_eq!(report.decision, Decision::AlertSent);
}

#[tokio::test(start_paused = true)]
async fn file_store_carries_dead_time_across_cycles() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("data").join("last_alert.json");
    let settings = EngineSettings::from(&common::config());

    let mut first = PowerDecisionEngine::new(settings.clone(), armed(), FileRecordStore::new(&path));
    let mut session = common::session(common::healthy_modem());
    assert_eq!(first.run_cycle(&mut session).await.decision, Decision::AlertSent);
    assert_eq!(
        FileRecordStore::new(&path).load().unwrap(),
        Some(PersistedRecord::new(CalendarTimestamp(NETWORK_TIME)))
    );

    // Same network time on the next wake: inside the dead time
    let mut second = PowerDecisionEngine::new(settings, armed(), FileRecordStore::new(&path));
    let mut session = common::session(common::healthy_modem());
    let report = second.run_cycle(&mut session).await;
    assert_eq!(report.decision, Decision::Suppressed { elapsed_secs: 0 });
    assert_eq!(session.channel().count(&cmgs()), 0);
}
