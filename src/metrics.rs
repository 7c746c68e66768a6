//! Process-wide protocol counters.
//! Logged at the end of a decision cycle and printed by `smoke-test`.
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Instant;

static COMMANDS_SENT: AtomicU64 = AtomicU64::new(0);
static COMMANDS_COMPLETED: AtomicU64 = AtomicU64::new(0);
static COMMANDS_REJECTED: AtomicU64 = AtomicU64::new(0);
static COMMAND_TIMEOUTS: AtomicU64 = AtomicU64::new(0);
static LINE_OVERFLOWS: AtomicU64 = AtomicU64::new(0);
static ALERTS_SENT: AtomicU64 = AtomicU64::new(0);
static RESPONSE_LATENCY_SUM_MS: AtomicU64 = AtomicU64::new(0);
static RESPONSE_LATENCY_MAX_MS: AtomicU64 = AtomicU64::new(0);

pub fn inc_command_sent() {
    COMMANDS_SENT.fetch_add(1, Ordering::Relaxed);
}

pub fn observe_command_completed(started: Instant) {
    let ms = started.elapsed().as_millis() as u64;
    COMMANDS_COMPLETED.fetch_add(1, Ordering::Relaxed);
    RESPONSE_LATENCY_SUM_MS.fetch_add(ms, Ordering::Relaxed);
    RESPONSE_LATENCY_MAX_MS.fetch_max(ms, Ordering::Relaxed);
}

pub fn inc_command_rejected() {
    COMMANDS_REJECTED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_command_timeout() {
    COMMAND_TIMEOUTS.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_line_overflow() {
    LINE_OVERFLOWS.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_alert_sent() {
    ALERTS_SENT.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub commands_sent: u64,
    pub commands_completed: u64,
    pub commands_rejected: u64,
    pub command_timeouts: u64,
    pub line_overflows: u64,
    pub alerts_sent: u64,
    pub avg_response_ms: Option<f64>,
    pub max_response_ms: u64,
}

pub fn snapshot() -> Snapshot {
    let completed = COMMANDS_COMPLETED.load(Ordering::Relaxed);
    let sum = RESPONSE_LATENCY_SUM_MS.load(Ordering::Relaxed);
    Snapshot {
        commands_sent: COMMANDS_SENT.load(Ordering::Relaxed),
        commands_completed: completed,
        commands_rejected: COMMANDS_REJECTED.load(Ordering::Relaxed),
        command_timeouts: COMMAND_TIMEOUTS.load(Ordering::Relaxed),
        line_overflows: LINE_OVERFLOWS.load(Ordering::Relaxed),
        alerts_sent: ALERTS_SENT.load(Ordering::Relaxed),
        avg_response_ms: if completed > 0 {
            Some(sum as f64 / completed as f64)
        } else {
            None
        },
        max_response_ms: RESPONSE_LATENCY_MAX_MS.load(Ordering::Relaxed),
    }
}
