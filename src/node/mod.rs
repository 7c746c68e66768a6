//! # Node Orchestration
//!
//! - [`engine`] - the wake-cycle state machine that decides whether to alert
//! - [`pins`] - trap position input and power hold output

pub mod engine;
pub mod pins;

pub use engine::{CycleReport, Decision, EngineSettings, PowerDecisionEngine, Stage};
pub use pins::{
    run_then_release, FixedTrap, GpioLine, GpioPowerHold, GpioTrap, LineLevel, PowerHold,
    RecordingPowerHold, ScriptedTrap, TrapSensor, TrapState,
};
