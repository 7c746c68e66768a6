//! # Trapwatch - Field Trap Monitor Firmware
//!
//! Trapwatch runs on a battery-powered trap node with a SIM800-class cellular modem. Each
//! time the trap fires, the node powers up, talks to the modem over a serial line, fetches
//! the network time, and sends an SMS alert unless one went out recently. Then it drops
//! its own power hold.
//!
//! ## Features
//!
//! - **AT Command Engine**: Line framing with bounded rows and columns, `OK`/`ERROR` marker detection and inactivity timeouts.
//! - **Signal-Aware Timeouts**: Network-dependent commands wait longer when the last `+CSQ` reading is weak or unknown.
//! - **Network Time**: Bearer setup and `+CIPGSMLOC` parsing with an explicit year interpretation policy.
//! - **Alert Dead Time**: The last alert time is persisted atomically; repeat triggers inside the dead time stay quiet.
//! - **Early Abort**: The trap position is rechecked between steps so a disarmed trap powers down immediately.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use trapwatch::config::Config;
//! use trapwatch::modem::{CommandSession, ProtocolLimits, ScriptedChannel};
//! use trapwatch::node::{EngineSettings, FixedTrap, PowerDecisionEngine, TrapState};
//! use trapwatch::storage::FileRecordStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("trapwatch.toml").await?;
//!     let mut session = CommandSession::new(ScriptedChannel::new(), ProtocolLimits::from(&config));
//!     let mut engine = PowerDecisionEngine::new(
//!         EngineSettings::from(&config),
//!         FixedTrap(TrapState::Armed),
//!         FileRecordStore::new(&config.storage.state_file),
//!     );
//!     let report = engine.run_cycle(&mut session).await;
//!     println!("{:?}", report.decision);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`modem`] - byte channel, response collection, timeout policy and command session
//! - [`cellular`] - setup, registration, signal quality, network time and SMS alerts
//! - [`node`] - decision engine and digital I/O
//! - [`storage`] - persisted last-alert record
//! - [`config`] - configuration management and validation
//! - [`validation`] - recipient and message checks
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │ PowerDecisionEngine │ ← One wake cycle
//! └─────────────────────┘
//!          │
//! ┌─────────────────────┐
//! │ Cellular services   │ ← Registration, signal, time, alert
//! └─────────────────────┘
//!          │
//! ┌─────────────────────┐
//! │ CommandSession      │ ← One AT command at a time
//! └─────────────────────┘
//!          │
//! ┌─────────────────────┐
//! │ ByteChannel         │ ← Serial port or scripted replies
//! └─────────────────────┘
//! ```

pub mod cellular;
pub mod config;
pub mod logutil;
pub mod metrics;
pub mod modem;
pub mod node;
pub mod storage;
pub mod validation;
