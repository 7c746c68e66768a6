//! Binary entrypoint for the trapwatch CLI.
//!
//! Commands:
//! - `run [--port <path>] [--no-alert]` - one wake cycle, then release the power hold
//! - `init` - create a starter `trapwatch.toml`
//! - `status` - print the persisted last-alert record as JSON
//! - `smoke-test --port <path> [-b <baud>] [--timeout <s>]` - check the modem link
//!
//! See the library crate docs for module-level details: `trapwatch::`.
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{debug, error, info, warn};

use trapwatch::config::{Config, DEFAULT_CONFIG_PATH};
use trapwatch::node::{
    run_then_release, FixedTrap, GpioLine, GpioPowerHold, GpioTrap, TrapSensor, TrapState,
};
use trapwatch::storage::{FileRecordStore, RecordStore};

#[derive(Parser)]
#[command(name = "trapwatch")]
#[command(about = "Cellular alert firmware for field trap sensor nodes")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one wake cycle and release the power hold
    Run {
        /// Modem serial port (e.g., /dev/ttyS1)
        #[arg(short, long)]
        port: Option<String>,

        /// Decide as usual but never send the SMS
        #[arg(long)]
        no_alert: bool,
    },
    /// Write a default configuration file
    Init,
    /// Show the persisted last-alert record
    Status,
    /// Check the modem: liveness, setup and signal quality
    SmokeTest {
        /// Modem serial port
        #[arg(short, long)]
        port: String,
        /// Baud rate
        #[arg(short = 'b', long, default_value_t = 9600)]
        baud: u32,
        /// Seconds any single response may take
        #[arg(short, long, default_value_t = 10)]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    init_logging(&pre_config, cli.verbose);

    match cli.command {
        Commands::Run { port, no_alert } => {
            let mut config = match pre_config {
                Some(c) => c,
                None => Config::load(&cli.config).await?,
            };
            if no_alert {
                config.alert.enabled = false;
            }
            if let Some(p) = port {
                config.modem.port = p;
            }

            let mut power = GpioPowerHold::new(config.pins.power_hold.as_ref().map(GpioLine::new));
            run_then_release(&mut power, run_cycle(&config)).await?;
        }
        Commands::Init => {
            Config::create_default(&cli.config).await?;
            println!("Wrote default configuration to {}", cli.config);
            println!("Set [alert] recipient before the first run.");
        }
        Commands::Status => {
            let config = pre_config.unwrap_or_default();
            let store = FileRecordStore::new(&config.storage.state_file);
            let record = store.load()?;
            let payload = serde_json::json!({
                "state_file": config.storage.state_file,
                "last_alert": record.map(|r| r.last_alert.seconds()),
                "last_alert_utc": record
                    .and_then(|r| r.last_alert.to_datetime())
                    .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
                "dead_time_secs": config.alert.dead_time_secs,
                "alerts_enabled": config.alert.enabled,
            });
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        Commands::SmokeTest {
            port,
            baud,
            timeout,
        } => {
            #[cfg(not(feature = "serial"))]
            {
                let _ = (port, baud, timeout);
                error!("smoke-test requires the 'serial' feature");
                std::process::exit(2);
            }
            #[cfg(feature = "serial")]
            {
                smoke_test(pre_config.unwrap_or_default(), port, baud, timeout).await?;
            }
        }
    }

    Ok(())
}

#[cfg(feature = "serial")]
async fn run_cycle(config: &Config) -> Result<()> {
    use std::time::Duration;
    use trapwatch::modem::{CommandSession, ProtocolLimits, SerialModem};
    use trapwatch::node::{EngineSettings, PowerDecisionEngine};

    config.validate()?;
    info!("Starting trapwatch v{}", env!("CARGO_PKG_VERSION"));

    let trap: Box<dyn TrapSensor> = match &config.pins.trap_input {
        Some(path) => Box::new(GpioTrap::new(
            GpioLine::new(path),
            config.pins.trap_disarmed_level,
        )),
        None => {
            warn!("No trap input configured; assuming armed");
            Box::new(FixedTrap(TrapState::Armed))
        }
    };
    let store = FileRecordStore::new(&config.storage.state_file);

    let modem = SerialModem::open(
        &config.modem.port,
        config.modem.baud_rate,
        Duration::from_millis(config.modem.reset_pulse_ms),
        Duration::from_millis(config.modem.settle_ms),
    )
    .await
    .map_err(|e| anyhow!("Failed to open modem on {}: {}", config.modem.port, e))?;
    debug!("Modem ready on {}", modem.port_name());
    let mut session = CommandSession::new(modem, ProtocolLimits::from(config));

    let mut engine = PowerDecisionEngine::new(EngineSettings::from(config), trap, store);
    let report = engine.run_cycle(&mut session).await;
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

#[cfg(not(feature = "serial"))]
async fn run_cycle(_config: &Config) -> Result<()> {
    Err(anyhow!("run requires the 'serial' feature"))
}

#[cfg(feature = "serial")]
async fn smoke_test(mut config: Config, port: String, baud: u32, timeout: u64) -> Result<()> {
    use std::time::Duration;
    use trapwatch::cellular::{ModemSetup, SignalQualityMonitor};
    use trapwatch::metrics;
    use trapwatch::modem::{CommandSession, ProtocolLimits, SerialModem};

    config.protocol.response_ceiling_ms = timeout.saturating_mul(1000);
    info!("Starting smoke test on {} @ {} baud", port, baud);
    let modem = SerialModem::open(
        &port,
        baud,
        Duration::from_millis(config.modem.reset_pulse_ms),
        Duration::from_millis(config.modem.settle_ms),
    )
    .await?;
    let mut session = CommandSession::new(modem, ProtocolLimits::from(&config));

    let setup = ModemSetup::from(&config.protocol).initialize(&mut session).await;
    let signal = match &setup {
        Ok(()) => SignalQualityMonitor::from(&config.protocol)
            .refresh(&mut session)
            .await
            .ok(),
        Err(_) => None,
    };
    let status_ok = setup.is_ok();
    if let Err(e) = &setup {
        warn!("Modem did not answer: {}", e);
    }

    let payload = serde_json::json!({
        "status": if status_ok { "ok" } else { "unresponsive" },
        "port": port,
        "baud": baud,
        "signal": signal.map(|s| s.to_string()),
        "signal_dbm": signal.and_then(|s| s.dbm()),
        "metrics": metrics::snapshot(),
        "timeout_seconds": timeout,
    });
    println!("{}", payload);
    std::process::exit(if status_ok { 0 } else { 1 });
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|c| c.logging.level.parse::<log::LevelFilter>().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .as_ref()
        .and_then(|c| c.logging.file.as_ref())
        .and_then(|file| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .ok()
        });

    if let Some(f) = log_file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Unattended boots have no terminal; only the file gets the lines then
        let is_tty = atty::is(atty::Stream::Stdout);

        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}
