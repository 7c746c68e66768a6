//! Digital I/O of the node: the trap position input and the power hold output.
//!
//! Lines are exposed by the board support package as sysfs-style value files containing
//! `0` or `1`. Tests and bench runs use [`FixedTrap`], [`ScriptedTrap`] and
//! [`RecordingPowerHold`] instead.
use std::collections::VecDeque;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};

/// Electrical level of a digital line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineLevel {
    #[default]
    High,
    Low,
}

impl LineLevel {
    fn as_value(&self) -> &'static str {
        match self {
            LineLevel::High => "1",
            LineLevel::Low => "0",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrapState {
    Armed,
    Disarmed,
}

/// Source of the trap position, polled at the engine checkpoints.
pub trait TrapSensor {
    fn read(&mut self) -> Result<TrapState>;
}

/// The line that keeps the node powered. Releasing it ends the wake cycle.
pub trait PowerHold {
    fn release(&mut self) -> Result<()>;
}

/// Await `cycle`, then release `hold` no matter how the cycle ended. A failed release is
/// logged and the cycle's own result is returned.
pub async fn run_then_release<P, F, R>(hold: &mut P, cycle: F) -> Result<R>
where
    P: PowerHold + ?Sized,
    F: Future<Output = Result<R>>,
{
    let outcome = cycle.await;
    if let Err(e) = hold.release() {
        error!("Failed to release power hold: {}", e);
    }
    outcome
}

impl<T: TrapSensor + ?Sized> TrapSensor for Box<T> {
    fn read(&mut self) -> Result<TrapState> {
        (**self).read()
    }
}

/// A sysfs-style GPIO value file.
#[derive(Debug, Clone)]
pub struct GpioLine {
    path: PathBuf,
}

impl GpioLine {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read_level(&self) -> Result<LineLevel> {
        let raw = fs::read_to_string(&self.path)
            .map_err(|e| anyhow!("Failed to read line {}: {}", self.path.display(), e))?;
        match raw.trim() {
            "0" => Ok(LineLevel::Low),
            "1" => Ok(LineLevel::High),
            other => Err(anyhow!(
                "Unexpected value {:?} on line {}",
                other,
                self.path.display()
            )),
        }
    }

    pub fn write_level(&self, level: LineLevel) -> Result<()> {
        fs::write(&self.path, level.as_value())
            .map_err(|e| anyhow!("Failed to write line {}: {}", self.path.display(), e))
    }
}

/// Trap switch wired to a GPIO input.
#[derive(Debug, Clone)]
pub struct GpioTrap {
    line: GpioLine,
    disarmed_level: LineLevel,
}

impl GpioTrap {
    pub fn new(line: GpioLine, disarmed_level: LineLevel) -> Self {
        Self {
            line,
            disarmed_level,
        }
    }
}

impl TrapSensor for GpioTrap {
    fn read(&mut self) -> Result<TrapState> {
        let level = self.line.read_level()?;
        Ok(if level == self.disarmed_level {
            TrapState::Disarmed
        } else {
            TrapState::Armed
        })
    }
}

/// Power hold on a GPIO output, released by driving it low. Without a line the release is
/// only logged (bench supply).
#[derive(Debug, Clone, Default)]
pub struct GpioPowerHold {
    line: Option<GpioLine>,
}

impl GpioPowerHold {
    pub fn new(line: Option<GpioLine>) -> Self {
        Self { line }
    }
}

impl PowerHold for GpioPowerHold {
    fn release(&mut self) -> Result<()> {
        match &self.line {
            Some(line) => {
                info!("Releasing power hold on {}", line.path().display());
                line.write_level(LineLevel::Low)
            }
            None => {
                info!("No power hold line configured; cycle complete");
                Ok(())
            }
        }
    }
}

/// Always reports the same position.
#[derive(Debug, Clone, Copy)]
pub struct FixedTrap(pub TrapState);

impl TrapSensor for FixedTrap {
    fn read(&mut self) -> Result<TrapState> {
        Ok(self.0)
    }
}

/// Reports queued positions one per read, then repeats the last one.
#[derive(Debug, Clone)]
pub struct ScriptedTrap {
    states: VecDeque<TrapState>,
    last: TrapState,
    reads: usize,
}

impl ScriptedTrap {
    pub fn new<I: IntoIterator<Item = TrapState>>(states: I) -> Self {
        Self {
            states: states.into_iter().collect(),
            last: TrapState::Armed,
            reads: 0,
        }
    }

    pub fn reads(&self) -> usize {
        self.reads
    }
}

impl TrapSensor for ScriptedTrap {
    fn read(&mut self) -> Result<TrapState> {
        if let Some(next) = self.states.pop_front() {
            self.last = next;
        }
        self.reads += 1;
        Ok(self.last)
    }
}

/// Counts releases instead of touching hardware.
#[derive(Debug, Clone, Default)]
pub struct RecordingPowerHold {
    pub releases: usize,
}

impl PowerHold for RecordingPowerHold {
    fn release(&mut self) -> Result<()> {
        debug!("Power hold released (recorded)");
        self.releases += 1;
        Ok(())
    }
}
