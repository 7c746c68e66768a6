//! Line framing for modem responses.
//!
//! Bytes are accumulated into bounded rows. A carriage return or line feed closes the row
//! in progress (blank rows collapse), a row reading `OK` or an error marker ends the
//! response, and a quiet period longer than the budget ends it as a timeout.
use std::borrow::Cow;
use std::time::Duration;

use log::{trace, warn};
use tokio::time::{sleep, Instant};

use super::{ByteChannel, Result};

const OK_MARKER: &[u8] = b"OK";
const ERROR_MARKER: &[u8] = b"ERROR";
const CME_ERROR_PREFIX: &[u8] = b"+CME ERROR";
const CMS_ERROR_PREFIX: &[u8] = b"+CMS ERROR";

/// Result of collecting one command's response.
///
/// `Completed` and `Rejected` carry the row index of the terminal marker line, so the marker
/// itself is the last full row. `TimedOut` carries the number of rows completed before the
/// budget ran out (possibly zero). Indices are only meaningful until the buffer is next cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Completed(usize),
    Rejected(usize),
    TimedOut(usize),
}

impl CommandOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, CommandOutcome::Completed(_))
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, CommandOutcome::TimedOut(_))
    }

    /// Number of rows the outcome covers, marker included.
    pub fn row_count(&self) -> usize {
        match *self {
            CommandOutcome::Completed(i) | CommandOutcome::Rejected(i) => i + 1,
            CommandOutcome::TimedOut(n) => n,
        }
    }

    /// Index of the last row carrying payload (the row before the marker, or the last
    /// completed row of a partial response).
    pub fn payload_row(&self) -> Option<usize> {
        match *self {
            CommandOutcome::Completed(i) | CommandOutcome::Rejected(i) => i.checked_sub(1),
            CommandOutcome::TimedOut(n) => n.checked_sub(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Ok,
    Error,
}

fn classify(row: &[u8]) -> Option<Marker> {
    if row == OK_MARKER {
        Some(Marker::Ok)
    } else if row == ERROR_MARKER
        || row.starts_with(CME_ERROR_PREFIX)
        || row.starts_with(CMS_ERROR_PREFIX)
    {
        Some(Marker::Error)
    } else {
        None
    }
}

/// Bounded, reusable storage for one command's response rows.
///
/// Holds at most `max_rows` rows of at most `line_capacity` bytes. Bytes past the capacity
/// are dropped and flagged; they never spill into the next row. The final row slot is
/// reserved for the terminal marker, so at most `max_rows - 1` payload rows are kept.
#[derive(Debug, Clone)]
pub struct ResponseBuffer {
    rows: Vec<Vec<u8>>,
    /// Parallel to `rows`: whether the row lost bytes past `line_capacity`.
    truncated: Vec<bool>,
    current: Vec<u8>,
    max_rows: usize,
    line_capacity: usize,
    overflowed: bool,
    current_truncated: bool,
    dropped_rows: usize,
}

impl ResponseBuffer {
    pub fn new(max_rows: usize, line_capacity: usize) -> Self {
        let max_rows = max_rows.max(1);
        Self {
            rows: Vec::with_capacity(max_rows),
            truncated: Vec::with_capacity(max_rows),
            current: Vec::with_capacity(line_capacity),
            max_rows,
            line_capacity,
            overflowed: false,
            current_truncated: false,
            dropped_rows: 0,
        }
    }

    /// Forget every row and flag from the previous command.
    pub fn clear(&mut self) {
        self.rows.clear();
        self.truncated.clear();
        self.current.clear();
        self.overflowed = false;
        self.current_truncated = false;
        self.dropped_rows = 0;
    }

    /// Feed one received byte. Returns the outcome once a terminal marker row closes.
    pub fn push_byte(&mut self, byte: u8) -> Option<CommandOutcome> {
        if byte == b'\r' || byte == b'\n' {
            return self.close_row();
        }
        if self.current.len() < self.line_capacity {
            self.current.push(byte);
        } else {
            if !self.current_truncated {
                warn!(
                    "Response row {} exceeded {} bytes; dropping the rest of the row",
                    self.rows.len(),
                    self.line_capacity
                );
                crate::metrics::inc_line_overflow();
            }
            self.current_truncated = true;
            self.overflowed = true;
        }
        None
    }

    fn close_row(&mut self) -> Option<CommandOutcome> {
        if self.current.is_empty() {
            return None;
        }
        let row = std::mem::take(&mut self.current);
        let truncated = std::mem::replace(&mut self.current_truncated, false);
        let marker = if truncated { None } else { classify(&row) };
        match marker {
            Some(kind) => {
                self.rows.push(row);
                self.truncated.push(false);
                let index = self.rows.len() - 1;
                Some(match kind {
                    Marker::Ok => CommandOutcome::Completed(index),
                    Marker::Error => CommandOutcome::Rejected(index),
                })
            }
            None if self.rows.len() + 1 >= self.max_rows => {
                warn!(
                    "Response exceeded {} rows; dropping row {:?}",
                    self.max_rows,
                    String::from_utf8_lossy(&row)
                );
                self.overflowed = true;
                self.dropped_rows += 1;
                None
            }
            None => {
                self.rows.push(row);
                self.truncated.push(truncated);
                None
            }
        }
    }

    /// Rows completed so far.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn line_capacity(&self) -> usize {
        self.line_capacity
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    /// True if any byte or row was dropped since the last clear.
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    pub fn dropped_rows(&self) -> usize {
        self.dropped_rows
    }

    /// Bytes of the row still being accumulated (no terminator seen yet).
    pub fn pending(&self) -> &[u8] {
        &self.current
    }

    pub fn row(&self, index: usize) -> Option<&[u8]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    /// True if row `index` was cut at `line_capacity`. Its text is a prefix of what the
    /// modem sent and must not be parsed as a complete field list.
    pub fn row_truncated(&self, index: usize) -> bool {
        self.truncated.get(index).copied().unwrap_or(false)
    }

    pub fn text(&self, index: usize) -> Option<Cow<'_, str>> {
        self.row(index).map(String::from_utf8_lossy)
    }

    pub fn rows(&self) -> impl Iterator<Item = Cow<'_, str>> {
        self.rows.iter().map(|r| String::from_utf8_lossy(r))
    }

    /// The payload row associated with `outcome` (see [`CommandOutcome::payload_row`]).
    pub fn payload(&self, outcome: &CommandOutcome) -> Option<Cow<'_, str>> {
        outcome.payload_row().and_then(|i| self.text(i))
    }

    /// Search rows from the newest backwards for one starting with `prefix`; returns the
    /// remainder after the prefix with surrounding whitespace trimmed.
    pub fn find_prefixed(&self, prefix: &str) -> Option<String> {
        self.find_prefixed_row(prefix).map(|(_, rest)| rest)
    }

    /// Like [`find_prefixed`](Self::find_prefixed), also returning the row index so the
    /// caller can check [`row_truncated`](Self::row_truncated).
    pub fn find_prefixed_row(&self, prefix: &str) -> Option<(usize, String)> {
        self.rows.iter().enumerate().rev().find_map(|(i, r)| {
            r.strip_prefix(prefix.as_bytes())
                .map(|rest| (i, String::from_utf8_lossy(rest).trim().to_string()))
        })
    }
}

/// Drives a [`ResponseBuffer`] from a [`ByteChannel`] until a marker row or a quiet-period
/// timeout.
#[derive(Debug, Clone)]
pub struct ResponseCollector {
    tick: Duration,
    ceiling: Duration,
}

impl ResponseCollector {
    /// `tick` is the idle polling granularity; `ceiling` bounds a whole collection even when
    /// the modem never goes quiet.
    pub fn new(tick: Duration, ceiling: Duration) -> Self {
        Self {
            tick: tick.max(Duration::from_millis(1)),
            ceiling,
        }
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// Collect one response. The buffer is cleared on entry.
    ///
    /// The inactivity timer resets on every received byte and only advances during quiet
    /// ticks. Exceeding `budget` of quiet (or the overall ceiling) yields
    /// [`CommandOutcome::TimedOut`] with the rows completed so far.
    pub async fn collect<C: ByteChannel + ?Sized>(
        &self,
        channel: &mut C,
        buffer: &mut ResponseBuffer,
        budget: Duration,
    ) -> Result<CommandOutcome> {
        buffer.clear();
        let started = Instant::now();
        let mut quiet = Duration::ZERO;
        loop {
            if started.elapsed() >= self.ceiling {
                warn!(
                    "Response still streaming after {:?}; giving up with {} rows",
                    self.ceiling,
                    buffer.len()
                );
                return Ok(CommandOutcome::TimedOut(buffer.len()));
            }
            match channel.read_byte()? {
                Some(byte) => {
                    quiet = Duration::ZERO;
                    if let Some(outcome) = buffer.push_byte(byte) {
                        trace!("Response complete after {:?}: {:?}", started.elapsed(), outcome);
                        return Ok(outcome);
                    }
                }
                None => {
                    if quiet >= budget {
                        return Ok(CommandOutcome::TimedOut(buffer.len()));
                    }
                    sleep(self.tick).await;
                    quiet += self.tick;
                }
            }
        }
    }
}
