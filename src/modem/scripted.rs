//! In-memory modem that replays canned replies.
//!
//! Used by the integration tests and by bench runs without hardware. Each written command
//! (trailing CR/LF trimmed) is matched against the script: one-shot replies are consumed in
//! the order they were added, sticky replies answer every time. Unmatched commands get
//! silence, which the collector sees as a timeout.
use std::collections::VecDeque;
use std::io;

use super::{ByteChannel, ModemError, Result};

#[derive(Debug, Clone)]
struct Reply {
    command: String,
    bytes: Vec<u8>,
    sticky: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedChannel {
    replies: Vec<Reply>,
    pending: VecDeque<u8>,
    written: Vec<u8>,
    commands: Vec<String>,
    failures: Vec<(String, usize)>,
}

impl ScriptedChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the next matching `command` with `reply` once.
    pub fn respond(mut self, command: &str, reply: impl AsRef<[u8]>) -> Self {
        self.replies.push(Reply {
            command: command.to_string(),
            bytes: reply.as_ref().to_vec(),
            sticky: false,
        });
        self
    }

    /// Answer every matching `command` with `reply` (after one-shot replies are used up).
    pub fn respond_always(mut self, command: &str, reply: impl AsRef<[u8]>) -> Self {
        self.replies.push(Reply {
            command: command.to_string(),
            bytes: reply.as_ref().to_vec(),
            sticky: true,
        });
        self
    }

    /// Bytes already waiting on the line before any command is sent.
    pub fn with_pending(mut self, bytes: impl AsRef<[u8]>) -> Self {
        self.pending.extend(bytes.as_ref().iter().copied());
        self
    }

    /// Make the `occurrence`-th write of `command` (1-based) fail as if the port dropped.
    pub fn fail_write(mut self, command: &str, occurrence: usize) -> Self {
        self.failures.push((command.to_string(), occurrence));
        self
    }

    /// Every byte written so far.
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Every write, as text with trailing CR/LF removed.
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn count(&self, command: &str) -> usize {
        self.commands.iter().filter(|c| c.as_str() == command).count()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn reply_for(&mut self, command: &str) -> Option<Vec<u8>> {
        if let Some(pos) = self
            .replies
            .iter()
            .position(|r| !r.sticky && r.command == command)
        {
            return Some(self.replies.remove(pos).bytes);
        }
        self.replies
            .iter()
            .find(|r| r.sticky && r.command == command)
            .map(|r| r.bytes.clone())
    }
}

impl ByteChannel for ScriptedChannel {
    fn read_byte(&mut self) -> Result<Option<u8>> {
        Ok(self.pending.pop_front())
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.written.extend_from_slice(data);
        let text = String::from_utf8_lossy(data)
            .trim_end_matches(['\r', '\n'])
            .to_string();
        self.commands.push(text.clone());
        let seen = self.count(&text);
        if self.failures.iter().any(|(c, n)| *c == text && *n == seen) {
            return Err(ModemError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("scripted write failure on {:?}", text),
            )));
        }
        if let Some(reply) = self.reply_for(&text) {
            self.pending.extend(reply);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_then_sticky() {
        let mut ch = ScriptedChannel::new()
            .respond_always("AT", "OK\r\n")
            .respond("AT", "ERROR\r\n");
        ch.write_all(b"AT\r").unwrap();
        assert_eq!(ch.pending_len(), 7);
        ch.discard_input().unwrap();
        ch.write_all(b"AT\r").unwrap();
        assert_eq!(ch.read_byte().unwrap(), Some(b'O'));
        assert_eq!(ch.count("AT"), 2);
    }

    #[test]
    fn scripted_write_failure_hits_one_occurrence() {
        let mut ch = ScriptedChannel::new()
            .respond_always("AT", "OK\r\n")
            .fail_write("AT", 2);
        assert!(ch.write_all(b"AT\r").is_ok());
        assert!(matches!(ch.write_all(b"AT\r"), Err(ModemError::Io(_))));
        assert!(ch.write_all(b"AT\r").is_ok());
        assert_eq!(ch.count("AT"), 3);
    }

    #[test]
    fn unmatched_command_is_silent() {
        let mut ch = ScriptedChannel::new();
        ch.write_all(b"AT+CSQ\r").unwrap();
        assert_eq!(ch.read_byte().unwrap(), None);
        assert_eq!(ch.commands(), &["AT+CSQ".to_string()]);
    }
}
