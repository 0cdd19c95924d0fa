//! In-memory GPM-8213 for testing without hardware.
//!
//! [`MockGpm`] implements [`Link`], so a session can be opened on it exactly
//! like on a TCP stream. It understands the commands the driver sends, keeps
//! track of the active item list and answers `*IDN?` and `:NUM:NORM:VALUE?`.
//! Clones share state, which lets a test keep a handle while the session owns
//! the link.

use crate::device::pattern_variables;
use crate::protocol::TERMINATOR;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::transport::Link;

/// Identity the mock reports.
pub const MOCK_IDENTITY: &str = "GW Instek,GPM-8213,MOCK0001,1.00";

#[derive(Debug)]
struct MockState {
    identity: String,
    inbox: Vec<u8>,
    outbox: VecDeque<u8>,
    commands: Vec<String>,
    scripted_replies: VecDeque<String>,
    item_count: usize,
    silent: bool,
    closed: bool,
    read_timeouts: Vec<Option<Duration>>,
    samples: u64,
}

impl MockState {
    fn handle(&mut self, line: &str) {
        tracing::debug!("Mock GPM received: {:?}", line);
        self.commands.push(line.to_string());

        if self.silent {
            return;
        }

        let (header, argument) = match line.split_once(' ') {
            Some((h, a)) => (h, Some(a.trim())),
            None => (line, None),
        };

        match header {
            "*IDN?" => {
                let reply = self.identity.clone();
                self.reply(&reply);
            }
            ":NUM:NORM:VALUE?" => {
                let reply = match self.scripted_replies.pop_front() {
                    Some(scripted) => scripted,
                    None => self.synthesize_values(),
                };
                self.reply(&reply);
            }
            ":NUM:NORM:NUMB" => {
                if let Some(n) = argument.and_then(|a| a.parse().ok()) {
                    self.item_count = n;
                }
            }
            ":NUM:NORM:PRES" => {
                if let Some(vars) = argument
                    .and_then(|a| a.parse().ok())
                    .and_then(|p| pattern_variables(p).ok())
                {
                    self.item_count = vars.len();
                }
            }
            _ => {}
        }
    }

    fn reply(&mut self, text: &str) {
        self.outbox.extend(text.as_bytes());
        self.outbox.extend(TERMINATOR.as_bytes());
    }

    /// Deterministic values, one per active item.
    fn synthesize_values(&mut self) -> String {
        self.samples += 1;
        let base = self.samples as f64;
        (0..self.item_count)
            .map(|slot| format!("{:.4E}", base + slot as f64 * 0.5))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Simulated instrument link.
#[derive(Debug, Clone)]
pub struct MockGpm {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockGpm {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGpm {
    /// Create a mock with the default identity and an empty item list.
    pub fn new() -> Self {
        Self::with_identity(MOCK_IDENTITY)
    }

    /// Create a mock reporting `identity`.
    pub fn with_identity(identity: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                identity: identity.to_string(),
                inbox: Vec::new(),
                outbox: VecDeque::new(),
                commands: Vec::new(),
                scripted_replies: VecDeque::new(),
                item_count: 0,
                silent: false,
                closed: false,
                read_timeouts: Vec::new(),
                samples: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue an exact reply for the next value query.
    pub fn push_reading(&self, reply: &str) {
        self.lock().scripted_replies.push_back(reply.to_string());
    }

    /// Put raw bytes on the wire as if the instrument sent them unprompted.
    pub fn inject(&self, bytes: &[u8]) {
        self.lock().outbox.extend(bytes);
    }

    /// Stop answering queries (reads then time out).
    pub fn set_silent(&self, silent: bool) {
        self.lock().silent = silent;
    }

    /// Every complete command line received, without terminators.
    pub fn commands(&self) -> Vec<String> {
        self.lock().commands.clone()
    }

    /// Forget recorded commands.
    pub fn clear_commands(&self) {
        self.lock().commands.clear();
    }

    /// Number of items the instrument would report.
    pub fn item_count(&self) -> usize {
        self.lock().item_count
    }

    /// Whether the link was shut down.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Read timeouts requested by the driver, in order.
    pub fn read_timeouts(&self) -> Vec<Option<Duration>> {
        self.lock().read_timeouts.clone()
    }
}

impl Read for MockGpm {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.lock();
        if state.outbox.is_empty() {
            if state.closed {
                return Ok(0);
            }
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "mock GPM has nothing to send"));
        }
        let n = buf.len().min(state.outbox.len());
        for (slot, byte) in buf.iter_mut().zip(state.outbox.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MockGpm {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.lock();
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock GPM link is closed"));
        }
        state.inbox.extend_from_slice(buf);
        while let Some(pos) = state.inbox.windows(2).position(|w| w == TERMINATOR.as_bytes()) {
            let line: Vec<u8> = state.inbox.drain(..pos + 2).collect();
            let text = String::from_utf8_lossy(&line[..pos]).into_owned();
            state.handle(&text);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Link for MockGpm {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.lock().read_timeouts.push(timeout);
        Ok(())
    }

    fn shutdown(&mut self) -> io::Result<()> {
        self.lock().closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(mock: &mut MockGpm) -> String {
        let mut buf = [0u8; 1024];
        let n = mock.read(&mut buf).unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    #[test]
    fn answers_identity() {
        let mut mock = MockGpm::new();
        mock.write_all(b"*IDN?\r\n").unwrap();
        assert_eq!(read_all(&mut mock), format!("{MOCK_IDENTITY}\r\n"));
    }

    #[test]
    fn tracks_preset_item_count() {
        let mut mock = MockGpm::new();
        mock.write_all(b":NUM:NORM:PRES 2\r\n").unwrap();
        assert_eq!(mock.item_count(), 9);
        mock.write_all(b":NUM:NORM:VALUE?\r\n").unwrap();
        let reply = read_all(&mut mock);
        assert_eq!(reply.trim_end().split(',').count(), 9);
    }

    #[test]
    fn commands_split_across_writes() {
        let mut mock = MockGpm::new();
        mock.write_all(b":NUM:NORM:NU").unwrap();
        mock.write_all(b"MB 3\r\n:INPUT:MODE DC\r\n").unwrap();
        assert_eq!(mock.commands(), vec![":NUM:NORM:NUMB 3", ":INPUT:MODE DC"]);
        assert_eq!(mock.item_count(), 3);
    }

    #[test]
    fn scripted_reply_wins_over_synthesized() {
        let mut mock = MockGpm::new();
        mock.push_reading("1.5,bad,3.75");
        mock.write_all(b":NUM:NORM:VALUE?\r\n").unwrap();
        assert_eq!(read_all(&mut mock), "1.5,bad,3.75\r\n");
    }

    #[test]
    fn silent_mock_times_out() {
        let mut mock = MockGpm::new();
        mock.set_silent(true);
        mock.write_all(b"*IDN?\r\n").unwrap();
        let mut buf = [0u8; 8];
        let err = mock.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn closed_mock_rejects_writes() {
        let mut mock = MockGpm::new();
        mock.shutdown().unwrap();
        assert!(mock.write_all(b"*IDN?\r\n").is_err());
        let mut buf = [0u8; 8];
        assert_eq!(mock.read(&mut buf).unwrap(), 0);
    }
}
