// In-memory stand-in for the hub serial link.
//
// Behaves like a well-mannered MicroPython REPL: echoes each received line,
// optionally prints scripted output or a traceback, then reprints the
// prompt. Cloning a `MockHub` hands out another handle to the same hub, so
// a test can keep one handle for assertions after the session takes the
// other.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

use super::repl::{HubLink, PROMPT};

/// Scripted behavior for one received command line. Lines beyond the end of
/// the script are acknowledged with a bare prompt.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Echo the line, print this output, reprint the prompt.
    Output(String),
    /// Echo the line, print a traceback ending in this exception line,
    /// reprint the prompt.
    Error(String),
    /// Echo the line but never come back with a prompt, like a hub hung
    /// mid-command. The session runs out its response window.
    Silent,
}

#[derive(Debug, Default)]
struct HubState {
    script: VecDeque<MockReply>,
    /// Bytes queued for the session to read.
    pending: Vec<u8>,
    /// Written bytes not yet terminated by CRLF.
    partial: Vec<u8>,
    /// Complete command lines received, in order.
    lines: Vec<String>,
}

impl HubState {
    fn receive_line(&mut self, line: String) {
        let reply = self
            .script
            .pop_front()
            .unwrap_or_else(|| MockReply::Output(String::new()));

        self.pending.extend_from_slice(line.as_bytes());
        self.pending.extend_from_slice(b"\r\n");
        match reply {
            MockReply::Output(text) => {
                if !text.is_empty() {
                    self.pending.extend_from_slice(text.as_bytes());
                    self.pending.extend_from_slice(b"\r\n");
                }
                self.pending.extend_from_slice(PROMPT.as_bytes());
            }
            MockReply::Error(exception) => {
                self.pending.extend_from_slice(
                    b"Traceback (most recent call last):\r\n  File \"<stdin>\", line 1, in <module>\r\n",
                );
                self.pending.extend_from_slice(exception.as_bytes());
                self.pending.extend_from_slice(b"\r\n");
                self.pending.extend_from_slice(PROMPT.as_bytes());
            }
            MockReply::Silent => {}
        }
        self.lines.push(line);
    }
}

/// Clonable handle to a scripted hub.
#[derive(Debug, Clone)]
pub struct MockHub {
    state: Arc<Mutex<HubState>>,
}

impl MockHub {
    /// A freshly connected, well-behaved hub with nothing buffered.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HubState::default())),
        }
    }

    /// A hub that just reset: the boot banner and first prompt are already
    /// waiting in the receive buffer.
    pub fn with_boot_banner() -> Self {
        let hub = Self::new();
        hub.inject(
            b"MicroPython v1.20.0; LEGO Technic Large Hub\r\nType \"help()\" for more information.\r\n>>> ",
        );
        hub
    }

    /// Queue a scripted reply for the next unanswered command line.
    pub fn push_reply(&self, reply: MockReply) {
        self.state.lock().unwrap().script.push_back(reply);
    }

    /// Append raw bytes to the receive buffer, bypassing the script.
    pub fn inject(&self, bytes: &[u8]) {
        self.state.lock().unwrap().pending.extend_from_slice(bytes);
    }

    /// Every complete command line received so far.
    pub fn sent_lines(&self) -> Vec<String> {
        self.state.lock().unwrap().lines.clone()
    }
}

impl Default for MockHub {
    fn default() -> Self {
        Self::new()
    }
}

impl Read for MockHub {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        if state.pending.is_empty() {
            // Mirror a serial port read slice elapsing with no data.
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "mock hub has nothing to say",
            ));
        }
        let n = buf.len().min(state.pending.len());
        buf[..n].copy_from_slice(&state.pending[..n]);
        state.pending.drain(..n);
        Ok(n)
    }
}

impl Write for MockHub {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        state.partial.extend_from_slice(buf);
        while let Some(at) = state.partial.windows(2).position(|w| w == b"\r\n") {
            let line_bytes: Vec<u8> = state.partial.drain(..at + 2).collect();
            let line = String::from_utf8_lossy(&line_bytes[..at]).into_owned();
            state.receive_line(line);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl HubLink for MockHub {
    fn discard_input(&mut self) -> io::Result<()> {
        self.state.lock().unwrap().pending.clear();
        Ok(())
    }
}
