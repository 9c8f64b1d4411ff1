// SPIKE hub REPL session over serial.
//
// The hub runs a MicroPython REPL: it echoes every command line, prints any
// output or traceback, then reprints the prompt. The prompt substring is the
// only frame boundary the channel offers, so request/reply framing here is
// "accumulate bytes until the prompt shows up". That keeps the protocol
// strictly synchronous: a slow hub stalls the caller until the response
// window closes.

use std::io::{self, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use serialport::{self, ClearBuffer, SerialPort};
use tracing::{debug, info, warn};

/// Prompt the hub prints when it is ready for the next command.
pub const PROMPT: &str = ">>> ";

/// Substrings that mark a device-side failure in the output before the prompt.
const ERROR_MARKERS: [&str; 2] = ["Traceback (most recent call last):", "Error: "];

/// Command lines are terminated CRLF, the way a terminal would send them.
const LINE_ENDING: &str = "\r\n";

/// Hub boot/settle time; the USB port enumerates before the REPL answers.
const BOOT_SETTLE: Duration = Duration::from_secs(2);

/// How long `open` watches for the boot prompt before proceeding without it.
const PROMPT_WINDOW: Duration = Duration::from_secs(2);

/// Settle time after a fire-and-forget write.
const FORGET_SETTLE: Duration = Duration::from_millis(50);

/// Per-read slice on the serial port; a response deadline spans many slices.
const READ_SLICE: Duration = Duration::from_millis(50);

/// Error types for the hub command channel
#[derive(Debug, thiserror::Error)]
pub enum ReplError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error on hub link: {0}")]
    Io(#[from] io::Error),

    #[error("Hub reported an error before the prompt:\n{output}")]
    Device { output: String },

    #[error("Timeout waiting for the hub prompt (partial output: {partial:?})")]
    Timeout { partial: String },
}

pub type Result<T> = std::result::Result<T, ReplError>;

/// Byte channel a session runs over. The production implementation is a
/// serial port; tests drive the session with [`crate::hub::MockHub`].
pub trait HubLink: Read + Write + Send {
    /// Drop any received bytes that have not been read yet.
    fn discard_input(&mut self) -> io::Result<()>;
}

impl HubLink for Box<dyn SerialPort> {
    fn discard_input(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}

/// Synchronous request/reply session with the hub REPL. One command is in
/// flight at a time; `send` blocks until the exchange resolves.
pub struct ReplSession {
    link: Box<dyn HubLink>,
    response_timeout: Duration,
    prompt_confirmed: bool,
}

impl ReplSession {
    /// Open the serial port, wait out the hub's boot settle time, and watch
    /// for the prompt. A missing prompt is reported but not fatal: the hub
    /// may be sitting at an old prompt it will not reprint, so callers
    /// proceed optimistically.
    pub fn open(port_name: &str, baud: u32, response_timeout: Duration) -> Result<Self> {
        info!("Opening hub link on {} at {} baud", port_name, baud);
        let port = serialport::new(port_name, baud)
            .timeout(READ_SLICE)
            .open()?;

        thread::sleep(BOOT_SETTLE);

        let mut session = Self::with_link(port, response_timeout);
        session.confirm_prompt(PROMPT_WINDOW)?;
        Ok(session)
    }

    /// Wrap an already-open byte channel. Used by `open` and by tests.
    pub fn with_link<L: HubLink + 'static>(link: L, response_timeout: Duration) -> Self {
        Self {
            link: Box::new(link),
            response_timeout,
            prompt_confirmed: false,
        }
    }

    /// Whether the boot prompt was actually observed while opening.
    pub fn prompt_confirmed(&self) -> bool {
        self.prompt_confirmed
    }

    /// Send one command line and wait for the prompt to come back, using the
    /// session's configured response window.
    pub fn send(&mut self, command: &str) -> Result<String> {
        self.send_with_timeout(command, self.response_timeout)
    }

    /// `send` with an explicit response window. The shutdown path allows the
    /// hub more time than the hot loop would.
    pub fn send_with_timeout(&mut self, command: &str, timeout: Duration) -> Result<String> {
        self.write_line(command)?;

        let (buf, prompt_at) = self.read_until_prompt(timeout)?;
        let Some(at) = prompt_at else {
            return Err(ReplError::Timeout {
                partial: String::from_utf8_lossy(&buf).into_owned(),
            });
        };

        // Everything before the first prompt occurrence is the hub's echoed
        // output for this command.
        let output = String::from_utf8_lossy(&buf[..at]);
        if ERROR_MARKERS.iter().any(|marker| output.contains(marker)) {
            return Err(ReplError::Device {
                output: output.trim().to_string(),
            });
        }
        Ok(output.trim().to_string())
    }

    /// Write a line and deliberately skip the reply. Last-resort path once
    /// the channel is already considered dead.
    pub fn send_forget(&mut self, command: &str) -> Result<()> {
        self.write_line(command)?;
        thread::sleep(FORGET_SETTLE);
        Ok(())
    }

    fn write_line(&mut self, command: &str) -> Result<()> {
        self.link.discard_input()?;
        self.link.write_all(command.as_bytes())?;
        self.link.write_all(LINE_ENDING.as_bytes())?;
        self.link.flush()?;
        debug!("hub command: {:?}", command);
        Ok(())
    }

    /// Drain stale bytes, then watch for the boot prompt within `window`.
    fn confirm_prompt(&mut self, window: Duration) -> Result<()> {
        self.link.discard_input()?;
        let (_, prompt_at) = self.read_until_prompt(window)?;
        self.prompt_confirmed = prompt_at.is_some();
        if self.prompt_confirmed {
            debug!("hub prompt confirmed");
        } else {
            warn!("No hub prompt within {:?}, proceeding unconfirmed", window);
        }
        Ok(())
    }

    /// Accumulate bytes until the prompt substring appears or the deadline
    /// passes. Returns the buffer and the prompt's byte offset, if seen.
    fn read_until_prompt(&mut self, timeout: Duration) -> Result<(Vec<u8>, Option<usize>)> {
        let deadline = Instant::now() + timeout;
        let mut buf = Vec::new();
        let mut chunk = [0u8; 256];

        loop {
            if let Some(at) = find_prompt(&buf) {
                return Ok((buf, Some(at)));
            }
            if Instant::now() >= deadline {
                return Ok((buf, None));
            }
            match self.link.read(&mut chunk) {
                Ok(0) => {
                    return Err(ReplError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "hub link closed",
                    )));
                }
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                // A quiet read slice; the overall deadline governs.
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
                Err(e) => return Err(ReplError::Io(e)),
            }
        }
    }
}

/// Byte offset of the first prompt occurrence, if any.
fn find_prompt(buf: &[u8]) -> Option<usize> {
    buf.windows(PROMPT.len())
        .position(|window| window == PROMPT.as_bytes())
}
