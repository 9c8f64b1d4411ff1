// Serial transport to the SPIKE hub's MicroPython REPL.

pub mod mock;
pub mod repl;

pub use mock::{MockHub, MockReply};
pub use repl::{HubLink, ReplError, ReplSession, PROMPT};
