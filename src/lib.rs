//! Trigger teleoperation for a single motor on a LEGO SPIKE hub, driven
//! over the hub's serial MicroPython REPL.
//!
//! The binary in `main.rs` wires a game controller (or keyboard fallback)
//! to the debounced command controller in [`motor`]; the `hub-probe` tool
//! exposes the raw REPL session for bench diagnostics.

pub mod config;
pub mod hub;
pub mod input;
pub mod motor;
pub mod runtime;
