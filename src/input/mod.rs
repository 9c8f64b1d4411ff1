// Trigger input sources.
//
// The control loop consumes one `TriggerPair` per tick and does not care
// where it came from. The two backends live behind `TriggerSource`: real
// analog triggers on a game controller, or emulated depth from held keys.

use std::io;

pub mod gamepad;
pub mod keyboard;

pub use gamepad::GamepadSource;
pub use keyboard::KeyboardSource;

/// Left and right trigger depression for one poll tick, each in [0.0, 1.0].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TriggerPair {
    pub left: f32,
    pub right: f32,
}

impl TriggerPair {
    pub const ZERO: Self = Self {
        left: 0.0,
        right: 0.0,
    };

    /// Clamp readings into range; some backends report slightly past 1.0 at
    /// full depression.
    pub fn new(left: f32, right: f32) -> Self {
        Self {
            left: left.clamp(0.0, 1.0),
            right: right.clamp(0.0, 1.0),
        }
    }
}

/// Error types for the input boundary
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("Game controller disconnected or not found")]
    Disconnected,

    #[error("Operator requested quit")]
    QuitRequested,

    #[error("Input backend failure: {0}")]
    Backend(String),

    #[error("Terminal input error: {0}")]
    Io(#[from] io::Error),
}

/// Per-tick provider of trigger state.
///
/// `poll` must not block: it drains whatever input events are pending and
/// reports the current trigger depression. A quit request or a vanished
/// device is reported through `InputError`, which routes the run into its
/// shutdown sequence.
pub trait TriggerSource {
    fn poll(&mut self) -> Result<TriggerPair, InputError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_pair_clamps_out_of_range_readings() {
        let pair = TriggerPair::new(-0.25, 1.5);
        assert_eq!(pair.left, 0.0);
        assert_eq!(pair.right, 1.0);
    }

    #[test]
    fn test_trigger_pair_passes_in_range_readings_through() {
        let pair = TriggerPair::new(0.3, 0.85);
        assert_eq!(pair.left, 0.3);
        assert_eq!(pair.right, 0.85);
        assert_eq!(TriggerPair::ZERO, TriggerPair::new(0.0, 0.0));
    }
}
