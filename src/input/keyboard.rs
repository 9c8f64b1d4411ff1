// Keyboard teleop backend.
//
// Terminals report key presses and repeats but no release, so "held" is
// emulated: a drive key counts as held until no press or repeat has been
// seen for `HOLD_TIMEOUT`. Trigger depth is stepped through fixed levels
// rather than read from an axis.

use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use tracing::info;

use super::{InputError, TriggerPair, TriggerSource};

/// A drive key left alone this long reads as released.
const HOLD_TIMEOUT: Duration = Duration::from_millis(150);

/// Emulated trigger depths selectable with r/f.
const DEPTH_LEVELS: [f32; 3] = [0.4, 0.7, 1.0];

/// Emulated triggers from held keys in the current terminal.
///
/// w/Up holds the right trigger (forward), s/Down the left (reverse),
/// r/f step the depth level, q/Esc/Ctrl-C request quit. The terminal is in
/// raw mode for the lifetime of the source.
pub struct KeyboardSource {
    level: usize,
    last_forward: Option<Instant>,
    last_reverse: Option<Instant>,
}

impl KeyboardSource {
    pub fn new() -> Result<Self, InputError> {
        terminal::enable_raw_mode()?;
        info!("Keyboard teleop: hold w/s or Up/Down to drive, r/f for depth, q to quit");
        Ok(Self {
            level: 1,
            last_forward: None,
            last_reverse: None,
        })
    }

    fn apply_key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> Result<(), InputError> {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return Err(InputError::QuitRequested),
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                return Err(InputError::QuitRequested);
            }
            KeyCode::Char('w') | KeyCode::Up => self.last_forward = Some(Instant::now()),
            KeyCode::Char('s') | KeyCode::Down => self.last_reverse = Some(Instant::now()),
            KeyCode::Char('r') => {
                self.level = (self.level + 1).min(DEPTH_LEVELS.len() - 1);
                info!("Trigger depth: {:.1}", DEPTH_LEVELS[self.level]);
            }
            KeyCode::Char('f') => {
                self.level = self.level.saturating_sub(1);
                info!("Trigger depth: {:.1}", DEPTH_LEVELS[self.level]);
            }
            _ => {}
        }
        Ok(())
    }

    fn held(&self, last: Option<Instant>, now: Instant) -> bool {
        last.is_some_and(|at| now.duration_since(at) < HOLD_TIMEOUT)
    }
}

impl TriggerSource for KeyboardSource {
    fn poll(&mut self) -> Result<TriggerPair, InputError> {
        while event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                if matches!(key.kind, KeyEventKind::Press | KeyEventKind::Repeat) {
                    self.apply_key(key.code, key.modifiers)?;
                }
            }
        }
        let now = Instant::now();
        let depth = DEPTH_LEVELS[self.level];
        let right = if self.held(self.last_forward, now) { depth } else { 0.0 };
        let left = if self.held(self.last_reverse, now) { depth } else { 0.0 };
        Ok(TriggerPair::new(left, right))
    }
}

impl Drop for KeyboardSource {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> KeyboardSource {
        KeyboardSource {
            level: 1,
            last_forward: None,
            last_reverse: None,
        }
    }

    #[test]
    fn test_drive_key_counts_as_held_until_timeout() {
        let mut src = source();
        src.apply_key(KeyCode::Char('w'), KeyModifiers::NONE).unwrap();
        let pressed_at = src.last_forward.unwrap();
        assert!(src.held(src.last_forward, pressed_at + Duration::from_millis(100)));
        assert!(!src.held(src.last_forward, pressed_at + HOLD_TIMEOUT));
        assert!(!src.held(src.last_reverse, pressed_at));
    }

    #[test]
    fn test_depth_level_steps_are_clamped() {
        let mut src = source();
        src.apply_key(KeyCode::Char('r'), KeyModifiers::NONE).unwrap();
        src.apply_key(KeyCode::Char('r'), KeyModifiers::NONE).unwrap();
        assert_eq!(src.level, DEPTH_LEVELS.len() - 1);
        for _ in 0..4 {
            src.apply_key(KeyCode::Char('f'), KeyModifiers::NONE).unwrap();
        }
        assert_eq!(src.level, 0);
    }

    #[test]
    fn test_quit_keys_raise_quit_requested() {
        assert!(matches!(
            source().apply_key(KeyCode::Char('q'), KeyModifiers::NONE),
            Err(InputError::QuitRequested)
        ));
        assert!(matches!(
            source().apply_key(KeyCode::Esc, KeyModifiers::NONE),
            Err(InputError::QuitRequested)
        ));
        assert!(matches!(
            source().apply_key(KeyCode::Char('c'), KeyModifiers::CONTROL),
            Err(InputError::QuitRequested)
        ));
    }
}
