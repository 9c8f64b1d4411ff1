// Game controller triggers via gilrs.

use gilrs::{Button, Event, EventType, GamepadId, Gilrs};
use tracing::{debug, info};

use super::{InputError, TriggerPair, TriggerSource};

/// Analog triggers of the first connected game controller.
///
/// The controller is picked once at startup; hot-plugging a replacement
/// mid-run is not supported. Losing the device surfaces as
/// [`InputError::Disconnected`] on the next poll.
pub struct GamepadSource {
    gilrs: Gilrs,
    id: GamepadId,
}

impl GamepadSource {
    pub fn new() -> Result<Self, InputError> {
        let gilrs = Gilrs::new().map_err(|e| InputError::Backend(e.to_string()))?;
        let id = {
            let (id, pad) = gilrs
                .gamepads()
                .next()
                .ok_or(InputError::Disconnected)?;
            info!("Using game controller: {}", pad.name());
            id
        };
        Ok(Self { gilrs, id })
    }

    fn trigger_value(&self, button: Button) -> f32 {
        self.gilrs
            .gamepad(self.id)
            .button_data(button)
            .map(|data| data.value())
            .unwrap_or(0.0)
    }
}

impl TriggerSource for GamepadSource {
    fn poll(&mut self) -> Result<TriggerPair, InputError> {
        // Drain the event queue so cached button data is current.
        while let Some(Event { id, event, .. }) = self.gilrs.next_event() {
            if id == self.id && matches!(event, EventType::Disconnected) {
                return Err(InputError::Disconnected);
            }
            debug!("gamepad event: {:?}", event);
        }
        if !self.gilrs.gamepad(self.id).is_connected() {
            return Err(InputError::Disconnected);
        }
        Ok(TriggerPair::new(
            self.trigger_value(Button::LeftTrigger2),
            self.trigger_value(Button::RightTrigger2),
        ))
    }
}
