// Motor control module for the SPIKE hub drive
//
// Provides:
// - Trigger pair -> target velocity computation
// - Wire command forms for the hub's `motor` API
// - Debounced, fault-latching command controller

pub mod command;
pub mod controller;
pub mod velocity;

pub use command::{MotorCommand, PortLetter};
pub use controller::{CommandGate, ControlError, DriveState, MotorController};
