// Wire command forms understood by the hub's MicroPython `motor` module.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Physical hub port the motor is plugged into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum PortLetter {
    A,
    B,
    C,
    D,
    E,
    F,
}

impl PortLetter {
    pub fn as_char(self) -> char {
        match self {
            PortLetter::A => 'A',
            PortLetter::B => 'B',
            PortLetter::C => 'C',
            PortLetter::D => 'D',
            PortLetter::E => 'E',
            PortLetter::F => 'F',
        }
    }
}

impl fmt::Display for PortLetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl FromStr for PortLetter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" | "a" => Ok(PortLetter::A),
            "B" | "b" => Ok(PortLetter::B),
            "C" | "c" => Ok(PortLetter::C),
            "D" | "d" => Ok(PortLetter::D),
            "E" | "e" => Ok(PortLetter::E),
            "F" | "f" => Ok(PortLetter::F),
            other => Err(format!("invalid hub port {other:?}, expected A-F")),
        }
    }
}

/// One outgoing motor command, rendered to a REPL line just before sending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorCommand {
    Run { port: PortLetter, velocity: i32 },
    Stop { port: PortLetter },
}

impl MotorCommand {
    /// The REPL statement for this command, without the line terminator.
    pub fn to_line(self) -> String {
        match self {
            MotorCommand::Run { port, velocity } => {
                format!("motor.run(port.{port}, {velocity})")
            }
            MotorCommand::Stop { port } => format!("motor.stop(port.{port})"),
        }
    }

    /// The velocity the hub holds once this command is acknowledged.
    pub fn committed_velocity(self) -> i32 {
        match self {
            MotorCommand::Run { velocity, .. } => velocity,
            MotorCommand::Stop { .. } => 0,
        }
    }
}

impl fmt::Display for MotorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_line_matches_hub_api() {
        let cmd = MotorCommand::Run {
            port: PortLetter::A,
            velocity: 800,
        };
        assert_eq!(cmd.to_line(), "motor.run(port.A, 800)");
    }

    #[test]
    fn test_negative_velocity_is_rendered_signed() {
        let cmd = MotorCommand::Run {
            port: PortLetter::C,
            velocity: -660,
        };
        assert_eq!(cmd.to_line(), "motor.run(port.C, -660)");
    }

    #[test]
    fn test_stop_line_matches_hub_api() {
        let cmd = MotorCommand::Stop { port: PortLetter::F };
        assert_eq!(cmd.to_line(), "motor.stop(port.F)");
    }

    #[test]
    fn test_port_letter_parses_either_case() {
        assert_eq!("A".parse::<PortLetter>().unwrap(), PortLetter::A);
        assert_eq!("e".parse::<PortLetter>().unwrap(), PortLetter::E);
        assert!("G".parse::<PortLetter>().is_err());
        assert!("".parse::<PortLetter>().is_err());
    }

    #[test]
    fn test_committed_velocity_for_stop_is_zero() {
        let stop = MotorCommand::Stop { port: PortLetter::A };
        assert_eq!(stop.committed_velocity(), 0);
        let run = MotorCommand::Run {
            port: PortLetter::B,
            velocity: -120,
        };
        assert_eq!(run.committed_velocity(), -120);
    }
}
