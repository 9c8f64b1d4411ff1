// Loop timing and the layered run configuration: built-in defaults,
// optionally a TOML file, then command-line flags on top.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::Deserialize;

use crate::motor::PortLetter;

// Input poll frequency; one controller read and at most one hub command per tick
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Which collaborator produces the per-tick trigger pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputBackend {
    /// First connected game controller (analog triggers).
    #[default]
    Gamepad,
    /// Keyboard teleop in the current terminal (emulated triggers).
    Keys,
}

/// Everything tunable for one run. All values are static once the control
/// loop starts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Serial port the hub is attached to.
    pub port: String,
    /// Baud rate for the hub link.
    pub baud: u32,
    /// Hub port letter the motor is plugged into.
    pub motor_port: PortLetter,
    /// Maximum commanded speed in degrees per second.
    pub max_speed: i32,
    /// Fraction of `max_speed` below which a target counts as "stopped".
    pub stop_threshold: f32,
    /// Minimum velocity change, as a fraction of `max_speed`, worth a new
    /// run command.
    pub debounce_threshold: f32,
    /// Trigger depression below this reads as fully released.
    pub dead_zone: f32,
    /// Minimum spacing between consecutive hub commands, in milliseconds.
    pub command_interval_ms: u64,
    /// How long to wait for the hub prompt after a command, in milliseconds.
    pub response_timeout_ms: u64,
    /// Stop attempts when bringing the motor to a known-zero state at startup.
    pub startup_retries: u32,
    pub startup_retry_delay_ms: u64,
    /// Stop attempts during the shutdown sequence.
    pub shutdown_retries: u32,
    pub shutdown_retry_delay_ms: u64,
    /// Per-attempt response window during shutdown; deliberately longer than
    /// `response_timeout_ms` because this is the last chance to halt the motor.
    pub shutdown_timeout_ms: u64,
    /// Input backend to poll for trigger state.
    pub input: InputBackend,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Bench setup this was developed against: SPIKE hub on USB,
            // medium motor (tops out around 1110 deg/s) on port A.
            port: "/dev/ttyACM0".into(),
            baud: 115_200,
            motor_port: PortLetter::A,
            max_speed: 1_000,
            stop_threshold: 0.02,
            debounce_threshold: 0.01,
            dead_zone: 0.05,
            command_interval_ms: 50,
            response_timeout_ms: 1_000,
            startup_retries: 3,
            startup_retry_delay_ms: 250,
            shutdown_retries: 3,
            shutdown_retry_delay_ms: 250,
            shutdown_timeout_ms: 2_000,
            input: InputBackend::Gamepad,
        }
    }
}

impl Config {
    /// Resolve the final configuration from an optional file plus CLI flags.
    pub fn load(cli: Cli) -> Result<Self, ConfigError> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        cli.apply_to(&mut config);
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn command_interval(&self) -> Duration {
        Duration::from_millis(self.command_interval_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn startup_retry_delay(&self) -> Duration {
        Duration::from_millis(self.startup_retry_delay_ms)
    }

    pub fn shutdown_retry_delay(&self) -> Duration {
        Duration::from_millis(self.shutdown_retry_delay_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Command-line flags. Every flag is optional; unset flags fall through to
/// the config file (if given) and then to the built-in defaults.
#[derive(Parser, Debug)]
#[command(
    name = "spike-teleop",
    about = "Drive a SPIKE hub motor with game controller triggers over serial",
    version
)]
pub struct Cli {
    /// Serial port the hub is attached to
    #[arg(long, short = 'p')]
    pub port: Option<String>,

    /// Baud rate for the hub link
    #[arg(long)]
    pub baud: Option<u32>,

    /// Hub port letter the motor is plugged into (A-F)
    #[arg(long, value_name = "LETTER")]
    pub motor_port: Option<PortLetter>,

    /// Maximum commanded speed in degrees per second
    #[arg(long)]
    pub max_speed: Option<i32>,

    /// Stop threshold as a fraction of max speed
    #[arg(long)]
    pub stop_threshold: Option<f32>,

    /// Debounce threshold as a fraction of max speed
    #[arg(long)]
    pub debounce_threshold: Option<f32>,

    /// Trigger dead-zone (0.0 to 1.0)
    #[arg(long)]
    pub dead_zone: Option<f32>,

    /// Minimum milliseconds between hub commands
    #[arg(long, value_name = "MS")]
    pub command_interval_ms: Option<u64>,

    /// Milliseconds to wait for the hub prompt after a command
    #[arg(long, value_name = "MS")]
    pub response_timeout_ms: Option<u64>,

    /// Input backend to poll for trigger state
    #[arg(long, value_enum)]
    pub input: Option<InputBackend>,

    /// TOML config file; flags given here override its values
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl Cli {
    fn apply_to(self, config: &mut Config) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(baud) = self.baud {
            config.baud = baud;
        }
        if let Some(motor_port) = self.motor_port {
            config.motor_port = motor_port;
        }
        if let Some(max_speed) = self.max_speed {
            config.max_speed = max_speed;
        }
        if let Some(stop_threshold) = self.stop_threshold {
            config.stop_threshold = stop_threshold;
        }
        if let Some(debounce_threshold) = self.debounce_threshold {
            config.debounce_threshold = debounce_threshold;
        }
        if let Some(dead_zone) = self.dead_zone {
            config.dead_zone = dead_zone;
        }
        if let Some(ms) = self.command_interval_ms {
            config.command_interval_ms = ms;
        }
        if let Some(ms) = self.response_timeout_ms {
            config.response_timeout_ms = ms;
        }
        if let Some(input) = self.input {
            config.input = input;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_bench_setup() {
        let config = Config::default();
        assert_eq!(config.port, "/dev/ttyACM0");
        assert_eq!(config.baud, 115_200);
        assert_eq!(config.max_speed, 1_000);
        assert_eq!(config.command_interval(), Duration::from_millis(50));
    }

    #[test]
    fn test_partial_file_keeps_defaults_for_the_rest() {
        let config: Config = toml::from_str("max_speed = 660\ninput = \"keys\"").unwrap();
        assert_eq!(config.max_speed, 660);
        assert_eq!(config.input, InputBackend::Keys);
        assert_eq!(config.baud, 115_200);
        assert_eq!(config.motor_port, PortLetter::A);
    }

    #[test]
    fn test_unknown_file_keys_are_rejected() {
        assert!(toml::from_str::<Config>("max_sped = 660").is_err());
    }

    #[test]
    fn test_flags_override_file_values() {
        let mut config: Config = toml::from_str("port = \"/dev/ttyACM1\"").unwrap();
        let cli = Cli::parse_from(["spike-teleop", "--port", "/dev/ttyUSB0", "--max-speed", "500"]);
        cli.apply_to(&mut config);
        assert_eq!(config.port, "/dev/ttyUSB0");
        assert_eq!(config.max_speed, 500);
    }
}
