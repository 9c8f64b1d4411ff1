// Debounced motor command stream.
//
// Once per poll tick the controller turns the current trigger pair into a
// target velocity and decides whether that justifies a hub command. Most
// ticks send nothing: the gate swallows noise-level changes and enforces a
// minimum spacing between commands so the serial link is not flooded with
// near-duplicate run calls.
//
// State is committed only on an acknowledged command. Any protocol failure
// latches the controller into a terminal fault; there is no in-loop retry
// because a silently stuck motor is worse than a halted run.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::hub::{ReplError, ReplSession};
use crate::input::TriggerPair;
use crate::motor::command::{MotorCommand, PortLetter};
use crate::motor::velocity;

/// REPL statements issued once after connecting, before any motor command.
const SETUP_COMMANDS: [&str; 2] = ["import motor", "from hub import port"];

/// Error types for the control loop
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("Hub channel is faulted; no further commands will be sent")]
    Faulted,

    #[error("Command {command:?} failed: {source}")]
    Command { command: String, source: ReplError },
}

/// Where the drive currently stands, as far as acknowledged commands go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveState {
    /// Last acknowledged velocity is zero.
    Idle,
    /// Last acknowledged velocity is nonzero.
    Running,
    /// A command failed; terminal for this run.
    Faulted,
}

/// Debounce and rate-limit gate over outgoing commands.
///
/// Tracks the last acknowledged velocity and send time. `decide` is pure;
/// callers `commit` only after the hub confirms the command, so a failed
/// send leaves the gate exactly where it was.
#[derive(Debug)]
pub struct CommandGate {
    last_velocity: i32,
    last_sent_at: Option<Instant>,
    stop_limit: i32,
    debounce_limit: i32,
    min_interval: Duration,
}

impl CommandGate {
    /// Thresholds are fractions of `max_speed`, converted once to velocity
    /// units so the per-tick test is integer math.
    pub fn new(
        max_speed: i32,
        stop_threshold: f32,
        debounce_threshold: f32,
        min_interval: Duration,
    ) -> Self {
        Self {
            last_velocity: 0,
            last_sent_at: None,
            stop_limit: threshold_limit(max_speed, stop_threshold),
            debounce_limit: threshold_limit(max_speed, debounce_threshold),
            min_interval,
        }
    }

    pub fn last_velocity(&self) -> i32 {
        self.last_velocity
    }

    /// The command this target justifies right now, if any.
    ///
    /// Targets inside the stop zone only ever produce a stop, and only while
    /// the last acknowledged velocity is nonzero; repeated zero targets are
    /// silent. Targets outside it produce a run only when they differ from
    /// the last acknowledged velocity by more than the debounce limit.
    pub fn decide(&self, port: PortLetter, target: i32, now: Instant) -> Option<MotorCommand> {
        if let Some(at) = self.last_sent_at {
            if now.duration_since(at) < self.min_interval {
                return None;
            }
        }
        if target.abs() <= self.stop_limit {
            if self.last_velocity != 0 {
                return Some(MotorCommand::Stop { port });
            }
            return None;
        }
        if (target - self.last_velocity).abs() > self.debounce_limit {
            return Some(MotorCommand::Run {
                port,
                velocity: target,
            });
        }
        None
    }

    /// Record an acknowledged command.
    pub fn commit(&mut self, command: MotorCommand, at: Instant) {
        self.last_velocity = command.committed_velocity();
        self.last_sent_at = Some(at);
    }
}

fn threshold_limit(max_speed: i32, fraction: f32) -> i32 {
    (max_speed as f32 * fraction).round() as i32
}

/// Drives one motor through an exclusive hub session.
pub struct MotorController {
    session: ReplSession,
    gate: CommandGate,
    port: PortLetter,
    max_speed: i32,
    dead_zone: f32,
    faulted: bool,
    shutdown_done: bool,
    startup_retries: u32,
    startup_retry_delay: Duration,
    shutdown_retries: u32,
    shutdown_retry_delay: Duration,
    shutdown_timeout: Duration,
}

impl MotorController {
    pub fn new(session: ReplSession, config: &Config) -> Self {
        Self {
            session,
            gate: CommandGate::new(
                config.max_speed,
                config.stop_threshold,
                config.debounce_threshold,
                config.command_interval(),
            ),
            port: config.motor_port,
            max_speed: config.max_speed,
            dead_zone: config.dead_zone,
            faulted: false,
            shutdown_done: false,
            startup_retries: config.startup_retries,
            startup_retry_delay: config.startup_retry_delay(),
            shutdown_retries: config.shutdown_retries,
            shutdown_retry_delay: config.shutdown_retry_delay(),
            shutdown_timeout: config.shutdown_timeout(),
        }
    }

    pub fn state(&self) -> DriveState {
        if self.faulted {
            DriveState::Faulted
        } else if self.gate.last_velocity() == 0 {
            DriveState::Idle
        } else {
            DriveState::Running
        }
    }

    /// Import the hub's motor API and bring the motor to a known-zero
    /// state. Everything here is best-effort: a hub that misses its setup
    /// will fail loudly on the first real command instead.
    pub fn startup(&mut self) {
        for command in SETUP_COMMANDS {
            match self.session.send(command) {
                Ok(_) => debug!("setup command {:?} acknowledged", command),
                Err(e) => warn!("Setup command {:?} failed: {}", command, e),
            }
        }

        let stop = MotorCommand::Stop { port: self.port };
        for attempt in 1..=self.startup_retries {
            match self.session.send(&stop.to_line()) {
                Ok(_) => {
                    info!("Motor on port {} starting from rest", self.port);
                    return;
                }
                Err(e) => warn!(
                    "Initial stop attempt {}/{} failed: {}",
                    attempt, self.startup_retries, e
                ),
            }
            if attempt < self.startup_retries {
                thread::sleep(self.startup_retry_delay);
            }
        }
        warn!(
            "Could not confirm a stopped motor after {} attempts, continuing anyway",
            self.startup_retries
        );
    }

    /// Process one tick of trigger input. Returns the command sent and
    /// acknowledged this tick, if any.
    ///
    /// A failed command latches the fault and is returned as an error; every
    /// later tick short-circuits to `ControlError::Faulted` without touching
    /// the hub.
    pub fn tick(&mut self, triggers: TriggerPair) -> Result<Option<MotorCommand>, ControlError> {
        if self.faulted {
            return Err(ControlError::Faulted);
        }

        let target = velocity::target(triggers, self.max_speed, self.dead_zone);
        let now = Instant::now();
        let Some(command) = self.gate.decide(self.port, target, now) else {
            return Ok(None);
        };

        let line = command.to_line();
        match self.session.send(&line) {
            Ok(_) => {
                self.gate.commit(command, now);
                match command {
                    MotorCommand::Run { velocity, .. } => {
                        info!("Motor running at {} deg/s", velocity)
                    }
                    MotorCommand::Stop { .. } => info!("Motor stopped"),
                }
                Ok(Some(command))
            }
            Err(source) => {
                self.faulted = true;
                Err(ControlError::Command {
                    command: line,
                    source,
                })
            }
        }
    }

    /// Best-effort final stop. Runs at most once no matter how many exit
    /// paths reach it; later calls return immediately.
    ///
    /// Each attempt gets a longer response window than the hot loop would
    /// allow. If every attempt fails the stop is written once more without
    /// waiting for a reply.
    pub fn shutdown(&mut self) {
        if self.shutdown_done {
            return;
        }
        self.shutdown_done = true;

        let stop = MotorCommand::Stop { port: self.port };
        let line = stop.to_line();
        if self.faulted {
            // No read-back of actual motor state exists, so after a failed
            // command the hub side is unknown. Stop attempts go out anyway.
            warn!("Motor state unknown after fault; issuing stop regardless");
        }
        info!("Stopping motor on port {}", self.port);
        for attempt in 1..=self.shutdown_retries {
            match self.session.send_with_timeout(&line, self.shutdown_timeout) {
                Ok(_) => {
                    self.gate.commit(stop, Instant::now());
                    info!("Motor confirmed stopped");
                    return;
                }
                Err(e) => warn!(
                    "Stop attempt {}/{} failed: {}",
                    attempt, self.shutdown_retries, e
                ),
            }
            if attempt < self.shutdown_retries {
                thread::sleep(self.shutdown_retry_delay);
            }
        }

        warn!("Falling back to an unacknowledged stop write");
        if let Err(e) = self.session.send_forget(&line) {
            warn!("Unacknowledged stop write failed: {}", e);
        }
    }
}

impl Drop for MotorController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{MockHub, MockReply};

    fn gate(min_interval: Duration) -> CommandGate {
        CommandGate::new(1_000, 0.02, 0.01, min_interval)
    }

    fn controller(hub: &MockHub, tweak: impl FnOnce(&mut Config)) -> MotorController {
        let mut config = Config {
            command_interval_ms: 0,
            response_timeout_ms: 40,
            startup_retries: 2,
            startup_retry_delay_ms: 0,
            shutdown_retries: 2,
            shutdown_retry_delay_ms: 0,
            shutdown_timeout_ms: 10,
            ..Config::default()
        };
        tweak(&mut config);
        let session = ReplSession::with_link(hub.clone(), config.response_timeout());
        MotorController::new(session, &config)
    }

    #[test]
    fn test_first_command_is_eligible_immediately() {
        let gate = gate(Duration::from_millis(50));
        let decision = gate.decide(PortLetter::A, 800, Instant::now());
        assert_eq!(
            decision,
            Some(MotorCommand::Run {
                port: PortLetter::A,
                velocity: 800
            })
        );
    }

    #[test]
    fn test_noise_level_changes_are_debounced() {
        let mut gate = gate(Duration::ZERO);
        let now = Instant::now();
        gate.commit(
            MotorCommand::Run {
                port: PortLetter::A,
                velocity: 800,
            },
            now,
        );
        // debounce limit is 10 deg/s here
        assert_eq!(gate.decide(PortLetter::A, 805, now), None);
        assert_eq!(gate.decide(PortLetter::A, 810, now), None);
        assert!(gate.decide(PortLetter::A, 811, now).is_some());
        assert!(gate.decide(PortLetter::A, 789, now).is_some());
    }

    #[test]
    fn test_min_interval_holds_commands_back() {
        let mut gate = gate(Duration::from_millis(50));
        let now = Instant::now();
        gate.commit(
            MotorCommand::Run {
                port: PortLetter::A,
                velocity: 500,
            },
            now,
        );
        assert_eq!(
            gate.decide(PortLetter::A, 900, now + Duration::from_millis(10)),
            None
        );
        assert!(gate
            .decide(PortLetter::A, 900, now + Duration::from_millis(50))
            .is_some());
    }

    #[test]
    fn test_stop_zone_sends_exactly_one_stop() {
        let mut gate = gate(Duration::ZERO);
        let now = Instant::now();
        gate.commit(
            MotorCommand::Run {
                port: PortLetter::A,
                velocity: 800,
            },
            now,
        );

        let stop = gate.decide(PortLetter::A, 0, now);
        assert_eq!(stop, Some(MotorCommand::Stop { port: PortLetter::A }));
        gate.commit(stop.unwrap(), now);

        // Already at rest: zero and near-zero targets stay silent, even when
        // the change from zero would clear the debounce limit.
        assert_eq!(gate.decide(PortLetter::A, 0, now), None);
        assert_eq!(gate.decide(PortLetter::A, 15, now), None);
    }

    #[test]
    fn test_stop_zone_boundary_is_inclusive() {
        let mut gate = gate(Duration::ZERO);
        let now = Instant::now();
        gate.commit(
            MotorCommand::Run {
                port: PortLetter::A,
                velocity: 800,
            },
            now,
        );
        // stop limit is 20 deg/s here
        assert_eq!(
            gate.decide(PortLetter::A, 20, now),
            Some(MotorCommand::Stop { port: PortLetter::A })
        );
        assert_eq!(
            gate.decide(PortLetter::A, -20, now),
            Some(MotorCommand::Stop { port: PortLetter::A })
        );
        assert_eq!(
            gate.decide(PortLetter::A, 21, now),
            Some(MotorCommand::Run {
                port: PortLetter::A,
                velocity: 21
            })
        );
    }

    #[test]
    fn test_stop_is_not_debounced_while_running() {
        let mut gate = gate(Duration::ZERO);
        let now = Instant::now();
        gate.commit(
            MotorCommand::Run {
                port: PortLetter::A,
                velocity: 25,
            },
            now,
        );
        // 25 -> 18 is within the debounce limit, but 18 is in the stop zone
        // and the motor is running, so the stop goes out regardless.
        assert_eq!(
            gate.decide(PortLetter::A, 18, now),
            Some(MotorCommand::Stop { port: PortLetter::A })
        );
    }

    #[test]
    fn test_reverse_targets_are_symmetric() {
        let mut gate = gate(Duration::ZERO);
        let now = Instant::now();
        assert_eq!(
            gate.decide(PortLetter::B, -800, now),
            Some(MotorCommand::Run {
                port: PortLetter::B,
                velocity: -800
            })
        );
        gate.commit(
            MotorCommand::Run {
                port: PortLetter::B,
                velocity: -800,
            },
            now,
        );
        assert_eq!(gate.decide(PortLetter::B, -805, now), None);
    }

    #[test]
    fn test_tick_sends_and_commits_on_ack() {
        let hub = MockHub::new();
        let mut ctl = controller(&hub, |_| {});

        let sent = ctl.tick(TriggerPair::new(0.0, 0.8)).unwrap();
        assert_eq!(
            sent,
            Some(MotorCommand::Run {
                port: PortLetter::A,
                velocity: 800
            })
        );
        assert_eq!(hub.sent_lines(), vec!["motor.run(port.A, 800)"]);
        assert_eq!(ctl.state(), DriveState::Running);
    }

    #[test]
    fn test_ineligible_tick_changes_nothing() {
        let hub = MockHub::new();
        let mut ctl = controller(&hub, |_| {});

        ctl.tick(TriggerPair::new(0.0, 0.8)).unwrap();
        // Same target again: inside the debounce limit, nothing goes out.
        assert_eq!(ctl.tick(TriggerPair::new(0.0, 0.8)).unwrap(), None);
        assert_eq!(hub.sent_lines().len(), 1);
        assert_eq!(ctl.state(), DriveState::Running);
    }

    #[test]
    fn test_device_error_latches_fault() {
        let hub = MockHub::new();
        hub.push_reply(MockReply::Error("OSError: [Errno 19] ENODEV".into()));
        let mut ctl = controller(&hub, |_| {});

        let err = ctl.tick(TriggerPair::new(0.0, 0.8)).unwrap_err();
        assert!(matches!(
            err,
            ControlError::Command {
                source: ReplError::Device { .. },
                ..
            }
        ));
        assert_eq!(ctl.state(), DriveState::Faulted);

        // Latched: later ticks never reach the hub.
        assert!(matches!(
            ctl.tick(TriggerPair::new(0.0, 0.8)),
            Err(ControlError::Faulted)
        ));
        assert_eq!(hub.sent_lines().len(), 1);
    }

    #[test]
    fn test_timeout_latches_fault_without_commit() {
        let hub = MockHub::new();
        hub.push_reply(MockReply::Silent);
        let mut ctl = controller(&hub, |c| c.response_timeout_ms = 15);

        let err = ctl.tick(TriggerPair::new(0.0, 0.8)).unwrap_err();
        assert!(matches!(
            err,
            ControlError::Command {
                source: ReplError::Timeout { .. },
                ..
            }
        ));
        // Nothing was committed for the failed run.
        assert_eq!(ctl.gate.last_velocity(), 0);
        assert_eq!(ctl.state(), DriveState::Faulted);
    }

    #[test]
    fn test_startup_imports_then_initial_stop() {
        let hub = MockHub::new();
        let mut ctl = controller(&hub, |_| {});
        ctl.startup();
        assert_eq!(
            hub.sent_lines(),
            vec!["import motor", "from hub import port", "motor.stop(port.A)"]
        );
    }

    #[test]
    fn test_startup_continues_past_setup_errors() {
        let hub = MockHub::new();
        hub.push_reply(MockReply::Error("ImportError: no module named 'motor'".into()));
        let mut ctl = controller(&hub, |_| {});
        ctl.startup();
        // All three lines still went out.
        assert_eq!(hub.sent_lines().len(), 3);
        assert_eq!(ctl.state(), DriveState::Idle);
    }

    #[test]
    fn test_shutdown_retries_then_fire_and_forget() {
        let hub = MockHub::new();
        hub.push_reply(MockReply::Silent);
        hub.push_reply(MockReply::Silent);
        let mut ctl = controller(&hub, |_| {});

        ctl.shutdown();
        // Two acknowledged attempts timed out, then one blind write.
        assert_eq!(
            hub.sent_lines(),
            vec![
                "motor.stop(port.A)",
                "motor.stop(port.A)",
                "motor.stop(port.A)"
            ]
        );
    }

    #[test]
    fn test_shutdown_runs_exactly_once() {
        let hub = MockHub::new();
        let mut ctl = controller(&hub, |_| {});
        ctl.shutdown();
        ctl.shutdown();
        assert_eq!(hub.sent_lines().len(), 1);
    }

    #[test]
    fn test_drop_is_a_shutdown_backstop() {
        let hub = MockHub::new();
        {
            let _ctl = controller(&hub, |_| {});
        }
        assert_eq!(hub.sent_lines(), vec!["motor.stop(port.A)"]);
    }
}
