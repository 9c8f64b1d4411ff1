// 50 Hz teleop loop
// Each tick polls the triggers and makes at most one blocking round trip to
// the hub, so the loop stalls for the whole response window of any in-flight
// command. That is deliberate: one motor, one command in flight, no queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use tracing::{error, info};

// local imports
use crate::config::{Config, InputBackend, POLL_INTERVAL};
use crate::hub::ReplSession;
use crate::input::{GamepadSource, InputError, KeyboardSource, TriggerSource};
use crate::motor::MotorController;

/// Run one teleop session to completion.
///
/// Ends on operator quit, interrupt, input failure, or a hub fault. The
/// shutdown stop sequence runs on every one of those paths before this
/// returns; only a failure to open the input backend or the serial port
/// skips it, since no command was ever sent.
pub fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut source: Box<dyn TriggerSource> = match config.input {
        InputBackend::Gamepad => Box::new(GamepadSource::new()?),
        InputBackend::Keys => Box::new(KeyboardSource::new()?),
    };

    let session = ReplSession::open(&config.port, config.baud, config.response_timeout())?;
    let mut controller = MotorController::new(session, &config);
    controller.startup();

    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))?;

    info!(
        "Control loop started: {}ms poll, motor on port {}, max {} deg/s",
        POLL_INTERVAL.as_millis(),
        config.motor_port,
        config.max_speed
    );

    let mut failure: Option<Box<dyn std::error::Error>> = None;
    while running.load(Ordering::SeqCst) {
        let tick_started = Instant::now();

        match source.poll() {
            Ok(triggers) => {
                if let Err(e) = controller.tick(triggers) {
                    error!("Hub command failed: {}", e);
                    failure = Some(Box::new(e));
                    break;
                }
            }
            Err(InputError::QuitRequested) => {
                info!("Quit requested");
                break;
            }
            Err(e) => {
                error!("Input source failed: {}", e);
                failure = Some(Box::new(e));
                break;
            }
        }

        // Sleep out the rest of the tick. A round trip that overran the
        // poll interval gets no catch-up ticks.
        let elapsed = tick_started.elapsed();
        if elapsed < POLL_INTERVAL {
            thread::sleep(POLL_INTERVAL - elapsed);
        }
    }
    if !running.load(Ordering::SeqCst) {
        info!("Interrupt received");
    }

    controller.shutdown();
    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
