// Hub probe: interactive REPL passthrough for checking the serial link.
//
// Lines you type are sent to the hub exactly the way motor commands are,
// with the same prompt framing and error classification. Use it to verify
// the port, watch the hub's replies, and try motor calls by hand before a
// teleop run.
//
// Usage: cargo run --bin hub-probe -- [port]
// Example: cargo run --bin hub-probe -- /dev/ttyACM0

use std::io::{self, BufRead, Write};
use std::time::Duration;

use spike_teleop::hub::{ReplError, ReplSession};

const RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("debug".parse().unwrap()),
        )
        .init();

    // Get port from args or use default
    let port = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/dev/ttyACM0".to_string());

    println!("Hub probe on {}", port);
    println!();
    println!("Step 1: Opening serial port (the hub gets a moment to settle)...");
    let mut session = match ReplSession::open(&port, 115_200, RESPONSE_TIMEOUT) {
        Ok(session) => {
            println!("  ✓ Serial port opened");
            session
        }
        Err(e) => {
            println!("  ✗ Failed to open serial port: {}", e);
            println!();
            println!("Troubleshooting:");
            println!("  - Check the port path is correct");
            println!("  - Verify the hub is connected over USB and powered on");
            println!("  - Check your user can access the device (dialout group on Linux)");
            return Err(e.into());
        }
    };
    if session.prompt_confirmed() {
        println!("  ✓ Hub prompt confirmed");
    } else {
        println!("  ⚠ No prompt seen yet; the hub may still answer commands");
    }
    println!();

    print!("Step 2: Import the hub's motor API now? [Y/n]: ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    if !answer.trim().eq_ignore_ascii_case("n") {
        for command in ["import motor", "from hub import port"] {
            report(command, session.send(command));
        }
    }
    println!();

    println!("Step 3: Interactive. Type REPL lines, e.g. motor.run(port.A, 300)");
    println!("Empty line or Ctrl-D quits.");
    println!();

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        report(line, session.send(line));
    }

    println!("Done.");
    Ok(())
}

fn report(command: &str, outcome: Result<String, ReplError>) {
    match outcome {
        Ok(output) if output == command => println!("  ✓ ok (echo only)"),
        Ok(output) => println!("  ✓ ok: {}", output),
        Err(ReplError::Device { output }) => println!("  ✗ hub error:\n{}", output),
        Err(ReplError::Timeout { partial }) => {
            println!("  ✗ timed out; partial output: {:?}", partial)
        }
        Err(e) => println!("  ✗ transport error: {}", e),
    }
}
