//! blinkloop — command-line control for blink(1) USB notification LEDs.

use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;

mod cli;

/// Shared shutdown flag, cleared by the Ctrl+C handler.
pub static RUNNING: AtomicBool = AtomicBool::new(true);

#[derive(Parser)]
#[command(
    name = "blinkloop",
    version,
    about = "Control blink(1) USB notification LEDs"
)]
struct Args {
    /// Output as JSON (for devices, get, config)
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Device serial number (default: config file, then first free device)
    #[arg(long, global = true)]
    serial: Option<String>,

    #[command(subcommand)]
    command: cli::Command,
}

/// Clear [`RUNNING`] on Ctrl+C. Failure is logged; `loop` then only ends
/// via `--seconds`.
fn install_interrupt_handler() -> bool {
    match ctrlc::set_handler(|| RUNNING.store(false, Ordering::SeqCst)) {
        Ok(()) => true,
        Err(e) => {
            log::warn!("could not install Ctrl+C handler: {e}");
            false
        }
    }
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .format_target(false)
        .init();

    install_interrupt_handler();

    let opts = cli::GlobalOpts {
        json: args.json,
        serial: args.serial,
    };
    if let Err(e) = cli::run(args.command, &opts) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
