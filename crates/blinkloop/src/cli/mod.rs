//! CLI subcommands — device listing, immediate color commands, action loops.

mod color_cmd;
mod config_cmd;
mod devices;
mod loop_cmd;
mod pattern;

use clap::Subcommand;
use serde::Serialize;

pub(super) use crate::RUNNING;
pub(super) use blinkloop_lib::config::Config;
pub(super) use blinkloop_lib::device::{self, DiscoveredDevice, Revision};
pub(super) use blinkloop_lib::error::Result;
pub(super) use blinkloop_lib::{Action, Rgb, Session, color::parse_color};

/// Options shared by every subcommand.
pub struct GlobalOpts {
    pub json: bool,
    pub serial: Option<String>,
}

/// Open a session: `--serial` wins over the config file's `device_serial`.
pub(super) fn open_session(opts: &GlobalOpts, config: &Config) -> Result<Session> {
    let serial = opts.serial.as_deref().or(config.serial());
    let session = Session::open(serial, config.worker())?;
    log::debug!(
        "using {} ({})",
        session.identity(),
        session.revision()
    );
    Ok(session)
}

pub(super) fn kv(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("{key:<width$}{value}", width = w);
}

pub(super) fn kv_indent(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("  {key:<width$}{value}", width = w - 2);
}

// ── JSON output structs ──

#[derive(Serialize)]
pub(super) struct DeviceJson {
    pub path: String,
    pub serial: Option<String>,
    pub revision: Option<Revision>,
    pub leds: Option<u8>,
}

#[derive(Serialize)]
pub(super) struct DevicesOutput {
    pub count: usize,
    pub devices: Vec<DeviceJson>,
}

#[derive(Serialize)]
pub(super) struct ColorOutput {
    pub serial: String,
    pub revision: Revision,
    pub color: String,
    pub rgb: Rgb,
}

#[derive(Serialize)]
pub(super) struct ConfigOutput {
    pub config_file: Option<String>,
    pub config_file_exists: bool,
    pub settings: Config,
}

#[derive(Subcommand)]
pub enum Command {
    /// List connected blink(1) devices
    Devices,

    /// Set a color immediately (stops any running loop)
    Set {
        /// Color: #RRGGBB or a name (red, green, blue, ...)
        color: String,
    },

    /// Fade to a color
    Fade {
        /// Color: #RRGGBB or a name
        color: String,
        /// Fade time in milliseconds (default: config default_fade_ms)
        #[arg(long)]
        time: Option<u32>,
        /// LED to address: 0 = all, 1 = top, 2 = bottom (mk2 only)
        #[arg(long, default_value_t = 0)]
        led: u8,
    },

    /// Read the current color back from the device
    Get,

    /// Turn the LED off
    Off,

    /// Play (or stop) the pattern stored on the device
    Play {
        /// First pattern position
        #[arg(default_value_t = 0)]
        start: u8,
        /// Last pattern position (mk2 only, 0 = end of pattern)
        #[arg(long, default_value_t = 0)]
        end: u8,
        /// Repeat count (mk2 only, 0 = forever)
        #[arg(long, default_value_t = 0)]
        count: u8,
        /// Stop playback instead of starting it
        #[arg(long)]
        stop: bool,
    },

    /// Write one step of the on-device pattern
    Pattern {
        /// Pattern position to write
        position: u8,
        /// Color: #RRGGBB or a name
        color: String,
        /// Fade time in milliseconds (default: config default_fade_ms)
        #[arg(long)]
        time: Option<u32>,
    },

    /// Loop through color steps until Ctrl+C
    ///
    /// Each step is COLOR[,COLOR2][:FADE_MS[:HOLD_MS]]; COLOR2 drives the
    /// second LED on mk2 devices.
    Loop {
        /// Steps, e.g. `red:200:800 "#00FF00,blue" off::500`
        #[arg(required = true)]
        steps: Vec<String>,
        /// Fade time for steps that don't give one
        #[arg(long)]
        fade: Option<u32>,
        /// Hold time for steps that don't give one
        #[arg(long)]
        hold: Option<u32>,
        /// Stop after this many seconds instead of waiting for Ctrl+C
        #[arg(long)]
        seconds: Option<u64>,
    },

    /// Show current configuration and file path, or change settings
    Config {
        /// Set a value and save the config file (repeatable), e.g.
        /// `--set default_fade_ms=250`
        #[arg(long, value_name = "KEY=VALUE")]
        set: Vec<String>,
    },
}

/// Warn if `--json` was passed to a command that doesn't support it.
fn warn_json_unsupported(cmd_name: &str) {
    log::warn!("--json is not supported for `{cmd_name}` (ignored)");
}

pub fn run(cmd: Command, opts: &GlobalOpts) -> Result<()> {
    let config = Config::load();
    if let Err(errors) = config.validate() {
        for e in &errors {
            log::warn!("[config] {e}");
        }
    }

    if opts.json && !matches!(cmd, Command::Devices | Command::Get | Command::Config { .. }) {
        warn_json_unsupported(cmd.name());
    }

    match cmd {
        Command::Devices => devices::cmd_devices(opts.json),
        Command::Set { color } => color_cmd::cmd_set(opts, &config, &color),
        Command::Fade { color, time, led } => color_cmd::cmd_fade(opts, &config, &color, time, led),
        Command::Get => color_cmd::cmd_get(opts, &config),
        Command::Off => color_cmd::cmd_off(opts, &config),
        Command::Play {
            start,
            end,
            count,
            stop,
        } => pattern::cmd_play(opts, &config, !stop, start, end, count),
        Command::Pattern {
            position,
            color,
            time,
        } => pattern::cmd_pattern(opts, &config, position, &color, time),
        Command::Loop {
            steps,
            fade,
            hold,
            seconds,
        } => loop_cmd::cmd_loop(opts, &config, &steps, fade, hold, seconds),
        Command::Config { set } => config_cmd::cmd_config(opts.json, config, &set),
    }
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Devices => "devices",
            Command::Set { .. } => "set",
            Command::Fade { .. } => "fade",
            Command::Get => "get",
            Command::Off => "off",
            Command::Play { .. } => "play",
            Command::Pattern { .. } => "pattern",
            Command::Loop { .. } => "loop",
            Command::Config { .. } => "config",
        }
    }
}
