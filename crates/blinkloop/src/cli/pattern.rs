//! `play` and `pattern` subcommands — the pattern stored on the device.

use super::{Config, GlobalOpts, Result, open_session, parse_color};

pub(super) fn cmd_play(
    opts: &GlobalOpts,
    config: &Config,
    on: bool,
    start: u8,
    end: u8,
    count: u8,
) -> Result<()> {
    let session = open_session(opts, config)?;
    session.play(on, start, end, count)?;
    if on {
        println!("{}: playing from position {start}", session.identity());
    } else {
        println!("{}: playback stopped", session.identity());
    }
    Ok(())
}

pub(super) fn cmd_pattern(
    opts: &GlobalOpts,
    config: &Config,
    position: u8,
    color: &str,
    time: Option<u32>,
) -> Result<()> {
    let rgb = parse_color(color)?;
    let fade_ms = time.unwrap_or(config.default_fade_ms);
    let session = open_session(opts, config)?;
    session.write_pattern_step(fade_ms, rgb, position)?;
    println!(
        "{}: pattern[{position}] = {rgb} ({fade_ms} ms fade)",
        session.identity()
    );
    Ok(())
}
