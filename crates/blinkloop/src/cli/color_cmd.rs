//! `set`, `fade`, `get` and `off` subcommands — immediate color control.

use super::{ColorOutput, Config, GlobalOpts, Result, Rgb, open_session, parse_color};

pub(super) fn cmd_set(opts: &GlobalOpts, config: &Config, color: &str) -> Result<()> {
    let rgb = parse_color(color)?;
    let session = open_session(opts, config)?;
    session.set_now(rgb)?;
    println!("{}: {rgb}", session.identity());
    Ok(())
}

pub(super) fn cmd_fade(
    opts: &GlobalOpts,
    config: &Config,
    color: &str,
    time: Option<u32>,
    led: u8,
) -> Result<()> {
    let rgb = parse_color(color)?;
    let fade_ms = time.unwrap_or(config.default_fade_ms);
    let session = open_session(opts, config)?;
    session.fade_now(fade_ms, rgb, led)?;
    println!("{}: fading to {rgb} over {fade_ms} ms", session.identity());
    Ok(())
}

pub(super) fn cmd_get(opts: &GlobalOpts, config: &Config) -> Result<()> {
    let session = open_session(opts, config)?;
    let rgb = session.get_current_rgb()?;

    if opts.json {
        let output = ColorOutput {
            serial: session.identity().to_string(),
            revision: session.revision(),
            color: rgb.to_string(),
            rgb,
        };
        println!("{}", serde_json::to_string_pretty(&output).unwrap());
        return Ok(());
    }

    println!("{rgb}");
    Ok(())
}

pub(super) fn cmd_off(opts: &GlobalOpts, config: &Config) -> Result<()> {
    let session = open_session(opts, config)?;
    session.set_now(Rgb::OFF)?;
    session.turn_off()?;
    println!("{}: off", session.identity());
    Ok(())
}
