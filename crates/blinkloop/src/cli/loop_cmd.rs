//! `loop` subcommand — replay a list of color steps until interrupted.

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use blinkloop_lib::BlinkError;

use super::{Action, Config, GlobalOpts, RUNNING, Result, Rgb, open_session, parse_color};

/// Parse `COLOR[,COLOR2][:FADE_MS[:HOLD_MS]]`. Empty or missing times fall
/// back to `fade_ms` / `hold_ms`.
fn parse_step(s: &str, fade_ms: u32, hold_ms: u32) -> Result<Action> {
    let mut fields = s.split(':');
    let colors = fields.next().unwrap_or_default();
    let fade = parse_ms(s, fields.next(), fade_ms)?;
    let hold = parse_ms(s, fields.next(), hold_ms)?;
    if fields.next().is_some() {
        return Err(BlinkError::Config(format!(
            "step \"{s}\": expected COLOR[,COLOR2][:FADE_MS[:HOLD_MS]]"
        )));
    }

    let (primary, secondary) = match colors.split_once(',') {
        Some((a, b)) => (parse_color(a)?, Some(parse_color(b)?)),
        None => (parse_color(colors)?, None),
    };

    let action = Action::new(primary, fade, hold);
    Ok(match secondary {
        Some(c) => action.with_secondary(c),
        None => action,
    })
}

fn parse_ms(step: &str, field: Option<&str>, default: u32) -> Result<u32> {
    match field.map(str::trim) {
        None | Some("") => Ok(default),
        Some(v) => v
            .parse()
            .map_err(|_| BlinkError::Config(format!("step \"{step}\": invalid time \"{v}\""))),
    }
}

pub(super) fn cmd_loop(
    opts: &GlobalOpts,
    config: &Config,
    steps: &[String],
    fade: Option<u32>,
    hold: Option<u32>,
    seconds: Option<u64>,
) -> Result<()> {
    let fade_ms = fade.unwrap_or(config.default_fade_ms);
    let hold_ms = hold.unwrap_or(config.default_hold_ms);
    let actions = steps
        .iter()
        .map(|s| parse_step(s, fade_ms, hold_ms))
        .collect::<Result<Vec<_>>>()?;

    let session = open_session(opts, config)?;
    for action in actions {
        log::debug!(
            "queue: {} / {} fade {} ms, hold {} ms",
            action.primary,
            action.secondary,
            action.fade_ms,
            action.hold_ms
        );
        session.append(action);
    }
    session.start();

    println!(
        "{}: looping {} step{} (Ctrl+C to stop)",
        session.identity(),
        session.len(),
        if session.len() == 1 { "" } else { "s" }
    );

    let deadline = seconds.map(|s| Instant::now() + Duration::from_secs(s));
    while RUNNING.load(Ordering::SeqCst) && deadline.is_none_or(|d| Instant::now() < d) {
        std::thread::sleep(Duration::from_millis(100));
    }

    println!();
    println!("Stopping...");
    session.set_now(Rgb::OFF)?;
    Ok(())
}
