//! `config` subcommand — show current configuration and file path.

use blinkloop_lib::BlinkError;

use super::{Config, ConfigOutput, Result, kv, kv_indent};

const WIDTH: usize = 22;

/// Apply `KEY=VALUE` assignments in order, then save once.
fn apply_and_save(config: &mut Config, assignments: &[String]) -> Result<()> {
    for a in assignments {
        let (key, value) = a
            .split_once('=')
            .ok_or_else(|| BlinkError::Config(format!("expected KEY=VALUE, got \"{a}\"")))?;
        config.set(key.trim(), value).map_err(BlinkError::Config)?;
    }
    config.save()?;
    log::debug!("[config] saved {} setting(s)", assignments.len());
    Ok(())
}

pub(super) fn cmd_config(json: bool, mut config: Config, set: &[String]) -> Result<()> {
    if !set.is_empty() {
        apply_and_save(&mut config, set)?;
    }
    let config = &config;

    let config_path = Config::path();
    let config_exists = config_path.as_ref().is_some_and(|p| p.exists());

    if json {
        let output = ConfigOutput {
            config_file: config_path.as_ref().map(|p| p.display().to_string()),
            config_file_exists: config_exists,
            settings: config.clone(),
        };
        println!("{}", serde_json::to_string_pretty(&output).unwrap());
        return Ok(());
    }

    match &config_path {
        Some(p) if config_exists => kv("Config file:", format_args!("{} (loaded)", p.display()), WIDTH),
        Some(p) => kv(
            "Config file:",
            format_args!("{} (not found, using defaults)", p.display()),
            WIDTH,
        ),
        None => kv("Config file:", "(no config directory)", WIDTH),
    }
    println!();

    println!("Settings:");
    let serial = config.serial().unwrap_or("(first free device)");
    kv_indent("device_serial:", serial, WIDTH);
    kv_indent("idle_interval_ms:", config.idle_interval_ms, WIDTH);
    kv_indent("default_fade_ms:", config.default_fade_ms, WIDTH);
    kv_indent("default_hold_ms:", config.default_hold_ms, WIDTH);

    if let Err(errors) = config.validate() {
        println!();
        println!("Problems:");
        for e in errors {
            println!("  {e}");
        }
    }
    Ok(())
}
