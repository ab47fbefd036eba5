//! Application configuration — TOML-based, platform-aware paths.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::worker::WorkerConfig;

/// Header comment prepended to saved config files.
const CONFIG_HEADER: &str = "# blinkloop configuration\n\n";

/// Longest fade or hold the device timer can express (u16 centiseconds).
pub const MAX_DURATION_MS: u32 = u16::MAX as u32 * 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Preferred device serial number. Empty = first free device.
    #[serde(default)]
    pub device_serial: String,

    /// Worker re-check interval while disabled or empty, in milliseconds.
    #[serde(default = "default_idle_interval_ms")]
    pub idle_interval_ms: u64,

    /// Fade time for loop steps that don't give one.
    #[serde(default = "default_fade_ms")]
    pub default_fade_ms: u32,

    /// Hold time for loop steps that don't give one.
    #[serde(default = "default_hold_ms")]
    pub default_hold_ms: u32,
}

fn default_idle_interval_ms() -> u64 {
    1000
}
fn default_fade_ms() -> u32 {
    500
}
fn default_hold_ms() -> u32 {
    1000
}

impl Default for Config {
    fn default() -> Self {
        Config {
            device_serial: String::new(),
            idle_interval_ms: default_idle_interval_ms(),
            default_fade_ms: default_fade_ms(),
            default_hold_ms: default_hold_ms(),
        }
    }
}

/// Validation errors that [`Config::validate`] can return.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// `idle_interval_ms` is zero (the worker would spin).
    ZeroIdleInterval,
    /// `default_fade_ms` exceeds [`MAX_DURATION_MS`].
    FadeTooLong(u32),
    /// `device_serial` is not a hex string.
    InvalidSerial(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::ZeroIdleInterval => write!(f, "idle_interval_ms must be at least 1"),
            ValidationError::FadeTooLong(ms) => {
                write!(f, "default_fade_ms {ms} exceeds {MAX_DURATION_MS}")
            }
            ValidationError::InvalidSerial(s) => {
                write!(f, "Invalid device_serial: \"{s}\" (expected hex digits)")
            }
        }
    }
}

impl Config {
    /// Platform-specific config directory.
    pub fn dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("blinkloop"))
    }

    /// Full path to config file.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("config.toml"))
    }

    /// Load config from disk, or return defaults if not found.
    pub fn load() -> Self {
        let (config, warnings) = Self::load_with_warnings();
        for w in &warnings {
            log::warn!("{w}");
        }
        config
    }

    /// Save config to an arbitrary path atomically (write to temp file, then rename).
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let serialized = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        let contents = format!("{CONFIG_HEADER}{serialized}");
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, &contents)?;
        match std::fs::rename(&tmp, path) {
            Ok(()) => Ok(()),
            Err(_) => {
                // Rename can fail across filesystems; fall back to direct write + cleanup
                let result = std::fs::write(path, &contents);
                let _ = std::fs::remove_file(&tmp);
                result
            }
        }
    }

    /// Save config to the default platform path.
    pub fn save(&self) -> std::io::Result<()> {
        let Some(path) = Self::path() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No config directory",
            ));
        };
        self.save_to(&path)
    }

    /// Load config from an arbitrary path, returning the config and any parse warnings.
    ///
    /// Returns `(defaults, [])` if the file doesn't exist.
    /// Returns `(defaults, [warning])` if the file exists but can't be parsed.
    pub fn load_from(path: &Path) -> (Self, Vec<String>) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => (config, vec![]),
                Err(e) => {
                    let warning = format!(
                        "config parse error ({}), using defaults: {e}",
                        path.display()
                    );
                    (Self::default(), vec![warning])
                }
            },
            Err(_) => (Self::default(), vec![]),
        }
    }

    /// Load config from the default path, returning the config and any parse warnings.
    pub fn load_with_warnings() -> (Self, Vec<String>) {
        let Some(path) = Self::path() else {
            return (Self::default(), vec![]);
        };
        Self::load_from(&path)
    }

    /// Preferred serial, or `None` to take the first free device.
    pub fn serial(&self) -> Option<&str> {
        let s = self.device_serial.trim();
        (!s.is_empty()).then_some(s)
    }

    /// Worker timing derived from this config. A zero idle interval is
    /// raised to 1 ms.
    pub fn worker(&self) -> WorkerConfig {
        WorkerConfig {
            idle_interval: Duration::from_millis(self.idle_interval_ms.max(1)),
        }
    }

    /// Names accepted by [`set`](Self::set).
    pub const KEYS: [&'static str; 4] = [
        "device_serial",
        "idle_interval_ms",
        "default_fade_ms",
        "default_hold_ms",
    ];

    /// Set one field from its string form. An empty `device_serial` clears it.
    ///
    /// Leaves `self` unchanged if the key is unknown, the value doesn't
    /// parse, or the result fails [`validate`](Self::validate).
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        let value = value.trim();
        let number = |v: &str| {
            v.parse::<u32>()
                .map_err(|_| format!("{key}: expected a number of milliseconds, got \"{v}\""))
        };
        let mut next = self.clone();
        match key {
            "device_serial" => next.device_serial = value.to_string(),
            "idle_interval_ms" => next.idle_interval_ms = number(value)? as u64,
            "default_fade_ms" => next.default_fade_ms = number(value)?,
            "default_hold_ms" => next.default_hold_ms = number(value)?,
            _ => {
                return Err(format!(
                    "unknown key \"{key}\" (expected one of: {})",
                    Self::KEYS.join(", ")
                ));
            }
        }
        if let Err(errors) = next.validate() {
            let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            return Err(msgs.join("; "));
        }
        *self = next;
        Ok(())
    }

    /// Validate the entire config, collecting all errors.
    pub fn validate(&self) -> std::result::Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.idle_interval_ms == 0 {
            errors.push(ValidationError::ZeroIdleInterval);
        }
        if self.default_fade_ms > MAX_DURATION_MS {
            errors.push(ValidationError::FadeTooLong(self.default_fade_ms));
        }
        if let Some(serial) = self.serial()
            && !serial.chars().all(|c| c.is_ascii_hexdigit())
        {
            errors.push(ValidationError::InvalidSerial(serial.to_string()));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
