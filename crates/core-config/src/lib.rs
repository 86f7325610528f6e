//! Configuration loading and parsing.
//!
//! Parses `imkit.toml` (or an override path provided by the binary):
//! `[backend] requested = "<name>"` picks the display backend ahead of
//! auto-detection, `[events] tick_ms = <u32>` sets the housekeeping tick
//! interval. The tick value is clamped into `[TICK_MS_MIN, TICK_MS_MAX]`
//! by `Config::apply_limits`; the raw parsed value is retained so the
//! bounds can be revisited without re-reading the file.
//!
//! Unknown fields are ignored (TOML deserialization tolerance) and a
//! malformed or missing file falls back to defaults.

use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::info;

/// Lower bound on the tick interval; below this the loop would busy-spin.
pub const TICK_MS_MIN: u32 = 50;
/// Upper bound on the tick interval; above this housekeeping stalls.
pub const TICK_MS_MAX: u32 = 60_000;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct BackendConfig {
    /// Backend name requested ahead of auto-detection ("wayland", "x11",
    /// or any backend name honoured by the platform layer).
    #[serde(default)]
    pub requested: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EventsConfig {
    #[serde(default = "EventsConfig::default_tick_ms")]
    pub tick_ms: u32,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            tick_ms: Self::default_tick_ms(),
        }
    }
}

impl EventsConfig {
    const fn default_tick_ms() -> u32 {
        1000
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigFile {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub events: EventsConfig,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub raw: Option<String>, // original file string (optional)
    pub file: ConfigFile,    // parsed (or default) data
    pub effective_tick_ms: u32,
}

/// Best-effort config path following platform conventions: a local
/// `imkit.toml` wins, else the platform config dir.
pub fn discover() -> PathBuf {
    let local = PathBuf::from("imkit.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("imkit").join("imkit.toml");
    }
    PathBuf::from("imkit.toml")
}

pub fn load_from(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(discover);
    if let Ok(content) = fs::read_to_string(&path) {
        match toml::from_str::<ConfigFile>(&content) {
            Ok(file) => Ok(Config {
                raw: Some(content),
                file,
                effective_tick_ms: 0, // computed by apply_limits
            }),
            Err(_e) => {
                // Malformed file falls back to defaults.
                Ok(Config::default())
            }
        }
    } else {
        Ok(Config::default())
    }
}

impl Config {
    /// Clamp the parsed tick interval into its operating bounds. Returns
    /// the effective (possibly clamped) value.
    pub fn apply_limits(&mut self) -> u32 {
        let raw = self.file.events.tick_ms;
        let clamped = raw.clamp(TICK_MS_MIN, TICK_MS_MAX);
        if clamped != raw {
            info!(
                target: "config",
                raw,
                clamped,
                min = TICK_MS_MIN,
                max = TICK_MS_MAX,
                "tick_ms_clamped"
            );
        }
        self.effective_tick_ms = clamped;
        clamped
    }

    /// Effective tick interval. Meaningful after `apply_limits`.
    pub fn effective_tick_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.effective_tick_ms))
    }

    pub fn requested_backend(&self) -> Option<&str> {
        self.file.backend.requested.as_deref()
    }
}
