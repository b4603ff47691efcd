//! Application-level configuration loading: ring layout and match defaults.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::match_machine::MatchConfig;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "RINGSIDE_BACK_CONFIG_PATH";

/// Shared secret accepted at controller identification when none is configured.
const DEFAULT_CONTROLLER_SECRET: &str = "ringside";
/// Rings laid out for a fresh tournament when none is configured.
const DEFAULT_RING_COUNT: usize = 4;
/// Judge capacity per ring when none is configured.
const DEFAULT_SLOT_COUNT: usize = 3;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    controller_secret: String,
    ring_count: usize,
    default_slot_count: usize,
    default_match_config: MatchConfig,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to baked-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        rings = app_config.ring_count,
                        "loaded application config"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Shared secret controllers must present at identification.
    pub fn controller_secret(&self) -> &str {
        &self.controller_secret
    }

    /// Number of rings laid out for a fresh tournament.
    pub fn ring_count(&self) -> usize {
        self.ring_count
    }

    /// Judge capacity a fresh ring starts with.
    pub fn default_slot_count(&self) -> usize {
        self.default_slot_count
    }

    /// Match configuration a fresh ring starts with.
    pub fn default_match_config(&self) -> &MatchConfig {
        &self.default_match_config
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            controller_secret: DEFAULT_CONTROLLER_SECRET.to_owned(),
            ring_count: DEFAULT_RING_COUNT,
            default_slot_count: DEFAULT_SLOT_COUNT,
            default_match_config: MatchConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    controller_secret: Option<String>,
    ring_count: Option<usize>,
    slot_count: Option<usize>,
    match_config: Option<RawMatchConfig>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            controller_secret: value
                .controller_secret
                .filter(|secret| !secret.is_empty())
                .unwrap_or(defaults.controller_secret),
            ring_count: value.ring_count.filter(|n| *n > 0).unwrap_or(defaults.ring_count),
            default_slot_count: value
                .slot_count
                .filter(|n| *n > 0)
                .unwrap_or(defaults.default_slot_count),
            default_match_config: value
                .match_config
                .map(Into::into)
                .unwrap_or(defaults.default_match_config),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the per-ring match defaults inside the configuration file.
struct RawMatchConfig {
    round_time: Option<u32>,
    break_time: Option<u32>,
    injury_time: Option<u32>,
    two_rounds: Option<bool>,
}

impl From<RawMatchConfig> for MatchConfig {
    fn from(value: RawMatchConfig) -> Self {
        let defaults = MatchConfig::default();
        Self {
            round_time: value.round_time.filter(|n| *n > 0).unwrap_or(defaults.round_time),
            break_time: value.break_time.filter(|n| *n > 0).unwrap_or(defaults.break_time),
            injury_time: value
                .injury_time
                .filter(|n| *n > 0)
                .unwrap_or(defaults.injury_time),
            two_rounds: value.two_rounds.unwrap_or(defaults.two_rounds),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
