//! Application-level configuration loading, including the reaction set and theater cadences.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use time::OffsetDateTime;

use crate::{dao::models::Premiere, player::sync::DEFAULT_TOLERANCE, reactions::ReactionSettings};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "PREMIERE_THEATER_CONFIG_PATH";

/// Timers and tolerances driving one viewing session.
#[derive(Debug, Clone, PartialEq)]
pub struct TheaterSettings {
    /// Reaction overlay tunables.
    pub reactions: ReactionSettings,
    /// Accepted drift between main and ambient players.
    pub drift_tolerance: Duration,
    /// Countdown tick period.
    pub countdown_interval: Duration,
    /// Period of the expired-reaction sweep.
    pub sweep_interval: Duration,
    /// Period of the ambient drift check.
    pub reconcile_interval: Duration,
    /// Pointer inactivity after which controls hide while playing.
    pub controls_idle: Duration,
    /// Upper bound for the premiere/token loads.
    pub load_timeout: Duration,
}

impl Default for TheaterSettings {
    fn default() -> Self {
        Self {
            reactions: ReactionSettings::default(),
            drift_tolerance: DEFAULT_TOLERANCE,
            countdown_interval: Duration::from_secs(1),
            sweep_interval: Duration::from_millis(500),
            reconcile_interval: Duration::from_secs(2),
            controls_idle: Duration::from_secs(3),
            load_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Default)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    theater: TheaterSettings,
    premieres: Vec<Premiere>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        emojis = app_config.theater.reactions.emojis.len(),
                        premieres = app_config.premieres.len(),
                        "loaded theater settings from config"
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

    /// Parse a JSON document; absent fields keep their defaults.
    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }

    /// Settings served to viewing clients; the server itself applies `load_timeout`.
    pub fn theater(&self) -> &TheaterSettings {
        &self.theater
    }

    /// Premieres seeded into the in-memory store.
    pub fn premieres(&self) -> &[Premiere] {
        &self.premieres
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    reactions: RawReactions,
    drift_tolerance_ms: Option<u64>,
    countdown_interval_ms: Option<u64>,
    sweep_interval_ms: Option<u64>,
    reconcile_interval_ms: Option<u64>,
    controls_idle_ms: Option<u64>,
    load_timeout_ms: Option<u64>,
    premieres: Vec<RawPremiere>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPremiere {
    id: String,
    title: String,
    #[serde(default)]
    description: Option<String>,
    playback_id: String,
    #[serde(default)]
    thumbnail_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    scheduled_at: OffsetDateTime,
    #[serde(default)]
    is_live: bool,
}

impl From<RawPremiere> for Premiere {
    fn from(value: RawPremiere) -> Self {
        Premiere {
            id: value.id,
            title: value.title,
            description: value.description,
            playback_id: value.playback_id,
            asset_id: None,
            thumbnail_url: value.thumbnail_url,
            scheduled_at: value.scheduled_at,
            is_live: value.is_live,
            created_at: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawReactions {
    emojis: Option<Vec<String>>,
    lifetime_ms: Option<u64>,
    max_visible: Option<usize>,
    min_x: Option<f64>,
    max_x: Option<f64>,
    self_echo: Option<bool>,
}

impl From<RawReactions> for ReactionSettings {
    fn from(value: RawReactions) -> Self {
        let defaults = ReactionSettings::default();
        ReactionSettings {
            emojis: value
                .emojis
                .filter(|emojis| !emojis.is_empty())
                .unwrap_or(defaults.emojis),
            lifetime: millis_or(value.lifetime_ms, defaults.lifetime),
            max_visible: value.max_visible.unwrap_or(defaults.max_visible),
            min_x: value.min_x.unwrap_or(defaults.min_x),
            max_x: value.max_x.unwrap_or(defaults.max_x),
            self_echo: value.self_echo.unwrap_or(defaults.self_echo),
        }
        .normalized()
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = TheaterSettings::default();
        let theater = TheaterSettings {
            reactions: value.reactions.into(),
            drift_tolerance: millis_or(value.drift_tolerance_ms, defaults.drift_tolerance),
            countdown_interval: millis_or(value.countdown_interval_ms, defaults.countdown_interval),
            sweep_interval: millis_or(value.sweep_interval_ms, defaults.sweep_interval),
            reconcile_interval: millis_or(value.reconcile_interval_ms, defaults.reconcile_interval),
            controls_idle: millis_or(value.controls_idle_ms, defaults.controls_idle),
            load_timeout: millis_or(value.load_timeout_ms, defaults.load_timeout),
        };
        Self {
            theater,
            premieres: value.premieres.into_iter().map(Into::into).collect(),
        }
    }
}

/// Zero durations would turn intervals into busy loops; they fall back to the default.
fn millis_or(value: Option<u64>, default: Duration) -> Duration {
    value
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .unwrap_or(default)
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
