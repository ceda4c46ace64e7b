use std::time::Duration;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{config::TheaterSettings, reactions::ReactionSettings};

/// Theater settings handed to viewing clients.
///
/// Field names match the config file, so a client can feed the body to
/// [`AppConfig::from_json`](crate::config::AppConfig::from_json) and start its session with
/// the server's reaction set, drift tolerance and cadences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TheaterSettingsResponse {
    pub reactions: ReactionSettingsResponse,
    pub drift_tolerance_ms: u64,
    pub countdown_interval_ms: u64,
    pub sweep_interval_ms: u64,
    pub reconcile_interval_ms: u64,
    pub controls_idle_ms: u64,
    pub load_timeout_ms: u64,
}

/// Reaction overlay part of [`TheaterSettingsResponse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReactionSettingsResponse {
    /// Emojis offered in the picker.
    pub emojis: Vec<String>,
    pub lifetime_ms: u64,
    pub max_visible: usize,
    /// Horizontal spawn range, in percent of the stage width.
    pub min_x: f64,
    pub max_x: f64,
    pub self_echo: bool,
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl From<&ReactionSettings> for ReactionSettingsResponse {
    fn from(settings: &ReactionSettings) -> Self {
        Self {
            emojis: settings.emojis.clone(),
            lifetime_ms: millis(settings.lifetime),
            max_visible: settings.max_visible,
            min_x: settings.min_x,
            max_x: settings.max_x,
            self_echo: settings.self_echo,
        }
    }
}

impl From<&TheaterSettings> for TheaterSettingsResponse {
    fn from(settings: &TheaterSettings) -> Self {
        Self {
            reactions: (&settings.reactions).into(),
            drift_tolerance_ms: millis(settings.drift_tolerance),
            countdown_interval_ms: millis(settings.countdown_interval),
            sweep_interval_ms: millis(settings.sweep_interval),
            reconcile_interval_ms: millis(settings.reconcile_interval),
            controls_idle_ms: millis(settings.controls_idle),
            load_timeout_ms: millis(settings.load_timeout),
        }
    }
}
