/// Settings and configuration management
/// Persisted user settings, environment overrides and the fixed scheduling constants

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::time::Duration;
use tracing::warn;

use crate::api::ApiConfig;

// ============================================================================
// Scheduling Constants
// ============================================================================

/// Current on-disk settings layout
pub const SETTINGS_VERSION: u32 = 1;

pub const DEFAULT_RELOAD_INTERVAL_SECS: u64 = 60;
/// Reloads are never scheduled closer together than this
pub const MIN_RELOAD_INTERVAL_SECS: u64 = 20;
pub const DEFAULT_MAX_PAGES: u32 = 10;

/// A page with at least this many rows probably has another page behind it
pub const PAGE_GROWTH_MIN_ROWS: usize = 175;
pub const NEXT_PAGE_DELAY: Duration = Duration::from_millis(250);

/// Retry interval while a blocking modal is open
pub const MODAL_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Outgoing trades are refetched at most this often unless forced
pub const OUTGOING_REFRESH_INTERVAL: Duration = Duration::from_secs(120);

pub const DEFAULT_BARRIER_TIMEOUT_SECS: u64 = 120;

// ============================================================================
// Alert Defaults
// ============================================================================

pub const DEFAULT_BUNDLE_THRESHOLD: u32 = 500;
pub const DEFAULT_BUNDLE_COLOR: &str = "#CCFF99";
pub const DEFAULT_OUTGOING_COLOR: &str = "#FFEBB5";
pub const DEFAULT_SOUND_FILE: &str = "alert.mp3";
pub const DEFAULT_TITLE_TEXT: &str = "\u{2605} Trade alert! \u{2605}";
pub const DEFAULT_NOTIFICATION_TIMEOUT_MS: u64 = 7_500;

pub const DEFAULT_CARDS_MIN_VALUE: u32 = 50;
pub const DEFAULT_MEMBERS_MIN_POINTS: u32 = 400;

/// Alert thresholds and effect toggles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    pub on_bundle: bool,
    pub bundle_threshold: u32,
    pub colorize_bundle_rows: bool,
    pub colorize_bundle_color: String,

    pub on_outgoing: bool,
    pub colorize_outgoing_rows: bool,
    pub colorize_outgoing_color: String,

    /// Only fire effects when at least one alert is new
    pub on_new_only: bool,

    pub play_sound: bool,
    pub sound_file: String,
    pub title_text: String,
    pub show_notification: bool,
    pub notification_timeout_ms: u64,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            on_bundle: true,
            bundle_threshold: DEFAULT_BUNDLE_THRESHOLD,
            colorize_bundle_rows: true,
            colorize_bundle_color: DEFAULT_BUNDLE_COLOR.to_string(),
            on_outgoing: true,
            colorize_outgoing_rows: true,
            colorize_outgoing_color: DEFAULT_OUTGOING_COLOR.to_string(),
            on_new_only: false,
            play_sound: true,
            sound_file: DEFAULT_SOUND_FILE.to_string(),
            title_text: DEFAULT_TITLE_TEXT.to_string(),
            show_notification: true,
            notification_timeout_ms: DEFAULT_NOTIFICATION_TIMEOUT_MS,
        }
    }
}

/// Thresholds for hiding uninteresting offers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub cards_by_value: bool,
    pub cards_min_value: u32,
    pub members_by_points: bool,
    pub members_min_points: u32,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            cards_by_value: false,
            cards_min_value: DEFAULT_CARDS_MIN_VALUE,
            members_by_points: false,
            members_min_points: DEFAULT_MEMBERS_MIN_POINTS,
        }
    }
}

/// Everything the monitor reads at the start of a cycle.
/// Missing fields in a stored file take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub version: u32,
    /// Seconds between the end of one cycle and the start of the next
    pub reload_interval: u64,
    pub max_pages: u32,
    pub alert: AlertSettings,
    pub filter: FilterSettings,
    /// tracing filter directive used when RUST_LOG is unset
    pub log_level: String,
    /// How long a cycle may wait for both feeds before it is failed
    pub barrier_timeout_secs: u64,
    pub api_enabled: bool,
    pub api_port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            reload_interval: DEFAULT_RELOAD_INTERVAL_SECS,
            max_pages: DEFAULT_MAX_PAGES,
            alert: AlertSettings::default(),
            filter: FilterSettings::default(),
            log_level: "info".to_string(),
            barrier_timeout_secs: DEFAULT_BARRIER_TIMEOUT_SECS,
            api_enabled: false,
            api_port: 8080,
        }
    }
}

impl Settings {
    /// Builds settings from a stored JSON object one field at a time.
    /// A field whose value does not fit its type keeps the default and the
    /// remaining fields are still applied.
    pub fn from_json_lenient(stored: &Value) -> Settings {
        let defaults = Settings::default();
        let mut merged = match serde_json::to_value(&defaults) {
            Ok(value) => value,
            Err(_) => return defaults,
        };

        let mut leaves = Vec::new();
        collect_leaves(stored, String::new(), &mut leaves);

        for (pointer, value) in leaves {
            let mut candidate = merged.clone();
            match candidate.pointer_mut(&pointer) {
                Some(slot) => *slot = value.clone(),
                // Unknown field, serde would ignore it too
                None => continue,
            }
            if Settings::deserialize(&candidate).is_ok() {
                merged = candidate;
            } else {
                warn!(field = %pointer, value = %value, "invalid setting, keeping default");
            }
        }

        Settings::deserialize(&merged)
            .map(Settings::repaired)
            .unwrap_or_default()
    }

    /// Clamps out-of-range values instead of rejecting them
    pub fn repaired(mut self) -> Self {
        let defaults = Settings::default();

        if self.version != SETTINGS_VERSION {
            // Only one layout exists so far; serde defaults already filled any gaps
            self.version = SETTINGS_VERSION;
        }
        if self.reload_interval < MIN_RELOAD_INTERVAL_SECS {
            self.reload_interval = MIN_RELOAD_INTERVAL_SECS;
        }
        if self.max_pages == 0 {
            self.max_pages = 1;
        }
        if self.alert.bundle_threshold == 0 {
            self.alert.bundle_threshold = defaults.alert.bundle_threshold;
        }
        if self.filter.cards_min_value == 0 {
            self.filter.cards_min_value = defaults.filter.cards_min_value;
        }
        if self.filter.members_min_points == 0 {
            self.filter.members_min_points = defaults.filter.members_min_points;
        }
        if self.barrier_timeout_secs == 0 {
            self.barrier_timeout_secs = defaults.barrier_timeout_secs;
        }
        if self.log_level.trim().is_empty() {
            self.log_level = defaults.log_level;
        }
        self
    }

    /// Applies environment overrides on top of the stored values
    pub fn apply_env_overrides(mut self) -> Self {
        self.reload_interval = env_parse("RELOAD_INTERVAL_SECS", self.reload_interval);
        self.max_pages = env_parse("MAX_PAGES", self.max_pages);
        self.alert.bundle_threshold = env_parse("BUNDLE_THRESHOLD", self.alert.bundle_threshold);
        self.alert.on_new_only = env_parse_bool("ALERT_ON_NEW_ONLY", self.alert.on_new_only);
        self.barrier_timeout_secs = env_parse("BARRIER_TIMEOUT_SECS", self.barrier_timeout_secs);
        self.api_enabled = env_parse_bool("API_ENABLED", self.api_enabled);
        self.api_port = env_parse("API_PORT", self.api_port);
        self.repaired()
    }

    pub fn reload_interval(&self) -> Duration {
        Duration::from_secs(self.reload_interval.max(MIN_RELOAD_INTERVAL_SECS))
    }

    pub fn barrier_timeout(&self) -> Duration {
        Duration::from_secs(self.barrier_timeout_secs)
    }

    /// Convert to ApiConfig for the status server
    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            enabled: self.api_enabled,
            port: self.api_port,
        }
    }
}

/// Collects a JSON pointer for every non-object value under `value`
fn collect_leaves<'a>(value: &'a Value, pointer: String, out: &mut Vec<(String, &'a Value)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let escaped = key.replace('~', "~0").replace('/', "~1");
                collect_leaves(child, format!("{}/{}", pointer, escaped), out);
            }
        }
        _ => out.push((pointer, value)),
    }
}

/// Parse env var with default fallback
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Parse boolean env var with support for "true", "1", "false", "0"
fn env_parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(default)
}

// ============================================================================
// Tests
// ============================================================================
