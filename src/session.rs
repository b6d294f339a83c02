/// Per-session state management
/// Tracks what the user was already alerted to, the trigger-once guards and the session totals

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use crate::models::{AnalyticsEvent, OutgoingRecord};
use crate::settings::{OUTGOING_REFRESH_INTERVAL, Settings};

/// Guards that keep sound, title and notification to one firing per cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerGuards {
    pub sound_played: bool,
    pub title_changed: bool,
    pub notification_shown: bool,
}

/// Everything that survives from one poll to the next
#[derive(Debug, Clone)]
pub struct SessionState {
    /// trade_id -> card points for every offer ever alerted this session
    pub seen_alerts: FxHashMap<String, u32>,
    pub sent_trades: u32,
    /// member_id -> trade ids from the previous alert check
    pub prev_alerts: FxHashMap<String, FxHashSet<String>>,
    pub is_first_alert_check: bool,
    pub triggers: TriggerGuards,
    /// trade_id -> card points from the last completed poll
    pub last_card_points: FxHashMap<String, u32>,
    /// Completed alert-check cycles
    pub polls: u64,
    /// Outgoing trades from the most recent fetch
    pub outgoing: FxHashMap<String, OutgoingRecord>,
    pub last_outgoing_load: Option<Instant>,
    pub force_outgoing_refresh: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            seen_alerts: FxHashMap::default(),
            sent_trades: 0,
            prev_alerts: FxHashMap::default(),
            is_first_alert_check: true,
            triggers: TriggerGuards::default(),
            last_card_points: FxHashMap::default(),
            polls: 0,
            outgoing: FxHashMap::default(),
            last_outgoing_load: None,
            force_outgoing_refresh: false,
        }
    }
}

/// Cumulative statistics across the session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub sent_trades: u32,
    /// Sum of the card points of every distinct alerted offer
    pub alerted_points: u64,
    pub alerted_offers: usize,
    pub polls: u64,
}

/// Settings plus state, threaded explicitly through every cycle
#[derive(Debug, Clone)]
pub struct Session {
    settings: Settings,
    state: SessionState,
}

impl Session {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            state: SessionState::default(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Swaps in freshly read settings; session state is untouched
    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SessionState {
        &mut self.state
    }

    /// Splits the session into its parts for the alert engine
    pub fn parts_mut(&mut self) -> (&Settings, &mut SessionState) {
        (&self.settings, &mut self.state)
    }

    /// Forgets everything learned during the session
    pub fn reset(&mut self) {
        debug!("session state reset");
        self.state = SessionState::default();
    }

    /// Re-arms sound, title and notification for the next cycle
    pub fn reset_triggers(&mut self) {
        self.state.triggers = TriggerGuards::default();
    }

    /// True when the outgoing cache is missing, older than the refresh interval, or a refresh was forced
    pub fn outgoing_needs_refresh(&self, now: Instant) -> bool {
        if self.state.force_outgoing_refresh {
            return true;
        }
        match self.state.last_outgoing_load {
            Some(loaded) => now.saturating_duration_since(loaded) >= OUTGOING_REFRESH_INTERVAL,
            None => true,
        }
    }

    /// Replaces the outgoing cache with a fresh fetch
    pub fn store_outgoing(&mut self, outgoing: FxHashMap<String, OutgoingRecord>, now: Instant) {
        debug!(members = outgoing.len(), "outgoing trades loaded");
        self.state.outgoing = outgoing;
        self.state.last_outgoing_load = Some(now);
        self.state.force_outgoing_refresh = false;
    }

    /// Records that the user committed to send a card.
    /// Returns the analytics event valued from the last poll's cards.
    pub fn record_sent_trade(&mut self, trade_id: &str) -> AnalyticsEvent {
        self.state.sent_trades += 1;
        self.state.force_outgoing_refresh = true;

        let card_points = self.state.last_card_points.get(trade_id).copied().unwrap_or(0);
        debug!(trade_id, card_points, "trade sent, outgoing refresh forced");

        AnalyticsEvent::Send { card_points }
    }

    /// Gets summary statistics for the session
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            sent_trades: self.state.sent_trades,
            alerted_points: self.state.seen_alerts.values().map(|&p| p as u64).sum(),
            alerted_offers: self.state.seen_alerts.len(),
            polls: self.state.polls,
        }
    }

    /// Closing lines shown when the monitor stops
    pub fn summary_lines(&self) -> Vec<String> {
        let stats = self.stats();
        let mut lines = Vec::new();
        if stats.sent_trades > 0 {
            lines.push(format!("Helped you send {} trades this session.", stats.sent_trades));
        }
        if stats.alerted_points > 0 {
            lines.push(format!(
                "Alerted you to {} points in trades this session.",
                stats.alerted_points
            ));
        }
        lines
    }
}
