// src/models.rs
// Core types shared by the aggregator, alert engine, filter and scheduler

use serde::{Deserialize, Serialize};
use std::fmt;

/// One offer currently visible in the trade stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trade_id: String,
    pub member_id: String,
    pub member_name: String,
    pub member_points: u32,
    pub country: String,
    #[serde(default)]
    pub card_set: String,
    pub card_name: String,
    pub card_points: u32,
}

/// Raw unshipped-trade row as delivered by the ingestor.
/// `member_id` is `None` when the row lost its profile link upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingRow {
    pub member_id: Option<String>,
    #[serde(default)]
    pub member_name: String,
    pub card_points: u32,
}

/// Unshipped outbound trades folded per receiving member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingRecord {
    pub member_id: String,
    pub member_name: String,
    pub card_qty: u32,
    pub total_points: u32,
}

/// Collapsed view of every offer one member made during a single poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberAggregate {
    pub member_id: String,
    pub member_name: String,
    pub member_points: u32,
    pub country: String,
    /// Number of wanted offers, always equal to `trade_ids.len()`
    pub card_qty: u32,
    /// (trade_id, card_points) in discovery order
    pub trade_ids: Vec<(String, u32)>,
    /// Sum of the card points in `trade_ids`, saturating at `u32::MAX`
    pub total_card_points: u32,
    pub has_alert: bool,
    pub has_bundle_alert: bool,
    pub has_outgoing_alert: bool,
}

impl MemberAggregate {
    /// Creates an empty aggregate seeded from the member's first offer
    pub fn from_first_offer(record: &TradeRecord) -> Self {
        Self {
            member_id: record.member_id.clone(),
            member_name: record.member_name.clone(),
            member_points: record.member_points,
            country: record.country.clone(),
            card_qty: 0,
            trade_ids: Vec::new(),
            total_card_points: 0,
            has_alert: false,
            has_bundle_alert: false,
            has_outgoing_alert: false,
        }
    }

    /// Folds one more offer into the aggregate
    pub fn push_offer(&mut self, trade_id: &str, card_points: u32) {
        self.card_qty += 1;
        self.total_card_points = self.total_card_points.saturating_add(card_points);
        self.trade_ids.push((trade_id.to_string(), card_points));
    }

    /// First offer discovered for this member, used as the display anchor
    pub fn first_trade_id(&self) -> Option<&str> {
        self.trade_ids.first().map(|(id, _)| id.as_str())
    }

    /// True when the member cannot afford everything they asked for
    pub fn is_over_budget(&self) -> bool {
        self.total_card_points > self.member_points
    }
}

/// Which rule produced an alert. When both apply, `Outgoing` wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertKind {
    Bundle,
    Outgoing,
}

/// Display hint for the alert's value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertStyle {
    Normal,
    /// Member wants more than they can pay for
    Warning,
}

impl fmt::Display for AlertStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertStyle::Normal => f.write_str(""),
            AlertStyle::Warning => f.write_str("text-warning"),
        }
    }
}

/// One alert produced by a single alert check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub member_id: String,
    pub kind: AlertKind,
    pub message: String,
    pub style: AlertStyle,
    pub value: u32,
    pub is_new: bool,
    /// `is_new`, except on the first check of a session
    pub show_new_marker: bool,
    pub anchor_trade_id: Option<String>,
}

/// Opaque notifications for the analytics collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalyticsEvent {
    Reload,
    Alert,
    Send { card_points: u32 },
}

impl fmt::Display for AnalyticsEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalyticsEvent::Reload => f.write_str("Reload"),
            AnalyticsEvent::Alert => f.write_str("Alert"),
            AnalyticsEvent::Send { card_points } => write!(f, "Send ({} card points)", card_points),
        }
    }
}

/// Severity of a user-facing note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteLevel {
    Info,
    Success,
    Warning,
    Muted,
}

/// Short status line for the display layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub text: String,
    pub level: NoteLevel,
}

impl Note {
    pub fn new(text: impl Into<String>, level: NoteLevel) -> Self {
        Self {
            text: text.into(),
            level,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn offer(trade_id: &str, member_id: &str, card_points: u32) -> TradeRecord {
        TradeRecord {
            trade_id: trade_id.to_string(),
            member_id: member_id.to_string(),
            member_name: "Alice".to_string(),
            member_points: 300,
            country: "US".to_string(),
            card_set: String::new(),
            card_name: "Lightning Bolt".to_string(),
            card_points,
        }
    }

    #[test]
    fn test_member_aggregate_starts_empty() {
        let aggregate = MemberAggregate::from_first_offer(&offer("uc_1", "m1", 120));

        assert_eq!(aggregate.member_id, "m1");
        assert_eq!(aggregate.member_points, 300);
        assert_eq!(aggregate.card_qty, 0);
        assert_eq!(aggregate.total_card_points, 0);
        assert!(aggregate.trade_ids.is_empty());
        assert!(!aggregate.has_alert);
        assert!(!aggregate.has_bundle_alert);
        assert!(!aggregate.has_outgoing_alert);
    }

    #[test]
    fn test_push_offer_keeps_counters_in_sync() {
        let mut aggregate = MemberAggregate::from_first_offer(&offer("uc_1", "m1", 120));
        aggregate.push_offer("uc_1", 120);
        aggregate.push_offer("uc_2", 80);

        assert_eq!(aggregate.card_qty, 2);
        assert_eq!(aggregate.total_card_points, 200);
        assert_eq!(aggregate.first_trade_id(), Some("uc_1"));
        assert!(!aggregate.is_over_budget());

        aggregate.push_offer("uc_3", 150);
        assert!(aggregate.is_over_budget());
    }

    #[test]
    fn test_trade_record_card_set_defaults_when_missing() {
        let json = r#"{
            "trade_id": "uc_9",
            "member_id": "m9",
            "member_name": "Bob",
            "member_points": 40,
            "country": "DE",
            "card_name": "Counterspell",
            "card_points": 25
        }"#;

        let record: TradeRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.card_set, "");
        assert_eq!(record.card_points, 25);
    }

    #[test]
    fn test_analytics_event_display() {
        assert_eq!(AnalyticsEvent::Reload.to_string(), "Reload");
        assert_eq!(AnalyticsEvent::Send { card_points: 75 }.to_string(), "Send (75 card points)");
    }
}
