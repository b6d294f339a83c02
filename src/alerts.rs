//! Alert Engine
//!
//! Decides, per member, whether the offers they made are worth the user's
//! attention, how much they are worth, and whether anything changed since the
//! previous check. It also:
//! - marks the member aggregates with their alert flags
//! - folds alerted offers into the session's cumulative stats
//! - computes row highlights and point warnings for the display layer
//! - requests sound, title and notification at most once per cycle
//!
//! Ordering puts new alerts first and then sorts by value, highest first.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::aggregator::OfferBook;
use crate::bundle::best_bundle;
use crate::models::{
    AlertKind, AlertRecord, AlertStyle, AnalyticsEvent, MemberAggregate, OutgoingRecord,
};
use crate::session::SessionState;
use crate::settings::AlertSettings;

const NEW_MARKER: &str = "\u{2605}";

/// Background color requested for one offer row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowHighlight {
    pub trade_id: String,
    pub color: String,
}

/// Desktop notification request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub text: String,
    pub timeout_ms: u64,
}

/// Effects requested by one alert check. `None` means the effect is not wanted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEffects {
    /// Sound file to play
    pub play_sound: Option<String>,
    /// Text to put in the window title
    pub set_title: Option<String>,
    pub show_notification: Option<NotificationRequest>,
}

impl TriggerEffects {
    pub fn is_empty(&self) -> bool {
        self.play_sound.is_none() && self.set_title.is_none() && self.show_notification.is_none()
    }
}

/// Output of one alert check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertReport {
    /// Alerts ordered new-first, then by value descending
    pub alerts: Vec<AlertRecord>,
    pub new_count: usize,
    pub effects: TriggerEffects,
    pub row_highlights: Vec<RowHighlight>,
    /// Trade ids of alerted offers whose member cannot pay for everything they want
    pub point_warnings: Vec<String>,
    pub analytics: Vec<AnalyticsEvent>,
}

/// Stateless rule set; all memory lives in `SessionState`
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertEngine;

impl AlertEngine {
    pub fn new() -> Self {
        Self
    }

    /// Runs one alert check over the aggregated offers.
    ///
    /// Sets the alert flags on the members in `book`, overwrites
    /// `state.prev_alerts` with this check's alerts and clears the first-check flag.
    pub fn check(
        &self,
        book: &mut OfferBook,
        outgoing: &FxHashMap<String, OutgoingRecord>,
        settings: &AlertSettings,
        state: &mut SessionState,
    ) -> AlertReport {
        debug!(members = book.member_count(), "checking for alerts");

        let first_check = state.is_first_alert_check;
        let mut alerts = Vec::new();

        for member in book.members_mut() {
            if let Some(alert) = self.evaluate_member(member, outgoing, settings, &state.prev_alerts, first_check) {
                alerts.push(alert);
            }
        }

        let new_count = alerts.iter().filter(|a| a.is_new).count();
        let (row_highlights, point_warnings) = mark_rows(book, settings, state);

        let mut report = AlertReport {
            new_count,
            row_highlights,
            point_warnings,
            ..AlertReport::default()
        };

        if !alerts.is_empty() {
            if !settings.on_new_only || new_count > 0 {
                report.effects = request_effects(settings, state);
            }
            report.analytics.push(AnalyticsEvent::Alert);
        }

        // Vec::sort_by is stable, so equal keys keep member discovery order
        alerts.sort_by(|a, b| b.is_new.cmp(&a.is_new).then(b.value.cmp(&a.value)));

        state.prev_alerts = alerts
            .iter()
            .filter_map(|alert| {
                book.member(&alert.member_id).map(|member| {
                    let ids: FxHashSet<String> = member.trade_ids.iter().map(|(id, _)| id.clone()).collect();
                    (alert.member_id.clone(), ids)
                })
            })
            .collect();

        for alert in &alerts {
            info!(member_id = %alert.member_id, value = alert.value, new = alert.is_new, "{}", alert.message);
        }
        debug!("Found {} alerts, {} new or expanded", alerts.len(), new_count);

        state.is_first_alert_check = false;
        report.alerts = alerts;
        report
    }

    /// Builds the alert for one member, or None if no rule qualifies
    fn evaluate_member(
        &self,
        member: &mut MemberAggregate,
        outgoing: &FxHashMap<String, OutgoingRecord>,
        settings: &AlertSettings,
        prev_alerts: &FxHashMap<String, FxHashSet<String>>,
        first_check: bool,
    ) -> Option<AlertRecord> {
        let value = alert_value(member, settings.bundle_threshold);

        let is_new = match prev_alerts.get(&member.member_id) {
            Some(prev) => member.trade_ids.iter().any(|(id, _)| !prev.contains(id)),
            None => true,
        };
        let show_new_marker = is_new && !first_check;

        let style = if member.is_over_budget() {
            AlertStyle::Warning
        } else {
            AlertStyle::Normal
        };

        let mut alert: Option<(AlertKind, String, u32)> = None;

        if settings.on_bundle && value >= settings.bundle_threshold {
            member.has_alert = true;
            member.has_bundle_alert = true;

            let marker = if show_new_marker { format!("{} ", NEW_MARKER) } else { String::new() };
            let message = format!(
                "{} wants {} cards for {} points {}({})",
                member.member_name, member.card_qty, member.total_card_points, marker, member.country
            );
            alert = Some((AlertKind::Bundle, message, value));
        }

        // The outgoing rule wins when both apply
        if settings.on_outgoing {
            if let Some(record) = outgoing.get(&member.member_id) {
                member.has_alert = true;
                member.has_outgoing_alert = true;

                let marker = if show_new_marker { format!(" {}", NEW_MARKER) } else { String::new() };
                let message = format!(
                    "{} has outgoing trades and wants {} more cards for {} points{}",
                    member.member_name, member.card_qty, member.total_card_points, marker
                );
                alert = Some((AlertKind::Outgoing, message, value.saturating_add(record.total_points)));
            }
        }

        let (kind, message, value) = alert?;
        Some(AlertRecord {
            member_id: member.member_id.clone(),
            kind,
            message,
            style,
            value,
            is_new,
            show_new_marker,
            anchor_trade_id: member.first_trade_id().map(str::to_string),
        })
    }
}

/// Value of a member's offers, limited to what the member can afford.
/// The optimizer only runs when the total is at or above the threshold and over budget.
pub fn alert_value(member: &MemberAggregate, bundle_threshold: u32) -> u32 {
    let total = member.total_card_points;
    if total < bundle_threshold || total <= member.member_points {
        return total;
    }

    let bundle = best_bundle(&member.trade_ids, member.member_points, None);
    if bundle.value < bundle_threshold {
        debug!(
            member = %member.member_name,
            member_id = %member.member_id,
            "cannot afford {}",
            bundle_threshold
        );
    }
    bundle.value
}

/// Walks the offers in table order and collects highlights and point warnings
/// for alerted members. Every alerted offer is folded into `seen_alerts`.
fn mark_rows(
    book: &OfferBook,
    settings: &AlertSettings,
    state: &mut SessionState,
) -> (Vec<RowHighlight>, Vec<String>) {
    let mut highlights = Vec::new();
    let mut warnings = Vec::new();

    for record in &book.records {
        let Some(member) = book.member(&record.member_id) else {
            continue;
        };
        if !member.has_alert {
            continue;
        }

        state.seen_alerts.insert(record.trade_id.clone(), record.card_points);

        let mut color = None;
        if settings.colorize_bundle_rows && member.has_bundle_alert {
            color = Some(&settings.colorize_bundle_color);
        }
        if settings.colorize_outgoing_rows && member.has_outgoing_alert {
            color = Some(&settings.colorize_outgoing_color);
        }
        if let Some(color) = color {
            highlights.push(RowHighlight {
                trade_id: record.trade_id.clone(),
                color: color.clone(),
            });
        }

        if member.member_points < member.total_card_points {
            warnings.push(record.trade_id.clone());
        }
    }

    (highlights, warnings)
}

/// Requests each enabled effect unless it already fired this cycle
fn request_effects(settings: &AlertSettings, state: &mut SessionState) -> TriggerEffects {
    let mut effects = TriggerEffects::default();
    let guards = &mut state.triggers;

    if settings.play_sound && !guards.sound_played {
        effects.play_sound = Some(settings.sound_file.clone());
        guards.sound_played = true;
    }
    if !guards.title_changed {
        effects.set_title = Some(settings.title_text.clone());
        guards.title_changed = true;
    }
    if settings.show_notification && !guards.notification_shown {
        effects.show_notification = Some(NotificationRequest {
            text: settings.title_text.clone(),
            timeout_ms: settings.notification_timeout_ms,
        });
        guards.notification_shown = true;
    }

    effects
}
