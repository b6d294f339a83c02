// src/poll.rs
// One alert-check cycle: aggregate -> alerts -> filter -> notes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::aggregator::aggregate_offers;
use crate::alerts::{AlertEngine, RowHighlight, TriggerEffects};
use crate::filter::filter_offers;
use crate::models::{AlertRecord, AnalyticsEvent, Note, NoteLevel, TradeRecord};
use crate::session::Session;

/// Everything the display layer needs after one cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollReport {
    pub completed_at: DateTime<Utc>,
    pub offer_count: usize,
    pub member_count: usize,
    pub duplicates: usize,
    pub alerts: Vec<AlertRecord>,
    pub new_count: usize,
    pub effects: TriggerEffects,
    pub row_highlights: Vec<RowHighlight>,
    pub point_warnings: Vec<String>,
    pub hidden_trade_ids: Vec<String>,
    pub filtered_count: usize,
    pub visible_count: usize,
    pub notes: Vec<Note>,
    pub analytics: Vec<AnalyticsEvent>,
}

/// Runs the fixed pipeline over the offers collected for this cycle.
/// Outgoing trades come from the session's cache.
pub fn run_cycle(session: &mut Session, records: Vec<TradeRecord>) -> PollReport {
    let mut book = aggregate_offers(records);

    let (settings, state) = session.parts_mut();
    state.last_card_points = book.card_points();

    let outgoing = state.outgoing.clone();
    let alert_report = AlertEngine::new().check(&mut book, &outgoing, &settings.alert, state);
    let filter_report = filter_offers(&book, &settings.filter);
    state.polls += 1;

    let mut notes: Vec<Note> = alert_report
        .alerts
        .iter()
        .map(|alert| Note::new(alert.message.clone(), NoteLevel::Info))
        .collect();
    if filter_report.filtered_count > 0 {
        notes.push(Note::new(
            format!("Filtered {} trades", filter_report.filtered_count),
            NoteLevel::Muted,
        ));
    }

    info!(
        offers = book.offer_count(),
        members = book.member_count(),
        alerts = alert_report.alerts.len(),
        new = alert_report.new_count,
        filtered = filter_report.filtered_count,
        "poll complete"
    );

    PollReport {
        completed_at: Utc::now(),
        offer_count: book.offer_count(),
        member_count: book.member_count(),
        duplicates: book.duplicates,
        alerts: alert_report.alerts,
        new_count: alert_report.new_count,
        effects: alert_report.effects,
        row_highlights: alert_report.row_highlights,
        point_warnings: alert_report.point_warnings,
        hidden_trade_ids: filter_report.hidden_trade_ids,
        filtered_count: filter_report.filtered_count,
        visible_count: filter_report.visible_count,
        notes,
        analytics: alert_report.analytics,
    }
}
