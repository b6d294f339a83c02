//! Offer filter
//!
//! Hides offers that are not worth looking at: cheap cards, or members with too
//! few points. Offers from members with any alert are always kept.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::aggregator::OfferBook;
use crate::settings::FilterSettings;

/// Why an offer was hidden
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterReason {
    CardValue,
    MemberPoints,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterReport {
    /// Hidden trade ids in table order
    pub hidden_trade_ids: Vec<String>,
    pub filtered_count: usize,
    pub visible_count: usize,
    pub by_card_value: usize,
    pub by_member_points: usize,
}

/// Returns the reason an offer should be hidden, checking card value first
pub fn filter_reason(card_points: u32, member_points: u32, settings: &FilterSettings) -> Option<FilterReason> {
    if settings.cards_by_value && card_points < settings.cards_min_value {
        Some(FilterReason::CardValue)
    } else if settings.members_by_points && member_points < settings.members_min_points {
        Some(FilterReason::MemberPoints)
    } else {
        None
    }
}

/// Applies the filter to every offer in the book.
/// Must run after the alert check so the `has_alert` flags are set.
pub fn filter_offers(book: &OfferBook, settings: &FilterSettings) -> FilterReport {
    let mut report = FilterReport::default();

    for record in &book.records {
        let Some(member) = book.member(&record.member_id) else {
            continue;
        };
        if member.has_alert {
            continue;
        }

        match filter_reason(record.card_points, member.member_points, settings) {
            Some(FilterReason::CardValue) => {
                trace!(card = %record.card_name, card_points = record.card_points, "filtering trade");
                report.by_card_value += 1;
            }
            Some(FilterReason::MemberPoints) => {
                trace!(member = %record.member_name, member_points = member.member_points, "filtering member");
                report.by_member_points += 1;
            }
            None => continue,
        }
        report.hidden_trade_ids.push(record.trade_id.clone());
    }

    report.filtered_count = report.hidden_trade_ids.len();
    report.visible_count = book.records.len() - report.filtered_count;

    if report.filtered_count > 0 {
        debug!(
            filtered = report.filtered_count,
            by_card_value = report.by_card_value,
            by_member_points = report.by_member_points,
            visible = report.visible_count,
            "offers filtered"
        );
    }
    report
}
