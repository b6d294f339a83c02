//! Offer Aggregation Module
//!
//! Folds the offer rows collected during one poll into one aggregate per member,
//! dropping rows whose trade id was already seen in the same pass. The outgoing
//! (unshipped) trade rows are folded per receiving member the same way.
//!
//! Everything produced here is poll-scoped: a fresh `OfferAggregator` is built
//! for every reload and nothing survives into the next one.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

use crate::models::{MemberAggregate, OutgoingRecord, OutgoingRow, TradeRecord};

/// Result of one aggregation pass
#[derive(Debug, Clone, Default)]
pub struct OfferBook {
    /// Deduplicated offers in discovery order
    pub records: Vec<TradeRecord>,
    /// Every trade id accepted during the pass
    pub seen: FxHashSet<String>,
    /// Rows dropped because their trade id repeated
    pub duplicates: usize,
    members: Vec<MemberAggregate>,
    index: FxHashMap<String, usize>,
}

impl OfferBook {
    /// Member aggregates in first-seen order
    pub fn members(&self) -> &[MemberAggregate] {
        &self.members
    }

    /// Mutable access for the alert engine, which sets the alert flags
    pub fn members_mut(&mut self) -> &mut [MemberAggregate] {
        &mut self.members
    }

    /// Looks up a member aggregate by member id
    pub fn member(&self, member_id: &str) -> Option<&MemberAggregate> {
        self.index.get(member_id).and_then(|&idx| self.members.get(idx))
    }

    /// Number of distinct members with at least one offer
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Number of accepted offers
    pub fn offer_count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// trade_id -> card points for every accepted offer
    pub fn card_points(&self) -> FxHashMap<String, u32> {
        self.records
            .iter()
            .map(|r| (r.trade_id.clone(), r.card_points))
            .collect()
    }
}

/// Incremental aggregator fed one offer at a time
#[derive(Debug, Default)]
pub struct OfferAggregator {
    book: OfferBook,
}

impl OfferAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an offer to the pass.
    /// Returns false if the trade id was already seen and the row was dropped.
    pub fn add_offer(&mut self, record: TradeRecord) -> bool {
        if self.book.seen.contains(&record.trade_id) {
            debug!(trade_id = %record.trade_id, "duplicate trade id removed");
            self.book.duplicates += 1;
            return false;
        }
        self.book.seen.insert(record.trade_id.clone());

        let idx = match self.book.index.get(&record.member_id) {
            Some(&idx) => idx,
            None => {
                let idx = self.book.members.len();
                self.book.members.push(MemberAggregate::from_first_offer(&record));
                self.book.index.insert(record.member_id.clone(), idx);
                idx
            }
        };
        self.book.members[idx].push_offer(&record.trade_id, record.card_points);
        self.book.records.push(record);
        true
    }

    /// Ends the pass and hands over the aggregated book
    pub fn finish(self) -> OfferBook {
        debug!(
            offers = self.book.records.len(),
            members = self.book.members.len(),
            duplicates = self.book.duplicates,
            "offer aggregation complete"
        );
        self.book
    }
}

/// Aggregates a full list of offers in one call
pub fn aggregate_offers<I>(records: I) -> OfferBook
where
    I: IntoIterator<Item = TradeRecord>,
{
    let mut aggregator = OfferAggregator::new();
    for record in records {
        aggregator.add_offer(record);
    }
    aggregator.finish()
}

/// Folds raw unshipped-trade rows into one record per receiving member.
/// Rows without a member id are skipped with a warning.
pub fn aggregate_outgoing<I>(rows: I) -> FxHashMap<String, OutgoingRecord>
where
    I: IntoIterator<Item = OutgoingRow>,
{
    let mut outgoing: FxHashMap<String, OutgoingRecord> = FxHashMap::default();

    for (position, row) in rows.into_iter().enumerate() {
        let member_id = match row.member_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                warn!(
                    position,
                    member_name = %row.member_name,
                    card_points = row.card_points,
                    "outgoing trade row has no member link, skipping"
                );
                continue;
            }
        };

        outgoing
            .entry(member_id.clone())
            .and_modify(|rec| {
                rec.card_qty += 1;
                rec.total_points = rec.total_points.saturating_add(row.card_points);
            })
            .or_insert_with(|| OutgoingRecord {
                member_id,
                member_name: row.member_name.clone(),
                card_qty: 1,
                total_points: row.card_points,
            });
    }

    outgoing
}
