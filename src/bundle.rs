//! Bundle Optimizer
//!
//! Finds the most valuable subset of a member's offers that the member can
//! actually pay for. Each offer's point value is both its weight and its
//! profit, so this is bounded 0/1 subset-sum rather than general knapsack.
//!
//! The search keeps one bundle per achievable sum, seeded with the empty bundle
//! at 0. Every offer extends each sum that existed before it was considered.
//! When two bundles reach the same sum, the one with fewer offers is kept, and
//! on equal counts the bundle registered first stays.
//!
//! Cost is bounded by (distinct sums <= capacity + 1) x offers, so the alert
//! engine only calls in here when the total alone cannot answer the question.

use std::collections::BTreeMap;

/// Best affordable subset found for one member
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bundle {
    /// Sum of the chosen offers, never above the capacity
    pub value: u32,
    /// Chosen trade ids, in input order
    pub chosen_ids: Vec<String>,
}

/// Returns the maximum-value subset of `trades` whose sum does not exceed `capacity`.
///
/// If `target_value` is set, the search stops after the first offer that lifts the
/// best sum to or past the target. The returned value then only proves the bound;
/// it is not necessarily the optimum.
pub fn best_bundle<S: AsRef<str>>(trades: &[(S, u32)], capacity: u32, target_value: Option<u32>) -> Bundle {
    // sum -> indices into `trades` (ascending) of the fewest-offer bundle reaching it
    let mut bundles: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    bundles.insert(0, Vec::new());
    let mut best_value = 0u32;

    for (idx, (_, value)) in trades.iter().enumerate() {
        let value = *value;

        // Extend only the sums that existed before this offer
        let proposals: Vec<(u32, Vec<usize>)> = bundles
            .iter()
            .filter_map(|(&sum, items)| {
                let new_sum = sum.checked_add(value)?;
                if new_sum > capacity {
                    return None;
                }
                let mut extended = Vec::with_capacity(items.len() + 1);
                extended.extend_from_slice(items);
                extended.push(idx);
                Some((new_sum, extended))
            })
            .collect();

        for (new_sum, extended) in proposals {
            match bundles.get_mut(&new_sum) {
                Some(existing) => {
                    if extended.len() < existing.len() {
                        *existing = extended;
                    }
                }
                None => {
                    bundles.insert(new_sum, extended);
                    best_value = best_value.max(new_sum);
                }
            }
        }

        if let Some(target) = target_value {
            if best_value >= target {
                break;
            }
        }
    }

    let chosen_ids = bundles
        .remove(&best_value)
        .unwrap_or_default()
        .into_iter()
        .map(|idx| trades[idx].0.as_ref().to_string())
        .collect();

    Bundle {
        value: best_value,
        chosen_ids,
    }
}
