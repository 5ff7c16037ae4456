//! Opportunity filtering, ordering, and user suppression.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::{FlipOpportunity, ItemKey, Roi, ValidationError};

/// Ranking key for the filtered output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    Profit,
    Roi,
}

impl SortKey {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Profit => "profit",
            Self::Roi => "roi",
        }
    }
}

impl Display for SortKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "profit" => Ok(Self::Profit),
            "roi" => Ok(Self::Roi),
            other => Err(ValidationError::InvalidSortKey {
                value: other.to_owned(),
            }),
        }
    }
}

/// User-initiated removals, keyed by [`ItemKey`] (the key embeds the city).
///
/// Session state, not a derived property: a suppressed record stays out of
/// ranked output across recomputation passes until explicitly cleared.
#[derive(Debug, Clone, Default)]
pub struct SuppressionList {
    inner: Arc<Mutex<HashSet<ItemKey>>>,
}

impl SuppressionList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the key was already suppressed.
    pub fn suppress(&self, key: ItemKey) -> bool {
        self.lock().insert(key)
    }

    /// Returns `false` when the key was not suppressed.
    pub fn unsuppress(&self, key: &ItemKey) -> bool {
        self.lock().remove(key)
    }

    pub fn is_suppressed(&self, key: &ItemKey) -> bool {
        self.lock().contains(key)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<ItemKey>> {
        self.inner.lock().expect("suppression list mutex poisoned")
    }
}

/// Filter and order flip records.
///
/// Retains records with a positive margin and potential profit at or above
/// `min_profit`, drops suppressed keys, sorts descending by the chosen key
/// (ties broken by `item_id` ascending), and optionally truncates.
pub fn rank(
    records: Vec<FlipOpportunity>,
    sort: SortKey,
    min_profit: i64,
    suppressed: &SuppressionList,
    max_results: Option<usize>,
) -> Vec<FlipOpportunity> {
    let mut retained: Vec<FlipOpportunity> = records
        .into_iter()
        .filter(|record| {
            record.is_opportunity()
                && record.potential_profit >= min_profit
                && !suppressed.is_suppressed(&record.key)
        })
        .collect();

    retained.sort_by(|a, b| compare(a, b, sort));

    if let Some(limit) = max_results {
        retained.truncate(limit);
    }
    retained
}

fn compare(a: &FlipOpportunity, b: &FlipOpportunity, sort: SortKey) -> Ordering {
    let primary = match sort {
        SortKey::Profit => b.potential_profit.cmp(&a.potential_profit),
        SortKey::Roi => roi_rank(b.roi).total_cmp(&roi_rank(a.roi)),
    };
    primary.then_with(|| a.key.item_id.as_str().cmp(b.key.item_id.as_str()))
}

// Undefined ROI sorts below every defined percentage.
fn roi_rank(roi: Roi) -> f64 {
    roi.value().unwrap_or(f64::NEG_INFINITY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{City, ItemId, ItemKey, Quality, UtcDateTime};

    fn key(item_id: &str) -> ItemKey {
        ItemKey::new(
            ItemId::parse(item_id).expect("item id"),
            Quality::NORMAL,
            City::parse("Lymhurst").expect("city"),
        )
    }

    fn record(item_id: &str, margin: i64, profit: i64, roi: Roi) -> FlipOpportunity {
        FlipOpportunity {
            key: key(item_id),
            buy_price: 1000,
            sell_price: 2000,
            avg_price: 1500.0,
            flip_margin: margin,
            expected_volume: 10,
            potential_profit: profit,
            total_investment: 10_000,
            roi,
            below_threshold: false,
            computed_at: UtcDateTime::parse("2026-03-01T12:00:00Z").expect("timestamp"),
        }
    }

    #[test]
    fn non_positive_margins_never_surface() {
        let records = vec![
            record("T4_BAG", 100, 1000, Roi::Percent(10.0)),
            record("T5_BAG", 0, 0, Roi::Percent(0.0)),
            record("T6_BAG", -50, 0, Roi::Percent(0.0)),
        ];

        let ranked = rank(records, SortKey::Profit, 0, &SuppressionList::new(), None);
        assert_eq!(ranked.len(), 1);
        assert!(ranked.iter().all(|r| r.flip_margin > 0));
    }

    #[test]
    fn threshold_filters_low_profit_records() {
        let records = vec![
            record("T4_BAG", 100, 5_000, Roi::Percent(50.0)),
            record("T5_BAG", 100, 20_000, Roi::Percent(20.0)),
        ];

        let ranked = rank(records, SortKey::Profit, 10_000, &SuppressionList::new(), None);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].key.item_id.as_str(), "T5_BAG");
    }

    #[test]
    fn profit_sort_breaks_ties_by_item_id() {
        let records = vec![
            record("T6_BAG", 100, 1000, Roi::Percent(10.0)),
            record("T4_BAG", 100, 1000, Roi::Percent(10.0)),
            record("T5_BAG", 100, 2000, Roi::Percent(20.0)),
        ];

        let ranked = rank(records, SortKey::Profit, 0, &SuppressionList::new(), None);
        let ids: Vec<&str> = ranked.iter().map(|r| r.key.item_id.as_str()).collect();
        assert_eq!(ids, vec!["T5_BAG", "T4_BAG", "T6_BAG"]);
    }

    #[test]
    fn roi_sort_puts_undefined_last() {
        let records = vec![
            record("T4_BAG", 100, 1000, Roi::Undefined),
            record("T5_BAG", 100, 1000, Roi::Percent(5.0)),
            record("T6_BAG", 100, 1000, Roi::Percent(25.0)),
        ];

        let ranked = rank(records, SortKey::Roi, 0, &SuppressionList::new(), None);
        let ids: Vec<&str> = ranked.iter().map(|r| r.key.item_id.as_str()).collect();
        assert_eq!(ids, vec!["T6_BAG", "T5_BAG", "T4_BAG"]);
    }

    #[test]
    fn sorting_is_deterministic_across_passes() {
        let records: Vec<FlipOpportunity> = (0..20)
            .map(|i| record(&format!("T{}_THING", i % 7), 100, 1000 * (i % 3), Roi::Percent(i as f64)))
            .collect();

        let first = rank(records.clone(), SortKey::Roi, 0, &SuppressionList::new(), None);
        let second = rank(records, SortKey::Roi, 0, &SuppressionList::new(), None);
        assert_eq!(first, second);
    }

    #[test]
    fn suppressed_keys_stay_out_until_cleared() {
        let suppressed = SuppressionList::new();
        let records = vec![
            record("T4_BAG", 100, 1000, Roi::Percent(10.0)),
            record("T5_BAG", 100, 2000, Roi::Percent(20.0)),
        ];

        assert!(suppressed.suppress(key("T4_BAG")));
        let ranked = rank(records.clone(), SortKey::Profit, 0, &suppressed, None);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].key.item_id.as_str(), "T5_BAG");

        // Still suppressed on the next pass.
        let ranked = rank(records.clone(), SortKey::Profit, 0, &suppressed, None);
        assert_eq!(ranked.len(), 1);

        assert!(suppressed.unsuppress(&key("T4_BAG")));
        let ranked = rank(records, SortKey::Profit, 0, &suppressed, None);
        assert_eq!(ranked.len(), 2);
    }

    #[test]
    fn max_results_truncates_after_sorting() {
        let records = vec![
            record("T4_BAG", 100, 1000, Roi::Percent(10.0)),
            record("T5_BAG", 100, 3000, Roi::Percent(30.0)),
            record("T6_BAG", 100, 2000, Roi::Percent(20.0)),
        ];

        let ranked = rank(records, SortKey::Profit, 0, &SuppressionList::new(), Some(2));
        let ids: Vec<&str> = ranked.iter().map(|r| r.key.item_id.as_str()).collect();
        assert_eq!(ids, vec!["T5_BAG", "T6_BAG"]);
    }
}
