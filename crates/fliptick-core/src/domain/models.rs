use serde::{Deserialize, Serialize};

use fliptick_warehouse::SnapshotRecord;

use crate::{City, ItemId, ItemKey, Quality, UtcDateTime};

/// Current best bid/ask quote for one tradeable line.
///
/// Prices come from the upstream API unvalidated: zero means "no data", and
/// stale entries may violate the min/max ordering. Callers must check
/// [`Quote::has_flippable_prices`] before treating a price as real.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub key: ItemKey,
    pub sell_price_min: u64,
    pub sell_price_max: u64,
    pub buy_price_min: u64,
    pub buy_price_max: u64,
    pub observed_at: UtcDateTime,
}

impl Quote {
    /// Both sides of the flip carry a non-zero price.
    pub const fn has_flippable_prices(&self) -> bool {
        self.buy_price_max > 0 && self.sell_price_min > 0
    }
}

/// One observed price/volume data point, appended to the history store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoricalSnapshot {
    pub key: ItemKey,
    pub price: u64,
    pub volume: u64,
    pub observed_at: UtcDateTime,
}

impl HistoricalSnapshot {
    pub fn to_record(&self) -> SnapshotRecord {
        SnapshotRecord {
            key: self.key.to_record(),
            price: self.price as i64,
            volume: self.volume as i64,
            observed_at: self.observed_at.format_sql(),
        }
    }
}

/// Rolling statistics derived from snapshots within a window. Derived data:
/// recomputed from the store, never a source of truth.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemStats {
    pub key: ItemKey,
    pub avg_price: f64,
    pub avg_volume: f64,
    pub data_points: u64,
    pub window_start: UtcDateTime,
    pub window_end: UtcDateTime,
}

/// Seed entry for tracking an item before enough history exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopularItem {
    pub item_id: ItemId,
    #[serde(default = "default_quality")]
    pub quality: Quality,
    #[serde(default)]
    pub daily_volume_estimate: f64,
    #[serde(default)]
    pub name: Option<String>,
}

fn default_quality() -> Quality {
    Quality::NORMAL
}

impl PopularItem {
    pub fn key(&self, city: City) -> ItemKey {
        ItemKey::new(self.item_id.clone(), self.quality, city)
    }
}

/// Return on investment, explicitly undefined when no capital is required.
///
/// Serializes as a JSON number, or `null` for the undefined case.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Roi {
    Percent(f64),
    Undefined,
}

impl Roi {
    pub const fn value(self) -> Option<f64> {
        match self {
            Self::Percent(value) => Some(value),
            Self::Undefined => None,
        }
    }
}

/// Derived flip record for one tradeable line. Ephemeral: recreated on every
/// analysis pass and on every edit, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlipOpportunity {
    pub key: ItemKey,
    pub buy_price: u64,
    pub sell_price: u64,
    pub avg_price: f64,
    pub flip_margin: i64,
    pub expected_volume: u64,
    pub potential_profit: i64,
    pub total_investment: u64,
    pub roi: Roi,
    /// Profit under the configured minimum; computed but filtered from
    /// ranked output.
    pub below_threshold: bool,
    pub computed_at: UtcDateTime,
}

impl FlipOpportunity {
    /// Only positive-margin records are surfaced.
    pub const fn is_opportunity(&self) -> bool {
        self.flip_margin > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_prices_are_not_flippable() {
        let key = ItemKey::new(
            ItemId::parse("T4_BAG").expect("item id"),
            Quality::NORMAL,
            City::parse("Lymhurst").expect("city"),
        );
        let quote = Quote {
            key,
            sell_price_min: 0,
            sell_price_max: 0,
            buy_price_min: 0,
            buy_price_max: 2547,
            observed_at: UtcDateTime::parse("2026-03-01T12:00:00Z").expect("timestamp"),
        };

        assert!(!quote.has_flippable_prices());
    }

    #[test]
    fn undefined_roi_serializes_as_null() {
        let undefined = serde_json::to_value(Roi::Undefined).expect("serialize");
        let percent = serde_json::to_value(Roi::Percent(30.5)).expect("serialize");

        assert!(undefined.is_null());
        assert_eq!(percent, serde_json::json!(30.5));
    }

    #[test]
    fn popular_item_defaults_quality_to_normal() {
        let item: PopularItem = serde_json::from_str(
            r#"{"item_id": "T4_BAG", "daily_volume_estimate": 1200.0}"#,
        )
        .expect("deserialize");

        assert_eq!(item.quality, Quality::NORMAL);
        assert_eq!(item.key(City::parse("Lymhurst").expect("city")).enchantment, 0);
    }
}
