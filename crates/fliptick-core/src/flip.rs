//! Pure flip-opportunity derivation.
//!
//! `compute` and `recompute` are side-effect-free functions of their inputs.
//! The live-edit workflow never mutates a derived field in place: it
//! substitutes one input price and re-derives the whole record, so an edit
//! and a fresh computation can never disagree.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::{FlipOpportunity, ItemKey, ItemStats, Quote, Roi, UtcDateTime, ValidationError};

/// Fee and threshold configuration for the calculator.
///
/// The margin formula is the fee-adjusted variant: both fee rates are
/// fractions applied multiplicatively to their side's price. Zero rates
/// reduce the margin to the raw `sell - buy` spread.
#[derive(Debug, Clone, PartialEq)]
pub struct FlipConfig {
    pub buy_order_fee_rate: f64,
    pub sell_order_fee_rate: f64,
    /// Opportunities with lower potential profit are computed but flagged
    /// filterable.
    pub min_profit_threshold: i64,
    /// Fraction of daily volume one order can realistically capture;
    /// `1.0` disables the haircut.
    pub volume_capture: f64,
}

impl Default for FlipConfig {
    fn default() -> Self {
        Self {
            buy_order_fee_rate: 0.025,
            sell_order_fee_rate: 0.025,
            min_profit_threshold: 10_000,
            volume_capture: 0.10,
        }
    }
}

impl FlipConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_fraction("buy_order_fee_rate", self.buy_order_fee_rate)?;
        validate_fraction("sell_order_fee_rate", self.sell_order_fee_rate)?;
        validate_fraction("volume_capture", self.volume_capture)?;
        Ok(())
    }
}

fn validate_fraction(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(ValidationError::InvalidRate { field });
    }
    Ok(())
}

/// The two editable inputs of a flip record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceField {
    Buy,
    Sell,
}

impl PriceField {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy_price",
            Self::Sell => "sell_price",
        }
    }
}

impl Display for PriceField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriceField {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "buy_price" | "buy" => Ok(Self::Buy),
            "sell_price" | "sell" => Ok(Self::Sell),
            other => Err(ValidationError::InvalidPriceField {
                value: other.to_owned(),
            }),
        }
    }
}

/// Derive a flip record from a quote, historical stats, and configuration.
///
/// Buys fill at `buy_price_max`, sells at `sell_price_min`. `computed_at`
/// comes from the quote's observation time, keeping the function pure.
pub fn compute(quote: &Quote, stats: &ItemStats, config: &FlipConfig) -> FlipOpportunity {
    compute_with_cap(quote, stats, config, None)
}

/// Like [`compute`] with an additional caller-supplied volume cap.
pub fn compute_with_cap(
    quote: &Quote,
    stats: &ItemStats,
    config: &FlipConfig,
    volume_cap: Option<u64>,
) -> FlipOpportunity {
    derive(
        quote.key.clone(),
        quote.buy_price_max,
        quote.sell_price_min,
        quote.observed_at,
        stats,
        config,
        volume_cap,
    )
}

/// Re-derive a record after substituting one price field.
///
/// Produces results identical to calling [`compute`] fresh with the
/// substituted input.
pub fn recompute(
    existing: &FlipOpportunity,
    field: PriceField,
    value: u64,
    stats: &ItemStats,
    config: &FlipConfig,
) -> FlipOpportunity {
    let (buy_price, sell_price) = match field {
        PriceField::Buy => (value, existing.sell_price),
        PriceField::Sell => (existing.buy_price, value),
    };

    derive(
        existing.key.clone(),
        buy_price,
        sell_price,
        existing.computed_at,
        stats,
        config,
        None,
    )
}

fn derive(
    key: ItemKey,
    buy_price: u64,
    sell_price: u64,
    computed_at: UtcDateTime,
    stats: &ItemStats,
    config: &FlipConfig,
    volume_cap: Option<u64>,
) -> FlipOpportunity {
    let buy_fee = round_fee(buy_price, config.buy_order_fee_rate);
    let sell_fee = round_fee(sell_price, config.sell_order_fee_rate);
    let flip_margin = sell_price as i64 - buy_price as i64 - buy_fee - sell_fee;

    let captured = stats.avg_volume * config.volume_capture;
    let mut expected_volume = if captured.is_finite() && captured > 0.0 {
        captured.round() as u64
    } else {
        0
    };
    if let Some(cap) = volume_cap {
        expected_volume = expected_volume.min(cap);
    }

    let potential_profit = if flip_margin > 0 {
        flip_margin * expected_volume as i64
    } else {
        0
    };
    let total_investment = buy_price * expected_volume;
    let roi = if total_investment > 0 {
        Roi::Percent(potential_profit as f64 / total_investment as f64 * 100.0)
    } else {
        Roi::Undefined
    };

    FlipOpportunity {
        key,
        buy_price,
        sell_price,
        avg_price: stats.avg_price,
        flip_margin,
        expected_volume,
        potential_profit,
        total_investment,
        roi,
        below_threshold: potential_profit < config.min_profit_threshold,
        computed_at,
    }
}

fn round_fee(price: u64, rate: f64) -> i64 {
    (price as f64 * rate).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{City, ItemId, Quality};

    fn key() -> ItemKey {
        ItemKey::new(
            ItemId::parse("T4_BAG").expect("item id"),
            Quality::NORMAL,
            City::parse("Bridgewatch").expect("city"),
        )
    }

    fn quote(buy_price_max: u64, sell_price_min: u64) -> Quote {
        Quote {
            key: key(),
            sell_price_min,
            sell_price_max: sell_price_min,
            buy_price_min: buy_price_max,
            buy_price_max,
            observed_at: UtcDateTime::parse("2026-03-01T12:00:00Z").expect("timestamp"),
        }
    }

    fn stats(avg_volume: f64) -> ItemStats {
        ItemStats {
            key: key(),
            avg_price: 2900.0,
            avg_volume,
            data_points: 12,
            window_start: UtcDateTime::parse("2026-02-22T12:00:00Z").expect("timestamp"),
            window_end: UtcDateTime::parse("2026-03-01T12:00:00Z").expect("timestamp"),
        }
    }

    fn fee_free_config() -> FlipConfig {
        FlipConfig {
            buy_order_fee_rate: 0.0,
            sell_order_fee_rate: 0.0,
            min_profit_threshold: 0,
            volume_capture: 1.0,
        }
    }

    #[test]
    fn worked_example_with_zero_fees() {
        let record = compute(&quote(2547, 3325), &stats(150.0), &fee_free_config());

        assert_eq!(record.flip_margin, 778);
        assert_eq!(record.expected_volume, 150);
        assert_eq!(record.potential_profit, 116_700);
        assert_eq!(record.total_investment, 2547 * 150);
        assert!(record.is_opportunity());
    }

    #[test]
    fn fees_reduce_the_margin() {
        let config = FlipConfig {
            buy_order_fee_rate: 0.025,
            sell_order_fee_rate: 0.025,
            min_profit_threshold: 0,
            volume_capture: 1.0,
        };
        let record = compute(&quote(1000, 2000), &stats(10.0), &config);

        // 2000 - 1000 - 25 - 50
        assert_eq!(record.flip_margin, 925);
        assert_eq!(record.potential_profit, 9250);
    }

    #[test]
    fn compute_is_pure() {
        let quote = quote(2547, 3325);
        let stats = stats(150.0);
        let config = FlipConfig::default();

        let first = compute(&quote, &stats, &config);
        let second = compute(&quote, &stats, &config);
        assert_eq!(first, second);
    }

    #[test]
    fn recompute_equals_fresh_compute_with_substituted_field() {
        let stats = stats(150.0);
        let config = FlipConfig::default();
        let original = compute(&quote(2547, 3325), &stats, &config);

        let edited = recompute(&original, PriceField::Buy, 3000, &stats, &config);
        let fresh = compute(&quote(3000, 3325), &stats, &config);
        assert_eq!(edited, fresh);

        let edited = recompute(&original, PriceField::Sell, 2400, &stats, &config);
        let fresh = compute(&quote(2547, 2400), &stats, &config);
        assert_eq!(edited, fresh);
    }

    #[test]
    fn edit_pushing_buy_above_sell_kills_the_margin() {
        let stats = stats(150.0);
        let config = fee_free_config();
        let original = compute(&quote(2547, 3325), &stats, &config);

        let edited = recompute(&original, PriceField::Buy, 3325, &stats, &config);
        assert!(edited.flip_margin <= 0);
        assert!(!edited.is_opportunity());
        assert_eq!(edited.potential_profit, 0);
    }

    #[test]
    fn zero_volume_yields_undefined_roi() {
        let record = compute(&quote(2547, 3325), &stats(0.0), &fee_free_config());

        assert_eq!(record.expected_volume, 0);
        assert_eq!(record.total_investment, 0);
        assert_eq!(record.roi, Roi::Undefined);
        assert_eq!(record.roi.value(), None);
    }

    #[test]
    fn caller_cap_bounds_expected_volume() {
        let record = compute_with_cap(&quote(2547, 3325), &stats(150.0), &fee_free_config(), Some(40));
        assert_eq!(record.expected_volume, 40);
    }

    #[test]
    fn volume_capture_haircuts_expected_volume() {
        let config = FlipConfig {
            volume_capture: 0.10,
            ..fee_free_config()
        };
        let record = compute(&quote(2547, 3325), &stats(150.0), &config);
        assert_eq!(record.expected_volume, 15);
    }

    #[test]
    fn below_threshold_records_are_flagged_not_dropped() {
        let config = FlipConfig {
            min_profit_threshold: 1_000_000,
            ..fee_free_config()
        };
        let record = compute(&quote(2547, 3325), &stats(150.0), &config);

        assert!(record.is_opportunity());
        assert!(record.below_threshold);
        assert_eq!(record.potential_profit, 116_700);
    }

    #[test]
    fn config_rejects_out_of_range_rates() {
        let config = FlipConfig {
            buy_order_fee_rate: 1.5,
            ..FlipConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidRate {
                field: "buy_order_fee_rate"
            })
        ));
    }

    #[test]
    fn price_field_parses_both_spellings() {
        assert_eq!("buy_price".parse::<PriceField>().expect("parse"), PriceField::Buy);
        assert_eq!("sell".parse::<PriceField>().expect("parse"), PriceField::Sell);
        assert!("margin".parse::<PriceField>().is_err());
    }
}
