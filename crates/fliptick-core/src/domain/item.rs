use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use fliptick_warehouse::KeyRecord;

use crate::ValidationError;

const MAX_ITEM_ID_LEN: usize = 64;

/// Normalized item identifier, e.g. `T4_BAG` or `T6_2H_BOW@2`.
///
/// Uppercase ASCII alphanumerics and `_`, with at most one `@N` enchantment
/// suffix where `N` is a digit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemId(String);

impl ItemId {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyItemId);
        }

        let normalized = trimmed.to_ascii_uppercase();
        let len = normalized.chars().count();
        if len > MAX_ITEM_ID_LEN {
            return Err(ValidationError::ItemIdTooLong {
                len,
                max: MAX_ITEM_ID_LEN,
            });
        }

        for (index, ch) in normalized.chars().enumerate() {
            let valid = ch.is_ascii_alphanumeric() || ch == '_' || ch == '@';
            if !valid {
                return Err(ValidationError::ItemIdInvalidChar { ch, index });
            }
        }

        if let Some((base, suffix)) = normalized.split_once('@') {
            let well_formed = !base.is_empty()
                && !suffix.contains('@')
                && suffix.parse::<u8>().is_ok();
            if !well_formed {
                return Err(ValidationError::InvalidEnchantmentSuffix {
                    value: normalized.clone(),
                });
            }
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identifier without its enchantment suffix.
    pub fn base(&self) -> &str {
        self.0.split('@').next().unwrap_or(&self.0)
    }

    /// Enchantment level parsed from the `@N` suffix, 0 when absent.
    pub fn enchantment(&self) -> u8 {
        self.0
            .split_once('@')
            .and_then(|(_, suffix)| suffix.parse().ok())
            .unwrap_or(0)
    }
}

impl Display for ItemId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for ItemId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for ItemId {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ItemId> for String {
    fn from(value: ItemId) -> Self {
        value.0
    }
}

/// Item quality tier, 0 through 5.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub struct Quality(u8);

impl Quality {
    pub const NORMAL: Self = Self(1);

    pub const fn new(value: u8) -> Result<Self, ValidationError> {
        if value > 5 {
            return Err(ValidationError::InvalidQuality { value });
        }
        Ok(Self(value))
    }

    pub const fn value(self) -> u8 {
        self.0
    }
}

impl Display for Quality {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for Quality {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quality> for u8 {
    fn from(value: Quality) -> Self {
        value.0
    }
}

/// Marketplace city name, trimmed and non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct City(String);

impl City {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyCity);
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for City {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for City {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for City {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<City> for String {
    fn from(value: City) -> Self {
        value.0
    }
}

/// Unique join key for one tradeable line: quotes, snapshots, and
/// opportunities all join on an exact `ItemKey` match.
///
/// The enchantment level is derived from the item id's `@N` suffix so the
/// two can never disagree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ItemKey {
    pub item_id: ItemId,
    pub quality: Quality,
    pub enchantment: u8,
    pub city: City,
}

impl ItemKey {
    pub fn new(item_id: ItemId, quality: Quality, city: City) -> Self {
        let enchantment = item_id.enchantment();
        Self {
            item_id,
            quality,
            enchantment,
            city,
        }
    }

    pub fn to_record(&self) -> KeyRecord {
        KeyRecord {
            item_id: self.item_id.as_str().to_owned(),
            quality: self.quality.value(),
            enchantment: self.enchantment,
            city: self.city.as_str().to_owned(),
        }
    }

    pub fn from_record(record: &KeyRecord) -> Result<Self, ValidationError> {
        Ok(Self::new(
            ItemId::parse(&record.item_id)?,
            Quality::new(record.quality)?,
            City::parse(&record.city)?,
        ))
    }
}

impl Display for ItemKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(q{})@{}", self.item_id, self.quality, self.city)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_normalizes_item_id() {
        let parsed = ItemId::parse(" t4_bag ").expect("item id should parse");
        assert_eq!(parsed.as_str(), "T4_BAG");
        assert_eq!(parsed.enchantment(), 0);
        assert_eq!(parsed.base(), "T4_BAG");
    }

    #[test]
    fn parses_enchantment_suffix() {
        let parsed = ItemId::parse("T6_2H_BOW@2").expect("item id should parse");
        assert_eq!(parsed.enchantment(), 2);
        assert_eq!(parsed.base(), "T6_2H_BOW");
    }

    #[test]
    fn rejects_malformed_enchantment_suffix() {
        for bad in ["T4_BAG@", "@2", "T4_BAG@X", "T4_BAG@1@2"] {
            let err = ItemId::parse(bad).expect_err("must fail");
            assert!(
                matches!(err, ValidationError::InvalidEnchantmentSuffix { .. }),
                "expected suffix error for {bad}, got {err:?}"
            );
        }
    }

    #[test]
    fn rejects_invalid_chars() {
        let err = ItemId::parse("T4 BAG").expect_err("must fail");
        assert!(matches!(err, ValidationError::ItemIdInvalidChar { .. }));
    }

    #[test]
    fn quality_range_is_enforced() {
        assert!(Quality::new(0).is_ok());
        assert!(Quality::new(5).is_ok());
        assert!(matches!(
            Quality::new(6),
            Err(ValidationError::InvalidQuality { value: 6 })
        ));
    }

    #[test]
    fn item_key_derives_enchantment_from_id() {
        let key = ItemKey::new(
            ItemId::parse("T6_2H_BOW@3").expect("item id"),
            Quality::NORMAL,
            City::parse("Lymhurst").expect("city"),
        );
        assert_eq!(key.enchantment, 3);

        let record = key.to_record();
        assert_eq!(record.enchantment, 3);
        assert_eq!(ItemKey::from_record(&record).expect("round trip"), key);
    }
}
