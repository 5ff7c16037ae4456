use thiserror::Error;

/// Validation and contract errors exposed by `fliptick-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("item id cannot be empty")]
    EmptyItemId,
    #[error("item id length {len} exceeds max {max}")]
    ItemIdTooLong { len: usize, max: usize },
    #[error("item id contains invalid character '{ch}' at index {index}")]
    ItemIdInvalidChar { ch: char, index: usize },
    #[error("item id has a malformed enchantment suffix: '{value}'")]
    InvalidEnchantmentSuffix { value: String },

    #[error("quality {value} is out of range 0-5")]
    InvalidQuality { value: u8 },

    #[error("city cannot be empty")]
    EmptyCity,

    #[error("invalid region '{value}', expected one of americas, asia, europe")]
    InvalidRegion { value: String },
    #[error("invalid sort key '{value}', expected 'profit' or 'roi'")]
    InvalidSortKey { value: String },
    #[error("invalid price field '{value}', expected 'buy_price' or 'sell_price'")]
    InvalidPriceField { value: String },

    #[error("timestamp is not a recognized UTC format: '{value}'")]
    InvalidTimestamp { value: String },

    #[error("'{field}' must be a finite fraction in 0.0..=1.0")]
    InvalidRate { field: &'static str },
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Fetch(#[from] crate::market_api::FetchError),

    #[error(transparent)]
    Store(#[from] fliptick_warehouse::StoreError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error("no tracked opportunity for '{item_id}' in {city}")]
    UnknownOpportunity { item_id: String, city: String },
}
