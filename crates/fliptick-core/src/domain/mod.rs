mod item;
mod models;
mod timestamp;

pub use item::{City, ItemId, ItemKey, Quality};
pub use models::{FlipOpportunity, HistoricalSnapshot, ItemStats, PopularItem, Quote, Roi};
pub use timestamp::UtcDateTime;
