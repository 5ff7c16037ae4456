//! Core contracts for fliptick.
//!
//! This crate contains:
//! - Canonical domain models and validation
//! - Length-bounded batch planning and the rate-limited fetch client
//! - The pure flip calculator and opportunity ranking
//! - The analysis session exposed to presentation layers

pub mod analysis;
pub mod batching;
pub mod domain;
pub mod error;
pub mod flip;
pub mod http_client;
pub mod market_api;
pub mod ranking;
pub mod region;
pub mod retry;
pub mod throttling;

pub use analysis::{
    AnalysisConfig, AnalysisReport, CityReport, EditOutcome, MarketAnalyzer, MarketStats,
    RefreshReport,
};
pub use batching::{plan_batches, PlanError, RequestTemplate, MAX_URL_LENGTH};
pub use domain::{
    City, FlipOpportunity, HistoricalSnapshot, ItemId, ItemKey, ItemStats, PopularItem, Quality,
    Quote, Roi, UtcDateTime,
};
pub use error::{CoreError, ValidationError};
pub use flip::{compute, compute_with_cap, recompute, FlipConfig, PriceField};
pub use http_client::{
    HttpClient, HttpError, HttpRequest, HttpResponse, NoopHttpClient, ReqwestHttpClient,
};
pub use market_api::{FetchError, FetchOutcome, HistoryOutcome, MarketDataClient};
pub use ranking::{rank, SortKey, SuppressionList};
pub use region::Region;
pub use retry::{Backoff, RetryConfig};
pub use throttling::{RateGate, RatePolicy};

pub use fliptick_warehouse::{
    HistoryStore, KeyRecord, SnapshotRecord, StatsRow, StatsWindow, StoreConfig, StoreError,
    TopItemRow,
};
