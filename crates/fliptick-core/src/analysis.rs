//! Analysis session: the operations exposed to presentation layers.
//!
//! One `MarketAnalyzer` owns the fetch client, the history store, the
//! suppression list, and the per-city results of the latest pass. All
//! derived records are recreated on every pass and on every edit; nothing
//! here is a second source of truth.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use fliptick_warehouse::{HistoryStore, SnapshotRecord, StatsWindow};

use crate::flip::{self, FlipConfig, PriceField};
use crate::market_api::MarketDataClient;
use crate::ranking::{rank, SortKey, SuppressionList};
use crate::{City, CoreError, FlipOpportunity, ItemKey, ItemStats, PopularItem, UtcDateTime};

/// Session-level configuration. The fetch region lives on the client.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub cities: Vec<City>,
    /// How many keys to track per city.
    pub tracked_per_city: usize,
    /// Retention horizon for historical snapshots.
    pub retention: Duration,
    /// History aggregation bucket in hours.
    pub history_time_scale: u32,
    /// Keys with fewer snapshots in the window are not ranked as popular.
    pub min_data_points: u64,
    pub flip: FlipConfig,
    pub sort: SortKey,
    /// Ranked output truncation per city.
    pub max_results: Option<usize>,
}

impl AnalysisConfig {
    pub fn new(cities: Vec<City>) -> Self {
        Self {
            cities,
            tracked_per_city: 50,
            retention: Duration::from_secs(7 * 24 * 3600),
            history_time_scale: 24,
            min_data_points: 3,
            flip: FlipConfig::default(),
            sort: SortKey::Profit,
            max_results: Some(20),
        }
    }
}

/// Ranked output for one city, with fetch degradation detail.
#[derive(Debug, Clone, Serialize)]
pub struct CityReport {
    pub city: City,
    pub opportunities: Vec<FlipOpportunity>,
    pub batches_total: usize,
    pub batches_failed: usize,
    pub aborted: bool,
}

/// Result of one full analysis pass.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub generated_at: UtcDateTime,
    pub cities: Vec<CityReport>,
}

/// Result of one history ingestion cycle.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub ingested: usize,
    pub pruned: usize,
    pub batches_total: usize,
    pub batches_failed: usize,
    pub aborted: bool,
}

/// Outcome of a single-field price edit.
#[derive(Debug, Clone)]
pub enum EditOutcome {
    Updated(FlipOpportunity),
    /// The edit pushed the record below the surfacing criteria; it has been
    /// removed from the ranked output.
    Filtered,
}

/// Cross-city overview of the latest pass.
#[derive(Debug, Clone, Serialize)]
pub struct MarketStats {
    pub total_opportunities: usize,
    pub by_city: Vec<(City, usize)>,
    pub top_profit: Vec<FlipOpportunity>,
    pub top_roi: Vec<FlipOpportunity>,
}

pub struct MarketAnalyzer {
    client: MarketDataClient,
    store: HistoryStore,
    config: AnalysisConfig,
    suppressed: SuppressionList,
    seeds: Mutex<HashMap<City, Vec<PopularItem>>>,
    /// Stats used for the latest pass, kept so edits recompute against the
    /// exact same inputs.
    stats_cache: Mutex<HashMap<ItemKey, ItemStats>>,
    current: Mutex<HashMap<City, Vec<FlipOpportunity>>>,
}

impl MarketAnalyzer {
    pub fn new(
        client: MarketDataClient,
        store: HistoryStore,
        config: AnalysisConfig,
    ) -> Result<Self, CoreError> {
        config.flip.validate()?;
        Ok(Self {
            client,
            store,
            config,
            suppressed: SuppressionList::new(),
            seeds: Mutex::new(HashMap::new()),
            stats_cache: Mutex::new(HashMap::new()),
            current: Mutex::new(HashMap::new()),
        })
    }

    /// Register seed items for a city, used to bootstrap tracking before
    /// enough history exists.
    pub fn seed_popular_items(&self, city: City, items: Vec<PopularItem>) {
        self.seeds
            .lock()
            .expect("seed map mutex poisoned")
            .insert(city, items);
    }

    pub const fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn suppressions(&self) -> &SuppressionList {
        &self.suppressed
    }

    /// Run one full analysis pass: for each city, fetch current quotes for
    /// the tracked keys, derive flip records, and rank them.
    pub async fn run_pass(&self, cancel: &CancellationToken) -> Result<AnalysisReport, CoreError> {
        let now = UtcDateTime::now();
        let mut reports = Vec::new();

        for city in &self.config.cities {
            if cancel.is_cancelled() {
                break;
            }

            let tracked = self.tracked_items(city, now)?;
            if tracked.is_empty() {
                info!("no tracked items for {city}; seed popular items or refresh history");
                reports.push(CityReport {
                    city: city.clone(),
                    opportunities: Vec::new(),
                    batches_total: 0,
                    batches_failed: 0,
                    aborted: false,
                });
                continue;
            }

            let keys: Vec<ItemKey> = tracked.iter().map(|(key, _)| key.clone()).collect();
            let outcome = self.client.fetch_prices(&keys, cancel).await?;
            let aborted = outcome.aborted;
            let stats_by_key: HashMap<ItemKey, ItemStats> = tracked.into_iter().collect();

            let mut records = Vec::new();
            for quote in &outcome.quotes {
                if !quote.has_flippable_prices() {
                    debug!("skipping {} in {city}: zero-price quote", quote.key.item_id);
                    continue;
                }
                let Some(stats) = stats_by_key.get(&quote.key) else {
                    continue;
                };
                records.push(flip::compute(quote, stats, &self.config.flip));
            }

            let ranked = rank(
                records,
                self.config.sort,
                self.config.flip.min_profit_threshold,
                &self.suppressed,
                self.config.max_results,
            );
            info!(
                "{city}: {} opportunities from {} quotes",
                ranked.len(),
                outcome.quotes.len()
            );

            self.stats_cache
                .lock()
                .expect("stats cache mutex poisoned")
                .extend(stats_by_key);
            self.current
                .lock()
                .expect("current results mutex poisoned")
                .insert(city.clone(), ranked.clone());

            reports.push(CityReport {
                city: city.clone(),
                opportunities: ranked,
                batches_total: outcome.batches_total,
                batches_failed: outcome.batches_failed,
                aborted,
            });

            if aborted {
                break;
            }
        }

        Ok(AnalysisReport {
            generated_at: now,
            cities: reports,
        })
    }

    /// Substitute one price field on a tracked record and re-derive it.
    ///
    /// Returns [`EditOutcome::Filtered`] when the edit pushes the record
    /// below the surfacing criteria; the record is removed from the ranked
    /// output in that case.
    pub fn edit_price(
        &self,
        key: &ItemKey,
        field: PriceField,
        value: u64,
    ) -> Result<EditOutcome, CoreError> {
        let stats = self
            .stats_cache
            .lock()
            .expect("stats cache mutex poisoned")
            .get(key)
            .cloned()
            .ok_or_else(|| unknown_opportunity(key))?;

        let mut current = self
            .current
            .lock()
            .expect("current results mutex poisoned");
        let list = current
            .get_mut(&key.city)
            .ok_or_else(|| unknown_opportunity(key))?;
        let index = list
            .iter()
            .position(|record| &record.key == key)
            .ok_or_else(|| unknown_opportunity(key))?;

        let updated = flip::recompute(&list[index], field, value, &stats, &self.config.flip);
        if !updated.is_opportunity() || updated.below_threshold {
            list.remove(index);
            return Ok(EditOutcome::Filtered);
        }

        list[index] = updated.clone();
        Ok(EditOutcome::Updated(updated))
    }

    /// Run one history ingestion cycle and prune past the retention horizon.
    ///
    /// Fetched data points that are not strictly newer than the latest
    /// stored observation for their key are skipped, honoring the
    /// at-most-once-per-observation ingestion contract.
    pub async fn refresh_history(
        &self,
        cancel: &CancellationToken,
    ) -> Result<RefreshReport, CoreError> {
        let now = UtcDateTime::now();
        let mut keys: Vec<ItemKey> = Vec::new();
        for city in &self.config.cities {
            for (key, _) in self.tracked_items(city, now)? {
                keys.push(key);
            }
        }

        if keys.is_empty() {
            warn!("refresh requested with no tracked items");
            return Ok(RefreshReport {
                ingested: 0,
                pruned: 0,
                batches_total: 0,
                batches_failed: 0,
                aborted: false,
            });
        }

        let outcome = self
            .client
            .fetch_history(&keys, self.config.history_time_scale, cancel)
            .await?;

        let mut latest_by_key: HashMap<ItemKey, Option<UtcDateTime>> = HashMap::new();
        let mut records: Vec<SnapshotRecord> = Vec::new();
        for snapshot in &outcome.snapshots {
            let latest = match latest_by_key.get(&snapshot.key) {
                Some(cached) => *cached,
                None => {
                    let fetched = self
                        .store
                        .latest_observation(&snapshot.key.to_record())?
                        .map(|raw| UtcDateTime::parse_lenient(&raw))
                        .transpose()?;
                    latest_by_key.insert(snapshot.key.clone(), fetched);
                    fetched
                }
            };

            if let Some(latest) = latest {
                if snapshot.observed_at <= latest {
                    continue;
                }
            }
            records.push(snapshot.to_record());
        }

        let ingested = self.store.ingest(&records)?;
        let cutoff = now.minus(self.config.retention);
        let pruned = self.store.prune(&cutoff.format_sql())?;
        info!(
            "history refresh: {ingested} snapshots ingested, {pruned} pruned, {} of {} batches failed",
            outcome.batches_failed, outcome.batches_total
        );

        Ok(RefreshReport {
            ingested,
            pruned,
            batches_total: outcome.batches_total,
            batches_failed: outcome.batches_failed,
            aborted: outcome.aborted,
        })
    }

    /// Suppress one record: removed from the current ranked output and kept
    /// out of every later pass until unsuppressed.
    pub fn suppress(&self, key: ItemKey) -> bool {
        if let Some(list) = self
            .current
            .lock()
            .expect("current results mutex poisoned")
            .get_mut(&key.city)
        {
            list.retain(|record| record.key != key);
        }
        self.suppressed.suppress(key)
    }

    /// Clear a suppression; the record reappears on the next pass.
    pub fn unsuppress(&self, key: &ItemKey) -> bool {
        self.suppressed.unsuppress(key)
    }

    /// The latest ranked output for one city.
    pub fn current_opportunities(&self, city: &City) -> Vec<FlipOpportunity> {
        self.current
            .lock()
            .expect("current results mutex poisoned")
            .get(city)
            .cloned()
            .unwrap_or_default()
    }

    /// Cross-city overview of the latest pass.
    pub fn market_stats(&self) -> MarketStats {
        let current = self
            .current
            .lock()
            .expect("current results mutex poisoned");

        let mut by_city: Vec<(City, usize)> = current
            .iter()
            .map(|(city, records)| (city.clone(), records.len()))
            .collect();
        by_city.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));

        let all: Vec<FlipOpportunity> = current.values().flatten().cloned().collect();
        let total_opportunities = all.len();
        drop(current);

        let top_profit = rank(all.clone(), SortKey::Profit, i64::MIN, &self.suppressed, Some(10));
        let top_roi = rank(all, SortKey::Roi, i64::MIN, &self.suppressed, Some(10));

        MarketStats {
            total_opportunities,
            by_city,
            top_profit,
            top_roi,
        }
    }

    /// Tracked keys for one city with the stats backing them: the store's
    /// volume ranking first, topped up from the seed list while history is
    /// still thin. Seeded keys get synthesized stats from the estimate.
    fn tracked_items(
        &self,
        city: &City,
        now: UtcDateTime,
    ) -> Result<Vec<(ItemKey, ItemStats)>, CoreError> {
        let window_start = now.minus(self.config.retention);
        let window = StatsWindow {
            start: window_start.format_sql(),
            end: now.format_sql(),
        };

        let mut tracked: Vec<(ItemKey, ItemStats)> = Vec::new();
        for row in self
            .store
            .top_by_volume(city.as_str(), self.config.tracked_per_city, &window)?
        {
            if row.data_points < self.config.min_data_points {
                continue;
            }
            let key = ItemKey::from_record(&row.key)?;
            let stats = ItemStats {
                key: key.clone(),
                avg_price: row.avg_price,
                avg_volume: row.avg_volume,
                data_points: row.data_points,
                window_start,
                window_end: now,
            };
            tracked.push((key, stats));
        }

        let seeds = self.seeds.lock().expect("seed map mutex poisoned");
        if let Some(items) = seeds.get(city) {
            for item in items {
                if tracked.len() >= self.config.tracked_per_city {
                    break;
                }
                let key = item.key(city.clone());
                if tracked.iter().any(|(tracked_key, _)| tracked_key == &key) {
                    continue;
                }
                let stats = ItemStats {
                    key: key.clone(),
                    avg_price: 0.0,
                    avg_volume: item.daily_volume_estimate,
                    data_points: 0,
                    window_start,
                    window_end: now,
                };
                tracked.push((key, stats));
            }
        }

        Ok(tracked)
    }
}

fn unknown_opportunity(key: &ItemKey) -> CoreError {
    CoreError::UnknownOpportunity {
        item_id: key.item_id.as_str().to_owned(),
        city: key.city.as_str().to_owned(),
    }
}
