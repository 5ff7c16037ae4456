//! End-to-end behavior of the analysis pipeline: seed, refresh history,
//! run a pass, edit prices, suppress records. Everything runs against a
//! scripted offline transport and a temporary store.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use fliptick_core::{
    AnalysisConfig, EditOutcome, FlipConfig, HistoryStore, ItemId, MarketAnalyzer,
    MarketDataClient, PopularItem, PriceField, Quality, Region, Roi, SortKey, StoreConfig,
    UtcDateTime,
};
use fliptick_tests::{city, item_key, HttpResponse, ScriptedHttpClient};

fn history_body(now: UtcDateTime) -> String {
    let points = |price: u64, volumes: [u64; 4]| {
        volumes
            .iter()
            .enumerate()
            .map(|(index, volume)| {
                serde_json::json!({
                    "item_count": volume,
                    "avg_price": price,
                    "timestamp": now
                        .minus(Duration::from_secs((index as u64 + 1) * 10 * 3600))
                        .format_sql(),
                })
            })
            .collect::<Vec<_>>()
    };

    serde_json::json!([
        {"item_id": "T4_BAG", "location": "Lymhurst", "quality": 1, "data": points(2900, [100, 200, 100, 200])},
        {"item_id": "T5_BAG", "location": "Lymhurst", "quality": 1, "data": points(500, [80, 80, 80, 80])},
        {"item_id": "T6_BAG", "location": "Lymhurst", "quality": 1, "data": points(1000, [60, 60, 60, 60])},
    ])
    .to_string()
}

fn prices_body(now: UtcDateTime) -> String {
    let observed = now.minus(Duration::from_secs(3600)).format_sql();
    serde_json::json!([
        {
            "item_id": "T4_BAG", "city": "Lymhurst", "quality": 1,
            "sell_price_min": 3325, "sell_price_max": 3500,
            "buy_price_min": 2400, "buy_price_max": 2547,
            "sell_price_min_date": observed,
        },
        {
            // Negative margin: sells below the buy order.
            "item_id": "T5_BAG", "city": "Lymhurst", "quality": 1,
            "sell_price_min": 900, "sell_price_max": 950,
            "buy_price_min": 950, "buy_price_max": 1000,
            "sell_price_min_date": observed,
        },
        {
            // Zero buy price means "no data", not a free flip.
            "item_id": "T6_BAG", "city": "Lymhurst", "quality": 1,
            "sell_price_min": 1200, "sell_price_max": 1300,
            "buy_price_min": 0, "buy_price_max": 0,
            "sell_price_min_date": observed,
        },
    ])
    .to_string()
}

fn build_analyzer(temp: &TempDir, now: UtcDateTime) -> MarketAnalyzer {
    let history = history_body(now);
    let prices = prices_body(now);
    let transport = ScriptedHttpClient::new(move |url| {
        if url.contains("/stats/history/") {
            Ok(HttpResponse::ok_json(history.clone()))
        } else {
            Ok(HttpResponse::ok_json(prices.clone()))
        }
    });

    let store = HistoryStore::open(StoreConfig {
        db_path: temp.path().join("history.duckdb"),
        max_pool_size: 2,
    })
    .expect("store open");
    let client = MarketDataClient::new(Region::Europe, Arc::new(transport));

    let mut config = AnalysisConfig::new(vec![city("Lymhurst")]);
    config.sort = SortKey::Profit;
    config.max_results = None;
    config.flip = FlipConfig {
        buy_order_fee_rate: 0.0,
        sell_order_fee_rate: 0.0,
        min_profit_threshold: 0,
        volume_capture: 1.0,
    };

    let analyzer = MarketAnalyzer::new(client, store, config).expect("analyzer");
    analyzer.seed_popular_items(
        city("Lymhurst"),
        ["T4_BAG", "T5_BAG", "T6_BAG"]
            .iter()
            .map(|item_id| PopularItem {
                item_id: ItemId::parse(item_id).expect("item id"),
                quality: Quality::NORMAL,
                daily_volume_estimate: 100.0,
                name: None,
            })
            .collect(),
    );
    analyzer
}

#[tokio::test]
async fn refresh_ingests_each_observation_at_most_once() {
    let temp = TempDir::new().expect("tempdir");
    let now = UtcDateTime::now();
    let analyzer = build_analyzer(&temp, now);
    let cancel = CancellationToken::new();

    let first = analyzer.refresh_history(&cancel).await.expect("refresh");
    assert_eq!(first.ingested, 12);
    assert_eq!(first.batches_failed, 0);

    // The same history payload again: every point is already stored.
    let second = analyzer.refresh_history(&cancel).await.expect("refresh");
    assert_eq!(second.ingested, 0);
}

#[tokio::test]
async fn pass_surfaces_only_profitable_flippable_records() {
    let temp = TempDir::new().expect("tempdir");
    let now = UtcDateTime::now();
    let analyzer = build_analyzer(&temp, now);
    let cancel = CancellationToken::new();

    analyzer.refresh_history(&cancel).await.expect("refresh");
    let report = analyzer.run_pass(&cancel).await.expect("pass");

    assert_eq!(report.cities.len(), 1);
    let opportunities = &report.cities[0].opportunities;
    // T5_BAG has a negative margin, T6_BAG has no buy data.
    assert_eq!(opportunities.len(), 1);

    let record = &opportunities[0];
    assert_eq!(record.key.item_id.as_str(), "T4_BAG");
    assert_eq!(record.buy_price, 2547);
    assert_eq!(record.sell_price, 3325);
    assert_eq!(record.flip_margin, 778);
    assert_eq!(record.expected_volume, 150);
    assert_eq!(record.potential_profit, 116_700);
    assert_eq!(record.total_investment, 2547 * 150);
    match record.roi {
        Roi::Percent(value) => assert!((value - 30.545).abs() < 0.01),
        Roi::Undefined => panic!("investment is non-zero, roi must be defined"),
    }
}

#[tokio::test]
async fn price_edits_rederive_or_remove_the_record() {
    let temp = TempDir::new().expect("tempdir");
    let now = UtcDateTime::now();
    let analyzer = build_analyzer(&temp, now);
    let cancel = CancellationToken::new();

    analyzer.refresh_history(&cancel).await.expect("refresh");
    analyzer.run_pass(&cancel).await.expect("pass");
    let key = item_key("T4_BAG", "Lymhurst");

    // Raising the buy price squeezes but keeps the margin.
    let outcome = analyzer
        .edit_price(&key, PriceField::Buy, 3000)
        .expect("edit");
    match outcome {
        EditOutcome::Updated(record) => {
            assert_eq!(record.buy_price, 3000);
            assert_eq!(record.flip_margin, 325);
            assert_eq!(record.potential_profit, 325 * 150);
        }
        EditOutcome::Filtered => panic!("record should survive this edit"),
    }

    // Raising it to the sell price kills the margin and removes the record.
    let outcome = analyzer
        .edit_price(&key, PriceField::Buy, 3325)
        .expect("edit");
    assert!(matches!(outcome, EditOutcome::Filtered));
    assert!(analyzer.current_opportunities(&city("Lymhurst")).is_empty());
}

#[tokio::test]
async fn suppression_survives_fresh_passes_until_cleared() {
    let temp = TempDir::new().expect("tempdir");
    let now = UtcDateTime::now();
    let analyzer = build_analyzer(&temp, now);
    let cancel = CancellationToken::new();
    let key = item_key("T4_BAG", "Lymhurst");

    analyzer.refresh_history(&cancel).await.expect("refresh");
    analyzer.run_pass(&cancel).await.expect("pass");
    assert_eq!(analyzer.current_opportunities(&city("Lymhurst")).len(), 1);

    assert!(analyzer.suppress(key.clone()));
    assert!(analyzer.current_opportunities(&city("Lymhurst")).is_empty());

    // A fresh ingestion/analysis pass must not resurface it.
    analyzer.refresh_history(&cancel).await.expect("refresh");
    analyzer.run_pass(&cancel).await.expect("pass");
    assert!(analyzer.current_opportunities(&city("Lymhurst")).is_empty());

    assert!(analyzer.unsuppress(&key));
    analyzer.run_pass(&cancel).await.expect("pass");
    assert_eq!(analyzer.current_opportunities(&city("Lymhurst")).len(), 1);
}

#[tokio::test]
async fn market_stats_summarize_the_latest_pass() {
    let temp = TempDir::new().expect("tempdir");
    let now = UtcDateTime::now();
    let analyzer = build_analyzer(&temp, now);
    let cancel = CancellationToken::new();

    analyzer.refresh_history(&cancel).await.expect("refresh");
    analyzer.run_pass(&cancel).await.expect("pass");

    let stats = analyzer.market_stats();
    assert_eq!(stats.total_opportunities, 1);
    assert_eq!(stats.by_city.len(), 1);
    assert_eq!(stats.by_city[0].1, 1);
    assert_eq!(stats.top_profit[0].key.item_id.as_str(), "T4_BAG");
    assert_eq!(stats.top_roi[0].key.item_id.as_str(), "T4_BAG");
}
