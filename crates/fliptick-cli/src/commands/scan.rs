use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use fliptick_core::{
    AnalysisConfig, FlipConfig, HistoryStore, MarketAnalyzer, MarketDataClient, Region,
    ReqwestHttpClient,
};

use crate::cli::ScanArgs;
use crate::error::CliError;
use crate::output;

use super::{load_popular_items, parse_cities, CommandOutput};

pub async fn run(args: &ScanArgs, region: Region) -> Result<CommandOutput, CliError> {
    let cities = parse_cities(&args.cities)?;

    let store = HistoryStore::open_default()?;
    let client = MarketDataClient::new(region, Arc::new(ReqwestHttpClient::new()));

    let mut config = AnalysisConfig::new(cities.clone());
    config.sort = args.sort.into();
    config.max_results = Some(args.limit);
    config.flip = FlipConfig {
        buy_order_fee_rate: args.buy_fee,
        sell_order_fee_rate: args.sell_fee,
        min_profit_threshold: args.min_profit,
        volume_capture: args.volume_capture,
    };

    let analyzer = MarketAnalyzer::new(client, store, config)?;
    if let Some(dir) = &args.popular_dir {
        load_popular_items(&analyzer, dir, &cities)?;
    }

    let report = analyzer.run_pass(&CancellationToken::new()).await?;

    let mut table = String::new();
    for city_report in &report.cities {
        table.push_str(&output::opportunity_table(city_report));
    }

    Ok(CommandOutput {
        json: serde_json::to_value(&report)?,
        table,
    })
}
