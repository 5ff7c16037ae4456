use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use fliptick_core::{
    AnalysisConfig, HistoryStore, MarketAnalyzer, MarketDataClient, Region, ReqwestHttpClient,
};

use crate::cli::RefreshArgs;
use crate::error::CliError;

use super::{load_popular_items, parse_cities, CommandOutput};

pub async fn run(args: &RefreshArgs, region: Region) -> Result<CommandOutput, CliError> {
    let cities = parse_cities(&args.cities)?;

    let store = HistoryStore::open_default()?;
    let client = MarketDataClient::new(region, Arc::new(ReqwestHttpClient::new()));

    let mut config = AnalysisConfig::new(cities.clone());
    config.history_time_scale = args.time_scale;
    config.retention = Duration::from_secs(args.retention_days * 24 * 3600);

    let analyzer = MarketAnalyzer::new(client, store, config)?;
    if let Some(dir) = &args.popular_dir {
        load_popular_items(&analyzer, dir, &cities)?;
    }

    let report = analyzer.refresh_history(&CancellationToken::new()).await?;

    let mut table = format!(
        "History refresh: {} snapshots ingested, {} pruned\n",
        report.ingested, report.pruned
    );
    if report.batches_failed > 0 {
        table.push_str(&format!(
            "(partial data: {} of {} batches failed)\n",
            report.batches_failed, report.batches_total
        ));
    }
    if report.aborted {
        table.push_str("(aborted before completing all batches)\n");
    }

    Ok(CommandOutput {
        json: serde_json::to_value(&report)?,
        table,
    })
}
