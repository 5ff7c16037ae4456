mod refresh;
mod scan;
mod top;

use std::path::Path;

use log::warn;
use serde_json::Value;

use fliptick_core::{City, MarketAnalyzer, PopularItem, Region};

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// Rendered result of one command: a JSON value plus a preformatted table.
pub struct CommandOutput {
    pub json: Value,
    pub table: String,
}

pub async fn run(cli: &Cli) -> Result<CommandOutput, CliError> {
    let region: Region = cli.region.into();

    match &cli.command {
        Command::Scan(args) => scan::run(args, region).await,
        Command::Refresh(args) => refresh::run(args, region).await,
        Command::Top(args) => top::run(args),
    }
}

pub(crate) fn parse_cities(raw: &[String]) -> Result<Vec<City>, CliError> {
    let mut cities = Vec::with_capacity(raw.len());
    for name in raw {
        cities.push(City::parse(name)?);
    }
    if cities.is_empty() {
        return Err(CliError::Command(String::from(
            "at least one city is required",
        )));
    }
    Ok(cities)
}

/// Load one `<City>.json` seed file per city, skipping cities without one.
pub(crate) fn load_popular_items(
    analyzer: &MarketAnalyzer,
    dir: &Path,
    cities: &[City],
) -> Result<(), CliError> {
    for city in cities {
        let path = dir.join(format!("{}.json", city.as_str()));
        if !path.exists() {
            warn!("no popular items file found for {city}");
            continue;
        }
        let raw = std::fs::read_to_string(&path)?;
        let items: Vec<PopularItem> = serde_json::from_str(&raw)?;
        analyzer.seed_popular_items(city.clone(), items);
    }
    Ok(())
}
