use std::time::Duration;

use fliptick_core::{City, HistoryStore, StatsWindow, UtcDateTime};

use crate::cli::TopArgs;
use crate::error::CliError;
use crate::output;

use super::CommandOutput;

pub fn run(args: &TopArgs) -> Result<CommandOutput, CliError> {
    let city = City::parse(&args.city)?;
    let store = HistoryStore::open_default()?;

    let now = UtcDateTime::now();
    let window = StatsWindow {
        start: now
            .minus(Duration::from_secs(args.days * 24 * 3600))
            .format_sql(),
        end: now.format_sql(),
    };

    let rows = store.top_by_volume(city.as_str(), args.limit, &window)?;

    Ok(CommandOutput {
        json: serde_json::to_value(&rows)?,
        table: output::top_items_table(city.as_str(), &rows),
    })
}
