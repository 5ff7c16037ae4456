//! CLI argument definitions for fliptick.
//!
//! The CLI is a thin pass-through into the core's analysis session: the
//! region and sort-key selectors map directly onto core types and carry no
//! independent logic.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use fliptick_core::{Region, SortKey};

/// Market flip finder for the Albion Online data API.
#[derive(Debug, Parser)]
#[command(
    name = "fliptick",
    author,
    version,
    about = "Find profitable market flips across cities"
)]
pub struct Cli {
    /// API region to query.
    #[arg(long, global = true, value_enum, default_value_t = RegionArg::Americas)]
    pub region: RegionArg,

    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Enable debug logging.
    #[arg(long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table for terminal display.
    Table,
    /// Single JSON object output.
    Json,
}

/// API region selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RegionArg {
    Americas,
    Asia,
    Europe,
}

impl From<RegionArg> for Region {
    fn from(value: RegionArg) -> Self {
        match value {
            RegionArg::Americas => Region::Americas,
            RegionArg::Asia => Region::Asia,
            RegionArg::Europe => Region::Europe,
        }
    }
}

/// Ranking key selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortArg {
    Profit,
    Roi,
}

impl From<SortArg> for SortKey {
    fn from(value: SortArg) -> Self {
        match value {
            SortArg::Profit => SortKey::Profit,
            SortArg::Roi => SortKey::Roi,
        }
    }
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one analysis pass and list ranked flip opportunities per city.
    Scan(ScanArgs),

    /// Run one history ingestion cycle and prune past the retention horizon.
    Refresh(RefreshArgs),

    /// Show the volume ranking for one city from stored history.
    Top(TopArgs),
}

/// Arguments for the `scan` command.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Cities to analyze, comma separated.
    #[arg(long, value_delimiter = ',', default_value = "Lymhurst,Fort Sterling")]
    pub cities: Vec<String>,

    /// Sort ranked output by total profit or return on investment.
    #[arg(long, value_enum, default_value_t = SortArg::Profit)]
    pub sort: SortArg,

    /// Opportunities to show per city.
    #[arg(long, default_value_t = 20)]
    pub limit: usize,

    /// Minimum potential profit for a record to be surfaced.
    #[arg(long, default_value_t = 10_000)]
    pub min_profit: i64,

    /// Fee rate applied to the buy side.
    #[arg(long, default_value_t = 0.025)]
    pub buy_fee: f64,

    /// Fee rate applied to the sell side.
    #[arg(long, default_value_t = 0.025)]
    pub sell_fee: f64,

    /// Fraction of daily volume one order can capture.
    #[arg(long, default_value_t = 0.10)]
    pub volume_capture: f64,

    /// Directory with one `<City>.json` seed file per city.
    #[arg(long)]
    pub popular_dir: Option<PathBuf>,
}

/// Arguments for the `refresh` command.
#[derive(Debug, Args)]
pub struct RefreshArgs {
    /// Cities to refresh, comma separated.
    #[arg(long, value_delimiter = ',', default_value = "Lymhurst,Fort Sterling")]
    pub cities: Vec<String>,

    /// History aggregation bucket in hours.
    #[arg(long, default_value_t = 24)]
    pub time_scale: u32,

    /// Snapshot retention horizon in days.
    #[arg(long, default_value_t = 7)]
    pub retention_days: u64,

    /// Directory with one `<City>.json` seed file per city.
    #[arg(long)]
    pub popular_dir: Option<PathBuf>,
}

/// Arguments for the `top` command.
#[derive(Debug, Args)]
pub struct TopArgs {
    /// City to rank.
    pub city: String,

    /// Number of items to show.
    #[arg(long, default_value_t = 20)]
    pub limit: usize,

    /// Window length in days.
    #[arg(long, default_value_t = 7)]
    pub days: u64,
}
