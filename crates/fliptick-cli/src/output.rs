//! Output rendering: JSON envelopes or terminal tables.

use fliptick_core::{CityReport, FlipOpportunity, TopItemRow};

use crate::cli::OutputFormat;
use crate::commands::CommandOutput;
use crate::error::CliError;

pub fn render(output: &CommandOutput, format: OutputFormat, pretty: bool) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            let text = if pretty {
                serde_json::to_string_pretty(&output.json)?
            } else {
                serde_json::to_string(&output.json)?
            };
            println!("{text}");
        }
        OutputFormat::Table => println!("{}", output.table.trim_end()),
    }
    Ok(())
}

pub fn opportunity_table(report: &CityReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("\nLocation: {}\n", report.city));
    if report.batches_failed > 0 {
        out.push_str(&format!(
            "(partial data: {} of {} batches failed)\n",
            report.batches_failed, report.batches_total
        ));
    }
    out.push_str(&format!(
        "{:<30} | {:>9} | {:>8} | {:>8} | {:>12} | {:>12}\n",
        "Item", "Margin", "Volume", "ROI %", "Profit/day", "Investment"
    ));
    out.push_str(&"-".repeat(94));
    out.push('\n');

    if report.opportunities.is_empty() {
        out.push_str("(no opportunities)\n");
        return out;
    }

    for record in &report.opportunities {
        out.push_str(&format!(
            "{:<30} | {:>9} | {:>8} | {:>8} | {:>12} | {:>12}\n",
            record.key.item_id.as_str(),
            record.flip_margin,
            record.expected_volume,
            format_roi(record),
            record.potential_profit,
            record.total_investment,
        ));
    }
    out
}

pub fn top_items_table(city: &str, rows: &[TopItemRow]) -> String {
    let mut out = String::new();
    out.push_str(&format!("\nTop items by volume: {city}\n"));
    out.push_str(&format!(
        "{:<30} | {:>7} | {:>5} | {:>12} | {:>12} | {:>6}\n",
        "Item", "Quality", "Ench", "Avg volume", "Avg price", "Points"
    ));
    out.push_str(&"-".repeat(88));
    out.push('\n');

    if rows.is_empty() {
        out.push_str("(no history in window)\n");
        return out;
    }

    for row in rows {
        out.push_str(&format!(
            "{:<30} | {:>7} | {:>5} | {:>12.1} | {:>12.1} | {:>6}\n",
            row.key.item_id, row.key.quality, row.key.enchantment, row.avg_volume, row.avg_price,
            row.data_points,
        ));
    }
    out
}

fn format_roi(record: &FlipOpportunity) -> String {
    match record.roi.value() {
        Some(value) => format!("{value:.1}"),
        None => String::from("n/a"),
    }
}
