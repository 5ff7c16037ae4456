//! Length-bounded request batching.
//!
//! The upstream price API addresses items through the URL path, so a large
//! tracked set must be split across requests. Batching is greedy and stable:
//! identical input always produces identical batch boundaries, which keeps
//! retried cycles comparable.

use std::collections::HashSet;

use thiserror::Error;

use crate::{City, ItemId, ItemKey, Quality, Region};

/// Hard ceiling on rendered request URL length.
pub const MAX_URL_LENGTH: usize = 4096;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("request template leaves no room for item ids within {max_len} characters")]
    TemplateTooLong { max_len: usize },

    #[error("item id '{item_id}' cannot fit in a single request URL (limit {max_len})")]
    ItemTooLong { item_id: String, max_len: usize },
}

/// A URL template with a fixed prefix/suffix and a comma-separated item list
/// in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTemplate {
    prefix: String,
    suffix: String,
}

impl RequestTemplate {
    /// Current-prices endpoint for a set of cities and qualities.
    pub fn prices(region: Region, cities: &[City], qualities: &[Quality]) -> Self {
        let locations = render_locations(cities);
        let mut quality_values: Vec<u8> = qualities.iter().map(|quality| quality.value()).collect();
        quality_values.sort_unstable();
        quality_values.dedup();
        let quality_list = quality_values
            .iter()
            .map(u8::to_string)
            .collect::<Vec<_>>()
            .join(",");

        Self {
            prefix: format!("{}/api/v2/stats/prices/", region.base_url()),
            suffix: format!(".json?locations={locations}&qualities={quality_list}"),
        }
    }

    /// History endpoint; `time_scale` is the aggregation bucket in hours.
    pub fn history(region: Region, cities: &[City], time_scale: u32) -> Self {
        let locations = render_locations(cities);
        Self {
            prefix: format!("{}/api/v2/stats/history/", region.base_url()),
            suffix: format!(".json?locations={locations}&time-scale={time_scale}"),
        }
    }

    /// Render the full URL for one batch of item ids.
    pub fn render(&self, item_ids: &[ItemId]) -> String {
        let items = item_ids
            .iter()
            .map(ItemId::as_str)
            .collect::<Vec<_>>()
            .join(",");
        format!("{}{}{}", self.prefix, items, self.suffix)
    }

    fn overhead(&self) -> usize {
        self.prefix.len() + self.suffix.len()
    }
}

fn render_locations(cities: &[City]) -> String {
    cities
        .iter()
        .map(|city| urlencoding::encode(city.as_str()).into_owned())
        .collect::<Vec<_>>()
        .join(",")
}

/// Split the tracked keys into the fewest length-bounded batches.
///
/// Keys are deduplicated by item id (the endpoint addresses item + quality;
/// qualities ride in the query string, so each id renders once). Order is
/// preserved, fill is greedy, and a single id that alone exceeds the limit
/// is a configuration error.
pub fn plan_batches(
    keys: &[ItemKey],
    template: &RequestTemplate,
    max_url_length: usize,
) -> Result<Vec<Vec<ItemId>>, PlanError> {
    let overhead = template.overhead();
    let Some(available) = max_url_length.checked_sub(overhead) else {
        return Err(PlanError::TemplateTooLong {
            max_len: max_url_length,
        });
    };
    if available == 0 {
        return Err(PlanError::TemplateTooLong {
            max_len: max_url_length,
        });
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let mut batches: Vec<Vec<ItemId>> = Vec::new();
    let mut current: Vec<ItemId> = Vec::new();
    let mut current_len = 0usize;

    for key in keys {
        let item_id = &key.item_id;
        if !seen.insert(item_id.as_str()) {
            continue;
        }

        let id_len = item_id.as_str().len();
        if id_len > available {
            return Err(PlanError::ItemTooLong {
                item_id: item_id.as_str().to_owned(),
                max_len: max_url_length,
            });
        }

        let additional = id_len + usize::from(!current.is_empty());
        if current_len + additional > available {
            batches.push(std::mem::take(&mut current));
            current.push(item_id.clone());
            current_len = id_len;
        } else {
            current.push(item_id.clone());
            current_len += additional;
        }
    }

    if !current.is_empty() {
        batches.push(current);
    }

    Ok(batches)
}
