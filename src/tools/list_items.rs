use anyhow::{bail, Result};
use chrono::NaiveDate;

use crate::engine::context::ForecastContext;

use super::ai_format;
use super::response_types::ItemsResponse;

/// Items with recorded sales at `store_nbr` on or before `up_to`.
///
/// Without `up_to`, the last transaction date is used.
pub fn execute(
    context: &ForecastContext,
    store_nbr: i64,
    up_to: Option<NaiveDate>,
) -> Result<ItemsResponse> {
    if context.catalog().store(store_nbr).is_none() {
        bail!("store {store_nbr} is not in the loaded catalog. Call list_stores to see valid ids.");
    }
    let up_to = match up_to {
        Some(date) => date,
        None => match context.transactions().date_range()? {
            Some((_, last)) => last,
            None => bail!("no transactions are loaded"),
        },
    };

    let items = context.transactions().items_for_store(store_nbr, up_to)?;
    if items.is_empty() {
        bail!("no items with sales history at store {store_nbr} on or before {up_to}");
    }
    let items = items
        .into_iter()
        .map(|item_nbr| (item_nbr, context.catalog().item(item_nbr).cloned()))
        .collect();
    Ok(ai_format::format_items(store_nbr, up_to, items))
}
