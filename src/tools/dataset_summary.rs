use anyhow::Result;

use crate::engine::context::ForecastContext;

use super::ai_format;
use super::response_types::DatasetSummaryResponse;

pub fn execute(context: &ForecastContext) -> Result<DatasetSummaryResponse> {
    let transactions = context.transactions();
    Ok(ai_format::format_dataset_summary(
        transactions.height(),
        transactions.pairs()?.len(),
        context.catalog().store_count(),
        context.catalog().item_count(),
        transactions.date_range()?,
        context.feature_names().to_vec(),
        context.max_horizon(),
    ))
}
