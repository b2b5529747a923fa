use anyhow::{Context, Result};
use chrono::NaiveDate;

use crate::engine::context::ForecastContext;
use crate::engine::types::ForecastRequest;

use super::ai_format;
use super::response_types::ForecastResponse;

pub fn execute(
    context: &ForecastContext,
    store_nbr: i64,
    item_nbr: i64,
    start_date: &str,
    horizon: usize,
) -> Result<ForecastResponse> {
    let start_date = NaiveDate::parse_from_str(start_date, "%Y-%m-%d")
        .with_context(|| format!("invalid start_date '{start_date}' (expected YYYY-MM-DD)"))?;
    let request = ForecastRequest {
        store_nbr,
        item_nbr,
        start_date,
        horizon,
    };
    let outcome = context.forecast_with_actuals(&request)?;
    tracing::info!(
        store_nbr,
        item_nbr,
        %start_date,
        horizon,
        predicted_days = outcome.predictions.len(),
        "Forecast served"
    );
    Ok(ai_format::format_forecast(&request, outcome))
}
