use chrono::NaiveDate;

use crate::engine::context::ForecastOutcome;
use crate::engine::types::{ForecastRequest, ItemRecord, StoreRecord};

use super::response_types::{
    ActualPoint, DatasetSummaryResponse, DateRange, ForecastResponse, ForecastStats, ItemEntry,
    ItemsResponse, StoresResponse,
};

fn format_units(value: f64) -> String {
    if value.abs() >= 1000.0 {
        format!("{:.1}k units", value / 1000.0)
    } else {
        format!("{value:.1} units")
    }
}

fn compute_stats(outcome: &ForecastOutcome) -> ForecastStats {
    let predictions = &outcome.predictions;
    let days = predictions.len();
    let total_predicted: f64 = predictions.iter().map(|p| p.prediction).sum();
    let mean_predicted = if days == 0 {
        0.0
    } else {
        total_predicted / days as f64
    };
    let peak = predictions
        .iter()
        .max_by(|a, b| a.prediction.total_cmp(&b.prediction));

    ForecastStats {
        days,
        total_predicted,
        mean_predicted,
        peak_date: peak.map(|p| p.date),
        peak_prediction: peak.map(|p| p.prediction),
        days_with_actuals: outcome.actuals.len(),
        total_actual: outcome.actuals.iter().map(|a| a.unit_sales).sum(),
    }
}

pub fn format_forecast(request: &ForecastRequest, outcome: ForecastOutcome) -> ForecastResponse {
    let ForecastRequest {
        store_nbr,
        item_nbr,
        start_date,
        horizon,
    } = *request;
    let stats = compute_stats(&outcome);

    let (summary, suggested_next_steps) = if outcome.predictions.is_empty() {
        (
            format!(
                "No forecast for item {item_nbr} at store {store_nbr}: no sales recorded before {start_date}."
            ),
            vec![
                format!("Use list_items({{ store_nbr: {store_nbr} }}) to pick an item with sales history"),
                "Try a later start_date so that history precedes it".to_string(),
            ],
        )
    } else {
        let mut summary = format!(
            "Forecast for item {item_nbr} at store {store_nbr}, {horizon} days from {start_date}: \
             {} total, {} per day on average.",
            format_units(stats.total_predicted),
            format_units(stats.mean_predicted),
        );
        if let (Some(date), Some(peak)) = (stats.peak_date, stats.peak_prediction) {
            summary.push_str(&format!(" Peak {} on {date}.", format_units(peak)));
        }
        if stats.days_with_actuals > 0 {
            summary.push_str(&format!(
                " {} of {horizon} days have recorded sales ({} total).",
                stats.days_with_actuals,
                format_units(stats.total_actual),
            ));
        } else {
            summary.push_str(" No recorded sales fall inside the horizon.");
        }
        (
            summary,
            vec![
                "Plot the comparison series to see predicted against actual daily sales".to_string(),
                "Shift start_date to backtest the forecast on another period".to_string(),
                format!("Use list_items({{ store_nbr: {store_nbr} }}) to forecast another item"),
            ],
        )
    };

    ForecastResponse {
        summary,
        store_nbr,
        item_nbr,
        start_date,
        horizon,
        stats,
        predictions: outcome.predictions,
        actuals: outcome
            .actuals
            .into_iter()
            .map(|a| ActualPoint {
                date: a.date,
                unit_sales: a.unit_sales,
            })
            .collect(),
        comparison: outcome.comparison,
        suggested_next_steps,
    }
}

pub fn format_dataset_summary(
    transaction_rows: usize,
    pairs: usize,
    stores: usize,
    items: usize,
    range: Option<(NaiveDate, NaiveDate)>,
    model_features: Vec<String>,
    max_horizon: usize,
) -> DatasetSummaryResponse {
    let date_range = DateRange {
        start: range.map(|(s, _)| s.to_string()),
        end: range.map(|(_, e)| e.to_string()),
    };
    let span = match range {
        Some((start, end)) => format!("from {start} to {end}"),
        None => "with no dates".to_string(),
    };
    let summary = format!(
        "{transaction_rows} daily sales rows for {pairs} store/item pairs {span}. \
         Catalog: {stores} stores, {items} items. Model uses {} features; horizon up to {max_horizon} days.",
        model_features.len(),
    );

    DatasetSummaryResponse {
        summary,
        transaction_rows,
        pairs,
        stores,
        items,
        date_range,
        model_features,
        max_horizon,
        suggested_next_steps: vec![
            "Use list_stores to see the stores in scope".to_string(),
            "Use list_items({ store_nbr }) to find items with sales history".to_string(),
            "Use forecast({ store_nbr, item_nbr, start_date, horizon }) to predict daily sales"
                .to_string(),
        ],
    }
}

pub fn format_stores(stores: Vec<StoreRecord>) -> StoresResponse {
    let total = stores.len();
    let mut cities: Vec<&str> = stores.iter().map(|s| s.city.as_str()).collect();
    cities.sort_unstable();
    cities.dedup();
    let summary = format!(
        "{total} stores across {} cities: {}.",
        cities.len(),
        cities.join(", ")
    );

    StoresResponse {
        summary,
        total,
        stores,
        suggested_next_steps: vec![
            "Use list_items({ store_nbr }) to see which items have sales history at a store"
                .to_string(),
        ],
    }
}

pub fn format_items(
    store_nbr: i64,
    up_to: NaiveDate,
    items: Vec<(i64, Option<ItemRecord>)>,
) -> ItemsResponse {
    let total = items.len();
    let summary = format!("{total} items with sales at store {store_nbr} on or before {up_to}.");
    let items = items
        .into_iter()
        .map(|(item_nbr, details)| ItemEntry { item_nbr, details })
        .collect();

    ItemsResponse {
        summary,
        store_nbr,
        up_to,
        total,
        items,
        suggested_next_steps: vec![format!(
            "Use forecast({{ store_nbr: {store_nbr}, item_nbr, start_date, horizon }}) on one of these items"
        )],
    }
}
