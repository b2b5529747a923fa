//! Forecast runner: feature selection, batch inference, actuals comparison.

use chrono::NaiveDate;
use polars::prelude::*;
use std::collections::BTreeMap;

use super::encoding::EncodingTable;
use super::features::build_future_frame;
use super::model::{FeatureMatrix, Regressor};
use super::types::{ComparisonPoint, DailySale, ForecastPoint, ForecastRequest};
use crate::config::ColumnPolicy;
use crate::data::transactions::TransactionTable;
use crate::error::{ForecastError, Result};

/// Pull `expected` columns out of `frame`, in order, as a row-major matrix.
///
/// Nulls become `NaN`; each `Regressor` maps `NaN` to its own missing value.
pub fn select_features(
    frame: &DataFrame,
    expected: &[String],
    policy: ColumnPolicy,
) -> Result<FeatureMatrix> {
    let schema = frame.schema();
    let (present, missing): (Vec<&String>, Vec<&String>) =
        expected.iter().partition(|name| schema.contains(name.as_str()));

    if !missing.is_empty() {
        let missing: Vec<String> = missing.into_iter().cloned().collect();
        match policy {
            ColumnPolicy::Strict => return Err(ForecastError::MissingFeatures(missing)),
            ColumnPolicy::Lenient => {
                tracing::warn!(missing = ?missing, "Schema drift: dropping model features absent from frame");
            }
        }
    }

    let mut rows = vec![Vec::with_capacity(present.len()); frame.height()];
    for name in &present {
        let values = frame.column(name.as_str())?.cast(&DataType::Float64)?;
        for (row, value) in rows.iter_mut().zip(values.f64()?.into_iter()) {
            row.push(value.unwrap_or(f64::NAN));
        }
    }

    Ok(FeatureMatrix {
        columns: present.into_iter().cloned().collect(),
        rows,
    })
}

/// Forecast one store/item pair over `request.horizon` days.
///
/// An empty result means the pair has no history before the start date.
pub fn forecast_timeseries(
    model: &dyn Regressor,
    request: &ForecastRequest,
    transactions: &TransactionTable,
    stores: &DataFrame,
    items: &DataFrame,
    encodings: &EncodingTable,
    policy: ColumnPolicy,
) -> Result<Vec<ForecastPoint>> {
    if request.horizon == 0 {
        return Ok(Vec::new());
    }
    let Some(features) = build_future_frame(
        request,
        transactions,
        stores,
        items,
        encodings,
        model.feature_names(),
    )?
    else {
        return Ok(Vec::new());
    };

    let matrix = select_features(features.frame(), model.feature_names(), policy)?;
    let predictions = model.predict(&matrix)?;
    if predictions.len() != features.height() {
        return Err(ForecastError::PredictionCount {
            expected: features.height(),
            got: predictions.len(),
        });
    }

    tracing::debug!(
        store_nbr = request.store_nbr,
        item_nbr = request.item_nbr,
        rows = predictions.len(),
        "Forecast complete"
    );
    Ok(features
        .dates()
        .iter()
        .zip(predictions)
        .map(|(&date, prediction)| ForecastPoint { date, prediction })
        .collect())
}

/// Outer-merge a forecast with recorded sales on date, ascending.
///
/// Days without a sale keep `actual = None`. Prediction gaps take the last
/// earlier prediction.
pub fn compare_with_actuals(forecast: &[ForecastPoint], actuals: &[DailySale]) -> Vec<ComparisonPoint> {
    let mut merged: BTreeMap<NaiveDate, (Option<f64>, Option<f64>)> = BTreeMap::new();
    for point in forecast {
        merged.entry(point.date).or_default().1 = Some(point.prediction);
    }
    for sale in actuals {
        merged.entry(sale.date).or_default().0 = Some(sale.unit_sales);
    }

    let mut last_prediction = None;
    merged
        .into_iter()
        .map(|(date, (actual, prediction))| {
            if prediction.is_some() {
                last_prediction = prediction;
            }
            ComparisonPoint {
                date,
                actual,
                prediction: prediction.or(last_prediction),
            }
        })
        .collect()
}
