//! Future feature frame assembly.

use chrono::{Datelike, NaiveDate, Weekday};
use polars::prelude::*;

use super::encoding::EncodingTable;
use super::types::ForecastRequest;
use super::window::{edge_pad, TrailingWindow, LAGS};
use crate::data::transactions::{offset_date, TransactionTable};
use crate::data::{DATE_COL, ITEM_COL, PROMO_COL, STORE_COL};
use crate::error::Result;

/// Model inputs in training order.
pub const FEATURE_COLUMNS: [&str; 19] = [
    "onpromotion",
    "year",
    "month",
    "day",
    "day_of_week",
    "lag_1",
    "lag_7",
    "lag_14",
    "lag_30",
    "unit_sales_7d_avg",
    "roll7_std",
    "pct_chg_7d",
    "is_weekend",
    "city",
    "state",
    "cluster",
    "family",
    "class",
    "store_type",
];

/// Column order of a built frame.
const FRAME_COLUMNS: [&str; 23] = [
    DATE_COL,
    STORE_COL,
    ITEM_COL,
    PROMO_COL,
    "year",
    "month",
    "day",
    "day_of_week",
    "is_weekend",
    "lag_1",
    "lag_7",
    "lag_14",
    "lag_30",
    "unit_sales_7d_avg",
    "roll7_std",
    "pct_chg_7d",
    "city",
    "state",
    "cluster",
    "store_type",
    "family",
    "class",
    "perishable",
];

/// Dense daily feature rows for one store/item over a forecast horizon.
#[derive(Debug, Clone)]
pub struct FeatureFrame {
    dates: Vec<NaiveDate>,
    frame: DataFrame,
}

impl FeatureFrame {
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }
}

/// Contiguous daily dates `[start, start + horizon)`.
pub fn date_index(start: NaiveDate, horizon: usize) -> Result<Vec<NaiveDate>> {
    (0..horizon)
        .map(|i| offset_date(start, i as i64))
        .collect()
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Build the feature frame for `request`.
///
/// Returns `None` when the pair has no history before the start date.
/// `stores` and `items` are the catalog frames joined onto every row.
/// Categorical columns named in `model_columns` are replaced by their codes;
/// the others keep their text labels.
pub fn build_future_frame(
    request: &ForecastRequest,
    transactions: &TransactionTable,
    stores: &DataFrame,
    items: &DataFrame,
    encodings: &EncodingTable,
    model_columns: &[String],
) -> Result<Option<FeatureFrame>> {
    let ForecastRequest {
        store_nbr,
        item_nbr,
        start_date,
        horizon,
    } = *request;

    let history = transactions.series(store_nbr, item_nbr, Some(start_date))?;
    let Some(window) = TrailingWindow::from_history(&history, start_date)? else {
        tracing::debug!(store_nbr, item_nbr, %start_date, "No history before start date");
        return Ok(None);
    };

    let dates = date_index(start_date, horizon)?;
    let mut base = calendar_frame(&dates)?;
    base.hstack_mut(&[
        Column::new(STORE_COL.into(), vec![store_nbr; horizon]),
        Column::new(ITEM_COL.into(), vec![item_nbr; horizon]),
        Column::new(PROMO_COL.into(), vec![false; horizon]),
    ])?;
    base.hstack_mut(&window_columns(&window, horizon))?;

    let joined = base
        .lazy()
        .join(
            stores.clone().lazy(),
            [col(STORE_COL)],
            [col(STORE_COL)],
            JoinArgs::new(JoinType::Left),
        )
        .join(
            items.clone().lazy(),
            [col(ITEM_COL)],
            [col(ITEM_COL)],
            JoinArgs::new(JoinType::Left),
        )
        .sort([DATE_COL], SortMultipleOptions::default())
        .collect()?;

    let encoded = encodings.encode_frame(joined, model_columns)?;
    let frame = encoded.select(FRAME_COLUMNS)?;

    tracing::debug!(
        store_nbr,
        item_nbr,
        %start_date,
        horizon,
        window_start = %offset_date(window.start(), -(window.values().len() as i64))?,
        window_days = window.values().len(),
        "Feature frame built"
    );
    Ok(Some(FeatureFrame { dates, frame }))
}

/// `date, year, month, day, day_of_week (Monday = 0), is_weekend`.
fn calendar_frame(dates: &[NaiveDate]) -> PolarsResult<DataFrame> {
    let years: Vec<i32> = dates.iter().map(Datelike::year).collect();
    let months: Vec<i32> = dates.iter().map(|d| d.month() as i32).collect();
    let days: Vec<i32> = dates.iter().map(|d| d.day() as i32).collect();
    let weekdays: Vec<i32> = dates
        .iter()
        .map(|d| d.weekday().num_days_from_monday() as i32)
        .collect();
    let weekend: Vec<bool> = dates.iter().copied().map(is_weekend).collect();

    let mut df = df! {
        "year" => years,
        "month" => months,
        "day" => days,
        "day_of_week" => weekdays,
        "is_weekend" => weekend,
    }?;
    df.with_column(
        DateChunked::from_naive_date(PlSmallStr::from(DATE_COL), dates.iter().copied())
            .into_column(),
    )?;
    Ok(df)
}

/// Lag and rolling columns, each `horizon` long.
fn window_columns(window: &TrailingWindow, horizon: usize) -> Vec<Column> {
    let mut columns: Vec<Column> = LAGS
        .iter()
        .map(|&k| Column::new(format!("lag_{k}").into(), window.lag_series(k, horizon)))
        .collect();

    // Rolling values are only known at the end of the window; carry them across the horizon.
    let carried = |value: f64| edge_pad(&[value], horizon);
    columns.push(Column::new("unit_sales_7d_avg".into(), carried(window.rolling_mean())));
    columns.push(Column::new("roll7_std".into(), carried(window.rolling_std())));
    columns.push(Column::new("pct_chg_7d".into(), carried(window.pct_change())));
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::catalog::Catalog;
    use crate::engine::types::{ItemRecord, StoreRecord};

    fn model_columns() -> Vec<String> {
        FEATURE_COLUMNS.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn date_index_is_contiguous() {
        let start = NaiveDate::from_ymd_opt(2014, 2, 27).unwrap();
        let dates = date_index(start, 3).unwrap();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2014, 2, 27).unwrap(),
                NaiveDate::from_ymd_opt(2014, 2, 28).unwrap(),
                NaiveDate::from_ymd_opt(2014, 3, 1).unwrap(),
            ]
        );
    }

    #[test]
    fn weekend_is_saturday_and_sunday() {
        // 2014-03-01 was a Saturday.
        let sat = NaiveDate::from_ymd_opt(2014, 3, 1).unwrap();
        let sun = NaiveDate::from_ymd_opt(2014, 3, 2).unwrap();
        let mon = NaiveDate::from_ymd_opt(2014, 3, 3).unwrap();
        assert!(is_weekend(sat));
        assert!(is_weekend(sun));
        assert!(!is_weekend(mon));
    }

    #[test]
    fn calendar_frame_uses_monday_zero() {
        let dates = date_index(NaiveDate::from_ymd_opt(2014, 3, 1).unwrap(), 3).unwrap();
        let df = calendar_frame(&dates).unwrap();
        let dow: Vec<Option<i32>> = df.column("day_of_week").unwrap().i32().unwrap().into_iter().collect();
        assert_eq!(dow, vec![Some(5), Some(6), Some(0)]);
        let weekend: Vec<Option<bool>> =
            df.column("is_weekend").unwrap().bool().unwrap().into_iter().collect();
        assert_eq!(weekend, vec![Some(true), Some(true), Some(false)]);
    }

    #[test]
    fn unknown_item_leaves_item_attributes_null() {
        let catalog = Catalog::new(
            vec![StoreRecord {
                store_nbr: 24,
                city: "Guayaquil".to_string(),
                state: "Guayas".to_string(),
                store_type: "D".to_string(),
                cluster: 1,
            }],
            vec![ItemRecord {
                item_nbr: 1,
                family: "GROCERY I".to_string(),
                class: 1093,
                perishable: false,
            }],
        );
        let start = NaiveDate::from_ymd_opt(2014, 3, 1).unwrap();
        let transactions = crate::data::transactions::TransactionTable::from_rows(&[
            crate::data::transactions::RawTransaction {
                date: NaiveDate::from_ymd_opt(2014, 2, 28).unwrap(),
                store_nbr: 24,
                item_nbr: 2,
                unit_sales: 3.0,
                onpromotion: None,
            },
        ])
        .unwrap();
        let request = ForecastRequest {
            store_nbr: 24,
            item_nbr: 2,
            start_date: start,
            horizon: 2,
        };
        let frame = build_future_frame(
            &request,
            &transactions,
            &catalog.stores_frame().unwrap(),
            &catalog.items_frame().unwrap(),
            &EncodingTable::fit_from_catalog(&catalog),
            &model_columns(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.frame().column("family").unwrap().null_count(), 2);
        assert_eq!(frame.frame().column("city").unwrap().null_count(), 0);
        let names: Vec<&str> = frame.frame().get_column_names().into_iter().map(|n| n.as_str()).collect();
        assert_eq!(names, FRAME_COLUMNS);
    }
}
