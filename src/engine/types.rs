use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One row of the stores reference table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StoreRecord {
    pub store_nbr: i64,
    pub city: String,
    pub state: String,
    /// Source files name this column `type`.
    #[serde(alias = "type")]
    pub store_type: String,
    pub cluster: i64,
}

/// One row of the items reference table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ItemRecord {
    pub item_nbr: i64,
    pub family: String,
    pub class: i64,
    #[serde(deserialize_with = "deserialize_flag")]
    pub perishable: bool,
}

/// Aggregated unit sales of one store/item pair on one day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailySale {
    pub date: NaiveDate,
    pub unit_sales: f64,
}

/// One day of a forecast.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub prediction: f64,
}

/// Actual vs. predicted sales on one day, as handed to a chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ComparisonPoint {
    pub date: NaiveDate,
    /// `None` when no transactions were recorded that day.
    pub actual: Option<f64>,
    pub prediction: Option<f64>,
}

/// A single forecast request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForecastRequest {
    pub store_nbr: i64,
    pub item_nbr: i64,
    pub start_date: NaiveDate,
    pub horizon: usize,
}

/// Flexible bool deserializer: handles "true"/"false", "1"/"0", "yes"/"no", and empty.
pub(crate) fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_flag(&s).ok_or_else(|| {
        serde::de::Error::custom(format!("expected bool value, got '{s}'"))
    })
}

/// Optional variant of [`deserialize_flag`]: an empty field is `None`.
pub(crate) fn deserialize_opt_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    if s.trim().is_empty() {
        return Ok(None);
    }
    parse_flag(&s)
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom(format!("expected bool value, got '{s}'")))
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Some(true),
        "false" | "0" | "no" | "n" | "" => Some(false),
        _ => None,
    }
}
