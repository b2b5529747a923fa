use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::engine::types::{ComparisonPoint, ForecastPoint, ItemRecord, StoreRecord};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DateRange {
    pub start: Option<String>,
    pub end: Option<String>,
}

/// AI-enriched response for `dataset_summary`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DatasetSummaryResponse {
    pub summary: String,
    pub transaction_rows: usize,
    pub pairs: usize,
    pub stores: usize,
    pub items: usize,
    pub date_range: DateRange,
    pub model_features: Vec<String>,
    pub max_horizon: usize,
    pub suggested_next_steps: Vec<String>,
}

/// Response for `list_stores`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StoresResponse {
    pub summary: String,
    pub total: usize,
    pub stores: Vec<StoreRecord>,
    pub suggested_next_steps: Vec<String>,
}

/// One item with recorded sales at the requested store.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ItemEntry {
    pub item_nbr: i64,
    /// Catalog attributes; absent when the item is not in the items table.
    pub details: Option<ItemRecord>,
}

/// Response for `list_items`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ItemsResponse {
    pub summary: String,
    pub store_nbr: i64,
    pub up_to: NaiveDate,
    pub total: usize,
    pub items: Vec<ItemEntry>,
    pub suggested_next_steps: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ActualPoint {
    pub date: NaiveDate,
    pub unit_sales: f64,
}

/// Aggregates over the forecast horizon.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ForecastStats {
    pub days: usize,
    pub total_predicted: f64,
    pub mean_predicted: f64,
    pub peak_date: Option<NaiveDate>,
    pub peak_prediction: Option<f64>,
    /// Days in the horizon with recorded sales.
    pub days_with_actuals: usize,
    pub total_actual: f64,
}

/// AI-enriched response for `forecast`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ForecastResponse {
    pub summary: String,
    pub store_nbr: i64,
    pub item_nbr: i64,
    pub start_date: NaiveDate,
    pub horizon: usize,
    pub stats: ForecastStats,
    pub predictions: Vec<ForecastPoint>,
    pub actuals: Vec<ActualPoint>,
    pub comparison: Vec<ComparisonPoint>,
    pub suggested_next_steps: Vec<String>,
}

/// Local presence of one data or model file.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachedFile {
    pub name: String,
    pub exists: bool,
    pub file_path: String,
    pub size_bytes: Option<u64>,
    pub last_updated: Option<String>,
}

/// Response for `check_cache_status`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CheckCacheResponse {
    pub summary: String,
    pub data_dir: String,
    pub remote_configured: bool,
    pub files: Vec<CachedFile>,
    pub suggested_next_steps: Vec<String>,
}
