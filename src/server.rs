use garde::Validate;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Json},
    model::{Implementation, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ServerHandler,
};
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;

use crate::data::cache::CachedStore;
use crate::engine::context::ForecastContext;
use crate::tools;
use crate::tools::response_types::{
    CheckCacheResponse, DatasetSummaryResponse, ForecastResponse, ItemsResponse, StoresResponse,
};

#[derive(Clone)]
pub struct ForecastServer {
    pub context: Arc<ForecastContext>,
    pub cache: Arc<CachedStore>,
    /// Model subdirectory under the data directory.
    pub model_dir: String,
    tool_router: ToolRouter<Self>,
}

impl ForecastServer {
    pub fn new(context: Arc<ForecastContext>, cache: Arc<CachedStore>, model_dir: String) -> Self {
        Self {
            context,
            cache,
            model_dir,
            tool_router: Self::tool_router(),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct ListItemsParams {
    /// Store id (e.g. 24)
    #[garde(range(min = 1))]
    pub store_nbr: i64,
    /// Only items sold on or before this date (YYYY-MM-DD). Defaults to the last loaded date.
    #[garde(inner(pattern(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$")))]
    pub up_to: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct ForecastParams {
    /// Store id (e.g. 24)
    #[garde(range(min = 1))]
    pub store_nbr: i64,
    /// Item id (e.g. 96995)
    #[garde(range(min = 1))]
    pub item_nbr: i64,
    /// First forecast day (YYYY-MM-DD). Only sales before this date feed the features.
    #[garde(pattern(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$"))]
    pub start_date: String,
    /// Number of days to forecast, from 1 up to the server's maximum (60 by default)
    #[garde(range(min = 1))]
    pub horizon: usize,
}

use rmcp::handler::server::wrapper::Parameters;

#[tool_router]
impl ForecastServer {
    /// Summarize the loaded sales history, catalog, and model.
    ///
    /// **When to use**: First call of a session, to see the date range and scope
    /// **Prerequisites**: None (data is loaded at startup)
    /// **Next tools**: list_stores, list_items
    #[tool(name = "dataset_summary")]
    async fn dataset_summary(&self) -> Result<Json<DatasetSummaryResponse>, String> {
        tools::dataset_summary::execute(&self.context)
            .map(Json)
            .map_err(|e| format!("Error: {e}"))
    }

    /// List stores in the loaded catalog with city, state, type and cluster.
    ///
    /// **When to use**: To pick a store_nbr for list_items or forecast
    /// **Prerequisites**: None
    /// **Next tool**: list_items({ store_nbr })
    #[tool(name = "list_stores")]
    async fn list_stores(&self) -> Json<StoresResponse> {
        Json(tools::list_stores::execute(&self.context))
    }

    /// List items with recorded sales at a store on or before a date.
    ///
    /// **When to use**: To pick an item_nbr that has history to forecast from
    /// **Prerequisites**: A store_nbr from list_stores
    /// **Next tool**: forecast({ store_nbr, item_nbr, start_date, horizon })
    #[tool(name = "list_items")]
    async fn list_items(
        &self,
        Parameters(params): Parameters<ListItemsParams>,
    ) -> Result<Json<ItemsResponse>, String> {
        params
            .validate()
            .map_err(|e| format!("Validation error: {e}"))?;
        let up_to = params
            .up_to
            .as_deref()
            .map(|s| chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d"))
            .transpose()
            .map_err(|e| format!("Validation error: up_to: {e}"))?;
        tools::list_items::execute(&self.context, params.store_nbr, up_to)
            .map(Json)
            .map_err(|e| format!("Error: {e}"))
    }

    /// Forecast daily unit sales for one store/item pair.
    ///
    /// **When to use**: After list_items, to predict sales over a horizon
    /// **Prerequisites**: The pair must have sales before start_date
    /// **Next tools**: forecast again with another start_date or item
    ///
    /// Features are built only from sales strictly before start_date. Returns
    /// predictions, recorded sales over the same days, and a merged comparison
    /// series. An empty prediction list means the pair has no usable history.
    #[tool(name = "forecast")]
    async fn forecast(
        &self,
        Parameters(params): Parameters<ForecastParams>,
    ) -> Result<Json<ForecastResponse>, String> {
        params
            .validate()
            .map_err(|e| format!("Validation error: {e}"))?;
        let max_horizon = self.context.max_horizon();
        if params.horizon > max_horizon {
            return Err(format!(
                "Validation error: horizon: {} is greater than the maximum of {max_horizon}",
                params.horizon
            ));
        }
        tools::forecast::execute(
            &self.context,
            params.store_nbr,
            params.item_nbr,
            &params.start_date,
            params.horizon,
        )
        .map(Json)
        .map_err(|e| format!("Error: {e}"))
    }

    /// Check whether the data files and model artifact are present locally.
    ///
    /// **When to use**: To diagnose missing data or model files
    /// **Prerequisites**: None
    #[tool(name = "check_cache_status")]
    async fn check_cache_status(&self) -> Result<Json<CheckCacheResponse>, String> {
        tools::cache_status::execute(&self.cache, &self.model_dir)
            .map(Json)
            .map_err(|e| format!("Error: {e}"))
    }
}

#[tool_handler]
impl ServerHandler for ForecastServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: rmcp::model::ProtocolVersion::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "demand-forecast-mcp".into(),
                title: None,
                version: env!("CARGO_PKG_VERSION").into(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Retail demand forecasting over daily store/item sales. \
                \n\nRecommended workflow:\
                \n1. dataset_summary(): loaded rows, pairs, date range and model features.\
                \n2. list_stores(): stores in scope with city, state, type and cluster.\
                \n3. list_items({ store_nbr, up_to? }): items with sales history at a store.\
                \n4. forecast({ store_nbr, item_nbr, start_date, horizon }): daily predictions \
                from lag, rolling and calendar features built from sales before start_date, \
                alongside recorded sales for the same days.\
                \n\ncheck_cache_status() reports which data and model files are present locally."
                    .into(),
            ),
        }
    }
}
