//! Read-only state shared by every forecast request.

use anyhow::Context;
use polars::prelude::DataFrame;
use std::sync::Arc;

use super::encoding::EncodingTable;
use super::forecast::{compare_with_actuals, forecast_timeseries};
use super::model::{GbdtRegressor, ModelManifest, Regressor, MANIFEST_FILE};
use super::types::{ComparisonPoint, DailySale, ForecastPoint, ForecastRequest};
use crate::config::{AppConfig, ColumnPolicy};
use crate::data::cache::CachedStore;
use crate::data::catalog::Catalog;
use crate::data::transactions::{TransactionLoader, TransactionTable};
use crate::data::{ITEMS_FILE, STORES_FILE, TRAIN_FILE};
use crate::error::{ForecastError, Result};

/// Forecast plus the recorded sales over the same days.
#[derive(Debug, Clone)]
pub struct ForecastOutcome {
    pub predictions: Vec<ForecastPoint>,
    pub actuals: Vec<DailySale>,
    pub comparison: Vec<ComparisonPoint>,
}

pub struct ForecastContext {
    catalog: Catalog,
    transactions: TransactionTable,
    encodings: EncodingTable,
    model: Arc<dyn Regressor>,
    stores_frame: DataFrame,
    items_frame: DataFrame,
    column_policy: ColumnPolicy,
    max_horizon: usize,
}

impl std::fmt::Debug for ForecastContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForecastContext")
            .field("stores", &self.catalog.store_count())
            .field("items", &self.catalog.item_count())
            .field("transactions", &self.transactions.height())
            .field("column_policy", &self.column_policy)
            .field("max_horizon", &self.max_horizon)
            .finish_non_exhaustive()
    }
}

impl ForecastContext {
    /// Assemble a context. Without a pinned table, encodings are fitted once
    /// from `catalog` here.
    pub fn new(
        catalog: Catalog,
        transactions: TransactionTable,
        model: Arc<dyn Regressor>,
        encodings: Option<EncodingTable>,
        column_policy: ColumnPolicy,
        max_horizon: usize,
    ) -> Result<Self> {
        let encodings = match encodings {
            Some(table) => table,
            None => {
                tracing::info!("No pinned encodings in manifest, fitting from catalog");
                EncodingTable::fit_from_catalog(&catalog)
            }
        };
        let stores_frame = catalog.stores_frame()?;
        let items_frame = catalog.items_frame()?;
        Ok(Self {
            catalog,
            transactions,
            encodings,
            model,
            stores_frame,
            items_frame,
            column_policy,
            max_horizon,
        })
    }

    /// Fetch any missing files, then parse everything on a blocking thread.
    pub async fn load(config: &AppConfig, cache: &CachedStore) -> anyhow::Result<Self> {
        let stores_path = cache.ensure_local(STORES_FILE, "stores table").await?;
        let items_path = cache.ensure_local(ITEMS_FILE, "items table").await?;
        let train_path = cache.ensure_local(TRAIN_FILE, "transactions table").await?;

        let manifest_key = format!("{}/{MANIFEST_FILE}", config.model_dir);
        let manifest_path = cache.ensure_local(&manifest_key, "model manifest").await?;
        let manifest = ModelManifest::read(&manifest_path)?;
        let model_key = format!("{}/{}", config.model_dir, manifest.model_file);
        cache.ensure_local(&model_key, "model file").await?;

        let config = config.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<Self> {
            let catalog = Catalog::load(&stores_path, &items_path, config.region_state.as_deref())
                .context("Failed to load catalog")?;
            let store_ids = catalog.store_ids();
            let loader = TransactionLoader {
                cutoff: config.cutoff,
                store_ids: &store_ids,
                sampling: &config.sampling,
                chunk_size: config.chunk_size,
            };
            let transactions = loader
                .load_path(&train_path)
                .with_context(|| format!("Failed to load {}", train_path.display()))?;
            let model = GbdtRegressor::load(&manifest, &config.model_path())
                .context("Failed to load model")?;

            Ok(Self::new(
                catalog,
                transactions,
                Arc::new(model),
                manifest.encodings,
                config.column_policy,
                config.max_horizon,
            )?)
        })
        .await
        .context("Loader task panicked")?
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn transactions(&self) -> &TransactionTable {
        &self.transactions
    }

    pub fn feature_names(&self) -> &[String] {
        self.model.feature_names()
    }

    pub fn max_horizon(&self) -> usize {
        self.max_horizon
    }

    fn check_request(&self, request: &ForecastRequest) -> Result<()> {
        if request.horizon == 0 || request.horizon > self.max_horizon {
            return Err(ForecastError::InvalidHorizon {
                got: request.horizon,
                max: self.max_horizon,
            });
        }
        if self.catalog.store(request.store_nbr).is_none() {
            return Err(ForecastError::UnknownStore(request.store_nbr));
        }
        Ok(())
    }

    /// Predictions for `request`; empty when the pair has no prior history.
    pub fn forecast(&self, request: &ForecastRequest) -> Result<Vec<ForecastPoint>> {
        self.check_request(request)?;
        forecast_timeseries(
            self.model.as_ref(),
            request,
            &self.transactions,
            &self.stores_frame,
            &self.items_frame,
            &self.encodings,
            self.column_policy,
        )
    }

    /// Forecast, recorded sales over the horizon, and their merged series.
    pub fn forecast_with_actuals(&self, request: &ForecastRequest) -> Result<ForecastOutcome> {
        let predictions = self.forecast(request)?;
        let actuals = self.transactions.actuals(
            request.store_nbr,
            request.item_nbr,
            request.start_date,
            request.horizon,
        )?;
        let comparison = compare_with_actuals(&predictions, &actuals);
        Ok(ForecastOutcome {
            predictions,
            actuals,
            comparison,
        })
    }
}
