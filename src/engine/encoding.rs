//! Pinned label-to-code tables for categorical model inputs.
//!
//! Codes are assigned once, either shipped with the model or fitted from the
//! full catalog at load time, and reused verbatim for every request.

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::data::catalog::Catalog;
use crate::error::{ForecastError, Result};

/// Catalog columns converted to integer codes before inference.
pub const CATEGORICAL_COLUMNS: [&str; 6] = ["city", "state", "cluster", "family", "class", "store_type"];

/// `column -> label -> code`. Labels are the text form of the value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodingTable {
    columns: BTreeMap<String, BTreeMap<String, i64>>,
}

impl EncodingTable {
    /// Assign codes `0..n` to `labels` in sorted text order.
    pub fn insert_column<I, S>(&mut self, column: &str, labels: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sorted: BTreeSet<String> = labels.into_iter().map(Into::into).collect();
        let codes = sorted
            .into_iter()
            .enumerate()
            .map(|(code, label)| (label, code as i64))
            .collect();
        self.columns.insert(column.to_string(), codes);
    }

    /// Fit every categorical column from the catalog.
    pub fn fit_from_catalog(catalog: &Catalog) -> Self {
        let mut table = Self::default();
        table.insert_column("city", catalog.stores().map(|s| s.city.clone()));
        table.insert_column("state", catalog.stores().map(|s| s.state.clone()));
        table.insert_column("cluster", catalog.stores().map(|s| s.cluster.to_string()));
        table.insert_column("store_type", catalog.stores().map(|s| s.store_type.clone()));
        table.insert_column("family", catalog.items().map(|i| i.family.clone()));
        table.insert_column("class", catalog.items().map(|i| i.class.to_string()));
        table
    }

    pub fn code(&self, column: &str, label: &str) -> Result<i64> {
        let codes = self
            .columns
            .get(column)
            .ok_or_else(|| ForecastError::UnencodedColumn(column.to_string()))?;
        codes
            .get(label)
            .copied()
            .ok_or_else(|| ForecastError::UnknownCategory {
                column: column.to_string(),
                label: label.to_string(),
            })
    }

    /// Replace `column` in `df` with its codes. Null labels stay null.
    pub fn encode_column(&self, df: &mut DataFrame, column: &str) -> Result<()> {
        let labels = df.column(column)?.cast(&DataType::String)?;
        let codes = labels
            .str()?
            .into_iter()
            .map(|label| label.map(|l| self.code(column, l)).transpose())
            .collect::<Result<Vec<Option<i64>>>>()?;
        df.with_column(Column::new(column.into(), codes))?;
        Ok(())
    }

    /// Encode the categorical columns of `df` that appear in `wanted`.
    ///
    /// Columns outside `wanted` are left as they are, so a table only needs
    /// entries for the categorical inputs a model actually reads.
    pub fn encode_frame(&self, mut df: DataFrame, wanted: &[String]) -> Result<DataFrame> {
        for column in CATEGORICAL_COLUMNS {
            if df.schema().contains(column) && wanted.iter().any(|w| w == column) {
                self.encode_column(&mut df, column)?;
            }
        }
        Ok(df)
    }
}
