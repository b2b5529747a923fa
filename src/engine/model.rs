//! Serialized tree-ensemble regressor and its manifest.

use gbdt::decision_tree::{Data, DataVec, ValueType, VALUE_TYPE_UNKNOWN};
use gbdt::gradient_boost::GBDT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::encoding::EncodingTable;
use super::features::FEATURE_COLUMNS;
use crate::error::{ForecastError, Result};

/// Name of the manifest file inside the model directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Row-major feature values in the model's column order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Anything that turns a feature matrix into one prediction per row.
pub trait Regressor: Send + Sync {
    /// Ordered input columns the model was trained on.
    fn feature_names(&self) -> &[String];

    fn predict(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFormat {
    /// xgboost tree dump, read through `GBDT::from_xgboost_dump`.
    XgboostDump,
    /// Native `gbdt` crate model file.
    Gbdt,
}

fn default_objective() -> String {
    "reg:linear".to_string()
}

fn default_features() -> Vec<String> {
    FEATURE_COLUMNS.iter().map(ToString::to_string).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelManifest {
    pub format: ModelFormat,
    #[serde(default = "default_objective")]
    pub objective: String,
    /// Path of the ensemble file, relative to the manifest.
    pub model_file: String,
    #[serde(default = "default_features")]
    pub features: Vec<String>,
    #[serde(default)]
    pub encodings: Option<EncodingTable>,
}

impl ModelManifest {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ForecastError::NotFound {
                what: "model manifest",
                path: path.to_path_buf(),
            });
        }
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn model_path(&self, model_dir: &Path) -> PathBuf {
        model_dir.join(&self.model_file)
    }
}

pub struct GbdtRegressor {
    model: GBDT,
    features: Vec<String>,
}

impl std::fmt::Debug for GbdtRegressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GbdtRegressor")
            .field("features", &self.features)
            .finish_non_exhaustive()
    }
}

impl GbdtRegressor {
    /// Load the ensemble described by `manifest` from `model_dir`.
    pub fn load(manifest: &ModelManifest, model_dir: &Path) -> Result<Self> {
        let path = manifest.model_path(model_dir);
        if !path.exists() {
            return Err(ForecastError::NotFound {
                what: "model file",
                path,
            });
        }
        let path_str = path.to_string_lossy();
        let model = match manifest.format {
            ModelFormat::XgboostDump => GBDT::from_xgboost_dump(&path_str, &manifest.objective),
            ModelFormat::Gbdt => GBDT::load_model(&path_str),
        }
        .map_err(|e| ForecastError::Model(format!("{}: {e}", path.display())))?;

        tracing::info!(
            path = %path.display(),
            format = ?manifest.format,
            features = manifest.features.len(),
            "Model loaded"
        );
        Ok(Self {
            model,
            features: manifest.features.clone(),
        })
    }
}

/// gbdt only takes a node's missing branch on this exact sentinel; `NaN`
/// would compare false against every split and always go right.
fn gbdt_value(value: f64) -> ValueType {
    if value.is_nan() {
        VALUE_TYPE_UNKNOWN
    } else {
        value as ValueType
    }
}

impl Regressor for GbdtRegressor {
    fn feature_names(&self) -> &[String] {
        &self.features
    }

    fn predict(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>> {
        if matrix.is_empty() {
            return Ok(Vec::new());
        }
        let data: DataVec = matrix
            .rows
            .iter()
            .map(|row| {
                let values = row.iter().map(|&v| gbdt_value(v)).collect();
                Data::new_test_data(values, None)
            })
            .collect();
        let predictions = self.model.predict(&data);
        Ok(predictions.into_iter().map(f64::from).collect())
    }
}
