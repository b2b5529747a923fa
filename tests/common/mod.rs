#![allow(dead_code)]

use chrono::NaiveDate;
use std::path::Path;
use std::sync::Arc;

use demand_forecast_mcp::config::{ColumnPolicy, SamplingPolicy};
use demand_forecast_mcp::data::catalog::Catalog;
use demand_forecast_mcp::data::transactions::{TransactionLoader, TransactionTable};
use demand_forecast_mcp::data::{ITEMS_FILE, STORES_FILE, TRAIN_FILE};
use demand_forecast_mcp::engine::context::ForecastContext;
use demand_forecast_mcp::engine::encoding::EncodingTable;
use demand_forecast_mcp::engine::features::FEATURE_COLUMNS;
use demand_forecast_mcp::engine::model::{FeatureMatrix, Regressor};
use demand_forecast_mcp::error::Result;

pub const CUTOFF: (i32, u32, u32) = (2014, 4, 1);

/// Store 1 is outside the Guayas region. Store 27 has no transactions.
pub const STORES_CSV: &str = "\
store_nbr,city,state,type,cluster
1,Quito,Pichincha,D,13
24,Guayaquil,Guayas,D,1
26,Guayaquil,Guayas,D,10
27,Daule,Guayas,D,1
";

pub const ITEMS_CSV: &str = "\
item_nbr,family,class,perishable
96995,GROCERY I,1093,0
103665,BREAD/BAKERY,2712,1
115611,CLEANING,3008,0
";

/// Sales history used by every integration test.
///
/// | store | item   | history                                         |
/// |-------|--------|-------------------------------------------------|
/// | 24    | 96995  | 3,5,2,4,6,1,7 on Feb 22..28; 8 on Mar 1; 6 on Mar 3 |
/// | 24    | 103665 | 1..=10 on Feb 19..28                            |
/// | 26    | 115611 | 4 on Feb 28 (promo); 99 on Apr 2 (after cutoff) |
/// | 1     | 96995  | 100 on Feb 25 (outside region)                  |
pub fn train_csv() -> String {
    let mut lines = vec!["id,date,store_nbr,item_nbr,unit_sales,onpromotion".to_string()];
    let mut id = 0;
    let mut push = |date: &str, store: i64, item: i64, sales: f64, promo: &str| {
        lines.push(format!("{id},{date},{store},{item},{sales},{promo}"));
        id += 1;
    };
    for (i, v) in [3.0, 5.0, 2.0, 4.0, 6.0, 1.0, 7.0].iter().enumerate() {
        push(&format!("2014-02-{:02}", 22 + i), 24, 96995, *v, "");
    }
    push("2014-03-01", 24, 96995, 8.0, "False");
    push("2014-03-03", 24, 96995, 6.0, "False");
    for day in 19..=28 {
        push(&format!("2014-02-{day}"), 24, 103_665, f64::from(day - 18), "");
    }
    push("2014-02-28", 26, 115_611, 4.0, "True");
    push("2014-04-02", 26, 115_611, 99.0, "");
    push("2014-02-25", 1, 96995, 100.0, "");
    lines.join("\n") + "\n"
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn cutoff() -> NaiveDate {
    date(CUTOFF.0, CUTOFF.1, CUTOFF.2)
}

/// Write the three CSV tables into `dir`.
pub fn write_dataset(dir: &Path) {
    std::fs::write(dir.join(STORES_FILE), STORES_CSV).unwrap();
    std::fs::write(dir.join(ITEMS_FILE), ITEMS_CSV).unwrap();
    std::fs::write(dir.join(TRAIN_FILE), train_csv()).unwrap();
}

/// Predicts the `lag_1` feature, so expected outputs follow from the history.
pub struct LastValue {
    pub features: Vec<String>,
}

impl LastValue {
    pub fn new() -> Self {
        Self {
            features: FEATURE_COLUMNS.iter().map(ToString::to_string).collect(),
        }
    }

    pub fn with_features(features: &[&str]) -> Self {
        Self {
            features: features.iter().map(ToString::to_string).collect(),
        }
    }
}

impl Regressor for LastValue {
    fn feature_names(&self) -> &[String] {
        &self.features
    }

    fn predict(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>> {
        let idx = matrix.columns.iter().position(|c| c == "lag_1").unwrap_or(0);
        Ok(matrix.rows.iter().map(|row| row[idx]).collect())
    }
}

pub fn load_catalog() -> Catalog {
    let stores = demand_forecast_mcp::data::catalog::load_stores(STORES_CSV.as_bytes(), Some("Guayas")).unwrap();
    let items = demand_forecast_mcp::data::catalog::load_items(ITEMS_CSV.as_bytes()).unwrap();
    Catalog::new(stores, items)
}

pub fn load_transactions(catalog: &Catalog, sampling: &SamplingPolicy, chunk_size: usize) -> TransactionTable {
    let store_ids = catalog.store_ids();
    let loader = TransactionLoader {
        cutoff: cutoff(),
        store_ids: &store_ids,
        sampling,
        chunk_size,
    };
    let csv = train_csv();
    loader
        .load_with(|| Ok(std::io::Cursor::new(csv.clone().into_bytes())))
        .unwrap()
}

pub fn make_context_with(
    model: Arc<dyn Regressor>,
    encodings: Option<EncodingTable>,
    policy: ColumnPolicy,
) -> ForecastContext {
    make_context_with_max_horizon(model, encodings, policy, 60)
}

pub fn make_context_with_max_horizon(
    model: Arc<dyn Regressor>,
    encodings: Option<EncodingTable>,
    policy: ColumnPolicy,
    max_horizon: usize,
) -> ForecastContext {
    let catalog = load_catalog();
    let transactions = load_transactions(&catalog, &SamplingPolicy::default(), 4);
    ForecastContext::new(catalog, transactions, model, encodings, policy, max_horizon).unwrap()
}

pub fn make_context() -> ForecastContext {
    make_context_with(Arc::new(LastValue::new()), None, ColumnPolicy::Strict)
}

/// Train a small ensemble on `FEATURE_COLUMNS` and write it with a manifest under `dir/model`.
pub fn write_gbdt_model(dir: &Path) {
    use gbdt::config::Config;
    use gbdt::decision_tree::{Data, DataVec};
    use gbdt::gradient_boost::GBDT;

    let lag_1 = FEATURE_COLUMNS.iter().position(|c| *c == "lag_1").unwrap();
    let mut cfg = Config::new();
    cfg.set_feature_size(FEATURE_COLUMNS.len());
    cfg.set_max_depth(3);
    cfg.set_iterations(10);
    cfg.set_shrinkage(0.3);
    cfg.set_loss("SquaredError");
    let mut train: DataVec = (0..20)
        .map(|i| {
            let mut features = vec![0.0; FEATURE_COLUMNS.len()];
            features[lag_1] = i as f32;
            Data::new_training_data(features, 1.0, i as f32, None)
        })
        .collect();
    let mut model = GBDT::new(&cfg);
    model.fit(&mut train);

    let model_dir = dir.join("model");
    std::fs::create_dir_all(&model_dir).unwrap();
    model
        .save_model(&model_dir.join("model.gbdt").to_string_lossy())
        .unwrap();
    std::fs::write(
        model_dir.join("manifest.json"),
        r#"{ "format": "gbdt", "model_file": "model.gbdt" }"#,
    )
    .unwrap();
}

/// Write `xgb.dump` into `dir`: one split on feature 0 at 5.0, below or
/// missing scores 10, otherwise 20.
pub fn write_one_split_dump(dir: &Path) {
    std::fs::write(
        dir.join("xgb.dump"),
        r#"0.0
[{"nodeid": 0, "depth": 0, "split": "f0", "split_condition": 5.0, "yes": 1, "no": 2, "missing": 1,
  "children": [{"nodeid": 1, "leaf": 10.0}, {"nodeid": 2, "leaf": 20.0}]}]
"#,
    )
    .unwrap();
}
