use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Which store/item pairs the transaction loader keeps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SamplingPolicy {
    /// The `n` pairs with the largest total unit sales before the cutoff.
    TopN { n: usize },
    /// An explicit list of `(store_nbr, item_nbr)` pairs.
    AllowList { pairs: Vec<(i64, i64)> },
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self::TopN { n: 100 }
    }
}

/// How the forecast runner treats model features absent from the built frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnPolicy {
    /// Fail with the full list of missing columns.
    #[default]
    Strict,
    /// Drop missing columns and log a schema-drift warning.
    Lenient,
}

impl FromStr for ColumnPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "lenient" => Ok(Self::Lenient),
            other => bail!("unknown column policy '{other}' (expected strict or lenient)"),
        }
    }
}

/// Process-wide settings, read once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Local directory holding `stores.csv`, `items.csv`, `train.csv`.
    pub data_dir: PathBuf,
    /// Subdirectory of `data_dir` holding the model manifest and tree file.
    pub model_dir: String,
    /// Keep only stores in this state; `None` keeps every store.
    pub region_state: Option<String>,
    /// Transactions on or after this date are never loaded.
    pub cutoff: NaiveDate,
    pub sampling: SamplingPolicy,
    /// Rows per chunk when streaming `train.csv`.
    pub chunk_size: usize,
    pub max_horizon: usize,
    pub column_policy: ColumnPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            model_dir: "model".to_string(),
            region_state: Some("Guayas".to_string()),
            cutoff: NaiveDate::from_ymd_opt(2014, 4, 1).unwrap_or_default(),
            sampling: SamplingPolicy::default(),
            chunk_size: 1_000_000,
            max_horizon: 60,
            column_policy: ColumnPolicy::Strict,
        }
    }
}

impl AppConfig {
    /// Build from an optional TOML file plus environment variables.
    ///
    /// | Env Var | Default | Purpose |
    /// |---------|---------|---------|
    /// | `FORECAST_CONFIG` | (none) | TOML file read before env overrides |
    /// | `DATA_ROOT` | `~/.demand-forecast/data` | Local data directory |
    /// | `MODEL_DIR` | `model` | Model subdirectory under `DATA_ROOT` |
    /// | `REGION_STATE` | `Guayas` | Store state filter (`*` = all) |
    /// | `TRAIN_CUTOFF` | `2014-04-01` | Exclusive upper bound on transaction dates |
    /// | `TOP_N_PAIRS` | `100` | Top-N sampling size |
    /// | `ALLOW_PAIRS` | (none) | `store:item,store:item` allow-list, overrides top-N |
    /// | `CHUNK_SIZE` | `1000000` | Rows per streamed chunk |
    /// | `MAX_HORIZON` | `60` | Largest accepted horizon |
    /// | `COLUMN_POLICY` | `strict` | `strict` or `lenient` |
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var("FORECAST_CONFIG") {
            Ok(path) => Self::from_toml_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };

        if let Ok(val) = std::env::var("DATA_ROOT") {
            config.data_dir = PathBuf::from(shellexpand::tilde(&val).as_ref());
        }
        if let Ok(val) = std::env::var("MODEL_DIR") {
            config.model_dir = val;
        }
        if let Ok(val) = std::env::var("REGION_STATE") {
            config.region_state = parse_region(&val);
        }
        if let Ok(val) = std::env::var("TRAIN_CUTOFF") {
            config.cutoff = NaiveDate::parse_from_str(&val, "%Y-%m-%d")
                .with_context(|| format!("Invalid TRAIN_CUTOFF: {val}"))?;
        }
        if let Ok(val) = std::env::var("TOP_N_PAIRS") {
            let n = val
                .parse()
                .with_context(|| format!("Invalid TOP_N_PAIRS: {val}"))?;
            config.sampling = SamplingPolicy::TopN { n };
        }
        if let Ok(val) = std::env::var("ALLOW_PAIRS") {
            config.sampling = SamplingPolicy::AllowList {
                pairs: parse_pairs(&val)?,
            };
        }
        if let Ok(val) = std::env::var("CHUNK_SIZE") {
            config.chunk_size = val
                .parse()
                .with_context(|| format!("Invalid CHUNK_SIZE: {val}"))?;
        }
        if let Ok(val) = std::env::var("MAX_HORIZON") {
            config.max_horizon = val
                .parse()
                .with_context(|| format!("Invalid MAX_HORIZON: {val}"))?;
        }
        if let Ok(val) = std::env::var("COLUMN_POLICY") {
            config.column_policy = val.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&text)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            bail!("chunk_size must be at least 1");
        }
        if self.max_horizon == 0 {
            bail!("max_horizon must be at least 1");
        }
        if let SamplingPolicy::TopN { n: 0 } = self.sampling {
            bail!("top-N sampling needs n >= 1");
        }
        if let SamplingPolicy::AllowList { pairs } = &self.sampling {
            if pairs.is_empty() {
                bail!("allow-list sampling needs at least one pair");
            }
        }
        Ok(())
    }

    pub fn model_path(&self) -> PathBuf {
        self.data_dir.join(&self.model_dir)
    }
}

fn parse_region(val: &str) -> Option<String> {
    let trimmed = val.trim();
    if trimmed.is_empty() || trimmed == "*" {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parse `"24:115611,25:103665"` into pairs.
fn parse_pairs(val: &str) -> Result<Vec<(i64, i64)>> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let (store, item) = pair
                .split_once(':')
                .with_context(|| format!("Expected store:item, got '{pair}'"))?;
            Ok((
                store
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid store in '{pair}'"))?,
                item.trim()
                    .parse()
                    .with_context(|| format!("Invalid item in '{pair}'"))?,
            ))
        })
        .collect()
}

/// Default data directory: `~/.demand-forecast/data`
fn default_data_dir() -> PathBuf {
    const TEMPLATE: &str = "~/.demand-forecast/data";
    let expanded = shellexpand::tilde(TEMPLATE);
    // If tilde was not expanded (no home directory available), fall back to a tmp-based path
    if expanded.as_ref() == TEMPLATE {
        return std::env::temp_dir().join("demand-forecast").join("data");
    }
    PathBuf::from(expanded.as_ref())
}
