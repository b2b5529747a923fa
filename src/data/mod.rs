pub mod cache;
pub mod catalog;
pub mod transactions;

/// Reference table file names inside the data directory.
pub const STORES_FILE: &str = "stores.csv";
pub const ITEMS_FILE: &str = "items.csv";
pub const TRAIN_FILE: &str = "train.csv";

/// Canonical column names shared by the loaders and the feature builder.
pub const STORE_COL: &str = "store_nbr";
pub const ITEM_COL: &str = "item_nbr";
pub const DATE_COL: &str = "date";
pub const SALES_COL: &str = "unit_sales";
pub const PROMO_COL: &str = "onpromotion";
