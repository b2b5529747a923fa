//! Store and item reference tables.

use polars::prelude::*;
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use super::{ITEM_COL, STORE_COL};
use crate::engine::types::{ItemRecord, StoreRecord};
use crate::error::Result;

/// Parse the stores table, keeping only stores in `region` when given.
pub fn load_stores<R: Read>(reader: R, region: Option<&str>) -> Result<Vec<StoreRecord>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut stores = Vec::new();
    for result in csv_reader.deserialize() {
        let store: StoreRecord = result?;
        if region.is_none_or(|state| store.state == state) {
            stores.push(store);
        }
    }
    Ok(stores)
}

/// Parse the items table.
pub fn load_items<R: Read>(reader: R) -> Result<Vec<ItemRecord>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut items = Vec::new();
    for result in csv_reader.deserialize() {
        items.push(result?);
    }
    Ok(items)
}

/// Immutable store/item reference data, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    stores: BTreeMap<i64, StoreRecord>,
    items: BTreeMap<i64, ItemRecord>,
}

impl Catalog {
    /// Index records by id. A repeated id keeps the last row.
    pub fn new(stores: Vec<StoreRecord>, items: Vec<ItemRecord>) -> Self {
        let mut by_store = BTreeMap::new();
        for store in stores {
            let id = store.store_nbr;
            if by_store.insert(id, store).is_some() {
                tracing::warn!(store_nbr = id, "Duplicate store row, keeping the last one");
            }
        }
        let mut by_item = BTreeMap::new();
        for item in items {
            let id = item.item_nbr;
            if by_item.insert(id, item).is_some() {
                tracing::warn!(item_nbr = id, "Duplicate item row, keeping the last one");
            }
        }
        Self {
            stores: by_store,
            items: by_item,
        }
    }

    pub fn load(stores_path: &Path, items_path: &Path, region: Option<&str>) -> Result<Self> {
        let stores = load_stores(std::fs::File::open(stores_path)?, region)?;
        let items = load_items(std::fs::File::open(items_path)?)?;
        tracing::info!(
            stores = stores.len(),
            items = items.len(),
            region = region.unwrap_or("*"),
            "Catalog loaded"
        );
        Ok(Self::new(stores, items))
    }

    pub fn store(&self, store_nbr: i64) -> Option<&StoreRecord> {
        self.stores.get(&store_nbr)
    }

    pub fn item(&self, item_nbr: i64) -> Option<&ItemRecord> {
        self.items.get(&item_nbr)
    }

    /// Stores in ascending id order.
    pub fn stores(&self) -> impl Iterator<Item = &StoreRecord> {
        self.stores.values()
    }

    pub fn items(&self) -> impl Iterator<Item = &ItemRecord> {
        self.items.values()
    }

    pub fn store_count(&self) -> usize {
        self.stores.len()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn store_ids(&self) -> FxHashSet<i64> {
        self.stores.keys().copied().collect()
    }

    /// Stores table as a frame: `store_nbr, city, state, cluster, store_type`.
    pub fn stores_frame(&self) -> PolarsResult<DataFrame> {
        let ids: Vec<i64> = self.stores.keys().copied().collect();
        let cities: Vec<&str> = self.stores.values().map(|s| s.city.as_str()).collect();
        let states: Vec<&str> = self.stores.values().map(|s| s.state.as_str()).collect();
        let clusters: Vec<i64> = self.stores.values().map(|s| s.cluster).collect();
        let types: Vec<&str> = self.stores.values().map(|s| s.store_type.as_str()).collect();
        df! {
            STORE_COL => ids,
            "city" => cities,
            "state" => states,
            "cluster" => clusters,
            "store_type" => types,
        }
    }

    /// Items table as a frame: `item_nbr, family, class, perishable`.
    pub fn items_frame(&self) -> PolarsResult<DataFrame> {
        let ids: Vec<i64> = self.items.keys().copied().collect();
        let families: Vec<&str> = self.items.values().map(|i| i.family.as_str()).collect();
        let classes: Vec<i64> = self.items.values().map(|i| i.class).collect();
        let perishable: Vec<bool> = self.items.values().map(|i| i.perishable).collect();
        df! {
            ITEM_COL => ids,
            "family" => families,
            "class" => classes,
            "perishable" => perishable,
        }
    }
}
