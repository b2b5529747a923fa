//! Historical sales loading.
//!
//! The source file is streamed in fixed-size chunks. Each chunk is filtered
//! (cutoff date, catalog stores, sampled pairs), aggregated, and dropped
//! before the next one is read, so peak memory is one chunk plus the kept
//! rows.

use chrono::{Duration, NaiveDate};
use polars::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;

use super::{DATE_COL, ITEM_COL, PROMO_COL, SALES_COL, STORE_COL};
use crate::config::SamplingPolicy;
use crate::engine::types::{deserialize_opt_flag, DailySale};
use crate::error::{ForecastError, Result};

/// Days between 0001-01-01 (CE day 1) and 1970-01-01.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// One raw row of `train.csv`. Extra columns (`id`) are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTransaction {
    pub date: NaiveDate,
    pub store_nbr: i64,
    pub item_nbr: i64,
    pub unit_sales: f64,
    #[serde(default, deserialize_with = "deserialize_opt_flag")]
    pub onpromotion: Option<bool>,
}

/// Stream `RawTransaction` rows in chunks of at most `chunk_size`.
///
/// A parse error ends the stream after being yielded.
pub fn read_chunks<R: Read>(
    reader: R,
    chunk_size: usize,
) -> impl Iterator<Item = Result<Vec<RawTransaction>>> {
    let mut records = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader)
        .into_deserialize::<RawTransaction>();
    let mut failed = false;

    std::iter::from_fn(move || {
        if failed {
            return None;
        }
        let mut chunk = Vec::with_capacity(chunk_size.min(65_536));
        for record in records.by_ref() {
            match record {
                Ok(row) => chunk.push(row),
                Err(e) => {
                    failed = true;
                    return Some(Err(ForecastError::from(e)));
                }
            }
            if chunk.len() >= chunk_size {
                break;
            }
        }
        if chunk.is_empty() {
            None
        } else {
            Some(Ok(chunk))
        }
    })
}

/// Filters and samples the transaction source.
pub struct TransactionLoader<'a> {
    pub cutoff: NaiveDate,
    pub store_ids: &'a FxHashSet<i64>,
    pub sampling: &'a SamplingPolicy,
    pub chunk_size: usize,
}

impl TransactionLoader<'_> {
    pub fn load_path(&self, path: &Path) -> Result<TransactionTable> {
        self.load_with(|| std::fs::File::open(path))
    }

    /// Load from a re-openable source. Top-N sampling reads the source twice:
    /// once to rank pairs by volume, once to collect their rows.
    pub fn load_with<R, F>(&self, open: F) -> Result<TransactionTable>
    where
        R: Read,
        F: Fn() -> std::io::Result<R>,
    {
        let pairs: FxHashSet<(i64, i64)> = match self.sampling {
            SamplingPolicy::TopN { n } => self.top_pairs(open()?, *n)?.into_iter().collect(),
            SamplingPolicy::AllowList { pairs } => pairs.iter().copied().collect(),
        };
        tracing::info!(pairs = pairs.len(), cutoff = %self.cutoff, "Collecting transactions");

        let mut partials = Vec::new();
        let mut scanned = 0usize;
        for (index, chunk) in read_chunks(open()?, self.chunk_size).enumerate() {
            let chunk = chunk?;
            scanned += chunk.len();
            let kept: Vec<RawTransaction> = chunk
                .into_iter()
                .filter(|row| {
                    self.in_scope(row) && pairs.contains(&(row.store_nbr, row.item_nbr))
                })
                .collect();
            tracing::debug!(chunk = index, kept = kept.len(), "Chunk filtered");
            if !kept.is_empty() {
                partials.push(aggregate_daily(&rows_to_frame(&kept)?)?);
            }
        }

        let table = TransactionTable::from_partials(partials)?;
        if table.is_empty() {
            tracing::warn!(scanned, "No transactions survived the filters");
        } else {
            tracing::info!(scanned, rows = table.height(), "Transactions loaded");
        }
        Ok(table)
    }

    /// Rank pairs by total unit sales before the cutoff and keep the top `n`.
    ///
    /// Ties are broken by ascending `(store_nbr, item_nbr)`.
    pub fn top_pairs<R: Read>(&self, reader: R, n: usize) -> Result<Vec<(i64, i64)>> {
        let mut totals: FxHashMap<(i64, i64), f64> = FxHashMap::default();
        for chunk in read_chunks(reader, self.chunk_size) {
            for row in chunk? {
                if self.in_scope(&row) {
                    *totals.entry((row.store_nbr, row.item_nbr)).or_default() += row.unit_sales;
                }
            }
        }

        let mut ranked: Vec<((i64, i64), f64)> = totals.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(n);
        Ok(ranked.into_iter().map(|(pair, _)| pair).collect())
    }

    fn in_scope(&self, row: &RawTransaction) -> bool {
        row.date < self.cutoff && self.store_ids.contains(&row.store_nbr)
    }
}

/// Build an unaggregated frame from raw rows. Unknown promotion flags become `false`.
pub fn rows_to_frame(rows: &[RawTransaction]) -> PolarsResult<DataFrame> {
    let stores: Vec<i64> = rows.iter().map(|r| r.store_nbr).collect();
    let items: Vec<i64> = rows.iter().map(|r| r.item_nbr).collect();
    let sales: Vec<f64> = rows.iter().map(|r| r.unit_sales).collect();
    let promos: Vec<bool> = rows.iter().map(|r| r.onpromotion.unwrap_or(false)).collect();

    let mut df = df! {
        STORE_COL => stores,
        ITEM_COL => items,
        SALES_COL => sales,
        PROMO_COL => promos,
    }?;
    df.with_column(
        DateChunked::from_naive_date(PlSmallStr::from(DATE_COL), rows.iter().map(|r| r.date))
            .into_column(),
    )?;
    df.select([STORE_COL, ITEM_COL, DATE_COL, SALES_COL, PROMO_COL])
}

/// Sum duplicate `(store, item, date)` rows and sort by that key.
///
/// Aggregating an already aggregated frame returns the same values.
pub fn aggregate_daily(df: &DataFrame) -> PolarsResult<DataFrame> {
    df.clone()
        .lazy()
        .group_by([col(STORE_COL), col(ITEM_COL), col(DATE_COL)])
        .agg([
            col(SALES_COL).sum(),
            col(PROMO_COL)
                .cast(DataType::Int32)
                .sum()
                .gt(lit(0))
                .alias(PROMO_COL),
        ])
        .sort(
            [STORE_COL, ITEM_COL, DATE_COL],
            SortMultipleOptions::default(),
        )
        .collect()
}

/// Aggregated, read-only sales history.
#[derive(Debug, Clone)]
pub struct TransactionTable {
    frame: DataFrame,
}

impl TransactionTable {
    /// Wrap a frame with `store_nbr, item_nbr, date, unit_sales, onpromotion`,
    /// aggregating duplicate keys.
    pub fn new(frame: &DataFrame) -> Result<Self> {
        Ok(Self {
            frame: aggregate_daily(frame)?,
        })
    }

    pub fn from_rows(rows: &[RawTransaction]) -> Result<Self> {
        Self::new(&rows_to_frame(rows)?)
    }

    fn from_partials(partials: Vec<DataFrame>) -> Result<Self> {
        let mut iter = partials.into_iter();
        let Some(mut combined) = iter.next() else {
            return Self::from_rows(&[]);
        };
        for part in iter {
            combined.vstack_mut(&part)?;
        }
        // Chunks can split one key across partials; a second pass merges them.
        Self::new(&combined)
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    /// History of one pair, ascending, optionally restricted to dates before `before`.
    pub fn series(
        &self,
        store_nbr: i64,
        item_nbr: i64,
        before: Option<NaiveDate>,
    ) -> Result<Vec<DailySale>> {
        let mut predicate = col(STORE_COL)
            .eq(lit(store_nbr))
            .and(col(ITEM_COL).eq(lit(item_nbr)));
        if let Some(date) = before {
            predicate = predicate.and(col(DATE_COL).lt(lit(date)));
        }
        let df = self
            .frame
            .clone()
            .lazy()
            .filter(predicate)
            .sort([DATE_COL], SortMultipleOptions::default())
            .collect()?;
        daily_sales(&df)
    }

    /// Recorded sales of one pair over `[start, start + horizon)`.
    pub fn actuals(
        &self,
        store_nbr: i64,
        item_nbr: i64,
        start: NaiveDate,
        horizon: usize,
    ) -> Result<Vec<DailySale>> {
        let end = offset_date(start, horizon as i64)?;
        let df = self
            .frame
            .clone()
            .lazy()
            .filter(
                col(STORE_COL)
                    .eq(lit(store_nbr))
                    .and(col(ITEM_COL).eq(lit(item_nbr)))
                    .and(col(DATE_COL).gt_eq(lit(start)))
                    .and(col(DATE_COL).lt(lit(end))),
            )
            .sort([DATE_COL], SortMultipleOptions::default())
            .collect()?;
        daily_sales(&df)
    }

    /// Distinct `(store, item)` pairs present in the table, sorted.
    pub fn pairs(&self) -> Result<Vec<(i64, i64)>> {
        let df = self
            .frame
            .clone()
            .lazy()
            .select([col(STORE_COL), col(ITEM_COL)])
            .unique(None, UniqueKeepStrategy::First)
            .sort([STORE_COL, ITEM_COL], SortMultipleOptions::default())
            .collect()?;
        let stores = df.column(STORE_COL)?.i64()?;
        let items = df.column(ITEM_COL)?.i64()?;
        Ok(stores
            .into_no_null_iter()
            .zip(items.into_no_null_iter())
            .collect())
    }

    /// Items with at least one recorded sale at `store_nbr` on or before `up_to`.
    pub fn items_for_store(&self, store_nbr: i64, up_to: NaiveDate) -> Result<Vec<i64>> {
        let df = self
            .frame
            .clone()
            .lazy()
            .filter(
                col(STORE_COL)
                    .eq(lit(store_nbr))
                    .and(col(DATE_COL).lt_eq(lit(up_to))),
            )
            .select([col(ITEM_COL)])
            .unique(None, UniqueKeepStrategy::First)
            .sort([ITEM_COL], SortMultipleOptions::default())
            .collect()?;
        Ok(df.column(ITEM_COL)?.i64()?.into_no_null_iter().collect())
    }

    /// First and last transaction dates, or `None` for an empty table.
    pub fn date_range(&self) -> Result<Option<(NaiveDate, NaiveDate)>> {
        if self.is_empty() {
            return Ok(None);
        }
        let dates = self.frame.column(DATE_COL)?.date()?;
        match (dates.phys.min(), dates.phys.max()) {
            (Some(min), Some(max)) => Ok(Some((days_to_date(min)?, days_to_date(max)?))),
            _ => Ok(None),
        }
    }
}

/// Extend `series` to one entry per day over `[from, to]`, filling missing days with `fill`.
///
/// Entries outside the range are ignored. `series` must be sorted by date.
pub fn reindex_daily(
    series: &[DailySale],
    from: NaiveDate,
    to: NaiveDate,
    fill: f64,
) -> Vec<DailySale> {
    let mut out = Vec::new();
    let mut source = series.iter().skip_while(|s| s.date < from).peekable();
    for date in from.iter_days().take_while(|d| *d <= to) {
        let unit_sales = match source.peek() {
            Some(s) if s.date == date => {
                let value = s.unit_sales;
                source.next();
                value
            }
            _ => fill,
        };
        out.push(DailySale { date, unit_sales });
    }
    out
}

/// Read `date` and `unit_sales` columns into `DailySale` values.
pub fn daily_sales(df: &DataFrame) -> Result<Vec<DailySale>> {
    let dates = naive_dates(df.column(DATE_COL)?)?;
    let sales = df.column(SALES_COL)?.f64()?;
    Ok(dates
        .into_iter()
        .zip(sales.into_iter())
        .map(|(date, value)| DailySale {
            date,
            unit_sales: value.unwrap_or(0.0),
        })
        .collect())
}

/// Convert a Date column to `NaiveDate`s. Nulls are rejected.
pub fn naive_dates(column: &Column) -> Result<Vec<NaiveDate>> {
    column
        .date()?
        .phys
        .iter()
        .enumerate()
        .map(|(idx, days)| match days {
            Some(d) => days_to_date(d),
            None => Err(PolarsError::ComputeError(
                format!("null date at index {idx}").into(),
            )
            .into()),
        })
        .collect()
}

fn days_to_date(days: i32) -> Result<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + EPOCH_DAYS_FROM_CE).ok_or_else(|| {
        PolarsError::ComputeError(format!("invalid date value {days}").into()).into()
    })
}

/// `date + days`, checked.
pub fn offset_date(date: NaiveDate, days: i64) -> Result<NaiveDate> {
    date.checked_add_signed(Duration::days(days))
        .ok_or(ForecastError::DateOutOfRange(date))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    const TRAIN_CSV: &str = "\
id,date,store_nbr,item_nbr,unit_sales,onpromotion
0,2014-01-01,24,115611,3,
1,2014-01-01,24,115611,2,False
2,2014-01-02,24,115611,5,True
3,2014-01-02,24,103665,40,
4,2014-01-03,26,103665,1,
5,2014-01-03,1,115611,500,
6,2014-04-01,24,115611,99,
7,2014-01-05,24,96995,7,
";

    fn guayas() -> FxHashSet<i64> {
        [24, 26].into_iter().collect()
    }

    fn loader<'a>(stores: &'a FxHashSet<i64>, sampling: &'a SamplingPolicy) -> TransactionLoader<'a> {
        TransactionLoader {
            cutoff: d(2014, 4, 1),
            store_ids: stores,
            sampling,
            chunk_size: 3,
        }
    }

    #[test]
    fn read_chunks_respects_chunk_size() {
        let sizes: Vec<usize> = read_chunks(TRAIN_CSV.as_bytes(), 3)
            .map(|c| c.unwrap().len())
            .collect();
        assert_eq!(sizes, vec![3, 3, 2]);
    }

    #[test]
    fn read_chunks_parses_optional_promotion() {
        let rows: Vec<RawTransaction> = read_chunks(TRAIN_CSV.as_bytes(), 100)
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(rows[0].onpromotion, None);
        assert_eq!(rows[1].onpromotion, Some(false));
        assert_eq!(rows[2].onpromotion, Some(true));
    }

    #[test]
    fn read_chunks_stops_after_parse_error() {
        let csv = "date,store_nbr,item_nbr,unit_sales\n2014-01-01,1,2,x\n2014-01-02,1,2,3\n";
        let results: Vec<_> = read_chunks(csv.as_bytes(), 10).collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[test]
    fn top_pairs_ranks_by_volume_within_scope() {
        let stores = guayas();
        let sampling = SamplingPolicy::TopN { n: 2 };
        let pairs = loader(&stores, &sampling)
            .top_pairs(TRAIN_CSV.as_bytes(), 2)
            .unwrap();
        // Store 1 is outside the region; the 2014-04-01 row is past the cutoff.
        assert_eq!(pairs, vec![(24, 103_665), (24, 115_611)]);
    }

    #[test]
    fn top_n_load_keeps_only_selected_pairs() {
        let stores = guayas();
        let sampling = SamplingPolicy::TopN { n: 1 };
        let table = loader(&stores, &sampling)
            .load_with(|| Ok(TRAIN_CSV.as_bytes()))
            .unwrap();
        assert_eq!(table.pairs().unwrap(), vec![(24, 103_665)]);
    }

    #[test]
    fn allow_list_load_sums_duplicates_and_drops_cutoff() {
        let stores = guayas();
        let sampling = SamplingPolicy::AllowList {
            pairs: vec![(24, 115_611)],
        };
        let table = loader(&stores, &sampling)
            .load_with(|| Ok(TRAIN_CSV.as_bytes()))
            .unwrap();
        let series = table.series(24, 115_611, None).unwrap();
        assert_eq!(
            series,
            vec![
                DailySale { date: d(2014, 1, 1), unit_sales: 5.0 },
                DailySale { date: d(2014, 1, 2), unit_sales: 5.0 },
            ]
        );
    }

    #[test]
    fn chunk_size_does_not_change_result() {
        let stores = guayas();
        let sampling = SamplingPolicy::TopN { n: 10 };
        let mut small = loader(&stores, &sampling);
        small.chunk_size = 1;
        let mut large = loader(&stores, &sampling);
        large.chunk_size = 1_000;

        let a = small.load_with(|| Ok(TRAIN_CSV.as_bytes())).unwrap();
        let b = large.load_with(|| Ok(TRAIN_CSV.as_bytes())).unwrap();
        assert!(a.frame().equals(b.frame()));
    }

    #[test]
    fn load_with_no_surviving_rows_is_empty() {
        let stores: FxHashSet<i64> = [99].into_iter().collect();
        let sampling = SamplingPolicy::TopN { n: 5 };
        let table = loader(&stores, &sampling)
            .load_with(|| Ok(TRAIN_CSV.as_bytes()))
            .unwrap();
        assert!(table.is_empty());
        assert!(table.date_range().unwrap().is_none());
        assert!(table.series(24, 115_611, None).unwrap().is_empty());
    }

    #[test]
    fn aggregate_daily_is_idempotent() {
        let rows: Vec<RawTransaction> = read_chunks(TRAIN_CSV.as_bytes(), 100)
            .next()
            .unwrap()
            .unwrap();
        let once = aggregate_daily(&rows_to_frame(&rows).unwrap()).unwrap();
        let twice = aggregate_daily(&once).unwrap();
        assert_eq!(once.height(), 7);
        assert!(once.equals(&twice));
    }

    #[test]
    fn aggregate_daily_ors_promotion_flag() {
        let rows: Vec<RawTransaction> = read_chunks(TRAIN_CSV.as_bytes(), 100)
            .next()
            .unwrap()
            .unwrap();
        let table = TransactionTable::from_rows(&rows[..3]).unwrap();
        let promo = table.frame().column(PROMO_COL).unwrap().bool().unwrap();
        let values: Vec<Option<bool>> = promo.into_iter().collect();
        assert_eq!(values, vec![Some(false), Some(true)]);
    }

    #[test]
    fn series_before_excludes_start_date() {
        let rows: Vec<RawTransaction> = read_chunks(TRAIN_CSV.as_bytes(), 100)
            .next()
            .unwrap()
            .unwrap();
        let table = TransactionTable::from_rows(&rows).unwrap();
        let series = table.series(24, 115_611, Some(d(2014, 1, 2))).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].date, d(2014, 1, 1));
    }

    #[test]
    fn actuals_window_is_half_open() {
        let rows: Vec<RawTransaction> = read_chunks(TRAIN_CSV.as_bytes(), 100)
            .next()
            .unwrap()
            .unwrap();
        let table = TransactionTable::from_rows(&rows).unwrap();
        let actuals = table.actuals(24, 115_611, d(2014, 1, 1), 1).unwrap();
        assert_eq!(actuals.len(), 1);
        assert!((actuals[0].unit_sales - 5.0).abs() < 1e-9);
    }

    #[test]
    fn items_for_store_includes_up_to_date() {
        let rows: Vec<RawTransaction> = read_chunks(TRAIN_CSV.as_bytes(), 100)
            .next()
            .unwrap()
            .unwrap();
        let table = TransactionTable::from_rows(&rows).unwrap();
        assert_eq!(
            table.items_for_store(24, d(2014, 1, 2)).unwrap(),
            vec![103_665, 115_611]
        );
        assert_eq!(table.items_for_store(24, d(2013, 12, 31)).unwrap(), Vec::<i64>::new());
    }

    #[test]
    fn date_range_spans_table() {
        let rows: Vec<RawTransaction> = read_chunks(TRAIN_CSV.as_bytes(), 100)
            .next()
            .unwrap()
            .unwrap();
        let table = TransactionTable::from_rows(&rows).unwrap();
        assert_eq!(
            table.date_range().unwrap(),
            Some((d(2014, 1, 1), d(2014, 4, 1)))
        );
    }

    #[test]
    fn reindex_daily_fills_gaps() {
        let series = vec![
            DailySale { date: d(2014, 1, 1), unit_sales: 3.0 },
            DailySale { date: d(2014, 1, 4), unit_sales: 6.0 },
        ];
        let dense = reindex_daily(&series, d(2014, 1, 1), d(2014, 1, 5), 0.0);
        let values: Vec<f64> = dense.iter().map(|s| s.unit_sales).collect();
        assert_eq!(values, vec![3.0, 0.0, 0.0, 6.0, 0.0]);
        assert_eq!(dense[4].date, d(2014, 1, 5));
    }

    #[test]
    fn reindex_daily_ignores_out_of_range_entries() {
        let series = vec![
            DailySale { date: d(2013, 12, 30), unit_sales: 9.0 },
            DailySale { date: d(2014, 1, 2), unit_sales: 2.0 },
            DailySale { date: d(2014, 1, 9), unit_sales: 9.0 },
        ];
        let dense = reindex_daily(&series, d(2014, 1, 1), d(2014, 1, 3), 0.0);
        let values: Vec<f64> = dense.iter().map(|s| s.unit_sales).collect();
        assert_eq!(values, vec![0.0, 2.0, 0.0]);
    }
}
