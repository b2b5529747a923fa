//! Leakage-free trailing window and the lag / rolling statistics derived from it.

use chrono::NaiveDate;
use statrs::statistics::Statistics;

use crate::data::transactions::{offset_date, reindex_daily};
use crate::engine::types::DailySale;
use crate::error::Result;

/// Days of history read before the forecast start.
pub const WINDOW_DAYS: usize = 30;
/// Width of the rolling mean / std and the percent-change period.
pub const ROLLING_DAYS: usize = 7;
/// Lag offsets, in days, emitted as `lag_{k}` columns.
pub const LAGS: [usize; 4] = [1, 7, 14, 30];

/// Daily sales for the days immediately preceding a forecast start.
///
/// `values[j]` is the sales total on `start - values.len() + j`; the last
/// entry is always the day before `start`. Days without transactions are 0.
#[derive(Debug, Clone, PartialEq)]
pub struct TrailingWindow {
    start: NaiveDate,
    values: Vec<f64>,
}

impl TrailingWindow {
    /// Build the window from a pair's history.
    ///
    /// Only entries strictly before `start` are read. The window begins at the
    /// first observed date or `start - WINDOW_DAYS`, whichever is later.
    /// Returns `None` when no entry precedes `start`.
    pub fn from_history(history: &[DailySale], start: NaiveDate) -> Result<Option<Self>> {
        let Some(first) = history.iter().map(|s| s.date).filter(|d| *d < start).min() else {
            return Ok(None);
        };
        let earliest = offset_date(start, -(WINDOW_DAYS as i64))?;
        let end = offset_date(start, -1)?;
        let past: Vec<DailySale> = history.iter().copied().filter(|s| s.date < start).collect();
        let dense = reindex_daily(&past, first.max(earliest), end, 0.0);
        Ok(Some(Self {
            start,
            values: dense.into_iter().map(|s| s.unit_sales).collect(),
        }))
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn oldest(&self) -> f64 {
        self.values.first().copied().unwrap_or(0.0)
    }

    pub fn newest(&self) -> f64 {
        self.values.last().copied().unwrap_or(0.0)
    }

    /// Value `k` days before horizon day `offset` (day 0 is `start`).
    ///
    /// Dates before the window take the oldest value; dates at or after
    /// `start` are unknown and take the newest value.
    pub fn lag(&self, offset: usize, k: usize) -> f64 {
        let relative = offset as i64 - k as i64;
        if relative >= 0 {
            return self.newest();
        }
        let index = self.values.len() as i64 + relative;
        if index < 0 {
            self.oldest()
        } else {
            self.values[index as usize]
        }
    }

    /// Lag-k values for each of `horizon` days.
    pub fn lag_series(&self, k: usize, horizon: usize) -> Vec<f64> {
        (0..horizon).map(|offset| self.lag(offset, k)).collect()
    }

    /// Rolling mean at the end of the window.
    pub fn rolling_mean(&self) -> f64 {
        last_rolling(&self.values, ROLLING_DAYS, mean)
    }

    /// Rolling sample standard deviation at the end of the window.
    pub fn rolling_std(&self) -> f64 {
        last_rolling(&self.values, ROLLING_DAYS, sample_std)
    }

    /// Percent change over `ROLLING_DAYS` at the end of the window.
    pub fn pct_change(&self) -> f64 {
        pct_change(&self.values, ROLLING_DAYS)
            .last()
            .copied()
            .unwrap_or(0.0)
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().mean()
}

/// Sample standard deviation; 0 for fewer than two values.
fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    values.iter().std_dev()
}

/// `stat` over each full trailing window of width `window`; `None` until warmed up.
pub fn rolling(values: &[f64], window: usize, stat: impl Fn(&[f64]) -> f64) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if window == 0 || i + 1 < window {
                None
            } else {
                Some(stat(&values[i + 1 - window..=i]))
            }
        })
        .collect()
}

/// Replace each `None` with the next valid value after it.
pub fn backfill(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut out = values.to_vec();
    let mut next = None;
    for slot in out.iter_mut().rev() {
        match slot {
            Some(v) => next = Some(*v),
            None => *slot = next,
        }
    }
    out
}

/// Extend `values` to `len` by repeating the last element.
pub fn edge_pad(values: &[f64], len: usize) -> Vec<f64> {
    let mut out = values.to_vec();
    if let Some(&last) = values.last() {
        out.resize(len.max(values.len()), last);
    }
    out
}

/// `values[i] / values[i - periods] - 1`; 0 where undefined or non-finite.
pub fn pct_change(values: &[f64], periods: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            if periods == 0 || i < periods {
                return 0.0;
            }
            let change = values[i] / values[i - periods] - 1.0;
            if change.is_finite() {
                change
            } else {
                0.0
            }
        })
        .collect()
}

/// Last backfilled rolling value, or `stat` over everything when the window never fills.
fn last_rolling(values: &[f64], window: usize, stat: impl Fn(&[f64]) -> f64 + Copy) -> f64 {
    backfill(&rolling(values, window, stat))
        .last()
        .copied()
        .flatten()
        .unwrap_or_else(|| if values.is_empty() { 0.0 } else { stat(values) })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn history(start: NaiveDate, values: &[f64]) -> Vec<DailySale> {
        let n = values.len() as i64;
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| DailySale {
                date: offset_date(start, i as i64 - n).unwrap(),
                unit_sales: v,
            })
            .collect()
    }

    #[test]
    fn empty_history_has_no_window() {
        assert!(TrailingWindow::from_history(&[], d(2014, 3, 1)).unwrap().is_none());
    }

    #[test]
    fn history_on_or_after_start_is_ignored() {
        let start = d(2014, 3, 1);
        let future = vec![DailySale { date: start, unit_sales: 9.0 }];
        assert!(TrailingWindow::from_history(&future, start).unwrap().is_none());
    }

    #[test]
    fn seven_day_scenario() {
        let start = d(2014, 3, 1);
        let window = TrailingWindow::from_history(&history(start, &[3.0, 5.0, 2.0, 4.0, 6.0, 1.0, 7.0]), start)
            .unwrap()
            .unwrap();
        assert_eq!(window.values().len(), 7);
        assert_eq!(window.lag(0, 1), 7.0);
        assert!((window.rolling_mean() - 4.0).abs() < 1e-12);
        assert_eq!(window.pct_change(), 0.0);
    }

    #[test]
    fn window_is_capped_at_thirty_days() {
        let start = d(2014, 3, 1);
        let values: Vec<f64> = (1..=45).map(f64::from).collect();
        let window = TrailingWindow::from_history(&history(start, &values), start)
            .unwrap()
            .unwrap();
        assert_eq!(window.values().len(), WINDOW_DAYS);
        assert_eq!(window.oldest(), 16.0);
        assert_eq!(window.newest(), 45.0);
    }

    #[test]
    fn stale_history_is_gap_filled_up_to_start() {
        let start = d(2014, 3, 1);
        let old = vec![DailySale { date: d(2014, 2, 25), unit_sales: 4.0 }];
        let window = TrailingWindow::from_history(&old, start).unwrap().unwrap();
        assert_eq!(window.values(), &[4.0, 0.0, 0.0, 0.0]);
        assert_eq!(window.newest(), 0.0);
    }

    #[test]
    fn lag_reads_history_k_days_back() {
        let start = d(2014, 3, 1);
        let values: Vec<f64> = (1..=30).map(f64::from).collect();
        let window = TrailingWindow::from_history(&history(start, &values), start)
            .unwrap()
            .unwrap();
        // Day 0, lag 7 -> start - 7 -> value 24.
        assert_eq!(window.lag(0, 7), 24.0);
        // Day 3, lag 7 -> start - 4 -> value 27.
        assert_eq!(window.lag(3, 7), 27.0);
        // Day 0, lag 30 -> start - 30 -> oldest.
        assert_eq!(window.lag(0, 30), 1.0);
        // Day 7, lag 7 -> start itself -> unknown, newest.
        assert_eq!(window.lag(7, 7), 30.0);
    }

    #[test]
    fn lag_before_window_pads_with_oldest() {
        let start = d(2014, 3, 1);
        let window = TrailingWindow::from_history(&history(start, &[2.0, 4.0, 6.0]), start)
            .unwrap()
            .unwrap();
        assert_eq!(window.lag(0, 14), 2.0);
        assert_eq!(window.lag_series(1, 4), vec![6.0, 6.0, 6.0, 6.0]);
    }

    #[test]
    fn rolling_std_matches_sample_std_of_last_seven() {
        let start = d(2014, 3, 1);
        let values = [10.0, 10.0, 3.0, 5.0, 2.0, 4.0, 6.0, 1.0, 7.0];
        let window = TrailingWindow::from_history(&history(start, &values), start)
            .unwrap()
            .unwrap();
        let last7 = [3.0, 5.0, 2.0, 4.0, 6.0, 1.0, 7.0];
        let m = 4.0;
        let var: f64 = last7.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / 6.0;
        assert!((window.rolling_mean() - m).abs() < 1e-12);
        assert!((window.rolling_std() - var.sqrt()).abs() < 1e-12);
        // 7 / 10 - 1
        assert!((window.pct_change() - (-0.3)).abs() < 1e-12);
    }

    #[test]
    fn short_window_falls_back_to_available_values() {
        let start = d(2014, 3, 1);
        let window = TrailingWindow::from_history(&history(start, &[2.0, 4.0]), start)
            .unwrap()
            .unwrap();
        assert!((window.rolling_mean() - 3.0).abs() < 1e-12);
        assert!((window.rolling_std() - 2.0_f64.sqrt()).abs() < 1e-12);

        let single = TrailingWindow::from_history(&history(start, &[5.0]), start)
            .unwrap()
            .unwrap();
        assert_eq!(single.rolling_std(), 0.0);
    }

    #[test]
    fn rolling_is_none_until_warm() {
        let out = rolling(&[1.0, 2.0, 3.0, 4.0], 3, mean);
        assert_eq!(out, vec![None, None, Some(2.0), Some(3.0)]);
    }

    #[test]
    fn backfill_uses_next_valid_value() {
        let out = backfill(&[None, None, Some(2.0), None, Some(3.0), None]);
        assert_eq!(out, vec![Some(2.0), Some(2.0), Some(2.0), Some(3.0), Some(3.0), None]);
    }

    #[test]
    fn edge_pad_repeats_last() {
        assert_eq!(edge_pad(&[1.0, 2.0], 4), vec![1.0, 2.0, 2.0, 2.0]);
        assert_eq!(edge_pad(&[1.0, 2.0], 1), vec![1.0, 2.0]);
        assert!(edge_pad(&[], 3).is_empty());
    }

    #[test]
    fn pct_change_zero_base_is_zero() {
        assert_eq!(pct_change(&[0.0, 5.0], 1), vec![0.0, 0.0]);
        assert_eq!(pct_change(&[2.0, 5.0], 1), vec![0.0, 1.5]);
    }
}
