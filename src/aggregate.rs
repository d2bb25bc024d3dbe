// 📊 Aggregator
// Sum-of-amount with count, grouped by commerce type, hierarchy level,
// calendar month or day.

use std::collections::BTreeMap;

use chrono::{Datelike, Month, NaiveDate};
use serde::Serialize;

use crate::hierarchy::Level;
use crate::snapshot::Collection;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimensionTotal {
    pub label: String,
    pub total: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyTotal {
    /// Last day of the month, the bucket key
    pub month_end: NaiveDate,
    pub year: i32,
    pub month_name: &'static str,
    pub total: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTotal {
    pub date: NaiveDate,
    pub total: f64,
    pub count: usize,
}

/// Monthly totals of one commerce type, for the history chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySeries {
    pub label: String,
    pub points: Vec<MonthlyTotal>,
}

/// Totals per commerce type, sorted by descending sum.
/// Ties keep key order.
pub fn aggregate_by_dimension(records: &[Collection]) -> Vec<DimensionTotal> {
    totals_by_key(records, |r| r.commerce.as_str())
}

/// Totals per code at `level`, sorted like [`aggregate_by_dimension`].
pub fn aggregate_by_level(records: &[Collection], level: Level) -> Vec<DimensionTotal> {
    totals_by_key(records, |r| r.code(level))
}

fn totals_by_key<'a>(
    records: &'a [Collection],
    key: impl Fn(&'a Collection) -> &'a str,
) -> Vec<DimensionTotal> {
    let mut groups: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for record in records {
        let entry = groups.entry(key(record)).or_insert((0.0, 0));
        entry.0 += record.amount;
        entry.1 += 1;
    }

    let mut totals: Vec<DimensionTotal> = groups
        .into_iter()
        .map(|(label, (total, count))| DimensionTotal {
            label: label.to_string(),
            total,
            count,
        })
        .collect();

    // sort_by is stable
    totals.sort_by(|a, b| b.total.total_cmp(&a.total));
    totals
}

/// Totals per calendar month, ascending. Every month between the first and
/// last record is present, with zero totals where nothing was collected.
pub fn aggregate_by_month(records: &[Collection]) -> Vec<MonthlyTotal> {
    let mut groups: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for record in records {
        let entry = groups.entry(month_end(record.date)).or_insert((0.0, 0));
        entry.0 += record.amount;
        entry.1 += 1;
    }

    let (Some(&first), Some(&last)) = (groups.keys().next(), groups.keys().next_back()) else {
        return Vec::new();
    };

    let mut months = Vec::new();
    let mut cursor = Some(first);
    while let Some(month) = cursor.filter(|m| *m <= last) {
        let (total, count) = groups.get(&month).copied().unwrap_or((0.0, 0));
        months.push(monthly_total(month, total, count));
        cursor = next_month_end(month);
    }
    months
}

/// Totals per day, ascending.
pub fn aggregate_by_day(records: &[Collection]) -> Vec<DailyTotal> {
    let mut groups: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for record in records {
        let entry = groups.entry(record.date).or_insert((0.0, 0));
        entry.0 += record.amount;
        entry.1 += 1;
    }

    groups
        .into_iter()
        .map(|(date, (total, count))| DailyTotal { date, total, count })
        .collect()
}

/// Monthly totals split per commerce type. Only months with records appear.
pub fn monthly_by_dimension(records: &[Collection]) -> Vec<MonthlySeries> {
    let mut groups: BTreeMap<&str, BTreeMap<NaiveDate, (f64, usize)>> = BTreeMap::new();
    for record in records {
        let entry = groups
            .entry(record.commerce.as_str())
            .or_default()
            .entry(month_end(record.date))
            .or_insert((0.0, 0));
        entry.0 += record.amount;
        entry.1 += 1;
    }

    groups
        .into_iter()
        .map(|(label, months)| MonthlySeries {
            label: label.to_string(),
            points: months
                .into_iter()
                .map(|(month, (total, count))| monthly_total(month, total, count))
                .collect(),
        })
        .collect()
}

fn monthly_total(month_end: NaiveDate, total: f64, count: usize) -> MonthlyTotal {
    MonthlyTotal {
        month_end,
        year: month_end.year(),
        month_name: month_name(month_end.month()),
        total,
        count,
    }
}

/// Headline metrics for a record set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total: f64,
    /// Mean amount per record; `None` when there are no records
    pub mean: Option<f64>,
    /// Largest monthly total; `None` when there are no records
    pub best_month: Option<f64>,
    pub count: usize,
}

pub fn summarize(records: &[Collection]) -> Summary {
    let total: f64 = records.iter().map(|r| r.amount).sum();
    let count = records.len();
    let best_month = aggregate_by_month(records)
        .into_iter()
        .map(|m| m.total)
        .reduce(f64::max);

    Summary {
        total,
        mean: (count > 0).then(|| total / count as f64),
        best_month,
        count,
    }
}

// ============================================================================
// CALENDAR HELPERS
// ============================================================================

/// Last day of `date`'s month.
pub fn month_end(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .unwrap_or(date)
}

/// `None` past the last representable month.
fn next_month_end(current_end: NaiveDate) -> Option<NaiveDate> {
    current_end.succ_opt().map(month_end)
}

/// English month name ("January"), used for chart labels.
pub fn month_name(month: u32) -> &'static str {
    u8::try_from(month)
        .ok()
        .and_then(|m| Month::try_from(m).ok())
        .map(|m| m.name())
        .unwrap_or("")
}
