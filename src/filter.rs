// 🔎 Range & set filter
// Inclusive date range plus an optional commerce-type set over the snapshot.

use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::snapshot::Collection;

/// The dashboard's form values.
///
/// An empty `commerces` set means "no commerce filter", not "exclude all".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeFilter {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub commerces: BTreeSet<String>,
}

impl RangeFilter {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            commerces: BTreeSet::new(),
        }
    }

    pub fn with_commerces<I, S>(mut self, commerces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.commerces = commerces.into_iter().map(Into::into).collect();
        self
    }

    pub fn matches(&self, record: &Collection) -> bool {
        record.date >= self.start
            && record.date <= self.end
            && (self.commerces.is_empty() || self.commerces.contains(&record.commerce))
    }

    pub fn apply(&self, records: &[Collection]) -> Vec<Collection> {
        records.iter().filter(|r| self.matches(r)).cloned().collect()
    }
}

/// Records dated within [start, end] whose commerce type is selected.
pub fn filter_records(
    records: &[Collection],
    start: NaiveDate,
    end: NaiveDate,
    selected: &BTreeSet<String>,
) -> Vec<Collection> {
    RangeFilter {
        start,
        end,
        commerces: selected.clone(),
    }
    .apply(records)
}

/// Sorted distinct commerce types present in `records`.
pub fn distinct_commerces(records: &[Collection]) -> Vec<String> {
    records
        .iter()
        .map(|r| r.commerce.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(id: i64, date: NaiveDate, commerce: &str) -> Collection {
        Collection {
            id,
            amount: 10.0,
            date,
            section: "A".to_string(),
            division: "01".to_string(),
            group: "011".to_string(),
            class: "01113".to_string(),
            subclass: "0111301".to_string(),
            sector: "Primario".to_string(),
            commerce: commerce.to_string(),
        }
    }

    fn sample() -> Vec<Collection> {
        vec![
            record(1, day(2019, 12, 31), "Comércio"),
            record(2, day(2020, 1, 1), "Comércio"),
            record(3, day(2020, 6, 15), "Indústria"),
            record(4, day(2020, 12, 31), "Serviço"),
            record(5, day(2021, 1, 1), "Serviço"),
            record(6, day(2020, 7, 1), "Unknown"),
        ]
    }

    #[test]
    fn test_range_is_inclusive_on_both_ends() {
        let rows = filter_records(&sample(), day(2020, 1, 1), day(2020, 12, 31), &BTreeSet::new());
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 3, 4, 6]);
    }

    #[test]
    fn test_empty_selection_equals_full_selection() {
        let records = sample();
        let all: BTreeSet<String> = distinct_commerces(&records).into_iter().collect();

        let unfiltered = filter_records(&records, day(2019, 1, 1), day(2021, 12, 31), &BTreeSet::new());
        let full = filter_records(&records, day(2019, 1, 1), day(2021, 12, 31), &all);

        assert_eq!(unfiltered.len(), full.len());
        assert_eq!(unfiltered.len(), records.len());
    }

    #[test]
    fn test_commerce_selection_restricts() {
        let filter = RangeFilter::new(day(2020, 1, 1), day(2020, 12, 31))
            .with_commerces(["Serviço", "Unknown"]);
        let ids: Vec<i64> = filter.apply(&sample()).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![4, 6]);
    }

    #[test]
    fn test_inverted_range_matches_nothing() {
        let filter = RangeFilter::new(day(2020, 12, 31), day(2020, 1, 1));
        assert!(filter.apply(&sample()).is_empty());
    }

    #[test]
    fn test_distinct_commerces_sorted() {
        assert_eq!(
            distinct_commerces(&sample()),
            vec!["Comércio", "Indústria", "Serviço", "Unknown"]
        );
    }

    fn base() -> NaiveDate {
        day(2019, 1, 1)
    }

    fn arb_record() -> impl Strategy<Value = Collection> {
        (
            0i64..1_000,
            0i64..1_100,
            prop::sample::select(vec!["Comércio", "Indústria", "Serviço", "Unknown"]),
        )
            .prop_map(|(id, offset, commerce)| record(id, base() + Duration::days(offset), commerce))
    }

    proptest! {
        #[test]
        fn prop_empty_selection_equals_full_selection(
            records in prop::collection::vec(arb_record(), 0..60),
            a in 0i64..1_100,
            b in 0i64..1_100,
        ) {
            let start = base() + Duration::days(a.min(b));
            let end = base() + Duration::days(a.max(b));
            let all: BTreeSet<String> = distinct_commerces(&records).into_iter().collect();

            let unfiltered = filter_records(&records, start, end, &BTreeSet::new());
            let full = filter_records(&records, start, end, &all);
            prop_assert_eq!(&unfiltered, &full);
            prop_assert!(unfiltered.iter().all(|r| r.date >= start && r.date <= end));
        }
    }
}
