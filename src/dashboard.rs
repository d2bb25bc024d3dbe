// 🧮 Dashboard state
// Holds the session snapshot plus form and hierarchy selections, and derives
// every view from them on demand. Rendering lives in the TUI.

use std::collections::BTreeSet;

use crate::aggregate::{
    aggregate_by_day, aggregate_by_dimension, aggregate_by_level, aggregate_by_month,
    monthly_by_dimension,
    summarize, DailyTotal, DimensionTotal, MonthlySeries, MonthlyTotal, Summary,
};
use crate::filter::{distinct_commerces, RangeFilter};
use crate::hierarchy::{resolve, HierarchySelection, HierarchyView, Level};
use crate::snapshot::Collection;

/// "Visão Geral" page content.
#[derive(Debug, Clone, PartialEq)]
pub struct Overview {
    pub summary: Summary,
    pub by_commerce: Vec<DimensionTotal>,
    pub monthly: Vec<MonthlyTotal>,
    pub history: Vec<MonthlySeries>,
}

/// "Visão Detalhada" page content.
#[derive(Debug, Clone, PartialEq)]
pub struct Detail {
    pub summary: Summary,
    pub daily: Vec<DailyTotal>,
    /// Totals per code one level below the deepest selection (sections when
    /// nothing is selected). `None` once a subclass is selected.
    pub breakdown: Option<(Level, Vec<DimensionTotal>)>,
}

pub struct Dashboard {
    snapshot: Vec<Collection>,
    commerce_options: Vec<String>,
    filter: RangeFilter,
    filtered: Vec<Collection>,
    selection: HierarchySelection,
    view: HierarchyView,
}

impl Dashboard {
    /// Start a session. Commerce options come from the whole snapshot.
    pub fn new(snapshot: Vec<Collection>, filter: RangeFilter) -> Self {
        let commerce_options = distinct_commerces(&snapshot);
        let mut dashboard = Self {
            snapshot,
            commerce_options,
            filter: filter.clone(),
            filtered: Vec::new(),
            selection: HierarchySelection::new(),
            view: HierarchyView::default(),
        };
        dashboard.apply_filter(filter);
        dashboard
    }

    /// Submit the form: re-filter the snapshot and reset the hierarchy.
    pub fn apply_filter(&mut self, filter: RangeFilter) {
        self.filtered = filter.apply(&self.snapshot);
        self.filter = filter;
        self.selection.clear();
        self.recompute();
    }

    /// Change one hierarchy level; deeper levels fall back to "All".
    pub fn select(&mut self, level: Level, code: Option<String>) {
        self.selection.select(level, code);
        self.recompute();
    }

    fn recompute(&mut self) {
        self.view = resolve(&self.filtered, &self.selection);
    }

    pub fn snapshot(&self) -> &[Collection] {
        &self.snapshot
    }

    pub fn filtered(&self) -> &[Collection] {
        &self.filtered
    }

    pub fn filter(&self) -> &RangeFilter {
        &self.filter
    }

    pub fn commerce_options(&self) -> &[String] {
        &self.commerce_options
    }

    pub fn selection(&self) -> &HierarchySelection {
        &self.selection
    }

    pub fn view(&self) -> &HierarchyView {
        &self.view
    }

    pub fn overview(&self) -> Overview {
        Overview {
            summary: summarize(&self.filtered),
            by_commerce: aggregate_by_dimension(&self.filtered),
            monthly: aggregate_by_month(&self.filtered),
            history: monthly_by_dimension(&self.filtered),
        }
    }

    /// Narrowed by the hierarchy and grouped by day.
    pub fn detail(&self) -> Detail {
        let records = &self.view.records;
        let breakdown_level = match self.selection.deepest() {
            Some((level, _)) => level.child(),
            None => Some(Level::Section),
        };

        Detail {
            summary: summarize(records),
            daily: aggregate_by_day(records),
            breakdown: breakdown_level.map(|level| (level, aggregate_by_level(records, level))),
        }
    }
}

/// Default form selection: every commerce type present.
pub fn all_commerces(dashboard: &Dashboard) -> BTreeSet<String> {
    dashboard.commerce_options().iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(id: i64, amount: f64, date: NaiveDate, commerce: &str, codes: [&str; 5]) -> Collection {
        Collection {
            id,
            amount,
            date,
            section: codes[0].to_string(),
            division: codes[1].to_string(),
            group: codes[2].to_string(),
            class: codes[3].to_string(),
            subclass: codes[4].to_string(),
            sector: "Primario".to_string(),
            commerce: commerce.to_string(),
        }
    }

    fn snapshot() -> Vec<Collection> {
        let a = ["A", "01", "011", "01113", "0111301"];
        let b = ["A", "02", "021", "02101", "0210101"];
        let c = ["C", "10", "101", "10112", "1011201"];
        vec![
            record(1, 100.0, day(2020, 1, 10), "Comércio", a),
            record(2, 200.0, day(2020, 1, 10), "Indústria", b),
            record(3, 300.0, day(2020, 2, 5), "Comércio", c),
            record(4, 400.0, day(2021, 5, 5), "Serviço", a),
        ]
    }

    fn year_2020() -> RangeFilter {
        RangeFilter::new(day(2020, 1, 1), day(2020, 12, 31))
    }

    #[test]
    fn test_overview_uses_filtered_records() {
        let dashboard = Dashboard::new(snapshot(), year_2020());
        let overview = dashboard.overview();

        assert_eq!(overview.summary.count, 3);
        assert_eq!(overview.summary.total, 600.0);
        assert_eq!(overview.by_commerce[0].label, "Comércio");
        assert_eq!(overview.by_commerce[0].total, 400.0);
        assert_eq!(overview.monthly.len(), 2);
        // Options still list commerce types outside the date range
        assert_eq!(dashboard.commerce_options().len(), 3);
    }

    #[test]
    fn test_detail_follows_hierarchy() {
        let mut dashboard = Dashboard::new(snapshot(), year_2020());
        dashboard.select(Level::Section, Some("A".to_string()));

        let detail = dashboard.detail();
        assert_eq!(detail.summary.count, 2);
        assert_eq!(detail.daily.len(), 1);
        assert_eq!(detail.daily[0].total, 300.0);

        dashboard.select(Level::Division, Some("02".to_string()));
        assert_eq!(dashboard.detail().summary.total, 200.0);
        assert_eq!(dashboard.view().options(Level::Group), ["021"]);
    }

    #[test]
    fn test_detail_breakdown_groups_by_next_level() {
        let mut dashboard = Dashboard::new(snapshot(), year_2020());

        let (level, totals) = dashboard.detail().breakdown.unwrap();
        assert_eq!(level, Level::Section);
        assert_eq!(totals[0].label, "A");
        assert_eq!(totals[0].total, 300.0);
        assert_eq!(totals[1].label, "C");

        dashboard.select(Level::Section, Some("A".to_string()));
        let (level, totals) = dashboard.detail().breakdown.unwrap();
        assert_eq!(level, Level::Division);
        let labels: Vec<&str> = totals.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, ["02", "01"]);

        // A selected subclass leaves only the daily grouping
        dashboard.select(Level::Division, Some("01".to_string()));
        dashboard.select(Level::Group, Some("011".to_string()));
        dashboard.select(Level::Class, Some("01113".to_string()));
        dashboard.select(Level::Subclass, Some("0111301".to_string()));
        let detail = dashboard.detail();
        assert!(detail.breakdown.is_none());
        assert_eq!(detail.daily.len(), 1);
        assert_eq!(detail.daily[0].total, 100.0);
    }

    #[test]
    fn test_applying_form_resets_hierarchy() {
        let mut dashboard = Dashboard::new(snapshot(), year_2020());
        dashboard.select(Level::Section, Some("C".to_string()));
        assert_eq!(dashboard.detail().summary.count, 1);

        let commerces = all_commerces(&dashboard);
        dashboard.apply_filter(year_2020().with_commerces(["Indústria"]));

        assert!(dashboard.selection().deepest().is_none());
        assert_eq!(dashboard.filtered().len(), 1);
        assert_eq!(dashboard.view().options(Level::Section), ["A"]);
        assert_eq!(commerces.len(), 3);
    }
}
