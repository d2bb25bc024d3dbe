// 🌳 Cascading hierarchy filter
// Section → Division → Group → Class → Subclass, one optional selection per
// level. Options for each level are recomputed from the snapshot every time.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};

use crate::fmt::capitalize;
use crate::snapshot::Collection;

// ============================================================================
// LEVELS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Level {
    Section,
    Division,
    Group,
    Class,
    Subclass,
}

impl Level {
    pub const ALL: [Level; 5] = [
        Level::Section,
        Level::Division,
        Level::Group,
        Level::Class,
        Level::Subclass,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Level> {
        Level::ALL.get(index).copied()
    }

    pub fn child(self) -> Option<Level> {
        Level::from_index(self.index() + 1)
    }

    pub fn parent(self) -> Option<Level> {
        self.index().checked_sub(1).and_then(Level::from_index)
    }

    /// Display name used in selectors and the active-filter label
    pub fn name(self) -> &'static str {
        match self {
            Level::Section => "Seção",
            Level::Division => "Divisão",
            Level::Group => "Grupo",
            Level::Class => "Classe",
            Level::Subclass => "Subclasse",
        }
    }

    /// API endpoint holding this level's descriptions
    pub fn endpoint(self) -> &'static str {
        match self {
            Level::Section => "secao",
            Level::Division => "divisao",
            Level::Group => "grupo",
            Level::Class => "classe",
            Level::Subclass => "subclasse",
        }
    }
}

/// Label shown for an unconstrained level.
pub const ALL_LABEL: &str = "Todas";

pub const NO_FILTER_LABEL: &str = "Nenhum filtro aplicado, exibindo todos os dados";

// ============================================================================
// SELECTION STATE
// ============================================================================

/// Current selection at each level; `None` means "All".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HierarchySelection {
    levels: [Option<String>; 5],
}

impl HierarchySelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, level: Level) -> Option<&str> {
        self.levels[level.index()].as_deref()
    }

    /// Set `level` to `code` (or "All") and reset every deeper level.
    pub fn select(&mut self, level: Level, code: Option<String>) {
        self.levels[level.index()] = code;
        for deeper in &mut self.levels[level.index() + 1..] {
            *deeper = None;
        }
    }

    pub fn clear(&mut self) {
        self.levels = Default::default();
    }

    /// Deepest level holding a concrete selection.
    pub fn deepest(&self) -> Option<(Level, &str)> {
        Level::ALL
            .iter()
            .rev()
            .find_map(|&level| self.get(level).map(|code| (level, code)))
    }
}

/// Everything the detail page needs, derived from (snapshot, selection).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HierarchyView {
    /// Distinct codes offered at each level, sorted
    pub options: [Vec<String>; 5],
    /// Whether a level's selector accepts input
    pub enabled: [bool; 5],
    /// Records matching every concrete selection
    pub records: Vec<Collection>,
    /// Deepest concrete selection
    pub active: Option<(Level, String)>,
}

impl HierarchyView {
    pub fn options(&self, level: Level) -> &[String] {
        &self.options[level.index()]
    }

    pub fn is_enabled(&self, level: Level) -> bool {
        self.enabled[level.index()]
    }
}

/// Recompute options, narrowed records and the active level.
///
/// A level is open when its parent holds a concrete selection, or when the
/// parent is "All" and the grandparent is concrete (or absent). Options for a
/// level come from the records matching every concrete selection above it.
pub fn resolve(records: &[Collection], selection: &HierarchySelection) -> HierarchyView {
    let mut view = HierarchyView::default();
    let mut narrowed: Vec<&Collection> = records.iter().collect();

    for level in Level::ALL {
        let k = level.index();
        let open = k <= 1
            || selection.levels[k - 1].is_some()
            || selection.levels[k - 2].is_some();

        view.enabled[k] = open;
        if open {
            view.options[k] = distinct_codes(narrowed.iter().copied(), level);
        }

        if let Some(code) = selection.get(level) {
            narrowed.retain(|record| record.code(level) == code);
        }
    }

    view.records = narrowed.into_iter().cloned().collect();
    view.active = selection
        .deepest()
        .map(|(level, code)| (level, code.to_string()));
    view
}

fn distinct_codes<'a>(records: impl Iterator<Item = &'a Collection>, level: Level) -> Vec<String> {
    records
        .map(|record| record.code(level).to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

// ============================================================================
// DESCRIPTIVE LOOKUPS
// ============================================================================

/// Resolves a classification code to its human description.
///
/// `None` means the lookup failed or found nothing; callers fall back to the
/// raw code.
pub trait DescriptionLookup {
    fn describe(&self, level: Level, code: &str) -> Option<String>;
}

/// Session-scoped memo in front of another lookup, keyed by (level, code).
/// Failed lookups are remembered too, so a missing code costs one call.
pub struct CachedLookup<L> {
    inner: L,
    cache: RefCell<HashMap<(Level, String), Option<String>>>,
}

impl<L: DescriptionLookup> CachedLookup<L> {
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn cached_len(&self) -> usize {
        self.cache.borrow().len()
    }
}

impl<L: DescriptionLookup> DescriptionLookup for CachedLookup<L> {
    fn describe(&self, level: Level, code: &str) -> Option<String> {
        let key = (level, code.to_string());
        if let Some(hit) = self.cache.borrow().get(&key) {
            return hit.clone();
        }

        let described = self.inner.describe(level, code);
        self.cache.borrow_mut().insert(key, described.clone());
        described
    }
}

/// Capitalized description for `code`, or the code itself when unknown.
pub fn display_name(lookup: &dyn DescriptionLookup, level: Level, code: &str) -> String {
    match lookup.describe(level, code) {
        Some(description) => capitalize(&description),
        None => code.to_string(),
    }
}

/// Human-readable description of the deepest active selection.
pub fn active_filter_label(active: Option<(Level, &str)>, lookup: &dyn DescriptionLookup) -> String {
    match active {
        Some((level, code)) => format!(
            "Filtrado por {}: {}",
            level.name(),
            display_name(lookup, level, code)
        ),
        None => NO_FILTER_LABEL.to_string(),
    }
}
