// CNAE/ICMS - Core Library
// Exposes all modules for use in the dashboard, the importer, the API server and tests

pub mod error;
pub mod config;
pub mod schema;         // Shape Layer - entity declarations
pub mod db;             // Storage Layer - generic CRUD
pub mod import;         // CSV seeding
pub mod hierarchy;      // Cascading CNAE selection + description lookups
pub mod snapshot;       // Fact snapshot loading
pub mod filter;
pub mod aggregate;
pub mod dashboard;
pub mod fmt;

#[cfg(feature = "tui")]
pub mod client;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use error::{ConfigError, LoadError, StoreError, ValidationErrors};
pub use config::Config;
pub use db::{open_database, setup_database, Record};
pub use import::{import_csv, ImportSummary};
pub use hierarchy::{
    resolve, CachedLookup, DescriptionLookup, HierarchySelection, HierarchyView, Level,
};
pub use snapshot::{build_snapshot, load_snapshot, Collection, FactSource, RawCollection, Snapshot};
pub use filter::{filter_records, RangeFilter};
pub use aggregate::{
    aggregate_by_day, aggregate_by_dimension, aggregate_by_level, aggregate_by_month, Summary,
};
pub use dashboard::{Dashboard, Detail, Overview};
pub use fmt::format_metric;

#[cfg(feature = "tui")]
pub use client::ApiClient;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
