//! ETL drivers: season scrape, player enrichment, CSV cleaning, bronze loads,
//! reference mappings, silver conformers and fix-ups.

pub mod catalog;
pub mod clean;
pub mod config;
pub mod enrich;
pub mod load;
pub mod reference;
pub mod scrape;
pub mod silver;
pub mod sources;
pub mod summary;
pub mod warehouse;

pub use catalog::{bronze_catalog, bronze_dataset, DatasetSpec, DATASET_NAMES};
pub use clean::{clean_match_details, clean_odds};
pub use config::{ConfigError, EtlConfig, PageSourceKind};
pub use enrich::enrich_players;
pub use load::{load_bronze, load_mappings};
pub use reference::{ReferenceKind, ReferenceTable};
pub use scrape::scrape_seasons;
pub use silver::{conform_all, conform_matches, conform_player_stats, conform_team_details, run_fixups};
pub use sources::open_page_source;
pub use summary::{RunSummary, Stage, UnitOutcome};
pub use warehouse::memory::MemoryWarehouse;
pub use warehouse::postgres::PgWarehouse;
pub use warehouse::{LoadError, LoadMode, TableRef, Warehouse};

pub const CRATE_NAME: &str = "fbdw-pipeline";
