//! Site adapters: HTML table extraction, FBref season pages and Transfermarkt player profiles.

pub mod fbref;
pub mod table;
pub mod transfermarkt;

use thiserror::Error;

pub use fbref::{FbrefCompetition, SeasonPage, SeasonTable, SeasonTables};
pub use table::{extract_table, find_table, table_rows, TableHint, TableRows};
pub use transfermarkt::{PlayerInfo, PlayerInfoCache, Transfermarkt};

pub const CRATE_NAME: &str = "fbdw-adapters";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid url `{url}`: {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },
}
