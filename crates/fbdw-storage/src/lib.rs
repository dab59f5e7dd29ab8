//! Page fetching, raw snapshot storage and intermediate file I/O for the football ETL.

pub mod browser;
pub mod fetch;
pub mod files;
pub mod snapshot;

pub use browser::{BrowserConfig, BrowserSession};
pub use fetch::{FetchError, HttpClientConfig, HttpPageSource, PageSource, PoliteDelay};
pub use files::{
    read_csv_records, read_csv_table, read_json_records, read_json_rows, write_csv_records,
    write_json_dump, FileError,
};
pub use snapshot::{page_hash, SnapshotError, SnapshotStore, StoredPage};

pub const CRATE_NAME: &str = "fbdw-storage";
