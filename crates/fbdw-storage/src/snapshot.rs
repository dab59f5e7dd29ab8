//! Raw page snapshots, `{root}/{YYYYMMDD_HHMMSS}/{site}/{sha256}.html`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

#[derive(Debug, Error)]
#[error("{action} {path}: {source}")]
pub struct SnapshotError {
    action: &'static str,
    path: PathBuf,
    #[source]
    source: std::io::Error,
}

fn io_error<'a>(action: &'static str, path: &'a Path) -> impl FnOnce(std::io::Error) -> SnapshotError + 'a {
    move |source| SnapshotError {
        action,
        path: path.to_path_buf(),
        source,
    }
}

pub fn page_hash(html: &str) -> String {
    hex::encode(Sha256::digest(html.as_bytes()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPage {
    /// Path below the store root.
    pub relative_path: PathBuf,
    /// The same page had already been stored for this timestamp and site.
    pub deduplicated: bool,
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn page_path(fetched_at: DateTime<Utc>, site: &str, hash: &str) -> PathBuf {
        [fetched_at.format("%Y%m%d_%H%M%S").to_string(), site.to_string(), format!("{hash}.html")]
            .iter()
            .collect()
    }

    /// Writes the page through a temp file renamed into place.
    pub async fn store_html(
        &self,
        fetched_at: DateTime<Utc>,
        site: &str,
        html: &str,
    ) -> Result<StoredPage, SnapshotError> {
        let relative_path = Self::page_path(fetched_at, site, &page_hash(html));
        let target = self.root.join(&relative_path);
        let dir = target.parent().unwrap_or(&self.root).to_path_buf();
        fs::create_dir_all(&dir).await.map_err(io_error("creating", &dir))?;

        if fs::try_exists(&target).await.map_err(io_error("checking", &target))? {
            return Ok(StoredPage {
                relative_path,
                deduplicated: true,
            });
        }

        let temp = dir.join(format!(".{}.tmp", Uuid::new_v4()));
        fs::write(&temp, html).await.map_err(io_error("writing", &temp))?;
        let renamed = fs::rename(&temp, &target).await;
        if renamed.is_err() {
            let _ = fs::remove_file(&temp).await;
        }
        match renamed {
            Ok(()) => Ok(StoredPage {
                relative_path,
                deduplicated: false,
            }),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(StoredPage {
                relative_path,
                deduplicated: true,
            }),
            Err(err) => Err(io_error("renaming into", &target)(err)),
        }
    }
}
