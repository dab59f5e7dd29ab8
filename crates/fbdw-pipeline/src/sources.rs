use anyhow::{Context, Result};
use chrono::Utc;
use fbdw_storage::{BrowserSession, FetchError, HttpClientConfig, HttpPageSource, PageSource, PoliteDelay, SnapshotStore};
use tracing::{debug, warn};

use crate::config::{EtlConfig, PageSourceKind};

/// Opens the page source a job is configured for. The caller closes it.
pub async fn open_page_source(
    kind: PageSourceKind,
    config: &EtlConfig,
    http: &HttpClientConfig,
) -> Result<Box<dyn PageSource>> {
    Ok(match kind {
        PageSourceKind::Browser => Box::new(
            BrowserSession::launch(config.browser.to_browser_config())
                .await
                .context("launching headless browser")?,
        ),
        PageSourceKind::Http => Box::new(HttpPageSource::new(http).context("building http client")?),
    })
}

/// A page source plus the pause taken after every fetch and optional raw snapshots.
pub struct PoliteFetcher<'a> {
    source: &'a mut dyn PageSource,
    delay: PoliteDelay,
    wait_for: Option<String>,
    snapshots: Option<SnapshotStore>,
    site: &'static str,
}

impl<'a> PoliteFetcher<'a> {
    pub fn new(source: &'a mut dyn PageSource, site: &'static str, delay: PoliteDelay) -> Self {
        Self {
            source,
            delay,
            wait_for: None,
            snapshots: None,
            site,
        }
    }

    pub fn wait_for(mut self, selector: impl Into<String>) -> Self {
        self.wait_for = Some(selector.into());
        self
    }

    pub fn with_snapshots(mut self, snapshots: Option<SnapshotStore>) -> Self {
        self.snapshots = snapshots;
        self
    }

    /// Fetches `url`, then sleeps whether or not the fetch worked.
    pub async fn fetch(&mut self, url: &str) -> Result<String, FetchError> {
        let fetched = self.source.fetch_html(url, self.wait_for.as_deref()).await;
        self.delay.wait().await;
        let html = fetched?;

        if let Some(store) = &self.snapshots {
            match store.store_html(Utc::now(), self.site, &html).await {
                Ok(stored) => debug!(
                    url,
                    path = %stored.relative_path.display(),
                    deduplicated = stored.deduplicated,
                    "stored page snapshot"
                ),
                Err(err) => warn!(url, error = %err, "could not store page snapshot"),
            }
        }
        Ok(html)
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use fbdw_storage::{FetchError, PageSource};

    /// Serves canned pages; unknown URLs fail with a 404.
    #[derive(Debug, Default)]
    pub struct CannedPages {
        pages: HashMap<String, String>,
        pub requests: Vec<String>,
    }

    impl CannedPages {
        pub fn with_page(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
            self.pages.insert(url.into(), html.into());
            self
        }
    }

    #[async_trait]
    impl PageSource for CannedPages {
        fn name(&self) -> &'static str {
            "canned"
        }

        async fn fetch_html(&mut self, url: &str, _wait_for: Option<&str>) -> Result<String, FetchError> {
            self.requests.push(url.to_string());
            self.pages.get(url).cloned().ok_or_else(|| FetchError::HttpStatus {
                status: 404,
                url: url.to_string(),
            })
        }
    }
}
