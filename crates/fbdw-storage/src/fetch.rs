use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info_span, Instrument};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("browser {action} failed for {url}: {message}")]
    Browser {
        action: &'static str,
        url: String,
        message: String,
    },
    #[error("browser task did not complete: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("browser session already closed")]
    Closed,
}

/// Anything that can turn a URL into page HTML.
///
/// `wait_for` is a CSS selector a rendering source waits on before reading the
/// page; sources that do not render ignore it.
#[async_trait]
pub trait PageSource: Send {
    fn name(&self) -> &'static str;

    async fn fetch_html(&mut self, url: &str, wait_for: Option<&str>) -> Result<String, FetchError>;

    async fn close(&mut self) -> Result<(), FetchError> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: None,
        }
    }
}

/// Plain HTTP page source. One attempt per URL.
#[derive(Debug, Clone)]
pub struct HttpPageSource {
    client: reqwest::Client,
}

impl HttpPageSource {
    pub fn new(config: &HttpClientConfig) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch_html(&mut self, url: &str, _wait_for: Option<&str>) -> Result<String, FetchError> {
        let span = info_span!("http_fetch", url);
        async {
            let resp = self.client.get(url).send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(FetchError::HttpStatus {
                    status: status.as_u16(),
                    url: resp.url().to_string(),
                });
            }
            let body = resp.text().await?;
            debug!(bytes = body.len(), "fetched page");
            Ok::<_, FetchError>(body)
        }
        .instrument(span)
        .await
    }
}

/// Pause between network fetches: uniform in `[min, max]`, or fixed when they are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoliteDelay {
    pub min: Duration,
    pub max: Duration,
}

impl PoliteDelay {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            min: delay,
            max: delay,
        }
    }

    pub fn between(min: Duration, max: Duration) -> Self {
        if max < min {
            Self { min: max, max: min }
        } else {
            Self { min, max }
        }
    }

    pub fn from_secs_f64(min: f64, max: f64) -> Self {
        let secs = |s: f64| Duration::from_secs_f64(if s.is_finite() { s.max(0.0) } else { 0.0 });
        Self::between(secs(min), secs(max))
    }

    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let lo = self.min.as_millis() as u64;
        let hi = self.max.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
    }

    pub async fn wait(&self) -> Duration {
        let delay = self.sample();
        if !delay.is_zero() {
            debug!(delay_ms = delay.as_millis() as u64, "polite delay");
            tokio::time::sleep(delay).await;
        }
        delay
    }
}
