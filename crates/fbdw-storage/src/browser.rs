use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use tokio::task::spawn_blocking;
use tracing::{debug, info, info_span, Instrument};

use crate::fetch::{FetchError, PageSource};

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub headless: bool,
    pub user_agent: Option<String>,
    pub page_timeout: Duration,
    /// XPath of a cookie-consent button, clicked once if it shows up.
    pub cookie_consent_xpath: Option<String>,
    pub consent_timeout: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            user_agent: None,
            page_timeout: Duration::from_secs(30),
            cookie_consent_xpath: None,
            consent_timeout: Duration::from_secs(5),
        }
    }
}

/// One headless Chrome tab, driven serially.
///
/// Dropping the session terminates the browser process, so it is closed on
/// every exit path even when [`PageSource::close`] is never reached.
pub struct BrowserSession {
    browser: Option<Browser>,
    tab: Arc<Tab>,
    config: BrowserConfig,
    consent_handled: bool,
}

fn browser_error<'a>(action: &'static str, url: &'a str) -> impl FnOnce(anyhow::Error) -> FetchError + 'a {
    move |err| FetchError::Browser {
        action,
        url: url.to_string(),
        message: format!("{err:#}"),
    }
}

impl BrowserSession {
    pub async fn launch(config: BrowserConfig) -> Result<Self, FetchError> {
        let headless = config.headless;
        let timeout = config.page_timeout;
        let user_agent = config.user_agent.clone();

        let (browser, tab) = spawn_blocking(move || -> anyhow::Result<(Browser, Arc<Tab>)> {
            let browser = Browser::new(LaunchOptions {
                args: vec![OsStr::new("--disable-blink-features=AutomationControlled")],
                headless,
                ..LaunchOptions::default()
            })?;
            let tab = browser.new_tab()?;
            tab.set_default_timeout(timeout);
            if let Some(user_agent) = user_agent.as_deref() {
                tab.set_user_agent(user_agent, None, None)?;
            }
            Ok((browser, tab))
        })
        .await?
        .map_err(browser_error("launch", "about:blank"))?;

        info!(headless, "browser session started");
        Ok(Self {
            browser: Some(browser),
            tab,
            config,
            consent_handled: false,
        })
    }
}

#[async_trait]
impl PageSource for BrowserSession {
    fn name(&self) -> &'static str {
        "browser"
    }

    async fn fetch_html(&mut self, url: &str, wait_for: Option<&str>) -> Result<String, FetchError> {
        if self.browser.is_none() {
            return Err(FetchError::Closed);
        }

        let tab = Arc::clone(&self.tab);
        let target = url.to_string();
        let selector = wait_for.map(str::to_string);
        let consent = if self.consent_handled {
            None
        } else {
            self.config.cookie_consent_xpath.clone()
        };
        let consent_timeout = self.config.consent_timeout;

        let span = info_span!("browser_fetch", url);
        let html = spawn_blocking(move || -> anyhow::Result<String> {
            tab.navigate_to(&target)?;
            tab.wait_until_navigated()?;
            if let Some(xpath) = consent.as_deref() {
                match tab.wait_for_xpath_with_custom_timeout(xpath, consent_timeout) {
                    Ok(button) => {
                        if let Err(err) = button.click() {
                            debug!(error = %err, "cookie consent click failed");
                        }
                    }
                    Err(_) => debug!("no cookie consent prompt"),
                }
            }
            if let Some(selector) = selector.as_deref() {
                tab.wait_for_element(selector)?;
            }
            tab.get_content()
        })
        .instrument(span)
        .await?
        .map_err(browser_error("navigation", url))?;

        self.consent_handled = true;
        debug!(bytes = html.len(), "rendered page");
        Ok(html)
    }

    async fn close(&mut self) -> Result<(), FetchError> {
        let Some(browser) = self.browser.take() else {
            return Ok(());
        };
        let tab = Arc::clone(&self.tab);
        spawn_blocking(move || {
            if let Err(err) = tab.close(true) {
                debug!(error = %err, "tab close failed");
            }
            drop(browser);
        })
        .await?;
        info!("browser session closed");
        Ok(())
    }
}
