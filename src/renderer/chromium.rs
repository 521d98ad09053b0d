//! Headless Chrome/Chromium renderer driven over the DevTools protocol.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::element::Element;
use chromiumoxide::Page;
use futures_util::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{Container, Renderer, RendererError, WaitStrategy};
use crate::constants::HARVEST_USER_AGENT;

/// Default viewport width in pixels.
pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1280;

/// Default viewport height in pixels. Tall so each scroll reveals more posts.
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 1600;

/// Default CDP request timeout in seconds. Also bounds each navigation, so it
/// must be at least the navigation budget.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// How long the resource count must stay flat to count as network idle.
const NETWORK_IDLE_WINDOW_MS: u64 = 1000;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Browser launch options.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    /// Run without a visible window.
    pub headless: bool,
    /// Viewport width in pixels.
    pub viewport_width: u32,
    /// Viewport height in pixels.
    pub viewport_height: u32,
    /// Timeout for individual CDP requests, including `goto` and `evaluate`.
    pub request_timeout: Duration,
    /// Path to Chrome/Chromium executable (None for auto-detection).
    pub chrome_path: Option<String>,
    pub user_agent: String,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            viewport_width: DEFAULT_VIEWPORT_WIDTH,
            viewport_height: DEFAULT_VIEWPORT_HEIGHT,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            chrome_path: None,
            user_agent: HARVEST_USER_AGENT.to_string(),
        }
    }
}

/// One browser process with a single page.
///
/// The CDP event handler runs on its own task for the life of the session.
pub struct ChromiumRenderer {
    browser: Mutex<Option<Browser>>,
    page: Page,
    handler_task: JoinHandle<()>,
}

impl ChromiumRenderer {
    /// Launch the browser and open a blank page.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::Launch`] if the browser cannot be started.
    pub async fn launch(options: &BrowserOptions) -> Result<Self, RendererError> {
        info!(headless = options.headless, "Launching browser");

        let mut config_builder = BrowserConfig::builder()
            .window_size(options.viewport_width, options.viewport_height)
            .request_timeout(options.request_timeout)
            .no_sandbox()
            .disable_default_args()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-software-rasterizer")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-extensions")
            .arg("--disable-sync")
            .arg("--disable-translate")
            .arg("--mute-audio")
            .arg("--lang=en-US,en")
            .arg(format!("--user-agent={}", options.user_agent));

        config_builder = if options.headless {
            config_builder.arg("--headless=new")
        } else {
            config_builder.with_head()
        };

        if let Some(ref chrome_path) = options.chrome_path {
            config_builder = config_builder.chrome_executable(chrome_path);
        }

        let browser_config = config_builder
            .build()
            .map_err(|e| RendererError::Launch(format!("invalid browser config: {e}")))?;

        let (mut browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| RendererError::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {e}");
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                if let Err(close_err) = browser.close().await {
                    warn!("Failed to close browser after page creation error: {close_err}");
                }
                handler_task.abort();
                return Err(RendererError::Launch(format!("failed to open page: {e}")));
            }
        };

        info!("Browser ready");

        Ok(Self {
            browser: Mutex::new(Some(browser)),
            page,
            handler_task,
        })
    }

    /// Poll the resource timing buffer until it stops growing.
    ///
    /// Returns `false` if the page was still busy when `budget` ran out.
    async fn wait_for_network_idle(&self, budget: Duration) -> Result<bool, RendererError> {
        let timeout_ms = u64::try_from(budget.as_millis()).unwrap_or(u64::MAX);
        let js = format!(
            r"(async () => {{
                const timeoutMs = {timeout_ms};
                const idleMs = {NETWORK_IDLE_WINDOW_MS};
                const interval = 250;
                const start = Date.now();
                let lastCount = 0;
                let stableMs = 0;
                try {{ lastCount = performance.getEntriesByType('resource').length; }} catch (_) {{ lastCount = 0; }}
                while (Date.now() - start < timeoutMs) {{
                    await new Promise(r => setTimeout(r, interval));
                    let curCount = lastCount;
                    try {{ curCount = performance.getEntriesByType('resource').length; }} catch (_) {{ curCount = lastCount; }}
                    if (document.readyState === 'complete' && curCount === lastCount) {{
                        stableMs += interval;
                        if (stableMs >= idleMs) {{ return true; }}
                    }} else {{
                        stableMs = 0;
                    }}
                    lastCount = curCount;
                }}
                return false;
            }})()"
        );

        let result = self
            .page
            .evaluate(js)
            .await
            .map_err(|e| RendererError::Script(e.to_string()))?;
        Ok(result.into_value::<bool>().unwrap_or(false))
    }

    async fn ready_state(&self) -> Result<String, RendererError> {
        let result = self
            .page
            .evaluate("document.readyState")
            .await
            .map_err(|e| RendererError::Script(e.to_string()))?;
        Ok(result.into_value::<String>().unwrap_or_default())
    }

    async fn load_network_idle(&self, url: &str, budget: Duration) -> Result<(), RendererError> {
        let started = Instant::now();
        self.page
            .goto(url)
            .await
            .map_err(|e| RendererError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let remaining = budget.saturating_sub(started.elapsed());
        if self.wait_for_network_idle(remaining).await? {
            debug!(url = %url, elapsed_ms = started.elapsed().as_millis(), "Network idle reached");
            Ok(())
        } else {
            Err(RendererError::Timeout {
                what: "network idle".to_string(),
                after: budget,
            })
        }
    }

    async fn load_dom_parsed(&self, url: &str) -> Result<(), RendererError> {
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|e| RendererError::Navigation {
                url: url.to_string(),
                message: e,
            })?;

        self.page
            .execute(params)
            .await
            .map_err(|e| RendererError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        loop {
            let state = self.ready_state().await?;
            if state == "interactive" || state == "complete" {
                debug!(url = %url, ready_state = %state, "Document parsed");
                return Ok(());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn load_url(
        &self,
        url: &str,
        timeout: Duration,
        strategy: WaitStrategy,
    ) -> Result<(), RendererError> {
        debug!(url = %url, ?strategy, timeout_secs = timeout.as_secs(), "Loading page");

        let load = async {
            match strategy {
                WaitStrategy::NetworkIdle => self.load_network_idle(url, timeout).await,
                WaitStrategy::DomContentLoaded => self.load_dom_parsed(url).await,
            }
        };

        tokio::time::timeout(timeout, load)
            .await
            .map_err(|_| RendererError::Timeout {
                what: format!("loading {url}"),
                after: timeout,
            })?
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), RendererError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.page.find_elements(selector).await {
                Ok(elements) if !elements.is_empty() => return Ok(()),
                Ok(_) => {}
                Err(e) => debug!(selector = %selector, error = %e, "Selector probe failed"),
            }
            if Instant::now() >= deadline {
                return Err(RendererError::Timeout {
                    what: format!("waiting for `{selector}`"),
                    after: timeout,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn Container>>, RendererError> {
        let elements =
            self.page
                .find_elements(selector)
                .await
                .map_err(|e| RendererError::Query {
                    selector: selector.to_string(),
                    message: e.to_string(),
                })?;
        Ok(wrap_elements(elements))
    }

    async fn execute_script(&self, script: &str) -> Result<(), RendererError> {
        self.page
            .evaluate(script)
            .await
            .map(|_| ())
            .map_err(|e| RendererError::Script(e.to_string()))
    }

    async fn close(&self) -> Result<(), RendererError> {
        let mut browser_guard = self.browser.lock().await;
        let Some(mut browser) = browser_guard.take() else {
            return Ok(());
        };

        if let Err(e) = self.page.clone().close().await {
            warn!("Failed to close page: {e}");
        }

        let result = match browser.close().await {
            Ok(_) => {
                if let Err(e) = browser.wait().await {
                    debug!("Browser process did not exit cleanly: {e}");
                }
                info!("Browser shutdown complete");
                Ok(())
            }
            Err(e) => {
                error!("Failed to close browser: {e}");
                Err(RendererError::Shutdown(e.to_string()))
            }
        };

        self.handler_task.abort();
        result
    }
}

impl Drop for ChromiumRenderer {
    fn drop(&mut self) {
        // The browser process is killed when `Browser` drops; only the handler
        // task needs stopping here.
        self.handler_task.abort();
    }
}

fn wrap_elements(elements: Vec<Element>) -> Vec<Box<dyn Container>> {
    elements
        .into_iter()
        .map(|element| Box::new(ChromiumContainer { element }) as Box<dyn Container>)
        .collect()
}

/// A live DOM element in the browser page.
struct ChromiumContainer {
    element: Element,
}

#[async_trait]
impl Container for ChromiumContainer {
    async fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn Container>>, RendererError> {
        let elements = self
            .element
            .find_elements(selector)
            .await
            .map_err(|e| RendererError::Query {
                selector: selector.to_string(),
                message: e.to_string(),
            })?;
        Ok(wrap_elements(elements))
    }

    async fn query_single(
        &self,
        selector: &str,
    ) -> Result<Option<Box<dyn Container>>, RendererError> {
        Ok(self.query_all(selector).await?.into_iter().next())
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>, RendererError> {
        self.element
            .attribute(name)
            .await
            .map_err(|e| RendererError::Query {
                selector: format!("@{name}"),
                message: e.to_string(),
            })
    }

    async fn inner_text(&self) -> Result<String, RendererError> {
        self.element
            .inner_text()
            .await
            .map(Option::unwrap_or_default)
            .map_err(|e| RendererError::Query {
                selector: "innerText".to_string(),
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = BrowserOptions::default();
        assert!(options.headless);
        assert_eq!(options.viewport_width, DEFAULT_VIEWPORT_WIDTH);
        assert_eq!(options.viewport_height, DEFAULT_VIEWPORT_HEIGHT);
        assert_eq!(options.user_agent, HARVEST_USER_AGENT);
        assert!(options.chrome_path.is_none());
    }
}
