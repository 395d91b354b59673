use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use pricewatch_core::error::AppError;
use pricewatch_core::identity::random_user_agent;
use pricewatch_core::render::{ReadyState, wait_until_ready};
use pricewatch_core::traits::Fetcher;

/// How often the DOM is checked for the ready selector.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Headless-browser fetcher using Chromium via the Chrome DevTools Protocol.
///
/// A single Chromium process is shared by all clones; each
/// [`Fetcher::fetch`] opens its own tab, waits (bounded by `render_wait`)
/// for the ready selector to appear, reads the DOM and closes the tab.
/// A wait timeout is not an error: the content present at that point is
/// returned and a warning is logged.
///
/// Once the CDP connection ends, or a tab cannot be opened, the handle
/// reports itself dead through [`BrowserFetcher::is_alive`].
#[derive(Clone)]
pub struct BrowserFetcher {
    browser: Arc<Browser>,
    alive: Arc<AtomicBool>,
    navigation_timeout: Duration,
    render_wait: Duration,
    ready_selector: Option<String>,
}

impl BrowserFetcher {
    /// Launch a headless Chromium.
    ///
    /// Requires a Chromium / Chrome binary reachable via `$CHROME_BIN`, a
    /// well-known install path, or `chromiumoxide`'s own lookup.
    pub async fn launch(
        navigation_timeout: Duration,
        render_wait: Duration,
    ) -> Result<Self, AppError> {
        let mut builder = BrowserConfig::builder().no_sandbox().disable_default_args();

        if let Some(bin) = Self::find_chrome_binary() {
            tracing::info!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }

        let config = builder
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--no-first-run")
            .build()
            .map_err(|e| AppError::RenderError(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::RenderError(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled continuously for the connection to work.
        let alive = Arc::new(AtomicBool::new(true));
        let handler_alive = alive.clone();
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    tracing::warn!("Browser CDP handler error: {event:?}");
                    break;
                }
            }
            handler_alive.store(false, Ordering::Release);
            tracing::warn!("Browser connection closed");
        });

        Ok(Self {
            browser: Arc::new(browser),
            alive,
            navigation_timeout,
            render_wait,
            ready_selector: None,
        })
    }

    /// A handle on the same browser that waits for `selector` on each page.
    pub fn with_ready_selector(&self, selector: impl Into<String>) -> Self {
        Self {
            ready_selector: Some(selector.into()),
            ..self.clone()
        }
    }

    /// False once the browser connection is gone.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn find_chrome_binary() -> Option<PathBuf> {
        if let Ok(p) = std::env::var("CHROME_BIN") {
            let path = PathBuf::from(&p);
            if path.exists() {
                return Some(path);
            }
        }

        [
            "/snap/chromium/current/usr/lib/chromium-browser/chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
        ]
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
    }

    async fn render(&self, page: &Page, url: &str) -> Result<String, AppError> {
        if let Err(e) = page
            .set_user_agent(SetUserAgentOverrideParams::new(random_user_agent()))
            .await
        {
            tracing::debug!(%url, error = %e, "Could not override user agent");
        }

        match tokio::time::timeout(self.navigation_timeout, page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                return Err(AppError::NetworkError(format!("Failed to navigate to {url}: {e}")));
            }
            Err(_) => return Err(AppError::Timeout(self.navigation_timeout.as_secs())),
        }

        if let Some(selector) = &self.ready_selector {
            let state = wait_until_ready(
                || {
                    let page = page.clone();
                    let selector = selector.clone();
                    async move { page.find_element(selector).await.map(|_| true) }
                },
                self.render_wait,
                READY_POLL_INTERVAL,
            )
            .await;
            if state == ReadyState::TimedOut {
                tracing::warn!(
                    %url,
                    %selector,
                    wait_ms = self.render_wait.as_millis() as u64,
                    "Timed out waiting for content, continuing with what rendered"
                );
            }
        }

        page.content()
            .await
            .map_err(|e| AppError::RenderError(format!("Failed to read page content: {e}")))
    }
}

impl Fetcher for BrowserFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        let page = match self.browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                self.alive.store(false, Ordering::Release);
                return Err(AppError::RenderError(format!("Failed to open tab: {e}")));
            }
        };
        let guard = PageGuard::new(page.clone());

        let result = self.render(&page, url).await;
        guard.close().await;
        result
    }
}

/// Closes its tab when dropped, so a cancelled fetch never leaks one.
struct PageGuard {
    page: Option<Page>,
}

impl PageGuard {
    fn new(page: Page) -> Self {
        Self { page: Some(page) }
    }

    async fn close(mut self) {
        if let Some(page) = self.page.take()
            && let Err(e) = page.close().await
        {
            tracing::debug!(error = %e, "Failed to close tab");
        }
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if let Some(page) = self.page.take() {
            tokio::spawn(async move {
                let _ = page.close().await;
            });
        }
    }
}
