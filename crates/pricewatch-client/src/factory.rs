//! Engine selection per render mode.

#[cfg(any(feature = "browser", test))]
use std::sync::Arc;
use std::time::Duration;

use pricewatch_core::adapter::RenderMode;
use pricewatch_core::error::AppError;
use pricewatch_core::scheduler::SchedulerConfig;
use pricewatch_core::traits::{Fetcher, FetcherFactory};

#[cfg(feature = "browser")]
use crate::browser_fetcher::BrowserFetcher;
use crate::fetcher::ReqwestFetcher;

/// The engine a source's pages are fetched with.
#[derive(Clone)]
pub enum PageFetcher {
    Http(ReqwestFetcher),
    #[cfg(feature = "browser")]
    Browser(RenderedFetcher),
}

impl Fetcher for PageFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        match self {
            PageFetcher::Http(fetcher) => fetcher.fetch(url).await,
            #[cfg(feature = "browser")]
            PageFetcher::Browser(fetcher) => fetcher.fetch(url).await,
        }
    }
}

/// A lazily launched handle that is launched again once it has died.
///
/// Callers racing on a dead or missing handle wait for a single launch.
#[cfg(any(feature = "browser", test))]
struct LaunchSlot<T> {
    current: Arc<tokio::sync::Mutex<Option<T>>>,
}

#[cfg(any(feature = "browser", test))]
impl<T> Clone for LaunchSlot<T> {
    fn clone(&self) -> Self {
        Self {
            current: self.current.clone(),
        }
    }
}

#[cfg(any(feature = "browser", test))]
impl<T> Default for LaunchSlot<T> {
    fn default() -> Self {
        Self {
            current: Arc::new(tokio::sync::Mutex::new(None)),
        }
    }
}

#[cfg(any(feature = "browser", test))]
impl<T: Clone> LaunchSlot<T> {
    async fn get_or_launch<Fut>(
        &self,
        is_alive: impl Fn(&T) -> bool,
        launch: impl FnOnce() -> Fut,
    ) -> Result<T, AppError>
    where
        Fut: Future<Output = Result<T, AppError>>,
    {
        let mut current = self.current.lock().await;
        match current.as_ref() {
            Some(handle) if is_alive(handle) => return Ok(handle.clone()),
            Some(_) => tracing::warn!("Browser is gone, relaunching"),
            None => {}
        }

        let launched = launch().await?;
        *current = Some(launched.clone());
        Ok(launched)
    }
}

/// Browser tabs for one rendered source.
///
/// Each fetch goes through the process-wide browser slot, so a crawl in
/// progress picks up a relaunched browser after the old one died.
#[cfg(feature = "browser")]
#[derive(Clone)]
pub struct RenderedFetcher {
    browser: LaunchSlot<BrowserFetcher>,
    navigation_timeout: Duration,
    render_wait: Duration,
    ready_selector: String,
}

#[cfg(feature = "browser")]
impl RenderedFetcher {
    async fn current(&self) -> Result<BrowserFetcher, AppError> {
        self.browser
            .get_or_launch(BrowserFetcher::is_alive, || {
                BrowserFetcher::launch(self.navigation_timeout, self.render_wait)
            })
            .await
    }
}

#[cfg(feature = "browser")]
impl Fetcher for RenderedFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        let browser = self.current().await?;
        browser
            .with_ready_selector(self.ready_selector.as_str())
            .fetch(url)
            .await
    }
}

/// Creates plain HTTP engines for static sources and browser tabs for
/// rendered ones.
///
/// The browser is launched on first use and shared by every rendered
/// source of the process. It is launched again when its connection ends
/// or it stops opening tabs.
#[derive(Clone)]
pub struct ClientFetcherFactory {
    http: ReqwestFetcher,
    #[cfg_attr(not(feature = "browser"), allow(dead_code))]
    request_timeout: Duration,
    #[cfg_attr(not(feature = "browser"), allow(dead_code))]
    render_wait: Duration,
    #[cfg(feature = "browser")]
    browser: LaunchSlot<BrowserFetcher>,
}

impl ClientFetcherFactory {
    pub fn new(config: &SchedulerConfig) -> Result<Self, AppError> {
        Ok(Self {
            http: ReqwestFetcher::with_timeout(config.request_timeout)?,
            request_timeout: config.request_timeout,
            render_wait: config.render_wait,
            #[cfg(feature = "browser")]
            browser: LaunchSlot::default(),
        })
    }

    #[cfg(feature = "browser")]
    async fn rendered(&self, ready_selector: &str) -> Result<PageFetcher, AppError> {
        let fetcher = RenderedFetcher {
            browser: self.browser.clone(),
            navigation_timeout: self.request_timeout,
            render_wait: self.render_wait,
            ready_selector: ready_selector.to_string(),
        };
        // Surface a launch failure when the source starts, not on its first page.
        fetcher.current().await?;
        Ok(PageFetcher::Browser(fetcher))
    }

    #[cfg(not(feature = "browser"))]
    async fn rendered(&self, _ready_selector: &str) -> Result<PageFetcher, AppError> {
        Err(AppError::RenderError(
            "rendered sources need the `browser` feature".to_string(),
        ))
    }
}

impl FetcherFactory for ClientFetcherFactory {
    type Fetcher = PageFetcher;

    async fn create(&self, mode: &RenderMode) -> Result<PageFetcher, AppError> {
        match mode {
            RenderMode::Static => Ok(PageFetcher::Http(self.http.clone())),
            RenderMode::Rendered { ready_selector } => self.rendered(ready_selector).await,
        }
    }
}
