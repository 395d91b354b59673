#[cfg(feature = "browser")]
pub mod browser_fetcher;
pub mod extract;
pub mod factory;
pub mod fetcher;
pub mod sources;

#[cfg(feature = "browser")]
pub use browser_fetcher::BrowserFetcher;
pub use factory::{ClientFetcherFactory, PageFetcher};
pub use fetcher::ReqwestFetcher;
pub use sources::default_registry;
