//! On-disk response cache for development replay.
//!
//! Entries are keyed by the SHA-256 of the request signature and stored one
//! file per key. An expiry of zero keeps entries forever. Cached content is
//! a replay aid, never a freshness guarantee.
//!
//! Entries are written to a temporary file in the cache directory and
//! renamed into place, so an interrupted write never leaves a truncated
//! page behind under an entry name.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use uuid::Uuid;

use crate::error::AppError;
use crate::models::compute_hash;
use crate::traits::Fetcher;

/// Response cache settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub dir: PathBuf,
    /// Maximum entry age; `Duration::ZERO` means entries never expire.
    pub expiry: Duration,
}

impl CacheConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            expiry: Duration::ZERO,
        }
    }

    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }
}

/// A [`Fetcher`] wrapper that serves repeated requests from disk.
///
/// Built without a config it passes every request straight through.
#[derive(Clone)]
pub struct CachedFetcher<F> {
    inner: F,
    config: Option<Arc<CacheConfig>>,
}

impl<F: Fetcher> CachedFetcher<F> {
    pub fn new(inner: F, config: CacheConfig) -> Self {
        Self::optional(inner, Some(config))
    }

    pub fn optional(inner: F, config: Option<CacheConfig>) -> Self {
        Self {
            inner,
            config: config.map(Arc::new),
        }
    }

    fn entry_path(config: &CacheConfig, url: &str) -> PathBuf {
        config
            .dir
            .join(format!("{}.html", compute_hash(&format!("GET {url}"))))
    }

    async fn read_entry(config: &CacheConfig, path: &Path) -> Result<Option<String>, AppError> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AppError::CacheError(e.to_string())),
        };

        if !config.expiry.is_zero() {
            let age = metadata
                .modified()
                .ok()
                .and_then(|t| SystemTime::now().duration_since(t).ok())
                .unwrap_or_default();
            if age > config.expiry {
                return Ok(None);
            }
        }

        tokio::fs::read_to_string(path)
            .await
            .map(Some)
            .map_err(|e| AppError::CacheError(e.to_string()))
    }

    async fn write_entry(config: &CacheConfig, path: &Path, content: &str) -> Result<(), AppError> {
        let cache_error = |e: std::io::Error| AppError::CacheError(e.to_string());
        tokio::fs::create_dir_all(&config.dir).await.map_err(cache_error)?;

        let tmp = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        let written = match tokio::fs::write(&tmp, content).await {
            Ok(()) => tokio::fs::rename(&tmp, path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(cache_error(e));
        }
        Ok(())
    }
}

impl<F: Fetcher> Fetcher for CachedFetcher<F> {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        let Some(config) = self.config.as_deref() else {
            return self.inner.fetch(url).await;
        };
        let path = Self::entry_path(config, url);

        match Self::read_entry(config, &path).await {
            Ok(Some(content)) => {
                tracing::debug!(%url, "Cache hit");
                return Ok(content);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(%url, error = %e, "Cache read failed, fetching"),
        }

        let content = self.inner.fetch(url).await?;
        if let Err(e) = Self::write_entry(config, &path, &content).await {
            tracing::warn!(%url, error = %e, "Cache write failed");
        }
        Ok(content)
    }
}
