//! Source adapters: per-source extraction rulesets.
//!
//! An adapter knows where a catalog starts ([`SourceAdapter::start_points`])
//! and how to turn one fetched page into candidate records plus an optional
//! next-page locator ([`SourceAdapter::extract_page`]). It does no I/O; the
//! [`crate::scheduler::FetchScheduler`] drives it.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::models::{CandidateRecord, SourceInfo};

/// How pages of a source must be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderMode {
    /// A plain HTTP fetch returns the full catalog markup.
    Static,
    /// Content is produced by scripts; wait for `ready_selector` to appear
    /// before reading the DOM.
    Rendered { ready_selector: String },
}

impl RenderMode {
    pub fn is_rendered(&self) -> bool {
        matches!(self, RenderMode::Rendered { .. })
    }
}

/// An entry locator, optionally tagged with the category it lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    pub url: String,
    pub category: Option<String>,
}

impl EntryPoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            category: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Where a page came from, passed to [`SourceAdapter::extract_page`].
#[derive(Debug, Clone, Copy)]
pub struct PageContext<'a> {
    /// Final URL of the fetched page; relative links resolve against it.
    pub url: &'a str,
    /// Category of the entry point this page descends from, if explicit.
    pub category: Option<&'a str>,
    /// 1-based position of the page within its pagination chain.
    pub page_number: u32,
}

/// Output of extracting one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedPage {
    pub records: Vec<CandidateRecord>,
    /// Absolute locator of the next page, if the page links one.
    pub next_page: Option<String>,
    /// Cards dropped at extraction for lacking a name or detail link.
    pub skipped: usize,
}

/// Per-source extraction ruleset.
pub trait SourceAdapter: Send + Sync {
    /// Short registry key (e.g., "books").
    fn key(&self) -> &'static str;

    /// Name and domain attached to every record this adapter emits.
    fn source(&self) -> SourceInfo;

    fn render_mode(&self) -> RenderMode;

    fn start_points(&self) -> Vec<EntryPoint>;

    fn extract_page(&self, content: &str, context: &PageContext<'_>) -> ExtractedPage;
}

/// Lookup table from adapter key to adapter.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    adapters: BTreeMap<&'static str, Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own key, replacing any previous one.
    pub fn register(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.adapters.insert(adapter.key(), adapter);
        self
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.adapters.contains_key(key)
    }

    /// Registered keys in sorted order.
    pub fn keys(&self) -> Vec<&'static str> {
        self.adapters.keys().copied().collect()
    }

    /// Keys from `requested` that no adapter is registered for.
    pub fn unknown<'a>(&self, requested: &'a [String]) -> Vec<&'a str> {
        requested
            .iter()
            .map(String::as_str)
            .filter(|key| !self.contains(key))
            .collect()
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("adapters", &self.keys())
            .finish()
    }
}
