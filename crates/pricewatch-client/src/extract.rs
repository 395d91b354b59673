//! CSS-selector extraction helpers shared by the source adapters.
//!
//! Field rules are ordered lists of selectors tried in priority order; the
//! first non-empty match wins. Parsing helpers degrade to `None` instead of
//! failing so a malformed field never drops the whole record.

use scraper::{ElementRef, Selector};
use url::Url;

/// An ordered fallback list of compiled selectors for one field.
#[derive(Debug, Clone)]
pub struct FieldSelectors {
    selectors: Vec<Selector>,
}

impl FieldSelectors {
    /// Compile `patterns` in order. Patterns that fail to parse are logged
    /// and left out.
    pub fn compile(patterns: &[&str]) -> Self {
        let selectors = patterns
            .iter()
            .filter_map(|pattern| match Selector::parse(pattern) {
                Ok(selector) => Some(selector),
                Err(e) => {
                    tracing::warn!(selector = %pattern, error = %e, "Invalid selector skipped");
                    None
                }
            })
            .collect();
        Self { selectors }
    }

    /// Trimmed text of the first match that has any.
    pub fn text(&self, scope: ElementRef<'_>) -> Option<String> {
        self.selectors.iter().find_map(|selector| {
            scope
                .select(selector)
                .map(|el| el.text().collect::<String>().trim().to_string())
                .find(|text| !text.is_empty())
        })
    }

    /// Trimmed value of `attr` on the first match that carries it non-empty.
    pub fn attr(&self, scope: ElementRef<'_>, attr: &str) -> Option<String> {
        self.selectors.iter().find_map(|selector| {
            scope
                .select(selector)
                .filter_map(|el| el.value().attr(attr))
                .map(str::trim)
                .find(|value| !value.is_empty())
                .map(str::to_string)
        })
    }

    /// Every match of the first selector that matches anything.
    pub fn all<'a>(&self, scope: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        self.selectors
            .iter()
            .map(|selector| scope.select(selector).collect::<Vec<_>>())
            .find(|found| !found.is_empty())
            .unwrap_or_default()
    }

    /// Number of matches of the first selector that matches anything.
    pub fn count(&self, scope: ElementRef<'_>) -> usize {
        self.all(scope).len()
    }
}

/// Parse a price such as "£51.77" or "$1,299.00".
///
/// Everything except digits and the decimal point is stripped first.
pub fn parse_price(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    cleaned.parse::<f64>().ok().filter(|p| p.is_finite())
}

/// Parse the digits of a text such as "14 reviews".
pub fn parse_digits(raw: &str) -> Option<i64> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Map a star-rating word ("One".."Five") to 1.0..5.0.
pub fn word_rating(word: &str) -> Option<f64> {
    match word {
        "One" => Some(1.0),
        "Two" => Some(2.0),
        "Three" => Some(3.0),
        "Four" => Some(4.0),
        "Five" => Some(5.0),
        _ => None,
    }
}

/// Resolve `href` against the page it was found on.
pub fn resolve(base: &str, href: &str) -> Option<String> {
    let base = Url::parse(base).ok()?;
    base.join(href.trim()).ok().map(String::from)
}

/// The `n`-th path segment counted from the end (0 = last), ignoring a
/// trailing slash.
pub fn segment_from_end(url: &str, n: usize) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let path = parsed.path().trim_end_matches('/');
    path.split('/')
        .rev()
        .nth(n)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}
