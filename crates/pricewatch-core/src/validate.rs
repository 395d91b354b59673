//! Record validation: candidate record in, typed record or rejection out.

use std::fmt;

use chrono::{DateTime, Utc};
use url::Url;

use crate::models::{CandidateRecord, ProductRecord};

/// Currency recorded when the adapter does not supply one.
pub const DEFAULT_CURRENCY: &str = "USD";

/// One reason a candidate record was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectionReason {
    MissingName,
    MissingUrl,
    InvalidUrl(String),
    MissingSku,
    MissingStockFlag,
    MissingSourceName,
    MissingSourceDomain,
    NegativePrice(f64),
    NonFinitePrice,
    RatingOutOfRange(f64),
    NegativeReviewCount(i64),
    ReviewCountTooLarge(i64),
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::MissingName => write!(f, "name is missing or empty"),
            RejectionReason::MissingUrl => write!(f, "url is missing"),
            RejectionReason::InvalidUrl(reason) => {
                write!(f, "url is not absolute http(s): {reason}")
            }
            RejectionReason::MissingSku => write!(f, "sku is missing or empty"),
            RejectionReason::MissingStockFlag => write!(f, "in_stock flag is missing"),
            RejectionReason::MissingSourceName => write!(f, "source name is missing"),
            RejectionReason::MissingSourceDomain => write!(f, "source domain is missing"),
            RejectionReason::NegativePrice(p) => write!(f, "price {p} is negative"),
            RejectionReason::NonFinitePrice => write!(f, "price is not a finite number"),
            RejectionReason::RatingOutOfRange(r) => write!(f, "rating {r} is outside [0, 5]"),
            RejectionReason::NegativeReviewCount(n) => write!(f, "review count {n} is negative"),
            RejectionReason::ReviewCountTooLarge(n) => write!(f, "review count {n} is too large"),
        }
    }
}

/// A rejected candidate with every reason that applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub sku: Option<String>,
    pub url: Option<String>,
    pub reasons: Vec<RejectionReason>,
}

impl Rejection {
    pub fn has(&self, reason: &RejectionReason) -> bool {
        self.reasons.contains(reason)
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reasons: Vec<String> = self.reasons.iter().map(ToString::to_string).collect();
        write!(f, "{}", reasons.join("; "))
    }
}

/// Filters candidate records against the required-field and range schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordValidator;

impl RecordValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a candidate observed at `observed_at`.
    pub fn validate(
        &self,
        candidate: CandidateRecord,
        observed_at: DateTime<Utc>,
    ) -> Result<ProductRecord, Rejection> {
        let mut reasons = Vec::new();

        let name = non_empty(candidate.name.as_deref());
        if name.is_none() {
            reasons.push(RejectionReason::MissingName);
        }

        let url = match candidate.url.as_deref().map(str::trim) {
            None | Some("") => {
                reasons.push(RejectionReason::MissingUrl);
                None
            }
            Some(raw) => match parse_absolute_url(raw) {
                Ok(url) => Some(url),
                Err(reason) => {
                    reasons.push(RejectionReason::InvalidUrl(reason));
                    None
                }
            },
        };

        let sku = non_empty(candidate.sku.as_deref());
        if sku.is_none() {
            reasons.push(RejectionReason::MissingSku);
        }

        if candidate.in_stock.is_none() {
            reasons.push(RejectionReason::MissingStockFlag);
        }

        let source_name = non_empty(candidate.source_name.as_deref());
        if source_name.is_none() {
            reasons.push(RejectionReason::MissingSourceName);
        }
        let source_domain = non_empty(candidate.source_domain.as_deref());
        if source_domain.is_none() {
            reasons.push(RejectionReason::MissingSourceDomain);
        }

        if let Some(price) = candidate.price {
            if !price.is_finite() {
                reasons.push(RejectionReason::NonFinitePrice);
            } else if price < 0.0 {
                reasons.push(RejectionReason::NegativePrice(price));
            }
        }

        if let Some(rating) = candidate.rating {
            if !(0.0..=5.0).contains(&rating) {
                reasons.push(RejectionReason::RatingOutOfRange(rating));
            }
        }

        let review_count = match candidate.review_count {
            Some(n) if n < 0 => {
                reasons.push(RejectionReason::NegativeReviewCount(n));
                None
            }
            Some(n) => match i32::try_from(n) {
                Ok(n) => Some(n),
                Err(_) => {
                    reasons.push(RejectionReason::ReviewCountTooLarge(n));
                    None
                }
            },
            None => None,
        };

        match (name, url, sku, candidate.in_stock, source_name, source_domain) {
            (
                Some(name),
                Some(url),
                Some(sku),
                Some(in_stock),
                Some(source_name),
                Some(source_domain),
            ) if reasons.is_empty() => {
                Ok(ProductRecord {
                    source_name,
                    source_domain,
                    name,
                    url,
                    sku,
                    price: candidate.price,
                    currency: non_empty(candidate.currency.as_deref())
                        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
                    in_stock,
                    category: non_empty(candidate.category.as_deref()),
                    brand: non_empty(candidate.brand.as_deref()),
                    description: non_empty(candidate.description.as_deref()),
                    image_url: non_empty(candidate.image_url.as_deref()),
                    rating: candidate.rating,
                    review_count,
                    observed_at,
                })
            }
            _ => Err(Rejection {
                sku: candidate.sku,
                url: candidate.url,
                reasons,
            }),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_absolute_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| e.to_string())?;
    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(format!("scheme '{scheme}' not allowed")),
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err("missing host".to_string());
    }
    Ok(url)
}
