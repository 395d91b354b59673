//! Books to Scrape: a static catalog paginated 20 books per page.

use pricewatch_core::adapter::{EntryPoint, ExtractedPage, PageContext, RenderMode, SourceAdapter};
use pricewatch_core::models::{CandidateRecord, SourceInfo};
use scraper::{ElementRef, Html};

use crate::extract::{self, FieldSelectors};

pub const BOOKS_SOURCE: SourceInfo = SourceInfo {
    name: "Books to Scrape",
    domain: "books.toscrape.com",
};

const START_URL: &str = "https://books.toscrape.com/catalogue/page-1.html";

/// Category used when the page carries no breadcrumb trail.
const DEFAULT_CATEGORY: &str = "books";

struct Selectors {
    card: FieldSelectors,
    title_link: FieldSelectors,
    price: FieldSelectors,
    rating: FieldSelectors,
    availability: FieldSelectors,
    image: FieldSelectors,
    breadcrumb: FieldSelectors,
    next: FieldSelectors,
}

pub struct BooksAdapter {
    selectors: Selectors,
}

impl BooksAdapter {
    pub fn new() -> Self {
        Self {
            selectors: Selectors {
                card: FieldSelectors::compile(&["article.product_pod"]),
                title_link: FieldSelectors::compile(&["h3 a"]),
                price: FieldSelectors::compile(&[".price_color"]),
                rating: FieldSelectors::compile(&["p.star-rating"]),
                availability: FieldSelectors::compile(&[".availability"]),
                image: FieldSelectors::compile(&["img.thumbnail"]),
                breadcrumb: FieldSelectors::compile(&["ul.breadcrumb li a"]),
                next: FieldSelectors::compile(&["li.next a"]),
            },
        }
    }

    /// Last breadcrumb link when the trail has at least two links.
    fn page_category(&self, root: ElementRef<'_>) -> String {
        let trail = self.selectors.breadcrumb.all(root);
        if trail.len() < 2 {
            return DEFAULT_CATEGORY.to_string();
        }
        trail
            .last()
            .map(|el| el.text().collect::<String>().trim().to_lowercase())
            .filter(|label| !label.is_empty())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string())
    }

    fn extract_card(
        &self,
        card: ElementRef<'_>,
        page_url: &str,
        category: &str,
    ) -> Option<CandidateRecord> {
        let s = &self.selectors;
        let name = s.title_link.attr(card, "title")?;
        let url = s
            .title_link
            .attr(card, "href")
            .and_then(|href| extract::resolve(page_url, &href))?;

        let rating = s.rating.attr(card, "class").and_then(|class| {
            class
                .split_whitespace()
                .filter(|word| *word != "star-rating")
                .find_map(extract::word_rating)
        });
        let in_stock = s
            .availability
            .text(card)
            .is_some_and(|text| text.to_lowercase().contains("in stock"));

        Some(CandidateRecord {
            sku: extract::segment_from_end(&url, 1),
            price: s.price.text(card).as_deref().and_then(extract::parse_price),
            currency: Some("GBP".to_string()),
            in_stock: Some(in_stock),
            category: Some(category.to_string()),
            image_url: s
                .image
                .attr(card, "src")
                .and_then(|src| extract::resolve(page_url, &src)),
            rating,
            name: Some(name),
            url: Some(url),
            ..CandidateRecord::for_source(BOOKS_SOURCE)
        })
    }
}

impl Default for BooksAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceAdapter for BooksAdapter {
    fn key(&self) -> &'static str {
        "books"
    }

    fn source(&self) -> SourceInfo {
        BOOKS_SOURCE
    }

    fn render_mode(&self) -> RenderMode {
        RenderMode::Static
    }

    fn start_points(&self) -> Vec<EntryPoint> {
        vec![EntryPoint::new(START_URL)]
    }

    fn extract_page(&self, content: &str, context: &PageContext<'_>) -> ExtractedPage {
        let document = Html::parse_document(content);
        let root = document.root_element();
        let category = context
            .category
            .map(str::to_string)
            .unwrap_or_else(|| self.page_category(root));

        let mut page = ExtractedPage::default();
        for card in self.selectors.card.all(root) {
            match self.extract_card(card, context.url, &category) {
                Some(record) => page.records.push(record),
                None => {
                    tracing::debug!(url = %context.url, "Skipping book card without title or link");
                    page.skipped += 1;
                }
            }
        }

        page.next_page = self
            .selectors
            .next
            .attr(root, "href")
            .and_then(|href| extract::resolve(context.url, &href));
        page
    }
}
