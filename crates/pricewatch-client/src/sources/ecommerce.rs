//! WebScraper e-commerce test site: a script-rendered catalog with four
//! independently paginated categories.

use pricewatch_core::adapter::{EntryPoint, ExtractedPage, PageContext, RenderMode, SourceAdapter};
use pricewatch_core::models::{CandidateRecord, SourceInfo};
use scraper::{ElementRef, Html};

use crate::extract::{self, FieldSelectors};

pub const ECOMMERCE_SOURCE: SourceInfo = SourceInfo {
    name: "WebScraper Test Site",
    domain: "webscraper.io",
};

const BASE_URL: &str = "https://webscraper.io/test-sites/e-commerce/allinone";

/// (path under [`BASE_URL`], category label)
const CATEGORIES: &[(&str, &str)] = &[
    ("computers/laptops", "laptops"),
    ("computers/tablets", "tablets"),
    ("phones/touch", "touch-phones"),
    ("phones", "phones"),
];

const READY_SELECTOR: &str = ".thumbnail";

struct Selectors {
    card: FieldSelectors,
    title: FieldSelectors,
    price: FieldSelectors,
    description: FieldSelectors,
    image: FieldSelectors,
    stars: FieldSelectors,
    reviews: FieldSelectors,
    next: FieldSelectors,
}

pub struct EcommerceAdapter {
    selectors: Selectors,
}

impl EcommerceAdapter {
    pub fn new() -> Self {
        Self {
            selectors: Selectors {
                card: FieldSelectors::compile(&[READY_SELECTOR]),
                title: FieldSelectors::compile(&["a.title"]),
                price: FieldSelectors::compile(&["h4.pull-right.price", ".price", "h4.price"]),
                description: FieldSelectors::compile(&["p.description", ".description"]),
                image: FieldSelectors::compile(&["img.img-responsive"]),
                stars: FieldSelectors::compile(&["span.ws-icon.ws-icon-star"]),
                reviews: FieldSelectors::compile(&["div.ratings p", ".ratings"]),
                next: FieldSelectors::compile(&["a[rel='next']"]),
            },
        }
    }

    fn extract_card(
        &self,
        card: ElementRef<'_>,
        page_url: &str,
        category: Option<&str>,
    ) -> Option<CandidateRecord> {
        let s = &self.selectors;
        let name = s.title.attr(card, "title").or_else(|| s.title.text(card))?;
        let url = s
            .title
            .attr(card, "href")
            .and_then(|href| extract::resolve(page_url, &href))?;

        let stars = s.stars.count(card);

        Some(CandidateRecord {
            sku: extract::segment_from_end(&url, 0),
            price: s.price.text(card).as_deref().and_then(extract::parse_price),
            currency: Some("USD".to_string()),
            in_stock: Some(true),
            category: category.map(str::to_string),
            description: s.description.text(card),
            image_url: s
                .image
                .attr(card, "src")
                .and_then(|src| extract::resolve(page_url, &src)),
            rating: (stars > 0).then_some(stars as f64),
            review_count: s.reviews.text(card).as_deref().and_then(extract::parse_digits),
            name: Some(name),
            url: Some(url),
            ..CandidateRecord::for_source(ECOMMERCE_SOURCE)
        })
    }
}

impl Default for EcommerceAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceAdapter for EcommerceAdapter {
    fn key(&self) -> &'static str {
        "ecommerce"
    }

    fn source(&self) -> SourceInfo {
        ECOMMERCE_SOURCE
    }

    fn render_mode(&self) -> RenderMode {
        RenderMode::Rendered {
            ready_selector: READY_SELECTOR.to_string(),
        }
    }

    fn start_points(&self) -> Vec<EntryPoint> {
        CATEGORIES
            .iter()
            .map(|(path, category)| {
                EntryPoint::new(format!("{BASE_URL}/{path}")).with_category(*category)
            })
            .collect()
    }

    fn extract_page(&self, content: &str, context: &PageContext<'_>) -> ExtractedPage {
        let document = Html::parse_document(content);
        let root = document.root_element();

        let mut page = ExtractedPage::default();
        for card in self.selectors.card.all(root) {
            match self.extract_card(card, context.url, context.category) {
                Some(record) => page.records.push(record),
                None => {
                    tracing::debug!(
                        url = %context.url,
                        "Skipping product card without name or link"
                    );
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
