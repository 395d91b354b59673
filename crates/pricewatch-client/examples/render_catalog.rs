/// Smoke-test for `BrowserFetcher` against the script-rendered catalog.
///
/// Launches a headless Chromium, renders the laptops category, and runs the
/// e-commerce adapter over the result.
///
/// Run with:
///   cargo run -p pricewatch-client --example render_catalog --features browser
use std::time::Duration;

use pricewatch_client::BrowserFetcher;
use pricewatch_client::sources::EcommerceAdapter;
use pricewatch_core::adapter::{PageContext, SourceAdapter};
use pricewatch_core::traits::Fetcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let adapter = EcommerceAdapter::new();
    let entry = adapter
        .start_points()
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("adapter has no entry points"))?;

    println!("Launching headless browser…");
    let browser = BrowserFetcher::launch(Duration::from_secs(30), Duration::from_secs(12)).await?;
    let fetcher = browser.with_ready_selector(".thumbnail");

    println!("Rendering {} …", entry.url);
    let html = fetcher.fetch(&entry.url).await?;
    let page = adapter.extract_page(
        &html,
        &PageContext {
            url: &entry.url,
            category: entry.category.as_deref(),
            page_number: 1,
        },
    );

    assert!(!page.records.is_empty(), "no product cards in rendered HTML");
    println!(
        "OK: {} products, {} skipped, next page {:?}",
        page.records.len(),
        page.skipped,
        page.next_page
    );
    for record in page.records.iter().take(3) {
        println!("  {:?} {:?}", record.name, record.price);
    }
    Ok(())
}
