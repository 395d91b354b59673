use std::collections::HashSet;

use pricewatch_db::PriceRepository;
use url::Url;

use crate::integration::common::{at, record, setup_test_db};

#[tokio::test]
async fn repeated_merge_appends_observations_without_duplicating() {
    let (pool, _container) = setup_test_db().await;
    let repo = PriceRepository::new(pool);

    let first = repo.merge(&record("a1", Some(10.0))).await.unwrap();
    let second = repo.merge(&record("a1", Some(10.0))).await.unwrap();

    assert!(first.product_created);
    assert!(!second.product_created);
    assert_eq!(first.source_id, second.source_id);
    assert_eq!(first.product_id, second.product_id);
    assert_ne!(first.observation_id, second.observation_id);

    let counts = repo.counts().await.unwrap();
    assert_eq!(counts.sources, 1);
    assert_eq!(counts.products, 1);
    assert_eq!(counts.observations, 2);
}

#[tokio::test]
async fn price_change_is_recorded_as_a_new_observation() {
    let (pool, _container) = setup_test_db().await;
    let repo = PriceRepository::new(pool);

    let mut morning = record("A1", Some(10.00));
    morning.observed_at = at(8);
    let mut evening = record("A1", Some(9.50));
    evening.observed_at = at(20);

    let outcome = repo.merge(&morning).await.unwrap();
    repo.merge(&evening).await.unwrap();

    let history = repo
        .price_history(outcome.product_id, None, None, 10)
        .await
        .unwrap();
    let prices: Vec<_> = history.iter().map(|o| o.price).collect();
    assert_eq!(prices, vec![Some(9.50), Some(10.00)]);
    assert!(history[0].observed_at > history[1].observed_at);
    assert!(history.iter().all(|o| o.in_stock && o.currency == "GBP"));
    assert_eq!(repo.counts().await.unwrap().products, 1);
}

#[tokio::test]
async fn missing_fields_do_not_erase_stored_values() {
    let (pool, _container) = setup_test_db().await;
    let repo = PriceRepository::new(pool);

    let mut full = record("b2", Some(5.0));
    full.rating = Some(0.0);
    full.review_count = Some(4);
    let outcome = repo.merge(&full).await.unwrap();

    let mut sparse = record("b2", None);
    sparse.name = "Book b2 (2nd edition)".into();
    sparse.category = None;
    sparse.description = None;
    sparse.image_url = None;
    sparse.rating = None;
    sparse.review_count = None;
    sparse.brand = Some("Penguin".into());
    repo.merge(&sparse).await.unwrap();

    let product = repo.get_product(outcome.product_id).await.unwrap().unwrap();
    assert_eq!(product.name, "Book b2 (2nd edition)");
    assert_eq!(product.category.as_deref(), Some("poetry"));
    assert_eq!(product.description.as_deref(), Some("A book"));
    assert!(product.image_url.is_some());
    assert_eq!(product.rating, Some(0.0));
    assert_eq!(product.review_count, Some(4));
    assert_eq!(product.brand.as_deref(), Some("Penguin"));
    assert!(product.updated_at >= product.created_at);
}

#[tokio::test]
async fn new_values_replace_stored_ones() {
    let (pool, _container) = setup_test_db().await;
    let repo = PriceRepository::new(pool);

    let outcome = repo.merge(&record("c3", Some(1.0))).await.unwrap();

    let mut changed = record("c3", Some(1.0));
    changed.rating = Some(5.0);
    changed.category = Some("fiction".into());
    repo.merge(&changed).await.unwrap();

    let product = repo.get_product(outcome.product_id).await.unwrap().unwrap();
    assert_eq!(product.rating, Some(5.0));
    assert_eq!(product.category.as_deref(), Some("fiction"));
}

#[tokio::test]
async fn concurrent_merges_converge_to_one_product() {
    let (pool, _container) = setup_test_db().await;
    let repo = PriceRepository::new(pool);

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let repo = repo.clone();
            tokio::spawn(async move { repo.merge(&record("race", Some(i as f64))).await })
        })
        .collect();

    let mut product_ids = HashSet::new();
    let mut created = 0;
    for task in futures::future::join_all(tasks).await {
        let outcome = task.unwrap().unwrap();
        product_ids.insert(outcome.product_id);
        created += outcome.product_created as usize;
    }

    assert_eq!(product_ids.len(), 1);
    assert_eq!(created, 1);
    let counts = repo.counts().await.unwrap();
    assert_eq!(counts.sources, 1);
    assert_eq!(counts.products, 1);
    assert_eq!(counts.observations, 8);
}

#[tokio::test]
async fn url_owned_by_another_product_fails_the_record_only() {
    let (pool, _container) = setup_test_db().await;
    let repo = PriceRepository::new(pool);

    repo.merge(&record("d4", Some(2.0))).await.unwrap();

    let mut clash = record("d5", Some(3.0));
    clash.url = Url::parse("https://books.toscrape.com/catalogue/d4/index.html").unwrap();
    let err = repo.merge(&clash).await.unwrap_err();
    assert!(err.to_string().contains("already belongs"), "{err}");

    // Rolled back: no product or observation for d5.
    let counts = repo.counts().await.unwrap();
    assert_eq!(counts.products, 1);
    assert_eq!(counts.observations, 1);

    repo.merge(&record("d5", Some(3.0))).await.unwrap();
    assert_eq!(repo.counts().await.unwrap().products, 2);
}

#[tokio::test]
async fn url_moving_onto_another_product_is_rejected() {
    let (pool, _container) = setup_test_db().await;
    let repo = PriceRepository::new(pool);

    repo.merge(&record("e1", Some(2.0))).await.unwrap();
    repo.merge(&record("e2", Some(2.0))).await.unwrap();

    let mut moved = record("e2", Some(2.5));
    moved.url = Url::parse("https://books.toscrape.com/catalogue/e1/index.html").unwrap();
    let err = repo.merge(&moved).await.unwrap_err();
    assert!(err.to_string().contains("already belongs"), "{err}");
    assert_eq!(repo.counts().await.unwrap().observations, 2);
}

#[tokio::test]
async fn sources_are_keyed_by_domain() {
    let (pool, _container) = setup_test_db().await;
    let repo = PriceRepository::new(pool);

    let books = repo.merge(&record("f1", Some(1.0))).await.unwrap();

    let mut shop = record("f1", Some(1.0));
    shop.source_name = "WebScraper Test Site".into();
    shop.source_domain = "webscraper.io".into();
    shop.url =
        Url::parse("https://webscraper.io/test-sites/e-commerce/allinone/product/1").unwrap();
    let other = repo.merge(&shop).await.unwrap();

    assert_ne!(books.source_id, other.source_id);
    assert_ne!(books.product_id, other.product_id);
    assert!(other.product_created);
    assert_eq!(repo.counts().await.unwrap().sources, 2);
}
