use pricewatch_core::models::CategorySummary;
use pricewatch_db::PriceRepository;

use crate::integration::common::{at, record, setup_test_db};

async fn seed(repo: &PriceRepository) {
    for (sku, category) in [
        ("p1", Some("poetry")),
        ("p2", Some("poetry")),
        ("h1", Some("history")),
        ("u1", None),
    ] {
        let mut r = record(sku, Some(4.0));
        r.category = category.map(str::to_string);
        repo.merge(&r).await.unwrap();
    }
}

#[tokio::test]
async fn category_summary_counts_products_per_label() {
    let (pool, _container) = setup_test_db().await;
    let repo = PriceRepository::new(pool);
    seed(&repo).await;

    let summary = repo.category_summary().await.unwrap();
    assert_eq!(
        summary,
        vec![
            CategorySummary {
                category: Some("history".into()),
                product_count: 1
            },
            CategorySummary {
                category: Some("poetry".into()),
                product_count: 2
            },
            CategorySummary {
                category: None,
                product_count: 1
            },
        ]
    );
}

#[tokio::test]
async fn list_products_filters_and_pages_by_name() {
    let (pool, _container) = setup_test_db().await;
    let repo = PriceRepository::new(pool);
    seed(&repo).await;

    let poetry = repo.list_products(Some("poetry"), 10, 0).await.unwrap();
    let names: Vec<_> = poetry.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Book p1", "Book p2"]);

    let all = repo.list_products(None, 10, 0).await.unwrap();
    assert_eq!(all.len(), 4);
    assert_eq!(all[0].name, "Book h1");

    let page = repo.list_products(None, 2, 2).await.unwrap();
    let names: Vec<_> = page.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Book p2", "Book u1"]);
}

#[tokio::test]
async fn history_honours_time_range_and_limit() {
    let (pool, _container) = setup_test_db().await;
    let repo = PriceRepository::new(pool);

    let mut product_id = None;
    for hour in [6, 9, 12, 15] {
        let mut r = record("t1", Some(hour as f64));
        r.observed_at = at(hour);
        product_id = Some(repo.merge(&r).await.unwrap().product_id);
    }
    let product_id = product_id.unwrap();

    let window = repo
        .price_history(product_id, Some(at(9)), Some(at(12)), 10)
        .await
        .unwrap();
    let prices: Vec<_> = window.iter().map(|o| o.price).collect();
    assert_eq!(prices, vec![Some(12.0), Some(9.0)]);

    let latest = repo.price_history(product_id, None, None, 1).await.unwrap();
    assert_eq!(latest[0].price, Some(15.0));
}

#[tokio::test]
async fn observations_by_category_are_newest_first() {
    let (pool, _container) = setup_test_db().await;
    let repo = PriceRepository::new(pool);

    for (sku, category, hour) in [("a", "poetry", 7), ("b", "history", 8), ("c", "poetry", 10)] {
        let mut r = record(sku, Some(hour as f64));
        r.category = Some(category.into());
        r.observed_at = at(hour);
        repo.merge(&r).await.unwrap();
    }

    let rows = repo
        .observations_by_category("poetry", None, None, 10)
        .await
        .unwrap();
    let prices: Vec<_> = rows.iter().map(|o| o.price).collect();
    assert_eq!(prices, vec![Some(10.0), Some(7.0)]);

    let since = repo
        .observations_by_category("poetry", Some(at(8)), None, 10)
        .await
        .unwrap();
    assert_eq!(since.len(), 1);

    assert!(
        repo.observations_by_category("travel", None, None, 10)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn unknown_product_and_health() {
    let (pool, _container) = setup_test_db().await;
    let repo = PriceRepository::new(pool);

    repo.health_check().await.unwrap();
    assert!(repo.get_product(uuid::Uuid::new_v4()).await.unwrap().is_none());
    assert_eq!(repo.counts().await.unwrap(), Default::default());
}
