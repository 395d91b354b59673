use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, TimeZone, Utc};
use http_body_util::BodyExt;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};
use tower::ServiceExt;
use url::Url;

use pricewatch_client::default_registry;
use pricewatch_core::models::ProductRecord;
use pricewatch_db::Database;
use pricewatch_server::routes;
use pricewatch_server::state::AppState;

pub const TEST_ADMIN_TOKEN: &str = "test-admin-token";

pub struct TestApp {
    pub router: Router,
    pub db: Database,
    _container: ContainerAsync<GenericImage>,
}

impl TestApp {
    /// Send a request and return the status plus the JSON body (Null when empty).
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }
}

pub fn authed(builder: axum::http::request::Builder) -> axum::http::request::Builder {
    builder.header("authorization", format!("Bearer {TEST_ADMIN_TOKEN}"))
}

pub fn json_body(value: serde_json::Value) -> Body {
    Body::from(serde_json::to_vec(&value).unwrap())
}

pub async fn setup_test_app() -> TestApp {
    setup_with_token(Some(TEST_ADMIN_TOKEN.to_string())).await
}

/// An app started without an admin token: crawl endpoints disabled.
pub async fn setup_test_app_no_auth() -> TestApp {
    setup_with_token(None).await
}

async fn setup_with_token(admin_token: Option<String>) -> TestApp {
    let container = GenericImage::new("postgres", "16")
        .with_exposed_port(ContainerPort::Tcp(5432))
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_PASSWORD", "postgres")
        .with_env_var("POSTGRES_DB", "pricewatch_test")
        .start()
        .await
        .expect("Failed to start PostgreSQL container");

    let host = container.get_host().await.expect("Failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get port");

    let url = format!("postgresql://postgres:postgres@{host}:{port}/pricewatch_test");
    let pool = retry_connect(&url).await;

    let db = Database::from_pool(pool);
    db.migrate().await.expect("Failed to run migrations");

    let state = Arc::new(AppState {
        db: db.clone(),
        admin_token,
        registry: default_registry(),
    });

    TestApp {
        router: routes::router(state),
        db,
        _container: container,
    }
}

async fn retry_connect(url: &str) -> PgPool {
    for _ in 0..30 {
        if let Ok(pool) = PgPoolOptions::new().max_connections(5).connect(url).await {
            return pool;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    panic!("Failed to connect to test database");
}

pub fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
}

pub fn record(sku: &str, category: &str, price: f64, hour: u32) -> ProductRecord {
    ProductRecord {
        source_name: "WebScraper Test Site".into(),
        source_domain: "webscraper.io".into(),
        name: format!("Item {sku}"),
        url: Url::parse(&format!(
            "https://webscraper.io/test-sites/e-commerce/allinone/product/{sku}"
        ))
        .unwrap(),
        sku: sku.into(),
        price: Some(price),
        currency: "USD".into(),
        in_stock: true,
        category: Some(category.into()),
        brand: None,
        description: None,
        image_url: None,
        rating: Some(4.0),
        review_count: Some(12),
        observed_at: at(hour),
    }
}
