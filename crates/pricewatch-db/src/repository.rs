use chrono::{DateTime, Utc};
use pricewatch_core::error::AppError;
use pricewatch_core::models::{
    CategorySummary, MergeOutcome, PriceObservation, Product, ProductRecord, StoreCounts,
};
use pricewatch_core::traits::ObservationStore;
use sqlx::{PgPool, Pool, Postgres, Transaction};
use uuid::Uuid;

/// SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

/// Products, their sources and the price time series in PostgreSQL.
///
/// Writes go through [`PriceRepository::merge`]; everything else is a read
/// query for the server and CLI.
#[derive(Clone)]
pub struct PriceRepository {
    pool: Pool<Postgres>,
}

impl PriceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persist one validated record in a single transaction.
    ///
    /// Resolves (or creates) the source by domain and the product by
    /// `(source, sku)`, applies the fill-if-missing update to an existing
    /// product, then appends one price observation. Any failure rolls the
    /// whole unit back.
    pub async fn merge(&self, record: &ProductRecord) -> Result<MergeOutcome, AppError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let source_id = get_or_create_source(&mut tx, record).await?;
        let (product_id, product_created) = upsert_product(&mut tx, source_id, record).await?;

        let (observation_id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO price_observations (product_id, price, currency, in_stock, observed_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(product_id)
        .bind(record.price)
        .bind(&record.currency)
        .bind(record.in_stock)
        .bind(record.observed_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;

        tracing::debug!(
            sku = %record.sku,
            %product_id,
            product_created,
            "Observation saved"
        );

        Ok(MergeOutcome {
            source_id,
            product_id,
            observation_id,
            product_created,
        })
    }

    pub async fn get_product(&self, id: Uuid) -> Result<Option<Product>, AppError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r#"
            SELECT id, source_id, name, url, sku, brand, category, description, image_url,
                   rating, review_count, created_at, updated_at
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(row.map(Into::into))
    }

    /// Products ordered by name, optionally restricted to one category.
    pub async fn list_products(
        &self,
        category: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Product>, AppError> {
        let rows = sqlx::query_as::<_, ProductRow>(
            r#"
            SELECT id, source_id, name, url, sku, brand, category, description, image_url,
                   rating, review_count, created_at, updated_at
            FROM products
            WHERE ($1::varchar IS NULL OR category = $1)
            ORDER BY name, id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(category)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Observations of one product inside `[since, until]`, newest first.
    pub async fn price_history(
        &self,
        product_id: Uuid,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<PriceObservation>, AppError> {
        let rows = sqlx::query_as::<_, ObservationRow>(
            r#"
            SELECT id, product_id, price, currency, in_stock, observed_at
            FROM price_observations
            WHERE product_id = $1
              AND ($2::timestamptz IS NULL OR observed_at >= $2)
              AND ($3::timestamptz IS NULL OR observed_at <= $3)
            ORDER BY observed_at DESC, id
            LIMIT $4
            "#,
        )
        .bind(product_id)
        .bind(since)
        .bind(until)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Observations of every product in `category` inside `[since, until]`,
    /// newest first.
    pub async fn observations_by_category(
        &self,
        category: &str,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<PriceObservation>, AppError> {
        let rows = sqlx::query_as::<_, ObservationRow>(
            r#"
            SELECT o.id, o.product_id, o.price, o.currency, o.in_stock, o.observed_at
            FROM price_observations o
            JOIN products p ON p.id = o.product_id
            WHERE p.category = $1
              AND ($2::timestamptz IS NULL OR o.observed_at >= $2)
              AND ($3::timestamptz IS NULL OR o.observed_at <= $3)
            ORDER BY o.observed_at DESC, o.id
            LIMIT $4
            "#,
        )
        .bind(category)
        .bind(since)
        .bind(until)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Product count per category label; uncategorised products last.
    pub async fn category_summary(&self) -> Result<Vec<CategorySummary>, AppError> {
        let rows: Vec<(Option<String>, i64)> = sqlx::query_as(
            r#"
            SELECT category, COUNT(*)
            FROM products
            GROUP BY category
            ORDER BY category NULLS LAST
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows
            .into_iter()
            .map(|(category, product_count)| CategorySummary {
                category,
                product_count,
            })
            .collect())
    }

    pub async fn counts(&self) -> Result<StoreCounts, AppError> {
        let (sources, products, observations): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM sources),
                (SELECT COUNT(*) FROM products),
                (SELECT COUNT(*) FROM price_observations)
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(StoreCounts {
            sources,
            products,
            observations,
        })
    }

    /// Check database connectivity.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }
}

impl ObservationStore for PriceRepository {
    async fn merge(&self, record: &ProductRecord) -> Result<MergeOutcome, AppError> {
        PriceRepository::merge(self, record).await
    }
}

/// Insert the source unless its domain is known, then read back its id.
///
/// A concurrent insert of the same domain makes ours a no-op; the re-read
/// then sees the committed row.
async fn get_or_create_source(
    tx: &mut Transaction<'_, Postgres>,
    record: &ProductRecord,
) -> Result<Uuid, AppError> {
    let inserted: Option<(Uuid,)> = sqlx::query_as(
        r#"
        INSERT INTO sources (name, domain)
        VALUES ($1, $2)
        ON CONFLICT DO NOTHING
        RETURNING id
        "#,
    )
    .bind(&record.source_name)
    .bind(&record.source_domain)
    .fetch_optional(&mut **tx)
    .await
    .map_err(db_error)?;

    if let Some((id,)) = inserted {
        tracing::info!(domain = %record.source_domain, "Registered new source");
        return Ok(id);
    }

    let existing: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM sources WHERE domain = $1")
        .bind(&record.source_domain)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_error)?;

    existing.map(|(id,)| id).ok_or_else(|| {
        AppError::DatabaseError(format!(
            "source name '{}' is already registered under another domain",
            record.source_name
        ))
    })
}

/// Create the product, or update the existing one under the fill-if-missing
/// rule. Returns the product id and whether it was created.
async fn upsert_product(
    tx: &mut Transaction<'_, Postgres>,
    source_id: Uuid,
    record: &ProductRecord,
) -> Result<(Uuid, bool), AppError> {
    let inserted: Option<(Uuid,)> = sqlx::query_as(
        r#"
        INSERT INTO products
            (source_id, name, url, sku, brand, category, description, image_url, rating, review_count)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT DO NOTHING
        RETURNING id
        "#,
    )
    .bind(source_id)
    .bind(&record.name)
    .bind(record.url.as_str())
    .bind(&record.sku)
    .bind(&record.brand)
    .bind(&record.category)
    .bind(&record.description)
    .bind(&record.image_url)
    .bind(record.rating)
    .bind(record.review_count)
    .fetch_optional(&mut **tx)
    .await
    .map_err(db_error)?;

    if let Some((id,)) = inserted {
        return Ok((id, true));
    }

    let updated: Option<(Uuid,)> = sqlx::query_as(
        r#"
        UPDATE products SET
            name = $3,
            url = $4,
            brand = COALESCE($5, brand),
            category = COALESCE($6, category),
            description = COALESCE($7, description),
            image_url = COALESCE($8, image_url),
            rating = COALESCE($9, rating),
            review_count = COALESCE($10, review_count),
            updated_at = NOW()
        WHERE source_id = $1 AND sku = $2
        RETURNING id
        "#,
    )
    .bind(source_id)
    .bind(&record.sku)
    .bind(&record.name)
    .bind(record.url.as_str())
    .bind(&record.brand)
    .bind(&record.category)
    .bind(&record.description)
    .bind(&record.image_url)
    .bind(record.rating)
    .bind(record.review_count)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| url_conflict(e, record))?;

    // Nothing to update means the insert lost to a product owning this url.
    updated.map(|(id,)| (id, false)).ok_or_else(|| {
        AppError::DatabaseError(format!(
            "url {} already belongs to another product",
            record.url
        ))
    })
}

fn url_conflict(err: sqlx::Error, record: &ProductRecord) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            AppError::DatabaseError(format!(
                "url {} already belongs to another product (sku {})",
                record.url, record.sku
            ))
        }
        _ => db_error(err),
    }
}

fn db_error(err: sqlx::Error) -> AppError {
    AppError::DatabaseError(err.to_string())
}

// -- Internal row types for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    source_id: Uuid,
    name: String,
    url: String,
    sku: String,
    brand: Option<String>,
    category: Option<String>,
    description: Option<String>,
    image_url: Option<String>,
    rating: Option<f64>,
    review_count: Option<i32>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            source_id: row.source_id,
            name: row.name,
            url: row.url,
            sku: row.sku,
            brand: row.brand,
            category: row.category,
            description: row.description,
            image_url: row.image_url,
            rating: row.rating,
            review_count: row.review_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ObservationRow {
    id: Uuid,
    product_id: Uuid,
    price: Option<f64>,
    currency: String,
    in_stock: bool,
    observed_at: DateTime<Utc>,
}

impl From<ObservationRow> for PriceObservation {
    fn from(row: ObservationRow) -> Self {
        PriceObservation {
            id: row.id,
            product_id: row.product_id,
            price: row.price,
            currency: row.currency,
            in_stock: row.in_stock,
            observed_at: row.observed_at,
        }
    }
}
