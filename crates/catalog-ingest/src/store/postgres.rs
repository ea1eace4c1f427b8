//! PostgreSQL product store

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;

use super::{dedupe_by_sku, ProductStore};
use crate::error::{StoreError, StoreResult};
use crate::models::Product;

/// Rows per upsert statement; keeps bind parameters well under the Postgres limit
pub const UPSERT_CHUNK_SIZE: usize = 100;

const PRODUCT_COLUMNS: &str = "id, sku, name, description, price, stock, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PgProductStore {
    pool: PgPool,
}

impl PgProductStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ProductStore for PgProductStore {
    async fn find_by_sku(&self, sku: &str) -> StoreResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE sku = $1"
        ))
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Upsert in chunks inside one transaction, so a batch lands entirely or not at all
    async fn bulk_upsert(&self, products: &[Product]) -> StoreResult<()> {
        let unique = dedupe_by_sku(products);
        if unique.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for chunk in unique.chunks(UPSERT_CHUNK_SIZE) {
            let mut query_builder: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO products (sku, name, description, price, stock) ");

            query_builder.push_values(chunk.iter(), |mut b, product| {
                b.push_bind(&product.sku)
                    .push_bind(&product.name)
                    .push_bind(&product.description)
                    .push_bind(product.price)
                    .push_bind(product.stock);
            });

            query_builder.push(
                r#"
                ON CONFLICT (sku) DO UPDATE SET
                    name = EXCLUDED.name,
                    description = EXCLUDED.description,
                    price = EXCLUDED.price,
                    stock = EXCLUDED.stock,
                    updated_at = NOW()
                "#,
            );

            query_builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;

        debug!(count = unique.len(), "Bulk upserted products");
        Ok(())
    }

    async fn create(&self, product: &Product) -> StoreResult<Product> {
        let created = sqlx::query_as::<_, Product>(&format!(
            r#"
            INSERT INTO products (sku, name, description, price, stock)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price)
        .bind(product.stock)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StoreError::Duplicate(product.sku.clone())
            },
            other => StoreError::Database(other),
        })?;

        Ok(created)
    }

    async fn update(&self, product: &Product) -> StoreResult<Product> {
        let id = product
            .id
            .ok_or_else(|| StoreError::NotFound(format!("{} has no id", product.sku)))?;

        let updated = sqlx::query_as::<_, Product>(&format!(
            r#"
            UPDATE products
            SET name = $2, description = $3, price = $4, stock = $5, updated_at = NOW()
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price)
        .bind(product.stock)
        .fetch_optional(&self.pool)
        .await?;

        updated.ok_or_else(|| StoreError::NotFound(format!("id {id}")))
    }

    async fn list(&self) -> StoreResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
