//! # Product Repository
//!
//! Row access for the product catalog.

use sqlx::{SqliteConnection, SqlitePool};

use crate::error::{DbResult, LedgerError, LedgerResult};
use hilal_core::{CoreError, Product, TenantContext};

const PRODUCT_COLUMNS: &str = "id, org_id, sku, name, created_at";

/// Repository for product reads.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product by ID (tenant-scoped).
    pub async fn get_by_id(&self, ctx: &TenantContext, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE org_id = ?1 AND id = ?2"
        ))
        .bind(&ctx.org_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Lists all products for an organization.
    pub async fn list(&self, ctx: &TenantContext) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE org_id = ?1 ORDER BY name"
        ))
        .bind(&ctx.org_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }
}

// =============================================================================
// Transactional operations
// =============================================================================

/// Fetches a product on the transaction connection, `NotFound` when missing.
pub(crate) async fn fetch_product(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    id: &str,
) -> LedgerResult<Product> {
    let product = sqlx::query_as::<_, Product>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE org_id = ?1 AND id = ?2"
    ))
    .bind(&ctx.org_id)
    .bind(id)
    .fetch_optional(conn)
    .await?;

    product.ok_or_else(|| LedgerError::Core(CoreError::not_found("Product", id)))
}
