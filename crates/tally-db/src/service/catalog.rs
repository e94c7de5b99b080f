//! Catalog seeding and lookups. The engine never edits catalog rows; these
//! entry points exist for the seed binary, the API's lookup routes and tests.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;

use crate::repository::CatalogRepository;
use crate::service::error::{ServiceError, ServiceResult};
use tally_core::validation::validate_reference;
use tally_core::{new_id, Product, Supplier, ValidationError, Warehouse};

#[derive(Debug, Clone)]
pub struct CatalogService {
    pool: SqlitePool,
}

impl CatalogService {
    pub fn new(pool: SqlitePool) -> Self {
        CatalogService { pool }
    }

    pub async fn add_product(
        &self,
        code: &str,
        barcode: &str,
        name: &str,
        price_cents: i64,
        cost_cents: i64,
        low_stock_threshold: i64,
    ) -> ServiceResult<Product> {
        validate_reference("product code", code)?;
        validate_reference("barcode", barcode)?;
        if price_cents < 0 || cost_cents < 0 || low_stock_threshold < 0 {
            return Err(ValidationError::OutOfRange {
                field: "product amounts".to_string(),
                min: 0,
                max: i64::MAX,
            }
            .into());
        }

        let product = Product {
            id: new_id(),
            code: code.to_string(),
            barcode: barcode.to_string(),
            name: name.to_string(),
            price_cents,
            cost_cents,
            low_stock_threshold,
            created_at: Utc::now(),
        };
        let mut conn = self.pool.acquire().await?;
        CatalogRepository::new(&mut conn).insert_product(&product).await?;

        info!(product_id = %product.id, code, "Product added");
        Ok(product)
    }

    pub async fn add_supplier(&self, code: &str, name: &str) -> ServiceResult<Supplier> {
        validate_reference("supplier code", code)?;
        let supplier = Supplier {
            id: new_id(),
            code: code.to_string(),
            name: name.to_string(),
        };
        let mut conn = self.pool.acquire().await?;
        CatalogRepository::new(&mut conn).insert_supplier(&supplier).await?;

        info!(supplier_id = %supplier.id, code, "Supplier added");
        Ok(supplier)
    }

    pub async fn add_warehouse(&self, code: &str, name: &str) -> ServiceResult<Warehouse> {
        validate_reference("warehouse code", code)?;
        let warehouse = Warehouse {
            id: new_id(),
            code: code.to_string(),
            name: name.to_string(),
        };
        let mut conn = self.pool.acquire().await?;
        CatalogRepository::new(&mut conn).insert_warehouse(&warehouse).await?;

        info!(warehouse_id = %warehouse.id, code, "Warehouse added");
        Ok(warehouse)
    }

    pub async fn product(&self, id: &str) -> ServiceResult<Product> {
        let mut conn = self.pool.acquire().await?;
        CatalogRepository::new(&mut conn)
            .product(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", id))
    }
}
