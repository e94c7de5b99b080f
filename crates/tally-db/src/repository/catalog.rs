//! # Catalog Repository
//!
//! Products, suppliers and warehouses. The engine only reads them; inserts
//! exist for seeding and tests.

use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use tally_core::{Product, Supplier, Warehouse};

pub struct CatalogRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> CatalogRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        CatalogRepository { conn }
    }

    pub async fn product(&mut self, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, code, barcode, name, price_cents, cost_cents,
                   low_stock_threshold, created_at
            FROM products
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(product)
    }

    /// Looks a product up by barcode, falling back to id.
    pub async fn product_by_barcode_or_id(&mut self, key: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, code, barcode, name, price_cents, cost_cents,
                   low_stock_threshold, created_at
            FROM products
            WHERE barcode = ?1 OR id = ?1
            ORDER BY barcode = ?1 DESC
            LIMIT 1
            "#,
        )
        .bind(key)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(product)
    }

    pub async fn supplier(&mut self, id: &str) -> DbResult<Option<Supplier>> {
        let supplier = sqlx::query_as::<_, Supplier>("SELECT id, code, name FROM suppliers WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(supplier)
    }

    pub async fn warehouse(&mut self, id: &str) -> DbResult<Option<Warehouse>> {
        let warehouse = sqlx::query_as::<_, Warehouse>("SELECT id, code, name FROM warehouses WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(warehouse)
    }

    pub async fn insert_product(&mut self, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, code = %product.code, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, code, barcode, name, price_cents, cost_cents,
                low_stock_threshold, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&product.id)
        .bind(&product.code)
        .bind(&product.barcode)
        .bind(&product.name)
        .bind(product.price_cents)
        .bind(product.cost_cents)
        .bind(product.low_stock_threshold)
        .bind(product.created_at)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    pub async fn insert_supplier(&mut self, supplier: &Supplier) -> DbResult<()> {
        debug!(id = %supplier.id, code = %supplier.code, "Inserting supplier");

        sqlx::query("INSERT INTO suppliers (id, code, name) VALUES (?1, ?2, ?3)")
            .bind(&supplier.id)
            .bind(&supplier.code)
            .bind(&supplier.name)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    pub async fn insert_warehouse(&mut self, warehouse: &Warehouse) -> DbResult<()> {
        debug!(id = %warehouse.id, code = %warehouse.code, "Inserting warehouse");

        sqlx::query("INSERT INTO warehouses (id, code, name) VALUES (?1, ?2, ?3)")
            .bind(&warehouse.id)
            .bind(&warehouse.code)
            .bind(&warehouse.name)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }
}
