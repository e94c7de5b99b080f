//! Shared fixtures for the service tests: an in-memory database with a
//! small catalog and one principal per role.

use tally_core::purchase::{NewPurchaseOrder, NewPurchaseOrderItem};
use tally_core::{
    NewQcRecord, Principal, Product, PurchaseOrderDetail, QcStatus, Role, StockLot, Supplier,
    Warehouse,
};

use crate::{Database, DbConfig};

pub(crate) struct Fixture {
    pub db: Database,
    pub warehouse: Warehouse,
    pub supplier: Supplier,
    /// Barcode "A", price 100, cost 75, low-stock threshold 5.
    pub product_a: Product,
    /// Barcode "B", price 250, cost 150, low-stock threshold 5.
    pub product_b: Product,
    pub manager: Principal,
    pub inspector: Principal,
    pub cashier: Principal,
}

pub(crate) async fn fixture() -> Fixture {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let catalog = db.catalog();

    let warehouse = catalog.add_warehouse("WH1", "Main Warehouse").await.unwrap();
    let supplier = catalog.add_supplier("ACME", "Acme Wholesale").await.unwrap();
    let product_a = catalog
        .add_product("PRD-00123", "A", "Product A", 100, 75, 5)
        .await
        .unwrap();
    let product_b = catalog
        .add_product("PRD-00456", "B", "Product B", 250, 150, 5)
        .await
        .unwrap();

    Fixture {
        db,
        warehouse,
        supplier,
        product_a,
        product_b,
        manager: Principal::new("manager-1", Role::Manager),
        inspector: Principal::new("inspector-1", Role::Inspector),
        cashier: Principal::new("cashier-1", Role::Cashier),
    }
}

impl Fixture {
    /// A submitted order for `(product, quantity, unit cost)` lines.
    pub fn order(&self, po_number: &str, lines: &[(&Product, i64, i64)]) -> NewPurchaseOrder {
        NewPurchaseOrder {
            po_number: po_number.to_string(),
            supplier_id: self.supplier.id.clone(),
            warehouse_id: self.warehouse.id.clone(),
            submit: true,
            notes: None,
            items: lines
                .iter()
                .map(|(product, quantity, cost)| NewPurchaseOrderItem {
                    product_id: product.id.clone(),
                    quantity: *quantity,
                    unit_cost_cents: *cost,
                    batch_id: None,
                    expiry_date: None,
                })
                .collect(),
        }
    }

    /// Creates and confirms an order; returns it with its lots in line order.
    pub async fn receive(&self, po_number: &str, lines: &[(&Product, i64, i64)]) -> (PurchaseOrderDetail, Vec<StockLot>) {
        let orders = self.db.purchase_orders();
        let created = orders
            .create(&self.manager, self.order(po_number, lines))
            .await
            .unwrap();
        let detail = orders.confirm(&self.manager, &created.order.id).await.unwrap();

        let mut lots = Vec::new();
        for item in &detail.items {
            let batch_id = item.batch_id.clone().unwrap();
            lots.push(self.db.lots().by_batch(&batch_id).await.unwrap());
        }
        (detail, lots)
    }

    /// An inspection report for `lot` with the given split.
    pub fn report(&self, lot: &StockLot, verdict: QcStatus, passed: i64, failed: i64) -> NewQcRecord {
        NewQcRecord {
            batch_id: lot.batch_id.clone(),
            product_id: lot.product_id.clone(),
            supplier_id: lot.supplier_id.clone(),
            warehouse_id: lot.warehouse_id.clone(),
            verdict,
            total_quantity: passed + failed,
            passed_quantity: passed,
            failed_quantity: failed,
            attachments: vec!["https://files.example/qc/photo-1.jpg".to_string()],
            notes: None,
        }
    }

    /// Adjudicates `lot` and panics on failure.
    pub async fn adjudicate(&self, lot: &StockLot, verdict: QcStatus, passed: i64, failed: i64) {
        self.db
            .qc()
            .adjudicate(&self.inspector, self.report(lot, verdict, passed, failed))
            .await
            .unwrap();
    }

    pub async fn stock_total(&self, product: &Product) -> i64 {
        self.db
            .stock()
            .get(&product.id, &self.warehouse.id)
            .await
            .unwrap()
            .total_quantity
    }

    /// Ledger net quantity for `product`, straight from the table.
    pub async fn ledger_net(&self, product: &Product) -> i64 {
        let mut conn = self.db.pool().acquire().await.unwrap();
        crate::repository::LedgerRepository::new(&mut conn)
            .net_quantity(&product.id, &self.warehouse.id)
            .await
            .unwrap()
    }

    /// Sum of remaining quantity over sellable lots.
    pub async fn lots_remaining(&self, product: &Product) -> i64 {
        let mut conn = self.db.pool().acquire().await.unwrap();
        crate::repository::LotRepository::new(&mut conn)
            .sellable(&product.id, &self.warehouse.id)
            .await
            .unwrap()
            .iter()
            .map(|l| l.remaining_quantity)
            .sum()
    }

    /// Asserts ledger, aggregate and lots agree for `product`.
    pub async fn assert_conserved(&self, product: &Product) {
        let stock = self.stock_total(product).await;
        assert_eq!(self.ledger_net(product).await, stock, "ledger vs stock");
        assert_eq!(self.lots_remaining(product).await, stock, "lots vs stock");
    }
}
