//! # Seed Data Generator
//!
//! Populates a development database with a catalog to receive against.
//!
//! ## Usage
//! ```bash
//! # Seed 40 products (default)
//! cargo run -p tally-db --bin seed
//!
//! # Custom amount
//! cargo run -p tally-db --bin seed -- --count 200
//!
//! # Specify database path
//! cargo run -p tally-db --bin seed -- --db ./data/tally.db
//! ```
//!
//! ## Generated Catalog
//! - Two warehouses (`WH1`, `WH2`)
//! - Three suppliers (`ACME`, `NORD`, `SUNF`)
//! - Products across categories, each with a product code whose tail feeds
//!   batch identifiers, a barcode, a price, a cost and a low-stock threshold

use std::env;
use tally_db::{Database, DbConfig};

/// Product categories for realistic test data
const CATEGORIES: &[(&str, &[&str])] = &[
    (
        "BEV",
        &[
            "Cola",
            "Lemon Soda",
            "Mineral Water",
            "Orange Juice",
            "Apple Juice",
            "Iced Tea",
            "Energy Drink",
            "Cold Brew",
        ],
    ),
    (
        "SNK",
        &[
            "Salted Chips",
            "Paprika Chips",
            "Pretzels",
            "Chocolate Bar",
            "Gummy Bears",
            "Oat Cookies",
            "Peanuts",
            "Rice Crackers",
        ],
    ),
    (
        "DRY",
        &[
            "Whole Milk",
            "Oat Milk",
            "Cheddar",
            "Mozzarella",
            "Butter",
            "Greek Yogurt",
            "Cream Cheese",
            "Eggs Dozen",
        ],
    ),
    (
        "GRC",
        &[
            "Spaghetti",
            "Basmati Rice",
            "Canned Tomatoes",
            "Chickpeas",
            "Peanut Butter",
            "Honey",
            "Flour",
            "Sugar",
        ],
    ),
    (
        "FRZ",
        &[
            "Vanilla Ice Cream",
            "Frozen Peas",
            "Fish Fingers",
            "Pizza Margherita",
            "Berry Mix",
            "Spinach",
            "Fries",
            "Dumplings",
        ],
    ),
];

const WAREHOUSES: &[(&str, &str)] = &[("WH1", "Main Warehouse"), ("WH2", "Overflow Depot")];

const SUPPLIERS: &[(&str, &str)] = &[
    ("ACME", "Acme Wholesale"),
    ("NORD", "Nordic Foods"),
    ("SUNF", "Sunfield Farms"),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut count: usize = 40;
    let mut db_path = String::from("./tally_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(40);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Tally POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of products to generate (default: 40)");
                println!("  -d, --db <PATH>    Database file path (default: ./tally_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Tally POS Seed Data Generator");
    println!("=============================");
    println!("Database: {}", db_path);
    println!("Products: {}", count);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let catalog = db.catalog();

    for (code, name) in WAREHOUSES {
        let warehouse = catalog.add_warehouse(code, name).await?;
        println!("  Warehouse {} -> {}", code, warehouse.id);
    }
    for (code, name) in SUPPLIERS {
        let supplier = catalog.add_supplier(code, name).await?;
        println!("  Supplier  {} -> {}", code, supplier.id);
    }

    println!();
    println!("Generating products...");

    let mut generated = 0;
    let start = std::time::Instant::now();

    'outer: for (category_idx, (category_code, names)) in CATEGORIES.iter().enumerate() {
        for (product_idx, name) in names.iter().enumerate() {
            if generated >= count {
                break 'outer;
            }
            let seed = category_idx * 100 + product_idx;
            let (code, barcode, price, cost, threshold) = product_fields(category_code, seed);

            if let Err(e) = catalog
                .add_product(&code, &barcode, name, price, cost, threshold)
                .await
            {
                eprintln!("Failed to insert {}: {}", code, e);
                continue;
            }
            generated += 1;
        }
    }

    println!();
    println!("✓ Generated {} products in {:?}", generated, start.elapsed());
    println!("✓ Seed complete!");

    db.close().await;
    Ok(())
}

/// Code, barcode, price, cost and low-stock threshold for one product.
fn product_fields(category: &str, seed: usize) -> (String, String, i64, i64, i64) {
    let code = format!("{}-{:05}", category, 10_000 + seed);

    // EAN-13 shape, checksum not computed
    let barcode = format!("590{:010}", seed);

    // $1.99 - $9.99
    let price_cents = 199 + ((seed * 17) % 800) as i64;

    // 60-80% of price
    let cost_cents = price_cents * (60 + (seed % 20) as i64) / 100;

    let threshold = 5 + (seed % 4) as i64 * 5;

    (code, barcode, price_cents, cost_cents, threshold)
}
