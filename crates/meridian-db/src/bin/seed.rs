//! # Seed Data Generator
//!
//! Populates a development database with shops, a cashier user and a small
//! catalog of products with variants.
//!
//! ## Usage
//! ```bash
//! cargo run -p meridian-db --bin seed
//!
//! # Specify database path
//! cargo run -p meridian-db --bin seed -- --db ./data/meridian.db
//! ```

use std::env;

use meridian_db::repository::{
    NewProduct, NewVariant, ProductRepository, ShopRepository, VariantRepository,
};
use meridian_db::{Database, DbConfig};

const SHOPS: &[(&str, &str)] = &[("MAIN", "Main Street"), ("EAST", "East Side")];

/// (product sku, product name, variants as (suffix, price cents, stock))
const CATALOG: &[(&str, &str, &[(&str, i64, i64)])] = &[
    (
        "TEE",
        "Logo T-Shirt",
        &[("S", 1_499, 40), ("M", 1_499, 60), ("L", 1_599, 50), ("XL", 1_699, 25)],
    ),
    (
        "MUG",
        "Ceramic Mug",
        &[("STD", 899, 120), ("XL", 1_099, 45)],
    ),
    (
        "CAP",
        "Baseball Cap",
        &[("STD", 1_299, 80)],
    ),
    (
        "HOD",
        "Zip Hoodie",
        &[("M", 3_999, 30), ("L", 3_999, 30), ("XL", 4_199, 15)],
    ),
    (
        "BTL",
        "Steel Bottle",
        &[("500ML", 1_899, 70), ("750ML", 2_199, 55)],
    ),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./meridian_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Meridian POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./meridian_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Meridian POS Seed Data Generator");
    println!("===================================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.shops().list().await?;
    if !existing.is_empty() {
        println!("⚠ Database already has {} shops", existing.len());
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let mut conn = db.pool().acquire().await?;

    let mut shop_ids = Vec::new();
    for &(code, name) in SHOPS {
        let shop_id = ShopRepository::insert(&mut conn, Some(code), name).await?;
        shop_ids.push(shop_id);
        println!("  Shop {code}: {name}");
    }

    for (idx, shop_id) in shop_ids.iter().enumerate() {
        sqlx::query("INSERT INTO users (name, shop_id) VALUES (?, ?)")
            .bind(format!("cashier-{}", idx + 1))
            .bind(shop_id)
            .execute(&mut *conn)
            .await?;
    }

    let mut products = 0;
    let mut variants = 0;

    // Every shop gets the full catalog under shop-prefixed SKUs.
    for (shop_idx, shop_id) in shop_ids.iter().enumerate() {
        let (code, _) = SHOPS[shop_idx];

        for (sku, name, sizes) in CATALOG {
            let product_id = ProductRepository::insert(
                &mut conn,
                &NewProduct {
                    shop_id: *shop_id,
                    sku: format!("{code}-{sku}"),
                    name: (*name).to_string(),
                    is_active: true,
                },
            )
            .await?;
            products += 1;

            for (suffix, price_cents, stock_level) in *sizes {
                VariantRepository::insert(
                    &mut conn,
                    &NewVariant {
                        product_id,
                        sku: format!("{code}-{sku}-{suffix}"),
                        price_cents: *price_cents,
                        stock_level: *stock_level,
                        is_active: true,
                    },
                )
                .await?;
                variants += 1;
            }

            ProductRepository::refresh_stock(&mut conn, &[product_id]).await?;
        }
    }

    println!();
    println!(
        "✓ Seed complete: {} shops, {} products, {} variants",
        shop_ids.len(),
        products,
        variants
    );

    Ok(())
}
