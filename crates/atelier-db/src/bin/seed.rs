//! # Demo Catalog Seeder
//!
//! Populates a database with the leather bag demo catalog, generates its
//! variants and prints their BOMs and producibility.
//!
//! ## Usage
//! ```bash
//! # In-memory run, nothing persisted
//! cargo run -p atelier-db --bin seed
//!
//! # Persist to a file
//! cargo run -p atelier-db --bin seed -- --db ./data/atelier.db
//!
//! # Use a specific config file
//! cargo run -p atelier-db --bin seed -- --config ./atelier.toml
//! ```
//!
//! ## Output
//! ```text
//! BAG-BLA-LAR   price 140.00   weight 1.5 kg   producible 3
//!     Leather          2.8 m
//!     Thread           3 m
//!     Brass Buckle     1 pcs
//! ```

use std::env;
use std::path::PathBuf;

use atelier_db::demo::seed_leather_bag;
use atelier_db::{init_tracing, Database, DbConfig, EngineConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Atelier Demo Seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>       Database file path (default: in-memory)");
                println!("  -c, --config <PATH>   Engine config file (default: platform config dir)");
                println!("  -h, --help            Show this help message");
                return Ok(());
            }
            other => {
                eprintln!("Ignoring unknown argument: {}", other);
            }
        }
        i += 1;
    }

    let config = EngineConfig::load_or_default(config_path);
    init_tracing(&config.logging.filter);

    let db_config = match db_path {
        Some(path) => DbConfig::new(path).max_connections(config.database.max_connections),
        None => DbConfig::in_memory(),
    };

    println!("Atelier Demo Seeder");
    println!("===================");
    println!("Database: {}", db_config.database_path.display());
    println!();

    let db = Database::new(db_config).await?;

    if db.products().count().await? > 0 {
        println!("Database already has products; delete it to reseed.");
        return Ok(());
    }

    let bag = seed_leather_bag(&db).await?;
    println!("✓ Seeded {} ({})", bag.product.name, bag.product.sku_prefix);

    let created = db
        .generator()
        .with_format(config.sku_format())
        .generate(&bag.product.id, None)
        .await?;
    println!("✓ Generated {} variants", created.len());
    println!();

    let pricing = db.pricing();
    let bom = db.bom();
    for variant in &created {
        let effective = pricing.effective(&variant.id).await?;
        let units = bom.producibility(&variant.id).await?;
        println!(
            "{:<14} price {:>8}   weight {} kg   producible {}",
            variant.sku, effective.price, effective.weight, units
        );

        let resolved = bom.resolve_variant(&variant.id).await?;
        for line in &resolved.lines {
            println!(
                "    {:<20} {} {}{}",
                line.material_name,
                line.quantity.normalize(),
                line.unit,
                if line.required { "" } else { "  (optional)" }
            );
        }
    }

    println!();
    println!("✓ Seed complete!");

    db.close().await;
    Ok(())
}
