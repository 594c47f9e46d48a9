//! # Seed Data Generator
//!
//! Populates the database with a small directory, catalog and promotion set
//! for development.
//!
//! ## Usage
//! ```bash
//! # Seed ./comptoir_dev.db
//! cargo run -p comptoir-db --bin seed
//!
//! # Specify database path
//! cargo run -p comptoir-db --bin seed -- --db ./data/comptoir.db
//! ```
//!
//! ## Generated Data
//! - 3 companies, each with 2 users, plus one user without a company
//! - Products across four categories (paper, ink, furniture, coffee)
//! - A global promotion on one category, a company-scoped promotion on all
//!   products, and a product-list promotion that has already expired

use chrono::{Duration, Utc};
use comptoir_core::{
    CategoryRef, CompanyInfo, CompanyRef, DiscountPercentage, Money, ProductInfo, ProductRef,
    Promotion, PromotionDraft, PromotionScope, UserInfo, UserRef,
};
use comptoir_db::{Database, DbConfig};
use std::collections::BTreeSet;
use std::env;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// (category, [(product name, price in cents)])
const CATALOG: &[(&str, &[(&str, u64)])] = &[
    (
        "paper",
        &[
            ("Ramette A4 80g", 499),
            ("Ramette A3 80g", 1099),
            ("Bloc-notes quadrillé", 250),
            ("Enveloppes C5 x50", 780),
        ],
    ),
    (
        "ink",
        &[
            ("Toner noir HL-2350", 4990),
            ("Cartouche couleur 302", 2450),
            ("Stylo bille bleu x10", 390),
        ],
    ),
    (
        "furniture",
        &[
            ("Chaise ergonomique", 18900),
            ("Lampe de bureau LED", 3490),
            ("Caisson 3 tiroirs", 12900),
        ],
    ),
    (
        "coffee",
        &[
            ("Café grains 1kg", 1890),
            ("Capsules x50", 1590),
            ("Gobelets carton x100", 690),
        ],
    ),
];

const COMPANIES: &[(&str, &str, &[(&str, &str)])] = &[
    ("acme", "Acme SARL", &[("alice", "Alice Martin"), ("bruno", "Bruno Petit")]),
    ("globex", "Globex SAS", &[("chloe", "Chloé Durand"), ("david", "David Roux")]),
    ("initech", "Initech", &[("emma", "Emma Leroy"), ("fabien", "Fabien Morel")]),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,comptoir=debug,sqlx=warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let mut db_path = String::from("./comptoir_dev.db");

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
                println!("Comptoir Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./comptoir_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            other => warn!(argument = other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    info!(database = %db_path, "Seeding database");
    let db = Database::new(DbConfig::new(&db_path)).await?;

    let existing = db.catalog().count().await?;
    if existing > 0 {
        warn!(products = existing, "Database already seeded, skipping");
        println!("Delete the database file to regenerate.");
        return Ok(());
    }

    let now = Utc::now();

    for (company_id, company_name, users) in COMPANIES {
        db.directory()
            .insert_company(&CompanyInfo {
                id: CompanyRef::from(*company_id),
                name: company_name.to_string(),
                created_at: now,
            })
            .await?;

        for (user_id, user_name) in users.iter() {
            db.directory()
                .insert_user(&UserInfo {
                    id: UserRef::from(*user_id),
                    name: user_name.to_string(),
                    company_ref: Some(CompanyRef::from(*company_id)),
                })
                .await?;
        }
    }
    db.directory()
        .insert_user(&UserInfo {
            id: UserRef::from("gaelle"),
            name: "Gaëlle Blanc".to_string(),
            company_ref: None,
        })
        .await?;

    let mut products = 0;
    for (category, items) in CATALOG {
        for (index, (name, cents)) in items.iter().enumerate() {
            db.catalog()
                .insert_product(&ProductInfo {
                    id: ProductRef::new(format!("{}-{:02}", category, index + 1)),
                    name: name.to_string(),
                    price: Money::from_cents(*cents),
                    category_ref: Some(CategoryRef::from(*category)),
                    brand_ref: None,
                })
                .await?;
            products += 1;
        }
    }

    let promotions = [
        PromotionDraft {
            scope: PromotionScope::Global,
            name: "Rentrée papeterie".to_string(),
            description: Some("Toute la gamme papier".to_string()),
            discount_percentage: DiscountPercentage::from_whole(15)?,
            start_date: now - Duration::days(3),
            end_date: Some(now + Duration::days(30)),
            is_active: true,
            applies_to_all_products: false,
            product_refs: BTreeSet::new(),
            category_refs: BTreeSet::from([CategoryRef::from("paper")]),
        },
        PromotionDraft {
            scope: PromotionScope::Company(CompanyRef::from("acme")),
            name: "Remise contrat Acme".to_string(),
            description: None,
            discount_percentage: "7.5".parse()?,
            start_date: now - Duration::days(90),
            end_date: None,
            is_active: true,
            applies_to_all_products: true,
            product_refs: BTreeSet::new(),
            category_refs: BTreeSet::new(),
        },
        PromotionDraft {
            scope: PromotionScope::Global,
            name: "Déstockage mobilier".to_string(),
            description: None,
            discount_percentage: DiscountPercentage::from_whole(30)?,
            start_date: now - Duration::days(60),
            end_date: Some(now - Duration::days(30)),
            is_active: true,
            applies_to_all_products: false,
            product_refs: BTreeSet::from([
                ProductRef::from("furniture-01"),
                ProductRef::from("furniture-03"),
            ]),
            category_refs: BTreeSet::new(),
        },
    ];

    for draft in promotions {
        let promotion = Promotion::from_draft(draft, now)?;
        db.promotions().insert(&promotion).await?;
    }

    info!(
        companies = COMPANIES.len(),
        users = db.directory().count_users().await?,
        products,
        "Seed complete"
    );

    Ok(())
}
