//! # Demo Tenant Seeder
//!
//! Populates a ledger database with a small demo tenant: a handful of
//! products with opening stock, a chart of accounts and an opening entry.
//!
//! ## Usage
//! ```bash
//! # Seed ./tally.db (or whatever TALLY_CONFIG / TALLY_DATABASE_PATH say)
//! cargo run -p tally-engine --bin seed
//!
//! # Specify database path and tenant
//! cargo run -p tally-engine --bin seed -- --db ./data/demo.db --tenant acme
//!
//! # More log output
//! RUST_LOG=tally_engine=debug cargo run -p tally-engine --bin seed
//! ```
//!
//! Running it twice against the same database is safe: existing codes are
//! reported and skipped.

use std::env;
use std::path::PathBuf;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tally_core::{
    AccountKind, AggregateRef, JournalEntryRequest, Money, MovementRequest, MovementType,
    NewAccount, NewProduct,
};
use tally_db::{LedgerConfig, SqliteStore};
use tally_engine::{EngineError, LedgerEngine, RequestContext};

const DEFAULT_TENANT: &str = "demo";
const ACTOR: &str = "seed";

/// (code, name, unit price, cost price, minimum stock, opening stock)
const PRODUCTS: &[(&str, &str, i64, i64, i64, i64)] = &[
    ("BEV-COLA-330", "Cola 330ml", 199, 120, 24, 120),
    ("BEV-WATER-500", "Still Water 500ml", 99, 40, 48, 240),
    ("SNK-CHIPS-150", "Salted Chips 150g", 249, 150, 12, 60),
    ("DRY-MILK-1L", "Whole Milk 1L", 149, 95, 20, 18),
    ("GRC-RICE-1KG", "Long Grain Rice 1kg", 329, 210, 10, 45),
];

/// (code, name, kind)
const ACCOUNTS: &[(&str, &str, AccountKind)] = &[
    ("1000", "Cash", AccountKind::Asset),
    ("1200", "Inventory", AccountKind::Asset),
    ("2000", "Accounts Payable", AccountKind::Liability),
    ("3000", "Owner Equity", AccountKind::Equity),
    ("4000", "Sales", AccountKind::Revenue),
    ("5000", "Cost of Goods Sold", AccountKind::Expense),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let mut db_path: Option<PathBuf> = None;
    let mut tenant = DEFAULT_TENANT.to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if let Some(path) = args.get(i + 1) {
                    db_path = Some(PathBuf::from(path));
                    i += 1;
                }
            }
            "--tenant" | "-t" => {
                if let Some(id) = args.get(i + 1) {
                    tenant = id.clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Tally Demo Seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>        Database file path (default: from config)");
                println!("  -t, --tenant <ID>      Tenant to seed (default: demo)");
                println!("  -h, --help             Show this help message");
                return Ok(());
            }
            other => warn!(arg = %other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    let mut config = LedgerConfig::load(None)?;
    if let Some(path) = db_path {
        config.database.path = path;
    }

    info!(path = ?config.database.path, tenant = %tenant, "Seeding ledger");
    let store = SqliteStore::connect(config.db_config()).await?;
    let engine = LedgerEngine::new(store, config.engine.clone());
    let ctx = RequestContext::new();

    // Products with opening stock
    let mut seeded_products = Vec::new();
    for &(code, name, unit_price, cost_price, minimum_stock, opening) in PRODUCTS {
        let new = NewProduct {
            code: code.to_string(),
            name: name.to_string(),
            unit_price: Money::from_minor(unit_price),
            cost_price: Money::from_minor(cost_price),
            minimum_stock,
        };

        let product = match engine.create_product(&tenant, new).await {
            Ok(product) => product,
            Err(EngineError::DuplicateKey { .. }) => {
                warn!(code = %code, "Product already exists, skipping");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let request = MovementRequest::new(&product.id, MovementType::In, opening, ACTOR)
            .with_unit_cost(Money::from_minor(cost_price))
            .with_reference("OPENING")
            .with_note("Opening stock");
        engine.apply_movement(&ctx, &tenant, request).await?;
        seeded_products.push((product, opening * cost_price));
    }

    // Chart of accounts
    let mut seeded_accounts = Vec::new();
    for &(code, name, kind) in ACCOUNTS {
        let new = NewAccount {
            code: code.to_string(),
            name: name.to_string(),
            kind,
        };
        match engine.create_account(&tenant, new).await {
            Ok(account) => seeded_accounts.push(account),
            Err(EngineError::DuplicateKey { .. }) => {
                warn!(code = %code, "Account already exists, skipping");
            }
            Err(e) => return Err(e.into()),
        }
    }

    // Opening entry: the stock was paid for by the owner
    let inventory_value: i64 = seeded_products.iter().map(|(_, value)| value).sum();
    let account_id = |code: &str| {
        seeded_accounts
            .iter()
            .find(|a| a.code == code)
            .map(|a| a.id.clone())
    };
    if let (Some(inventory), Some(equity)) = (account_id("1200"), account_id("3000")) {
        if inventory_value > 0 {
            let entry = JournalEntryRequest::new(ACTOR)
                .with_description("Opening inventory")
                .with_reference("OPENING")
                .debit(&inventory, inventory_value)
                .credit(&equity, inventory_value);
            engine.post_journal_entry(&ctx, &tenant, entry).await?;
        }
    }

    // Summary
    for (product, _) in &seeded_products {
        let on_hand = engine
            .get_balance(&tenant, &AggregateRef::Product(product.id.clone()), None)
            .await?;
        info!(code = %product.code, on_hand, "Product seeded");
    }
    for account in &seeded_accounts {
        let balance = engine
            .get_balance(&tenant, &AggregateRef::Account(account.id.clone()), None)
            .await?;
        info!(code = %account.code, balance = %Money::from_minor(balance), "Account seeded");
    }

    let low = engine.low_stock_products(&tenant).await?;
    for product in &low {
        warn!(code = %product.code, on_hand = product.quantity_on_hand, minimum = product.minimum_stock, "Below minimum stock");
    }

    let totals = engine.trial_balance(&tenant).await?;
    info!(
        debit = %totals.debit,
        credit = %totals.credit,
        balanced = totals.is_balanced(),
        "Seed complete"
    );

    Ok(())
}
