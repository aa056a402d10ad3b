//! Seeds a database with demo data: one organization, operators for each
//! role, a small catalog with stock, a till account and a few sales.
//!
//! Usage:
//! ```text
//! cargo run --bin seed -- [path/to/hilal.db]
//! ```

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use hilal_core::{
    CreateSaleRequest, IdentityVerifier, PaymentMethod, Role, SaleLineInput, TenantContext,
};
use hilal_db::{Database, DbConfig, LedgerError};

#[tokio::main]
async fn main() -> Result<(), LedgerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "hilal-demo.db".to_string());

    info!(path, "Seeding demo database");
    let db = Database::new(DbConfig::new(&path)).await?;

    let ctx = seed_org(&db, "Hilal Mobiles").await?;

    let directory = db.operators();
    directory
        .create_operator(&ctx, "Amir", Role::Admin, "0000")
        .await?;
    directory
        .create_operator(&ctx, "Olga", Role::Operator, "1234")
        .await?;
    directory
        .create_operator(&ctx, "Sami", Role::Staff, "5678")
        .await?;

    let akbar = seed_customer(&db, &ctx, "Akbar Khan").await?;
    let bano = seed_customer(&db, &ctx, "Bano Qudsia").await?;

    let phones = seed_product(&db, &ctx, "NOVA-X2", "Nova X2").await?;
    let chargers = seed_product(&db, &ctx, "CHG-01", "25W Charger").await?;
    seed_stock(&db, &ctx, &phones, &["IMEI-354881", "IMEI-354882"]).await?;
    seed_generic_stock(&db, &ctx, &chargers, 10).await?;

    let till = seed_account(&db, &ctx, "Till").await?;

    let olga = directory
        .verify(&ctx, "1234")
        .await
        .ok_or_else(|| LedgerError::Core(hilal_core::CoreError::unauthorized("seed PIN")))?;

    let phone_sale = db
        .ledger()
        .create_sale(
            &ctx,
            &olga,
            CreateSaleRequest {
                customer_id: akbar.clone(),
                lines: vec![SaleLineInput {
                    product_id: phones.clone(),
                    name: "Nova X2".to_string(),
                    quantity: 1,
                    unit_price_cents: 45_000,
                    serials: vec!["IMEI-354881".to_string()],
                    warranty_note: None,
                }],
                payment_method: PaymentMethod::Cash,
                amount_paid_cents: 20_000,
                account_id: Some(till.clone()),
                reference: None,
                notes: Some("balance due on delivery".to_string()),
            },
        )
        .await?;
    info!(invoice = %phone_sale.invoice_number, "Seeded partially paid phone sale");

    let accessory_sale = db
        .ledger()
        .create_sale(
            &ctx,
            &olga,
            CreateSaleRequest {
                customer_id: bano.clone(),
                lines: vec![SaleLineInput {
                    product_id: chargers.clone(),
                    name: "25W Charger".to_string(),
                    quantity: 2,
                    unit_price_cents: 1_500,
                    serials: vec![],
                    warranty_note: None,
                }],
                payment_method: PaymentMethod::Cash,
                amount_paid_cents: 3_000,
                account_id: Some(till.clone()),
                reference: None,
                notes: None,
            },
        )
        .await?;
    info!(invoice = %accessory_sale.invoice_number, "Seeded settled accessory sale");

    db.close().await;
    info!("Seed complete");
    Ok(())
}

async fn seed_org(db: &Database, name: &str) -> Result<TenantContext, LedgerError> {
    let org_id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO organizations (id, name, grace_period_days, settlement_tolerance_cents, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(&org_id)
    .bind(name)
    .bind(hilal_core::DEFAULT_GRACE_PERIOD_DAYS)
    .bind(hilal_core::DEFAULT_SETTLEMENT_TOLERANCE_CENTS)
    .bind(Utc::now())
    .execute(db.pool())
    .await?;
    Ok(TenantContext::new(org_id))
}

async fn seed_customer(
    db: &Database,
    ctx: &TenantContext,
    name: &str,
) -> Result<String, LedgerError> {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO customers (id, org_id, name, tax_id, credit_balance_cents, created_at, updated_at) \
         VALUES (?1, ?2, ?3, NULL, 0, ?4, ?4)",
    )
    .bind(&id)
    .bind(&ctx.org_id)
    .bind(name)
    .bind(Utc::now())
    .execute(db.pool())
    .await?;
    Ok(id)
}

async fn seed_product(
    db: &Database,
    ctx: &TenantContext,
    sku: &str,
    name: &str,
) -> Result<String, LedgerError> {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO products (id, org_id, sku, name, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(&id)
    .bind(&ctx.org_id)
    .bind(sku)
    .bind(name)
    .bind(Utc::now())
    .execute(db.pool())
    .await?;
    Ok(id)
}

async fn seed_account(
    db: &Database,
    ctx: &TenantContext,
    name: &str,
) -> Result<String, LedgerError> {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO accounts (id, org_id, name, balance_cents, created_at) VALUES (?1, ?2, ?3, 0, ?4)",
    )
    .bind(&id)
    .bind(&ctx.org_id)
    .bind(name)
    .bind(Utc::now())
    .execute(db.pool())
    .await?;
    Ok(id)
}

async fn seed_stock(
    db: &Database,
    ctx: &TenantContext,
    product_id: &str,
    serials: &[&str],
) -> Result<(), LedgerError> {
    for serial in serials {
        sqlx::query(
            "INSERT INTO instances (id, org_id, product_id, serial_number, status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, 'in_stock', ?5, ?5)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&ctx.org_id)
        .bind(product_id)
        .bind(serial)
        .bind(Utc::now())
        .execute(db.pool())
        .await?;
    }
    Ok(())
}

async fn seed_generic_stock(
    db: &Database,
    ctx: &TenantContext,
    product_id: &str,
    count: usize,
) -> Result<(), LedgerError> {
    for _ in 0..count {
        sqlx::query(
            "INSERT INTO instances (id, org_id, product_id, serial_number, status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, NULL, 'in_stock', ?4, ?4)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&ctx.org_id)
        .bind(product_id)
        .bind(Utc::now())
        .execute(db.pool())
        .await?;
    }
    Ok(())
}
