//! Shared fixtures for the integration tests: an in-memory database plus
//! seed helpers that write rows directly, bypassing the engines under test.

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::pool::{Database, DbConfig};
use hilal_core::{
    CreateSaleRequest, Identity, PaymentMethod, Role, SaleLineInput, TenantContext,
    DEFAULT_GRACE_PERIOD_DAYS, DEFAULT_SETTLEMENT_TOLERANCE_CENTS,
};

pub(crate) async fn test_db() -> Database {
    Database::new(DbConfig::in_memory())
        .await
        .expect("in-memory database")
}

pub(crate) async fn seed_org(db: &Database) -> TenantContext {
    let org_id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO organizations (id, name, grace_period_days, settlement_tolerance_cents, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(&org_id)
    .bind("Hilal Mobiles")
    .bind(DEFAULT_GRACE_PERIOD_DAYS)
    .bind(DEFAULT_SETTLEMENT_TOLERANCE_CENTS)
    .bind(Utc::now())
    .execute(db.pool())
    .await
    .expect("seed organization");

    TenantContext::new(org_id)
}

pub(crate) async fn seed_customer(
    db: &Database,
    ctx: &TenantContext,
    name: &str,
    credit_cents: i64,
) -> String {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO customers (id, org_id, name, tax_id, credit_balance_cents, created_at, updated_at) \
         VALUES (?1, ?2, ?3, NULL, ?4, ?5, ?5)",
    )
    .bind(&id)
    .bind(&ctx.org_id)
    .bind(name)
    .bind(credit_cents)
    .bind(now)
    .execute(db.pool())
    .await
    .expect("seed customer");
    id
}

pub(crate) async fn seed_product(
    db: &Database,
    ctx: &TenantContext,
    sku: &str,
    name: &str,
) -> String {
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
    .await
    .expect("seed product");
    id
}

pub(crate) async fn seed_account(db: &Database, ctx: &TenantContext, name: &str) -> String {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO accounts (id, org_id, name, balance_cents, created_at) VALUES (?1, ?2, ?3, 0, ?4)",
    )
    .bind(&id)
    .bind(&ctx.org_id)
    .bind(name)
    .bind(Utc::now())
    .execute(db.pool())
    .await
    .expect("seed account");
    id
}

/// Seeds `count` generic in-stock units with staggered intake times, so FIFO
/// order is deterministic. Returns the ids oldest first.
pub(crate) async fn seed_generic_stock(
    db: &Database,
    ctx: &TenantContext,
    product_id: &str,
    count: usize,
) -> Vec<String> {
    let base = Utc::now() - Duration::seconds(count as i64 + 60);
    let mut ids = Vec::with_capacity(count);
    for i in 0..count {
        let id = Uuid::new_v4().to_string();
        let intake = base + Duration::seconds(i as i64);
        sqlx::query(
            "INSERT INTO instances (id, org_id, product_id, serial_number, status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, NULL, 'in_stock', ?4, ?4)",
        )
        .bind(&id)
        .bind(&ctx.org_id)
        .bind(product_id)
        .bind(intake)
        .execute(db.pool())
        .await
        .expect("seed generic instance");
        ids.push(id);
    }
    ids
}

/// Seeds one in-stock unit per serial, staggered like [`seed_generic_stock`].
pub(crate) async fn seed_serialized_stock(
    db: &Database,
    ctx: &TenantContext,
    product_id: &str,
    serials: &[&str],
) -> Vec<String> {
    let base = Utc::now() - Duration::seconds(serials.len() as i64 + 60);
    let mut ids = Vec::with_capacity(serials.len());
    for (i, serial) in serials.iter().enumerate() {
        let id = Uuid::new_v4().to_string();
        let intake = base + Duration::seconds(i as i64);
        sqlx::query(
            "INSERT INTO instances (id, org_id, product_id, serial_number, status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, 'in_stock', ?5, ?5)",
        )
        .bind(&id)
        .bind(&ctx.org_id)
        .bind(product_id)
        .bind(serial)
        .bind(intake)
        .execute(db.pool())
        .await
        .expect("seed serialized instance");
        ids.push(id);
    }
    ids
}

pub(crate) fn admin() -> Identity {
    Identity {
        id: "op-admin".to_string(),
        name: "Amir Admin".to_string(),
        role: Role::Admin,
    }
}

pub(crate) fn operator() -> Identity {
    Identity {
        id: "op-operator".to_string(),
        name: "Olga Operator".to_string(),
        role: Role::Operator,
    }
}

pub(crate) fn staff() -> Identity {
    Identity {
        id: "op-staff".to_string(),
        name: "Sami Staff".to_string(),
        role: Role::Staff,
    }
}

pub(crate) fn generic_line(product_id: &str, name: &str, quantity: i64, price: i64) -> SaleLineInput {
    SaleLineInput {
        product_id: product_id.to_string(),
        name: name.to_string(),
        quantity,
        unit_price_cents: price,
        serials: vec![],
        warranty_note: None,
    }
}

pub(crate) fn serialized_line(
    product_id: &str,
    name: &str,
    price: i64,
    serials: &[&str],
) -> SaleLineInput {
    SaleLineInput {
        product_id: product_id.to_string(),
        name: name.to_string(),
        quantity: serials.len() as i64,
        unit_price_cents: price,
        serials: serials.iter().map(|s| s.to_string()).collect(),
        warranty_note: None,
    }
}

/// A sale request with nothing settled at the counter.
pub(crate) fn unpaid_sale(customer_id: &str, lines: Vec<SaleLineInput>) -> CreateSaleRequest {
    CreateSaleRequest {
        customer_id: customer_id.to_string(),
        lines,
        payment_method: PaymentMethod::Cash,
        amount_paid_cents: 0,
        account_id: None,
        reference: None,
        notes: None,
    }
}
