use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::{FromRow, Pool, Postgres};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{FornadaError, FornadaResult};

pub type DbPool = Pool<Postgres>;

pub async fn init_pool_with_options(opts: PgConnectOptions) -> FornadaResult<DbPool> {
    // connect_lazy_with returns the pool immediately. It does not validate connection.
    Ok(PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .idle_timeout(std::time::Duration::from_secs(120))
        .max_lifetime(std::time::Duration::from_secs(300))
        .connect_lazy_with(opts))
}

pub async fn init_pool(database_url: &str) -> FornadaResult<DbPool> {
    let opts = PgConnectOptions::from_str(database_url)
        .map_err(|e| FornadaError::Internal(format!("Invalid DB URL: {}", e)))?
        .ssl_mode(PgSslMode::Prefer);

    init_pool_with_options(opts).await
}

pub async fn init_database(pool: &DbPool) -> FornadaResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    ensure_seeds(pool).await?;
    Ok(())
}

/// Provisions the out-of-band admin account on first boot. Idempotent.
async fn ensure_seeds(pool: &DbPool) -> FornadaResult<()> {
    let admin_phone = std::env::var("ADMIN_PHONE").unwrap_or_else(|_| "11999990000".to_string());

    let admin_exists: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM users WHERE phone = $1 AND role = 'ADMIN'")
            .bind(&admin_phone)
            .fetch_one(pool)
            .await
            .unwrap_or((0,));

    if admin_exists.0 == 0 {
        let password = std::env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "admin".to_string());
        let hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;
        sqlx::query(
            "INSERT INTO users (name, phone, role, password_hash)
             VALUES ($1, $2, 'ADMIN', $3) ON CONFLICT (phone) DO NOTHING",
        )
        .bind("Administrator")
        .bind(&admin_phone)
        .bind(hash)
        .execute(pool)
        .await?;
        tracing::info!("Seeded admin account for phone {}", admin_phone);
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "user_role", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "order_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Delivery,
    Pickup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "payment_method", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Pix,
    CreditCard,
    DebitCard,
    Cash,
}

impl PaymentMethod {
    /// Display label for staff views. Exhaustive so a new method cannot
    /// silently fall through.
    pub fn label(self) -> &'static str {
        match self {
            PaymentMethod::Pix => "Pix",
            PaymentMethod::CreditCard => "Credit card",
            PaymentMethod::DebitCard => "Debit card",
            PaymentMethod::Cash => "Cash",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "order_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Preparing,
    Delivering,
    ReadyToPickup,
    Completed,
    Canceled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Canceled)
    }

    /// Legal successors from this status. The branch after PREPARING follows
    /// the order's type, not staff choice.
    pub fn allowed_next(self, order_type: OrderType) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Pending => &[OrderStatus::Preparing, OrderStatus::Canceled],
            OrderStatus::Preparing => match order_type {
                OrderType::Delivery => &[OrderStatus::Delivering],
                OrderType::Pickup => &[OrderStatus::ReadyToPickup],
            },
            OrderStatus::Delivering => &[OrderStatus::Completed],
            OrderStatus::ReadyToPickup => &[OrderStatus::Completed],
            OrderStatus::Completed | OrderStatus::Canceled => &[],
        }
    }

    pub fn can_transition_to(self, next: OrderStatus, order_type: OrderType) -> bool {
        self.allowed_next(order_type).contains(&next)
    }
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub promo_price: Option<Decimal>,
    pub image_url: Option<String>,
    pub category_id: Uuid,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// The unit price the storefront charges: the promo price wins only when
    /// present and strictly lower than the base price.
    pub fn effective_price(&self) -> Decimal {
        effective_price(self.price, self.promo_price)
    }
}

pub fn effective_price(price: Decimal, promo_price: Option<Decimal>) -> Decimal {
    match promo_price {
        Some(promo) if promo < price => promo,
        _ => price,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProductOption {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProductFlavor {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub price: Decimal,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub role: Role,
    pub password_hash: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub address: Option<String>,
    pub total: Decimal,
    pub scheduled_to: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    // Snapshot at order time. Never re-read from the catalog.
    pub product_name: String,
    pub quantity: i32,
    pub price: Decimal,
    pub chosen_option: Option<String>,
    pub observation: Option<String>,
    pub flavor: Option<String>,
}
