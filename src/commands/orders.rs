use crate::db::{DbPool, Order, OrderItem, OrderStatus, OrderType, PaymentMethod};
use crate::error::{FornadaError, FornadaResult};
use crate::middleware::auth::Claims;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::{Extension, Json};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::error::ErrorKind;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Checkout
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub customer_name: String,
    pub customer_phone: String,
    pub address: Option<String>,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub payment_method: PaymentMethod,
    pub total: Decimal,
    pub items: Vec<CheckoutItem>,
    #[serde(default)]
    pub scheduled_to: Option<String>,
}

/// One cart line as submitted. `price` is the unit price the client computed
/// at selection time (effective price + flavor + option) and is snapshotted
/// verbatim; `opcao`/`observacao` are the historical wire names for the
/// chosen add-on label and the free-text note.
#[derive(Debug, Deserialize)]
pub struct CheckoutItem {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub quantity: i32,
    #[serde(default)]
    pub opcao: Option<String>,
    #[serde(default)]
    pub observacao: Option<String>,
    #[serde(default)]
    pub flavor: Option<String>,
}

/// Accepts RFC 3339 or the bare `YYYY-MM-DDTHH:MM[:SS]` a datetime-local
/// input produces; the latter is read in server-local time.
pub fn parse_scheduled_to(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Local
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc));
        }
    }
    None
}

/// Rejects the submission before any write. Returns the parsed schedule.
pub fn validate_checkout(
    req: &CreateOrderRequest,
    now: DateTime<Utc>,
) -> FornadaResult<Option<DateTime<Utc>>> {
    if req.customer_name.trim().is_empty() {
        return Err(FornadaError::Validation("Name is required.".to_string()));
    }
    if req.customer_phone.trim().is_empty() {
        return Err(FornadaError::Validation("Phone is required.".to_string()));
    }
    if req.order_type == OrderType::Delivery
        && req.address.as_deref().map(str::trim).unwrap_or("").is_empty()
    {
        return Err(FornadaError::Validation(
            "Delivery address is required.".to_string(),
        ));
    }
    if req.items.is_empty() {
        return Err(FornadaError::Validation("The cart is empty.".to_string()));
    }
    for item in &req.items {
        if item.quantity < 1 {
            return Err(FornadaError::Validation(
                "Item quantity must be at least 1.".to_string(),
            ));
        }
        if item.price < Decimal::ZERO {
            return Err(FornadaError::Validation(
                "Item price cannot be negative.".to_string(),
            ));
        }
    }

    let computed: Decimal = req
        .items
        .iter()
        .map(|i| i.price * Decimal::from(i.quantity))
        .sum();
    if computed != req.total {
        return Err(FornadaError::Validation(
            "Order total does not match its items.".to_string(),
        ));
    }

    match req.scheduled_to.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => {
            let scheduled = parse_scheduled_to(raw).ok_or_else(|| {
                FornadaError::Validation("Invalid scheduling date.".to_string())
            })?;
            if scheduled <= now {
                return Err(FornadaError::Validation(
                    "Scheduling must be in the future.".to_string(),
                ));
            }
            Ok(Some(scheduled))
        }
    }
}

/// Finds the customer by phone or creates a CLIENT row; a supplied address
/// always wins over the stored one (no address history). A concurrent
/// first-time checkout losing the phone uniqueness race surfaces as a
/// retryable conflict.
async fn resolve_customer(pool: &DbPool, req: &CreateOrderRequest) -> FornadaResult<Uuid> {
    let existing: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE phone = $1")
        .bind(req.customer_phone.trim())
        .fetch_optional(pool)
        .await?;

    match existing {
        Some((user_id,)) => {
            if let Some(address) = req.address.as_deref().map(str::trim).filter(|a| !a.is_empty())
            {
                sqlx::query("UPDATE users SET address = $1 WHERE id = $2")
                    .bind(address)
                    .bind(user_id)
                    .execute(pool)
                    .await?;
            }
            Ok(user_id)
        }
        None => {
            let result = sqlx::query_as::<_, (Uuid,)>(
                "INSERT INTO users (name, phone, role, address) VALUES ($1, $2, 'CLIENT', $3) RETURNING id",
            )
            .bind(req.customer_name.trim())
            .bind(req.customer_phone.trim())
            .bind(req.address.as_deref().map(str::trim))
            .fetch_one(pool)
            .await;

            match result {
                Ok((user_id,)) => Ok(user_id),
                Err(sqlx::Error::Database(e)) if e.kind() == ErrorKind::UniqueViolation => {
                    Err(FornadaError::Conflict(
                        "Another checkout for this phone just completed. Please try again."
                            .to_string(),
                    ))
                }
                Err(e) => Err(e.into()),
            }
        }
    }
}

pub async fn create_order_internal(
    pool: &DbPool,
    req: CreateOrderRequest,
    now: DateTime<Utc>,
) -> FornadaResult<Uuid> {
    let scheduled_to = validate_checkout(&req, now)?;
    let user_id = resolve_customer(pool, &req).await?;

    // Address is persisted on the order only for deliveries.
    let order_address = match req.order_type {
        OrderType::Delivery => req.address.as_deref().map(str::trim).map(String::from),
        OrderType::Pickup => None,
    };

    let mut tx = pool.begin().await?;

    let (order_id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO orders (user_id, type, status, payment_method, address, total, scheduled_to)
         VALUES ($1, $2, 'PENDING', $3, $4, $5, $6) RETURNING id",
    )
    .bind(user_id)
    .bind(req.order_type)
    .bind(req.payment_method)
    .bind(&order_address)
    .bind(req.total)
    .bind(scheduled_to)
    .fetch_one(&mut *tx)
    .await?;

    for item in &req.items {
        sqlx::query(
            "INSERT INTO order_items (order_id, product_id, product_name, quantity, price, chosen_option, observation, flavor)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(order_id)
        .bind(item.id)
        .bind(&item.name)
        .bind(item.quantity)
        .bind(item.price)
        .bind(&item.opcao)
        .bind(&item.observacao)
        .bind(&item.flavor)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    tracing::info!(
        "Created order {} ({:?}, {} items)",
        order_id,
        req.order_type,
        req.items.len()
    );
    Ok(order_id)
}

/// Checkout endpoint. Failures come back as `{success: false, error}` for the
/// frontend to render; nothing is thrown past this boundary.
pub async fn create_order_axum(
    State(state): State<AppState>,
    Json(payload): Json<CreateOrderRequest>,
) -> Json<Value> {
    match create_order_internal(&state.pool, payload, Utc::now()).await {
        Ok(order_id) => Json(json!({ "success": true, "orderId": order_id })),
        Err(e) => Json(json!({ "success": false, "error": e.to_string() })),
    }
}

// ---------------------------------------------------------------------------
// Status workflow
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub order_id: Uuid,
    pub new_status: OrderStatus,
}

pub async fn update_order_status_internal(
    pool: &DbPool,
    order_id: Uuid,
    new_status: OrderStatus,
) -> FornadaResult<()> {
    let current: Option<(OrderStatus, OrderType)> =
        sqlx::query_as("SELECT status, type FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(pool)
            .await?;

    let Some((status, order_type)) = current else {
        return Err(FornadaError::Validation("Order not found.".to_string()));
    };

    if !status.can_transition_to(new_status, order_type) {
        return Err(FornadaError::Conflict(format!(
            "An order cannot move from {:?} to {:?}.",
            status, new_status
        )));
    }

    sqlx::query("UPDATE orders SET status = $1 WHERE id = $2")
        .bind(new_status)
        .bind(order_id)
        .execute(pool)
        .await?;

    tracing::info!("Order {} moved {:?} -> {:?}", order_id, status, new_status);
    Ok(())
}

pub async fn update_order_status_axum(
    State(state): State<AppState>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Json<Value> {
    match update_order_status_internal(&state.pool, payload.order_id, payload.new_status).await {
        Ok(()) => Json(json!({ "success": true })),
        Err(e) => Json(json!({ "success": false, "error": e.to_string() })),
    }
}

// ---------------------------------------------------------------------------
// Read views
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub customer_name: String,
    pub customer_phone: String,
    pub payment_label: &'static str,
    /// Legal next statuses for the staff buttons.
    pub allowed_next: Vec<OrderStatus>,
    pub items: Vec<OrderItem>,
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    #[sqlx(flatten)]
    order: Order,
    customer_name: String,
    customer_phone: String,
}

enum OrderFilter {
    Active,
    History,
    ForUser(Uuid),
}

async fn load_order_views(pool: &DbPool, filter: OrderFilter) -> FornadaResult<Vec<OrderView>> {
    let base = "SELECT o.*, u.name AS customer_name, u.phone AS customer_phone
                FROM orders o JOIN users u ON u.id = o.user_id";
    let rows: Vec<OrderRow> = match filter {
        OrderFilter::Active => {
            sqlx::query_as(&format!(
                "{base} WHERE o.status NOT IN ('COMPLETED', 'CANCELED') ORDER BY o.created_at DESC"
            ))
            .fetch_all(pool)
            .await?
        }
        OrderFilter::History => {
            sqlx::query_as(&format!(
                "{base} WHERE o.status IN ('COMPLETED', 'CANCELED') ORDER BY o.created_at DESC"
            ))
            .fetch_all(pool)
            .await?
        }
        OrderFilter::ForUser(user_id) => {
            sqlx::query_as(&format!(
                "{base} WHERE o.user_id = $1 ORDER BY o.created_at DESC"
            ))
            .bind(user_id)
            .fetch_all(pool)
            .await?
        }
    };

    let ids: Vec<Uuid> = rows.iter().map(|r| r.order.id).collect();
    let mut items = sqlx::query_as::<_, OrderItem>(
        "SELECT * FROM order_items WHERE order_id = ANY($1)",
    )
    .bind(&ids)
    .fetch_all(pool)
    .await?;

    let views = rows
        .into_iter()
        .map(|row| {
            let (own, rest): (Vec<OrderItem>, Vec<OrderItem>) =
                items.drain(..).partition(|i| i.order_id == row.order.id);
            items = rest;
            OrderView {
                customer_name: row.customer_name,
                customer_phone: row.customer_phone,
                payment_label: row.order.payment_method.label(),
                allowed_next: row
                    .order
                    .status
                    .allowed_next(row.order.order_type)
                    .to_vec(),
                items: own,
                order: row.order,
            }
        })
        .collect();

    Ok(views)
}

/// Staff queue: everything still in flight.
pub async fn get_active_orders(
    State(state): State<AppState>,
) -> FornadaResult<Json<Vec<OrderView>>> {
    let views = load_order_views(&state.pool, OrderFilter::Active).await?;
    Ok(Json(views))
}

/// Staff history: completed and canceled orders.
pub async fn get_order_history(
    State(state): State<AppState>,
) -> FornadaResult<Json<Vec<OrderView>>> {
    let views = load_order_views(&state.pool, OrderFilter::History).await?;
    Ok(Json(views))
}

/// Customer "my orders" view. Fails closed: no session, no data.
pub async fn get_my_orders(
    State(state): State<AppState>,
    claims: Option<Extension<Claims>>,
) -> FornadaResult<Json<Vec<OrderView>>> {
    let Some(Extension(claims)) = claims else {
        return Err(FornadaError::Auth("Please log in first.".to_string()));
    };
    let views = load_order_views(&state.pool, OrderFilter::ForUser(claims.sub)).await?;
    Ok(Json(views))
}

/// Single order for the post-checkout confirmation page. Looked up by its
/// random id; checkout itself does not open a session.
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> FornadaResult<Json<OrderView>> {
    let row: Option<OrderRow> = sqlx::query_as(
        "SELECT o.*, u.name AS customer_name, u.phone AS customer_phone
         FROM orders o JOIN users u ON u.id = o.user_id WHERE o.id = $1",
    )
    .bind(id)
    .fetch_optional(&state.pool)
    .await?;

    let Some(row) = row else {
        return Err(FornadaError::Validation("Order not found.".to_string()));
    };

    let items =
        sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = $1")
            .bind(id)
            .fetch_all(&state.pool)
            .await?;

    Ok(Json(OrderView {
        customer_name: row.customer_name,
        customer_phone: row.customer_phone,
        payment_label: row.order.payment_method.label(),
        allowed_next: row.order.status.allowed_next(row.order.order_type).to_vec(),
        items,
        order: row.order,
    }))
}

// Used by tests to build requests succinctly.
#[cfg(test)]
pub fn pickup_request(items: Vec<CheckoutItem>, total: Decimal) -> CreateOrderRequest {
    CreateOrderRequest {
        customer_name: "Test Customer".to_string(),
        customer_phone: "11988887777".to_string(),
        address: None,
        order_type: OrderType::Pickup,
        payment_method: PaymentMethod::Pix,
        total,
        items,
        scheduled_to: None,
    }
}
