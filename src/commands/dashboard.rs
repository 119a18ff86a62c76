use crate::error::FornadaResult;
use crate::state::AppState;
use axum::{extract::State, Json};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Serialize, FromRow, Default)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub pending_orders: Option<i64>,
    pub active_orders: Option<i64>,
    pub today_orders: Option<i64>,
    pub today_revenue: Option<Decimal>,
}

/// Header numbers for the staff dashboard. Refreshed by plain re-fetch, not
/// incrementally.
pub async fn get_dashboard_stats(
    State(state): State<AppState>,
) -> FornadaResult<Json<DashboardStats>> {
    let stats = sqlx::query_as::<_, DashboardStats>(
        "SELECT
            (SELECT COUNT(*) FROM orders WHERE status = 'PENDING') AS pending_orders,
            (SELECT COUNT(*) FROM orders
                WHERE status NOT IN ('COMPLETED', 'CANCELED')) AS active_orders,
            (SELECT COUNT(*) FROM orders
                WHERE created_at::date = CURRENT_DATE) AS today_orders,
            (SELECT COALESCE(SUM(total), 0) FROM orders
                WHERE created_at::date = CURRENT_DATE
                  AND status <> 'CANCELED') AS today_revenue",
    )
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(stats))
}
