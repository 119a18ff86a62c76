#[cfg(test)]
mod tests {
    use crate::commands::catalog::delete_category;
    use crate::commands::orders::{
        create_order_internal, update_order_status_internal, CheckoutItem, CreateOrderRequest,
    };
    use crate::db::{self, DbPool, OrderStatus, OrderType, PaymentMethod};
    use crate::error::FornadaError;
    use crate::state::AppState;
    use axum::extract::{Path, State};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    async fn setup_test_db() -> Option<DbPool> {
        dotenvy::dotenv().ok();
        let Ok(database_url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set, skipping integration test");
            return None;
        };
        let pool = db::init_pool(&database_url)
            .await
            .expect("Failed to create pool");
        db::init_database(&pool).await.expect("Failed to migrate");
        Some(pool)
    }

    async fn seed_product(pool: &DbPool, price: Decimal) -> (Uuid, Uuid) {
        let tag = Uuid::new_v4();
        let (category_id,): (Uuid,) = sqlx::query_as(
            "INSERT INTO categories (name, slug) VALUES ($1, $2) RETURNING id",
        )
        .bind(format!("Test Category {}", tag))
        .bind(format!("test-category-{}", tag))
        .fetch_one(pool)
        .await
        .unwrap();

        let (product_id,): (Uuid,) = sqlx::query_as(
            "INSERT INTO products (name, price, category_id) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(format!("Test Brownie {}", tag))
        .bind(price)
        .bind(category_id)
        .fetch_one(pool)
        .await
        .unwrap();

        (category_id, product_id)
    }

    fn test_phone() -> String {
        format!("119{}", &Uuid::new_v4().simple().to_string()[..8])
    }

    fn pickup_checkout(product_id: Uuid, phone: &str) -> CreateOrderRequest {
        CreateOrderRequest {
            customer_name: "Integration Customer".to_string(),
            customer_phone: phone.to_string(),
            address: None,
            order_type: OrderType::Pickup,
            payment_method: PaymentMethod::Pix,
            total: dec!(25.80),
            items: vec![CheckoutItem {
                id: product_id,
                name: "Test Brownie".to_string(),
                price: dec!(12.90),
                quantity: 2,
                opcao: None,
                observacao: None,
                flavor: None,
            }],
            scheduled_to: None,
        }
    }

    async fn cleanup(pool: &DbPool, phone: &str, category_id: Uuid) {
        let _ = sqlx::query(
            "DELETE FROM orders WHERE user_id IN (SELECT id FROM users WHERE phone = $1)",
        )
        .bind(phone)
        .execute(pool)
        .await;
        let _ = sqlx::query("DELETE FROM users WHERE phone = $1")
            .bind(phone)
            .execute(pool)
            .await;
        let _ = sqlx::query("DELETE FROM products WHERE category_id = $1")
            .bind(category_id)
            .execute(pool)
            .await;
        let _ = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(category_id)
            .execute(pool)
            .await;
    }

    #[tokio::test]
    async fn pickup_checkout_creates_pending_order_with_snapshot() {
        let Some(pool) = setup_test_db().await else { return };
        let (category_id, product_id) = seed_product(&pool, dec!(12.90)).await;
        let phone = test_phone();

        let order_id = create_order_internal(&pool, pickup_checkout(product_id, &phone), Utc::now())
            .await
            .expect("checkout failed");

        let (status, address, total): (OrderStatus, Option<String>, Decimal) =
            sqlx::query_as("SELECT status, address, total FROM orders WHERE id = $1")
                .bind(order_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(status, OrderStatus::Pending);
        assert_eq!(address, None);
        assert_eq!(total, dec!(25.80));

        let items: Vec<(Decimal, i32)> =
            sqlx::query_as("SELECT price, quantity FROM order_items WHERE order_id = $1")
                .bind(order_id)
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(items, vec![(dec!(12.90), 2)]);

        cleanup(&pool, &phone, category_id).await;
    }

    #[tokio::test]
    async fn order_items_keep_their_price_after_catalog_edits() {
        let Some(pool) = setup_test_db().await else { return };
        let (category_id, product_id) = seed_product(&pool, dec!(12.90)).await;
        let phone = test_phone();

        let order_id = create_order_internal(&pool, pickup_checkout(product_id, &phone), Utc::now())
            .await
            .unwrap();

        sqlx::query("UPDATE products SET price = $1, name = 'Renamed Brownie' WHERE id = $2")
            .bind(dec!(99.00))
            .bind(product_id)
            .execute(&pool)
            .await
            .unwrap();

        let (name, price): (String, Decimal) =
            sqlx::query_as("SELECT product_name, price FROM order_items WHERE order_id = $1")
                .bind(order_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(name, "Test Brownie");
        assert_eq!(price, dec!(12.90));

        cleanup(&pool, &phone, category_id).await;
    }

    #[tokio::test]
    async fn past_scheduling_is_rejected_and_writes_nothing() {
        let Some(pool) = setup_test_db().await else { return };
        let (category_id, product_id) = seed_product(&pool, dec!(12.90)).await;
        let phone = test_phone();

        let mut req = pickup_checkout(product_id, &phone);
        req.scheduled_to = Some("2020-01-01T10:00".to_string());

        let result = create_order_internal(&pool, req, Utc::now()).await;
        assert!(matches!(result, Err(FornadaError::Validation(_))));

        // Rejected before any write: not even the customer row exists.
        let user_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE phone = $1")
            .bind(&phone)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(user_count, 0);

        cleanup(&pool, &phone, category_id).await;
    }

    #[tokio::test]
    async fn checkout_reuses_customer_and_updates_address() {
        let Some(pool) = setup_test_db().await else { return };
        let (category_id, product_id) = seed_product(&pool, dec!(12.90)).await;
        let phone = test_phone();

        let mut first = pickup_checkout(product_id, &phone);
        first.order_type = OrderType::Delivery;
        first.address = Some("Rua Velha, 1".to_string());
        create_order_internal(&pool, first, Utc::now()).await.unwrap();

        let mut second = pickup_checkout(product_id, &phone);
        second.order_type = OrderType::Delivery;
        second.address = Some("Rua Nova, 99".to_string());
        create_order_internal(&pool, second, Utc::now()).await.unwrap();

        let addresses: Vec<(String,)> =
            sqlx::query_as("SELECT address FROM users WHERE phone = $1")
                .bind(&phone)
                .fetch_all(&pool)
                .await
                .unwrap();
        // One user row, carrying the last address supplied.
        assert_eq!(addresses, vec![("Rua Nova, 99".to_string(),)]);

        cleanup(&pool, &phone, category_id).await;
    }

    #[tokio::test]
    async fn status_updates_respect_the_transition_table() {
        let Some(pool) = setup_test_db().await else { return };
        let (category_id, product_id) = seed_product(&pool, dec!(12.90)).await;
        let phone = test_phone();

        let order_id = create_order_internal(&pool, pickup_checkout(product_id, &phone), Utc::now())
            .await
            .unwrap();

        // Jumping straight to COMPLETED is rejected under the strict policy.
        let skip = update_order_status_internal(&pool, order_id, OrderStatus::Completed).await;
        assert!(matches!(skip, Err(FornadaError::Conflict(_))));

        let status: OrderStatus = sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(status, OrderStatus::Pending);

        // The legal path for a pickup order works end to end.
        update_order_status_internal(&pool, order_id, OrderStatus::Preparing)
            .await
            .unwrap();
        update_order_status_internal(&pool, order_id, OrderStatus::ReadyToPickup)
            .await
            .unwrap();
        update_order_status_internal(&pool, order_id, OrderStatus::Completed)
            .await
            .unwrap();

        // COMPLETED is terminal.
        let reopen = update_order_status_internal(&pool, order_id, OrderStatus::Preparing).await;
        assert!(matches!(reopen, Err(FornadaError::Conflict(_))));

        cleanup(&pool, &phone, category_id).await;
    }

    #[tokio::test]
    async fn category_deletion_is_blocked_while_products_remain() {
        let Some(pool) = setup_test_db().await else { return };
        let (category_id, _product_id) = seed_product(&pool, dec!(12.90)).await;
        let state = AppState { pool: pool.clone() };

        let blocked = delete_category(State(state.clone()), Path(category_id)).await;
        match blocked {
            Err(FornadaError::Conflict(msg)) => assert!(msg.contains('1')),
            other => panic!("expected a conflict, got {:?}", other.map(|_| ())),
        }

        // Category and product are untouched.
        let remaining: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE category_id = $1")
                .bind(category_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(remaining, 1);

        sqlx::query("DELETE FROM products WHERE category_id = $1")
            .bind(category_id)
            .execute(&pool)
            .await
            .unwrap();

        // Empty categories delete cleanly.
        delete_category(State(state), Path(category_id))
            .await
            .expect("empty category should delete");
    }
}
