use log::debug;
use lp_common::Points;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewOrder, Order, OrderNumber, OrderStatus},
    traits::UserApiError,
};

/// Returns the order row for the given number, if any. Order numbers are globally unique.
pub async fn fetch_order_by_number(
    number: &OrderNumber,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE number = $1")
        .bind(number.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, UserApiError> {
    let order = sqlx::query_as::<_, Order>(
        r#"
            INSERT INTO orders (user_id, number)
            VALUES ($1, $2)
            RETURNING *;
        "#,
    )
    .bind(order.user_id)
    .bind(order.number.as_str())
    .fetch_one(conn)
    .await?;
    debug!("📝️ Order [{}] inserted with id {}", order.number, order.id);
    Ok(order)
}

/// Uploads an order, enforcing the idempotence and conflict rules: resubmission by the same user
/// returns the existing row inside [`UserApiError::OrderAlreadyExists`]; the same number under
/// another user is a conflict.
pub async fn add_order_for_user(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, UserApiError> {
    match fetch_order_by_number(&order.number, &mut *conn).await? {
        Some(existing) if existing.user_id == order.user_id => Err(UserApiError::OrderAlreadyExists(existing)),
        Some(_) => Err(UserApiError::OrderConflict(order.number)),
        None => insert_order(order, conn).await,
    }
}

/// Fetches all orders of one user, by creation time ascending. Rows created within the same
/// timestamp tick are disambiguated by id so that the listing is stable.
pub async fn orders_for_user(user_id: i64, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let orders = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at ASC, id ASC")
        .bind(user_id)
        .fetch_all(conn)
        .await?;
    Ok(orders)
}

/// Writes a terminal status to the order, conditional on it not being completed yet. Returns
/// `None` when the row was already completed (or does not exist), in which case nothing changed.
pub async fn settle_order(
    number: &OrderNumber,
    status: OrderStatus,
    accrual: Option<Points>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, UserApiError> {
    let order = sqlx::query_as::<_, Order>(
        r#"UPDATE orders SET
       status = $1,
       accrual = $2,
       completed = 1,
       updated_at = CURRENT_TIMESTAMP
       WHERE number = $3 AND completed = 0
       RETURNING *"#,
    )
    .bind(status)
    .bind(accrual)
    .bind(number.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(order)
}
