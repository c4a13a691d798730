use log::debug;
use sqlx::SqliteConnection;

use super::is_unique_violation;
use crate::{
    db_types::{NewWithdrawal, OrderNumber, Withdrawal},
    traits::UserApiError,
};

pub async fn withdrawal_exists(
    user_id: i64,
    number: &OrderNumber,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let row = sqlx::query_as::<_, (i64,)>("SELECT id FROM withdrawals WHERE user_id = $1 AND number = $2")
        .bind(user_id)
        .bind(number.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(row.is_some())
}

pub async fn insert_withdrawal(
    user_id: i64,
    withdrawal: NewWithdrawal,
    conn: &mut SqliteConnection,
) -> Result<Withdrawal, UserApiError> {
    let result = sqlx::query_as::<_, Withdrawal>(
        r#"
            INSERT INTO withdrawals (user_id, number, amount)
            VALUES ($1, $2, $3)
            RETURNING *;
        "#,
    )
    .bind(user_id)
    .bind(withdrawal.number.as_str())
    .bind(withdrawal.amount)
    .fetch_one(conn)
    .await;
    match result {
        Ok(withdrawal) => {
            debug!("💸️ Withdrawal of {} against order [{}] recorded", withdrawal.amount, withdrawal.number);
            Ok(withdrawal)
        },
        Err(e) if is_unique_violation(&e) => Err(UserApiError::DuplicateWithdrawal(withdrawal.number)),
        Err(e) => Err(e.into()),
    }
}

pub async fn withdrawals_for_user(user_id: i64, conn: &mut SqliteConnection) -> Result<Vec<Withdrawal>, sqlx::Error> {
    let withdrawals =
        sqlx::query_as::<_, Withdrawal>("SELECT * FROM withdrawals WHERE user_id = $1 ORDER BY created_at ASC, id ASC")
            .bind(user_id)
            .fetch_all(conn)
            .await?;
    Ok(withdrawals)
}
