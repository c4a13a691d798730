use log::{debug, trace};
use lp_common::Points;
use sqlx::SqliteConnection;

use super::is_unique_violation;
use crate::{
    db_types::{NewUser, User},
    traits::UserApiError,
};

pub async fn insert_user(user: NewUser, conn: &mut SqliteConnection) -> Result<User, UserApiError> {
    let result = sqlx::query_as::<_, User>(
        r#"
            INSERT INTO users (email, password_hash)
            VALUES ($1, $2)
            RETURNING *;
        "#,
    )
    .bind(&user.email)
    .bind(&user.password_hash)
    .fetch_one(conn)
    .await;
    match result {
        Ok(user) => {
            debug!("🧑️ Registered user {} with id #{}", user.email, user.id);
            Ok(user)
        },
        Err(e) if is_unique_violation(&e) => Err(UserApiError::EmailTaken(user.email)),
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_user_by_id(user_id: i64, conn: &mut SqliteConnection) -> Result<Option<User>, UserApiError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1").bind(user_id).fetch_optional(conn).await?;
    Ok(user)
}

pub async fn fetch_user_by_email(email: &str, conn: &mut SqliteConnection) -> Result<Option<User>, UserApiError> {
    let user =
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1").bind(email).fetch_optional(conn).await?;
    Ok(user)
}

/// Applies the given deltas to the user's balance counters. The caller composes the deltas
/// (credit, withdrawal, reversal); this function only guarantees that both counters move in one
/// statement. The schema-level CHECK constraints back up the non-negativity invariants.
pub async fn adjust_balance(
    user_id: i64,
    balance_delta: Points,
    withdrawn_delta: Points,
    conn: &mut SqliteConnection,
) -> Result<(), UserApiError> {
    let result = sqlx::query(
        r#"UPDATE users SET
       current_balance = current_balance + $1,
       withdrawn = withdrawn + $2,
       updated_at = CURRENT_TIMESTAMP
       WHERE id = $3
       "#,
    )
    .bind(balance_delta)
    .bind(withdrawn_delta)
    .bind(user_id)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(UserApiError::UserDoesNotExist(format!("id #{user_id}")));
    }
    trace!("🧑️ Balance of user #{user_id} adjusted by {balance_delta} (withdrawn by {withdrawn_delta})");
    Ok(())
}

pub async fn user_balance(user_id: i64, conn: &mut SqliteConnection) -> Result<(Points, Points), UserApiError> {
    let balances = sqlx::query_as::<_, (Points, Points)>("SELECT current_balance, withdrawn FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(conn)
        .await?;
    balances.ok_or_else(|| UserApiError::UserDoesNotExist(format!("id #{user_id}")))
}
