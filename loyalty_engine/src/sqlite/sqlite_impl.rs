//! `SqliteDatabase` is a concrete implementation of a loyalty engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements the [`LoyaltyDatabase`] trait.
//! Multi-statement operations (settling an order, withdrawing points) run inside a single
//! `pool.begin()` transaction so that balance invariants hold under concurrent workers.
use std::fmt::Debug;

use async_trait::async_trait;
use log::*;
use lp_common::Points;
use sqlx::SqlitePool;

use super::db::{new_pool, orders, users, withdrawals};
use crate::{
    db_types::{
        FullUser,
        NewOrder,
        NewUser,
        NewWithdrawal,
        Order,
        OrderNumber,
        OrderStatus,
        User,
        Withdrawal,
    },
    traits::{LoyaltyDatabase, UserApiError},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL from the environment.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = super::db::db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl LoyaltyDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn fetch_user_by_id(&self, user_id: i64) -> Result<FullUser, UserApiError> {
        let mut conn = self.pool.acquire().await.map_err(UserApiError::from)?;
        let user = users::fetch_user_by_id(user_id, &mut conn)
            .await?
            .ok_or_else(|| UserApiError::UserDoesNotExist(format!("id #{user_id}")))?;
        let orders = orders::orders_for_user(user_id, &mut conn).await.map_err(UserApiError::from)?;
        let withdrawals = withdrawals::withdrawals_for_user(user_id, &mut conn).await.map_err(UserApiError::from)?;
        Ok(FullUser { user, orders, withdrawals })
    }

    async fn fetch_user_by_email(&self, email: &str) -> Result<User, UserApiError> {
        let mut conn = self.pool.acquire().await.map_err(UserApiError::from)?;
        users::fetch_user_by_email(email, &mut conn)
            .await?
            .ok_or_else(|| UserApiError::UserDoesNotExist(format!("email {email}")))
    }

    async fn insert_user(&self, user: NewUser) -> Result<User, UserApiError> {
        let mut conn = self.pool.acquire().await.map_err(UserApiError::from)?;
        users::insert_user(user, &mut conn).await
    }

    async fn add_order(&self, order: NewOrder) -> Result<Order, UserApiError> {
        let mut tx = self.pool.begin().await.map_err(UserApiError::from)?;
        let order = orders::add_order_for_user(order, &mut tx).await?;
        tx.commit().await.map_err(UserApiError::from)?;
        debug!("🗃️ Order [{}] has been saved for user #{}", order.number, order.user_id);
        Ok(order)
    }

    async fn fetch_order_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, UserApiError> {
        let mut conn = self.pool.acquire().await.map_err(UserApiError::from)?;
        let order = orders::fetch_order_by_number(number, &mut conn).await.map_err(UserApiError::from)?;
        Ok(order)
    }

    async fn orders_for_user(&self, user_id: i64) -> Result<Vec<Order>, UserApiError> {
        let mut conn = self.pool.acquire().await.map_err(UserApiError::from)?;
        let orders = orders::orders_for_user(user_id, &mut conn).await.map_err(UserApiError::from)?;
        Ok(orders)
    }

    async fn withdrawals_for_user(&self, user_id: i64) -> Result<Vec<Withdrawal>, UserApiError> {
        let mut conn = self.pool.acquire().await.map_err(UserApiError::from)?;
        let withdrawals = withdrawals::withdrawals_for_user(user_id, &mut conn).await.map_err(UserApiError::from)?;
        Ok(withdrawals)
    }

    async fn settle_order(
        &self,
        number: &OrderNumber,
        status: OrderStatus,
        accrual: Option<Points>,
    ) -> Result<Option<Order>, UserApiError> {
        let mut tx = self.pool.begin().await.map_err(UserApiError::from)?;
        let settled = orders::settle_order(number, status, accrual, &mut tx).await?;
        match &settled {
            Some(order) if order.status == OrderStatus::Processed => {
                let credit = order.accrual.unwrap_or_default();
                users::adjust_balance(order.user_id, credit, Points::from(0), &mut tx).await?;
                debug!("🗃️ Order [{}] settled as {status}. {credit} credited to user #{}", order.number, order.user_id);
            },
            Some(order) => {
                debug!("🗃️ Order [{}] settled as {status}", order.number);
            },
            None => {
                trace!("🗃️ Order [{number}] was already completed. Nothing to settle.");
            },
        }
        tx.commit().await.map_err(UserApiError::from)?;
        Ok(settled)
    }

    async fn add_accrual(&self, user_id: i64, delta: Points) -> Result<(), UserApiError> {
        let mut conn = self.pool.acquire().await.map_err(UserApiError::from)?;
        users::adjust_balance(user_id, delta, Points::from(0), &mut conn).await
    }

    async fn reverse_accrual(&self, user_id: i64, amount: Points) -> Result<(), UserApiError> {
        let mut conn = self.pool.acquire().await.map_err(UserApiError::from)?;
        users::adjust_balance(user_id, -amount, amount, &mut conn).await
    }

    async fn process_withdrawal(&self, user_id: i64, withdrawal: NewWithdrawal) -> Result<Withdrawal, UserApiError> {
        let mut tx = self.pool.begin().await.map_err(UserApiError::from)?;
        if withdrawals::withdrawal_exists(user_id, &withdrawal.number, &mut tx).await.map_err(UserApiError::from)? {
            return Err(UserApiError::DuplicateWithdrawal(withdrawal.number));
        }
        let (balance, _) = users::user_balance(user_id, &mut tx).await?;
        if balance < withdrawal.amount {
            debug!(
                "🗃️ User #{user_id} has {balance} but tried to withdraw {}. Refusing.",
                withdrawal.amount
            );
            return Err(UserApiError::InsufficientFunds);
        }
        let amount = withdrawal.amount;
        let withdrawal = withdrawals::insert_withdrawal(user_id, withdrawal, &mut tx).await?;
        users::adjust_balance(user_id, -amount, amount, &mut tx).await?;
        tx.commit().await.map_err(UserApiError::from)?;
        debug!("🗃️ User #{user_id} withdrew {amount} against order [{}]", withdrawal.number);
        Ok(withdrawal)
    }

    async fn user_balance(&self, user_id: i64) -> Result<(Points, Points), UserApiError> {
        let mut conn = self.pool.acquire().await.map_err(UserApiError::from)?;
        users::user_balance(user_id, &mut conn).await
    }
}
