use chrono::{DateTime, Utc};
use loyalty_engine::db_types::{Order, OrderStatus, Withdrawal};
use lp_common::Points;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct AuthParams {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthResult {
    pub user_id: i64,
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WithdrawalParams {
    pub order: String,
    pub sum: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceResult {
    pub current: i64,
    pub withdrawn: i64,
}

impl BalanceResult {
    pub fn new(current: Points, withdrawn: Points) -> Self {
        Self { current: current.value(), withdrawn: withdrawn.value() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderResult {
    pub number: String,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accrual: Option<i64>,
    pub uploaded_at: DateTime<Utc>,
}

impl From<Order> for OrderResult {
    fn from(order: Order) -> Self {
        Self {
            number: order.number.to_string(),
            status: order.status,
            accrual: order.accrual.map(|a| a.value()),
            uploaded_at: order.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WithdrawalResult {
    pub order: String,
    pub sum: i64,
    pub processed_at: DateTime<Utc>,
}

impl From<Withdrawal> for WithdrawalResult {
    fn from(withdrawal: Withdrawal) -> Self {
        Self {
            order: withdrawal.number.to_string(),
            sum: withdrawal.amount.value(),
            processed_at: withdrawal.created_at,
        }
    }
}
