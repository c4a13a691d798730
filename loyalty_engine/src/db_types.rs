use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use lp_common::Points;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

use crate::helpers::luhn;

//--------------------------------------    OrderNumber     ----------------------------------------------------------
/// A lightweight wrapper around the digit string identifying an order.
///
/// Constructing an `OrderNumber` does not validate the checksum; validation happens when a
/// [`NewOrder`] or [`NewWithdrawal`] is built, so that raw numbers can still be carried around
/// (e.g. when decoding upstream responses).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderNumber(pub String);

impl FromStr for OrderNumber {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderNumber {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderNumber {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl OrderNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------    OrderStatus     ----------------------------------------------------------
/// The lifecycle of an order, as decided by the accrual service.
///
/// Orders are created `Registered`, may pass through `Processing`, and terminate at either
/// `Invalid` or `Processed`. The wire format and the database both use the uppercase names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// The order has been uploaded, and the accrual service has not scored it yet.
    Registered,
    /// The accrual service is busy scoring the order.
    Processing,
    /// The accrual service rejected the order. Terminal.
    Invalid,
    /// The accrual service scored the order and points have been awarded. Terminal.
    Processed,
}

impl OrderStatus {
    /// True for the two statuses that end an order's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Invalid | OrderStatus::Processed)
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Registered => write!(f, "REGISTERED"),
            OrderStatus::Processing => write!(f, "PROCESSING"),
            OrderStatus::Invalid => write!(f, "INVALID"),
            OrderStatus::Processed => write!(f, "PROCESSED"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid order status: {0}")]
pub struct ConversionError(String);

impl FromStr for OrderStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REGISTERED" => Ok(Self::Registered),
            "PROCESSING" => Ok(Self::Processing),
            "INVALID" => Ok(Self::Invalid),
            "PROCESSED" => Ok(Self::Processed),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

impl From<String> for OrderStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to REGISTERED");
            OrderStatus::Registered
        })
    }
}

//--------------------------------------  InvalidOrderNumber  --------------------------------------------------------
#[derive(Debug, Clone, Error)]
#[error("Order number {0} fails the checksum")]
pub struct InvalidOrderNumber(pub OrderNumber);

//--------------------------------------       Order        ----------------------------------------------------------
/// A persisted order row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub number: OrderNumber,
    pub status: OrderStatus,
    /// Awarded points. Populated if and only if `status` is `Processed`.
    pub accrual: Option<Points>,
    /// Derived flag, true iff `status` is terminal. Persisted for cheap filtering; once set, the
    /// row receives no further updates.
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------      NewOrder      ----------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: i64,
    pub number: OrderNumber,
}

impl NewOrder {
    /// Builds a new order for the given user, rejecting numbers that fail the Luhn checksum.
    pub fn new<S: Into<String>>(number: S, user_id: i64) -> Result<Self, InvalidOrderNumber> {
        let number = OrderNumber(number.into());
        if !luhn::is_valid(number.as_str()) {
            return Err(InvalidOrderNumber(number));
        }
        Ok(Self { user_id, number })
    }
}

//--------------------------------------    AccrualOrder    ----------------------------------------------------------
/// The order fragment returned by the accrual service:
/// `{"number": <number>, "status": <status>, "accrual": <points>}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccrualOrder {
    pub number: OrderNumber,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accrual: Option<Points>,
}

//--------------------------------------        User        ----------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    /// Spendable points. Never negative; the withdrawal path enforces this transactionally.
    pub current_balance: Points,
    /// Lifetime points withdrawn. Monotonically non-decreasing.
    pub withdrawn: Points,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    /// Hash of the user's password. Hashing is the host's concern; the engine only stores and
    /// returns the digest.
    pub password_hash: String,
}

impl NewUser {
    pub fn new<S: Into<String>, P: Into<String>>(email: S, password_hash: P) -> Self {
        Self { email: email.into(), password_hash: password_hash.into() }
    }
}

//--------------------------------------      FullUser      ----------------------------------------------------------
/// A user together with their orders and withdrawals, each sorted by creation time ascending.
#[derive(Debug, Clone)]
pub struct FullUser {
    pub user: User,
    pub orders: Vec<Order>,
    pub withdrawals: Vec<Withdrawal>,
}

//--------------------------------------     Withdrawal     ----------------------------------------------------------
/// A persisted withdrawal row. Immutable once created.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: i64,
    pub user_id: i64,
    pub number: OrderNumber,
    pub amount: Points,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewWithdrawal {
    pub number: OrderNumber,
    pub amount: Points,
}

impl NewWithdrawal {
    /// Builds a withdrawal request against the given order number. The number must pass the Luhn
    /// checksum and the amount must be positive.
    pub fn new<S: Into<String>>(number: S, amount: Points) -> Result<Self, InvalidOrderNumber> {
        let number = OrderNumber(number.into());
        if !luhn::is_valid(number.as_str()) {
            return Err(InvalidOrderNumber(number));
        }
        Ok(Self { number, amount })
    }
}

#[cfg(test)]
mod test {
    use lp_common::Points;

    use super::{AccrualOrder, NewOrder, NewWithdrawal, OrderStatus};

    #[test]
    fn status_round_trip() {
        for s in [OrderStatus::Registered, OrderStatus::Processing, OrderStatus::Invalid, OrderStatus::Processed] {
            assert_eq!(s.to_string().parse::<OrderStatus>().unwrap(), s);
        }
        assert!("PAID".parse::<OrderStatus>().is_err());
        assert_eq!(OrderStatus::from("garbage".to_string()), OrderStatus::Registered);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!OrderStatus::Registered.is_terminal());
        assert!(!OrderStatus::Processing.is_terminal());
        assert!(OrderStatus::Invalid.is_terminal());
        assert!(OrderStatus::Processed.is_terminal());
    }

    #[test]
    fn new_order_checks_luhn() {
        assert!(NewOrder::new("79927398713", 1).is_ok());
        let err = NewOrder::new("12345", 1).unwrap_err();
        assert_eq!(err.0.as_str(), "12345");
    }

    #[test]
    fn new_withdrawal_checks_luhn() {
        assert!(NewWithdrawal::new("5062821234567892", Points::from(300)).is_ok());
        assert!(NewWithdrawal::new("5062821234567891", Points::from(300)).is_err());
    }

    #[test]
    fn accrual_order_decoding() {
        let order: AccrualOrder =
            serde_json::from_str(r#"{"number":"79927398713","status":"PROCESSED","accrual":500}"#).unwrap();
        assert_eq!(order.status, OrderStatus::Processed);
        assert_eq!(order.accrual, Some(Points::from(500)));

        let order: AccrualOrder = serde_json::from_str(r#"{"number":"79927398713","status":"PROCESSING"}"#).unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
        assert!(order.accrual.is_none());
    }
}
