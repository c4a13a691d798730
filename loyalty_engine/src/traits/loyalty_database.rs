use async_trait::async_trait;
use lp_common::Points;
use thiserror::Error;

use crate::db_types::{
    FullUser,
    InvalidOrderNumber,
    NewOrder,
    NewUser,
    NewWithdrawal,
    Order,
    OrderNumber,
    OrderStatus,
    User,
    Withdrawal,
};

#[derive(Debug, Clone, Error)]
pub enum UserApiError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("User does not exist: {0}")]
    UserDoesNotExist(String),
    #[error("A user with email {0} is already registered")]
    EmailTaken(String),
    #[error("{0}")]
    InvalidOrderNumber(#[from] InvalidOrderNumber),
    #[error("The user has already uploaded order {}", .0.number)]
    OrderAlreadyExists(Order),
    #[error("Order number {0} has already been uploaded by another user")]
    OrderConflict(OrderNumber),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderNumber),
    #[error("A withdrawal against order {0} already exists")]
    DuplicateWithdrawal(OrderNumber),
    #[error("Insufficient points to cover the withdrawal")]
    InsufficientFunds,
}

impl From<sqlx::Error> for UserApiError {
    fn from(e: sqlx::Error) -> Self {
        UserApiError::DatabaseError(e.to_string())
    }
}

/// This trait defines the behaviour of durable stores backing the loyalty engine.
///
/// This behaviour includes:
/// * Registering users and fetching them with their orders and withdrawals eagerly loaded.
/// * Idempotent order uploads with cross-user conflict detection.
/// * Settling orders against the accrual service's terminal decision, crediting points exactly
///   once per order.
/// * Withdrawing points, atomically enforcing that balances never go negative.
///
/// Balance-affecting operations MUST be transactional: the worker pool gives no cross-task
/// ordering, so concurrent settlements and withdrawals for the same user may interleave freely.
#[async_trait]
pub trait LoyaltyDatabase: Clone + Send + Sync + 'static {
    /// The URL of the database.
    fn url(&self) -> &str;

    /// Fetches a user with their orders and withdrawals, each sorted by creation time ascending.
    async fn fetch_user_by_id(&self, user_id: i64) -> Result<FullUser, UserApiError>;

    /// Fetches the bare user record for the given email.
    async fn fetch_user_by_email(&self, email: &str) -> Result<User, UserApiError>;

    /// Registers a new user. Registering an email twice surfaces [`UserApiError::EmailTaken`].
    async fn insert_user(&self, user: NewUser) -> Result<User, UserApiError>;

    /// Uploads an order for a user. Idempotent per (user, number): a resubmission returns
    /// [`UserApiError::OrderAlreadyExists`] carrying the existing row without inserting a
    /// duplicate. The same number under a different user returns
    /// [`UserApiError::OrderConflict`].
    async fn add_order(&self, order: NewOrder) -> Result<Order, UserApiError>;

    async fn fetch_order_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, UserApiError>;

    async fn orders_for_user(&self, user_id: i64) -> Result<Vec<Order>, UserApiError>;

    async fn withdrawals_for_user(&self, user_id: i64) -> Result<Vec<Withdrawal>, UserApiError>;

    /// Applies a terminal accrual decision to the order in a single atomic transaction:
    /// * the order's status, accrual and `completed` flag are set, conditional on the order not
    ///   being completed yet;
    /// * when the status is `Processed`, the owning user's balance is credited in the same
    ///   transaction.
    ///
    /// Returns the updated order, or `None` when the order was already completed (in which case
    /// nothing is written and no points are credited — this is what makes settlement
    /// idempotent).
    async fn settle_order(
        &self,
        number: &OrderNumber,
        status: OrderStatus,
        accrual: Option<Points>,
    ) -> Result<Option<Order>, UserApiError>;

    /// Credits points to the user's balance. `delta` is a credit; debits go through
    /// [`reverse_accrual`](Self::reverse_accrual) instead.
    async fn add_accrual(&self, user_id: i64, delta: Points) -> Result<(), UserApiError>;

    /// The explicit inverse of an accrual: debits `amount` from the balance and adds it to the
    /// `withdrawn` counter, atomically. Not reachable from the order flow.
    async fn reverse_accrual(&self, user_id: i64, amount: Points) -> Result<(), UserApiError>;

    /// Withdraws points against a new order number. In one atomic transaction:
    /// * rejects a number the user has already withdrawn against
    ///   ([`UserApiError::DuplicateWithdrawal`]);
    /// * rejects the request when `current_balance < amount`
    ///   ([`UserApiError::InsufficientFunds`]);
    /// * otherwise appends the withdrawal, decrements `current_balance` and increments
    ///   `withdrawn`.
    async fn process_withdrawal(&self, user_id: i64, withdrawal: NewWithdrawal) -> Result<Withdrawal, UserApiError>;

    /// Returns `(current_balance, withdrawn)` for the user.
    async fn user_balance(&self, user_id: i64) -> Result<(Points, Points), UserApiError>;
}
