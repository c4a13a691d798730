//! Loyalty Points Engine
//!
//! The loyalty points engine is the core of a loyalty programme backend. Users register, submit
//! order numbers, and accrue points once the upstream accrual service has validated and scored
//! each order. Points can later be withdrawn against new order numbers.
//!
//! The library is divided into three main sections:
//! 1. Database management and control. SQLite is the supported backend. You should never need to
//!    access the database directly; use the storage trait in the [`traits`] module instead. The
//!    exception is the data types used in the database, which are defined in the `db_types`
//!    module and are public.
//! 2. The asynchronous order-processing subsystem: a bounded worker pool ([`worker`]), a
//!    retry-aware client for the accrual service ([`accrual`]), and the [`OrderFlowApi`] that
//!    ties the two together and reconciles upstream decisions with local state.
//! 3. Supporting helpers, such as the Luhn checksum used to vet order numbers.

pub mod accrual;
pub mod db_types;
pub mod helpers;
mod order_flow;
pub mod sqlite;
pub mod test_utils;
pub mod traits;
pub mod worker;

pub use order_flow::{OrderFlowApi, OrderFlowConfig, OrderFlowError, ProcessOrderTask};
pub use sqlite::SqliteDatabase;
