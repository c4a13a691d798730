//! Traits that storage backends supporting the loyalty engine must implement.

mod loyalty_database;

pub use loyalty_database::{LoyaltyDatabase, UserApiError};
