mod points;

pub mod op;
mod secret;

pub use points::{Points, PointsConversionError};
pub use secret::Secret;
