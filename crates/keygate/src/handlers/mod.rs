//! http handlers for keygate api endpoints.

mod error;
pub mod grants;
mod health;
pub mod servers;
pub mod users;

pub use error::{ApiError, JsonBody};
pub use health::health;
