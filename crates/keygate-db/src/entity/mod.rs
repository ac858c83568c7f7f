//! database entity models for sea-orm.
//!
//! these entities map to database tables and convert to and from the
//! keygate domain types.

pub mod grant;
pub mod server;
pub mod user;
