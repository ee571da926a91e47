//! Data layer module
//!
//! All persistence goes through the SQLite [`Database`]:
//! - users and sessions (authentication)
//! - authors and books (catalog)

mod database;
mod models;

pub use database::Database;
pub use models::*;
