//! Service layer
//!
//! Contains business logic separated from HTTP handlers.

mod directory;

pub use directory::UserDirectory;
