//! Database module.
//!
//! Provides the SQLite-backed check event log with embedded migrations.

mod models;
mod store;

pub use models::*;
pub use store::*;
