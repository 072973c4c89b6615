//! SQLite backend for the ledger.
//!
//! The database runs in WAL mode with a busy timeout, so readers never block the settling writer and competing
//! writers queue instead of failing immediately.
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
