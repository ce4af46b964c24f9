//! SQLite database driver implementation

mod client;
mod driver;
mod sql;

pub use client::{SqliteCancelHandle, SqliteClient};
pub use driver::SqliteDriver;
