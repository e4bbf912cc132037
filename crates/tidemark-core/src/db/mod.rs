//! Local persistence for Tidemark

mod connection;
mod migrations;
mod store;

pub use connection::Database;
pub use store::{LocalStore, SqliteLocalStore, StoreResult};
