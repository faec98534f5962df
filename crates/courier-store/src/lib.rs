//! # courier-store
//!
//! Durable message log for the courier relay, backed by SQLite.
//!
//! [`Database`] wraps a single `rusqlite::Connection` and exposes typed
//! helpers for the `messages` table. [`SqliteStore`] puts a database behind
//! a mutex and implements [`MessageStore`], the contract the relay's
//! delivery path is written against.

pub mod conversations;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod store;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
pub use store::{MessageStore, SqliteStore};
