// Postgres storage layer with sqlx
//
// This crate provides the persistence capabilities behind the API:
// - Database: bounded connection pool + query implementations
// - UserStore / SessionStore / ItemStore: capability traits the API
//   layer programs against (testable with in-memory fakes)
// - password: argon2 hashing and verification

pub mod models;
pub mod password;
pub mod repositories;
pub mod stores;

pub use models::*;
pub use repositories::Database;
pub use stores::{ItemStore, SessionStore, StoreError, StoreResult, UserStore};
