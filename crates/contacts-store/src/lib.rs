//! # contacts-store
//!
//! PostgreSQL implementations of the contacts-core store traits.
//!
//! ```rust,ignore
//! let db = Database::connect(&database_url, 10).await?;
//! db.migrate().await?;
//!
//! let credits = Arc::new(PgCreditStore::new(db.pool().clone()));
//! let contacts = Arc::new(PgContactStore::new(db.pool().clone()));
//! ```
//!
//! Balance decrements are a conditional `UPDATE ... WHERE credits = $expected`;
//! grants insert the audit row first and only touch the balance when the
//! insert claimed the intent id, all inside one transaction.

mod contacts;
mod credits;
mod db;
mod error;
mod probe;

pub use contacts::PgContactStore;
pub use credits::PgCreditStore;
pub use db::Database;
pub use error::store_error;
pub use probe::DatabaseProbe;
