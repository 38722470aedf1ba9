//! Ratekeeper Rate Store
//!
//! Persistent, versioned storage of FX rate records on SQLite.
//!
//! Records are append-only: a write for a pair archives the previously active
//! record and inserts a new one inside a single transaction. Resolution picks
//! the highest-priority active record, breaking ties by the most recent
//! observation.

pub mod config;
mod row;
pub mod store;

pub use config::StoreConfig;
pub use store::RateStore;
