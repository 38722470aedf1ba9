//! Ratekeeper Common Types
//!
//! Shared types for the FX rate subsystem: currency codes and pairs, rate
//! records and their sources, staleness summaries and the error taxonomy
//! used by the store, the provider clients and the sync orchestrator.

pub mod identifiers;
pub mod currency;
pub mod rate;
pub mod error;
pub mod time;

pub use identifiers::*;
pub use currency::*;
pub use rate::*;
pub use error::*;
pub use time::*;
