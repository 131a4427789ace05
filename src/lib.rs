//! poma: conversational mutation engine for a single-user portfolio.
//!
//! A chat message plus the current portfolio snapshot becomes a batch of
//! validated, applied-or-skipped operations. Sensitive writes are gated
//! behind an explicit human-approval protocol; read-only enrichment
//! (balances, prices) runs concurrently and degrades per value. Planning,
//! lookups and storage are pluggable collaborators behind traits.

pub mod chat;
pub mod config;
pub mod error;
pub mod gate;
pub mod lookup;
pub mod ops;
pub mod planner;
pub mod portfolio;
pub mod server;
pub mod summary;
pub mod units;

pub use error::{ConfigError, Error, LookupError, PlannerError, StoreError};
