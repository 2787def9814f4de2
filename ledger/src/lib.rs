//! Per-user balance ledger.
//!
//! Every user's balance and statistic live in an in-memory [Cache] that is
//! rebuilt from [Storage] at startup. Money-moving operations write an audit
//! row (and the new durable balance) before the cache is touched, so a failed
//! write never leaves the cache ahead of the store.

mod cache;
mod engine;
mod error;
pub mod storage;

pub use cache::{Account, Cache};
pub use engine::Ledger;
pub use error::{Error, ErrorKind, Rejection, Result, StoreError};
pub use storage::{Snapshot, Sqlite, Storage};

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;
