use crate::StoreError;
use cake_types::{DepositRecord, Statistic, TransactionRecord, User};
use std::{collections::HashMap, sync::Arc};

mod schema;
mod sqlite;

pub use schema::{CREATE_INDEXES, CREATE_TABLES};
pub use sqlite::Sqlite;

/// Largest identity a backend accepts. Ids are stored as signed 64-bit integers.
pub const MAX_ID: u64 = i64::MAX as u64;

/// Everything the cache needs to rebuild itself at startup.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub users: Vec<User>,
    /// Aggregates keyed by user id. Users without audit rows may be absent.
    pub statistics: HashMap<u64, Statistic>,
}

/// Durable home of users and their audit trail.
///
/// Implementations must not leave any side effect behind when a call fails:
/// `insert_deposit` and `insert_transaction` write the audit row and the new
/// `users.balance` together or not at all.
pub trait Storage: Send + Sync {
    fn insert_user(&self, user: &User) -> Result<(), StoreError>;
    fn insert_deposit(&self, record: &DepositRecord) -> Result<(), StoreError>;
    fn insert_transaction(&self, record: &TransactionRecord) -> Result<(), StoreError>;

    /// Full scan of users and their aggregated audit rows. Only called at startup.
    fn load(&self) -> Result<Snapshot, StoreError>;

    /// Release the underlying handle. Later calls fail with [StoreError::Closed].
    fn close(&self) -> Result<(), StoreError>;
}

impl<T: Storage + ?Sized> Storage for Arc<T> {
    fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        (**self).insert_user(user)
    }

    fn insert_deposit(&self, record: &DepositRecord) -> Result<(), StoreError> {
        (**self).insert_deposit(record)
    }

    fn insert_transaction(&self, record: &TransactionRecord) -> Result<(), StoreError> {
        (**self).insert_transaction(record)
    }

    fn load(&self) -> Result<Snapshot, StoreError> {
        (**self).load()
    }

    fn close(&self) -> Result<(), StoreError> {
        (**self).close()
    }
}
