//! In-memory [Storage] used by tests, with failure injection.

use crate::{storage::MAX_ID, Snapshot, Storage, StoreError};
use cake_types::{DepositRecord, Statistic, TransactionRecord, User};
use std::{
    collections::{BTreeMap, HashMap},
    sync::{Mutex, MutexGuard, PoisonError},
};

#[derive(Default)]
struct Inner {
    users: BTreeMap<u64, f64>,
    deposits: BTreeMap<u64, DepositRecord>,
    transactions: BTreeMap<u64, TransactionRecord>,
    fail_writes: usize,
    closed: bool,
}

impl Inner {
    fn check_write(&mut self, id: u64) -> Result<(), StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        if self.fail_writes > 0 {
            self.fail_writes -= 1;
            return Err(StoreError::Injected("write failed".to_string()));
        }
        if id > MAX_ID {
            return Err(StoreError::IdOutOfRange(id));
        }
        Ok(())
    }
}

/// Mirrors the SQLite backend: unique ids per table, the balance is updated
/// together with the audit row, and nothing changes when a write fails.
#[derive(Default)]
pub struct Memory {
    inner: Mutex<Inner>,
}

impl Memory {
    /// Seed the store with users as if they had been created in an earlier run.
    pub fn with_users(users: &[(u64, f64)]) -> Self {
        let memory = Self::default();
        memory.lock().users.extend(users.iter().copied());
        memory
    }

    /// Make the next `n` writes fail with [StoreError::Injected].
    pub fn fail_next_writes(&self, n: usize) {
        self.lock().fail_writes = n;
    }

    pub fn deposits(&self) -> Vec<DepositRecord> {
        self.lock().deposits.values().copied().collect()
    }

    pub fn transactions(&self) -> Vec<TransactionRecord> {
        self.lock().transactions.values().copied().collect()
    }

    /// Durable balance of `id`, if the user row exists.
    pub fn user_balance(&self, id: u64) -> Option<f64> {
        self.lock().users.get(&id).copied()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Storage for Memory {
    fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.check_write(user.id)?;
        if inner.users.contains_key(&user.id) {
            return Err(StoreError::Conflict {
                table: "users",
                id: user.id,
            });
        }
        inner.users.insert(user.id, user.balance);
        Ok(())
    }

    fn insert_deposit(&self, record: &DepositRecord) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.check_write(record.id)?;
        if inner.deposits.contains_key(&record.id) {
            return Err(StoreError::Conflict {
                table: "deposits",
                id: record.id,
            });
        }
        let Some(balance) = inner.users.get_mut(&record.user_id) else {
            return Err(StoreError::MissingUser(record.user_id));
        };
        *balance = record.balance_after;
        inner.deposits.insert(record.id, *record);
        Ok(())
    }

    fn insert_transaction(&self, record: &TransactionRecord) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.check_write(record.id)?;
        if inner.transactions.contains_key(&record.id) {
            return Err(StoreError::Conflict {
                table: "transactions",
                id: record.id,
            });
        }
        let Some(balance) = inner.users.get_mut(&record.user_id) else {
            return Err(StoreError::MissingUser(record.user_id));
        };
        *balance = record.balance_after;
        inner.transactions.insert(record.id, *record);
        Ok(())
    }

    fn load(&self) -> Result<Snapshot, StoreError> {
        let inner = self.lock();
        if inner.closed {
            return Err(StoreError::Closed);
        }
        let users = inner
            .users
            .iter()
            .map(|(&id, &balance)| User::new(id, balance))
            .collect::<Vec<_>>();
        let mut statistics: HashMap<u64, Statistic> = users
            .iter()
            .map(|user| (user.id, Statistic::new(user.id)))
            .collect();
        for deposit in inner.deposits.values() {
            if let Some(statistic) = statistics.get_mut(&deposit.user_id) {
                statistic.record_deposit(deposit.amount());
            }
        }
        for transaction in inner.transactions.values() {
            if let Some(statistic) = statistics.get_mut(&transaction.user_id) {
                statistic.record_transaction(transaction.kind, transaction.amount);
            }
        }
        Ok(Snapshot { users, statistics })
    }

    fn close(&self) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(StoreError::Closed);
        }
        inner.closed = true;
        Ok(())
    }
}
