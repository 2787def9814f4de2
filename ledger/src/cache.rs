use crate::storage::Snapshot;
use cake_types::{Statistic, User};
use std::{
    collections::HashMap,
    ops::Deref,
    sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock},
};

/// Cached state of one user. Plain data: the guards live in the [Slot], not here.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Account {
    pub user: User,
    pub statistic: Statistic,
}

impl Account {
    pub fn new(user: User) -> Self {
        Self {
            user,
            statistic: Statistic::new(user.id),
        }
    }
}

/// One cached user.
///
/// Writers serialize on `writer`, which they hold across the durable write.
/// Readers only touch `committed`, which is replaced after a write commits,
/// so a read never waits on storage I/O.
pub(crate) struct Slot {
    writer: Mutex<Account>,
    committed: RwLock<Account>,
}

impl Slot {
    fn new(account: Account) -> Self {
        Self {
            writer: Mutex::new(account),
            committed: RwLock::new(account),
        }
    }

    /// Acquire the per-user write guard. Critical sections only do arithmetic
    /// after the durable write, so a poisoned guard still protects a consistent account.
    pub(crate) fn lock(&self) -> WriteGuard<'_> {
        WriteGuard {
            account: self.writer.lock().unwrap_or_else(PoisonError::into_inner),
            committed: &self.committed,
        }
    }

    /// Last committed state.
    pub(crate) fn snapshot(&self) -> Account {
        *self
            .committed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive access to one user's account until dropped.
pub(crate) struct WriteGuard<'a> {
    account: MutexGuard<'a, Account>,
    committed: &'a RwLock<Account>,
}

impl WriteGuard<'_> {
    /// Apply `update` and publish the result to readers.
    pub(crate) fn commit(&mut self, update: impl FnOnce(&mut Account)) {
        update(&mut self.account);
        *self
            .committed
            .write()
            .unwrap_or_else(PoisonError::into_inner) = *self.account;
    }
}

impl Deref for WriteGuard<'_> {
    type Target = Account;

    fn deref(&self) -> &Account {
        &self.account
    }
}

/// Shared handle to one cached user. Entries are never removed, so a clone stays valid forever.
pub(crate) type Entry = Arc<Slot>;

/// In-memory snapshot of every user.
///
/// The map itself is behind an [RwLock] that is only write-locked to add an entry.
#[derive(Default)]
pub struct Cache {
    accounts: RwLock<HashMap<u64, Entry>>,
}

impl Cache {
    /// Rebuild the cache from a full storage scan.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let Snapshot {
            users,
            mut statistics,
        } = snapshot;
        let accounts = users
            .into_iter()
            .map(|user| {
                let statistic = statistics
                    .remove(&user.id)
                    .unwrap_or_else(|| Statistic::new(user.id));
                (user.id, Arc::new(Slot::new(Account { user, statistic })))
            })
            .collect();
        Self {
            accounts: RwLock::new(accounts),
        }
    }

    pub fn len(&self) -> usize {
        self.accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: u64) -> bool {
        self.accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    pub(crate) fn entry(&self, id: u64) -> Option<Entry> {
        self.accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Copy of the last committed state of `id`.
    pub fn get(&self, id: u64) -> Option<Account> {
        Some(self.entry(id)?.snapshot())
    }

    /// Add a new account. Returns false (and changes nothing) if `id` is already cached.
    pub(crate) fn insert(&self, account: Account) -> bool {
        let mut accounts = self
            .accounts
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if accounts.contains_key(&account.user.id) {
            return false;
        }
        accounts.insert(account.user.id, Arc::new(Slot::new(account)));
        true
    }
}
