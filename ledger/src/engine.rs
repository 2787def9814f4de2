use crate::{
    cache::{Account, Cache},
    storage::MAX_ID,
    Error, Rejection, Result, Storage, StoreError,
};
use cake_types::{
    Deposit, DepositRecord, Statistic, Transaction, TransactionRecord, TransactionType, User,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, PoisonError,
    },
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::{debug, error, info, warn};

/// Balance ledger: validates requests, writes the audit trail, then updates the cache.
///
/// Mutations of one user are serialized by that user's cache entry lock, which
/// is held across the durable write. Mutations of different users never wait
/// on each other inside the ledger.
pub struct Ledger<S: Storage> {
    storage: S,
    cache: Cache,
    /// Serializes user creation so the existence check and the insert are atomic.
    creating: Mutex<()>,
    closed: AtomicBool,
}

impl<S: Storage> Ledger<S> {
    /// Rebuild the cache from `storage` and return a ready ledger.
    pub fn open(storage: S) -> Result<Self> {
        let snapshot = storage
            .load()
            .map_err(|e| Error::internal("Can't load cached users", e))?;
        let cache = Cache::from_snapshot(snapshot);
        info!(users = cache.len(), "loaded ledger cache");

        Ok(Self {
            storage,
            cache,
            creating: Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    /// Number of cached users.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn create_user(&self, user: User) -> Result<()> {
        self.ensure_open()?;
        let _creating = self
            .creating
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        validate_id(user.id)?;
        if self.cache.contains(user.id) {
            return Err(Rejection::UserExists(user.id).into());
        }
        if !user.balance.is_finite() {
            return Err(Rejection::NotFinite(user.balance).into());
        }
        if user.balance < 0.0 {
            return Err(Rejection::NegativeBalance(user.balance).into());
        }

        self.storage
            .insert_user(&user)
            .map_err(|e| Error::internal("Error executing insert user db request", e))?;
        // `creating` is held, so nobody else can have inserted this id meanwhile.
        let inserted = self.cache.insert(Account::new(user));
        if !inserted {
            error!(user_id = user.id, "user appeared in cache during creation");
        }
        debug_assert!(inserted, "user {} inserted twice", user.id);
        debug!(user_id = user.id, balance = user.balance, "created user");
        Ok(())
    }

    /// Credit a user and return the new balance.
    pub fn create_deposit(&self, deposit: Deposit) -> Result<f64> {
        self.ensure_open()?;
        validate_id(deposit.id)?;
        validate_amount(deposit.amount)?;
        let entry = self
            .cache
            .entry(deposit.user_id)
            .ok_or(Error::NotFound(deposit.user_id))?;

        let mut account = entry.lock();
        let balance_before = account.user.balance;
        let balance_after = balance_before + deposit.amount;
        if balance_after.is_infinite() {
            return Err(Rejection::NotFinite(balance_after).into());
        }

        let record = DepositRecord {
            id: deposit.id,
            user_id: deposit.user_id,
            balance_before,
            balance_after,
            date: now(),
        };
        if let Err(e) = self.storage.insert_deposit(&record) {
            warn!(
                user_id = deposit.user_id,
                deposit_id = deposit.id,
                error = %e,
                "failed to persist deposit"
            );
            return Err(Error::Transaction(e));
        }

        // Reconciliation re-derives the amount from the balances, so the cache must too.
        account.commit(|account| {
            account.user.balance = balance_after;
            account.statistic.record_deposit(record.amount());
        });
        debug!(
            user_id = deposit.user_id,
            deposit_id = deposit.id,
            balance_before,
            balance_after,
            "applied deposit"
        );
        Ok(balance_after)
    }

    /// Apply a bet or a win and return the new balance.
    pub fn create_transaction(&self, transaction: Transaction) -> Result<f64> {
        self.ensure_open()?;
        validate_id(transaction.id)?;
        validate_amount(transaction.amount)?;
        let entry = self
            .cache
            .entry(transaction.user_id)
            .ok_or(Error::NotFound(transaction.user_id))?;

        let mut account = entry.lock();
        let balance_before = account.user.balance;
        let balance_after = match transaction.kind {
            TransactionType::Bet => {
                let balance_after = balance_before - transaction.amount;
                if balance_after < 0.0 {
                    return Err(Rejection::InsufficientFunds {
                        balance: balance_before,
                        amount: transaction.amount,
                    }
                    .into());
                }
                balance_after
            }
            TransactionType::Win => balance_before + transaction.amount,
        };
        if balance_after.is_infinite() {
            return Err(Rejection::NotFinite(balance_after).into());
        }

        let record = TransactionRecord {
            id: transaction.id,
            user_id: transaction.user_id,
            kind: transaction.kind,
            amount: transaction.amount,
            balance_before,
            balance_after,
            date: now(),
        };
        if let Err(e) = self.storage.insert_transaction(&record) {
            warn!(
                user_id = transaction.user_id,
                transaction_id = transaction.id,
                error = %e,
                "failed to persist transaction"
            );
            return Err(Error::Transaction(e));
        }

        account.commit(|account| {
            account.user.balance = balance_after;
            account
                .statistic
                .record_transaction(transaction.kind, transaction.amount);
        });
        debug!(
            user_id = transaction.user_id,
            transaction_id = transaction.id,
            kind = %transaction.kind,
            balance_before,
            balance_after,
            "applied transaction"
        );
        Ok(balance_after)
    }

    /// Read a user and their statistic from the cache.
    pub fn get_user(&self, id: u64) -> Result<(User, Statistic)> {
        self.ensure_open()?;
        let account = self.cache.get(id).ok_or(Error::NotFound(id))?;
        if account.statistic.user_id != account.user.id {
            warn!(user_id = id, "Not found statistic for user");
            return Err(Error::NotFound(id));
        }
        Ok((account.user, account.statistic))
    }

    /// Stop accepting operations and release the storage. Only the first call has an effect.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.storage.close().map_err(|e| {
            error!(error = %e, "Can't close database");
            Error::internal("Can't close database", e)
        })?;
        info!("Database connection closed");
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::internal("ledger is closed", StoreError::Closed));
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn cache(&self) -> &Cache {
        &self.cache
    }
}

/// Identities are stored as SQLite INTEGER, which is signed.
fn validate_id(id: u64) -> Result<()> {
    if id > MAX_ID {
        return Err(Rejection::IdOutOfRange(id).into());
    }
    Ok(())
}

fn validate_amount(amount: f64) -> Result<()> {
    if !amount.is_finite() {
        return Err(Rejection::NotFinite(amount).into());
    }
    if amount <= 0.0 {
        return Err(Rejection::NonPositiveAmount(amount).into());
    }
    Ok(())
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
