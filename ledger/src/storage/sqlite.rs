use super::{schema, Snapshot, Storage};
use crate::StoreError;
use cake_types::{DepositRecord, Statistic, TransactionRecord, TransactionType, User};
use rusqlite::{params, Connection, OpenFlags};
use std::{
    collections::HashMap,
    path::Path,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tracing::{debug, warn};

/// [Storage] backed by a single SQLite connection.
///
/// Concurrent callers share the connection; writes are serialized by the
/// connection mutex and by SQLite itself.
pub struct Sqlite {
    conn: Mutex<Option<Connection>>,
}

impl Sqlite {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(busy_timeout)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(path = %path.display(), journal_mode = %mode, "opened database");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(schema::CREATE_TABLES)?;
        conn.execute_batch(schema::CREATE_INDEXES)?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        // A panic while holding the guard cannot leave a half-applied SQL
        // transaction behind (it rolls back on drop), so the connection is still usable.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Storage for Sqlite {
    fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let guard = self.lock();
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;
        conn.prepare_cached(schema::INSERT_USER)?
            .execute(params![user.id, user.balance])?;
        Ok(())
    }

    fn insert_deposit(&self, record: &DepositRecord) -> Result<(), StoreError> {
        let mut guard = self.lock();
        let conn = guard.as_mut().ok_or(StoreError::Closed)?;
        let tx = conn.transaction()?;
        tx.execute(
            schema::INSERT_DEPOSIT,
            params![
                record.id,
                record.user_id,
                record.balance_before,
                record.balance_after,
                record.date
            ],
        )?;
        if tx.execute(
            schema::UPDATE_BALANCE,
            params![record.balance_after, record.user_id],
        )? != 1
        {
            return Err(StoreError::MissingUser(record.user_id));
        }
        tx.commit()?;
        Ok(())
    }

    fn insert_transaction(&self, record: &TransactionRecord) -> Result<(), StoreError> {
        let mut guard = self.lock();
        let conn = guard.as_mut().ok_or(StoreError::Closed)?;
        let tx = conn.transaction()?;
        tx.execute(
            schema::INSERT_TRANSACTION,
            params![
                record.id,
                record.user_id,
                record.kind.as_str(),
                record.amount,
                record.balance_before,
                record.balance_after,
                record.date
            ],
        )?;
        if tx.execute(
            schema::UPDATE_BALANCE,
            params![record.balance_after, record.user_id],
        )? != 1
        {
            return Err(StoreError::MissingUser(record.user_id));
        }
        tx.commit()?;
        Ok(())
    }

    fn load(&self) -> Result<Snapshot, StoreError> {
        let guard = self.lock();
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;

        // Load users
        let mut stmt = conn.prepare(schema::SELECT_USERS)?;
        let users = stmt
            .query_map([], |row| Ok(User::new(row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        let mut statistics: HashMap<u64, Statistic> = users
            .iter()
            .map(|user| (user.id, Statistic::new(user.id)))
            .collect();

        // Replay deposits
        let mut stmt = conn.prepare(schema::SELECT_DEPOSITS)?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let user_id: u64 = row.get(0)?;
            let Some(statistic) = statistics.get_mut(&user_id) else {
                warn!(user_id, "deposit references unknown user");
                continue;
            };
            let before: f64 = row.get(1)?;
            let after: f64 = row.get(2)?;
            statistic.record_deposit(after - before);
        }

        // Replay transactions
        let mut stmt = conn.prepare(schema::SELECT_TRANSACTIONS)?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let user_id: u64 = row.get(0)?;
            let Some(statistic) = statistics.get_mut(&user_id) else {
                warn!(user_id, "transaction references unknown user");
                continue;
            };
            let kind: String = row.get(1)?;
            match kind.parse::<TransactionType>() {
                Ok(kind) => statistic.record_transaction(kind, row.get(2)?),
                Err(err) => warn!(user_id, "skipping transaction: {}", err),
            }
        }

        Ok(Snapshot { users, statistics })
    }

    fn close(&self) -> Result<(), StoreError> {
        let conn = self.lock().take().ok_or(StoreError::Closed)?;
        conn.close().map_err(|(_, err)| StoreError::Sqlite(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deposit(id: u64, user_id: u64, before: f64, after: f64) -> DepositRecord {
        DepositRecord {
            id,
            user_id,
            balance_before: before,
            balance_after: after,
            date: 1_700_000_000,
        }
    }

    fn transaction(
        id: u64,
        user_id: u64,
        kind: TransactionType,
        amount: f64,
        before: f64,
        after: f64,
    ) -> TransactionRecord {
        TransactionRecord {
            id,
            user_id,
            kind,
            amount,
            balance_before: before,
            balance_after: after,
            date: 1_700_000_000,
        }
    }

    #[test]
    fn test_empty_load() {
        let store = Sqlite::open_in_memory().unwrap();
        assert_eq!(store.load().unwrap(), Snapshot::default());
    }

    #[test]
    fn test_load_aggregates() {
        let store = Sqlite::open_in_memory().unwrap();
        store.insert_user(&User::new(1, 100.0)).unwrap();
        store.insert_user(&User::new(2, 5.0)).unwrap();
        store.insert_deposit(&deposit(1, 1, 100.0, 150.0)).unwrap();
        store.insert_deposit(&deposit(2, 1, 150.0, 160.0)).unwrap();
        store
            .insert_transaction(&transaction(1, 1, TransactionType::Bet, 60.0, 160.0, 100.0))
            .unwrap();
        store
            .insert_transaction(&transaction(2, 1, TransactionType::Win, 30.0, 100.0, 130.0))
            .unwrap();
        store
            .insert_transaction(&transaction(3, 1, TransactionType::Win, 20.0, 130.0, 150.0))
            .unwrap();

        let mut snapshot = store.load().unwrap();
        snapshot.users.sort_by_key(|user| user.id);
        assert_eq!(
            snapshot.users,
            vec![User::new(1, 150.0), User::new(2, 5.0)]
        );

        let statistic = snapshot.statistics[&1];
        assert_eq!(statistic.deposit_count, 2);
        assert_eq!(statistic.deposit_sum, 60.0);
        assert_eq!(statistic.bet_count, 1);
        assert_eq!(statistic.bet_sum, 60.0);
        assert_eq!(statistic.win_count, 2);
        assert_eq!(statistic.win_sum, 50.0);
        assert_eq!(snapshot.statistics[&2], Statistic::new(2));
    }

    #[test]
    fn test_unknown_transaction_type_skipped() {
        let store = Sqlite::open_in_memory().unwrap();
        store.insert_user(&User::new(1, 10.0)).unwrap();
        {
            let guard = store.lock();
            let conn = guard.as_ref().unwrap();
            conn.execute(
                schema::INSERT_TRANSACTION,
                params![9u64, 1u64, "Refund", 5.0, 10.0, 15.0, 0i64],
            )
            .unwrap();
        }
        let snapshot = store.load().unwrap();
        assert_eq!(snapshot.statistics[&1], Statistic::new(1));
    }

    #[test]
    fn test_duplicate_user_rejected() {
        let store = Sqlite::open_in_memory().unwrap();
        store.insert_user(&User::new(1, 10.0)).unwrap();
        assert!(matches!(
            store.insert_user(&User::new(1, 20.0)),
            Err(StoreError::Sqlite(_))
        ));
        assert_eq!(store.load().unwrap().users, vec![User::new(1, 10.0)]);
    }

    #[test]
    fn test_failed_deposit_rolls_back_balance() {
        let store = Sqlite::open_in_memory().unwrap();
        store.insert_user(&User::new(1, 100.0)).unwrap();
        store.insert_deposit(&deposit(1, 1, 100.0, 150.0)).unwrap();

        // Duplicate id: the insert fails before the balance update runs.
        assert!(store.insert_deposit(&deposit(1, 1, 150.0, 200.0)).is_err());

        // Unknown user: the insert succeeds but the update touches nothing.
        assert!(matches!(
            store.insert_deposit(&deposit(2, 42, 0.0, 10.0)),
            Err(StoreError::MissingUser(42))
        ));

        let snapshot = store.load().unwrap();
        assert_eq!(snapshot.users, vec![User::new(1, 150.0)]);
        assert_eq!(snapshot.statistics[&1].deposit_count, 1);
        assert!(!snapshot.statistics.contains_key(&42));
    }

    #[test]
    fn test_reopen_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cake.db");
        {
            let store = Sqlite::open(&path, Duration::from_secs(1)).unwrap();
            store.insert_user(&User::new(1, 100.0)).unwrap();
            store
                .insert_transaction(&transaction(1, 1, TransactionType::Bet, 40.0, 100.0, 60.0))
                .unwrap();
            store.close().unwrap();
        }
        let store = Sqlite::open(&path, Duration::from_secs(1)).unwrap();
        let snapshot = store.load().unwrap();
        assert_eq!(snapshot.users, vec![User::new(1, 60.0)]);
        assert_eq!(snapshot.statistics[&1].bet_count, 1);
        assert_eq!(snapshot.statistics[&1].bet_sum, 40.0);
    }

    #[test]
    fn test_closed() {
        let store = Sqlite::open_in_memory().unwrap();
        store.close().unwrap();
        assert!(matches!(store.close(), Err(StoreError::Closed)));
        assert!(matches!(
            store.insert_user(&User::new(1, 1.0)),
            Err(StoreError::Closed)
        ));
        assert!(matches!(store.load(), Err(StoreError::Closed)));
    }
}
