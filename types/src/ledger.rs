use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// A user and their current balance.
///
/// The balance is never negative as observed by any reader of the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub balance: f64,
}

impl User {
    pub fn new(id: u64, balance: f64) -> Self {
        Self { id, balance }
    }
}

/// Aggregates derived from a user's deposits and transactions.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Statistic {
    pub user_id: u64,
    pub deposit_count: u64,
    pub deposit_sum: f64,
    pub bet_count: u64,
    pub bet_sum: f64,
    pub win_count: u64,
    pub win_sum: f64,
}

impl Statistic {
    pub fn new(user_id: u64) -> Self {
        Self {
            user_id,
            ..Self::default()
        }
    }

    pub fn record_deposit(&mut self, amount: f64) {
        self.deposit_count += 1;
        self.deposit_sum += amount;
    }

    pub fn record_transaction(&mut self, kind: TransactionType, amount: f64) {
        match kind {
            TransactionType::Bet => {
                self.bet_count += 1;
                self.bet_sum += amount;
            }
            TransactionType::Win => {
                self.win_count += 1;
                self.win_sum += amount;
            }
        }
    }
}

/// Request to credit `amount` to a user.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Deposit {
    pub id: u64,
    pub user_id: u64,
    pub amount: f64,
}

/// Kind of a balance-moving transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransactionType {
    /// Decreases the balance.
    Bet,
    /// Increases the balance.
    Win,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Bet => "Bet",
            TransactionType::Win => "Win",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a wire value does not name a known [TransactionType].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownTransactionType(pub String);

impl fmt::Display for UnknownTransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid transaction type: {:?}", self.0)
    }
}

impl std::error::Error for UnknownTransactionType {}

impl FromStr for TransactionType {
    type Err = UnknownTransactionType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Bet" => Ok(TransactionType::Bet),
            "Win" => Ok(TransactionType::Win),
            other => Err(UnknownTransactionType(other.to_string())),
        }
    }
}

/// Request to move a user's balance by `amount` in the direction given by `kind`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transaction {
    pub id: u64,
    pub user_id: u64,
    pub kind: TransactionType,
    pub amount: f64,
}

/// Persisted audit row for a successful deposit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepositRecord {
    pub id: u64,
    pub user_id: u64,
    pub balance_before: f64,
    pub balance_after: f64,
    /// Unix seconds.
    pub date: i64,
}

impl DepositRecord {
    pub fn amount(&self) -> f64 {
        self.balance_after - self.balance_before
    }
}

/// Persisted audit row for a successful bet or win.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransactionRecord {
    pub id: u64,
    pub user_id: u64,
    pub kind: TransactionType,
    pub amount: f64,
    pub balance_before: f64,
    pub balance_after: f64,
    /// Unix seconds.
    pub date: i64,
}
