//! JSON bodies exchanged with the HTTP surface.
//!
//! Field names follow the wire format of the public API (`depositId`, `userId`, ...).

use crate::ledger::{Deposit, Statistic, Transaction, TransactionType, UnknownTransactionType, User};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub token: String,
    pub id: u64,
    pub balance: f64,
}

impl From<CreateUserRequest> for User {
    fn from(request: CreateUserRequest) -> Self {
        User::new(request.id, request.balance)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRequest {
    #[serde(default)]
    pub token: String,
    pub deposit_id: u64,
    pub user_id: u64,
    pub amount: f64,
}

impl From<DepositRequest> for Deposit {
    fn from(request: DepositRequest) -> Self {
        Deposit {
            id: request.deposit_id,
            user_id: request.user_id,
            amount: request.amount,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    #[serde(default)]
    pub token: String,
    pub transaction_id: u64,
    pub user_id: u64,
    /// Kept as a raw string so unknown kinds surface as a validation failure
    /// rather than a malformed request.
    #[serde(rename = "type")]
    pub kind: String,
    pub amount: f64,
}

impl TryFrom<TransactionRequest> for Transaction {
    type Error = UnknownTransactionType;

    fn try_from(request: TransactionRequest) -> Result<Self, Self::Error> {
        Ok(Transaction {
            id: request.transaction_id,
            user_id: request.user_id,
            kind: request.kind.parse::<TransactionType>()?,
            amount: request.amount,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: u64,
    pub balance: f64,
    pub deposit_count: u64,
    pub deposit_sum: f64,
    pub bet_count: u64,
    pub bet_sum: f64,
    pub win_count: u64,
    pub win_sum: f64,
}

impl From<(User, Statistic)> for UserResponse {
    fn from((user, statistic): (User, Statistic)) -> Self {
        Self {
            id: user.id,
            balance: user.balance,
            deposit_count: statistic.deposit_count,
            deposit_sum: statistic.deposit_sum,
            bet_count: statistic.bet_count,
            bet_sum: statistic.bet_sum,
            win_count: statistic.win_count,
            win_sum: statistic.win_sum,
        }
    }
}

/// Returned by deposit and transaction endpoints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub balance: f64,
    pub error: String,
}

impl BalanceResponse {
    pub fn new(balance: f64) -> Self {
        Self {
            balance,
            error: String::new(),
        }
    }
}
