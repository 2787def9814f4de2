use cake_types::UnknownTransactionType;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by a [crate::Storage] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("user {0} has no durable row")]
    MissingUser(u64),
    #[error("duplicate {table} id {id}")]
    Conflict { table: &'static str, id: u64 },
    #[error("store is closed")]
    Closed,
    #[error("id {0} does not fit in a signed 64-bit integer")]
    IdOutOfRange(u64),
    #[error("injected failure: {0}")]
    Injected(String),
}

/// A business rule rejected the request.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum Rejection {
    #[error("User already exists")]
    UserExists(u64),
    #[error("User balance may not be negative")]
    NegativeBalance(f64),
    #[error("Value must be a finite number")]
    NotFinite(f64),
    #[error("Amount must be greater than 0")]
    NonPositiveAmount(f64),
    #[error("User doesn't have enough funds: balance {balance}, requested {amount}")]
    InsufficientFunds { balance: f64, amount: f64 },
    #[error("Invalid transaction type")]
    InvalidTransactionType(String),
    #[error("Identifier is out of range")]
    IdOutOfRange(u64),
}

impl From<UnknownTransactionType> for Rejection {
    fn from(value: UnknownTransactionType) -> Self {
        Rejection::InvalidTransactionType(value.0)
    }
}

/// Discriminant of an [Error], for callers that only need to branch on the class of failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Transaction,
    Internal,
}

/// Every failure returned by the [crate::Ledger].
#[derive(Debug, Error)]
pub enum Error {
    /// Caller input violated a business rule. Safe to show verbatim.
    #[error("{0}")]
    Validation(#[from] Rejection),
    /// The referenced user is not in the cache.
    #[error("User not found: {0}")]
    NotFound(u64),
    /// The durable write of a money-moving operation failed. No state changed.
    #[error("transaction failed: {0}")]
    Transaction(#[source] StoreError),
    /// Infrastructure failure unrelated to caller input.
    #[error("{message}: {source}")]
    Internal {
        message: &'static str,
        #[source]
        source: StoreError,
    },
}

impl From<UnknownTransactionType> for Error {
    fn from(value: UnknownTransactionType) -> Self {
        Error::Validation(value.into())
    }
}

impl Error {
    pub(crate) fn internal(message: &'static str, source: StoreError) -> Self {
        Error::Internal { message, source }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Transaction(_) => ErrorKind::Transaction,
            Error::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Message that may be returned to an untrusted caller.
    ///
    /// Only validation failures carry their own text; everything else is replaced
    /// by a fixed string so diagnostics never leak.
    pub fn public_message(&self) -> String {
        match self {
            Error::Validation(rejection) => rejection.to_string(),
            Error::NotFound(_) => "User not found".to_string(),
            Error::Transaction(_) => "Transaction error".to_string(),
            Error::Internal { .. } => "Internal server error".to_string(),
        }
    }
}
