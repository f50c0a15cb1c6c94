use thiserror::Error;

/// Numeric error codes reported by the store client.
pub mod codes {
    pub const TRANSACTION_TOO_OLD: i32 = 1007;
    pub const FUTURE_VERSION: i32 = 1009;
    pub const NOT_COMMITTED: i32 = 1020;
    pub const COMMIT_UNKNOWN_RESULT: i32 = 1021;
    pub const TRANSACTION_CANCELLED: i32 = 1025;
    pub const DATABASE_LOCKED: i32 = 1038;
    pub const FILE_NOT_FOUND: i32 = 1513;
    pub const KEY_OUTSIDE_LEGAL_RANGE: i32 = 2004;
    pub const INVERTED_RANGE: i32 = 2005;
    pub const CONNECTION_STRING_INVALID: i32 = 2104;
    pub const INTERNAL_ERROR: i32 = 4100;
}

/// How a store error should be treated by a retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorClass {
    /// Conflict or contention that may mean a concurrent bootstrap won,
    /// or that our own commit landed without us hearing about it.
    NewDatabaseContention,

    /// Transient; retry after the store's backoff.
    Retryable,

    /// Permanent for this transaction.
    NotRetryable,
}

/// An error reported by the transactional store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Store error {code}: {message}")]
pub struct StoreError {
    pub code: i32,
    pub message: String,
}

impl StoreError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Builds an error carrying the store's standard description for `code`.
    pub fn from_code(code: i32) -> Self {
        let message = match code {
            codes::TRANSACTION_TOO_OLD => "Transaction is too old to perform reads or be committed",
            codes::FUTURE_VERSION => "Request for future version",
            codes::NOT_COMMITTED => "Transaction not committed due to conflict with another transaction",
            codes::COMMIT_UNKNOWN_RESULT => "Transaction may or may not have committed",
            codes::TRANSACTION_CANCELLED => "Operation aborted because the transaction was cancelled",
            codes::DATABASE_LOCKED => "Database is locked",
            codes::FILE_NOT_FOUND => "File not found",
            codes::KEY_OUTSIDE_LEGAL_RANGE => "Key outside legal range",
            codes::INVERTED_RANGE => "Range begin key larger than end key",
            codes::CONNECTION_STRING_INVALID => "Connection string invalid",
            codes::INTERNAL_ERROR => "An internal error occurred",
            _ => "Unknown error",
        };
        Self::new(code, message)
    }

    pub fn class(&self) -> StoreErrorClass {
        match self.code {
            codes::NOT_COMMITTED | codes::TRANSACTION_TOO_OLD => {
                StoreErrorClass::NewDatabaseContention
            }
            codes::FUTURE_VERSION | codes::COMMIT_UNKNOWN_RESULT => StoreErrorClass::Retryable,
            _ => StoreErrorClass::NotRetryable,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() != StoreErrorClass::NotRetryable
    }

    pub fn is_new_database_contention(&self) -> bool {
        self.class() == StoreErrorClass::NewDatabaseContention
    }
}

#[derive(Error, Debug)]
pub enum AdminError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Database has already been created")]
    AlreadyInitialized,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Giving up after {attempts} attempts: {last_error}")]
    RetryLimitExceeded { attempts: u32, last_error: StoreError },

    #[error("I/O error: {0}")]
    IoError(String),
}

impl AdminError {
    /// The store error code behind this failure, if any.
    pub fn store_code(&self) -> Option<i32> {
        match self {
            AdminError::Store(err) => Some(err.code),
            AdminError::RetryLimitExceeded { last_error, .. } => Some(last_error.code),
            _ => None,
        }
    }
}

impl From<std::io::Error> for AdminError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AdminError>;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contention_codes_are_retryable() {
        for code in [codes::NOT_COMMITTED, codes::TRANSACTION_TOO_OLD] {
            let err = StoreError::from_code(code);
            assert!(err.is_new_database_contention());
            assert!(err.is_retryable());
        }
    }

    #[test]
    fn test_classification() {
        assert_eq!(
            StoreError::from_code(codes::COMMIT_UNKNOWN_RESULT).class(),
            StoreErrorClass::Retryable
        );
        assert_eq!(
            StoreError::from_code(codes::DATABASE_LOCKED).class(),
            StoreErrorClass::NotRetryable
        );
        assert!(!StoreError::new(9999, "mystery").is_retryable());
    }

    #[test]
    fn test_store_code_passthrough() {
        let err: AdminError = StoreError::from_code(codes::KEY_OUTSIDE_LEGAL_RANGE).into();
        assert_eq!(err.store_code(), Some(codes::KEY_OUTSIDE_LEGAL_RANGE));
        assert_eq!(AdminError::AlreadyInitialized.store_code(), None);
    }
}
