//! Canonical repository error taxonomy.
//!
//! # Responsibility
//! - Define the closed set of storage failure codes shared by all adapters.
//! - Map SQLite result codes onto that set.
//!
//! # Invariants
//! - Every adapter error carries exactly one `RepositoryErrorCode`.
//! - Backend signals with no mapping fall back to `Unknown`.
//! - The original backend error is kept as `source()`.

use crate::db::DbError;
use rusqlite::ErrorCode;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepositoryError>;

/// Storage failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryErrorCode {
    Connection,
    Transaction,
    TransactionRollback,
    SyntaxOrAccess,
    System,
    Data,
    UniqueViolation,
    ConstraintViolation,
    NotFound,
    Unknown,
}

impl RepositoryErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connection => "connection_error",
            Self::Transaction => "transaction_error",
            Self::TransactionRollback => "transaction_rollback_error",
            Self::SyntaxOrAccess => "syntax_or_access_error",
            Self::System => "system_error",
            Self::Data => "data_error",
            Self::UniqueViolation => "unique_violation",
            Self::ConstraintViolation => "constraint_violation",
            Self::NotFound => "not_found",
            Self::Unknown => "unknown_error",
        }
    }
}

impl Display for RepositoryErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Repository failure with its canonical code and backend cause.
#[derive(Debug)]
pub struct RepositoryError {
    pub code: RepositoryErrorCode,
    pub message: String,
    cause: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl RepositoryError {
    pub fn new(code: RepositoryErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(
        code: RepositoryErrorCode,
        message: impl Into<String>,
        cause: impl Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::new(RepositoryErrorCode::Data, message)
    }

    /// Error raised when the shared connection lock is poisoned.
    pub(crate) fn poisoned() -> Self {
        Self::new(
            RepositoryErrorCode::System,
            "storage connection lock poisoned",
        )
    }
}

impl Display for RepositoryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl Error for RepositoryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn Error + 'static))
    }
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(value: rusqlite::Error) -> Self {
        let code = sqlite_error_code(&value);
        let message = value.to_string();
        Self::with_cause(code, message, value)
    }
}

impl From<DbError> for RepositoryError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Sqlite(err) => {
                let mut mapped = Self::from(err);
                if mapped.code == RepositoryErrorCode::Unknown {
                    mapped.code = RepositoryErrorCode::Connection;
                }
                mapped
            }
            other => {
                let message = other.to_string();
                Self::with_cause(RepositoryErrorCode::Connection, message, other)
            }
        }
    }
}

/// Maps a rusqlite error onto the canonical code set.
pub fn sqlite_error_code(err: &rusqlite::Error) -> RepositoryErrorCode {
    if let Some(failure) = err.sqlite_error() {
        return match failure.code {
            ErrorCode::ConstraintViolation => match failure.extended_code {
                rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                    RepositoryErrorCode::UniqueViolation
                }
                _ => RepositoryErrorCode::ConstraintViolation,
            },
            ErrorCode::CannotOpen
            | ErrorCode::NotADatabase
            | ErrorCode::FileLockingProtocolFailed => RepositoryErrorCode::Connection,
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                RepositoryErrorCode::TransactionRollback
            }
            ErrorCode::OperationAborted | ErrorCode::OperationInterrupted => {
                RepositoryErrorCode::Transaction
            }
            ErrorCode::PermissionDenied
            | ErrorCode::ReadOnly
            | ErrorCode::AuthorizationForStatementDenied => RepositoryErrorCode::SyntaxOrAccess,
            ErrorCode::SystemIoFailure
            | ErrorCode::DiskFull
            | ErrorCode::OutOfMemory
            | ErrorCode::InternalMalfunction
            | ErrorCode::DatabaseCorrupt
            | ErrorCode::NoLargeFileSupport => RepositoryErrorCode::System,
            ErrorCode::TooBig | ErrorCode::TypeMismatch | ErrorCode::ParameterOutOfRange => {
                RepositoryErrorCode::Data
            }
            // generic SQLITE_ERROR: syntax errors, missing tables/columns
            ErrorCode::Unknown if failure.extended_code == rusqlite::ffi::SQLITE_ERROR => {
                RepositoryErrorCode::SyntaxOrAccess
            }
            _ => RepositoryErrorCode::Unknown,
        };
    }

    match err {
        rusqlite::Error::QueryReturnedNoRows => RepositoryErrorCode::NotFound,
        rusqlite::Error::FromSqlConversionFailure(..)
        | rusqlite::Error::IntegralValueOutOfRange(..)
        | rusqlite::Error::Utf8Error(_)
        | rusqlite::Error::InvalidColumnType(..) => RepositoryErrorCode::Data,
        rusqlite::Error::InvalidColumnIndex(_)
        | rusqlite::Error::InvalidColumnName(_)
        | rusqlite::Error::InvalidParameterName(_)
        | rusqlite::Error::InvalidParameterCount(..)
        | rusqlite::Error::InvalidQuery
        | rusqlite::Error::MultipleStatement => RepositoryErrorCode::SyntaxOrAccess,
        _ => RepositoryErrorCode::Unknown,
    }
}
