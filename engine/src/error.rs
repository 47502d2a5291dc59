//! Error handling for the stock ledger engine
//!
//! Every operation returns a typed error so callers can tell "your input is
//! wrong" apart from "try again".

use rust_decimal::Decimal;
use serde::Serialize;
use shared::{ItemId, PoStatus};
use thiserror::Error;

/// Ledger error types
#[derive(Error, Debug)]
pub enum LedgerError {
    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Conflicts with stored state
    #[error("Batch number '{batch_number}' already exists for item {item_id}")]
    DuplicateBatchNumber { item_id: ItemId, batch_number: String },

    #[error("Insufficient stock for item {item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        item_id: ItemId,
        requested: Decimal,
        available: Decimal,
    },

    #[error("Adjustment of {requested} exceeds available stock of {available}")]
    AdjustmentExceedsStock { requested: Decimal, available: Decimal },

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: PoStatus, to: PoStatus },

    #[error("Conflict: {message}")]
    Conflict { resource: String, message: String },

    // Storage errors
    #[error("Storage timeout: {0}")]
    Timeout(String),

    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Invariant breaches
    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),
}

/// Coarse error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Storage,
    Integrity,
}

/// Serializable error description for callers that render messages
#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl LedgerError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        LedgerError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        LedgerError::NotFound(resource.into())
    }

    pub fn conflict(resource: impl Into<String>, message: impl Into<String>) -> Self {
        LedgerError::Conflict {
            resource: resource.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Validation { .. } => ErrorKind::Validation,
            LedgerError::NotFound(_) => ErrorKind::NotFound,
            LedgerError::DuplicateBatchNumber { .. }
            | LedgerError::InsufficientStock { .. }
            | LedgerError::AdjustmentExceedsStock { .. }
            | LedgerError::InvalidStateTransition { .. }
            | LedgerError::Conflict { .. } => ErrorKind::Conflict,
            LedgerError::Timeout(_) | LedgerError::Database(_) | LedgerError::Migration(_) => {
                ErrorKind::Storage
            }
            LedgerError::IntegrityViolation(_) => ErrorKind::Integrity,
        }
    }

    /// Only storage failures are worth retrying unchanged
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Storage
    }

    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Validation { .. } => "VALIDATION_ERROR",
            LedgerError::NotFound(_) => "NOT_FOUND",
            LedgerError::DuplicateBatchNumber { .. } => "DUPLICATE_BATCH_NUMBER",
            LedgerError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            LedgerError::AdjustmentExceedsStock { .. } => "ADJUSTMENT_EXCEEDS_STOCK",
            LedgerError::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            LedgerError::Conflict { .. } => "CONFLICT",
            LedgerError::Timeout(_) => "STORAGE_TIMEOUT",
            LedgerError::Database(_) => "DATABASE_ERROR",
            LedgerError::Migration(_) => "MIGRATION_ERROR",
            LedgerError::IntegrityViolation(_) => "INTEGRITY_VIOLATION",
        }
    }

    pub fn detail(&self) -> ErrorDetail {
        let field = match self {
            LedgerError::Validation { field, .. } => Some(field.clone()),
            LedgerError::Conflict { resource, .. } => Some(resource.clone()),
            LedgerError::DuplicateBatchNumber { .. } => Some("batch_number".to_string()),
            _ => None,
        };
        let message = match self {
            // Do not leak driver internals to end users
            LedgerError::Database(_) | LedgerError::Migration(_) => {
                "A database error occurred".to_string()
            }
            other => other.to_string(),
        };
        ErrorDetail {
            code: self.code().to_string(),
            kind: self.kind(),
            message,
            retryable: self.is_retryable(),
            field,
        }
    }

    /// Classify a driver error: lock waits, cancelled statements and
    /// serialization failures are timeouts; unique violations are conflicts.
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        if matches!(err, sqlx::Error::PoolTimedOut) {
            return LedgerError::Timeout("timed out acquiring a database connection".into());
        }

        let (code, constraint) = match &err {
            sqlx::Error::Database(db_err) => (
                db_err.code().map(|c| c.into_owned()),
                db_err.constraint().map(str::to_string),
            ),
            _ => (None, None),
        };

        match code.as_deref() {
            Some("55P03") => LedgerError::Timeout("timed out waiting for a row lock".into()),
            Some("57014") => LedgerError::Timeout("statement timed out".into()),
            Some("40001") | Some("40P01") => {
                LedgerError::Timeout("concurrent update, retry the operation".into())
            }
            Some("23505") => LedgerError::conflict(
                constraint.unwrap_or_else(|| "unique".to_string()),
                "A record with the same key already exists",
            ),
            _ => LedgerError::Database(err),
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        LedgerError::from_sqlx(err)
    }
}

impl From<validator::ValidationErrors> for LedgerError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let first = errors
            .field_errors()
            .into_iter()
            .next()
            .map(|(field, errs)| {
                let message = errs
                    .first()
                    .and_then(|e| e.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| format!("{} is invalid", field));
                (field.to_string(), message)
            });

        match first {
            Some((field, message)) => LedgerError::Validation { field, message },
            None => LedgerError::validation("input", "Invalid input"),
        }
    }
}

/// Result type alias for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Tag a pure validation result with the offending field
pub fn check_field(field: &str, result: Result<(), &'static str>) -> LedgerResult<()> {
    result.map_err(|message| LedgerError::validation(field, message))
}
