//! Unified error model for the QA core
//!
//! Callers outside the crate (UI glue, schedulers) consume errors as data:
//! a stable code, a user-facing message, an optional internal detail for
//! logging, and a retry hint. Module-level error enums convert into this
//! shape at the API boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error categories for grouping and display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// Field-level validation failures (blocked locally, never sent)
    Validation,
    /// Transport/timeout failures against the record store
    Network,
    /// Store rejected the request (auth, rate limit, API error)
    Store,
    /// Submission-level failures (empty ledger, partial acceptance)
    Submission,
    /// Report aggregation failed as a whole
    Aggregation,
    /// Resource not found
    NotFound,
    /// Internal errors (unexpected state, bugs)
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Network => write!(f, "network"),
            Self::Store => write!(f, "store"),
            Self::Submission => write!(f, "submission"),
            Self::Aggregation => write!(f, "aggregation"),
            Self::NotFound => write!(f, "not_found"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Stable error codes, format: CATEGORY_SPECIFIC_ERROR
pub struct ErrorCode;

impl ErrorCode {
    pub const VALIDATION_INVALID_SAMPLE_ID: &'static str = "VALIDATION_INVALID_SAMPLE_ID";
    pub const VALIDATION_INVALID_CALL_FRAME: &'static str = "VALIDATION_INVALID_CALL_FRAME";
    pub const VALIDATION_INVALID_SCORE: &'static str = "VALIDATION_INVALID_SCORE";
    pub const VALIDATION_INVALID_VALUE: &'static str = "VALIDATION_INVALID_VALUE";
    pub const VALIDATION_UNKNOWN_FIELD: &'static str = "VALIDATION_UNKNOWN_FIELD";
    pub const VALIDATION_NOT_EDITABLE: &'static str = "VALIDATION_NOT_EDITABLE";

    pub const NETWORK_CONNECTION_FAILED: &'static str = "NETWORK_CONNECTION_FAILED";
    pub const NETWORK_TIMEOUT: &'static str = "NETWORK_TIMEOUT";
    pub const NETWORK_RATE_LIMITED: &'static str = "NETWORK_RATE_LIMITED";

    pub const STORE_AUTH_FAILED: &'static str = "STORE_AUTH_FAILED";
    pub const STORE_API_ERROR: &'static str = "STORE_API_ERROR";
    pub const STORE_PARSE_ERROR: &'static str = "STORE_PARSE_ERROR";
    pub const STORE_NOT_CONFIGURED: &'static str = "STORE_NOT_CONFIGURED";

    pub const SUBMIT_EMPTY_LEDGER: &'static str = "SUBMIT_EMPTY_LEDGER";
    pub const SUBMIT_EMPTY_REASONS: &'static str = "SUBMIT_EMPTY_REASONS";
    pub const SUBMIT_IN_FLIGHT: &'static str = "SUBMIT_IN_FLIGHT";

    pub const AUDIT_WRITE_FAILED: &'static str = "AUDIT_WRITE_FAILED";
    pub const SESSION_SNAPSHOT_FAILED: &'static str = "SESSION_SNAPSHOT_FAILED";

    pub const NOT_FOUND_RECORD: &'static str = "NOT_FOUND_RECORD";

    pub const INTERNAL_ERROR: &'static str = "INTERNAL_ERROR";
}

/// Application error surfaced across the API boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub retryable: bool,
    pub category: ErrorCategory,
}

impl AppError {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        category: ErrorCategory,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            detail: None,
            retryable: false,
            category,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }

    pub fn record_not_found(record_number: i64) -> Self {
        Self::new(
            ErrorCode::NOT_FOUND_RECORD,
            format!("Record not found: {}", record_number),
            ErrorCategory::NotFound,
        )
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::INTERNAL_ERROR,
            "An internal error occurred",
            ErrorCategory::Internal,
        )
        .with_detail(detail)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

impl From<crate::validation::ValidationError> for AppError {
    fn from(e: crate::validation::ValidationError) -> Self {
        use crate::validation::ValidationError as V;
        let code = match &e {
            V::NonNumericSampleId(_) => ErrorCode::VALIDATION_INVALID_SAMPLE_ID,
            V::InvalidCallFrame { .. } => ErrorCode::VALIDATION_INVALID_CALL_FRAME,
            V::InvalidScoringValue => ErrorCode::VALIDATION_INVALID_SCORE,
            _ => ErrorCode::VALIDATION_INVALID_VALUE,
        };
        Self::new(code, e.to_string(), ErrorCategory::Validation)
    }
}

impl From<crate::ledger::LedgerError> for AppError {
    fn from(e: crate::ledger::LedgerError) -> Self {
        use crate::ledger::LedgerError as L;
        match e {
            L::UnknownField(field) => Self::new(
                ErrorCode::VALIDATION_UNKNOWN_FIELD,
                format!("Unknown field: {}", field),
                ErrorCategory::Validation,
            ),
            L::NotEditable(field) => Self::new(
                ErrorCode::VALIDATION_NOT_EDITABLE,
                format!("Field is not editable: {}", field),
                ErrorCategory::Validation,
            ),
            L::Value(inner) => inner.into(),
        }
    }
}

impl From<crate::store::StoreError> for AppError {
    fn from(e: crate::store::StoreError) -> Self {
        use crate::store::StoreError as S;
        match e {
            S::Request(inner) => Self::new(
                ErrorCode::NETWORK_CONNECTION_FAILED,
                "Connection to the record store failed",
                ErrorCategory::Network,
            )
            .with_detail(inner.to_string())
            .retryable(),
            S::Timeout => Self::new(
                ErrorCode::NETWORK_TIMEOUT,
                "Record store request timed out",
                ErrorCategory::Network,
            )
            .retryable(),
            S::RateLimited => Self::new(
                ErrorCode::NETWORK_RATE_LIMITED,
                "Rate limited - try again later",
                ErrorCategory::Network,
            )
            .retryable(),
            S::AuthFailed => Self::new(
                ErrorCode::STORE_AUTH_FAILED,
                "Authentication failed - check your API token",
                ErrorCategory::Store,
            ),
            S::Api(detail) => Self::new(
                ErrorCode::STORE_API_ERROR,
                "Record store rejected the request",
                ErrorCategory::Store,
            )
            .with_detail(detail),
            S::Parse(detail) => Self::new(
                ErrorCode::STORE_PARSE_ERROR,
                "Record store returned an unreadable response",
                ErrorCategory::Store,
            )
            .with_detail(detail),
            S::NotConfigured => Self::new(
                ErrorCode::STORE_NOT_CONFIGURED,
                "Record store not configured",
                ErrorCategory::Store,
            ),
        }
    }
}

impl From<crate::submit::SubmitError> for AppError {
    fn from(e: crate::submit::SubmitError) -> Self {
        use crate::submit::SubmitError as E;
        let code = match e {
            E::EmptyLedger => ErrorCode::SUBMIT_EMPTY_LEDGER,
            E::EmptyReasons => ErrorCode::SUBMIT_EMPTY_REASONS,
            E::InFlight => ErrorCode::SUBMIT_IN_FLIGHT,
        };
        Self::new(code, e.to_string(), ErrorCategory::Submission)
    }
}

impl From<crate::audit::AuditError> for AppError {
    fn from(e: crate::audit::AuditError) -> Self {
        Self::new(
            ErrorCode::AUDIT_WRITE_FAILED,
            "Audit log write failed",
            ErrorCategory::Internal,
        )
        .with_detail(e.to_string())
    }
}

impl From<crate::session::SessionError> for AppError {
    fn from(e: crate::session::SessionError) -> Self {
        Self::new(
            ErrorCode::SESSION_SNAPSHOT_FAILED,
            "Session snapshot failed",
            ErrorCategory::Internal,
        )
        .with_detail(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use crate::submit::SubmitError;

    #[test]
    fn test_error_serialization() {
        let err: AppError = SubmitError::EmptyReasons.into();
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("SUBMIT_EMPTY_REASONS"));
        assert!(json.contains("submission"));
    }

    #[test]
    fn test_network_errors_are_retryable() {
        let err: AppError = StoreError::Timeout.into();
        assert!(err.retryable);
        assert_eq!(err.category, ErrorCategory::Network);

        let err: AppError = StoreError::AuthFailed.into();
        assert!(!err.retryable);
        assert_eq!(err.category, ErrorCategory::Store);
    }

    #[test]
    fn test_ledger_error_mapping() {
        let err: AppError = crate::ledger::LedgerError::UnknownField("x".into()).into();
        assert_eq!(err.code, ErrorCode::VALIDATION_UNKNOWN_FIELD);
        assert_eq!(err.category, ErrorCategory::Validation);
    }

    #[test]
    fn test_display_includes_code() {
        let err = AppError::record_not_found(42);
        let display = err.to_string();
        assert!(display.contains("NOT_FOUND_RECORD"));
        assert!(display.contains("42"));
    }
}
