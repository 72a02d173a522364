//! Error types for Libris server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Numeric error codes returned in every error body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    DbFailure = 3,
    NoSuchMember = 4,
    NoSuchBook = 5,
    NoCopyAvailable = 7,
    Duplicate = 8,
    NoSuchLoan = 10,
    NoActiveLoan = 11,
    AlreadyBorrowed = 12,
    LoanOverdue = 13,
    LoanReturned = 14,
    BadValue = 18,
    NoSuchData = 20,
    HasActiveLoans = 21,
    Busy = 22,
}

/// Error taxonomy of the loan lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    NotFound,
    PreconditionFailed,
    InvalidInput,
}

/// Loan lifecycle rule violations.
///
/// All of them are recoverable and reported to the caller as 400 responses.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoanError {
    #[error("Book with id {0} does not exist.")]
    BookNotFound(i32),

    #[error("Member with id {0} does not exist.")]
    MemberNotFound(i32),

    #[error("Loan with id {0} does not exist.")]
    LoanNotFound(i32),

    #[error("No available copies.")]
    NoAvailableCopies,

    #[error("Active loan does not exist.")]
    NoActiveLoan,

    #[error("Member already has an active loan for this book.")]
    DuplicateActiveLoan,

    #[error("Loan is already overdue.")]
    LoanAlreadyOverdue,

    #[error("Loan has already been returned.")]
    LoanAlreadyReturned,

    #[error("Invalid additional days number: {0}")]
    InvalidDayCount(String),
}

impl LoanError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            LoanError::BookNotFound(_) | LoanError::MemberNotFound(_) | LoanError::LoanNotFound(_) => {
                ErrorCategory::NotFound
            }
            LoanError::NoAvailableCopies
            | LoanError::NoActiveLoan
            | LoanError::DuplicateActiveLoan
            | LoanError::LoanAlreadyOverdue
            | LoanError::LoanAlreadyReturned => ErrorCategory::PreconditionFailed,
            LoanError::InvalidDayCount(_) => ErrorCategory::InvalidInput,
        }
    }

    fn code(&self) -> ErrorCode {
        match self {
            LoanError::BookNotFound(_) => ErrorCode::NoSuchBook,
            LoanError::MemberNotFound(_) => ErrorCode::NoSuchMember,
            LoanError::LoanNotFound(_) => ErrorCode::NoSuchLoan,
            LoanError::NoAvailableCopies => ErrorCode::NoCopyAvailable,
            LoanError::NoActiveLoan => ErrorCode::NoActiveLoan,
            LoanError::DuplicateActiveLoan => ErrorCode::AlreadyBorrowed,
            LoanError::LoanAlreadyOverdue => ErrorCode::LoanOverdue,
            LoanError::LoanAlreadyReturned => ErrorCode::LoanReturned,
            LoanError::InvalidDayCount(_) => ErrorCode::BadValue,
        }
    }
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Business rule violation: {0}")]
    BusinessRule(String),

    /// Lock wait timed out or the transaction lost a serialization race; safe to retry
    #[error("Service temporarily unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Loan(#[from] LoanError),
}

impl AppError {
    /// Returns the loan rule violation carried by this error, if any
    pub fn as_loan_error(&self) -> Option<&LoanError> {
        match self {
            AppError::Loan(e) => Some(e),
            _ => None,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

/// Classify a database error raised inside a locking transaction.
///
/// Lock timeouts, serialization failures and deadlocks roll the transaction back
/// entirely, so the caller gets a retryable error instead of a generic failure.
pub fn classify_db_error(error: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(ref db) = error {
        if let Some(code) = db.code() {
            match code.as_ref() {
                "55P03" => return AppError::Unavailable("Timed out waiting for a row lock".to_string()),
                "40001" | "40P01" => {
                    return AppError::Unavailable("Concurrent update conflict, please retry".to_string())
                }
                _ => {}
            }
        }
    }
    AppError::Database(error)
}

/// Map a unique-constraint violation (SQLSTATE 23505) to a conflict
pub fn conflict_on_unique_violation(error: sqlx::Error, message: &str) -> AppError {
    if let sqlx::Error::Database(ref db) = error {
        if db.code().as_deref() == Some("23505") {
            return AppError::Conflict(message.to_string());
        }
    }
    AppError::Database(error)
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl AppError {
    fn parts(&self) -> (StatusCode, ErrorCode, String) {
        match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorCode::NoSuchData, msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, ErrorCode::BadValue, msg.clone()),
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::DbFailure,
                    "Database error".to_string(),
                )
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, ErrorCode::Duplicate, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorCode::BadValue, msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::Failure,
                    "Internal server error".to_string(),
                )
            }
            AppError::BusinessRule(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, ErrorCode::HasActiveLoans, msg.clone())
            }
            AppError::Unavailable(msg) => {
                tracing::warn!("Retryable failure: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, ErrorCode::Busy, msg.clone())
            }
            AppError::Loan(e) => (StatusCode::BAD_REQUEST, e.code(), e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
