//! Error handling for the lot ledger service
//!
//! Wraps the domain taxonomy from `shared` with infrastructure failures and
//! renders both as consistent JSON error bodies for the calling layer.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::{LedgerError, Shortfall};
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Domain errors (validation, insufficient stock, integrity, not found)
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Invalid input: {0}")]
    InvalidInput(#[from] validator::ValidationErrors),

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    pub fn not_found(entity: &'static str) -> Self {
        AppError::Ledger(LedgerError::NotFound(entity))
    }

    /// Turn a unique-constraint violation into `DuplicateEntry(what)`
    pub fn unique_violation(err: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return AppError::DuplicateEntry(what.to_string());
            }
        }
        err.into()
    }

    /// The domain error, when this is one
    pub fn ledger(&self) -> Option<&LedgerError> {
        match self {
            AppError::Ledger(e) => Some(e),
            _ => None,
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub shortfalls: Vec<Shortfall>,
}

impl ErrorDetail {
    fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            field: None,
            shortfalls: Vec::new(),
        }
    }

    fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

impl AppError {
    /// HTTP status and body for this error
    pub fn status_and_detail(&self) -> (StatusCode, ErrorDetail) {
        match self {
            AppError::Ledger(err) => ledger_detail(err),
            AppError::InvalidInput(errors) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("VALIDATION_ERROR", errors.to_string()),
            ),
            AppError::DuplicateEntry(what) => (
                StatusCode::CONFLICT,
                ErrorDetail::new("DUPLICATE_ENTRY", format!("A {} with this name already exists", what))
                    .with_field(what.clone()),
            ),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("DATABASE_ERROR", "A database error occurred"),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", msg.clone()),
            ),
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", "An internal server error occurred"),
            ),
        }
    }
}

fn ledger_detail(err: &LedgerError) -> (StatusCode, ErrorDetail) {
    match err {
        LedgerError::Validation { field, message } => (
            StatusCode::BAD_REQUEST,
            ErrorDetail::new("VALIDATION_ERROR", message.clone()).with_field(field.clone()),
        ),
        LedgerError::EmptyOrder => (
            StatusCode::BAD_REQUEST,
            ErrorDetail::new("EMPTY_ORDER", "The order has no lines").with_field("lines"),
        ),
        LedgerError::DuplicateLine { field, .. } => (
            StatusCode::BAD_REQUEST,
            ErrorDetail::new("DUPLICATE_LINE", err.to_string()).with_field(*field),
        ),
        LedgerError::InsufficientStock(items) => {
            let mut detail = ErrorDetail::new("INSUFFICIENT_STOCK", err.to_string());
            detail.shortfalls = items.clone();
            (StatusCode::CONFLICT, detail)
        }
        LedgerError::DataIntegrity(msg) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetail::new("DATA_INTEGRITY_ERROR", msg.clone()),
        ),
        LedgerError::NotFound(entity) => (
            StatusCode::NOT_FOUND,
            ErrorDetail::new("NOT_FOUND", format!("{} not found", entity)),
        ),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = self.status_and_detail();

        // Log the error for debugging
        tracing::error!("Error: {:?}", self);

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for services and handlers
pub type AppResult<T> = Result<T, AppError>;
