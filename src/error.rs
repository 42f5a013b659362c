// src/error.rs
use thiserror::Error;
use actix_web::{http::StatusCode, ResponseError, HttpResponse};
use serde_json::json;

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Duplicate lead request within cooldown window (existing id {existing_id})")]
    DuplicateLead { existing_id: i64 },

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: String,
        available: String,
    },

    #[error("Dispute window expired (must dispute within {window_hours} hours)")]
    DisputeWindowExpired { window_hours: i64 },

    #[error("Dispute already resolved")]
    DisputeAlreadyResolved,

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResponseError for BillingError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();

        let mut body = json!({
            "success": false,
            "error": self.error_code(),
            "message": self.to_string(),
        });

        if let BillingError::DuplicateLead { existing_id } = self {
            body["existing_id"] = json!(existing_id);
        }

        HttpResponse::build(status_code).json(body)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            BillingError::NotFound(_) => StatusCode::NOT_FOUND,
            BillingError::Validation(_) => StatusCode::BAD_REQUEST,
            BillingError::DuplicateLead { .. } => StatusCode::CONFLICT,
            BillingError::InsufficientBalance { .. } => StatusCode::FORBIDDEN,
            BillingError::DisputeWindowExpired { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            BillingError::DisputeAlreadyResolved => StatusCode::CONFLICT,
            BillingError::InvalidTransition(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl BillingError {
    fn error_code(&self) -> &str {
        match self {
            BillingError::Database(_) => "database_error",
            BillingError::Redis(_) => "cache_error",
            BillingError::Cache(_) => "cache_error",
            BillingError::NotFound(_) => "not_found",
            BillingError::Validation(_) => "validation_error",
            BillingError::DuplicateLead { .. } => "duplicate_lead",
            BillingError::InsufficientBalance { .. } => "insufficient_balance",
            BillingError::DisputeWindowExpired { .. } => "dispute_window_expired",
            BillingError::DisputeAlreadyResolved => "dispute_already_resolved",
            BillingError::InvalidTransition(_) => "invalid_transition",
            BillingError::Internal(_) => "internal_error",
        }
    }
}
