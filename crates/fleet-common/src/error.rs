//! Error taxonomy for the admission and enrollment core
//!
//! Validation and admission failures are detected before any mutation;
//! store constraint violations are reclassified into `Conflict` rather
//! than leaking as internal errors.

use crate::feature::Feature;
use thiserror::Error;

/// Core error type.
#[derive(Error, Debug)]
pub enum FleetError {
    /// Malformed input, with field detail.
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// Secret mismatch. Carries no detail about why verification failed.
    #[error("authentication failed")]
    Authentication,

    /// Duplicate membership or id.
    #[error("already exists: {0}")]
    Conflict(String),

    /// A configured limit would be exceeded.
    #[error("limit exceeded for {feature}")]
    AdmissionRejected { feature: Feature },

    /// Referenced node/tenant pair does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Store or transaction failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl FleetError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// HTTP-equivalent status code for the transport layer.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::Authentication => 401,
            Self::AdmissionRejected { .. } => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::Internal(_) => 500,
        }
    }
}

/// Result alias for core operations.
pub type FleetResult<T> = Result<T, FleetError>;
