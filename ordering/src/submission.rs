//! Submission policy: failure classification and outcome types.
//!
//! A failed attempt is transient when its message mentions a connectivity
//! or capacity problem; transient failures are retried with backoff until
//! the attempt budget runs out, everything else stops immediately.

use crate::backend::{Backend, BackendError, with_timeout};
use crate::types::{ConfirmationNumber, FieldError, NewOrder, Order};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Case-insensitive substrings marking a failure as worth retrying.
pub const TRANSIENT_MARKERS: [&str; 6] = [
    "network error",
    "timeout",
    "server error",
    "service unavailable",
    "try again",
    "rate limit",
];

/// Whether a failure message describes a transient condition.
#[must_use]
pub fn is_transient(message: &str) -> bool {
    let message = message.to_lowercase();
    TRANSIENT_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

/// User-facing wording for a backend failure.
#[must_use]
pub fn user_message(original: &str) -> String {
    if original.to_lowercase().contains("network") {
        "Unable to reach the server. Please check your connection and try again.".to_string()
    } else {
        format!("Failed to submit order: {original}")
    }
}

/// Why a submission did not produce an order
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The cart or customer details are not submittable; nothing was sent
    Validation,
    /// Transient backend failures exhausted the attempt budget
    Transient,
    /// The backend failed in a way retrying would not fix
    Terminal,
    /// Another submission of this cart is still running
    InFlight,
}

impl FailureKind {
    /// Metric label
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Transient => "transient",
            Self::Terminal => "terminal",
            Self::InFlight => "in_flight",
        }
    }
}

/// Structured description of a failed submission
#[derive(Error, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct SubmissionFailure {
    /// Failure category
    pub kind: FailureKind,
    /// Message to show the user
    pub message: String,
    /// Whether submitting again later may succeed
    pub is_retryable: bool,
    /// Backend message behind `message`, if any
    pub original_error: Option<String>,
    /// Per-field problems for validation failures
    pub field_errors: Vec<FieldError>,
    /// Attempts made against the backend
    pub attempts: u32,
}

impl SubmissionFailure {
    /// Failure for a cart with no lines
    #[must_use]
    pub fn empty_order() -> Self {
        Self {
            kind: FailureKind::Validation,
            message: "Order must contain at least one item".to_string(),
            is_retryable: false,
            original_error: None,
            field_errors: Vec::new(),
            attempts: 0,
        }
    }

    /// Failure for invalid customer details
    #[must_use]
    pub fn invalid_customer(field_errors: Vec<FieldError>) -> Self {
        let details: Vec<&str> = field_errors.iter().map(|e| e.message.as_str()).collect();
        Self {
            kind: FailureKind::Validation,
            message: format!("Please correct your details: {}", details.join("; ")),
            is_retryable: false,
            original_error: None,
            field_errors,
            attempts: 0,
        }
    }

    /// Failure for a second submission while one is running
    #[must_use]
    pub fn in_flight() -> Self {
        Self {
            kind: FailureKind::InFlight,
            message: "An order submission is already in progress".to_string(),
            is_retryable: false,
            original_error: None,
            field_errors: Vec::new(),
            attempts: 0,
        }
    }

    /// Failure from the last backend error after `attempts` attempts
    #[must_use]
    pub fn from_backend(error: &BackendError, attempts: u32) -> Self {
        let original = error.to_string();
        let transient = is_transient(&original);
        Self {
            kind: if transient {
                FailureKind::Transient
            } else {
                FailureKind::Terminal
            },
            message: user_message(&original),
            is_retryable: transient,
            original_error: Some(original),
            field_errors: Vec::new(),
            attempts,
        }
    }

    /// Failure raised by the engine itself rather than the backend
    #[must_use]
    pub fn engine(error: &impl std::fmt::Display) -> Self {
        let original = error.to_string();
        Self {
            kind: FailureKind::Terminal,
            message: format!("Failed to submit order: {original}"),
            is_retryable: true,
            original_error: Some(original),
            field_errors: Vec::new(),
            attempts: 0,
        }
    }

    /// Metadata kept in engine state next to the message
    #[must_use]
    pub fn metadata(&self) -> ErrorMetadata {
        ErrorMetadata {
            kind: self.kind,
            is_retryable: self.is_retryable,
            original_error: self.original_error.clone(),
        }
    }
}

/// Structured detail behind the engine's current error message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMetadata {
    /// Failure category
    pub kind: FailureKind,
    /// Whether submitting again later may succeed
    pub is_retryable: bool,
    /// Backend message, if any
    pub original_error: Option<String>,
}

/// A successful submission
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedOrder {
    /// Confirmation number assigned by the backend
    pub confirmation_number: ConfirmationNumber,
    /// Persisted order
    pub order: Order,
    /// Attempts it took, including the successful one
    pub attempts: u32,
}

/// Runs one submission attempt, bounded by `limit`.
///
/// # Errors
///
/// Returns the backend error, [`BackendError::Timeout`] if the attempt took
/// too long, or `Rejected` if the backend answered without a confirmation
/// number.
pub async fn attempt(
    backend: Arc<dyn Backend>,
    order: NewOrder,
    limit: Duration,
) -> Result<Order, BackendError> {
    let persisted = with_timeout(limit, backend.submit_order(order)).await?;
    if persisted.confirmation_number.is_none() {
        return Err(BackendError::Rejected(
            "No order data returned from server".to_string(),
        ));
    }
    Ok(persisted)
}
