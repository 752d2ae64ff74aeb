//! Error types for the routing core.

use moneydesk_rs_protocol::{CompletionError, StoreError};
use thiserror::Error;

/// Text returned to callers for every non-validation failure.
pub const GENERIC_FAILURE: &str = "failed to process message";

/// Errors returned by router operations.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Inbound message rejected before any side effect.
    #[error("invalid message: {0}")]
    Validation(String),
    /// A required write or read failed.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    /// The completion service failed.
    #[error("completion error: {0}")]
    Completion(#[from] CompletionError),
    /// The router could not be assembled.
    #[error("setup error: {0}")]
    Setup(String),
}

impl RouterError {
    /// Whether the caller is at fault.
    pub fn is_validation(&self) -> bool {
        matches!(self, RouterError::Validation(_))
    }

    /// Message safe to show to the caller.
    pub fn public_message(&self) -> String {
        match self {
            RouterError::Validation(message) => message.clone(),
            _ => GENERIC_FAILURE.to_string(),
        }
    }
}
