//! The module contains the errors the engine can throw.
//!
//! The variants map one-to-one onto the conditions callers must tell apart:
//!
//! - [`Validation`] for malformed input (bad amount, empty title,
//!   self-referential transfer).
//! - [`PermissionDenied`] when the actor is not authorized for the bill or is
//!   the wrong party for a settlement transition.
//! - [`NotFound`] for unknown identifiers.
//! - [`InvalidState`] for transitions the state machine forbids (rejecting a
//!   confirmed settlement, billing a non-finalized event).
//!
//!  [`Validation`]: EngineError::Validation
//!  [`PermissionDenied`]: EngineError::PermissionDenied
//!  [`NotFound`]: EngineError::NotFound
//!  [`InvalidState`]: EngineError::InvalidState
use sea_orm::DbErr;
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("\"{0}\" not found!")]
    NotFound(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Validation(a), Self::Validation(b)) => a == b,
            (Self::PermissionDenied(a), Self::PermissionDenied(b)) => a == b,
            (Self::NotFound(a), Self::NotFound(b)) => a == b,
            (Self::InvalidState(a), Self::InvalidState(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
