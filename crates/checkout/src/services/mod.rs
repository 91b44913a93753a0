//! External collaborator interfaces and their in-memory implementations.

pub mod cache;
pub mod catalog;
pub mod notification;
pub mod payment;

use thiserror::Error;

/// Error reported by an external collaborator call.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ServiceError(pub String);

impl ServiceError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}
