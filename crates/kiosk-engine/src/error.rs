use kiosk_db::StoreError;
use kiosk_types::models::Entity;
use thiserror::Error;

use crate::forms::Invalid;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("invalid input: {0}")]
    InvalidInput(Invalid),

    #[error("{0} not found")]
    NotFound(Entity),

    #[error("referenced {0} does not exist")]
    ReferentialViolation(Entity),

    /// The form session was committed before.
    #[error("already committed")]
    AlreadyCommitted,

    #[error("internal: {0}")]
    Internal(String),
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(entity) => Self::NotFound(entity),
            StoreError::InvalidInput(reason) => Self::InvalidInput(Invalid::Rejected(reason)),
            StoreError::InvalidPayload(p) => Self::InvalidInput(Invalid::Payload(p)),
            StoreError::ReferentialViolation(entity) => Self::ReferentialViolation(entity),
            StoreError::OwnerImmutable => Self::InvalidInput(Invalid::OwnerTarget),
            StoreError::AlreadyCommitted(_) => Self::AlreadyCommitted,
            other => Self::Internal(other.to_string()),
        }
    }
}
