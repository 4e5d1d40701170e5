use kiosk_types::models::{Entity, PayloadError};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(Entity),

    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    #[error("invalid purchase payload: {0}")]
    InvalidPayload(#[from] PayloadError),

    /// Insert referenced a parent that does not exist.
    #[error("referenced {0} does not exist")]
    ReferentialViolation(Entity),

    #[error("the owner's role cannot be changed")]
    OwnerImmutable,

    /// The form session key was already used by an earlier commit.
    #[error("form session {0} was already committed")]
    AlreadyCommitted(Uuid),

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("connection lock poisoned: {0}")]
    Poisoned(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
