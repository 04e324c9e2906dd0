//! Storage layer errors

use racket_domain::DomainError;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Debug, Error)]
pub enum StoreError {
    /// Entity not found
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound {
        /// Type of entity (account, order, heist, participant)
        entity_type: String,
        /// Entity ID
        id: String,
    },

    /// Duplicate entity (one live heist per room, unique order ids)
    #[error("Duplicate entity: {entity_type} with id {id}")]
    Duplicate {
        /// Type of entity
        entity_type: String,
        /// Entity ID
        id: String,
    },

    /// The row was not in the state the command expected
    #[error("State conflict: {message}")]
    Conflict {
        /// Description of the mismatch
        message: String,
    },

    /// A strict debit could not be covered
    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        /// Amount the command needed
        requested: Decimal,
        /// Balance at the time of the command
        available: Decimal,
    },

    /// A taker request exceeded the resting depth at its price level
    #[error("Insufficient depth: requested {requested}, available {available}")]
    InsufficientDepth {
        /// Amount the taker asked for
        requested: Decimal,
        /// Summed resting amount at the level
        available: Decimal,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),
}

impl StoreError {
    /// Create a not found error
    pub fn not_found(entity_type: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    /// Create a duplicate error
    pub fn duplicate(entity_type: impl Into<String>, id: impl ToString) -> Self {
        Self::Duplicate {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    /// Create a state conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict { message: message.into() }
    }
}

impl From<DomainError> for StoreError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InsufficientCash { requested, available }
            | DomainError::InsufficientCrypto { requested, available } => {
                StoreError::InsufficientFunds { requested, available }
            },
            DomainError::InvalidPhaseTransition { .. } => StoreError::Conflict {
                message: err.to_string(),
            },
            DomainError::InvalidAmount(_) | DomainError::InvalidPrice(_) => {
                StoreError::Conflict { message: err.to_string() }
            },
        }
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound {
                entity_type: "unknown".to_string(),
                id: "unknown".to_string(),
            },
            sqlx::Error::Database(db_err) => {
                // Unique constraint violation
                if db_err.code().map(|c| c == "23505").unwrap_or(false) {
                    StoreError::Duplicate {
                        entity_type: "unknown".to_string(),
                        id: "unknown".to_string(),
                    }
                } else {
                    StoreError::Database(db_err.to_string())
                }
            },
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                StoreError::Connection(err.to_string())
            },
            _ => StoreError::Database(err.to_string()),
        }
    }
}
