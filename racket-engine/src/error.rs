//! Engine error taxonomy.
//!
//! Everything a caller can see falls into five kinds: validation failures
//! (rejected before any mutation), insufficient funds, missing entities,
//! state conflicts (phase or status races), and infrastructure errors,
//! which are retryable and never swallowed. A cash debit that creates debt
//! is not an error anywhere in this taxonomy.

use racket_store::StoreError;
use rust_decimal::Decimal;
use thiserror::Error;

/// Result alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the economy services
#[derive(Debug, Error)]
pub enum EngineError {
    /// Input rejected before any mutation
    #[error("Validation error: {0}")]
    Validation(String),

    /// A strict debit could not be covered
    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        /// Amount the operation needed
        requested: Decimal,
        /// Balance at the time of the attempt
        available: Decimal,
    },

    /// Unknown account, order, heist or participant
    #[error("Not found: {entity_type} with id {id}")]
    NotFound {
        /// Type of entity
        entity_type: String,
        /// Entity ID
        id: String,
    },

    /// Action attempted outside its valid phase, or lost a deadline race
    #[error("State conflict: {0}")]
    StateConflict(String),

    /// Storage failure; retryable, state unchanged from the caller's view
    #[error("Storage error: {0}")]
    Store(StoreError),
}

impl EngineError {
    /// Create a not found error
    pub fn not_found(entity_type: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    /// Whether the caller may retry the operation as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Store(_))
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity_type, id } => EngineError::NotFound { entity_type, id },
            StoreError::Duplicate { .. } => EngineError::StateConflict(err.to_string()),
            StoreError::Conflict { message } => EngineError::StateConflict(message),
            StoreError::InsufficientFunds { requested, available } => {
                EngineError::InsufficientFunds { requested, available }
            },
            // A taker asking beyond the level's depth is a bad request,
            // rejected whole, not a race.
            StoreError::InsufficientDepth { requested, available } => EngineError::Validation(
                format!("requested {} exceeds resting depth {}", requested, available),
            ),
            StoreError::Serialization(_) | StoreError::Database(_) | StoreError::Connection(_) => {
                EngineError::Store(err)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_store_error_mapping() {
        let err: EngineError = StoreError::conflict("heist is not splitting").into();
        assert!(matches!(err, EngineError::StateConflict(_)));

        let err: EngineError = StoreError::InsufficientFunds {
            requested: dec!(10),
            available: dec!(5),
        }
        .into();
        assert!(matches!(err, EngineError::InsufficientFunds { .. }));
        assert!(!err.is_retryable());

        let err: EngineError = StoreError::Database("connection reset".into()).into();
        assert!(err.is_retryable());
    }
}
