use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested order or drone does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// An insert collided with an existing row.
    #[error("{entity} already exists: {id}")]
    Conflict { entity: &'static str, id: String },

    /// The transaction was already committed or rolled back.
    #[error("Transaction is no longer active")]
    TransactionClosed,

    /// A stored value could not be decoded into a domain type.
    #[error("Corrupt row: {0}")]
    Decode(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub fn order_not_found(id: impl ToString) -> Self {
        StoreError::NotFound {
            entity: "order",
            id: id.to_string(),
        }
    }

    pub fn drone_not_found(id: impl ToString) -> Self {
        StoreError::NotFound {
            entity: "drone",
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

impl From<domain::DomainError> for StoreError {
    fn from(e: domain::DomainError) -> Self {
        StoreError::Decode(e.to_string())
    }
}

impl From<outbox::OutboxError> for StoreError {
    fn from(e: outbox::OutboxError) -> Self {
        StoreError::Decode(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
