use domain::DomainError;
use outbox::OutboxError;
use store::StoreError;
use thiserror::Error;

/// Errors returned by dispatch operations.
///
/// The variants form a closed taxonomy that transport adapters translate
/// into their own representation.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The order or drone does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Duplicate resource, or the drone is already working an order.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Malformed input.
    #[error("Invalid input: {0}")]
    Invalid(String),

    /// Missing or invalid caller identity.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The caller may not act on this resource.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The operation is not valid in the current state.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// No order is available for reservation.
    #[error("No job available")]
    NoJob,

    /// Persistence failure outside the taxonomy.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// Short label used for the `outcome` metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::NotFound { .. } => "not_found",
            DispatchError::Conflict(_) => "conflict",
            DispatchError::Invalid(_) => "invalid",
            DispatchError::Unauthorized(_) => "unauthorized",
            DispatchError::Forbidden(_) => "forbidden",
            DispatchError::Precondition(_) => "precondition",
            DispatchError::NoJob => "no_job",
            DispatchError::Internal(_) => "internal",
        }
    }

    pub(crate) fn order_not_found(id: impl ToString) -> Self {
        DispatchError::NotFound {
            entity: "order",
            id: id.to_string(),
        }
    }

    pub(crate) fn drone_not_found(id: impl ToString) -> Self {
        DispatchError::NotFound {
            entity: "drone",
            id: id.to_string(),
        }
    }
}

impl From<StoreError> for DispatchError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { entity, id } => DispatchError::NotFound { entity, id },
            StoreError::Conflict { entity, id } => {
                DispatchError::Conflict(format!("{entity} already exists: {id}"))
            }
            other => DispatchError::Internal(other.to_string()),
        }
    }
}

impl From<OutboxError> for DispatchError {
    fn from(e: OutboxError) -> Self {
        DispatchError::Internal(e.to_string())
    }
}

impl From<DomainError> for DispatchError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::LatitudeOutOfRange(_)
            | DomainError::LongitudeOutOfRange(_)
            | DomainError::UnknownOrderStatus(_)
            | DomainError::UnknownDroneStatus(_)
            | DomainError::UnknownRole(_) => DispatchError::Invalid(e.to_string()),
            DomainError::AssignmentMismatch { .. } | DomainError::UnexpectedHandoffOrigin { .. } => {
                DispatchError::Internal(e.to_string())
            }
        }
    }
}

/// Result type for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;
