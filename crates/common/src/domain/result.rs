use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Coarse classification of a [`DomainError`], used by transports to pick a
/// response without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    Unauthorized,
    Unauthenticated,
    NotFound,
    Storage,
    Internal,
}

#[derive(Error, Debug)]
pub enum DomainError {
    // Validation
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Scheduled time must be in the future: {0}")]
    ScheduledTimeNotInFuture(String),

    #[error("Message must carry a body or an attachment")]
    EmptyMessage,

    #[error("Attachment of {size} bytes exceeds the {limit} byte limit")]
    AttachmentTooLarge { size: usize, limit: usize },

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Invalid urgency level: {0}")]
    InvalidUrgency(String),

    // Conflict
    #[error("Device already exists: {0}")]
    DeviceAlreadyExists(String),

    #[error("Device already assigned: {0}")]
    DeviceAlreadyAssigned(String),

    #[error("Animal already has a device assigned: {0}")]
    AnimalAlreadyAssigned(String),

    #[error("Device is inactive: {0}")]
    DeviceInactive(String),

    #[error("Device has an open assignment: {0}")]
    DeviceHasOpenAssignment(String),

    #[error("Cannot move service request from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Chat thread is not open for service request {0}")]
    ThreadClosed(String),

    #[error("Visit record already exists for service request {0}")]
    VisitRecordAlreadyExists(String),

    // Unauthorized
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid or expired token: {0}")]
    InvalidToken(String),

    // Not found
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Animal not found: {0}")]
    AnimalNotFound(String),

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Service request not found: {0}")]
    ServiceRequestNotFound(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("Attachment not found: {0}")]
    AttachmentNotFound(String),

    #[error("Visit record not found: {0}")]
    VisitRecordNotFound(String),

    // Storage
    #[error("Blob storage failure: {0}")]
    StorageFailure(String),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::ValidationError(_)
            | DomainError::ScheduledTimeNotInFuture(_)
            | DomainError::EmptyMessage
            | DomainError::AttachmentTooLarge { .. }
            | DomainError::InvalidStatus(_)
            | DomainError::InvalidUrgency(_) => ErrorKind::Validation,

            DomainError::DeviceAlreadyExists(_)
            | DomainError::DeviceAlreadyAssigned(_)
            | DomainError::AnimalAlreadyAssigned(_)
            | DomainError::DeviceInactive(_)
            | DomainError::DeviceHasOpenAssignment(_)
            | DomainError::InvalidStatusTransition { .. }
            | DomainError::ThreadClosed(_)
            | DomainError::VisitRecordAlreadyExists(_) => ErrorKind::Conflict,

            DomainError::PermissionDenied(_) => ErrorKind::Unauthorized,

            DomainError::InvalidToken(_) => ErrorKind::Unauthenticated,

            DomainError::DeviceNotFound(_)
            | DomainError::AnimalNotFound(_)
            | DomainError::ProviderNotFound(_)
            | DomainError::ServiceRequestNotFound(_)
            | DomainError::MessageNotFound(_)
            | DomainError::AttachmentNotFound(_)
            | DomainError::VisitRecordNotFound(_) => ErrorKind::NotFound,

            DomainError::StorageFailure(_) => ErrorKind::Storage,

            DomainError::RepositoryError(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_kinds() {
        let err = DomainError::InvalidStatusTransition {
            from: "pending".to_string(),
            to: "completed".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(
            err.to_string(),
            "Cannot move service request from pending to completed"
        );
        assert_eq!(
            DomainError::DeviceAlreadyAssigned("D-100".to_string()).kind(),
            ErrorKind::Conflict
        );
    }

    #[test]
    fn test_not_found_and_permission_kinds_are_distinct() {
        assert_eq!(
            DomainError::ServiceRequestNotFound("sr-1".to_string()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            DomainError::PermissionDenied("nope".to_string()).kind(),
            ErrorKind::Unauthorized
        );
    }

    #[test]
    fn test_repository_error_from_anyhow() {
        let err: DomainError = anyhow::anyhow!("connection reset").into();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.to_string().contains("connection reset"));
    }
}
