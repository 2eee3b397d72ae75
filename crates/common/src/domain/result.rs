use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Intersection not found: {0}")]
    IntersectionNotFound(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Invalid device ID: {0}")]
    InvalidDeviceId(String),

    #[error("Referenced entity does not exist: {0}")]
    ReferenceViolation(String),

    #[error("Real-time cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Cached snapshot for device {0} is corrupt: {1}")]
    SnapshotCorrupt(String, String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}
