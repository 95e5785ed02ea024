use thiserror::Error;

/// Failures surfaced by the broker engine.
///
/// The client-facing variants carry a description meant for direct display
/// to the calling platform's operator; transport variants wrap the cause.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("This service plan requires client support for asynchronous service operations.")]
    AsyncRequired,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Gone(String),

    /// The stack itself failed; reported to clients as a 400.
    #[error("{0}")]
    Orchestration(String),

    #[error("{0}")]
    Internal(String),

    #[error("datastore error: {0}")]
    Store(String),

    #[error("cloud API error: {0}")]
    Cloud(String),

    #[error("template repository error: {0}")]
    Template(String),

    /// Listing failed because the template bucket is missing or unreadable.
    #[error(
        "Cannot access S3 Bucket, either it does not exist or the IAM user/role the broker is configured to use has no access to the bucket"
    )]
    BucketInaccessible,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BrokerError {
    /// HTTP status the error maps to on the service broker API.
    pub fn status_code(&self) -> u16 {
        match self {
            BrokerError::AsyncRequired => 422,
            BrokerError::BadRequest(_) | BrokerError::Orchestration(_) => 400,
            BrokerError::Conflict(_) => 409,
            BrokerError::Gone(_) => 410,
            BrokerError::Internal(_)
            | BrokerError::Store(_)
            | BrokerError::Cloud(_)
            | BrokerError::Template(_)
            | BrokerError::BucketInaccessible
            | BrokerError::Serialization(_) => 500,
        }
    }

    /// Machine-readable error code for the response body, when the API defines one.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            BrokerError::AsyncRequired => Some("AsyncRequired"),
            BrokerError::Orchestration(_) => Some("CloudFormationError"),
            _ => None,
        }
    }

    /// Wraps a collaborator failure with the operation that hit it.
    pub fn internal(context: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        BrokerError::Internal(format!("{context}: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, BrokerError>;
