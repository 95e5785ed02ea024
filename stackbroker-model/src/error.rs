use thiserror::Error;

/// Errors produced by model constructors and validation routines.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid broker id {0:?}: only alphanumerics and '-' are allowed")]
    InvalidBrokerId(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
