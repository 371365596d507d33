use thiserror::Error;

pub type DocuResult<T> = std::result::Result<T, DocuError>;

/// Failure kinds surfaced by the client layer.
///
/// `Validation` is always raised locally before any request leaves the
/// process. `Network` covers transport failures and timeouts, `Backend`
/// carries the message the server put in its error body.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DocuError {
    #[error("{0}")]
    Validation(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("{0}")]
    Backend(String),
    #[error("unknown document `{0}`")]
    InvalidReference(String),
}

impl DocuError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    pub fn invalid_reference(id: impl Into<String>) -> Self {
        Self::InvalidReference(id.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DocuError::Validation(_) => "validation",
            DocuError::Network(_) => "network",
            DocuError::Backend(_) => "backend",
            DocuError::InvalidReference(_) => "invalid_reference",
        }
    }
}
