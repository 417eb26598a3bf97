//! Error types raised by service factories.

use thiserror::Error;

/// Boxed error for failures coming from service code itself.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while constructing or destroying a service instance.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The service asked for a binding that was never resolved
    #[error("Missing reference '{0}'")]
    MissingReference(String),

    /// The resolved instance is not of the requested type
    #[error("Reference '{name}' is not a {expected}")]
    ReferenceType {
        name: String,
        expected: &'static str,
    },

    /// Properties could not be deserialized into the service's config type
    #[error("Invalid properties for service '{service}': {reason}")]
    Properties { service: String, reason: String },

    /// Service initialization failed
    #[error("Init error: {0}")]
    Init(String),

    /// Service teardown failed
    #[error("Shutdown error: {0}")]
    Shutdown(String),

    /// Any other error raised by service code
    #[error("{0}")]
    Other(#[from] BoxError),
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::Other(Box::new(err))
    }
}
