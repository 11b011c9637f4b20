//! Error type for service adapters and the registry.

use teanga_core::TeangaError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("service not registered: {0}")]
    NotRegistered(String),

    #[error("service id already registered: {0}")]
    AlreadyRegistered(String),

    #[error("invalid service spec: {0}")]
    InvalidSpec(String),

    /// `execute` was called before `setup`.
    #[error("service {0} executed before setup")]
    NotReady(String),

    #[error("bad response from service {service}: {message}")]
    BadResponse { service: String, message: String },

    #[error(transparent)]
    Corpus(#[from] TeangaError),
}

impl ServiceError {
    pub fn bad_response(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BadResponse {
            service: service.into(),
            message: message.into(),
        }
    }
}
