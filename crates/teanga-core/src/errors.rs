//! Error types for teanga-core.
//!
//! Every structural violation is reported at the point of mutation. The
//! variants map one-to-one onto the failure categories callers are expected to
//! distinguish; use [`TeangaError::kind`] to match on the category alone.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type TeangaResult<T> = std::result::Result<T, TeangaError>;

/// Fieldless error category, convenient for matching in callers and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Schema,
    UnknownLayer,
    UnknownDoc,
    TargetMissing,
    Validation,
    Index,
    Cycle,
    DuplicateDoc,
    ServiceContract,
    ServiceExecution,
    Serialization,
    Config,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TeangaError {
    /// Bad, duplicate or cyclic layer declaration.
    #[error("schema error: {0}")]
    Schema(String),

    /// Reference to a layer id that is not declared (or not present).
    #[error("unknown layer: {0}")]
    UnknownLayer(String),

    /// Reference to a document id that is not in the corpus.
    #[error("unknown document: {0}")]
    UnknownDoc(String),

    /// A derived layer was added before its base layer exists on the document.
    #[error("cannot add layer {layer}: base layer {base} is not present on the document")]
    TargetMissing { layer: String, base: String },

    /// Value outside the declared values, malformed shorthand, bad structure.
    #[error("validation error: {0}")]
    Validation(String),

    /// A resolved range falls outside the bounds of its base layer.
    #[error("index error in layer {layer}: {message}")]
    Index { layer: String, message: String },

    /// A base chain revisits a layer during resolution.
    #[error("cycle in layer chain: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    /// Document id collision without `overwrite`.
    #[error("duplicate document id: {0}")]
    DuplicateDoc(String),

    /// A service's requires/produces are incompatible with the schema or document.
    #[error("service contract violated by {service}: {message}")]
    ServiceContract { service: String, message: String },

    /// Failure raised by an external service call.
    #[error("service {service} failed on document {doc}: {source}")]
    ServiceExecution {
        service: String,
        doc: String,
        #[source]
        source: anyhow::Error,
    },

    /// JSON or YAML encoding/decoding failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl TeangaError {
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    pub fn unknown_layer(id: impl Into<String>) -> Self {
        Self::UnknownLayer(id.into())
    }

    pub fn unknown_doc(id: impl Into<String>) -> Self {
        Self::UnknownDoc(id.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn index(layer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Index {
            layer: layer.into(),
            message: message.into(),
        }
    }

    pub fn contract(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ServiceContract {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Schema(_) => ErrorKind::Schema,
            Self::UnknownLayer(_) => ErrorKind::UnknownLayer,
            Self::UnknownDoc(_) => ErrorKind::UnknownDoc,
            Self::TargetMissing { .. } => ErrorKind::TargetMissing,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Index { .. } => ErrorKind::Index,
            Self::Cycle(_) => ErrorKind::Cycle,
            Self::DuplicateDoc(_) => ErrorKind::DuplicateDoc,
            Self::ServiceContract { .. } => ErrorKind::ServiceContract,
            Self::ServiceExecution { .. } => ErrorKind::ServiceExecution,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::Config(_) => ErrorKind::Config,
        }
    }
}

impl From<serde_json::Error> for TeangaError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

#[cfg(feature = "yaml")]
impl From<serde_yaml::Error> for TeangaError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for TeangaError {
    fn from(e: std::io::Error) -> Self {
        Self::Serialization(format!("io: {e}"))
    }
}
