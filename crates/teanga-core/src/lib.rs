//! teanga-core
//!
//! Core data model for Teanga corpora:
//! - Layer schema (declaration-ordered, append-only)
//! - Layer variants and their compact encodings
//! - Index resolution through base chains with a per-document cache
//! - Documents and corpora with validation at every mutation
//! - The service contract and the service-application pipeline
//! - JSON/YAML serialization of corpora
//! - Content-derived document ids

pub mod config;
pub mod corpus;
pub mod document;
pub mod errors;
pub mod id;
pub mod layer;
mod resolve;
pub mod schema;
pub mod serialization;
pub mod service;

pub use crate::corpus::Corpus;
pub use crate::document::Document;
pub use crate::errors::{ErrorKind, TeangaError, TeangaResult};
pub use crate::resolve::Extents;

/// Reserved top-level keys of the serialized corpus form.
pub mod keys {
    pub const META: &str = "_meta";
    pub const ORDER: &str = "_order";
}

/// Convenience re-exports.
pub mod prelude {
    pub use crate::config::{CorpusConfig, FailurePolicy};
    pub use crate::corpus::{Corpus, DocFailure, NewDocument, ServiceReport};
    pub use crate::document::{Document, LayerData};
    pub use crate::id::{IdGenerator, Sha256Fingerprint};
    pub use crate::layer::{Anchor, Data, Layer, Region};
    pub use crate::schema::{DataType, LayerDesc, LayerType, Schema};
    pub use crate::service::{Service, ServiceOutput, ServiceState};
    pub use crate::{ErrorKind, Extents, TeangaError, TeangaResult};
}
