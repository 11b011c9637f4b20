//! The service contract.
//!
//! A service consumes layers that already exist on a document and produces new
//! ones. The corpus is its only caller: it checks `requires`/`produces` against
//! the schema, calls `setup` once, then `execute` per document and merges the
//! returned layers through the normal validation path.
//!
//! Services must not keep per-document mutable state; `execute` takes `&self`
//! so documents can be processed independently.

use std::collections::BTreeSet;

use crate::document::{Document, LayerData};
use crate::schema::{LayerDesc, Schema};

/// Layers returned by one `execute` call, keyed by layer id.
pub type ServiceOutput = Vec<(String, LayerData)>;

/// Lifecycle of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Unconfigured,
    Ready,
}

pub trait Service {
    /// Stable name used in logs and errors.
    fn name(&self) -> &str;

    /// Layers that must be present on every document the service runs on.
    fn requires(&self) -> BTreeSet<String>;

    /// Layers the service produces, in dependency order.
    fn produces(&self) -> Vec<(String, LayerDesc)>;

    /// One-time initialization. Calling it again on a ready service is a no-op.
    fn setup(&mut self) -> anyhow::Result<()>;

    fn state(&self) -> ServiceState;

    /// Annotate one document. Only valid in the `Ready` state.
    fn execute(&self, schema: &Schema, doc: &Document) -> anyhow::Result<ServiceOutput>;
}

impl<S: Service + ?Sized> Service for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn requires(&self) -> BTreeSet<String> {
        (**self).requires()
    }

    fn produces(&self) -> Vec<(String, LayerDesc)> {
        (**self).produces()
    }

    fn setup(&mut self) -> anyhow::Result<()> {
        (**self).setup()
    }

    fn state(&self) -> ServiceState {
        (**self).state()
    }

    fn execute(&self, schema: &Schema, doc: &Document) -> anyhow::Result<ServiceOutput> {
        (**self).execute(schema, doc)
    }
}
