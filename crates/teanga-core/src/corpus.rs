//! The corpus: a schema shared by an insertion-ordered set of documents, and
//! the service-application pipeline.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::config::{validate_config, CorpusConfig, FailurePolicy};
use crate::document::{Document, LayerData};
use crate::errors::{TeangaError, TeangaResult};
use crate::id::{shortest_free_prefix, IdClaim, IdGenerator, Sha256Fingerprint};
use crate::layer::Layer;
use crate::schema::{LayerDesc, Schema};
use crate::service::{Service, ServiceState};

/// Arguments of [`Corpus::add_doc`].
///
/// `text` fills the schema's single characters layer; any other layer must be
/// named explicitly with [`NewDocument::layer`].
#[derive(Debug, Clone, Default)]
pub struct NewDocument {
    text: Option<String>,
    layers: Vec<(String, LayerData)>,
    id: Option<String>,
    overwrite: bool,
}

impl NewDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn layer(mut self, layer_id: impl Into<String>, data: impl Into<LayerData>) -> Self {
        self.layers.push((layer_id.into(), data.into()));
        self
    }

    /// Use an explicit id instead of a content fingerprint.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Replace an existing document with the same id instead of failing.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

impl From<&str> for NewDocument {
    fn from(text: &str) -> Self {
        Self::new().text(text)
    }
}

impl From<String> for NewDocument {
    fn from(text: String) -> Self {
        Self::new().text(text)
    }
}

/// One document a service run could not process.
#[derive(Debug)]
pub struct DocFailure {
    pub doc: String,
    pub error: TeangaError,
}

/// Outcome of [`Corpus::apply_service`].
#[derive(Debug)]
pub struct ServiceReport {
    pub service: String,
    pub processed: usize,
    pub failures: Vec<DocFailure>,
}

impl ServiceReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct Corpus {
    schema: Schema,
    docs: HashMap<String, Document>,
    order: Vec<String>,
    config: CorpusConfig,
    ids: Arc<dyn IdGenerator>,
}

impl Default for Corpus {
    fn default() -> Self {
        Self::new()
    }
}

impl Corpus {
    pub fn new() -> Self {
        Self {
            schema: Schema::new(),
            docs: HashMap::new(),
            order: Vec::new(),
            config: CorpusConfig::default(),
            ids: Arc::new(Sha256Fingerprint),
        }
    }

    pub fn with_config(config: CorpusConfig) -> TeangaResult<Self> {
        validate_config(&config)?;
        Ok(Self {
            config,
            ..Self::new()
        })
    }

    /// Replace the document-id fingerprint function.
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn config(&self) -> &CorpusConfig {
        &self.config
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The layer metadata of the corpus.
    pub fn get_meta(&self) -> &Schema {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Declare a new layer; see [`Schema::declare`].
    pub fn add_layer_meta(&mut self, layer_id: impl Into<String>, desc: LayerDesc) -> TeangaResult<()> {
        self.schema.declare(layer_id, desc)
    }

    /// Create and store a document, returning its id.
    pub fn add_doc(&mut self, new: impl Into<NewDocument>) -> TeangaResult<String> {
        let NewDocument {
            text,
            mut layers,
            id,
            overwrite,
        } = new.into();

        if let Some(text) = text {
            let chars = self.schema.characters_layers();
            let [default_layer] = chars.as_slice() else {
                return Err(TeangaError::validation(format!(
                    "plain text needs exactly one characters layer, the schema declares {}",
                    chars.len()
                )));
            };
            if layers.iter().any(|(l, _)| l == default_layer) {
                return Err(TeangaError::validation(format!(
                    "layer {default_layer} given both as text and as a named layer"
                )));
            }
            layers.push((default_layer.to_string(), LayerData::from(text)));
        }

        let doc = self.build_document(id.clone().unwrap_or_default(), layers)?;
        let id = match id {
            Some(id) => {
                if id.is_empty() || id.starts_with('_') {
                    return Err(TeangaError::validation(format!(
                        "document id {id:?} must be non-empty and must not start with '_'"
                    )));
                }
                if self.docs.contains_key(&id) && !overwrite {
                    return Err(TeangaError::DuplicateDoc(id));
                }
                id
            }
            None => self.generate_id(&doc, overwrite)?,
        };
        self.store(id, doc)
    }

    /// Add a layer to a stored document.
    pub fn add_layer(&mut self, doc_id: &str, layer_id: &str, data: impl Into<LayerData>) -> TeangaResult<()> {
        let doc = self
            .docs
            .get_mut(doc_id)
            .ok_or_else(|| TeangaError::unknown_doc(doc_id))?;
        doc.add_layer(&self.schema, layer_id, data)?;
        Ok(())
    }

    pub fn remove_doc(&mut self, doc_id: &str) -> TeangaResult<Document> {
        let doc = self
            .docs
            .remove(doc_id)
            .ok_or_else(|| TeangaError::unknown_doc(doc_id))?;
        self.order.retain(|d| d != doc_id);
        tracing::info!(doc = %doc_id, "removed document");
        Ok(doc)
    }

    /// Replace the layers of a stored document, keeping its id and position.
    pub fn update_doc<I>(&mut self, doc_id: &str, layers: I) -> TeangaResult<()>
    where
        I: IntoIterator<Item = (String, LayerData)>,
    {
        if !self.docs.contains_key(doc_id) {
            return Err(TeangaError::unknown_doc(doc_id));
        }
        let doc = self.build_document(doc_id.to_string(), layers.into_iter().collect())?;
        self.docs.insert(doc_id.to_string(), doc);
        tracing::info!(doc = %doc_id, "updated document");
        Ok(())
    }

    pub fn get_doc_by_id(&self, doc_id: &str) -> TeangaResult<&Document> {
        self.docs
            .get(doc_id)
            .ok_or_else(|| TeangaError::unknown_doc(doc_id))
    }

    /// Document ids in insertion order.
    pub fn get_doc_ids(&self) -> &[String] {
        &self.order
    }

    /// Documents in insertion order.
    pub fn get_docs(&self) -> impl Iterator<Item = &Document> + '_ {
        self.order.iter().filter_map(move |id| self.docs.get(id))
    }

    /// Every document's instance of a declared layer, in insertion order.
    /// Documents without the layer are skipped.
    pub fn get_layers(&self, layer_id: &str) -> TeangaResult<Vec<(&str, &Layer)>> {
        self.schema.desc(layer_id)?;
        Ok(self
            .get_docs()
            .filter_map(|d| d.get_layer(layer_id).ok().map(|l| (d.id(), l)))
            .collect())
    }

    /// Run a service over every document using the configured failure policy.
    pub fn apply_service<S: Service + ?Sized>(&mut self, service: &mut S) -> TeangaResult<ServiceReport> {
        let policy = self.config.services.failure_policy;
        self.apply_service_with(service, policy)
    }

    /// Run a service over every document.
    ///
    /// Produced layers are declared first (failing with `ServiceContract` if
    /// one clashes with an existing declaration), then `setup` runs once, then
    /// each document is executed and its output merged atomically. A document
    /// that lacks a required layer or whose output fails validation is left
    /// unchanged. With [`FailurePolicy::Abort`] the first failure is returned
    /// as the error; documents processed before it keep their new layers.
    pub fn apply_service_with<S: Service + ?Sized>(
        &mut self,
        service: &mut S,
        policy: FailurePolicy,
    ) -> TeangaResult<ServiceReport> {
        let name = service.name().to_string();
        let requires = service.requires();
        let (scratch, produced) = self.declare_products(&name, service.produces())?;

        for layer in &requires {
            if !scratch.contains(layer) {
                return Err(TeangaError::contract(
                    &name,
                    format!("requires undeclared layer {layer}"),
                ));
            }
        }

        if service.state() != ServiceState::Ready {
            tracing::info!(service = %name, "setting up service");
            service
                .setup()
                .map_err(|source| TeangaError::ServiceExecution {
                    service: name.clone(),
                    doc: "(setup)".to_string(),
                    source,
                })?;
            if service.state() != ServiceState::Ready {
                return Err(TeangaError::contract(&name, "service is not ready after setup"));
            }
        }
        self.schema = scratch;

        let mut report = ServiceReport {
            service: name.clone(),
            processed: 0,
            failures: Vec::new(),
        };
        for doc_id in self.order.clone() {
            match self.apply_to_doc(&*service, &name, &requires, &produced, &doc_id) {
                Ok(()) => report.processed += 1,
                Err(error) => {
                    tracing::warn!(service = %name, doc = %doc_id, error = %error, "service failed on document");
                    match policy {
                        FailurePolicy::Abort => return Err(error),
                        FailurePolicy::Continue => report.failures.push(DocFailure { doc: doc_id, error }),
                    }
                }
            }
        }
        tracing::info!(
            service = %name,
            processed = report.processed,
            failed = report.failures.len(),
            "service run finished"
        );
        Ok(report)
    }

    /// Check produced descriptors against a copy of the schema with the new
    /// ones declared. The caller commits the copy once the run may start.
    fn declare_products(
        &self,
        service: &str,
        produces: Vec<(String, LayerDesc)>,
    ) -> TeangaResult<(Schema, BTreeSet<String>)> {
        let mut scratch = self.schema.clone();
        let mut ids = BTreeSet::new();
        for (layer_id, desc) in produces {
            match scratch.get(&layer_id) {
                Some(existing) => {
                    if existing != &desc.normalized() {
                        return Err(TeangaError::contract(
                            service,
                            format!("produces layer {layer_id} with a declaration that differs from the schema"),
                        ));
                    }
                }
                None => scratch
                    .declare(layer_id.clone(), desc)
                    .map_err(|e| TeangaError::contract(service, e.to_string()))?,
            }
            ids.insert(layer_id);
        }
        Ok((scratch, ids))
    }

    fn apply_to_doc<S: Service + ?Sized>(
        &mut self,
        service: &S,
        name: &str,
        requires: &BTreeSet<String>,
        produced: &BTreeSet<String>,
        doc_id: &str,
    ) -> TeangaResult<()> {
        let doc = self.get_doc_by_id(doc_id)?;
        let missing: Vec<&str> = requires
            .iter()
            .filter(|l| !doc.has_layer(l))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(TeangaError::contract(
                name,
                format!("document {doc_id} lacks required layers: {}", missing.join(", ")),
            ));
        }

        tracing::debug!(service = %name, doc = %doc_id, "executing service");
        let output = service
            .execute(&self.schema, doc)
            .map_err(|source| TeangaError::ServiceExecution {
                service: name.to_string(),
                doc: doc_id.to_string(),
                source,
            })?;
        if let Some((extra, _)) = output.iter().find(|(l, _)| !produced.contains(l)) {
            return Err(TeangaError::contract(
                name,
                format!("returned layer {extra} it does not declare"),
            ));
        }

        let doc = self
            .docs
            .get_mut(doc_id)
            .ok_or_else(|| TeangaError::unknown_doc(doc_id))?;
        doc.add_layers(&self.schema, output)
    }

    /// Validate layers into a document and fill declared defaults.
    fn build_document(&self, id: String, layers: Vec<(String, LayerData)>) -> TeangaResult<Document> {
        let mut doc = Document::new(id).with_cache(self.config.resolution.cache);
        doc.add_layers(&self.schema, layers)?;

        for (layer_id, desc) in self.schema.iter() {
            if doc.has_layer(layer_id) || desc.default.is_none() {
                continue;
            }
            if desc.base.as_deref().map_or(true, |b| doc.has_layer(b)) {
                doc.add_layer(&self.schema, layer_id, Value::Null)?;
            }
        }

        if doc.character_layers().is_empty() {
            return Err(TeangaError::validation("a document needs at least one characters layer"));
        }
        Ok(doc)
    }

    fn generate_id(&self, doc: &Document, overwrite: bool) -> TeangaResult<String> {
        let content = doc.character_layers();
        let fingerprint = self.ids.fingerprint(&content);
        let claim = shortest_free_prefix(&fingerprint, self.config.ids.min_length, |candidate| {
            match self.docs.get(candidate) {
                None => IdClaim::Free,
                Some(existing) if existing.character_layers() == content => IdClaim::SameContent,
                Some(_) => IdClaim::Taken,
            }
        });
        match claim {
            Ok(id) => Ok(id),
            Err(id) if overwrite => Ok(id),
            Err(id) => Err(TeangaError::DuplicateDoc(id)),
        }
    }

    fn store(&mut self, id: String, mut doc: Document) -> TeangaResult<String> {
        doc.set_id(id.clone());
        if self.docs.insert(id.clone(), doc).is_none() {
            self.order.push(id.clone());
            tracing::info!(doc = %id, "added document");
        } else {
            tracing::info!(doc = %id, "overwrote document");
        }
        Ok(id)
    }

    /// Insert an already validated document read from a file.
    pub(crate) fn insert_loaded(&mut self, doc: Document) -> TeangaResult<()> {
        if self.docs.contains_key(doc.id()) {
            return Err(TeangaError::DuplicateDoc(doc.id().to_string()));
        }
        self.order.push(doc.id().to_string());
        self.docs.insert(doc.id().to_string(), doc);
        Ok(())
    }

    pub(crate) fn replace_schema(&mut self, schema: Schema) {
        self.schema = schema;
    }
}

impl PartialEq for Corpus {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema && self.order == other.order && self.docs == other.docs
    }
}

impl fmt::Debug for Corpus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Corpus")
            .field("schema", &self.schema)
            .field("order", &self.order)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
