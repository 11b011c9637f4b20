//! In-process services backed by closures.

use std::collections::BTreeSet;
use std::fmt;

use teanga_core::document::Document;
use teanga_core::schema::{LayerDesc, Schema};
use teanga_core::service::{Service, ServiceOutput, ServiceState};

use crate::errors::ServiceError;

type ExecFn = Box<dyn Fn(&Schema, &Document) -> anyhow::Result<ServiceOutput> + Send + Sync>;
type SetupFn = Box<dyn FnMut() -> anyhow::Result<()> + Send>;

/// A service whose `execute` is a closure.
///
/// Starts unconfigured; `setup` runs the optional setup hook once and moves
/// the service to ready.
pub struct FnService {
    name: String,
    requires: BTreeSet<String>,
    produces: Vec<(String, LayerDesc)>,
    setup: Option<SetupFn>,
    exec: ExecFn,
    state: ServiceState,
}

impl FnService {
    pub fn new<F>(name: impl Into<String>, exec: F) -> Self
    where
        F: Fn(&Schema, &Document) -> anyhow::Result<ServiceOutput> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            requires: BTreeSet::new(),
            produces: Vec::new(),
            setup: None,
            exec: Box::new(exec),
            state: ServiceState::Unconfigured,
        }
    }

    pub fn require(mut self, layer_id: impl Into<String>) -> Self {
        self.requires.insert(layer_id.into());
        self
    }

    /// Declare a produced layer. Layers must be declared in dependency order.
    pub fn produce(mut self, layer_id: impl Into<String>, desc: LayerDesc) -> Self {
        self.produces.push((layer_id.into(), desc));
        self
    }

    pub fn on_setup<F>(mut self, f: F) -> Self
    where
        F: FnMut() -> anyhow::Result<()> + Send + 'static,
    {
        self.setup = Some(Box::new(f));
        self
    }
}

impl Service for FnService {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires(&self) -> BTreeSet<String> {
        self.requires.clone()
    }

    fn produces(&self) -> Vec<(String, LayerDesc)> {
        self.produces.clone()
    }

    fn setup(&mut self) -> anyhow::Result<()> {
        if self.state == ServiceState::Ready {
            return Ok(());
        }
        if let Some(hook) = self.setup.as_mut() {
            hook()?;
        }
        self.state = ServiceState::Ready;
        tracing::debug!(service = %self.name, "service ready");
        Ok(())
    }

    fn state(&self) -> ServiceState {
        self.state
    }

    fn execute(&self, schema: &Schema, doc: &Document) -> anyhow::Result<ServiceOutput> {
        if self.state != ServiceState::Ready {
            return Err(ServiceError::NotReady(self.name.clone()).into());
        }
        (self.exec)(schema, doc)
    }
}

impl fmt::Debug for FnService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnService")
            .field("name", &self.name)
            .field("requires", &self.requires)
            .field("produces", &self.produces)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use teanga_core::schema::LayerType;

    fn upper() -> FnService {
        FnService::new("upper", |_schema, doc| {
            let text = doc.get_layer("text")?.text().unwrap_or_default().to_uppercase();
            Ok(vec![("upper".to_string(), text.into())])
        })
        .require("text")
        .produce("upper", LayerDesc::characters())
    }

    #[test]
    fn execute_before_setup_fails() {
        let mut schema = Schema::new();
        schema.declare("text", LayerDesc::characters()).unwrap();
        let doc = Document::new("d");
        let err = upper().execute(&schema, &doc).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ServiceError>(),
            Some(ServiceError::NotReady(name)) if name == "upper"
        ));
    }

    #[test]
    fn setup_hook_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut svc = upper().on_setup(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert_eq!(svc.state(), ServiceState::Unconfigured);
        svc.setup().unwrap();
        svc.setup().unwrap();
        assert_eq!(svc.state(), ServiceState::Ready);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failing_setup_keeps_service_unconfigured() {
        let mut svc = upper().on_setup(|| anyhow::bail!("model missing"));
        assert!(svc.setup().is_err());
        assert_eq!(svc.state(), ServiceState::Unconfigured);
    }

    #[test]
    fn declares_contract() {
        let svc = FnService::new("noop", |_, _| Ok(Vec::new()))
            .require("words")
            .produce("sents", LayerDesc::new(LayerType::Div, "words"));
        assert_eq!(svc.requires(), BTreeSet::from(["words".to_string()]));
        assert_eq!(svc.produces()[0].0, "sents");
    }
}
