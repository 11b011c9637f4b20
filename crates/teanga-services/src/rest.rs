//! Services backed by a remote HTTP endpoint.
//!
//! Wire contract:
//! - request: `POST <url>/execute` with body
//!   `{"id": "<doc id>", "layers": {"<layer>": <compact data>, ...}}`, carrying
//!   only the layers the service requires
//! - response: `{"<layer>": <compact data>, ...}` with produced layers only
//!
//! Request building and response parsing are pure; only [`RestService`]
//! performs network calls, with the timeout given at construction.

#![cfg(feature = "rest")]

use std::collections::BTreeSet;
use std::time::Duration;

use serde_json::{Map, Value};

use teanga_core::config::ServiceConfig;
use teanga_core::document::{Document, LayerData};
use teanga_core::schema::{LayerDesc, Schema};
use teanga_core::service::{Service, ServiceOutput, ServiceState};
use teanga_core::TeangaResult;

use crate::errors::ServiceError;

/// Build the request body for one document.
pub fn build_request(doc: &Document, requires: &BTreeSet<String>) -> TeangaResult<Value> {
    let mut layers = Map::new();
    for layer_id in requires {
        layers.insert(layer_id.clone(), doc.get_layer(layer_id)?.to_compact());
    }
    let mut body = Map::new();
    body.insert("id".to_string(), Value::String(doc.id().to_string()));
    body.insert("layers".to_string(), Value::Object(layers));
    Ok(Value::Object(body))
}

/// Turn a response body into service output, in the order the layers are
/// declared in `produces`.
pub fn parse_response(
    service: &str,
    produces: &[(String, LayerDesc)],
    body: Value,
) -> Result<ServiceOutput, ServiceError> {
    let Value::Object(mut layers) = body else {
        return Err(ServiceError::bad_response(service, "response body is not a JSON object"));
    };
    if let Some(extra) = layers.keys().find(|k| !produces.iter().any(|(p, _)| p == *k)) {
        return Err(ServiceError::bad_response(
            service,
            format!("response contains undeclared layer {extra}"),
        ));
    }
    Ok(produces
        .iter()
        .filter_map(|(id, _)| layers.remove(id).map(|v| (id.clone(), LayerData::Compact(v))))
        .collect())
}

/// A service that delegates `execute` to `POST <url>/execute`.
pub struct RestService {
    name: String,
    url: String,
    requires: BTreeSet<String>,
    produces: Vec<(String, LayerDesc)>,
    timeout: Duration,
    client: Option<reqwest::blocking::Client>,
}

impl RestService {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::with_config(name, url, &ServiceConfig::default())
    }

    /// Take the request timeout from a corpus service config.
    pub fn with_config(name: impl Into<String>, url: impl Into<String>, config: &ServiceConfig) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            requires: BTreeSet::new(),
            produces: Vec::new(),
            timeout: Duration::from_millis(config.timeout_ms),
            client: None,
        }
    }

    pub fn require(mut self, layer_id: impl Into<String>) -> Self {
        self.requires.insert(layer_id.into());
        self
    }

    pub fn produce(mut self, layer_id: impl Into<String>, desc: LayerDesc) -> Self {
        self.produces.push((layer_id.into(), desc));
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn endpoint(&self) -> String {
        format!("{}/execute", self.url.trim_end_matches('/'))
    }
}

impl Service for RestService {
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
        if self.client.is_some() {
            return Ok(());
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()?;
        self.client = Some(client);
        tracing::info!(service = %self.name, endpoint = %self.endpoint(), "rest service ready");
        Ok(())
    }

    fn state(&self) -> ServiceState {
        if self.client.is_some() {
            ServiceState::Ready
        } else {
            ServiceState::Unconfigured
        }
    }

    fn execute(&self, _schema: &Schema, doc: &Document) -> anyhow::Result<ServiceOutput> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| ServiceError::NotReady(self.name.clone()))?;
        let body = build_request(doc, &self.requires)?;
        tracing::debug!(service = %self.name, doc = %doc.id(), "posting document");
        let response: Value = client
            .post(self.endpoint())
            .json(&body)
            .send()?
            .error_for_status()?
            .json()?;
        Ok(parse_response(&self.name, &self.produces, response)?)
    }
}
