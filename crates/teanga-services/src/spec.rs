//! Service specification types.
//!
//! A spec is the static, data-only description a service is registered with:
//! - identity (stable id, display name, version)
//! - free-form metadata for listings
//!
//! Specs never execute code. The layers a service requires and produces are
//! declared by the service itself through the `Service` trait.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;

/// Stable service identifier.
///
/// Format recommendations:
/// - lowercase ASCII
/// - segments separated by dots
/// - example: "udpipe.en"
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServiceId(pub String);

impl ServiceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub id: ServiceId,

    /// Human-readable display name.
    pub name: String,

    pub version: String,

    /// Arbitrary metadata (e.g. endpoint, model, language).
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

impl ServiceSpec {
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: ServiceId::new(id),
            name: name.into(),
            version: version.into(),
            meta: BTreeMap::new(),
        }
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        let id = self.id.as_str();
        if id.trim().is_empty() {
            return Err(ServiceError::InvalidSpec("service id is empty".into()));
        }
        if !id.is_ascii() || id.chars().any(char::is_whitespace) {
            return Err(ServiceError::InvalidSpec(format!(
                "service id {id:?} must be ASCII without whitespace"
            )));
        }
        if self.name.trim().is_empty() {
            return Err(ServiceError::InvalidSpec(format!("service {id} has an empty name")));
        }
        if self.version.trim().is_empty() {
            return Err(ServiceError::InvalidSpec(format!("service {id} has an empty version")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_spec() {
        let spec = ServiceSpec::new("tok.ws", "Whitespace tokenizer", "0.1.0").meta("lang", "any");
        spec.validate().unwrap();
        assert_eq!(spec.meta["lang"], "any");
    }

    #[test]
    fn rejects_blank_fields() {
        assert!(ServiceSpec::new("", "x", "1").validate().is_err());
        assert!(ServiceSpec::new("a b", "x", "1").validate().is_err());
        assert!(ServiceSpec::new("a", " ", "1").validate().is_err());
        assert!(ServiceSpec::new("a", "x", "").validate().is_err());
    }

    #[test]
    fn spec_deserializes_without_meta() {
        let spec: ServiceSpec =
            serde_json::from_str(r#"{"id": "tok.ws", "name": "Tokenizer", "version": "1"}"#).unwrap();
        assert_eq!(spec.id.as_str(), "tok.ws");
        assert!(spec.meta.is_empty());
    }
}
