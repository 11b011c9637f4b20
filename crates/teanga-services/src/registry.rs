//! Service registry.
//!
//! The registry stores service instances next to their specs and applies them
//! to corpora by id.
//!
//! Requirements:
//! - stable ordering for lookups and iteration
//! - clear errors for missing or duplicate services
//! - no global mutable state

use std::collections::BTreeMap;

use teanga_core::config::FailurePolicy;
use teanga_core::corpus::{Corpus, ServiceReport};
use teanga_core::service::Service;

use crate::errors::ServiceError;
use crate::spec::ServiceSpec;

/// A service instance plus its static spec.
pub struct RegisteredService {
    pub spec: ServiceSpec,
    pub service: Box<dyn Service + Send>,
}

/// Services keyed by spec id.
#[derive(Default)]
pub struct ServiceRegistry {
    services: BTreeMap<String, RegisteredService>,
}

impl ServiceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered services.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// True when no service is registered.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Register a service under its spec id. Ids must be unique.
    pub fn register(&mut self, spec: ServiceSpec, service: Box<dyn Service + Send>) -> Result<(), ServiceError> {
        spec.validate()?;

        let id = spec.id.as_str().to_string();
        if self.services.contains_key(&id) {
            return Err(ServiceError::AlreadyRegistered(id));
        }
        tracing::debug!(service = %id, name = %service.name(), "registered service");
        self.services.insert(id, RegisteredService { spec, service });
        Ok(())
    }

    /// Get a registered service by id.
    pub fn get(&self, id: &str) -> Option<&RegisteredService> {
        self.services.get(id)
    }

    /// Get a registered service by id, mutably.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut RegisteredService> {
        self.services.get_mut(id)
    }

    /// Service ids in deterministic order.
    pub fn list_ids(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }

    /// Iterate over registered services in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &RegisteredService)> {
        self.services.iter()
    }

    /// Apply a registered service to every document of a corpus, using the
    /// corpus' configured failure policy.
    pub fn apply(&mut self, corpus: &mut Corpus, id: &str) -> Result<ServiceReport, ServiceError> {
        let policy = corpus.config().services.failure_policy;
        self.apply_with(corpus, id, policy)
    }

    pub fn apply_with(
        &mut self,
        corpus: &mut Corpus,
        id: &str,
        policy: FailurePolicy,
    ) -> Result<ServiceReport, ServiceError> {
        let entry = self
            .services
            .get_mut(id)
            .ok_or_else(|| ServiceError::NotRegistered(id.to_string()))?;
        Ok(corpus.apply_service_with(entry.service.as_mut(), policy)?)
    }
}
