//! Configuration structures for teanga-core.
//!
//! Configuration is explicit and serializable. The core crate never reads
//! environment variables or files on its own; hosts load a `CorpusConfig`
//! however they like and hand it to [`crate::Corpus::with_config`].

use serde::{Deserialize, Serialize};

use crate::errors::{TeangaError, TeangaResult};

/// Configuration root.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorpusConfig {
    #[serde(default)]
    pub ids: IdConfig,
    #[serde(default)]
    pub resolution: ResolutionConfig,
    #[serde(default)]
    pub services: ServiceConfig,
}

/// Generated document id settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdConfig {
    /// Minimum length of a generated id.
    #[serde(default = "IdConfig::default_min_length")]
    pub min_length: usize,
}

impl Default for IdConfig {
    fn default() -> Self {
        Self {
            min_length: Self::default_min_length(),
        }
    }
}

impl IdConfig {
    fn default_min_length() -> usize {
        4
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionConfig {
    /// Memoize resolved layers per document.
    #[serde(default = "ResolutionConfig::default_cache")]
    pub cache: bool,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            cache: Self::default_cache(),
        }
    }
}

impl ResolutionConfig {
    fn default_cache() -> bool {
        true
    }
}

/// What `apply_service` does when one document fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop at the first failing document and return its error.
    #[default]
    Abort,
    /// Record the failure and carry on with the next document.
    Continue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Upper bound for a single blocking service call.
    #[serde(default = "ServiceConfig::default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            timeout_ms: Self::default_timeout_ms(),
        }
    }
}

impl ServiceConfig {
    fn default_timeout_ms() -> u64 {
        60_000
    }
}

/// Longest id a SHA-256 base64 fingerprint can provide.
const MAX_ID_LENGTH: usize = 44;

/// Validate a full configuration object.
pub fn validate_config(cfg: &CorpusConfig) -> TeangaResult<()> {
    if cfg.ids.min_length == 0 || cfg.ids.min_length > MAX_ID_LENGTH {
        return Err(TeangaError::config(format!(
            "ids.min_length must be between 1 and {MAX_ID_LENGTH}"
        )));
    }
    if cfg.services.timeout_ms == 0 {
        return Err(TeangaError::config(
            "services.timeout_ms must be greater than zero",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        validate_config(&CorpusConfig::default()).unwrap();
    }

    #[test]
    fn zero_min_length_detected() {
        let mut cfg = CorpusConfig::default();
        cfg.ids.min_length = 0;
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn zero_timeout_detected() {
        let mut cfg = CorpusConfig::default();
        cfg.services.timeout_ms = 0;
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: CorpusConfig =
            serde_json::from_str(r#"{"services": {"failure_policy": "continue"}}"#).unwrap();
        assert_eq!(cfg.services.failure_policy, FailurePolicy::Continue);
        assert_eq!(cfg.services.timeout_ms, 60_000);
        assert_eq!(cfg.ids.min_length, 4);
        assert!(cfg.resolution.cache);
    }
}
