//! Content-derived document ids.
//!
//! The corpus asks an [`IdGenerator`] for a fingerprint of a new document's
//! characters layers and uses the shortest prefix that does not clash with a
//! different document. The default generator hashes with SHA-256 and encodes
//! the digest as standard base64.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use itertools::Itertools;
use sha2::{Digest, Sha256};

/// A pure function from character content to a fingerprint string.
pub trait IdGenerator: Send + Sync {
    /// `text_layers` holds `(layer id, text)` for every characters layer of
    /// the document. The result must not depend on the slice order.
    fn fingerprint(&self, text_layers: &[(&str, &str)]) -> String;
}

/// SHA-256 over `name \0 text \0` for each characters layer in name order.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Fingerprint;

impl IdGenerator for Sha256Fingerprint {
    fn fingerprint(&self, text_layers: &[(&str, &str)]) -> String {
        let mut hasher = Sha256::new();
        for (name, text) in text_layers.iter().sorted_by_key(|(name, _)| *name) {
            hasher.update(name.as_bytes());
            hasher.update([0u8]);
            hasher.update(text.as_bytes());
            hasher.update([0u8]);
        }
        STANDARD.encode(hasher.finalize())
    }
}

/// Outcome of probing one id candidate against the corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdClaim {
    /// No document uses the candidate.
    Free,
    /// A document with the same character content uses the candidate.
    SameContent,
    /// A different document uses the candidate.
    Taken,
}

/// Pick the shortest prefix of `fingerprint` of at least `min_len` characters
/// that is free. Returns `Err(candidate)` when a document with identical
/// content already owns a candidate, or when every prefix is taken.
pub fn shortest_free_prefix<F>(fingerprint: &str, min_len: usize, mut probe: F) -> Result<String, String>
where
    F: FnMut(&str) -> IdClaim,
{
    let min_len = min_len.clamp(1, fingerprint.len().max(1));
    let mut last = fingerprint;
    for n in min_len..=fingerprint.len() {
        // base64 output is ASCII, so every n is a char boundary
        let candidate = &fingerprint[..n];
        match probe(candidate) {
            IdClaim::Free => return Ok(candidate.to_string()),
            IdClaim::SameContent => return Err(candidate.to_string()),
            IdClaim::Taken => last = candidate,
        }
    }
    Err(last.to_string())
}
