//! Index resolution.
//!
//! Resolving a layer maps each of its entries to a half-open range expressed
//! in the units of another layer in its base chain (usually the characters
//! root, giving absolute character offsets). Resolution walks the chain
//! depth-first and memoizes every intermediate result in a per-document
//! cache; mutating a layer drops every cached result whose chain contains it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::errors::{TeangaError, TeangaResult};
use crate::layer::Layer;
use crate::schema::Schema;

/// Resolved `(start, end)` ranges, one per layer entry.
pub type Extents = Arc<[(usize, usize)]>;

/// Memoized resolutions keyed by `(layer, against)`.
#[derive(Debug, Default)]
pub(crate) struct ResolveCache {
    entries: HashMap<(String, String), Extents>,
}

impl ResolveCache {
    fn get(&self, layer: &str, against: &str) -> Option<Extents> {
        self.entries
            .get(&(layer.to_string(), against.to_string()))
            .cloned()
    }

    fn insert(&mut self, layer: &str, against: &str, extents: Extents) {
        self.entries
            .insert((layer.to_string(), against.to_string()), extents);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drop every entry whose resolution passed through `mutated`.
    pub(crate) fn invalidate(&mut self, schema: &Schema, mutated: &str) {
        let before = self.entries.len();
        self.entries.retain(|(layer, against), _| {
            if layer == mutated || against == mutated {
                return false;
            }
            match schema.base_chain(layer) {
                Ok(chain) => !chain.contains(&mutated),
                Err(_) => false,
            }
        });
        let dropped = before - self.entries.len();
        if dropped > 0 {
            tracing::debug!(layer = %mutated, dropped, "invalidated cached resolutions");
        }
    }
}

/// Walks base chains over one document's layers.
pub(crate) struct Resolver<'a> {
    pub schema: &'a Schema,
    pub layers: &'a BTreeMap<String, Layer>,
    pub cache: Option<&'a Mutex<ResolveCache>>,
}

impl<'a> Resolver<'a> {
    /// Resolve `layer_id` in units of `against`.
    pub fn resolve(&self, layer_id: &str, against: &str) -> TeangaResult<Extents> {
        let mut stack = Vec::new();
        self.resolve_inner(layer_id, against, &mut stack)
    }

    fn resolve_inner(
        &self,
        layer_id: &str,
        against: &str,
        stack: &mut Vec<String>,
    ) -> TeangaResult<Extents> {
        if stack.iter().any(|s| s == layer_id) {
            let mut chain = stack.clone();
            chain.push(layer_id.to_string());
            return Err(TeangaError::Cycle(chain));
        }
        if let Some(hit) = self.cache.and_then(|c| c.lock().get(layer_id, against)) {
            return Ok(hit);
        }

        let layer = self
            .layers
            .get(layer_id)
            .ok_or_else(|| TeangaError::unknown_layer(layer_id))?;

        let extents: Extents = if layer_id == against {
            identity(layer.len()).into()
        } else {
            match layer {
                Layer::Characters(_) => {
                    return Err(TeangaError::validation(format!(
                        "layer {against} is not in the base chain of {}",
                        stack.first().map(String::as_str).unwrap_or(layer_id)
                    )))
                }
                Layer::Standoff(_) => {
                    let root = self.schema.root_of(layer_id)?;
                    if root != against {
                        return Err(TeangaError::validation(format!(
                            "standoff layer {layer_id} can only be resolved against {root}, not {against}"
                        )));
                    }
                    let chars = self
                        .layers
                        .get(root)
                        .ok_or_else(|| TeangaError::unknown_layer(root))?
                        .len();
                    map_entries(layer_id, layer, &identity(chars))?.into()
                }
                _ => {
                    let base = self.schema.desc(layer_id)?.base.as_deref().ok_or_else(|| {
                        TeangaError::schema(format!("layer {layer_id} has no base"))
                    })?;
                    stack.push(layer_id.to_string());
                    let units = self.resolve_inner(base, against, stack)?;
                    stack.pop();
                    map_entries(layer_id, layer, &units)?.into()
                }
            }
        };

        if let Some(cache) = self.cache {
            cache.lock().insert(layer_id, against, extents.clone());
        }
        Ok(extents)
    }
}

/// `(k, k+1)` for each of `n` units.
pub(crate) fn identity(n: usize) -> Vec<(usize, usize)> {
    (0..n).map(|k| (k, k + 1)).collect()
}

/// Map the entries of `layer` through the resolved `units` of its base.
///
/// This is also the bounds check: it fails with `Index` whenever an entry
/// points outside `units`.
pub(crate) fn map_entries(
    layer_id: &str,
    layer: &Layer,
    units: &[(usize, usize)],
) -> TeangaResult<Vec<(usize, usize)>> {
    let n = units.len();
    let end_of_base = units.last().map(|u| u.1).unwrap_or(0);
    let start_of = |i: usize| if i < n { units[i].0 } else { end_of_base };

    match layer {
        Layer::Characters(_) => Err(TeangaError::validation(format!(
            "characters layer {layer_id} has no base to resolve through"
        ))),
        Layer::Seq(values) => {
            if values.len() != n {
                return Err(TeangaError::index(
                    layer_id,
                    format!("seq layer has {} entries but its base has {n}", values.len()),
                ));
            }
            Ok(units.to_vec())
        }
        Layer::Div(anchors) => {
            let mut out = Vec::with_capacity(anchors.len());
            for (k, a) in anchors.iter().enumerate() {
                if a.start >= n {
                    return Err(TeangaError::index(
                        layer_id,
                        format!("div {k} starts at {} but its base has {n} units", a.start),
                    ));
                }
                let end = match anchors.get(k + 1) {
                    Some(next) => start_of(next.start),
                    None => end_of_base,
                };
                out.push((units[a.start].0, end));
            }
            Ok(out)
        }
        Layer::Element(anchors) => anchors
            .iter()
            .enumerate()
            .map(|(k, a)| {
                units.get(a.start).copied().ok_or_else(|| {
                    TeangaError::index(
                        layer_id,
                        format!("element {k} points at {} but its base has {n} units", a.start),
                    )
                })
            })
            .collect(),
        Layer::Span(regions) | Layer::Standoff(regions) => regions
            .iter()
            .enumerate()
            .map(|(k, r)| {
                if r.end > n || r.start > r.end {
                    return Err(TeangaError::index(
                        layer_id,
                        format!("range {k} [{}, {}) exceeds base length {n}", r.start, r.end),
                    ));
                }
                if r.start == r.end {
                    let at = start_of(r.start);
                    Ok((at, at))
                } else {
                    Ok((units[r.start].0, units[r.end - 1].1))
                }
            })
            .collect(),
    }
}

/// Byte offsets of every character boundary of `text` (length `chars + 1`).
pub(crate) fn char_boundaries(text: &str) -> Vec<usize> {
    text.char_indices()
        .map(|(b, _)| b)
        .chain(std::iter::once(text.len()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::layer::{Anchor, Data, Region};
    use crate::schema::{LayerDesc, LayerType};

    fn fixture() -> (Schema, BTreeMap<String, Layer>) {
        let mut schema = Schema::new();
        schema.declare("text", LayerDesc::characters()).unwrap();
        schema.declare("words", LayerDesc::new(LayerType::Span, "text")).unwrap();
        schema.declare("sents", LayerDesc::new(LayerType::Div, "words")).unwrap();
        schema
            .declare("ents", LayerDesc::new(LayerType::Standoff, "text"))
            .unwrap();

        let mut layers = BTreeMap::new();
        layers.insert("text".to_string(), Layer::Characters("Hi there. Bye now.".into()));
        layers.insert(
            "words".to_string(),
            Layer::Span(vec![
                Region::new(0, 2),
                Region::new(3, 8),
                Region::new(8, 9),
                Region::new(10, 13),
                Region::new(14, 17),
                Region::new(17, 18),
            ]),
        );
        layers.insert(
            "sents".to_string(),
            Layer::Div(vec![Anchor::new(0), Anchor::new(3)]),
        );
        layers.insert("ents".to_string(), Layer::Standoff(vec![Region::new(3, 8)]));
        (schema, layers)
    }

    #[test]
    fn div_over_span_resolves_to_characters() {
        let (schema, layers) = fixture();
        let r = Resolver { schema: &schema, layers: &layers, cache: None };
        assert_eq!(&*r.resolve("sents", "text").unwrap(), &[(0, 10), (10, 18)]);
        assert_eq!(&*r.resolve("sents", "words").unwrap(), &[(0, 3), (3, 6)]);
        assert_eq!(&*r.resolve("sents", "sents").unwrap(), &[(0, 1), (1, 2)]);
    }

    #[test]
    fn standoff_only_resolves_against_root() {
        let (schema, layers) = fixture();
        let r = Resolver { schema: &schema, layers: &layers, cache: None };
        assert_eq!(&*r.resolve("ents", "text").unwrap(), &[(3, 8)]);
        let err = r.resolve("ents", "words").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn unrelated_layer_is_rejected() {
        let (schema, layers) = fixture();
        let r = Resolver { schema: &schema, layers: &layers, cache: None };
        let err = r.resolve("words", "sents").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn span_past_base_end_is_an_index_error() {
        let units = identity(5);
        let ok = Layer::Span(vec![Region::new(2, 5), Region::new(5, 5)]);
        assert_eq!(map_entries("w", &ok, &units).unwrap(), vec![(2, 5), (5, 5)]);
        let bad = Layer::Span(vec![Region::new(2, 6)]);
        assert_eq!(map_entries("w", &bad, &units).unwrap_err().kind(), ErrorKind::Index);
    }

    #[test]
    fn seq_length_must_match_base() {
        let seq = Layer::Seq(vec![Data::from("a")]);
        assert_eq!(map_entries("s", &seq, &identity(2)).unwrap_err().kind(), ErrorKind::Index);
    }

    #[test]
    fn element_resolves_single_units() {
        let units = vec![(0, 4), (5, 7), (8, 9)];
        let el = Layer::Element(vec![Anchor::new(2), Anchor::new(0)]);
        assert_eq!(map_entries("e", &el, &units).unwrap(), vec![(8, 9), (0, 4)]);
        let bad = Layer::Element(vec![Anchor::new(3)]);
        assert_eq!(map_entries("e", &bad, &units).unwrap_err().kind(), ErrorKind::Index);
    }

    #[test]
    fn cache_is_filled_and_invalidated() {
        let (schema, layers) = fixture();
        let cache = Mutex::new(ResolveCache::default());
        let r = Resolver { schema: &schema, layers: &layers, cache: Some(&cache) };
        r.resolve("sents", "text").unwrap();
        // sents, words and text against text
        assert_eq!(cache.lock().len(), 3);
        cache.lock().invalidate(&schema, "words");
        assert_eq!(cache.lock().len(), 1);
    }

    #[test]
    fn cyclic_chain_is_detected() {
        // A schema cannot be built with a cycle through `declare`, so the
        // resolver is exercised through a base that points back up the stack.
        let (schema, layers) = fixture();
        let r = Resolver { schema: &schema, layers: &layers, cache: None };
        let mut stack = vec!["words".to_string()];
        let err = r.resolve_inner("words", "text", &mut stack).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cycle);
    }

    #[test]
    fn boundaries_cover_multibyte_text() {
        assert_eq!(char_boundaries("Tá"), vec![0, 1, 3]);
    }
}
