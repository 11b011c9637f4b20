//! Documents: a set of layers over one or more characters layers.
//!
//! A document never holds a partially valid layer: every add checks that the
//! layer is declared, that its base is present, that its data matches the
//! declaration and that every position is within the bounds of its base.
//!
//! Documents do not own the schema. Every operation that needs layer
//! declarations takes the schema explicitly.

use std::collections::BTreeMap;
use std::fmt;

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::errors::{TeangaError, TeangaResult};
use crate::layer::{Data, Layer};
use crate::resolve::{char_boundaries, identity, map_entries, Extents, ResolveCache, Resolver};
use crate::schema::{DataType, LayerDesc, Schema};

/// Input accepted by [`Document::add_layer`]: a canonical layer, or the
/// compact form that is normalized using the layer's declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerData {
    Layer(Layer),
    /// Compact form; `null` means "use the declared default".
    Compact(Value),
}

impl From<Layer> for LayerData {
    fn from(l: Layer) -> Self {
        Self::Layer(l)
    }
}

impl From<Value> for LayerData {
    fn from(v: Value) -> Self {
        Self::Compact(v)
    }
}

impl From<&str> for LayerData {
    fn from(s: &str) -> Self {
        Self::Compact(Value::String(s.to_string()))
    }
}

impl From<String> for LayerData {
    fn from(s: String) -> Self {
        Self::Compact(Value::String(s))
    }
}

pub struct Document {
    id: String,
    layers: BTreeMap<String, Layer>,
    cache: Mutex<ResolveCache>,
    cache_enabled: bool,
}

impl Document {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            layers: BTreeMap::new(),
            cache: Mutex::new(ResolveCache::default()),
            cache_enabled: true,
        }
    }

    /// Enable or disable memoized resolution for this document.
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        if !enabled {
            self.cache.get_mut().clear();
        }
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    /// Add or replace a layer.
    ///
    /// Fails with `UnknownLayer` if the layer is not declared, `TargetMissing`
    /// if its base is not present on this document, `Validation` for malformed
    /// data and `Index` for positions outside the base.
    pub fn add_layer(
        &mut self,
        schema: &Schema,
        layer_id: &str,
        data: impl Into<LayerData>,
    ) -> TeangaResult<&Layer> {
        let desc = schema.desc(layer_id)?;
        if let Some(base) = desc.base.as_deref() {
            if !self.layers.contains_key(base) {
                return Err(TeangaError::TargetMissing {
                    layer: layer_id.to_string(),
                    base: base.to_string(),
                });
            }
        }

        let layer = match data.into() {
            LayerData::Layer(layer) => {
                layer.check_structure(layer_id, desc)?;
                layer
            }
            LayerData::Compact(Value::Null) => match &desc.default {
                Some(default) => Layer::from_compact(layer_id, desc, default)?,
                None => {
                    return Err(TeangaError::validation(format!(
                        "no data given for layer {layer_id} and it declares no default"
                    )))
                }
            },
            LayerData::Compact(value) => Layer::from_compact(layer_id, desc, &value)?,
        };

        self.check_bounds(schema, layer_id, desc, &layer)?;
        self.check_links(layer_id, desc, &layer)?;
        self.check_link_sources(schema, layer_id, &layer)?;
        if self.layers.contains_key(layer_id) {
            self.check_dependents(schema, layer_id, &layer)?;
        }

        self.cache.get_mut().invalidate(schema, layer_id);
        tracing::debug!(doc = %self.id, layer = %layer_id, entries = layer.len(), "added layer");
        self.layers.insert(layer_id.to_string(), layer);
        Ok(&self.layers[layer_id])
    }

    /// Add several layers in dependency order. Either all are added or the
    /// document is left unchanged.
    pub fn add_layers<I>(&mut self, schema: &Schema, layers: I) -> TeangaResult<()>
    where
        I: IntoIterator<Item = (String, LayerData)>,
    {
        let mut pending: Vec<(String, LayerData)> = layers.into_iter().collect();
        for (id, _) in &pending {
            schema.desc(id)?;
        }
        pending.sort_by_key(|(id, _)| schema.position(id));

        let mut staged = self.clone().with_cache(false);
        for (id, data) in pending {
            staged.add_layer(schema, &id, data)?;
        }
        self.layers = staged.layers;
        self.cache.get_mut().clear();
        Ok(())
    }

    /// Remove a layer no other present layer is based on.
    pub fn remove_layer(&mut self, schema: &Schema, layer_id: &str) -> TeangaResult<Layer> {
        if !self.layers.contains_key(layer_id) {
            return Err(TeangaError::unknown_layer(layer_id));
        }
        for other in self.layers.keys() {
            if other == layer_id {
                continue;
            }
            if self.depends_on(schema, other, layer_id)? {
                return Err(TeangaError::validation(format!(
                    "cannot remove layer {layer_id}: layer {other} is based on it"
                )));
            }
        }
        self.cache.get_mut().invalidate(schema, layer_id);
        tracing::debug!(doc = %self.id, layer = %layer_id, "removed layer");
        self.layers
            .remove(layer_id)
            .ok_or_else(|| TeangaError::unknown_layer(layer_id))
    }

    pub fn has_layer(&self, layer_id: &str) -> bool {
        self.layers.contains_key(layer_id)
    }

    pub fn get_layer(&self, layer_id: &str) -> TeangaResult<&Layer> {
        self.layers
            .get(layer_id)
            .ok_or_else(|| TeangaError::unknown_layer(layer_id))
    }

    pub fn get_layer_ids(&self) -> Vec<&str> {
        self.layers.keys().map(String::as_str).collect()
    }

    pub fn layers(&self) -> impl Iterator<Item = (&str, &Layer)> + '_ {
        self.layers.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// `(layer id, text)` of every characters layer, in id order.
    pub fn character_layers(&self) -> Vec<(&str, &str)> {
        self.layers
            .iter()
            .filter_map(|(k, v)| v.text().map(|t| (k.as_str(), t)))
            .collect()
    }

    /// Absolute character offsets of every entry of a layer.
    pub fn indexes(&self, schema: &Schema, layer_id: &str) -> TeangaResult<Extents> {
        self.get_layer(layer_id)?;
        let root = schema.root_of(layer_id)?;
        self.resolver(schema).resolve(layer_id, root)
    }

    /// Entries of `layer_id` in units of `against`, a layer in its base chain.
    pub fn indexes_on(&self, schema: &Schema, layer_id: &str, against: &str) -> TeangaResult<Extents> {
        self.get_layer(layer_id)?;
        self.get_layer(against)?;
        self.resolver(schema).resolve(layer_id, against)
    }

    /// Text covered by entry `index` of a layer.
    pub fn text_for_layer(&self, schema: &Schema, layer_id: &str, index: usize) -> TeangaResult<String> {
        let extents = self.indexes(schema, layer_id)?;
        let &(start, end) = extents.get(index).ok_or_else(|| {
            TeangaError::index(
                layer_id,
                format!("entry {index} out of range for {} entries", extents.len()),
            )
        })?;
        let text = self.root_text(schema, layer_id)?;
        slice_chars(layer_id, text, &char_boundaries(text), start, end).map(str::to_string)
    }

    /// Text covered by every entry of a layer.
    pub fn text(&self, schema: &Schema, layer_id: &str) -> TeangaResult<Vec<String>> {
        let extents = self.indexes(schema, layer_id)?;
        let text = self.root_text(schema, layer_id)?;
        let bounds = char_boundaries(text);
        extents
            .iter()
            .map(|&(s, e)| slice_chars(layer_id, text, &bounds, s, e).map(str::to_string))
            .collect()
    }

    /// Text of every entry paired with its data value.
    pub fn text_data(&self, schema: &Schema, layer_id: &str) -> TeangaResult<Vec<(String, Option<Data>)>> {
        let texts = self.text(schema, layer_id)?;
        let data = self.get_layer(layer_id)?.data();
        Ok(texts
            .into_iter()
            .zip(data)
            .map(|(t, d)| (t, d.cloned()))
            .collect())
    }

    /// Character offsets of every entry paired with its data value.
    pub fn indexes_data(
        &self,
        schema: &Schema,
        layer_id: &str,
    ) -> TeangaResult<Vec<((usize, usize), Option<Data>)>> {
        let extents = self.indexes(schema, layer_id)?;
        let data = self.get_layer(layer_id)?.data();
        Ok(extents
            .iter()
            .copied()
            .zip(data)
            .map(|(x, d)| (x, d.cloned()))
            .collect())
    }

    /// Raw compact layer data as a JSON object. Resolutions are never written.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (id, layer) in &self.layers {
            map.insert(id.clone(), layer.to_compact());
        }
        Value::Object(map)
    }

    pub fn to_json_string(&self) -> TeangaResult<String> {
        Ok(serde_json::to_string(&self.to_json())?)
    }

    /// Rebuild a document from its raw compact layers.
    pub fn from_json(schema: &Schema, id: impl Into<String>, value: &Value) -> TeangaResult<Document> {
        let obj = value.as_object().ok_or_else(|| {
            TeangaError::serialization("a document must be a mapping of layer ids to layer data")
        })?;
        let mut doc = Document::new(id);
        doc.add_layers(
            schema,
            obj.iter()
                .map(|(k, v)| (k.clone(), LayerData::Compact(v.clone()))),
        )?;
        Ok(doc)
    }

    pub fn from_json_str(schema: &Schema, id: impl Into<String>, s: &str) -> TeangaResult<Document> {
        let value: Value = serde_json::from_str(s)?;
        Self::from_json(schema, id, &value)
    }

    #[cfg(test)]
    pub(crate) fn cached_resolutions(&self) -> usize {
        self.cache.lock().len()
    }

    fn resolver<'a>(&'a self, schema: &'a Schema) -> Resolver<'a> {
        Resolver {
            schema,
            layers: &self.layers,
            cache: self.cache_enabled.then_some(&self.cache),
        }
    }

    fn root_text<'a>(&'a self, schema: &'a Schema, layer_id: &'a str) -> TeangaResult<&'a str> {
        let root = schema.root_of(layer_id)?;
        self.get_layer(root)?
            .text()
            .ok_or_else(|| TeangaError::schema(format!("root layer {root} is not a characters layer")))
    }

    fn depends_on(&self, schema: &Schema, layer_id: &str, on: &str) -> TeangaResult<bool> {
        let desc = schema.desc(layer_id)?;
        if desc.base.as_deref() == Some(on) {
            return Ok(true);
        }
        if let Some(Layer::Standoff(_)) = self.layers.get(layer_id) {
            return Ok(schema.root_of(layer_id)? == on);
        }
        Ok(false)
    }

    /// Number of units a new layer's positions are checked against.
    fn base_len(&self, schema: &Schema, layer_id: &str, desc: &LayerDesc, layer: &Layer) -> TeangaResult<Option<usize>> {
        let base = match layer {
            Layer::Characters(_) => return Ok(None),
            Layer::Standoff(_) => schema.root_of(layer_id)?,
            _ => desc
                .base
                .as_deref()
                .ok_or_else(|| TeangaError::schema(format!("layer {layer_id} has no base")))?,
        };
        let base_layer = self.layers.get(base).ok_or_else(|| TeangaError::TargetMissing {
            layer: layer_id.to_string(),
            base: base.to_string(),
        })?;
        Ok(Some(base_layer.len()))
    }

    fn check_bounds(&self, schema: &Schema, layer_id: &str, desc: &LayerDesc, layer: &Layer) -> TeangaResult<()> {
        if let Some(n) = self.base_len(schema, layer_id, desc, layer)? {
            map_entries(layer_id, layer, &identity(n))?;
        }
        Ok(())
    }

    fn check_links(&self, layer_id: &str, desc: &LayerDesc, layer: &Layer) -> TeangaResult<()> {
        if desc.data != Some(DataType::Link) {
            return Ok(());
        }
        let target = desc.link_target.as_deref().unwrap_or(layer_id);
        let n = if target == layer_id {
            Some(layer.len())
        } else {
            self.layers.get(target).map(Layer::len)
        };
        match n {
            Some(n) => check_link_range(layer_id, layer, target, n),
            // an absent target is checked by `check_link_sources` when added
            None => Ok(()),
        }
    }

    /// Every present layer linking into `layer_id` must stay within `target`.
    fn check_link_sources(&self, schema: &Schema, layer_id: &str, target: &Layer) -> TeangaResult<()> {
        for (other, layer) in &self.layers {
            if other == layer_id {
                continue;
            }
            let desc = schema.desc(other)?;
            if desc.data == Some(DataType::Link) && desc.link_target.as_deref() == Some(layer_id) {
                check_link_range(other, layer, layer_id, target.len())?;
            }
        }
        Ok(())
    }

    /// Replacing a layer must keep every layer built on it in bounds.
    fn check_dependents(&self, schema: &Schema, layer_id: &str, replacement: &Layer) -> TeangaResult<()> {
        let n = replacement.len();
        for (other, layer) in &self.layers {
            if other == layer_id {
                continue;
            }
            let affected = match layer {
                // standoff positions only depend on the characters root
                Layer::Standoff(_) => schema.root_of(other)? == layer_id,
                _ => schema.desc(other)?.base.as_deref() == Some(layer_id),
            };
            if !affected {
                continue;
            }
            map_entries(other, layer, &identity(n)).map_err(|e| {
                TeangaError::validation(format!(
                    "replacing layer {layer_id} would invalidate layer {other}: {e}"
                ))
            })?;
        }
        Ok(())
    }
}

fn check_link_range(layer_id: &str, layer: &Layer, target: &str, n: usize) -> TeangaResult<()> {
    for (k, d) in layer.data().into_iter().enumerate() {
        if let Some(i) = d.and_then(Data::link) {
            if i >= n {
                return Err(TeangaError::index(
                    layer_id,
                    format!("entry {k} links to {i} but {target} has {n} entries"),
                ));
            }
        }
    }
    Ok(())
}

fn slice_chars<'t>(layer_id: &str, text: &'t str, bounds: &[usize], start: usize, end: usize) -> TeangaResult<&'t str> {
    match (bounds.get(start), bounds.get(end)) {
        (Some(&s), Some(&e)) if s <= e => Ok(&text[s..e]),
        _ => Err(TeangaError::index(
            layer_id,
            format!("range [{start}, {end}) outside text of {} characters", bounds.len().saturating_sub(1)),
        )),
    }
}

impl Clone for Document {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            layers: self.layers.clone(),
            cache: Mutex::new(ResolveCache::default()),
            cache_enabled: self.cache_enabled,
        }
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.layers == other.layers
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("layers", &self.layers)
            .finish_non_exhaustive()
    }
}
