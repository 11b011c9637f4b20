//! Layer schema: layer descriptors and the declaration-ordered registry.
//!
//! A schema is append-only. Every declaration is validated against the layers
//! declared before it, so the declaration order is always a valid topological
//! order of the base-dependency graph.
//!
//! Serialized shape of a descriptor:
//!
//! ```yaml
//! words:
//!   type: span
//!   base: text
//! pos:
//!   type: seq
//!   base: words
//!   data: [NOUN, VERB, DET]
//! ```

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::errors::{TeangaError, TeangaResult};
use crate::layer::Layer;

/// The structural kind of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerType {
    Characters,
    Seq,
    Div,
    Element,
    Span,
    Standoff,
}

impl LayerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Characters => "characters",
            Self::Seq => "seq",
            Self::Div => "div",
            Self::Element => "element",
            Self::Span => "span",
            Self::Standoff => "standoff",
        }
    }
}

impl FromStr for LayerType {
    type Err = TeangaError;

    fn from_str(s: &str) -> TeangaResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "characters" => Ok(Self::Characters),
            "seq" => Ok(Self::Seq),
            "div" => Ok(Self::Div),
            "element" => Ok(Self::Element),
            "span" => Ok(Self::Span),
            "standoff" => Ok(Self::Standoff),
            _ => Err(TeangaError::schema(format!("unknown layer type: {s}"))),
        }
    }
}

impl fmt::Display for LayerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of data carried by each entry of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Free string, or a member of `values` when declared.
    String,
    /// Index into the link-target layer, typed by `values` when declared.
    Link,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Link => "link",
        }
    }
}

/// Declaration of one layer in the schema.
///
/// `base` is the layer this layer's positions are expressed in. It is absent
/// for characters layers and required for every other kind.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerDesc {
    pub layer_type: LayerType,
    pub base: Option<String>,
    pub data: Option<DataType>,
    pub values: Option<Vec<String>>,
    /// For link data: the layer whose entries links point at (defaults to self).
    pub link_target: Option<String>,
    /// Compact layer data used when a document omits this layer.
    pub default: Option<Value>,
}

impl LayerDesc {
    /// A layer of `layer_type` whose positions refer to `base`.
    pub fn new(layer_type: LayerType, base: impl Into<String>) -> Self {
        Self {
            layer_type,
            base: Some(base.into()),
            data: None,
            values: None,
            link_target: None,
            default: None,
        }
    }

    /// A root characters layer.
    pub fn characters() -> Self {
        Self {
            layer_type: LayerType::Characters,
            base: None,
            data: None,
            values: None,
            link_target: None,
            default: None,
        }
    }

    /// Attach data of the given type to every entry.
    pub fn with_data(mut self, data: DataType) -> Self {
        self.data = Some(data);
        self
    }

    /// Constrain entries to a set of values. Implies string data when no data
    /// type was set.
    pub fn with_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values = Some(values.into_iter().map(Into::into).collect());
        if self.data.is_none() {
            self.data = Some(DataType::String);
        }
        self
    }

    /// Layer that link data points into. Defaults to the layer itself.
    pub fn with_link_target(mut self, target: impl Into<String>) -> Self {
        self.link_target = Some(target.into());
        self
    }

    /// Compact value used when a document is added without this layer.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// True when entries carry a link index plus a link type.
    pub fn is_typed_link(&self) -> bool {
        self.data == Some(DataType::Link) && self.values.is_some()
    }

    pub(crate) fn normalized(mut self) -> Self {
        if self.values.is_some() && self.data.is_none() {
            self.data = Some(DataType::String);
        }
        self
    }
}

/// The serialized shape of a [`LayerDesc`].
#[derive(Serialize, Deserialize)]
struct LayerDescRepr {
    #[serde(rename = "type")]
    layer_type: LayerType,
    #[serde(default, alias = "on", skip_serializing_if = "Option::is_none")]
    base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<DataRepr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<Value>,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum DataRepr {
    Name(String),
    Values(Vec<String>),
}

impl Serialize for LayerDesc {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        LayerDescRepr {
            layer_type: self.layer_type,
            base: self.base.clone(),
            data: self.data.map(|d| DataRepr::Name(d.as_str().to_string())),
            values: self.values.clone(),
            target: self.link_target.clone(),
            default: self.default.clone(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for LayerDesc {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = LayerDescRepr::deserialize(deserializer)?;
        let (data, values) = match repr.data {
            None => (None, repr.values),
            Some(DataRepr::Values(vals)) => (Some(DataType::String), Some(vals)),
            Some(DataRepr::Name(name)) => match name.to_ascii_lowercase().as_str() {
                "string" => (Some(DataType::String), repr.values),
                "link" => (Some(DataType::Link), repr.values),
                other => {
                    return Err(serde::de::Error::custom(format!(
                        "unknown data type: {other}"
                    )))
                }
            },
        };
        Ok(LayerDesc {
            layer_type: repr.layer_type,
            base: repr.base,
            data,
            values,
            link_target: repr.target,
            default: repr.default,
        }
        .normalized())
    }
}

/// Declaration-ordered registry of layer descriptors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    order: Vec<String>,
    descs: HashMap<String, LayerDesc>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of declared layers.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True when no layer is declared.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Declare a new layer.
    ///
    /// Fails with `Schema` when the id is already declared, when the base is
    /// unknown, or when the descriptor is inconsistent with its layer type.
    pub fn declare(&mut self, layer_id: impl Into<String>, desc: LayerDesc) -> TeangaResult<()> {
        let layer_id = layer_id.into();
        let desc = desc.normalized();
        self.check(&layer_id, &desc)?;
        tracing::debug!(layer = %layer_id, layer_type = %desc.layer_type, "declared layer");
        self.order.push(layer_id.clone());
        self.descs.insert(layer_id, desc);
        Ok(())
    }

    /// Validate a declaration without registering it.
    pub fn check(&self, layer_id: &str, desc: &LayerDesc) -> TeangaResult<()> {
        if layer_id.trim().is_empty() {
            return Err(TeangaError::schema("layer id is empty"));
        }
        if layer_id.starts_with('_') {
            return Err(TeangaError::schema(format!(
                "layer id {layer_id} must not start with '_'"
            )));
        }
        if self.descs.contains_key(layer_id) {
            return Err(TeangaError::schema(format!(
                "layer {layer_id} is already declared"
            )));
        }

        match (desc.layer_type, desc.base.as_deref()) {
            (LayerType::Characters, Some(base)) => {
                return Err(TeangaError::schema(format!(
                    "layer {layer_id} of type characters cannot be based on {base}"
                )))
            }
            (LayerType::Characters, None) => {
                if desc.data.is_some() || desc.values.is_some() {
                    return Err(TeangaError::schema(format!(
                        "characters layer {layer_id} cannot carry data"
                    )));
                }
            }
            (t, None) => {
                return Err(TeangaError::schema(format!(
                    "layer {layer_id} of type {t} must be based on another layer"
                )))
            }
            (_, Some(base)) => {
                if base == layer_id {
                    return Err(TeangaError::schema(format!(
                        "layer {layer_id} cannot be based on itself"
                    )));
                }
                if !self.descs.contains_key(base) {
                    return Err(TeangaError::schema(format!(
                        "layer {layer_id} is based on undeclared layer {base}"
                    )));
                }
            }
        }

        if let Some(values) = &desc.values {
            if values.is_empty() {
                return Err(TeangaError::schema(format!(
                    "layer {layer_id} declares an empty value set"
                )));
            }
            let mut seen = BTreeSet::new();
            for v in values {
                if !seen.insert(v.as_str()) {
                    return Err(TeangaError::schema(format!(
                        "layer {layer_id} declares value {v} twice"
                    )));
                }
            }
        }

        if let Some(target) = &desc.link_target {
            if desc.data != Some(DataType::Link) {
                return Err(TeangaError::schema(format!(
                    "layer {layer_id} has a link target but no link data"
                )));
            }
            if target != layer_id && !self.descs.contains_key(target) {
                return Err(TeangaError::schema(format!(
                    "layer {layer_id} links to undeclared layer {target}"
                )));
            }
        }

        if let Some(default) = &desc.default {
            Layer::from_compact(layer_id, desc, default).map_err(|e| {
                TeangaError::schema(format!("invalid default for layer {layer_id}: {e}"))
            })?;
        }

        Ok(())
    }

    /// True when the layer is declared.
    pub fn contains(&self, layer_id: &str) -> bool {
        self.descs.contains_key(layer_id)
    }

    /// Descriptor of a declared layer.
    pub fn get(&self, layer_id: &str) -> Option<&LayerDesc> {
        self.descs.get(layer_id)
    }

    /// Look up a descriptor, failing with `UnknownLayer`.
    pub fn desc(&self, layer_id: &str) -> TeangaResult<&LayerDesc> {
        self.descs
            .get(layer_id)
            .ok_or_else(|| TeangaError::unknown_layer(layer_id))
    }

    /// Layer ids in declaration order, a valid topological order.
    pub fn resolve_order(&self) -> &[String] {
        &self.order
    }

    /// Position of a layer in declaration order.
    pub fn position(&self, layer_id: &str) -> Option<usize> {
        self.order.iter().position(|l| l == layer_id)
    }

    /// Declared layers in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &LayerDesc)> + '_ {
        self.order
            .iter()
            .filter_map(move |id| self.descs.get(id).map(|d| (id.as_str(), d)))
    }

    /// Ids of all characters layers, in declaration order.
    pub fn characters_layers(&self) -> Vec<&str> {
        self.iter()
            .filter(|(_, d)| d.layer_type == LayerType::Characters)
            .map(|(id, _)| id)
            .collect()
    }

    /// The chain `layer_id, base, base of base, ..., root`.
    ///
    /// Fails with `Cycle` if the chain revisits a layer.
    pub fn base_chain<'a>(&'a self, layer_id: &'a str) -> TeangaResult<Vec<&'a str>> {
        let mut chain: Vec<&str> = Vec::new();
        let mut current = layer_id;
        loop {
            if chain.contains(&current) {
                let mut ids: Vec<String> = chain.iter().map(|s| s.to_string()).collect();
                ids.push(current.to_string());
                return Err(TeangaError::Cycle(ids));
            }
            chain.push(current);
            match self.desc(current)?.base.as_deref() {
                Some(base) => current = base,
                None => return Ok(chain),
            }
        }
    }

    /// The characters layer at the bottom of a layer's chain.
    pub fn root_of<'a>(&'a self, layer_id: &'a str) -> TeangaResult<&'a str> {
        let chain = self.base_chain(layer_id)?;
        // base_chain always holds at least `layer_id`
        Ok(chain[chain.len() - 1])
    }

    /// Layers directly based on `layer_id`, in declaration order.
    pub fn dependents(&self, layer_id: &str) -> Vec<&str> {
        self.iter()
            .filter(|(_, d)| d.base.as_deref() == Some(layer_id))
            .map(|(id, _)| id)
            .collect()
    }
}

impl Serialize for Schema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.order.len()))?;
        for (id, desc) in self.iter() {
            map.serialize_entry(id, desc)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Schema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SchemaVisitor;

        impl<'de> Visitor<'de> for SchemaVisitor {
            type Value = Schema;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping of layer ids to layer descriptions")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Schema, A::Error> {
                let mut schema = Schema::new();
                while let Some((id, desc)) = access.next_entry::<String, LayerDesc>()? {
                    schema
                        .declare(id, desc)
                        .map_err(serde::de::Error::custom)?;
                }
                Ok(schema)
            }
        }

        deserializer.deserialize_map(SchemaVisitor)
    }
}
