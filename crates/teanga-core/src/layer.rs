//! Layer variants and their compact encoding.
//!
//! Positions in every variant are relative to the layer's base, except for
//! standoff layers whose positions are always character offsets into the
//! root characters layer.
//!
//! Compact encodings (the form used in JSON/YAML files):
//!
//! | kind       | no data            | with data                        |
//! |------------|--------------------|----------------------------------|
//! | characters | `"text"`           | n/a                              |
//! | seq        | `["a", "b"]`       | `["a", 3, [3, "nsubj"]]`         |
//! | div        | `[0, 6]`           | `[[0, "a"], [6, 3, "nsubj"]]`    |
//! | element    | `[1, 4]`           | `[[1, "a"], [4, "b"]]`           |
//! | span       | `[[0, 4], [5, 7]]` | `[[0, 4, "a"], [5, 7, 2]]`       |
//! | standoff   | `[[0, 4]]`         | `[[0, 4, "PER"]]`                |

use serde_json::Value;

use crate::errors::{TeangaError, TeangaResult};
use crate::schema::{DataType, LayerDesc, LayerType};

/// The data value attached to one layer entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Data {
    String(String),
    Link(usize),
    TypedLink(usize, String),
}

impl Data {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::TypedLink(_, t) => Some(t),
            Self::Link(_) => None,
        }
    }

    pub fn link(&self) -> Option<usize> {
        match self {
            Self::Link(i) | Self::TypedLink(i, _) => Some(*i),
            Self::String(_) => None,
        }
    }

    fn flatten_into(&self, out: &mut Vec<Value>) {
        match self {
            Self::String(s) => out.push(Value::String(s.clone())),
            Self::Link(i) => out.push(Value::from(*i)),
            Self::TypedLink(i, t) => {
                out.push(Value::from(*i));
                out.push(Value::String(t.clone()));
            }
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Self::String(s) => Value::String(s.clone()),
            Self::Link(i) => Value::from(*i),
            Self::TypedLink(i, t) => Value::Array(vec![Value::from(*i), Value::String(t.clone())]),
        }
    }
}

impl From<&str> for Data {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

/// A single start position (div and element entries).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub start: usize,
    pub data: Option<Data>,
}

impl Anchor {
    pub fn new(start: usize) -> Self {
        Self { start, data: None }
    }

    pub fn with_data(start: usize, data: Data) -> Self {
        Self {
            start,
            data: Some(data),
        }
    }
}

/// A half-open `[start, end)` range (span and standoff entries).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub start: usize,
    pub end: usize,
    pub data: Option<Data>,
}

impl Region {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            data: None,
        }
    }

    pub fn with_data(start: usize, end: usize, data: Data) -> Self {
        Self {
            start,
            end,
            data: Some(data),
        }
    }
}

/// Raw positional data of one layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layer {
    Characters(String),
    Seq(Vec<Data>),
    Div(Vec<Anchor>),
    Element(Vec<Anchor>),
    Span(Vec<Region>),
    Standoff(Vec<Region>),
}

impl Layer {
    pub fn layer_type(&self) -> LayerType {
        match self {
            Self::Characters(_) => LayerType::Characters,
            Self::Seq(_) => LayerType::Seq,
            Self::Div(_) => LayerType::Div,
            Self::Element(_) => LayerType::Element,
            Self::Span(_) => LayerType::Span,
            Self::Standoff(_) => LayerType::Standoff,
        }
    }

    /// Number of entries; for characters layers, the number of characters.
    pub fn len(&self) -> usize {
        match self {
            Self::Characters(text) => text.chars().count(),
            Self::Seq(v) => v.len(),
            Self::Div(v) | Self::Element(v) => v.len(),
            Self::Span(v) | Self::Standoff(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The text of a characters layer.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Characters(text) => Some(text),
            _ => None,
        }
    }

    /// Per-entry data values (`None` where an entry carries no data).
    pub fn data(&self) -> Vec<Option<&Data>> {
        match self {
            Self::Characters(_) => vec![None; self.len()],
            Self::Seq(v) => v.iter().map(Some).collect(),
            Self::Div(v) | Self::Element(v) => v.iter().map(|a| a.data.as_ref()).collect(),
            Self::Span(v) | Self::Standoff(v) => v.iter().map(|r| r.data.as_ref()).collect(),
        }
    }

    /// Encode into the compact form.
    pub fn to_compact(&self) -> Value {
        match self {
            Self::Characters(text) => Value::String(text.clone()),
            Self::Seq(v) => Value::Array(v.iter().map(Data::to_value).collect()),
            Self::Div(v) | Self::Element(v) => Value::Array(
                v.iter()
                    .map(|a| match &a.data {
                        None => Value::from(a.start),
                        Some(d) => {
                            let mut out = vec![Value::from(a.start)];
                            d.flatten_into(&mut out);
                            Value::Array(out)
                        }
                    })
                    .collect(),
            ),
            Self::Span(v) | Self::Standoff(v) => Value::Array(
                v.iter()
                    .map(|r| {
                        let mut out = vec![Value::from(r.start), Value::from(r.end)];
                        if let Some(d) = &r.data {
                            d.flatten_into(&mut out);
                        }
                        Value::Array(out)
                    })
                    .collect(),
            ),
        }
    }

    /// Decode the compact form of a layer declared as `desc`.
    ///
    /// Checks structure and declared values; bounds against the base layer are
    /// checked by the document when the layer is added.
    pub fn from_compact(layer_id: &str, desc: &LayerDesc, value: &Value) -> TeangaResult<Layer> {
        let layer = match desc.layer_type {
            LayerType::Characters => match value {
                Value::String(s) => Layer::Characters(s.clone()),
                other => {
                    return Err(TeangaError::validation(format!(
                        "characters layer {layer_id} must be a string, got {}",
                        kind_of(other)
                    )))
                }
            },
            LayerType::Seq => {
                let items = as_array(layer_id, value)?;
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(decode_seq_value(layer_id, desc, item)?);
                }
                Layer::Seq(out)
            }
            LayerType::Div | LayerType::Element => {
                let items = as_array(layer_id, value)?;
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    let anchor = match item {
                        Value::Array(parts) if !parts.is_empty() => Anchor {
                            start: as_index(layer_id, &parts[0])?,
                            data: decode_data(layer_id, desc, &parts[1..])?,
                        },
                        Value::Number(_) => Anchor {
                            start: as_index(layer_id, item)?,
                            data: decode_data(layer_id, desc, &[])?,
                        },
                        other => {
                            return Err(TeangaError::validation(format!(
                                "bad {} entry in layer {layer_id}: {other}",
                                desc.layer_type
                            )))
                        }
                    };
                    out.push(anchor);
                }
                if desc.layer_type == LayerType::Div {
                    Layer::Div(out)
                } else {
                    Layer::Element(out)
                }
            }
            LayerType::Span | LayerType::Standoff => {
                let items = as_array(layer_id, value)?;
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    let region = match item {
                        Value::Array(parts) if parts.len() >= 2 => Region {
                            start: as_index(layer_id, &parts[0])?,
                            end: as_index(layer_id, &parts[1])?,
                            data: decode_data(layer_id, desc, &parts[2..])?,
                        },
                        other => {
                            return Err(TeangaError::validation(format!(
                                "bad {} entry in layer {layer_id}: {other}",
                                desc.layer_type
                            )))
                        }
                    };
                    out.push(region);
                }
                if desc.layer_type == LayerType::Span {
                    Layer::Span(out)
                } else {
                    Layer::Standoff(out)
                }
            }
        };
        layer.check_structure(layer_id, desc)?;
        Ok(layer)
    }

    /// Validate the parts of a layer that do not depend on other layers:
    /// kind matches the declaration, div starts strictly increase, ranges are
    /// ordered, data matches the declared data type and values.
    pub fn check_structure(&self, layer_id: &str, desc: &LayerDesc) -> TeangaResult<()> {
        if self.layer_type() != desc.layer_type {
            return Err(TeangaError::validation(format!(
                "layer {layer_id} is declared as {} but got {} data",
                desc.layer_type,
                self.layer_type()
            )));
        }

        match self {
            Self::Characters(_) => {}
            Self::Seq(v) => {
                for d in v {
                    check_seq_data(layer_id, desc, d)?;
                }
            }
            Self::Div(v) | Self::Element(v) => {
                for a in v {
                    check_entry_data(layer_id, desc, a.data.as_ref())?;
                }
                if let Self::Div(v) = self {
                    for w in v.windows(2) {
                        if w[0].start >= w[1].start {
                            return Err(TeangaError::validation(format!(
                                "div layer {layer_id} starts must strictly increase ({} then {})",
                                w[0].start, w[1].start
                            )));
                        }
                    }
                }
            }
            Self::Span(v) | Self::Standoff(v) => {
                for r in v {
                    if r.start > r.end {
                        return Err(TeangaError::validation(format!(
                            "layer {layer_id} has range with start {} after end {}",
                            r.start, r.end
                        )));
                    }
                    check_entry_data(layer_id, desc, r.data.as_ref())?;
                }
            }
        }
        Ok(())
    }
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

fn as_array<'a>(layer_id: &str, value: &'a Value) -> TeangaResult<&'a Vec<Value>> {
    value.as_array().ok_or_else(|| {
        TeangaError::validation(format!(
            "layer {layer_id} must be a list, got {}",
            kind_of(value)
        ))
    })
}

fn as_index(layer_id: &str, value: &Value) -> TeangaResult<usize> {
    value
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| {
            TeangaError::validation(format!(
                "layer {layer_id} expects a non-negative integer index, got {value}"
            ))
        })
}

fn decode_seq_value(layer_id: &str, desc: &LayerDesc, value: &Value) -> TeangaResult<Data> {
    match desc.data {
        None => match value {
            Value::String(s) => Ok(Data::String(s.clone())),
            other => Err(TeangaError::validation(format!(
                "seq layer {layer_id} without declared data expects strings, got {other}"
            ))),
        },
        Some(_) => {
            let parts = match value {
                Value::Array(parts) if desc.is_typed_link() => parts.as_slice(),
                other => std::slice::from_ref(other),
            };
            decode_data(layer_id, desc, parts)?.ok_or_else(|| {
                TeangaError::validation(format!("seq layer {layer_id} entry has no data"))
            })
        }
    }
}

fn decode_data(layer_id: &str, desc: &LayerDesc, parts: &[Value]) -> TeangaResult<Option<Data>> {
    let bad = |what: &str| {
        TeangaError::validation(format!(
            "layer {layer_id} expects {what} entry data, got {}",
            Value::Array(parts.to_vec())
        ))
    };
    match (desc.data, parts) {
        (None, []) => Ok(None),
        (None, _) => Err(TeangaError::validation(format!(
            "layer {layer_id} declares no data but an entry carries {}",
            Value::Array(parts.to_vec())
        ))),
        (Some(DataType::String), [Value::String(s)]) => Ok(Some(Data::String(s.clone()))),
        (Some(DataType::String), _) => Err(bad("string")),
        (Some(DataType::Link), [idx]) if !desc.is_typed_link() => {
            Ok(Some(Data::Link(as_index(layer_id, idx)?)))
        }
        (Some(DataType::Link), [idx, Value::String(t)]) if desc.is_typed_link() => {
            Ok(Some(Data::TypedLink(as_index(layer_id, idx)?, t.clone())))
        }
        (Some(DataType::Link), _) if desc.is_typed_link() => Err(bad("typed link")),
        (Some(DataType::Link), _) => Err(bad("link")),
    }
}

fn check_seq_data(layer_id: &str, desc: &LayerDesc, data: &Data) -> TeangaResult<()> {
    match (desc.data, data) {
        (None, Data::String(_)) => Ok(()),
        (None, other) => Err(TeangaError::validation(format!(
            "seq layer {layer_id} without declared data cannot hold {other:?}"
        ))),
        _ => check_entry_data(layer_id, desc, Some(data)),
    }
}

fn check_entry_data(layer_id: &str, desc: &LayerDesc, data: Option<&Data>) -> TeangaResult<()> {
    let allowed = |v: &str| desc.values.as_ref().map_or(true, |vals| vals.iter().any(|x| x == v));
    match (desc.data, data) {
        (None, None) => Ok(()),
        (None, Some(d)) => Err(TeangaError::validation(format!(
            "layer {layer_id} declares no data but an entry carries {d:?}"
        ))),
        (Some(t), None) => Err(TeangaError::validation(format!(
            "layer {layer_id} declares {} data but an entry has none",
            t.as_str()
        ))),
        (Some(DataType::String), Some(Data::String(s))) => {
            if allowed(s) {
                Ok(())
            } else {
                Err(TeangaError::validation(format!(
                    "value {s} is not allowed in layer {layer_id}"
                )))
            }
        }
        (Some(DataType::Link), Some(Data::Link(_))) if !desc.is_typed_link() => Ok(()),
        (Some(DataType::Link), Some(Data::TypedLink(_, t))) if desc.is_typed_link() => {
            if allowed(t) {
                Ok(())
            } else {
                Err(TeangaError::validation(format!(
                    "link type {t} is not allowed in layer {layer_id}"
                )))
            }
        }
        (Some(t), Some(d)) => Err(TeangaError::validation(format!(
            "layer {layer_id} declares {} data but an entry carries {d:?}",
            t.as_str()
        ))),
    }
}
