//! JSON and YAML encoding of corpora.
//!
//! Serialized shape:
//!
//! ```yaml
//! _meta:
//!   text:
//!     type: characters
//!   words:
//!     type: span
//!     base: text
//! _order: [Kjco]
//! Kjco:
//!   text: This is a document.
//!   words: [[0, 4], [5, 7], [8, 9], [10, 18], [18, 19]]
//! ```
//!
//! Ordering rules:
//! - `_meta` lists layers in declaration order; reading declares them in file
//!   order, so a file whose layers are out of dependency order is rejected
//! - `_order` lists document ids in insertion order; when it is absent,
//!   documents are taken in file order
//! - inside a document, layers are written in declaration order
//!
//! Only raw positions are written. Resolved indexes are recomputed on demand
//! after reading.
//!
//! I/O rules: callers hand in readers and writers; this module never opens
//! files itself.

use std::collections::HashSet;
use std::fmt;
use std::io::{Read, Write};

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::corpus::Corpus;
use crate::document::Document;
use crate::errors::{TeangaError, TeangaResult};
use crate::keys::{META as META_KEY, ORDER as ORDER_KEY};
use crate::schema::Schema;

/// A document's layers in declaration order.
struct OrderedLayers<'a> {
    schema: &'a Schema,
    doc: &'a Document,
}

impl Serialize for OrderedLayers<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for layer_id in self.schema.resolve_order() {
            if let Ok(layer) = self.doc.get_layer(layer_id) {
                map.serialize_entry(layer_id, &layer.to_compact())?;
            }
        }
        map.end()
    }
}

impl Serialize for Corpus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len() + 2))?;
        map.serialize_entry(META_KEY, self.schema())?;
        map.serialize_entry(ORDER_KEY, self.get_doc_ids())?;
        for doc in self.get_docs() {
            map.serialize_entry(
                doc.id(),
                &OrderedLayers {
                    schema: self.schema(),
                    doc,
                },
            )?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Corpus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CorpusVisitor;

        impl<'de> Visitor<'de> for CorpusVisitor {
            type Value = Corpus;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a corpus mapping with _meta, _order and one entry per document")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Corpus, A::Error> {
                let mut schema = None;
                let mut order: Option<Vec<String>> = None;
                let mut raw = Vec::new();
                while let Some(key) = access.next_key::<String>()? {
                    match key.as_str() {
                        META_KEY => schema = Some(access.next_value::<Schema>()?),
                        ORDER_KEY => order = Some(access.next_value()?),
                        _ => raw.push((key, access.next_value::<Value>()?)),
                    }
                }
                assemble(schema.unwrap_or_default(), order, raw).map_err(serde::de::Error::custom)
            }
        }

        deserializer.deserialize_map(CorpusVisitor)
    }
}

/// Build a corpus from a schema and raw documents, validating every document.
fn assemble(schema: Schema, order: Option<Vec<String>>, raw: Vec<(String, Value)>) -> TeangaResult<Corpus> {
    let mut corpus = Corpus::new();
    corpus.replace_schema(schema);

    let ids: Vec<String> = match order {
        None => raw.iter().map(|(id, _)| id.clone()).collect(),
        Some(order) => {
            let listed: HashSet<&str> = order.iter().map(String::as_str).collect();
            let mut ids = order.clone();
            for (id, _) in &raw {
                if !listed.contains(id.as_str()) {
                    tracing::warn!(doc = %id, "document missing from _order, appending");
                    ids.push(id.clone());
                }
            }
            ids
        }
    };

    let mut raw: Vec<Option<(String, Value)>> = raw.into_iter().map(Some).collect();
    for id in ids {
        let (doc_id, value) = raw
            .iter_mut()
            .find(|slot| matches!(slot, Some((d, _)) if *d == id))
            .and_then(Option::take)
            .ok_or_else(|| {
                TeangaError::serialization(format!("_order lists document {id} which is not in the file"))
            })?;
        let doc = Document::from_json(corpus.schema(), doc_id, &value)?;
        corpus.insert_loaded(doc)?;
    }
    tracing::debug!(docs = corpus.len(), layers = corpus.schema().len(), "read corpus");
    Ok(corpus)
}

impl Corpus {
    /// The corpus as a JSON value (key order preserved).
    pub fn to_json(&self) -> TeangaResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_json(value: Value) -> TeangaResult<Corpus> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_json_string(&self) -> TeangaResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json_str(s: &str) -> TeangaResult<Corpus> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn write_json<W: Write>(&self, writer: W) -> TeangaResult<()> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn read_json<R: Read>(reader: R) -> TeangaResult<Corpus> {
        Ok(serde_json::from_reader(reader)?)
    }

    #[cfg(feature = "yaml")]
    pub fn to_yaml_string(&self) -> TeangaResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    #[cfg(feature = "yaml")]
    pub fn from_yaml_str(s: &str) -> TeangaResult<Corpus> {
        Ok(serde_yaml::from_str(s)?)
    }

    #[cfg(feature = "yaml")]
    pub fn write_yaml<W: Write>(&self, writer: W) -> TeangaResult<()> {
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    #[cfg(feature = "yaml")]
    pub fn read_yaml<R: Read>(reader: R) -> TeangaResult<Corpus> {
        Ok(serde_yaml::from_reader(reader)?)
    }
}
