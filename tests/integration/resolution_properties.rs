//! Property tests for index resolution and validation.

use proptest::prelude::*;
use serde_json::{json, Value};

use teanga_core::prelude::*;

fn schema() -> Schema {
    let mut s = Schema::new();
    s.declare("text", LayerDesc::characters()).unwrap();
    s.declare("tokens", LayerDesc::new(LayerType::Span, "text")).unwrap();
    s.declare("chunks", LayerDesc::new(LayerType::Div, "tokens")).unwrap();
    s.declare("pos", LayerDesc::new(LayerType::Seq, "tokens")).unwrap();
    s
}

/// One token per character.
fn char_tokens(n: usize) -> Value {
    Value::Array((0..n).map(|i| json!([i, i + 1])).collect())
}

#[test]
fn hello_world() {
    let mut s = Schema::new();
    s.declare("text", LayerDesc::characters()).unwrap();
    s.declare("sentences", LayerDesc::new(LayerType::Div, "text")).unwrap();
    s.declare(
        "tags",
        LayerDesc::new(LayerType::Seq, "sentences").with_values(["greeting", "noun"]),
    )
    .unwrap();

    let mut doc = Document::new("hw");
    doc.add_layer(&s, "text", "hello world").unwrap();
    doc.add_layer(&s, "sentences", json!([0, 6])).unwrap();
    doc.add_layer(&s, "tags", json!(["greeting", "noun"])).unwrap();

    assert_eq!(&*doc.indexes(&s, "sentences").unwrap(), &[(0, 6), (6, 11)]);
    let (text, tag) = doc.text_data(&s, "tags").unwrap().remove(1);
    assert_eq!(text, "world");
    assert_eq!(tag, Some(Data::from("noun")));
}

#[test]
fn undeclared_base_is_a_schema_error() {
    let mut s = Schema::new();
    s.declare("text", LayerDesc::characters()).unwrap();
    let err = s.declare("pos", LayerDesc::new(LayerType::Seq, "tokens")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Schema);
}

proptest! {
    #[test]
    fn div_entries_run_to_next_start(
        text in "[a-z]{1,30}",
        picks in proptest::collection::btree_set(0usize..30, 1..6),
    ) {
        let s = schema();
        let n = text.chars().count();
        let starts: Vec<usize> = picks.into_iter().filter(|&p| p < n).collect();
        prop_assume!(!starts.is_empty());

        let mut doc = Document::new("d");
        doc.add_layer(&s, "text", text.as_str()).unwrap();
        doc.add_layer(&s, "tokens", char_tokens(n)).unwrap();
        doc.add_layer(&s, "chunks", json!(starts)).unwrap();

        let tokens = doc.indexes(&s, "tokens").unwrap();
        let chunks = doc.indexes(&s, "chunks").unwrap();
        prop_assert_eq!(chunks.len(), starts.len());
        for (k, &(start, end)) in chunks.iter().enumerate() {
            prop_assert_eq!(start, tokens[starts[k]].0);
            let expected_end = match starts.get(k + 1) {
                Some(&next) => tokens[next].0,
                None => n,
            };
            prop_assert_eq!(end, expected_end);
        }
    }

    #[test]
    fn spans_within_bounds_resolve(
        text in "[a-z ]{1,30}",
        a in 0usize..31,
        b in 0usize..31,
    ) {
        let s = schema();
        let n = text.chars().count();
        let (start, end) = (a.min(b).min(n), a.max(b).min(n));

        let mut doc = Document::new("d");
        doc.add_layer(&s, "text", text.as_str()).unwrap();
        doc.add_layer(&s, "tokens", json!([[start, end]])).unwrap();
        let expected: String = text.chars().skip(start).take(end - start).collect();
        prop_assert_eq!(doc.text_for_layer(&s, "tokens", 0).unwrap(), expected);
    }

    #[test]
    fn spans_past_bounds_fail_with_index(text in "[a-z]{1,30}", over in 1usize..10) {
        let s = schema();
        let n = text.chars().count();
        let mut doc = Document::new("d");
        doc.add_layer(&s, "text", text.as_str()).unwrap();
        let err = doc.add_layer(&s, "tokens", json!([[0, n + over]])).unwrap_err();
        prop_assert_eq!(err.kind(), ErrorKind::Index);
    }

    #[test]
    fn missing_base_is_always_target_missing(layer in prop::sample::select(vec!["tokens", "chunks", "pos"])) {
        let s = schema();
        let mut doc = Document::new("d");
        doc.add_layer(&s, "text", "abc").unwrap();
        if layer != "tokens" {
            let err = doc.add_layer(&s, layer, json!([])).unwrap_err();
            prop_assert_eq!(err.kind(), ErrorKind::TargetMissing);
        } else {
            let mut bare = Document::new("bare");
            let err = bare.add_layer(&s, layer, json!([])).unwrap_err();
            prop_assert_eq!(err.kind(), ErrorKind::TargetMissing);
        }
    }

    #[test]
    fn document_json_round_trip(text in "\\PC{0,40}", cut in 0usize..41) {
        let s = schema();
        let n = text.chars().count();
        let cut = cut.min(n);
        let mut doc = Document::new("d");
        doc.add_layer(&s, "text", text.as_str()).unwrap();
        doc.add_layer(&s, "tokens", json!([[0, cut], [cut, n]])).unwrap();
        doc.add_layer(&s, "pos", json!(["A", "B"])).unwrap();

        let back = Document::from_json_str(&s, "d", &doc.to_json_string().unwrap()).unwrap();
        prop_assert_eq!(&back, &doc);
        prop_assert_eq!(back.text(&s, "pos").unwrap(), doc.text(&s, "pos").unwrap());
    }
}
