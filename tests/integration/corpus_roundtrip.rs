//! Corpus serialization round-trips through JSON and YAML files.

use serde_json::json;

use teanga_core::prelude::*;

fn annotated() -> Corpus {
    let mut c = Corpus::new();
    c.add_layer_meta("text", LayerDesc::characters()).unwrap();
    c.add_layer_meta("words", LayerDesc::new(LayerType::Span, "text")).unwrap();
    c.add_layer_meta("sentences", LayerDesc::new(LayerType::Div, "words")).unwrap();
    c.add_layer_meta(
        "upos",
        LayerDesc::new(LayerType::Seq, "words").with_values(["PROPN", "VERB", "ADP", "PUNCT"]),
    )
    .unwrap();
    c.add_layer_meta(
        "deps",
        LayerDesc::new(LayerType::Seq, "words")
            .with_data(DataType::Link)
            .with_values(["root", "nsubj", "obl", "case", "punct"]),
    )
    .unwrap();
    c.add_layer_meta(
        "entities",
        LayerDesc::new(LayerType::Standoff, "text").with_values(["LOC", "PER"]),
    )
    .unwrap();

    c.add_doc(
        NewDocument::from("Seán lives in Gaillimh. Máire too.")
            .layer(
                "words",
                json!([[0, 4], [5, 10], [11, 13], [14, 22], [22, 23], [24, 29], [30, 33], [33, 34]]),
            )
            .layer("sentences", json!([0, 5]))
            .layer(
                "upos",
                json!(["PROPN", "VERB", "ADP", "PROPN", "PUNCT", "PROPN", "ADP", "PUNCT"]),
            )
            .layer(
                "deps",
                json!([[1, "nsubj"], [1, "root"], [3, "case"], [1, "obl"], [1, "punct"],
                       [5, "root"], [5, "obl"], [5, "punct"]]),
            )
            .layer("entities", json!([[0, 4, "PER"], [14, 22, "LOC"], [24, 29, "PER"]])),
    )
    .unwrap();
    c.add_doc(NewDocument::from("Dia duit").id("greeting")).unwrap();
    c
}

#[test]
fn resolution_on_the_annotated_document() {
    let c = annotated();
    let id = &c.get_doc_ids()[0];
    let doc = c.get_doc_by_id(id).unwrap();
    let s = c.schema();

    assert_eq!(
        doc.text(s, "sentences").unwrap(),
        vec!["Seán lives in Gaillimh. ", "Máire too."]
    );
    assert_eq!(&*doc.indexes_on(s, "sentences", "words").unwrap(), &[(0, 5), (5, 8)]);
    assert_eq!(doc.text(s, "entities").unwrap(), vec!["Seán", "Gaillimh", "Máire"]);
    assert_eq!(doc.text_for_layer(s, "upos", 3).unwrap(), "Gaillimh");
}

#[test]
fn json_file_round_trip() {
    let c = annotated();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corpus.json");

    c.write_json(std::fs::File::create(&path).unwrap()).unwrap();
    let back = Corpus::read_json(std::fs::File::open(&path).unwrap()).unwrap();

    assert_eq!(back, c);
    assert_eq!(back.get_doc_ids(), c.get_doc_ids());
    assert_eq!(back.schema().resolve_order(), c.schema().resolve_order());
}

#[test]
fn yaml_file_round_trip() {
    let c = annotated();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corpus.yaml");

    c.write_yaml(std::fs::File::create(&path).unwrap()).unwrap();
    let back = Corpus::read_yaml(std::fs::File::open(&path).unwrap()).unwrap();
    assert_eq!(back, c);
}

#[test]
fn document_only_serialization() {
    let c = annotated();
    let doc = c.get_doc_by_id("greeting").unwrap();
    let j = doc.to_json();
    assert_eq!(j, json!({"text": "Dia duit"}));
    let back = Document::from_json(c.schema(), "greeting", &j).unwrap();
    assert_eq!(&back, doc);
}

#[test]
fn reading_then_annotating_keeps_validation() {
    let c = annotated();
    let mut back = Corpus::from_json_str(&c.to_json_string().unwrap()).unwrap();
    let err = back
        .add_layer("greeting", "words", json!([[0, 3], [4, 20]]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Index);
    back.add_layer("greeting", "words", json!([[0, 3], [4, 8]])).unwrap();
    assert_eq!(
        back.get_doc_by_id("greeting").unwrap().text(back.schema(), "words").unwrap(),
        vec!["Dia", "duit"]
    );
}
