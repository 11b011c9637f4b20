//! End-to-end service application through the registry.
//!
//! Builds a small pipeline out of in-process services (tokenizer, tagger,
//! sentence splitter) and checks that:
//! - produced layers are declared on first use and reused afterwards
//! - a document lacking a required layer is reported and left unchanged
//! - the failure policy decides between aborting and collecting failures

use assert_matches::assert_matches;
use serde_json::{json, Value};

use teanga_core::prelude::*;
use teanga_services::{FnService, ServiceError, ServiceRegistry, ServiceSpec};

/// Route library logs to the test output; `RUST_LOG` selects the level.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn tokenizer() -> FnService {
    FnService::new("whitespace", |_schema, doc| {
        let text = doc.get_layer("text")?.text().unwrap_or_default();
        let mut spans = Vec::new();
        let mut start = None;
        for (i, c) in text.chars().chain(std::iter::once(' ')).enumerate() {
            match (c.is_whitespace(), start) {
                (false, None) => start = Some(i),
                (true, Some(s)) => {
                    spans.push(json!([s, i]));
                    start = None;
                }
                _ => {}
            }
        }
        Ok(vec![("words".to_string(), Value::Array(spans).into())])
    })
    .require("text")
    .produce("words", LayerDesc::new(LayerType::Span, "text"))
}

fn capital_tagger() -> FnService {
    FnService::new("capitals", |schema, doc| {
        let tags: Vec<Value> = doc
            .text(schema, "words")?
            .iter()
            .map(|w| {
                if w.chars().next().is_some_and(char::is_uppercase) {
                    json!("CAP")
                } else {
                    json!("LOW")
                }
            })
            .collect();
        Ok(vec![("case".to_string(), Value::Array(tags).into())])
    })
    .require("words")
    .produce(
        "case",
        LayerDesc::new(LayerType::Seq, "words").with_values(["CAP", "LOW"]),
    )
}

fn failing_on(marker: &'static str) -> FnService {
    FnService::new("picky", move |_schema, doc| {
        let text = doc.get_layer("text")?.text().unwrap_or_default();
        if text.contains(marker) {
            anyhow::bail!("refusing {marker}");
        }
        Ok(vec![("sentences".to_string(), json!([0]).into())])
    })
    .require("text")
    .produce("sentences", LayerDesc::new(LayerType::Div, "text"))
}

fn registry() -> ServiceRegistry {
    let mut reg = ServiceRegistry::new();
    reg.register(ServiceSpec::new("tok.ws", "Whitespace tokenizer", "0.1.0"), Box::new(tokenizer()))
        .unwrap();
    reg.register(ServiceSpec::new("tag.case", "Case tagger", "0.1.0"), Box::new(capital_tagger()))
        .unwrap();
    reg
}

fn corpus() -> Corpus {
    init_tracing();
    let mut c = Corpus::new();
    c.add_layer_meta("text", LayerDesc::characters()).unwrap();
    c
}

#[test]
fn pipeline_of_services() {
    let mut c = corpus();
    let a = c.add_doc("Dublin is in Ireland").unwrap();
    let b = c.add_doc("it rains").unwrap();

    let mut reg = registry();
    assert!(reg.apply(&mut c, "tok.ws").unwrap().is_success());
    assert!(reg.apply(&mut c, "tag.case").unwrap().is_success());

    assert_eq!(c.schema().resolve_order(), &["text", "words", "case"]);
    let doc = c.get_doc_by_id(&a).unwrap();
    let pairs = doc.text_data(c.schema(), "case").unwrap();
    assert_eq!(pairs[0], ("Dublin".to_string(), Some(Data::from("CAP"))));
    assert_eq!(pairs[1], ("is".to_string(), Some(Data::from("LOW"))));
    assert_eq!(
        &*c.get_doc_by_id(&b).unwrap().indexes(c.schema(), "words").unwrap(),
        &[(0, 2), (3, 8)]
    );
}

#[test]
fn missing_requirement_is_a_contract_error_and_document_is_untouched() {
    let mut c = corpus();
    let id = c.add_doc("no words yet").unwrap();
    let before = c.get_doc_by_id(&id).unwrap().clone();

    let mut reg = registry();
    // the tagger needs words, which the tokenizer has not produced
    c.add_layer_meta("words", LayerDesc::new(LayerType::Span, "text")).unwrap();
    let err = reg.apply(&mut c, "tag.case").unwrap_err();
    assert_matches!(
        err,
        ServiceError::Corpus(ref e) if e.kind() == ErrorKind::ServiceContract
    );
    assert_eq!(c.get_doc_by_id(&id).unwrap(), &before);
}

#[test]
fn requiring_an_undeclared_layer_is_a_contract_error() {
    let mut c = corpus();
    c.add_doc("x").unwrap();
    let mut reg = registry();
    let err = reg.apply(&mut c, "tag.case").unwrap_err();
    assert_matches!(
        err,
        ServiceError::Corpus(ref e) if e.kind() == ErrorKind::ServiceContract
    );
}

#[test]
fn continue_policy_collects_failures() {
    init_tracing();
    let mut cfg = CorpusConfig::default();
    cfg.services.failure_policy = FailurePolicy::Continue;
    let mut c = Corpus::with_config(cfg).unwrap();
    c.add_layer_meta("text", LayerDesc::characters()).unwrap();
    c.add_doc(NewDocument::from("fine").id("ok1")).unwrap();
    c.add_doc(NewDocument::from("bad apple").id("bad")).unwrap();
    c.add_doc(NewDocument::from("also fine").id("ok2")).unwrap();

    let mut reg = ServiceRegistry::new();
    reg.register(ServiceSpec::new("split", "Splitter", "1"), Box::new(failing_on("bad")))
        .unwrap();
    let report = reg.apply(&mut c, "split").unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].doc, "bad");
    assert_matches!(
        report.failures[0].error,
        TeangaError::ServiceExecution { ref service, .. } if service == "picky"
    );
    assert!(c.get_doc_by_id("ok2").unwrap().has_layer("sentences"));
    assert!(!c.get_doc_by_id("bad").unwrap().has_layer("sentences"));
}

#[test]
fn abort_policy_stops_at_first_failure() {
    let mut c = corpus();
    c.add_doc(NewDocument::from("bad start").id("first")).unwrap();
    c.add_doc(NewDocument::from("never reached").id("second")).unwrap();

    let mut reg = ServiceRegistry::new();
    reg.register(ServiceSpec::new("split", "Splitter", "1"), Box::new(failing_on("bad")))
        .unwrap();
    let err = reg.apply_with(&mut c, "split", FailurePolicy::Abort).unwrap_err();
    assert_matches!(
        err,
        ServiceError::Corpus(TeangaError::ServiceExecution { ref doc, .. }) if doc == "first"
    );
    assert!(!c.get_doc_by_id("second").unwrap().has_layer("sentences"));
}

#[test]
fn service_output_goes_through_validation() {
    let bad = FnService::new("overshoot", |_schema, _doc| {
        Ok(vec![("words".to_string(), json!([[0, 999]]).into())])
    })
    .require("text")
    .produce("words", LayerDesc::new(LayerType::Span, "text"));

    let mut c = corpus();
    let id = c.add_doc("short").unwrap();
    let mut reg = ServiceRegistry::new();
    reg.register(ServiceSpec::new("over", "Overshoot", "1"), Box::new(bad)).unwrap();
    let err = reg.apply(&mut c, "over").unwrap_err();
    assert_matches!(err, ServiceError::Corpus(ref e) if e.kind() == ErrorKind::Index);
    assert!(!c.get_doc_by_id(&id).unwrap().has_layer("words"));
}
