//! Integration tests for the CLI commands that work on state streams and
//! the checkpoint store.

#![allow(clippy::unwrap_used, clippy::panic)]

use std::rc::Rc;
use tempfile::TempDir;
use theorist::cli::{
    check_stream_matches_key, cmd_inspect, cmd_store_get, cmd_store_list, cmd_store_put,
    cmd_store_remove, cmd_verify, parse_key, read_state_file, summarize, verify_stream,
};
use theorist_core::subtheory::TokenSequence;
use theorist_core::{
    Beam, DocTheory, Document, RedbStateStore, Score, Stage, StateKey, StateStore, Subtheory,
    SubtheoryType, Theory, TheoristError, save_beam, save_document,
};

fn tokens_theory(doc_id: &str, sentence: u32, units: i64) -> Theory {
    let words = TokenSequence::from_words(sentence, &["Paris", "voted"]);
    let tokens = Rc::new(Subtheory::Tokens(words.with_score(Score::from_units(units))));
    let mut theory = Theory::new(doc_id);
    theory
        .adopt_subtheory(SubtheoryType::Tokens, tokens)
        .unwrap();
    theory
}

fn beam_stream(doc_id: &str, sentence: u32) -> Vec<u8> {
    let mut beam = Beam::new(sentence as usize, 4);
    beam.add_theory(tokens_theory(doc_id, sentence, 1));
    beam.add_theory(tokens_theory(doc_id, sentence, 3));
    save_beam(&beam).unwrap()
}

fn document_stream(doc_id: &str) -> Vec<u8> {
    let mut doc = DocTheory::from_document(Document::new(
        doc_id,
        "newswire",
        "Paris voted yesterday. Rome agreed.",
    ));
    for index in 0..doc.n_sentences() {
        let beam = Beam::with_theory(index, 2, tokens_theory(doc_id, index as u32, 2));
        doc.install_beam(index, beam).unwrap();
    }
    doc.commit_sentence(0).unwrap();
    save_document(&doc).unwrap()
}

fn write(dir: &TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

// =============================================================================
// INSPECTION
// =============================================================================

#[test]
fn beam_summary_reports_best_score_first() {
    let summary = summarize(&beam_stream("doc-1", 0)).unwrap();

    assert_eq!(summary.kind, "beam");
    assert_eq!(summary.doc_id.as_deref(), Some("doc-1"));
    assert_eq!(summary.sentences, 1);
    assert_eq!(summary.theories, 2);
    assert_eq!(summary.subtheories, 2);
    assert_eq!(summary.best_scores, vec![Some("3.000000".to_string())]);
    assert_eq!(summary.crypto_hash.len(), 64);
}

#[test]
fn document_summary_counts_committed_sentences() {
    let summary = summarize(&document_stream("doc-2")).unwrap();

    assert_eq!(summary.kind, "document");
    assert_eq!(summary.sentences, 2);
    assert_eq!(summary.theories, 2);
    assert_eq!(summary.committed, 1);
    assert_eq!(summary.layers, 0);
}

#[test]
fn verify_accepts_saved_streams() {
    assert_eq!(verify_stream(&beam_stream("doc-1", 0)).unwrap(), 2);
    assert_eq!(verify_stream(&document_stream("doc-2")).unwrap(), 2);
}

#[test]
fn verify_rejects_corruption() {
    let mut bytes = beam_stream("doc-1", 0);
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;

    assert!(matches!(
        verify_stream(&bytes),
        Err(TheoristError::StreamFormat(_))
    ));
}

#[test]
fn inspect_and_verify_read_files() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "doc.state", &document_stream("doc-3"));

    assert_eq!(read_state_file(&path).unwrap().len(), document_stream("doc-3").len());
    cmd_inspect(&path, true).unwrap();
    cmd_inspect(&path, false).unwrap();
    cmd_verify(&path, true).unwrap();
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent.state");

    assert!(matches!(
        read_state_file(&missing),
        Err(TheoristError::IoError(_))
    ));
    assert!(matches!(
        read_state_file(dir.path()),
        Err(TheoristError::IoError(_))
    ));
}

// =============================================================================
// KEYS
// =============================================================================

#[test]
fn keys_parse_stage_names() {
    assert_eq!(
        parse_key("doc".to_string(), "np-chunk", Some(2)).unwrap(),
        StateKey::beam("doc", Stage::NpChunk, 2)
    );
    assert_eq!(
        parse_key("doc".to_string(), "parse", None).unwrap(),
        StateKey::document("doc", Stage::Parse)
    );
    assert!(parse_key("doc".to_string(), "parsing", None).is_err());
    assert!(parse_key(String::new(), "parse", None).is_err());
}

#[test]
fn stream_shape_must_match_key() {
    let beam = beam_stream("doc-1", 1);
    let document = document_stream("doc-1");

    assert!(check_stream_matches_key(&beam, &StateKey::beam("doc-1", Stage::Tokens, 1)).is_ok());
    assert!(check_stream_matches_key(&beam, &StateKey::beam("doc-1", Stage::Tokens, 0)).is_err());
    assert!(check_stream_matches_key(&beam, &StateKey::document("doc-1", Stage::Tokens)).is_err());

    assert!(
        check_stream_matches_key(&document, &StateKey::document("doc-1", Stage::Tokens)).is_ok()
    );
    assert!(
        check_stream_matches_key(&document, &StateKey::document("doc-9", Stage::Tokens)).is_err()
    );
    assert!(
        check_stream_matches_key(&document, &StateKey::beam("doc-1", Stage::Tokens, 0)).is_err()
    );
}

// =============================================================================
// STORE
// =============================================================================

#[test]
fn store_put_get_remove_round_trip() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("state.db");
    let bytes = beam_stream("doc-4", 0);
    let input = write(&dir, "in.state", &bytes);
    let output = dir.path().join("out.state");
    let key = StateKey::beam("doc-4", Stage::Tokens, 0);

    cmd_store_put(&db, &key, &input, false).unwrap();
    cmd_store_list(&db, Some("doc-4"), true).unwrap();
    cmd_store_get(&db, &key, &output, false).unwrap();
    assert_eq!(std::fs::read(&output).unwrap(), bytes);

    cmd_store_remove(&db, &key, true).unwrap();
    let store = RedbStateStore::open(&db).unwrap();
    assert!(store.get(&key).unwrap().is_none());
    assert!(store.is_empty().unwrap());
}

#[test]
fn store_put_refuses_mismatched_key() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("state.db");
    let input = write(&dir, "in.state", &beam_stream("doc-5", 0));

    let wrong = StateKey::document("doc-5", Stage::Tokens);
    assert!(cmd_store_put(&db, &wrong, &input, false).is_err());

    let store = RedbStateStore::open(&db).unwrap();
    assert!(store.keys().unwrap().is_empty());
}

#[test]
fn store_get_of_unknown_key_fails() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("state.db");
    let key = StateKey::document("nobody", Stage::Parse);

    let err = cmd_store_get(&db, &key, &dir.path().join("out.state"), false).unwrap_err();
    assert!(matches!(err, TheoristError::IoError(_)));
}
