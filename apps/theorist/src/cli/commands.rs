//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::config::AppConfig;
use serde::Serialize;
use std::path::{Path, PathBuf};
use theorist_core::formats::{read_header, state_crypto_hash};
use theorist_core::primitives::MAX_STATE_PAYLOAD_SIZE;
use theorist_core::{
    Beam, DocTheory, RedbStateStore, Stage, StateKey, StateKind, StateStore, TheoristError,
    load_beam, load_document, save_beam, save_document,
};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of a state stream file: the payload limit plus header room.
const MAX_STATE_FILE_SIZE: u64 = MAX_STATE_PAYLOAD_SIZE as u64 + 64 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), TheoristError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| TheoristError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(TheoristError::SerializationError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Resolve an input path and make sure it names a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, TheoristError> {
    let canonical = path.canonicalize().map_err(|e| {
        TheoristError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(TheoristError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Resolve an output path through its (existing) parent directory.
fn validate_output_path(path: &Path) -> Result<PathBuf, TheoristError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        TheoristError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    let file_name = path.file_name().ok_or_else(|| {
        TheoristError::IoError(format!("Output path '{}' has no file name", path.display()))
    })?;

    Ok(canonical_parent.join(file_name))
}

/// Read a whole state stream file.
pub fn read_state_file(path: &Path) -> Result<Vec<u8>, TheoristError> {
    let validated = validate_file_path(path)?;
    validate_file_size(&validated, MAX_STATE_FILE_SIZE)?;
    std::fs::read(&validated).map_err(|e| {
        TheoristError::IoError(format!("Cannot read '{}': {}", path.display(), e))
    })
}

/// Build a store key from command-line parts.
pub fn parse_key(
    doc: String,
    stage: &str,
    sentence: Option<u32>,
) -> Result<StateKey, TheoristError> {
    if doc.is_empty() {
        return Err(TheoristError::InvalidConfig(
            "document id must not be empty".to_string(),
        ));
    }
    let stage: Stage = stage.parse()?;
    Ok(match sentence {
        Some(sentence) => StateKey::beam(doc, stage, sentence),
        None => StateKey::document(doc, stage),
    })
}

// =============================================================================
// STATE SUMMARY
// =============================================================================

/// What a loaded stream holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateSummary {
    pub kind: String,
    pub version: u8,
    pub payload_len: u64,
    pub checksum: u64,
    pub crypto_hash: String,
    pub doc_id: Option<String>,
    pub sentences: usize,
    pub theories: usize,
    pub subtheories: usize,
    pub committed: usize,
    pub layers: usize,
    pub best_scores: Vec<Option<String>>,
}

/// A decoded stream, kept for re-saving.
enum LoadedState {
    Beam(Beam),
    Document(DocTheory),
}

impl LoadedState {
    fn load(bytes: &[u8]) -> Result<Self, TheoristError> {
        let (header, _) = read_header(bytes)?;
        match header.kind {
            StateKind::Beam => load_beam(bytes).map(LoadedState::Beam),
            StateKind::Document => load_document(bytes).map(LoadedState::Document),
        }
    }

    fn save(&self) -> Result<Vec<u8>, TheoristError> {
        match self {
            LoadedState::Beam(beam) => save_beam(beam),
            LoadedState::Document(doc) => save_document(doc),
        }
    }

    fn beams(&self) -> &[Beam] {
        match self {
            LoadedState::Beam(beam) => std::slice::from_ref(beam),
            LoadedState::Document(doc) => doc.beams(),
        }
    }
}

/// Decode a stream and describe it.
pub fn summarize(bytes: &[u8]) -> Result<StateSummary, TheoristError> {
    let (header, _) = read_header(bytes)?;
    let loaded = LoadedState::load(bytes)?;
    let beams = loaded.beams();

    let (doc_id, committed, layers) = match &loaded {
        LoadedState::Beam(beam) => (
            beam.best_theory().map(|t| t.doc_id().to_string()),
            0,
            0,
        ),
        LoadedState::Document(doc) => (
            Some(doc.doc_id().to_string()),
            doc.committed().len(),
            doc.layers().count(),
        ),
    };

    Ok(StateSummary {
        kind: header.kind.to_string(),
        version: header.version,
        payload_len: header.payload_len,
        checksum: header.checksum,
        crypto_hash: state_crypto_hash(bytes),
        doc_id,
        sentences: beams.len(),
        theories: beams.iter().map(Beam::n_theories).sum(),
        subtheories: beams
            .iter()
            .map(|b| b.collect_unique_subtheories().len())
            .sum(),
        committed,
        layers,
        best_scores: beams
            .iter()
            .map(|b| b.best_theory().map(|t| t.score().to_string()))
            .collect(),
    })
}

/// Load a stream, check every theory's stage prefix and re-save it.
///
/// Returns the number of theories checked.
pub fn verify_stream(bytes: &[u8]) -> Result<usize, TheoristError> {
    let loaded = LoadedState::load(bytes)?;

    let mut checked = 0usize;
    for beam in loaded.beams() {
        for theory in beam {
            theory.verify_stage_prefix()?;
            checked += 1;
        }
    }

    let resaved = loaded.save()?;
    if resaved != bytes {
        return Err(TheoristError::StreamFormat(format!(
            "re-saved stream differs from input ({} vs {} bytes)",
            resaved.len(),
            bytes.len()
        )));
    }
    Ok(checked)
}

// =============================================================================
// INSPECTION COMMANDS
// =============================================================================

/// Summarize a state stream file.
pub fn cmd_inspect(file: &Path, json_mode: bool) -> Result<(), TheoristError> {
    let bytes = read_state_file(file)?;
    let summary = summarize(&bytes)?;

    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Theorist State Stream");
    println!("=====================");
    println!("File:          {}", file.display());
    println!("Kind:          {}", summary.kind);
    println!("Version:       {}", summary.version);
    println!("Payload:       {} bytes", summary.payload_len);
    println!("Checksum:      {:016x}", summary.checksum);
    println!("BLAKE3:        {}", summary.crypto_hash);
    if let Some(doc_id) = &summary.doc_id {
        println!("Document:      {}", doc_id);
    }
    println!("Sentences:     {}", summary.sentences);
    println!("Theories:      {}", summary.theories);
    println!("Subtheories:   {}", summary.subtheories);
    if summary.kind == StateKind::Document.to_string() {
        println!("Committed:     {}", summary.committed);
        println!("Layers:        {}", summary.layers);
    }
    for (index, score) in summary.best_scores.iter().enumerate() {
        match score {
            Some(score) => println!("  sentence {:>4}: best {}", index, score),
            None => println!("  sentence {:>4}: empty beam", index),
        }
    }
    Ok(())
}

/// Verify a state stream file.
pub fn cmd_verify(file: &Path, json_mode: bool) -> Result<(), TheoristError> {
    let bytes = read_state_file(file)?;
    let checked = verify_stream(&bytes)?;
    tracing::info!(file = %file.display(), theories = checked, "stream verified");

    if json_mode {
        let output = serde_json::json!({
            "file": file.display().to_string(),
            "valid": true,
            "theories_checked": checked,
            "crypto_hash": state_crypto_hash(&bytes),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
    } else {
        println!(
            "OK: {} ({} theories, re-save is bit-exact)",
            file.display(),
            checked
        );
    }
    Ok(())
}

/// Show the validated pipeline configuration.
pub fn cmd_config(config: &AppConfig, json_mode: bool) -> Result<(), TheoristError> {
    let pipeline = &config.pipeline;
    let range = pipeline.full_range()?;

    if json_mode {
        let output = serde_json::json!({
            "store": config.store.path.display().to_string(),
            "range": range.to_string(),
            "pipeline": pipeline,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Theorist Pipeline");
    println!("=================");
    println!("Store:          {}", config.store.path.display());
    println!("Range:          {}", range);
    println!("Primary parse:  {:?}", pipeline.primary_parse);
    if !pipeline.abort_documents.is_empty() {
        let at = pipeline
            .abort_at
            .map(|s| s.to_string())
            .unwrap_or_else(|| "first stage".to_string());
        println!(
            "Abort:          documents {:?} at {}",
            pipeline.abort_documents, at
        );
    }
    println!();
    println!("{:<18} {:>6}  {}", "STAGE", "WIDTH", "MODE");
    for stage in &pipeline.stages {
        println!(
            "{:<18} {:>6}  {:?}",
            stage.stage.name(),
            stage.beam_width,
            stage.mode
        );
    }
    Ok(())
}

// =============================================================================
// STORE COMMANDS
// =============================================================================

/// List checkpoints, optionally for one document.
pub fn cmd_store_list(
    state_path: &Path,
    doc: Option<&str>,
    json_mode: bool,
) -> Result<(), TheoristError> {
    let store = RedbStateStore::open(state_path)?;
    let keys: Vec<StateKey> = store
        .keys()?
        .into_iter()
        .filter(|k| doc.is_none_or(|d| k.doc_id == d))
        .collect();

    if json_mode {
        let entries: Vec<serde_json::Value> = keys
            .iter()
            .map(|k| {
                serde_json::json!({
                    "doc_id": k.doc_id,
                    "stage": k.stage,
                    "sentence": k.sentence,
                })
            })
            .collect();
        let output = serde_json::json!({ "checkpoints": entries, "count": keys.len() });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Theorist Checkpoints ({})", state_path.display());
    println!("====================");
    for key in &keys {
        println!("  {}", key);
    }
    println!("{} checkpoint(s)", keys.len());
    Ok(())
}

/// Validate a stream file against its key and store it.
pub fn cmd_store_put(
    state_path: &Path,
    key: &StateKey,
    file: &Path,
    json_mode: bool,
) -> Result<(), TheoristError> {
    let bytes = read_state_file(file)?;
    check_stream_matches_key(&bytes, key)?;

    let mut store = RedbStateStore::open(state_path)?;
    store.put(key, &bytes)?;
    tracing::info!(key = %key, bytes = bytes.len(), "checkpoint stored");

    if json_mode {
        let output = serde_json::json!({
            "success": true,
            "key": key.to_string(),
            "bytes": bytes.len(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
    } else {
        println!("Stored {} ({} bytes)", key, bytes.len());
    }
    Ok(())
}

/// A stream may only be stored under a key of the same shape.
pub fn check_stream_matches_key(bytes: &[u8], key: &StateKey) -> Result<(), TheoristError> {
    match (LoadedState::load(bytes)?, key.sentence) {
        (LoadedState::Beam(beam), Some(sentence)) => {
            if beam.sentence_index() != sentence as usize {
                return Err(TheoristError::InvalidConfig(format!(
                    "stream holds sentence {}, key names sentence {}",
                    beam.sentence_index(),
                    sentence
                )));
            }
        }
        (LoadedState::Document(doc), None) => {
            if doc.doc_id() != key.doc_id {
                return Err(TheoristError::InvalidConfig(format!(
                    "stream holds document {}, key names {}",
                    doc.doc_id(),
                    key.doc_id
                )));
            }
        }
        (LoadedState::Beam(_), None) => {
            return Err(TheoristError::InvalidConfig(
                "a beam stream needs a sentence index".to_string(),
            ));
        }
        (LoadedState::Document(_), Some(_)) => {
            return Err(TheoristError::InvalidConfig(
                "a document stream cannot take a sentence index".to_string(),
            ));
        }
    }
    Ok(())
}

/// Write a stored checkpoint to a file.
pub fn cmd_store_get(
    state_path: &Path,
    key: &StateKey,
    output: &Path,
    json_mode: bool,
) -> Result<(), TheoristError> {
    let store = RedbStateStore::open(state_path)?;
    let bytes = store
        .get(key)?
        .ok_or_else(|| TheoristError::IoError(format!("no checkpoint stored under {}", key)))?;

    let validated = validate_output_path(output)?;
    std::fs::write(&validated, &bytes).map_err(|e| {
        TheoristError::IoError(format!("Cannot write '{}': {}", output.display(), e))
    })?;

    if json_mode {
        let output = serde_json::json!({
            "success": true,
            "key": key.to_string(),
            "output": validated.display().to_string(),
            "bytes": bytes.len(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
    } else {
        println!(
            "Wrote {} to {} ({} bytes)",
            key,
            validated.display(),
            bytes.len()
        );
    }
    Ok(())
}

/// Delete a stored checkpoint and compact the database.
pub fn cmd_store_remove(
    state_path: &Path,
    key: &StateKey,
    json_mode: bool,
) -> Result<(), TheoristError> {
    let mut store = RedbStateStore::open(state_path)?;
    let removed = store.remove(key)?;
    if removed {
        store.compact()?;
    }

    if json_mode {
        let output = serde_json::json!({ "key": key.to_string(), "removed": removed });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
    } else if removed {
        println!("Removed {}", key);
    } else {
        println!("No checkpoint stored under {}", key);
    }
    Ok(())
}
