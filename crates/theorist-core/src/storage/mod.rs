//! # State Store
//!
//! Keyed storage of state streams for resumable, multi-run pipelines.
//!
//! A run can checkpoint every sentence beam as of a stage, stop, and a later
//! run can restore those beams and continue from the next stage. Two
//! backends are provided:
//! - [`MemoryStateStore`]: `BTreeMap`, volatile
//! - [`RedbStateStore`]: redb database on disk (ACID)

mod redb_store;

pub use redb_store::RedbStateStore;

use crate::document::DocTheory;
use crate::formats::{load_beam, load_document, save_beam, save_document};
use crate::system::Stage;
use crate::TheoristError;
use std::collections::BTreeMap;

// =============================================================================
// STATE KEY
// =============================================================================

/// Address of one stored stream.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateKey {
    pub doc_id: String,
    /// Stage whose output the stream holds.
    pub stage: Stage,
    /// Sentence beam, or `None` for a whole document.
    pub sentence: Option<u32>,
}

impl StateKey {
    /// Key of one sentence beam.
    #[must_use]
    pub fn beam(doc_id: impl Into<String>, stage: Stage, sentence: u32) -> Self {
        Self {
            doc_id: doc_id.into(),
            stage,
            sentence: Some(sentence),
        }
    }

    /// Key of a whole document.
    #[must_use]
    pub fn document(doc_id: impl Into<String>, stage: Stage) -> Self {
        Self {
            doc_id: doc_id.into(),
            stage,
            sentence: None,
        }
    }
}

impl std::fmt::Display for StateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.sentence {
            Some(sentence) => write!(f, "{}/{}/{}", self.doc_id, self.stage, sentence),
            None => write!(f, "{}/{}/document", self.doc_id, self.stage),
        }
    }
}

// =============================================================================
// STORE TRAIT
// =============================================================================

/// Byte storage keyed by [`StateKey`].
///
/// All fallible operations return `Result<T, TheoristError>` so in-memory
/// and persistent backends are used uniformly.
pub trait StateStore {
    /// Store a stream, replacing any previous one.
    fn put(&mut self, key: &StateKey, bytes: &[u8]) -> Result<(), TheoristError>;

    /// Fetch a stream.
    fn get(&self, key: &StateKey) -> Result<Option<Vec<u8>>, TheoristError>;

    /// Delete a stream. Returns whether it existed.
    fn remove(&mut self, key: &StateKey) -> Result<bool, TheoristError>;

    /// Every stored key, in order.
    fn keys(&self) -> Result<Vec<StateKey>, TheoristError>;
}

/// Volatile store backed by a `BTreeMap`.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    entries: BTreeMap<StateKey, Vec<u8>>,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl StateStore for MemoryStateStore {
    fn put(&mut self, key: &StateKey, bytes: &[u8]) -> Result<(), TheoristError> {
        self.entries.insert(key.clone(), bytes.to_vec());
        Ok(())
    }

    fn get(&self, key: &StateKey) -> Result<Option<Vec<u8>>, TheoristError> {
        Ok(self.entries.get(key).cloned())
    }

    fn remove(&mut self, key: &StateKey) -> Result<bool, TheoristError> {
        Ok(self.entries.remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<StateKey>, TheoristError> {
        Ok(self.entries.keys().cloned().collect())
    }
}

// =============================================================================
// CHECKPOINTS
// =============================================================================

/// Save every sentence beam of `doc` as the output of `stage`.
///
/// Returns the number of beams written.
pub fn checkpoint_beams(
    store: &mut dyn StateStore,
    doc: &DocTheory,
    stage: Stage,
) -> Result<usize, TheoristError> {
    for beam in doc.beams() {
        let sentence = u32::try_from(beam.sentence_index())
            .map_err(|_| TheoristError::SentenceOutOfRange(beam.sentence_index()))?;
        let key = StateKey::beam(doc.doc_id(), stage, sentence);
        store.put(&key, &save_beam(beam)?)?;
    }
    tracing::debug!(doc_id = doc.doc_id(), %stage, beams = doc.n_sentences(), "beams checkpointed");
    Ok(doc.n_sentences())
}

/// Install the beams checkpointed as the output of `stage` into `doc`.
///
/// Every sentence must have a checkpoint.
pub fn restore_beams(
    store: &dyn StateStore,
    doc: &mut DocTheory,
    stage: Stage,
) -> Result<usize, TheoristError> {
    let doc_id = doc.doc_id().to_string();
    for index in 0..doc.n_sentences() {
        let sentence =
            u32::try_from(index).map_err(|_| TheoristError::SentenceOutOfRange(index))?;
        let key = StateKey::beam(doc_id.as_str(), stage, sentence);
        let bytes = store
            .get(&key)?
            .ok_or_else(|| TheoristError::IoError(format!("no checkpoint stored under {}", key)))?;
        doc.install_beam(index, load_beam(&bytes)?)?;
    }
    tracing::debug!(doc_id = %doc_id, %stage, beams = doc.n_sentences(), "beams restored");
    Ok(doc.n_sentences())
}

/// Save a whole document as of `stage`.
pub fn checkpoint_document(
    store: &mut dyn StateStore,
    doc: &DocTheory,
    stage: Stage,
) -> Result<(), TheoristError> {
    store.put(
        &StateKey::document(doc.doc_id(), stage),
        &save_document(doc)?,
    )
}

/// Load a whole document saved as of `stage`, if present.
pub fn restore_document(
    store: &dyn StateStore,
    doc_id: &str,
    stage: Stage,
) -> Result<Option<DocTheory>, TheoristError> {
    store
        .get(&StateKey::document(doc_id, stage))?
        .map(|bytes| load_document(&bytes))
        .transpose()
}

// =============================================================================
// TESTS
// =============================================================================
