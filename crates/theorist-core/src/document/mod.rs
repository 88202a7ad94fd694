//! # Document Aggregation
//!
//! A [`DocTheory`] owns the sentences of one document, one beam per
//! sentence, the set of committed sentences, and the document-scope layers
//! derived from the committed best theories.
//!
//! Committing a sentence reduces its beam to the single best theory. Only
//! committed theories feed document processors and merges.

mod layers;
mod merge;

pub use layers::{
    DocEntitySet, DocRelMentionSet, DocValueMentionSet, DocumentLayer, DocumentLayers, Event,
    EventSet, Relation, RelationSet, Value, ValueSet,
};
pub use merge::{merge_fragments, DroppedLayer, MergeReport};

use crate::beam::Beam;
use crate::theory::Theory;
use crate::TheoristError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// DOCUMENT AND SENTENCES
// =============================================================================

/// A contiguous region of the source text (headline, body, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub tag: String,
    pub start: u32,
    pub end: u32,
}

/// The raw input document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub source_type: String,
    pub text: String,
    pub regions: Vec<Region>,
}

impl Document {
    /// A document with a single region spanning the whole text.
    #[must_use]
    pub fn new(
        doc_id: impl Into<String>,
        source_type: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let text = text.into();
        let end = text.chars().count() as u32;
        Self {
            doc_id: doc_id.into(),
            source_type: source_type.into(),
            text,
            regions: vec![Region {
                tag: "TEXT".to_string(),
                start: 0,
                end,
            }],
        }
    }
}

/// An immutable sentence span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    pub doc_id: String,
    pub region: u32,
    pub index: u32,
    pub start: u32,
    pub end: u32,
    pub text: String,
}

impl Sentence {
    /// Split a document's text into sentences on `.`, `!` and `?`.
    ///
    /// Sentence boundary detection proper is an external concern; this is
    /// enough for fixtures and the CLI.
    #[must_use]
    pub fn split(document: &Document) -> Vec<Sentence> {
        let mut sentences = Vec::new();
        let mut start = 0u32;
        let mut current = String::new();
        for (offset, ch) in document.text.chars().enumerate() {
            current.push(ch);
            if matches!(ch, '.' | '!' | '?') {
                push_sentence(document, &mut sentences, start, offset as u32, &current);
                current.clear();
                start = (offset as u32).saturating_add(1);
            }
        }
        let end = document.text.chars().count() as u32;
        push_sentence(document, &mut sentences, start, end.saturating_sub(1), &current);
        sentences
    }
}

fn push_sentence(
    document: &Document,
    sentences: &mut Vec<Sentence>,
    start: u32,
    last: u32,
    text: &str,
) {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return;
    }
    let lead = text.chars().take_while(|c| c.is_whitespace()).count() as u32;
    let region = document
        .regions
        .iter()
        .position(|r| r.start <= start && start < r.end)
        .unwrap_or(0) as u32;
    sentences.push(Sentence {
        doc_id: document.doc_id.clone(),
        region,
        index: sentences.len() as u32,
        start: start.saturating_add(lead),
        end: last.saturating_add(1),
        text: trimmed.to_string(),
    });
}

// =============================================================================
// DOC THEORY
// =============================================================================

/// All per-sentence beams of a document plus its document-scope layers.
#[derive(Debug)]
pub struct DocTheory {
    document: Document,
    sentences: Vec<Sentence>,
    beams: Vec<Beam>,
    committed: BTreeSet<usize>,
    layers: DocumentLayers,
}

impl DocTheory {
    /// A document with an empty beam per sentence.
    #[must_use]
    pub fn new(document: Document, sentences: Vec<Sentence>) -> Self {
        let beams = (0..sentences.len()).map(|i| Beam::new(i, 1)).collect();
        Self {
            document,
            sentences,
            beams,
            committed: BTreeSet::new(),
            layers: DocumentLayers::default(),
        }
    }

    /// Split the document text into sentences and wrap it.
    #[must_use]
    pub fn from_document(document: Document) -> Self {
        let sentences = Sentence::split(&document);
        Self::new(document, sentences)
    }

    pub(crate) fn from_parts(
        document: Document,
        sentences: Vec<Sentence>,
        beams: Vec<Beam>,
        committed: BTreeSet<usize>,
        layers: DocumentLayers,
    ) -> Self {
        Self {
            document,
            sentences,
            beams,
            committed,
            layers,
        }
    }

    #[must_use]
    pub fn document(&self) -> &Document {
        &self.document
    }

    #[must_use]
    pub fn doc_id(&self) -> &str {
        &self.document.doc_id
    }

    #[must_use]
    pub fn n_sentences(&self) -> usize {
        self.sentences.len()
    }

    #[must_use]
    pub fn sentence(&self, index: usize) -> Option<&Sentence> {
        self.sentences.get(index)
    }

    #[must_use]
    pub fn sentences(&self) -> &[Sentence] {
        &self.sentences
    }

    #[must_use]
    pub fn beam(&self, index: usize) -> Option<&Beam> {
        self.beams.get(index)
    }

    /// Every beam, in sentence order.
    #[must_use]
    pub fn beams(&self) -> &[Beam] {
        &self.beams
    }

    /// Replace a sentence's beam. Clears the sentence's committed flag.
    pub fn install_beam(&mut self, index: usize, beam: Beam) -> Result<(), TheoristError> {
        let slot = self
            .beams
            .get_mut(index)
            .ok_or(TheoristError::SentenceOutOfRange(index))?;
        if beam.sentence_index() != index {
            return Err(TheoristError::stream(format!(
                "beam for sentence {} installed at sentence {}",
                beam.sentence_index(),
                index
            )));
        }
        *slot = beam;
        self.committed.remove(&index);
        Ok(())
    }

    /// Take a sentence's beam out, leaving an empty one behind.
    pub fn take_beam(&mut self, index: usize) -> Result<Beam, TheoristError> {
        let slot = self
            .beams
            .get_mut(index)
            .ok_or(TheoristError::SentenceOutOfRange(index))?;
        self.committed.remove(&index);
        Ok(std::mem::replace(slot, Beam::new(index, 1)))
    }

    /// Reduce a sentence's beam to its best theory and mark it committed.
    ///
    /// Returns `false` when the beam holds nothing to commit.
    pub fn commit_sentence(&mut self, index: usize) -> Result<bool, TheoristError> {
        let beam = self
            .beams
            .get_mut(index)
            .ok_or(TheoristError::SentenceOutOfRange(index))?;
        let Some(best) = beam.extract_best_theory() else {
            return Ok(false);
        };
        *beam = Beam::with_theory(index, 1, best);
        self.committed.insert(index);
        Ok(true)
    }

    /// Whether a sentence has been committed.
    #[must_use]
    pub fn is_committed(&self, index: usize) -> bool {
        self.committed.contains(&index)
    }

    /// Whether every sentence has been committed.
    #[must_use]
    pub fn is_fully_committed(&self) -> bool {
        self.committed.len() == self.sentences.len()
    }

    /// Indices of the committed sentences.
    #[must_use]
    pub fn committed(&self) -> &BTreeSet<usize> {
        &self.committed
    }

    /// The committed best theory of a sentence.
    #[must_use]
    pub fn committed_theory(&self, index: usize) -> Option<&Theory> {
        if !self.committed.contains(&index) {
            return None;
        }
        self.beams.get(index).and_then(Beam::best_theory)
    }

    /// Committed theories in sentence order.
    pub fn committed_theories(&self) -> impl Iterator<Item = (usize, &Theory)> {
        self.committed
            .iter()
            .filter_map(|i| self.committed_theory(*i).map(|t| (*i, t)))
    }

    #[must_use]
    pub fn layers(&self) -> &DocumentLayers {
        &self.layers
    }

    /// Install a document-scope layer, replacing any previous one of its kind.
    pub fn set_layer(&mut self, layer: DocumentLayer) {
        self.layers.install(layer);
    }
}

// =============================================================================
// TESTS
// =============================================================================
