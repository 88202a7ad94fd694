//! # Processor Contracts
//!
//! The interfaces external linguistic components present to the driver.
//!
//! A [`StageProcessor`] expands one theory into candidate subtheories for
//! its stage; a [`DocumentProcessor`] derives a document-scope layer from
//! the committed best theory of every sentence. The core never looks inside
//! the candidates beyond their type and score.

use crate::document::{DocTheory, Document, DocumentLayer, Sentence};
use crate::subtheory::Subtheory;
use crate::system::Stage;
use crate::theory::Theory;
use crate::TheoristError;
use std::collections::BTreeMap;

// =============================================================================
// STAGE PROCESSOR
// =============================================================================

/// Read-only inputs available to a stage processor.
#[derive(Debug, Clone, Copy)]
pub struct StageInput<'a> {
    pub document: &'a Document,
    pub sentence: &'a Sentence,
    pub sentence_index: usize,
}

/// An external component that proposes subtheories for one stage.
pub trait StageProcessor {
    /// The stage this processor serves.
    fn stage(&self) -> Stage;

    /// Whether the backing model is loaded and usable.
    ///
    /// An unavailable processor of an optional stage is replaced by the
    /// canonical empty subtheory.
    fn is_available(&self) -> bool {
        true
    }

    /// Push up to `max_candidates` subtheories of the stage's output type
    /// onto `out` and return how many were pushed.
    ///
    /// Zero is a legal answer. Pushing more than `max_candidates`, or
    /// returning a count that differs from what was pushed, breaks the
    /// contract and fails the document.
    fn expand(
        &mut self,
        input: &StageInput<'_>,
        theory: &Theory,
        max_candidates: usize,
        out: &mut Vec<Subtheory>,
    ) -> Result<usize, TheoristError>;
}

/// Processors keyed by stage.
#[derive(Default)]
pub struct StageRegistry {
    processors: BTreeMap<Stage, Box<dyn StageProcessor>>,
}

impl StageRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor under its own stage, replacing any previous one.
    pub fn register(
        &mut self,
        processor: Box<dyn StageProcessor>,
    ) -> Option<Box<dyn StageProcessor>> {
        self.processors.insert(processor.stage(), processor)
    }

    /// Get the processor for a stage.
    pub fn get_mut(&mut self, stage: Stage) -> Option<&mut (dyn StageProcessor + 'static)> {
        self.processors.get_mut(&stage).map(|p| p.as_mut())
    }

    /// Whether a processor is registered for `stage`.
    #[must_use]
    pub fn contains(&self, stage: Stage) -> bool {
        self.processors.contains_key(&stage)
    }

    /// Registered stages in order.
    pub fn stages(&self) -> impl Iterator<Item = Stage> + '_ {
        self.processors.keys().copied()
    }
}

impl std::fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.processors.keys()).finish()
    }
}

// =============================================================================
// DOCUMENT PROCESSOR
// =============================================================================

/// An external component that builds a document-scope layer.
///
/// Runs once per document after every sentence has been committed.
pub trait DocumentProcessor {
    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Derive a layer from the committed theories, or `None` if there is
    /// nothing to add.
    fn process(&mut self, doc: &DocTheory) -> Result<Option<DocumentLayer>, TheoristError>;
}
