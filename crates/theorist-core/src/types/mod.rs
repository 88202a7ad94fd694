//! # Core Type Definitions
//!
//! This module contains the small value types shared by every layer of the
//! Theorist core:
//! - Fixed-point scores (`Score`)
//! - The ordered subtheory enumeration (`SubtheoryType`)
//! - Identifiers (`ObjectId`, `MentionUid`)
//! - Error types (`TheoristError`, `IntegrityRule`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Use integer arithmetic only (no floating-point)
//! - Implement `Ord` for deterministic ordering in `BTreeMap`/`BTreeSet`
//! - Use saturating arithmetic for score sums

use crate::primitives::SCORE_SCALE;
use crate::system::Stage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// SCORE
// =============================================================================

/// Fixed-point score in millionths.
///
/// Higher is better. A theory's score is the saturating sum of the scores
/// of its populated slots.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Score(pub i64);

impl Score {
    /// The neutral score.
    pub const ZERO: Self = Self(0);

    /// Create a score from raw millionths.
    #[must_use]
    pub const fn new(millionths: i64) -> Self {
        Self(millionths)
    }

    /// Create a score from whole units.
    #[must_use]
    pub const fn from_units(units: i64) -> Self {
        Self(units.saturating_mul(SCORE_SCALE))
    }

    /// Get the raw value in millionths.
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }

    /// Saturating addition.
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }
}

impl std::iter::Sum for Score {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Self::saturating_add)
    }
}

impl std::fmt::Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let whole = self.0 / SCORE_SCALE;
        let frac = (self.0 % SCORE_SCALE).unsigned_abs();
        if self.0 < 0 && whole == 0 {
            write!(f, "-0.{:06}", frac)
        } else {
            write!(f, "{}.{:06}", whole, frac)
        }
    }
}

// =============================================================================
// SUBTHEORY TYPE
// =============================================================================

/// The fixed, totally ordered set of per-sentence annotation layers.
///
/// Declaration order is stage dependency order: a layer may only depend on
/// layers declared before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubtheoryType {
    Tokens,
    PartOfSpeech,
    Names,
    NestedNames,
    Values,
    NpChunk,
    Parse,
    Mentions,
    Propositions,
    Entities,
    Relations,
    Events,
    DependencyParse,
    ActorMentions,
}

impl SubtheoryType {
    /// Number of subtheory types (and of slots in a theory).
    pub const COUNT: usize = 14;

    /// Every type in stage order.
    pub const ALL: [SubtheoryType; Self::COUNT] = [
        SubtheoryType::Tokens,
        SubtheoryType::PartOfSpeech,
        SubtheoryType::Names,
        SubtheoryType::NestedNames,
        SubtheoryType::Values,
        SubtheoryType::NpChunk,
        SubtheoryType::Parse,
        SubtheoryType::Mentions,
        SubtheoryType::Propositions,
        SubtheoryType::Entities,
        SubtheoryType::Relations,
        SubtheoryType::Events,
        SubtheoryType::DependencyParse,
        SubtheoryType::ActorMentions,
    ];

    /// Stable one-byte tag used by the state stream.
    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Decode a stream tag. Returns `None` for unknown tags.
    #[must_use]
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.get(tag as usize).copied()
    }

    /// Position in stage order.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Human-readable name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            SubtheoryType::Tokens => "tokens",
            SubtheoryType::PartOfSpeech => "part-of-speech",
            SubtheoryType::Names => "names",
            SubtheoryType::NestedNames => "nested-names",
            SubtheoryType::Values => "values",
            SubtheoryType::NpChunk => "np-chunk",
            SubtheoryType::Parse => "parse",
            SubtheoryType::Mentions => "mentions",
            SubtheoryType::Propositions => "propositions",
            SubtheoryType::Entities => "entities",
            SubtheoryType::Relations => "relations",
            SubtheoryType::Events => "events",
            SubtheoryType::DependencyParse => "dependency-parse",
            SubtheoryType::ActorMentions => "actor-mentions",
        }
    }
}

impl std::fmt::Display for SubtheoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Pointer token assigned to a subtheory instance while saving.
///
/// Only meaningful within a single state stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u32);

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Document-unique identifier of a mention (or value mention).
///
/// Cross-sentence references use uids rather than pointers so that
/// document-scope layers never hold on to sentence-level instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MentionUid {
    /// Sentence index within the document.
    pub sentence: u32,
    /// Index within the sentence's set.
    pub index: u32,
}

impl MentionUid {
    /// Create a new uid.
    #[must_use]
    pub const fn new(sentence: u32, index: u32) -> Self {
        Self { sentence, index }
    }

    /// The same uid moved `offset` sentences later, or `None` on overflow.
    #[must_use]
    pub const fn checked_shifted(self, offset: u32) -> Option<Self> {
        match self.sentence.checked_add(offset) {
            Some(sentence) => Some(Self {
                sentence,
                index: self.index,
            }),
            None => None,
        }
    }
}

impl std::fmt::Display for MentionUid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.sentence, self.index)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// The ownership or ordering rule a rejected operation would have broken.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityRule {
    /// Tokens cannot be replaced once a token-dependent layer exists.
    #[error("tokens cannot be replaced while {blocking} is set")]
    TokensLocked { blocking: SubtheoryType },

    /// Parse cannot be replaced once a parse-dependent layer exists.
    #[error("parse cannot be replaced while {blocking} is set")]
    ParseLocked { blocking: SubtheoryType },

    /// A subtheory was offered for a slot of a different type.
    #[error("{actual} subtheory offered for the {slot} slot")]
    KindMismatch {
        slot: SubtheoryType,
        actual: SubtheoryType,
    },

    /// Populated slots do not form a prefix of stage order.
    #[error("{present} is set but the earlier {missing} slot is empty")]
    StagePrefix {
        missing: SubtheoryType,
        present: SubtheoryType,
    },

    /// A resumed run found a theory without the previous stage's output.
    #[error("cannot resume at {stage}: {missing} slot is empty")]
    ResumeWithoutInput { stage: Stage, missing: SubtheoryType },
}

/// Errors that can occur in the Theorist system.
///
/// - No silent failures
/// - Use `Result<T, TheoristError>` for fallible operations
/// - The core never panics; the orchestrator decides whether to skip a
///   failed document or halt the batch
#[derive(Debug, Error)]
pub enum TheoristError {
    /// A subtheory ownership or ordering invariant was violated.
    #[error("structural consistency violated: {rule}")]
    StructuralConsistency { rule: IntegrityRule },

    /// A required stage left the next beam empty.
    #[error("stage {stage} produced no candidates for sentence {sentence}")]
    StageProducedNothing { stage: Stage, sentence: usize },

    /// A stage processor broke its output contract.
    #[error("stage {stage} processor contract violated: {detail}")]
    ProcessorContract { stage: Stage, detail: String },

    /// A required stage has no registered processor.
    #[error("no processor registered for required stage {0}")]
    MissingProcessor(Stage),

    /// A persisted stream is malformed or from another format version.
    #[error("stream format error: {0}")]
    StreamFormat(String),

    /// Operator-triggered abort of a designated document.
    #[error("intentional abort of document #{index} ({doc_id}) at stage {stage}")]
    IntentionalAbort {
        index: usize,
        doc_id: String,
        stage: Stage,
    },

    /// The pipeline configuration is unusable.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// A sentence index outside the document was requested.
    #[error("sentence index {0} out of range")]
    SentenceOutOfRange(usize),

    /// Document fragments cannot be combined.
    #[error("merge conflict: {0}")]
    MergeConflict(String),

    /// A document failed mid-pipeline.
    #[error("document {doc_id} failed at stage {stage} (sentence {sentence}): {source}")]
    DocumentFailed {
        doc_id: String,
        stage: Stage,
        sentence: usize,
        #[source]
        source: Box<TheoristError>,
    },

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

impl TheoristError {
    /// Shorthand for a structural consistency error.
    #[must_use]
    pub fn structural(rule: IntegrityRule) -> Self {
        Self::StructuralConsistency { rule }
    }

    /// Shorthand for a stream format error.
    #[must_use]
    pub fn stream(detail: impl Into<String>) -> Self {
        Self::StreamFormat(detail.into())
    }

    /// The innermost error, looking through `DocumentFailed` wrappers.
    #[must_use]
    pub fn root_cause(&self) -> &TheoristError {
        match self {
            TheoristError::DocumentFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_sum_saturates() {
        let total: Score = [Score::new(i64::MAX), Score::new(1)].into_iter().sum();
        assert_eq!(total, Score::new(i64::MAX));
    }

    #[test]
    fn score_display_fixed_point() {
        assert_eq!(Score::from_units(3).to_string(), "3.000000");
        assert_eq!(Score::new(-250_000).to_string(), "-0.250000");
        assert_eq!(Score::new(1_500_000).to_string(), "1.500000");
    }

    #[test]
    fn subtheory_tags_roundtrip() {
        for kind in SubtheoryType::ALL {
            assert_eq!(SubtheoryType::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(SubtheoryType::from_tag(SubtheoryType::COUNT as u8), None);
    }

    #[test]
    fn subtheory_order_is_stage_order() {
        assert!(SubtheoryType::Tokens < SubtheoryType::Parse);
        assert!(SubtheoryType::Parse < SubtheoryType::Mentions);
        assert!(SubtheoryType::Events < SubtheoryType::DependencyParse);
        for (i, kind) in SubtheoryType::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn root_cause_unwraps_document_failure() {
        let err = TheoristError::DocumentFailed {
            doc_id: "doc".to_string(),
            stage: Stage::Parse,
            sentence: 2,
            source: Box::new(TheoristError::StageProducedNothing {
                stage: Stage::Parse,
                sentence: 2,
            }),
        };
        assert!(matches!(
            err.root_cause(),
            TheoristError::StageProducedNothing { .. }
        ));
    }
}
