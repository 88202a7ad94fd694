//! # theorist-core
//!
//! The hypothesis-management engine for Theorist - THE LOGIC.
//!
//! This crate keeps competing analyses of each sentence alive while
//! external linguistic components refine them stage by stage, and can
//! save and restore that state without losing object sharing.
//!
//! ## Layers
//!
//! - `theory` / `subtheory`: one hypothesis per sentence, one shared slot
//!   per stage output
//! - `beam`: bounded, score-ordered set of theories
//! - `driver`: stage sequencing, pruning and commit
//! - `document`: per-document aggregation and fragment merge
//! - `formats` / `storage`: identity-preserving streams and where they live
//!
//! ## Architectural Constraints
//!
//! The CORE:
//! - Never runs linguistic algorithms itself; they arrive as stage processors
//! - Is single-threaded: subtheories are shared through `Rc`
//! - Is deterministic: integer scores, ordered maps, stable tie-breaking
//! - Has NO async, NO network dependencies (pure Rust)

// =============================================================================
// MODULES
// =============================================================================

pub mod beam;
pub mod document;
pub mod driver;
pub mod formats;
pub mod primitives;
pub mod storage;
pub mod subtheory;
pub mod system;
pub mod theory;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{IntegrityRule, MentionUid, ObjectId, Score, SubtheoryType, TheoristError};

// =============================================================================
// RE-EXPORTS: Hypothesis Model
// =============================================================================

pub use beam::Beam;
pub use subtheory::{Subtheory, SubtheoryRef};
pub use theory::{PrimaryParse, Theory};

// =============================================================================
// RE-EXPORTS: Pipeline
// =============================================================================

pub use document::{
    DocTheory, Document, DocumentLayer, DocumentLayers, MergeReport, Sentence, merge_fragments,
};
pub use driver::{DocumentReport, Driver};
pub use system::{
    DocumentProcessor, PipelineConfig, Stage, StageConfig, StageInput, StageMode,
    StageProcessor, StageRange, StageRegistry,
};

// =============================================================================
// RE-EXPORTS: Persistence
// =============================================================================

pub use formats::{StateHeader, StateKind, load_beam, load_document, save_beam, save_document};
pub use storage::{
    MemoryStateStore, RedbStateStore, StateKey, StateStore, checkpoint_beams,
    checkpoint_document, restore_beams, restore_document,
};
