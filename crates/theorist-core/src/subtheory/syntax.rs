//! Syntactic layers: noun-phrase chunks and parses.

use super::SubtheoryRef;
use crate::Score;
use serde::{Deserialize, Serialize};

/// A base noun phrase over a token range (end exclusive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpChunk {
    pub start_token: u32,
    pub end_token: u32,
}

/// Noun-phrase chunking of one sentence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NpChunkTheory {
    pub tokens: SubtheoryRef,
    pub chunks: Vec<NpChunk>,
    pub score: Score,
}

/// A parse of one sentence.
///
/// Used for both the constituency parse and the dependency parse. The tree
/// itself is opaque to the core and kept in bracketed form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parse {
    pub tokens: SubtheoryRef,
    pub tree: String,
    pub score: Score,
}

impl Parse {
    /// A parse with no structure.
    #[must_use]
    pub fn flat(tokens: SubtheoryRef) -> Self {
        Self {
            tokens,
            tree: String::new(),
            score: Score::ZERO,
        }
    }
}
