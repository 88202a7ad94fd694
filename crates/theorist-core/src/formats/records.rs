//! # State Stream Records
//!
//! The serialized shape of beams and documents.
//!
//! Format:
//! ```text
//! [header_len: u32 LE] [StateHeader (postcard)] [record (postcard)]
//! ```
//!
//! Theory slots and subtheory links are written as pointer tokens
//! ([`ObjectId`]); each subtheory payload appears exactly once per stream.

use crate::document::{Document, DocumentLayers, Sentence};
use crate::primitives;
use crate::subtheory::Subtheory;
use crate::theory::PrimaryParse;
use crate::{ObjectId, TheoristError};
use serde::{Deserialize, Serialize};

// =============================================================================
// HEADER
// =============================================================================

/// What a state stream holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateKind {
    Document,
    Beam,
}

impl std::fmt::Display for StateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateKind::Document => f.write_str("document"),
            StateKind::Beam => f.write_str("beam"),
        }
    }
}

/// Header preceding every state stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateHeader {
    /// Magic bytes to identify the format.
    pub magic: [u8; 4],

    /// Format version for compatibility.
    pub version: u8,

    /// Document or single beam.
    pub kind: StateKind,

    /// Length of the record section in bytes.
    pub payload_len: u64,

    /// Checksum of the record section.
    pub checksum: u64,
}

impl StateHeader {
    /// Create a header describing `payload`.
    #[must_use]
    pub fn new(kind: StateKind, payload: &[u8]) -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
            kind,
            payload_len: payload.len() as u64,
            checksum: payload_checksum(payload),
        }
    }

    /// Validate magic bytes and version.
    pub fn validate(&self) -> Result<(), TheoristError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(TheoristError::stream("invalid magic bytes"));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(TheoristError::stream(format!(
                "unsupported version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }
}

/// Deterministic rotate-XOR checksum of a byte slice.
///
/// Detects accidental corruption only. Use the `crypto-hash` feature for a
/// collision-resistant digest.
#[must_use]
pub fn payload_checksum(bytes: &[u8]) -> u64 {
    bytes.iter().fold(bytes.len() as u64, |hash, byte| {
        hash.rotate_left(7) ^ u64::from(*byte)
    })
}

// =============================================================================
// RECORDS
// =============================================================================

/// One theory: per-type optional pointer token, in [`SubtheoryType::ALL`] order.
///
/// [`SubtheoryType::ALL`]: crate::SubtheoryType::ALL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TheoryRecord {
    pub primary_parse: PrimaryParse,
    pub doc_id: String,
    pub slots: Vec<Option<ObjectId>>,
}

/// One subtheory, fully described.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtheoryRecord {
    pub tag: u8,
    pub id: ObjectId,
    pub payload: Subtheory,
}

/// One beam with the subtheories first written in it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeamRecord {
    pub sentence_index: u32,
    pub width: u32,
    pub theory_count: u32,
    pub theories: Vec<TheoryRecord>,
    pub subtheory_count: u32,
    pub subtheories: Vec<SubtheoryRecord>,
}

/// A whole document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub document: Document,
    pub sentence_count: u32,
    pub sentences: Vec<Sentence>,
    pub beams: Vec<BeamRecord>,
    pub committed: Vec<u32>,
    pub layers: DocumentLayers,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_carries_payload_facts() {
        let header = StateHeader::new(StateKind::Beam, b"payload");
        assert_eq!(header.payload_len, 7);
        assert_eq!(header.checksum, payload_checksum(b"payload"));
        header.validate().expect("valid");
    }

    #[test]
    fn checksum_is_order_sensitive() {
        assert_ne!(payload_checksum(b"ab"), payload_checksum(b"ba"));
        assert_ne!(payload_checksum(b""), payload_checksum(b"\0"));
    }

    #[test]
    fn wrong_version_rejected() {
        let mut header = StateHeader::new(StateKind::Document, b"");
        header.version = header.version.wrapping_add(1);
        assert!(matches!(
            header.validate(),
            Err(TheoristError::StreamFormat(_))
        ));
    }
}
