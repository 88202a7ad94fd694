//! # Engine Primitives
//!
//! Hardcoded runtime constants for the Theorist core.
//!
//! These values are compiled into the binary and are immutable at runtime.
//! Per-stage tunables (beam widths, stage modes) live in
//! [`PipelineConfig`](crate::system::PipelineConfig) instead.

/// Fixed-point scale for [`Score`](crate::Score): one unit = 1_000_000.
///
/// Scores are integers so that beam ordering is exact and reproducible.
pub const SCORE_SCALE: i64 = 1_000_000;

/// Magic bytes for the Theorist state stream header.
pub const MAGIC_BYTES: &[u8; 4] = b"THRY";

/// Current state stream format version.
///
/// Increment this when making breaking changes to the record layout.
pub const FORMAT_VERSION: u8 = 1;

/// Maximum accepted size of a state stream payload.
///
/// Validated BEFORE attempting deserialization.
pub const MAX_STATE_PAYLOAD_SIZE: usize = 256 * 1024 * 1024; // 256 MB

/// Upper bound for any configured beam width.
pub const MAX_BEAM_WIDTH: usize = 1024;

/// Upper bound for the number of sentences accepted from a state stream.
pub const MAX_SENTENCE_COUNT: u32 = 1_000_000;

/// Upper bound for the number of subtheories in a single beam record.
pub const MAX_SUBTHEORY_COUNT: u32 = 10_000_000;

// =============================================================================
// DEFAULT BEAM WIDTHS
// =============================================================================

/// Beam width used for single-best stages (tokens, part-of-speech, ...).
pub const NARROW_BEAM_WIDTH: usize = 1;

/// Beam width used for the ambiguous early stages (names, values, parse).
pub const DEFAULT_BEAM_WIDTH: usize = 4;

/// Beam width used for the mention-level stages.
pub const WIDE_BEAM_WIDTH: usize = 8;
