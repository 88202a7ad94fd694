//! # Persistence Format
//!
//! Identity-preserving save/load of documents and single beams.
//!
//! File I/O is left to callers (the state store and the app).
//!
//! ## Save
//!
//! 1. Identity pass: every distinct subtheory instance reachable from a
//!    theory slot gets a sequential [`ObjectId`].
//! 2. Serialization pass: slots and links are written as tokens; each
//!    payload is written once, in the first beam that holds it.
//!
//! ## Load
//!
//! 1. Reconstruction pass: every payload is rebuilt and recorded in an
//!    [`ObjectPointerTable`]; links hold raw tokens.
//! 2. Resolution pass: every link and slot is resolved through the table.
//!    Because resolution waits until every instance exists, links may point
//!    forward.
//!
//! Every inconsistency in a stream is a fatal [`TheoristError::StreamFormat`].
//!
//! ## Security
//!
//! Size limits, header and checksum are validated BEFORE the record is
//! decoded.

use super::identity::{ObjectIdTable, ObjectPointerTable};
use super::records::{
    payload_checksum, BeamRecord, DocumentRecord, StateHeader, StateKind, SubtheoryRecord,
    TheoryRecord,
};
use crate::beam::Beam;
use crate::document::DocTheory;
use crate::primitives::{
    MAX_BEAM_WIDTH, MAX_SENTENCE_COUNT, MAX_STATE_PAYLOAD_SIZE, MAX_SUBTHEORY_COUNT,
};
use crate::subtheory::Subtheory;
use crate::theory::Theory;
use crate::{ObjectId, SubtheoryType, TheoristError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

/// Length prefix of the header section.
const HEADER_LEN_BYTES: usize = 4;

// =============================================================================
// FRAMING
// =============================================================================

/// Frame a record: `[header_len u32 LE][header][record]`.
pub fn encode_state<T: Serialize>(kind: StateKind, record: &T) -> Result<Vec<u8>, TheoristError> {
    let payload = postcard::to_allocvec(record)
        .map_err(|e| TheoristError::SerializationError(format!("Data: {}", e)))?;
    let header = StateHeader::new(kind, &payload);
    let header_bytes = postcard::to_allocvec(&header)
        .map_err(|e| TheoristError::SerializationError(format!("Header: {}", e)))?;

    let mut result =
        Vec::with_capacity(HEADER_LEN_BYTES + header_bytes.len() + payload.len());
    result.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
    result.extend_from_slice(&header_bytes);
    result.extend_from_slice(&payload);
    Ok(result)
}

/// Read and validate the header, returning it with the record bytes.
pub fn read_header(bytes: &[u8]) -> Result<(StateHeader, &[u8]), TheoristError> {
    if bytes.len() > MAX_STATE_PAYLOAD_SIZE {
        return Err(TheoristError::stream(format!(
            "stream size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_STATE_PAYLOAD_SIZE
        )));
    }
    let (len_bytes, rest) = bytes
        .split_first_chunk::<HEADER_LEN_BYTES>()
        .ok_or_else(|| TheoristError::stream("stream too short"))?;
    let header_len = u32::from_le_bytes(*len_bytes) as usize;
    if rest.len() < header_len {
        return Err(TheoristError::stream("stream too short for header"));
    }
    let (header_bytes, payload) = rest.split_at(header_len);

    let header: StateHeader = postcard::from_bytes(header_bytes)
        .map_err(|e| TheoristError::stream(format!("header: {}", e)))?;
    header.validate()?;

    if header.payload_len != payload.len() as u64 {
        return Err(TheoristError::stream(format!(
            "declared payload length {} but found {} bytes",
            header.payload_len,
            payload.len()
        )));
    }
    let computed = payload_checksum(payload);
    if computed != header.checksum {
        return Err(TheoristError::stream(format!(
            "checksum mismatch: expected {}, got {}",
            header.checksum, computed
        )));
    }
    Ok((header, payload))
}

/// Decode a framed record of the expected kind.
pub fn decode_state<T: DeserializeOwned>(
    bytes: &[u8],
    expected: StateKind,
) -> Result<T, TheoristError> {
    let (header, payload) = read_header(bytes)?;
    if header.kind != expected {
        return Err(TheoristError::stream(format!(
            "expected a {} stream, found a {} stream",
            expected, header.kind
        )));
    }
    postcard::from_bytes(payload).map_err(|e| TheoristError::stream(format!("data: {}", e)))
}

// =============================================================================
// SAVE
// =============================================================================

/// Save a single beam with every subtheory it holds.
pub fn save_beam(beam: &Beam) -> Result<Vec<u8>, TheoristError> {
    let mut ids = ObjectIdTable::new();
    let unique = beam.collect_unique_subtheories();
    for subtheory in &unique {
        ids.register(subtheory)?;
    }
    let record = beam_record(beam, &unique, &ids)?;
    encode_state(StateKind::Beam, &record)
}

/// Save a document: sentences, every beam, committed set and layers.
pub fn save_document(doc: &DocTheory) -> Result<Vec<u8>, TheoristError> {
    // Pass 1: identity assignment, remembering where each payload goes.
    let mut ids = ObjectIdTable::new();
    let mut first_seen = Vec::with_capacity(doc.n_sentences());
    for beam in doc.beams() {
        let mut fresh = Vec::new();
        for subtheory in beam.collect_unique_subtheories() {
            if ids.lookup(&subtheory).is_none() {
                ids.register(&subtheory)?;
                fresh.push(subtheory);
            }
        }
        first_seen.push(fresh);
    }

    // Pass 2: serialization.
    let beams = doc
        .beams()
        .iter()
        .zip(&first_seen)
        .map(|(beam, fresh)| beam_record(beam, fresh, &ids))
        .collect::<Result<Vec<_>, _>>()?;

    let record = DocumentRecord {
        document: doc.document().clone(),
        sentence_count: count_u32(doc.n_sentences())?,
        sentences: doc.sentences().to_vec(),
        beams,
        committed: doc
            .committed()
            .iter()
            .map(|i| count_u32(*i))
            .collect::<Result<_, _>>()?,
        layers: doc.layers().clone(),
    };
    encode_state(StateKind::Document, &record)
}

fn beam_record(
    beam: &Beam,
    written: &[Rc<Subtheory>],
    ids: &ObjectIdTable,
) -> Result<BeamRecord, TheoristError> {
    let theories = beam
        .iter()
        .map(|theory| theory_record(theory, ids))
        .collect::<Result<Vec<_>, _>>()?;
    let subtheories = written
        .iter()
        .map(|subtheory| {
            let id = ids
                .lookup(subtheory)
                .ok_or_else(|| TheoristError::stream("subtheory missing from id table"))?;
            Ok(SubtheoryRecord {
                tag: subtheory.kind().tag(),
                id,
                payload: subtheory.to_record(ids)?,
            })
        })
        .collect::<Result<Vec<_>, TheoristError>>()?;

    Ok(BeamRecord {
        sentence_index: count_u32(beam.sentence_index())?,
        width: count_u32(beam.width())?,
        theory_count: count_u32(theories.len())?,
        theories,
        subtheory_count: count_u32(subtheories.len())?,
        subtheories,
    })
}

fn theory_record(theory: &Theory, ids: &ObjectIdTable) -> Result<TheoryRecord, TheoristError> {
    let slots = SubtheoryType::ALL
        .iter()
        .map(|kind| {
            theory
                .get_subtheory(*kind)
                .map(|s| {
                    ids.lookup(s).ok_or_else(|| {
                        TheoristError::stream(format!("{} slot holds an unregistered instance", kind))
                    })
                })
                .transpose()
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(TheoryRecord {
        primary_parse: theory.primary_parse(),
        doc_id: theory.doc_id().to_string(),
        slots,
    })
}

fn count_u32(n: usize) -> Result<u32, TheoristError> {
    u32::try_from(n).map_err(|_| TheoristError::SerializationError(format!("count {} too large", n)))
}

// =============================================================================
// LOAD
// =============================================================================

/// Load a single beam.
pub fn load_beam(bytes: &[u8]) -> Result<Beam, TheoristError> {
    let record: BeamRecord = decode_state(bytes, StateKind::Beam)?;
    let mut table = ObjectPointerTable::new();
    reconstruct(&record, &mut table)?;
    resolve_links(&table)?;
    build_beam(record, &table)
}

/// Load a document.
pub fn load_document(bytes: &[u8]) -> Result<DocTheory, TheoristError> {
    let record: DocumentRecord = decode_state(bytes, StateKind::Document)?;

    if record.sentence_count > MAX_SENTENCE_COUNT {
        return Err(TheoristError::stream(format!(
            "sentence count {} exceeds maximum allowed {}",
            record.sentence_count, MAX_SENTENCE_COUNT
        )));
    }
    let declared = record.sentence_count as usize;
    if record.sentences.len() != declared || record.beams.len() != declared {
        return Err(TheoristError::stream(format!(
            "declared {} sentences but found {} sentences and {} beams",
            declared,
            record.sentences.len(),
            record.beams.len()
        )));
    }

    // Pass 1: reconstruction across every beam.
    let mut table = ObjectPointerTable::new();
    for beam in &record.beams {
        reconstruct(beam, &mut table)?;
    }
    // Pass 2: resolution.
    resolve_links(&table)?;

    let mut beams = Vec::with_capacity(declared);
    for (index, beam) in record.beams.into_iter().enumerate() {
        if beam.sentence_index as usize != index {
            return Err(TheoristError::stream(format!(
                "beam for sentence {} stored at position {}",
                beam.sentence_index, index
            )));
        }
        beams.push(build_beam(beam, &table)?);
    }

    let mut committed = BTreeSet::new();
    for index in record.committed {
        let index = index as usize;
        if index >= declared || !committed.insert(index) {
            return Err(TheoristError::stream(format!(
                "invalid committed sentence index {}",
                index
            )));
        }
    }

    Ok(DocTheory::from_parts(
        record.document,
        record.sentences,
        beams,
        committed,
        record.layers,
    ))
}

/// Rebuild every subtheory of a beam record into the pointer table.
fn reconstruct(record: &BeamRecord, table: &mut ObjectPointerTable) -> Result<(), TheoristError> {
    if record.subtheory_count > MAX_SUBTHEORY_COUNT {
        return Err(TheoristError::stream(format!(
            "subtheory count {} exceeds maximum allowed {}",
            record.subtheory_count, MAX_SUBTHEORY_COUNT
        )));
    }
    if record.subtheories.len() != record.subtheory_count as usize {
        return Err(TheoristError::stream(format!(
            "declared {} subtheories but found {}",
            record.subtheory_count,
            record.subtheories.len()
        )));
    }
    for entry in &record.subtheories {
        let kind = SubtheoryType::from_tag(entry.tag)
            .ok_or_else(|| TheoristError::stream(format!("unknown subtheory tag {}", entry.tag)))?;
        if entry.payload.kind() != kind {
            return Err(TheoristError::stream(format!(
                "tag {} announces {} but payload is {}",
                entry.tag,
                kind,
                entry.payload.kind()
            )));
        }
        table.insert(entry.id, Rc::new(entry.payload.clone()))?;
    }
    Ok(())
}

fn resolve_links(table: &ObjectPointerTable) -> Result<(), TheoristError> {
    for subtheory in table.values() {
        subtheory.resolve_links(table)?;
    }
    Ok(())
}

fn build_beam(record: BeamRecord, table: &ObjectPointerTable) -> Result<Beam, TheoristError> {
    let width = record.width as usize;
    if width == 0 || width > MAX_BEAM_WIDTH {
        return Err(TheoristError::stream(format!("invalid beam width {}", width)));
    }
    if record.theories.len() != record.theory_count as usize {
        return Err(TheoristError::stream(format!(
            "declared {} theories but found {}",
            record.theory_count,
            record.theories.len()
        )));
    }
    if record.theories.len() > width {
        return Err(TheoristError::stream(format!(
            "{} theories exceed beam width {}",
            record.theories.len(),
            width
        )));
    }

    let theories = record
        .theories
        .into_iter()
        .map(|theory| build_theory(theory, table))
        .collect::<Result<Vec<_>, _>>()?;
    if theories.windows(2).any(|pair| pair[0].score() < pair[1].score()) {
        return Err(TheoristError::stream("theories out of score order"));
    }
    Ok(Beam::from_sorted(record.sentence_index as usize, width, theories))
}

fn build_theory(record: TheoryRecord, table: &ObjectPointerTable) -> Result<Theory, TheoristError> {
    if record.slots.len() != SubtheoryType::COUNT {
        return Err(TheoristError::stream(format!(
            "theory declares {} slots, expected {}",
            record.slots.len(),
            SubtheoryType::COUNT
        )));
    }
    let mut slots = BTreeMap::new();
    for (kind, token) in SubtheoryType::ALL.iter().zip(record.slots) {
        let Some(id) = token else {
            continue;
        };
        slots.insert(*kind, lookup_slot(*kind, id, table)?);
    }
    Ok(Theory::from_parts(record.doc_id, record.primary_parse, slots))
}

fn lookup_slot(
    kind: SubtheoryType,
    id: ObjectId,
    table: &ObjectPointerTable,
) -> Result<Rc<Subtheory>, TheoristError> {
    let subtheory = table
        .get(id)
        .ok_or_else(|| TheoristError::stream(format!("unresolved pointer token {}", id)))?;
    if subtheory.kind() != kind {
        return Err(TheoristError::stream(format!(
            "{} slot points at a {} subtheory",
            kind,
            subtheory.kind()
        )));
    }
    Ok(Rc::clone(subtheory))
}

// =============================================================================
// CRYPTOGRAPHIC HASH (Optional)
// =============================================================================

/// BLAKE3 hex digest (64 characters) of a state stream.
///
/// Available with the `crypto-hash` feature.
#[cfg(feature = "crypto-hash")]
#[must_use]
pub fn state_crypto_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subtheory::{Parse, TokenSequence};
    use crate::Score;

    /// A beam of two forks sharing tokens, each with its own parse.
    fn shared_beam() -> Beam {
        let mut base = Theory::new("doc");
        base.adopt_subtheory(
            SubtheoryType::Tokens,
            Rc::new(Subtheory::Tokens(TokenSequence::from_words(0, &["a", "b"]))),
        )
        .expect("tokens");

        let mut beam = Beam::new(0, 4);
        for units in [3, 5] {
            let mut fork = base.fork();
            let parse = Subtheory::Parse(Parse {
                tokens: fork.link_to(SubtheoryType::Tokens),
                tree: format!("(S {})", units),
                score: Score::from_units(units),
            });
            fork.adopt_subtheory(SubtheoryType::Parse, Rc::new(parse))
                .expect("parse");
            beam.add_theory(fork);
        }
        beam
    }

    #[test]
    fn beam_roundtrip_preserves_sharing() {
        let beam = shared_beam();
        let bytes = save_beam(&beam).expect("save");
        let loaded = load_beam(&bytes).expect("load");

        assert_eq!(loaded.scores(), beam.scores());
        let first = loaded.theory(0).expect("first");
        let second = loaded.theory(1).expect("second");
        let tokens = first.get_subtheory(SubtheoryType::Tokens).expect("tokens");
        assert!(Rc::ptr_eq(
            tokens,
            second.get_subtheory(SubtheoryType::Tokens).expect("tokens")
        ));
        assert_eq!(Rc::strong_count(tokens), 2);

        let parse = first.get_subtheory(SubtheoryType::Parse).expect("parse");
        assert!(parse.links()[0].points_to(tokens));
    }

    #[test]
    fn beam_bytes_roundtrip_bit_exact() {
        let bytes1 = save_beam(&shared_beam()).expect("first save");
        let bytes2 = save_beam(&load_beam(&bytes1).expect("load")).expect("second save");
        assert_eq!(
            bytes1, bytes2,
            "save -> load -> save must produce identical bytes"
        );
    }

    #[test]
    fn invalid_magic_rejected() {
        let mut bytes = save_beam(&shared_beam()).expect("save");
        // Magic is the first field after the length prefix.
        bytes[HEADER_LEN_BYTES] ^= 0xFF;
        assert!(matches!(
            load_beam(&bytes),
            Err(TheoristError::StreamFormat(_))
        ));
    }

    #[test]
    fn corrupted_payload_rejected_by_checksum() {
        let mut bytes = save_beam(&shared_beam()).expect("save");
        if let Some(last) = bytes.last_mut() {
            *last ^= 0x01;
        }
        assert!(matches!(
            load_beam(&bytes),
            Err(TheoristError::StreamFormat(_))
        ));
    }

    #[test]
    fn kind_mismatch_rejected() {
        let bytes = save_beam(&shared_beam()).expect("save");
        assert!(load_document(&bytes).is_err());
    }

    #[test]
    fn truncated_stream_rejected() {
        assert!(load_beam(&[1, 0]).is_err());
        assert!(load_beam(&[200, 0, 0, 0, 1]).is_err());
    }

    #[test]
    fn declared_subtheory_count_checked() {
        let beam = shared_beam();
        let bytes = save_beam(&beam).expect("save");
        let mut record: BeamRecord = decode_state(&bytes, StateKind::Beam).expect("decode");
        record.subtheory_count = record.subtheory_count.saturating_add(1);
        let tampered = encode_state(StateKind::Beam, &record).expect("encode");
        assert!(matches!(
            load_beam(&tampered),
            Err(TheoristError::StreamFormat(_))
        ));
    }

    #[test]
    fn unresolved_token_rejected() {
        let bytes = save_beam(&shared_beam()).expect("save");
        let mut record: BeamRecord = decode_state(&bytes, StateKind::Beam).expect("decode");
        record.theories[0].slots[0] = Some(ObjectId(999));
        let tampered = encode_state(StateKind::Beam, &record).expect("encode");
        let err = load_beam(&tampered).expect_err("dangling token");
        assert!(err.to_string().contains("unresolved pointer token"));
    }

    #[test]
    fn unknown_tag_rejected() {
        let bytes = save_beam(&shared_beam()).expect("save");
        let mut record: BeamRecord = decode_state(&bytes, StateKind::Beam).expect("decode");
        record.subtheories[0].tag = 200;
        let tampered = encode_state(StateKind::Beam, &record).expect("encode");
        let err = load_beam(&tampered).expect_err("unknown tag");
        assert!(err.to_string().contains("unknown subtheory tag"));
    }

    #[cfg(feature = "crypto-hash")]
    #[test]
    fn crypto_hash_is_stable() {
        let bytes = save_beam(&shared_beam()).expect("save");
        let hash = state_crypto_hash(&bytes);
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, state_crypto_hash(&bytes));
    }
}
