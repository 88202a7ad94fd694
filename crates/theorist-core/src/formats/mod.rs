//! # State Stream Formats
//!
//! Binary, identity-preserving serialization of beams and documents.
//!
//! Streams are pure byte vectors; where they are kept (files, the redb
//! state store) is decided elsewhere.

mod identity;
mod persistence;
mod records;

pub use identity::{ObjectIdTable, ObjectPointerTable};
#[cfg(feature = "crypto-hash")]
pub use persistence::state_crypto_hash;
pub use persistence::{
    decode_state, encode_state, load_beam, load_document, read_header, save_beam, save_document,
};
pub use records::{
    payload_checksum, BeamRecord, DocumentRecord, StateHeader, StateKind, SubtheoryRecord,
    TheoryRecord,
};
