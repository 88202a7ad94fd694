//! # redb-backed State Store
//!
//! A disk-backed [`StateStore`] using the redb embedded database:
//! - ACID transactions (one per operation)
//! - Crash safety (copy-on-write B-trees)
//! - Zero configuration
//!
//! Keys are `(doc_id, stage index, sentence)` tuples; whole-document
//! streams use [`DOCUMENT_SCOPE`] in the sentence position.

use super::{StateKey, StateStore};
use crate::primitives::MAX_SENTENCE_COUNT;
use crate::system::Stage;
use crate::TheoristError;
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::Path;

/// Table for state streams: (doc_id, stage index, sentence) -> stream bytes
const STATES: TableDefinition<(&str, u8, u32), &[u8]> = TableDefinition::new("states");

/// Sentence position used for whole-document streams.
pub const DOCUMENT_SCOPE: u32 = u32::MAX;

fn io_error(e: impl std::fmt::Display) -> TheoristError {
    TheoristError::IoError(e.to_string())
}

/// A disk-backed state store.
pub struct RedbStateStore {
    db: Database,
}

impl std::fmt::Debug for RedbStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStateStore").finish_non_exhaustive()
    }
}

impl RedbStateStore {
    /// Open or create a state database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TheoristError> {
        let db = Database::create(path.as_ref()).map_err(io_error)?;

        // Initialize the table if it doesn't exist
        {
            let write_txn = db.begin_write().map_err(io_error)?;
            let _ = write_txn.open_table(STATES).map_err(io_error)?;
            write_txn.commit().map_err(io_error)?;
        }

        Ok(Self { db })
    }

    /// Number of stored streams.
    pub fn len(&self) -> Result<usize, TheoristError> {
        let read_txn = self.db.begin_read().map_err(io_error)?;
        let table = read_txn.open_table(STATES).map_err(io_error)?;
        Ok(table.len().map_err(io_error)? as usize)
    }

    /// Whether the store holds no streams.
    pub fn is_empty(&self) -> Result<bool, TheoristError> {
        Ok(self.len()? == 0)
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<(), TheoristError> {
        self.db.compact().map_err(io_error)?;
        Ok(())
    }
}

fn encode_key(key: &StateKey) -> Result<(&str, u8, u32), TheoristError> {
    let stage = u8::try_from(key.stage.index())
        .map_err(|_| TheoristError::IoError(format!("stage index out of range: {}", key.stage)))?;
    let sentence = match key.sentence {
        Some(sentence) if sentence >= MAX_SENTENCE_COUNT => {
            return Err(TheoristError::SentenceOutOfRange(sentence as usize));
        }
        Some(sentence) => sentence,
        None => DOCUMENT_SCOPE,
    };
    Ok((key.doc_id.as_str(), stage, sentence))
}

fn decode_key(doc_id: &str, stage: u8, sentence: u32) -> Result<StateKey, TheoristError> {
    let stage = Stage::from_index(stage as usize)
        .ok_or_else(|| TheoristError::IoError(format!("unknown stage index {}", stage)))?;
    Ok(StateKey {
        doc_id: doc_id.to_string(),
        stage,
        sentence: (sentence != DOCUMENT_SCOPE).then_some(sentence),
    })
}

// =============================================================================
// STATESTORE TRAIT IMPLEMENTATION
// =============================================================================

impl StateStore for RedbStateStore {
    fn put(&mut self, key: &StateKey, bytes: &[u8]) -> Result<(), TheoristError> {
        let encoded = encode_key(key)?;
        let write_txn = self.db.begin_write().map_err(io_error)?;
        {
            let mut table = write_txn.open_table(STATES).map_err(io_error)?;
            table.insert(encoded, bytes).map_err(io_error)?;
        }
        write_txn.commit().map_err(io_error)?;
        Ok(())
    }

    fn get(&self, key: &StateKey) -> Result<Option<Vec<u8>>, TheoristError> {
        let encoded = encode_key(key)?;
        let read_txn = self.db.begin_read().map_err(io_error)?;
        let table = read_txn.open_table(STATES).map_err(io_error)?;
        Ok(table
            .get(encoded)
            .map_err(io_error)?
            .map(|value| value.value().to_vec()))
    }

    fn remove(&mut self, key: &StateKey) -> Result<bool, TheoristError> {
        let encoded = encode_key(key)?;
        let write_txn = self.db.begin_write().map_err(io_error)?;
        let existed = {
            let mut table = write_txn.open_table(STATES).map_err(io_error)?;
            table.remove(encoded).map_err(io_error)?.is_some()
        };
        write_txn.commit().map_err(io_error)?;
        Ok(existed)
    }

    fn keys(&self) -> Result<Vec<StateKey>, TheoristError> {
        let read_txn = self.db.begin_read().map_err(io_error)?;
        let table = read_txn.open_table(STATES).map_err(io_error)?;

        let mut keys = Vec::new();
        for entry in table.iter().map_err(io_error)? {
            let (key, _) = entry.map_err(io_error)?;
            let (doc_id, stage, sentence) = key.value();
            keys.push(decode_key(doc_id, stage, sentence)?);
        }
        Ok(keys)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn put_get_remove() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStateStore::open(temp.path().join("state.redb")).expect("open db");

        let key = StateKey::beam("doc", Stage::Parse, 2);
        store.put(&key, b"stream").expect("put");
        assert_eq!(store.get(&key).expect("get"), Some(b"stream".to_vec()));
        assert_eq!(store.len().expect("len"), 1);

        assert!(store.remove(&key).expect("remove"));
        assert_eq!(store.get(&key).expect("get"), None);
        assert!(store.is_empty().expect("empty"));
    }

    #[test]
    fn document_scope_keys_roundtrip() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStateStore::open(temp.path().join("state.redb")).expect("open db");

        let doc_key = StateKey::document("doc", Stage::Events);
        let beam_key = StateKey::beam("doc", Stage::Events, 0);
        store.put(&doc_key, b"d").expect("put");
        store.put(&beam_key, b"b").expect("put");

        let keys = store.keys().expect("keys");
        assert_eq!(keys, vec![beam_key, doc_key]);
    }

    #[test]
    fn sentence_beyond_limit_rejected() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStateStore::open(temp.path().join("state.redb")).expect("open db");
        let key = StateKey::beam("doc", Stage::Tokens, DOCUMENT_SCOPE);
        assert!(store.put(&key, b"x").is_err());
    }

    #[test]
    fn recovery_persistence_after_reopen() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("state.redb");

        // Phase 1: write and drop, simulating process exit
        {
            let mut store = RedbStateStore::open(&db_path).expect("open db");
            store
                .put(&StateKey::beam("doc", Stage::Names, 0), b"zero")
                .expect("put");
            store
                .put(&StateKey::beam("doc", Stage::Names, 1), b"one")
                .expect("put");
        }

        // Phase 2: reopen and verify
        {
            let store = RedbStateStore::open(&db_path).expect("reopen db");
            assert_eq!(store.len().expect("len"), 2);
            assert_eq!(
                store
                    .get(&StateKey::beam("doc", Stage::Names, 1))
                    .expect("get"),
                Some(b"one".to_vec())
            );
        }
    }
}
