//! # Identity Tables
//!
//! Save-time and load-time indirection between subtheory instances and the
//! pointer tokens written to a state stream.
//!
//! The save side keys instances by address. Every registered instance is
//! also held by the table, so no address can be freed and reused by a new
//! instance while a save is in progress.

use crate::subtheory::Subtheory;
use crate::{ObjectId, TheoristError};
use std::collections::BTreeMap;
use std::rc::Rc;

/// Instance → token, built during the identity pass of a save.
#[derive(Debug, Default)]
pub struct ObjectIdTable {
    ids: BTreeMap<*const Subtheory, ObjectId>,
    held: Vec<Rc<Subtheory>>,
}

impl ObjectIdTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the next sequential token to an instance.
    ///
    /// Registering an instance twice means the traversal visited it twice
    /// and is rejected.
    pub fn register(&mut self, subtheory: &Rc<Subtheory>) -> Result<ObjectId, TheoristError> {
        let key = Rc::as_ptr(subtheory);
        if let Some(existing) = self.ids.get(&key) {
            return Err(TheoristError::stream(format!(
                "{} instance registered twice (already {})",
                subtheory.kind(),
                existing
            )));
        }
        let id = ObjectId(u32::try_from(self.held.len()).map_err(|_| {
            TheoristError::stream("object id space exhausted")
        })?);
        self.ids.insert(key, id);
        self.held.push(Rc::clone(subtheory));
        Ok(id)
    }

    /// The token of a registered instance.
    #[must_use]
    pub fn lookup(&self, subtheory: &Rc<Subtheory>) -> Option<ObjectId> {
        self.ids.get(&Rc::as_ptr(subtheory)).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.held.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

/// Token → rebuilt instance, filled during the reconstruction pass of a load.
#[derive(Debug, Default)]
pub struct ObjectPointerTable {
    instances: BTreeMap<ObjectId, Rc<Subtheory>>,
}

impl ObjectPointerTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a rebuilt instance. Duplicate tokens are a format error.
    pub fn insert(&mut self, id: ObjectId, subtheory: Rc<Subtheory>) -> Result<(), TheoristError> {
        if self.instances.contains_key(&id) {
            return Err(TheoristError::stream(format!("duplicate object id {}", id)));
        }
        self.instances.insert(id, subtheory);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, id: ObjectId) -> Option<&Rc<Subtheory>> {
        self.instances.get(&id)
    }

    /// Every rebuilt instance, in token order.
    pub fn values(&self) -> impl Iterator<Item = &Rc<Subtheory>> {
        self.instances.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subtheory::TokenSequence;

    fn instance() -> Rc<Subtheory> {
        Rc::new(Subtheory::Tokens(TokenSequence::new(0)))
    }

    #[test]
    fn ids_are_sequential() {
        let mut table = ObjectIdTable::new();
        let a = instance();
        let b = instance();
        assert_eq!(table.register(&a).expect("a"), ObjectId(0));
        assert_eq!(table.register(&b).expect("b"), ObjectId(1));
        assert_eq!(table.lookup(&b), Some(ObjectId(1)));
        assert_eq!(table.lookup(&instance()), None);
    }

    #[test]
    fn double_registration_rejected() {
        let mut table = ObjectIdTable::new();
        let a = instance();
        table.register(&a).expect("first");
        assert!(matches!(
            table.register(&a),
            Err(TheoristError::StreamFormat(_))
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn duplicate_token_rejected() {
        let mut table = ObjectPointerTable::new();
        table.insert(ObjectId(0), instance()).expect("first");
        assert!(table.insert(ObjectId(0), instance()).is_err());
    }
}
