//! # Theory
//!
//! One hypothesis for a sentence: a slot per [`SubtheoryType`], each empty
//! or holding a shared [`Subtheory`].
//!
//! ## Ownership
//!
//! Slots hold `Rc<Subtheory>`. Cloning a theory is the *fork*: every slot
//! pointer is copied and every populated slot's strong count goes up by one.
//! Dropping a theory releases every slot; an instance is destroyed exactly
//! when the last slot pointing at it goes away.
//!
//! ## Integrity Rules
//!
//! [`Theory::adopt_subtheory`] refuses, and leaves the theory untouched, when
//! - the subtheory's type differs from the slot's type,
//! - the tokens slot would change while a token-dependent layer is set,
//! - the parse slot would change while a parse-dependent layer is set.

use crate::subtheory::{
    EntitySet, EventMentionSet, MentionSet, Parse, PropositionSet, Subtheory, SubtheoryRef,
    TokenSequence,
};
use crate::{IntegrityRule, Score, SubtheoryType, TheoristError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::rc::Rc;

/// Layers that hold token offsets.
const TOKEN_DEPENDENTS: [SubtheoryType; 6] = [
    SubtheoryType::PartOfSpeech,
    SubtheoryType::Names,
    SubtheoryType::Values,
    SubtheoryType::NpChunk,
    SubtheoryType::DependencyParse,
    SubtheoryType::Parse,
];

/// Layers built against the parse.
const PARSE_DEPENDENTS: [SubtheoryType; 3] = [
    SubtheoryType::Mentions,
    SubtheoryType::Propositions,
    SubtheoryType::Events,
];

/// Which parse the mention layer is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PrimaryParse {
    #[default]
    Full,
    NpChunk,
    Dependency,
}

impl PrimaryParse {
    /// The slot holding this parse.
    #[must_use]
    pub fn slot(self) -> SubtheoryType {
        match self {
            PrimaryParse::Full => SubtheoryType::Parse,
            PrimaryParse::NpChunk => SubtheoryType::NpChunk,
            PrimaryParse::Dependency => SubtheoryType::DependencyParse,
        }
    }
}

// =============================================================================
// THEORY
// =============================================================================

/// One sentence hypothesis.
///
/// `Clone` is the fork operation.
#[derive(Debug, Clone)]
pub struct Theory {
    doc_id: String,
    primary_parse: PrimaryParse,
    slots: BTreeMap<SubtheoryType, Rc<Subtheory>>,
}

impl Theory {
    /// A theory with every slot empty.
    #[must_use]
    pub fn new(doc_id: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            primary_parse: PrimaryParse::default(),
            slots: BTreeMap::new(),
        }
    }

    pub(crate) fn from_parts(
        doc_id: String,
        primary_parse: PrimaryParse,
        slots: BTreeMap<SubtheoryType, Rc<Subtheory>>,
    ) -> Self {
        Self {
            doc_id,
            primary_parse,
            slots,
        }
    }

    /// Select the primary parse (builder style).
    #[must_use]
    pub fn with_primary_parse(mut self, primary_parse: PrimaryParse) -> Self {
        self.primary_parse = primary_parse;
        self
    }

    #[must_use]
    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    #[must_use]
    pub fn primary_parse(&self) -> PrimaryParse {
        self.primary_parse
    }

    /// Shallow copy sharing every populated slot.
    #[must_use]
    pub fn fork(&self) -> Self {
        self.clone()
    }

    /// Saturating sum of the populated slots' scores.
    #[must_use]
    pub fn score(&self) -> Score {
        self.slots.values().map(|s| s.score()).sum()
    }

    // =========================================================================
    // SLOT ACCESS
    // =========================================================================

    /// The occupant of a slot, if any.
    #[must_use]
    pub fn get_subtheory(&self, kind: SubtheoryType) -> Option<&Rc<Subtheory>> {
        self.slots.get(&kind)
    }

    /// Populated slots in stage order.
    pub fn slots(&self) -> impl Iterator<Item = (SubtheoryType, &Rc<Subtheory>)> {
        self.slots.iter().map(|(k, v)| (*k, v))
    }

    /// Types of the populated slots, in stage order.
    #[must_use]
    pub fn populated(&self) -> Vec<SubtheoryType> {
        self.slots.keys().copied().collect()
    }

    /// The slot selected by the primary-parse setting.
    #[must_use]
    pub fn primary_parse_subtheory(&self) -> Option<&Rc<Subtheory>> {
        self.get_subtheory(self.primary_parse.slot())
    }

    #[must_use]
    pub fn tokens(&self) -> Option<&TokenSequence> {
        self.get_subtheory(SubtheoryType::Tokens)
            .and_then(|s| s.as_tokens())
    }

    #[must_use]
    pub fn parse(&self) -> Option<&Parse> {
        self.get_subtheory(SubtheoryType::Parse)
            .and_then(|s| s.as_parse())
    }

    #[must_use]
    pub fn mentions(&self) -> Option<&MentionSet> {
        self.get_subtheory(SubtheoryType::Mentions)
            .and_then(|s| s.as_mentions())
    }

    #[must_use]
    pub fn propositions(&self) -> Option<&PropositionSet> {
        self.get_subtheory(SubtheoryType::Propositions)
            .and_then(|s| s.as_propositions())
    }

    #[must_use]
    pub fn entities(&self) -> Option<&EntitySet> {
        self.get_subtheory(SubtheoryType::Entities)
            .and_then(|s| s.as_entities())
    }

    #[must_use]
    pub fn events(&self) -> Option<&EventMentionSet> {
        self.get_subtheory(SubtheoryType::Events)
            .and_then(|s| s.as_events())
    }

    // =========================================================================
    // ADOPTION
    // =========================================================================

    /// Install `subtheory` in the `kind` slot, releasing the previous occupant.
    ///
    /// Adopting the instance already in the slot is a no-op. When the mention
    /// set (or any other layer) is replaced, every layer linking to the
    /// old instance is copied, re-linked to the new one, and the copy is
    /// installed; theories sharing the old dependents keep them unchanged.
    pub fn adopt_subtheory(
        &mut self,
        kind: SubtheoryType,
        subtheory: Rc<Subtheory>,
    ) -> Result<(), TheoristError> {
        let actual = subtheory.kind();
        if actual != kind {
            return Err(TheoristError::structural(IntegrityRule::KindMismatch {
                slot: kind,
                actual,
            }));
        }

        if self
            .slots
            .get(&kind)
            .is_some_and(|current| Rc::ptr_eq(current, &subtheory))
        {
            return Ok(());
        }

        if kind == SubtheoryType::Tokens
            && let Some(blocking) = self.first_set(&TOKEN_DEPENDENTS)
        {
            return Err(TheoristError::structural(IntegrityRule::TokensLocked {
                blocking,
            }));
        }

        if kind == SubtheoryType::Parse
            && let Some(blocking) = self.first_set(&PARSE_DEPENDENTS)
        {
            return Err(TheoristError::structural(IntegrityRule::ParseLocked {
                blocking,
            }));
        }

        if let Some(previous) = self.slots.insert(kind, Rc::clone(&subtheory)) {
            self.relink_dependents(kind, previous, subtheory);
        }
        Ok(())
    }

    /// Copy-on-write re-link of every slot that points at a replaced instance.
    ///
    /// Links may run backwards in stage order (mentions built on the
    /// dependency parse), so all slots are rescanned until none is stale.
    fn relink_dependents(
        &mut self,
        kind: SubtheoryType,
        previous: Rc<Subtheory>,
        replacement: Rc<Subtheory>,
    ) {
        let mut replaced = vec![(previous, replacement)];
        loop {
            let stale = self.slots.iter().find_map(|(slot, current)| {
                let points_at_old = current
                    .links()
                    .iter()
                    .any(|link| replaced.iter().any(|(old, _)| link.points_to(old)));
                (*slot != kind && points_at_old).then_some(*slot)
            });
            let Some(dependent) = stale else {
                break;
            };
            let Some(current) = self.slots.get(&dependent) else {
                break;
            };

            let mut copy = Subtheory::clone(current);
            for link in copy.links_mut() {
                if let Some((_, new)) = replaced.iter().find(|(old, _)| link.points_to(old)) {
                    link.retarget(new);
                }
            }
            let copy = Rc::new(copy);
            if let Some(old) = self.slots.insert(dependent, Rc::clone(&copy)) {
                replaced.push((old, copy));
            }
        }
    }

    fn first_set(&self, kinds: &[SubtheoryType]) -> Option<SubtheoryType> {
        kinds.iter().copied().find(|k| self.slots.contains_key(k))
    }

    /// Check that the populated slots form a prefix of stage order.
    pub fn verify_stage_prefix(&self) -> Result<(), TheoristError> {
        let mut missing = None;
        for kind in SubtheoryType::ALL {
            match (self.slots.contains_key(&kind), missing) {
                (false, None) => missing = Some(kind),
                (true, Some(missing)) => {
                    return Err(TheoristError::structural(IntegrityRule::StagePrefix {
                        missing,
                        present: kind,
                    }));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// A link to the current occupant of a slot (null if empty).
    #[must_use]
    pub fn link_to(&self, kind: SubtheoryType) -> SubtheoryRef {
        SubtheoryRef::to_slot(self.get_subtheory(kind))
    }
}

// =============================================================================
// TESTS
// =============================================================================
