//! # Subtheories
//!
//! One stage's typed output for one sentence hypothesis.
//!
//! A [`Subtheory`] is shared between theories through `Rc`: the strong
//! count of an instance is exactly the number of theory slots pointing at
//! it, so the last theory to release it destroys it. Once shared, a
//! subtheory is never mutated; stages that need to change one install a
//! modified copy through [`Theory::adopt_subtheory`](crate::Theory::adopt_subtheory).
//!
//! Subtheories may refer to earlier layers (a parse refers to its token
//! sequence, a proposition set to its mention set) through
//! [`SubtheoryRef`]. These links are weak: they never keep their target
//! alive and can never form an ownership cycle.

mod lexical;
mod semantic;
mod syntax;

pub use lexical::{
    NameSpan, NameTheory, NestedNameTheory, PosSequence, Token, TokenSequence, ValueMention,
    ValueMentionSet,
};
pub use semantic::{
    ActorMention, ActorMentionSet, Argument, Entity, EntitySet, EventMention, EventMentionSet,
    Mention, MentionSet, MentionType, Proposition, PropositionSet, RelMention, RelMentionSet,
    ValueArgument,
};
pub use syntax::{NpChunk, NpChunkTheory, Parse};

use crate::formats::{ObjectIdTable, ObjectPointerTable};
use crate::theory::Theory;
use crate::{ObjectId, Score, SubtheoryType, TheoristError};
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::rc::{Rc, Weak};

// =============================================================================
// SUBTHEORY REFERENCE
// =============================================================================

/// Non-owning link from one subtheory to another.
///
/// At runtime the link holds a weak handle. In a state stream it is written
/// as the target's pointer token; after loading it holds only the token
/// until the resolution pass installs the handle.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(from = "Option<ObjectId>", into = "Option<ObjectId>")]
pub struct SubtheoryRef {
    token: Option<ObjectId>,
    target: OnceCell<Weak<Subtheory>>,
}

impl SubtheoryRef {
    /// Link to a live subtheory.
    #[must_use]
    pub fn to(target: &Rc<Subtheory>) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(Rc::downgrade(target));
        Self {
            token: None,
            target: cell,
        }
    }

    /// A link to nothing.
    #[must_use]
    pub fn null() -> Self {
        Self::default()
    }

    /// Link to whatever a theory slot currently holds (null if empty).
    #[must_use]
    pub fn to_slot(slot: Option<&Rc<Subtheory>>) -> Self {
        slot.map(Self::to).unwrap_or_default()
    }

    /// The target, if it is resolved and still alive.
    #[must_use]
    pub fn get(&self) -> Option<Rc<Subtheory>> {
        self.target.get().and_then(Weak::upgrade)
    }

    /// Whether this link designates `other` (by identity).
    #[must_use]
    pub fn points_to(&self, other: &Rc<Subtheory>) -> bool {
        self.target
            .get()
            .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), Rc::as_ptr(other)))
    }

    /// Whether the link designates nothing at all.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.token.is_none() && self.target.get().is_none()
    }

    /// Whether the runtime handle is installed.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.target.get().is_some()
    }

    /// The pointer token read from (or bound for) a state stream.
    #[must_use]
    pub fn token(&self) -> Option<ObjectId> {
        self.token
    }

    /// Point this link at a different instance.
    pub fn retarget(&mut self, target: &Rc<Subtheory>) {
        *self = Self::to(target);
    }

    /// Replace the runtime handle with the target's pointer token.
    ///
    /// A dead target is written as a null link: there is no instance left
    /// whose identity could be preserved. A live target that was never
    /// registered is an error, since it would not survive a reload.
    pub(crate) fn bind(&mut self, ids: &ObjectIdTable) -> Result<(), TheoristError> {
        self.token = match self.get() {
            Some(target) => Some(ids.lookup(&target).ok_or_else(|| {
                TheoristError::stream(format!(
                    "{} link targets an instance outside the saved graph",
                    target.kind()
                ))
            })?),
            None => None,
        };
        Ok(())
    }

    /// Install the runtime handle for a token read from a stream.
    pub(crate) fn resolve(&self, table: &ObjectPointerTable) -> Result<(), TheoristError> {
        if self.target.get().is_some() {
            return Ok(());
        }
        if let Some(id) = self.token {
            let target = table
                .get(id)
                .ok_or_else(|| TheoristError::stream(format!("unresolved pointer token {}", id)))?;
            let _ = self.target.set(Rc::downgrade(target));
        }
        Ok(())
    }
}

impl From<Option<ObjectId>> for SubtheoryRef {
    fn from(token: Option<ObjectId>) -> Self {
        Self {
            token,
            target: OnceCell::new(),
        }
    }
}

impl From<SubtheoryRef> for Option<ObjectId> {
    fn from(link: SubtheoryRef) -> Self {
        link.token
    }
}

impl std::fmt::Debug for SubtheoryRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubtheoryRef")
            .field("token", &self.token)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

// =============================================================================
// SUBTHEORY
// =============================================================================

/// A typed annotation layer for one sentence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Subtheory {
    Tokens(TokenSequence),
    PartOfSpeech(PosSequence),
    Names(NameTheory),
    NestedNames(NestedNameTheory),
    Values(ValueMentionSet),
    NpChunk(NpChunkTheory),
    Parse(Parse),
    Mentions(MentionSet),
    Propositions(PropositionSet),
    Entities(EntitySet),
    Relations(RelMentionSet),
    Events(EventMentionSet),
    DependencyParse(Parse),
    ActorMentions(ActorMentionSet),
}

impl Subtheory {
    /// The slot type this subtheory fills.
    #[must_use]
    pub fn kind(&self) -> SubtheoryType {
        match self {
            Subtheory::Tokens(_) => SubtheoryType::Tokens,
            Subtheory::PartOfSpeech(_) => SubtheoryType::PartOfSpeech,
            Subtheory::Names(_) => SubtheoryType::Names,
            Subtheory::NestedNames(_) => SubtheoryType::NestedNames,
            Subtheory::Values(_) => SubtheoryType::Values,
            Subtheory::NpChunk(_) => SubtheoryType::NpChunk,
            Subtheory::Parse(_) => SubtheoryType::Parse,
            Subtheory::Mentions(_) => SubtheoryType::Mentions,
            Subtheory::Propositions(_) => SubtheoryType::Propositions,
            Subtheory::Entities(_) => SubtheoryType::Entities,
            Subtheory::Relations(_) => SubtheoryType::Relations,
            Subtheory::Events(_) => SubtheoryType::Events,
            Subtheory::DependencyParse(_) => SubtheoryType::DependencyParse,
            Subtheory::ActorMentions(_) => SubtheoryType::ActorMentions,
        }
    }

    /// This layer's contribution to a theory score.
    #[must_use]
    pub fn score(&self) -> Score {
        match self {
            Subtheory::Tokens(t) => t.score,
            Subtheory::PartOfSpeech(p) => p.score,
            Subtheory::Names(n) => n.score,
            Subtheory::NestedNames(n) => n.score,
            Subtheory::Values(v) => v.score,
            Subtheory::NpChunk(c) => c.score,
            Subtheory::Parse(p) | Subtheory::DependencyParse(p) => p.score,
            Subtheory::Mentions(m) => m.score(),
            Subtheory::Propositions(_) | Subtheory::ActorMentions(_) => Score::ZERO,
            Subtheory::Entities(e) => e.score,
            Subtheory::Relations(r) => r.score,
            Subtheory::Events(e) => e.score,
        }
    }

    /// Every outgoing link, in declaration order.
    #[must_use]
    pub fn links(&self) -> Vec<&SubtheoryRef> {
        match self {
            Subtheory::Tokens(_) => Vec::new(),
            Subtheory::PartOfSpeech(p) => vec![&p.tokens],
            Subtheory::Names(n) => vec![&n.tokens],
            Subtheory::NestedNames(n) => vec![&n.parent],
            Subtheory::Values(v) => vec![&v.tokens],
            Subtheory::NpChunk(c) => vec![&c.tokens],
            Subtheory::Parse(p) | Subtheory::DependencyParse(p) => vec![&p.tokens],
            Subtheory::Mentions(m) => vec![&m.parse],
            Subtheory::Propositions(p) => vec![&p.mentions],
            Subtheory::Entities(e) => vec![&e.mentions],
            Subtheory::Relations(r) => vec![&r.mentions],
            Subtheory::Events(e) => vec![&e.mentions, &e.values],
            Subtheory::ActorMentions(a) => vec![&a.mentions],
        }
    }

    /// Every outgoing link, mutably.
    pub fn links_mut(&mut self) -> Vec<&mut SubtheoryRef> {
        match self {
            Subtheory::Tokens(_) => Vec::new(),
            Subtheory::PartOfSpeech(p) => vec![&mut p.tokens],
            Subtheory::Names(n) => vec![&mut n.tokens],
            Subtheory::NestedNames(n) => vec![&mut n.parent],
            Subtheory::Values(v) => vec![&mut v.tokens],
            Subtheory::NpChunk(c) => vec![&mut c.tokens],
            Subtheory::Parse(p) | Subtheory::DependencyParse(p) => vec![&mut p.tokens],
            Subtheory::Mentions(m) => vec![&mut m.parse],
            Subtheory::Propositions(p) => vec![&mut p.mentions],
            Subtheory::Entities(e) => vec![&mut e.mentions],
            Subtheory::Relations(r) => vec![&mut r.mentions],
            Subtheory::Events(e) => vec![&mut e.mentions, &mut e.values],
            Subtheory::ActorMentions(a) => vec![&mut a.mentions],
        }
    }

    /// The canonical empty layer substituted for a skipped stage.
    ///
    /// Links are wired to whatever the theory already holds, so an empty
    /// layer is structurally indistinguishable from a real one that found
    /// nothing.
    #[must_use]
    pub fn empty(kind: SubtheoryType, sentence: usize, theory: &Theory) -> Self {
        let tokens = || SubtheoryRef::to_slot(theory.get_subtheory(SubtheoryType::Tokens));
        let mentions = || SubtheoryRef::to_slot(theory.get_subtheory(SubtheoryType::Mentions));
        match kind {
            SubtheoryType::Tokens => Subtheory::Tokens(TokenSequence::new(sentence as u32)),
            SubtheoryType::PartOfSpeech => Subtheory::PartOfSpeech(PosSequence {
                tokens: tokens(),
                tags: Vec::new(),
                score: Score::ZERO,
            }),
            SubtheoryType::Names => Subtheory::Names(NameTheory {
                tokens: tokens(),
                names: Vec::new(),
                score: Score::ZERO,
            }),
            SubtheoryType::NestedNames => Subtheory::NestedNames(NestedNameTheory {
                parent: SubtheoryRef::to_slot(theory.get_subtheory(SubtheoryType::Names)),
                names: Vec::new(),
                score: Score::ZERO,
            }),
            SubtheoryType::Values => Subtheory::Values(ValueMentionSet {
                tokens: tokens(),
                values: Vec::new(),
                score: Score::ZERO,
            }),
            SubtheoryType::NpChunk => Subtheory::NpChunk(NpChunkTheory {
                tokens: tokens(),
                chunks: Vec::new(),
                score: Score::ZERO,
            }),
            SubtheoryType::Parse => Subtheory::Parse(Parse::flat(tokens())),
            SubtheoryType::Mentions => Subtheory::Mentions(MentionSet {
                parse: SubtheoryRef::to_slot(theory.primary_parse_subtheory()),
                mentions: Vec::new(),
                name_score: Score::ZERO,
                desc_score: Score::ZERO,
            }),
            SubtheoryType::Propositions => Subtheory::Propositions(PropositionSet {
                mentions: mentions(),
                propositions: Vec::new(),
            }),
            SubtheoryType::Entities => Subtheory::Entities(EntitySet {
                mentions: mentions(),
                entities: Vec::new(),
                score: Score::ZERO,
            }),
            SubtheoryType::Relations => Subtheory::Relations(RelMentionSet {
                mentions: mentions(),
                relations: Vec::new(),
                score: Score::ZERO,
            }),
            SubtheoryType::Events => Subtheory::Events(EventMentionSet {
                mentions: mentions(),
                values: SubtheoryRef::to_slot(theory.get_subtheory(SubtheoryType::Values)),
                events: Vec::new(),
                score: Score::ZERO,
            }),
            SubtheoryType::DependencyParse => Subtheory::DependencyParse(Parse::flat(tokens())),
            SubtheoryType::ActorMentions => Subtheory::ActorMentions(ActorMentionSet {
                mentions: mentions(),
                actors: Vec::new(),
            }),
        }
    }

    /// A copy of this subtheory whose links carry pointer tokens.
    pub(crate) fn to_record(&self, ids: &ObjectIdTable) -> Result<Self, TheoristError> {
        let mut record = self.clone();
        for link in record.links_mut() {
            link.bind(ids)?;
        }
        Ok(record)
    }

    /// Resolve every link token against the load-time pointer table.
    pub(crate) fn resolve_links(&self, table: &ObjectPointerTable) -> Result<(), TheoristError> {
        for link in self.links() {
            link.resolve(table)?;
        }
        Ok(())
    }

    // =========================================================================
    // TYPED ACCESSORS
    // =========================================================================

    #[must_use]
    pub fn as_tokens(&self) -> Option<&TokenSequence> {
        match self {
            Subtheory::Tokens(t) => Some(t),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_names(&self) -> Option<&NameTheory> {
        match self {
            Subtheory::Names(n) => Some(n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_values(&self) -> Option<&ValueMentionSet> {
        match self {
            Subtheory::Values(v) => Some(v),
            _ => None,
        }
    }

    /// Either parse flavour (full or dependency).
    #[must_use]
    pub fn as_parse(&self) -> Option<&Parse> {
        match self {
            Subtheory::Parse(p) | Subtheory::DependencyParse(p) => Some(p),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_mentions(&self) -> Option<&MentionSet> {
        match self {
            Subtheory::Mentions(m) => Some(m),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_propositions(&self) -> Option<&PropositionSet> {
        match self {
            Subtheory::Propositions(p) => Some(p),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_entities(&self) -> Option<&EntitySet> {
        match self {
            Subtheory::Entities(e) => Some(e),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_relations(&self) -> Option<&RelMentionSet> {
        match self {
            Subtheory::Relations(r) => Some(r),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_events(&self) -> Option<&EventMentionSet> {
        match self {
            Subtheory::Events(e) => Some(e),
            _ => None,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(words: &[&str]) -> Rc<Subtheory> {
        Rc::new(Subtheory::Tokens(TokenSequence::from_words(0, words)))
    }

    #[test]
    fn link_is_weak() {
        let target = tokens(&["a", "b"]);
        let link = SubtheoryRef::to(&target);

        assert_eq!(Rc::strong_count(&target), 1);
        assert!(link.points_to(&target));
        assert!(link.get().is_some());

        drop(target);
        assert!(link.get().is_none());
    }

    #[test]
    fn null_link_serializes_as_none() {
        let link = SubtheoryRef::null();
        assert!(link.is_null());
        let bytes = postcard::to_allocvec(&link).expect("serialize");
        let back: SubtheoryRef = postcard::from_bytes(&bytes).expect("deserialize");
        assert!(back.is_null());
        assert_eq!(back.token(), None);
    }

    #[test]
    fn resolve_installs_target_from_table() {
        let target = tokens(&["x"]);
        let mut table = ObjectPointerTable::new();
        table.insert(ObjectId(7), Rc::clone(&target)).expect("insert");

        let link = SubtheoryRef::from(Some(ObjectId(7)));
        assert!(!link.is_resolved());
        link.resolve(&table).expect("resolve");
        assert!(link.points_to(&target));
    }

    #[test]
    fn resolve_rejects_unknown_token() {
        let table = ObjectPointerTable::new();
        let link = SubtheoryRef::from(Some(ObjectId(3)));
        assert!(matches!(
            link.resolve(&table),
            Err(TheoristError::StreamFormat(_))
        ));
    }

    #[test]
    fn mention_score_is_name_plus_descriptor() {
        let set = Subtheory::Mentions(MentionSet {
            parse: SubtheoryRef::null(),
            mentions: Vec::new(),
            name_score: Score::from_units(2),
            desc_score: Score::from_units(3),
        });
        assert_eq!(set.score(), Score::from_units(5));
    }

    #[test]
    fn empty_layers_link_to_theory_slots() {
        let mut theory = Theory::new("doc");
        let toks = tokens(&["a"]);
        theory
            .adopt_subtheory(SubtheoryType::Tokens, Rc::clone(&toks))
            .expect("adopt");

        let names = Subtheory::empty(SubtheoryType::Names, 0, &theory);
        assert_eq!(names.kind(), SubtheoryType::Names);
        assert_eq!(names.score(), Score::ZERO);
        assert!(names.links()[0].points_to(&toks));
    }
}
