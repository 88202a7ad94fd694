//! # Fragment Merge
//!
//! Combines independently processed fragments of one document into a single
//! [`DocTheory`].
//!
//! Each fragment's committed theories are deep-copied. Copies are made
//! through a per-fragment table keyed by instance identity, so instances
//! shared inside a fragment stay shared after the merge. Sentence indices,
//! mention uids and the entity, event, relation and value ids are moved past
//! everything absorbed from earlier fragments.
//!
//! Actor mentions carry ids that are only meaningful inside the run that
//! produced them and cannot be renumbered; they are dropped and every drop
//! is listed in the [`MergeReport`].

use super::layers::{
    DocEntitySet, DocRelMentionSet, DocValueMentionSet, DocumentLayers, EventSet, RelationSet,
    ValueSet,
};
use super::{DocTheory, Document};
use crate::beam::Beam;
use crate::subtheory::{Subtheory, SubtheoryRef};
use crate::theory::Theory;
use crate::{MentionUid, SubtheoryType, TheoristError};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use tracing::{info, warn};

/// A subtheory left out of the merged document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedLayer {
    pub fragment: usize,
    /// Sentence index in the merged document.
    pub sentence: usize,
    pub kind: SubtheoryType,
}

/// Summary of a merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub fragments: usize,
    pub sentences: usize,
    pub dropped: Vec<DroppedLayer>,
}

/// Amounts added to every id taken from one fragment.
#[derive(Debug, Clone, Copy, Default)]
struct IdOffsets {
    sentence: u32,
    entity: u32,
    event: u32,
    relation: u32,
    value: u32,
}

impl IdOffsets {
    fn sentence(&self, sentence: u32) -> Result<u32, TheoristError> {
        shift("sentence", sentence, self.sentence)
    }

    fn entity(&self, id: u32) -> Result<u32, TheoristError> {
        shift("entity", id, self.entity)
    }

    fn event(&self, id: u32) -> Result<u32, TheoristError> {
        shift("event", id, self.event)
    }

    fn relation(&self, id: u32) -> Result<u32, TheoristError> {
        shift("relation", id, self.relation)
    }

    fn value(&self, id: u32) -> Result<u32, TheoristError> {
        shift("value", id, self.value)
    }

    fn uid(&self, uid: MentionUid) -> Result<MentionUid, TheoristError> {
        uid.checked_shifted(self.sentence).ok_or_else(|| {
            TheoristError::MergeConflict(format!("mention uid {uid} overflows after renumbering"))
        })
    }

    fn uids(&self, uids: &mut [MentionUid]) -> Result<(), TheoristError> {
        for uid in uids {
            *uid = self.uid(*uid)?;
        }
        Ok(())
    }
}

fn shift(what: &str, id: u32, offset: u32) -> Result<u32, TheoristError> {
    id.checked_add(offset).ok_or_else(|| {
        TheoristError::MergeConflict(format!("{what} id {id} overflows after renumbering"))
    })
}

/// Instances copied from one fragment, keyed by the original's address.
type CopyTable = BTreeMap<*const Subtheory, Rc<Subtheory>>;

/// Merge fully committed fragments, in order, into one document.
pub fn merge_fragments(
    document: Document,
    fragments: Vec<DocTheory>,
) -> Result<(DocTheory, MergeReport), TheoristError> {
    if fragments.is_empty() {
        return Err(TheoristError::MergeConflict(
            "nothing to merge".to_string(),
        ));
    }

    let mut offsets = IdOffsets::default();
    let mut report = MergeReport {
        fragments: fragments.len(),
        ..MergeReport::default()
    };
    let mut sentences = Vec::new();
    let mut beams = Vec::new();
    let mut layers = DocumentLayers::default();

    for (position, fragment) in fragments.iter().enumerate() {
        if !fragment.is_fully_committed() {
            return Err(TheoristError::MergeConflict(format!(
                "fragment {} ({}) has uncommitted sentences",
                position,
                fragment.doc_id()
            )));
        }

        let mut copies = CopyTable::new();
        for (local, sentence) in fragment.sentences().iter().enumerate() {
            let index = sentences.len();
            let mut sentence = sentence.clone();
            sentence.doc_id = document.doc_id.clone();
            sentence.index = index as u32;
            sentences.push(sentence);

            let theory = fragment.committed_theory(local).ok_or_else(|| {
                TheoristError::MergeConflict(format!(
                    "fragment {} sentence {} has an empty beam",
                    position, local
                ))
            })?;

            let held: BTreeSet<*const Subtheory> = theory
                .slots()
                .filter(|(kind, _)| *kind != SubtheoryType::ActorMentions)
                .map(|(_, subtheory)| Rc::as_ptr(subtheory))
                .collect();

            let mut slots = BTreeMap::new();
            for (kind, subtheory) in theory.slots() {
                if kind == SubtheoryType::ActorMentions {
                    warn!(
                        fragment = position,
                        sentence = index,
                        "actor mentions cannot be merged; dropped"
                    );
                    report.dropped.push(DroppedLayer {
                        fragment: position,
                        sentence: index,
                        kind,
                    });
                    continue;
                }
                let copy = copy_subtheory(subtheory, &held, &offsets, &mut copies)?;
                slots.insert(kind, copy);
            }
            let merged = Theory::from_parts(
                document.doc_id.clone(),
                theory.primary_parse(),
                slots,
            );
            beams.push(Beam::with_theory(index, 1, merged));
        }

        absorb_layers(&mut layers, fragment.layers(), &offsets)?;
        offsets = advance(offsets, fragment)?;
    }

    report.sentences = sentences.len();
    info!(
        doc_id = %document.doc_id,
        fragments = report.fragments,
        sentences = report.sentences,
        dropped = report.dropped.len(),
        "merged document fragments"
    );

    let committed: BTreeSet<usize> = (0..sentences.len()).collect();
    Ok((
        DocTheory::from_parts(document, sentences, beams, committed, layers),
        report,
    ))
}

/// Copy a subtheory (and, first, everything it links to) into the merged graph.
///
/// Only instances in `held` survive the merge; a link to anything else
/// becomes a null link.
fn copy_subtheory(
    original: &Rc<Subtheory>,
    held: &BTreeSet<*const Subtheory>,
    offsets: &IdOffsets,
    copies: &mut CopyTable,
) -> Result<Rc<Subtheory>, TheoristError> {
    if let Some(copy) = copies.get(&Rc::as_ptr(original)) {
        return Ok(Rc::clone(copy));
    }

    let kind = original.kind();
    let mut payload = Subtheory::clone(original);
    for link in payload.links_mut() {
        *link = match link.get() {
            Some(target) if held.contains(&Rc::as_ptr(&target)) => {
                SubtheoryRef::to(&copy_subtheory(&target, held, offsets, copies)?)
            }
            Some(target) => {
                warn!(
                    %kind,
                    target = %target.kind(),
                    "link target is not held by the committed theory; nulled"
                );
                SubtheoryRef::null()
            }
            None => SubtheoryRef::null(),
        };
    }
    apply_offsets(&mut payload, offsets)?;

    let copy = Rc::new(payload);
    copies.insert(Rc::as_ptr(original), Rc::clone(&copy));
    Ok(copy)
}

fn apply_offsets(payload: &mut Subtheory, offsets: &IdOffsets) -> Result<(), TheoristError> {
    match payload {
        Subtheory::Tokens(t) => t.sentence = offsets.sentence(t.sentence)?,
        Subtheory::Values(v) => {
            for value in &mut v.values {
                value.uid = offsets.uid(value.uid)?;
            }
        }
        Subtheory::Mentions(m) => {
            for mention in &mut m.mentions {
                mention.uid = offsets.uid(mention.uid)?;
            }
        }
        Subtheory::Propositions(p) => {
            for argument in p.propositions.iter_mut().flat_map(|p| &mut p.arguments) {
                argument.mention = offsets.uid(argument.mention)?;
            }
        }
        Subtheory::Entities(e) => {
            for entity in &mut e.entities {
                entity.id = offsets.entity(entity.id)?;
                offsets.uids(&mut entity.mentions)?;
            }
        }
        Subtheory::Relations(r) => {
            for relation in &mut r.relations {
                relation.uid = offsets.uid(relation.uid)?;
                relation.left = offsets.uid(relation.left)?;
                relation.right = offsets.uid(relation.right)?;
            }
        }
        Subtheory::Events(e) => {
            for event in &mut e.events {
                event.uid = offsets.uid(event.uid)?;
                for argument in &mut event.arguments {
                    argument.mention = offsets.uid(argument.mention)?;
                }
                for argument in &mut event.value_arguments {
                    argument.value = offsets.uid(argument.value)?;
                }
            }
        }
        Subtheory::ActorMentions(a) => {
            for actor in &mut a.actors {
                actor.mention = offsets.uid(actor.mention)?;
            }
        }
        Subtheory::PartOfSpeech(_)
        | Subtheory::Names(_)
        | Subtheory::NestedNames(_)
        | Subtheory::NpChunk(_)
        | Subtheory::Parse(_)
        | Subtheory::DependencyParse(_) => {}
    }
    Ok(())
}

/// Append one fragment's document layers, renumbered.
fn absorb_layers(
    target: &mut DocumentLayers,
    source: &DocumentLayers,
    offsets: &IdOffsets,
) -> Result<(), TheoristError> {
    if let Some(set) = &source.entities {
        let merged = target.entities.get_or_insert_with(DocEntitySet::default);
        for entity in &set.entities {
            let mut entity = entity.clone();
            entity.id = offsets.entity(entity.id)?;
            offsets.uids(&mut entity.mentions)?;
            merged.entities.push(entity);
        }
    }
    if let Some(set) = &source.values {
        let merged = target.values.get_or_insert_with(ValueSet::default);
        for value in &set.values {
            let mut value = value.clone();
            value.id = offsets.value(value.id)?;
            value.mention = offsets.uid(value.mention)?;
            merged.values.push(value);
        }
    }
    if let Some(set) = &source.relations {
        let merged = target.relations.get_or_insert_with(RelationSet::default);
        for relation in &set.relations {
            let mut relation = relation.clone();
            relation.id = offsets.relation(relation.id)?;
            relation.left = offsets.entity(relation.left)?;
            relation.right = offsets.entity(relation.right)?;
            offsets.uids(&mut relation.mentions)?;
            merged.relations.push(relation);
        }
    }
    if let Some(set) = &source.events {
        let merged = target.events.get_or_insert_with(EventSet::default);
        for event in &set.events {
            let mut event = event.clone();
            event.id = offsets.event(event.id)?;
            offsets.uids(&mut event.mentions)?;
            merged.events.push(event);
        }
    }
    if let Some(set) = &source.relation_mentions {
        let merged = target
            .relation_mentions
            .get_or_insert_with(DocRelMentionSet::default);
        for relation in &set.relations {
            let mut relation = relation.clone();
            relation.uid = offsets.uid(relation.uid)?;
            relation.left = offsets.uid(relation.left)?;
            relation.right = offsets.uid(relation.right)?;
            merged.relations.push(relation);
        }
    }
    if let Some(set) = &source.value_mentions {
        let merged = target
            .value_mentions
            .get_or_insert_with(DocValueMentionSet::default);
        for value in &set.values {
            let mut value = value.clone();
            value.uid = offsets.uid(value.uid)?;
            merged.values.push(value);
        }
    }
    Ok(())
}

/// Offsets for the fragment after `fragment`.
fn advance(offsets: IdOffsets, fragment: &DocTheory) -> Result<IdOffsets, TheoristError> {
    let sentences = u32::try_from(fragment.n_sentences())
        .map_err(|_| TheoristError::MergeConflict("sentence index space exhausted".into()))?;
    let layers = fragment.layers();

    let entity_ids = fragment
        .committed_theories()
        .filter_map(|(_, t)| t.entities())
        .flat_map(|set| set.entities.iter().map(|e| e.id))
        .chain(layers.entities.iter().flat_map(|s| s.entities.iter().map(|e| e.id)));
    let event_ids = layers.events.iter().flat_map(|s| s.events.iter().map(|e| e.id));
    let relation_ids = layers
        .relations
        .iter()
        .flat_map(|s| s.relations.iter().map(|r| r.id));
    let value_ids = layers.values.iter().flat_map(|s| s.values.iter().map(|v| v.id));

    Ok(IdOffsets {
        sentence: shift("sentence", offsets.sentence, sentences)?,
        entity: shift("entity", offsets.entity, next_id("entity", entity_ids)?)?,
        event: shift("event", offsets.event, next_id("event", event_ids)?)?,
        relation: shift("relation", offsets.relation, next_id("relation", relation_ids)?)?,
        value: shift("value", offsets.value, next_id("value", value_ids)?)?,
    })
}

/// One past the largest id, or zero.
fn next_id(what: &str, ids: impl Iterator<Item = u32>) -> Result<u32, TheoristError> {
    ids.max().map_or(Ok(0), |max| shift(what, max, 1))
}

// =============================================================================
// TESTS
// =============================================================================
