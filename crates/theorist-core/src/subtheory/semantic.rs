//! Mention-level layers and the layers built on top of mentions.
//!
//! Everything below the mention set identifies mentions by [`MentionUid`]
//! rather than by position, so a layer stays meaningful when the mention
//! set it was built against is replaced by a re-tagged copy.

use super::SubtheoryRef;
use crate::{MentionUid, Score};
use serde::{Deserialize, Serialize};

// =============================================================================
// MENTIONS
// =============================================================================

/// Surface form of a mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MentionType {
    Name,
    Description,
    Pronoun,
    Part,
    Appositive,
    List,
    Other,
}

/// A mention of an entity in one sentence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub uid: MentionUid,
    pub head_start: u32,
    pub head_end: u32,
    pub mention_type: MentionType,
    pub entity_type: String,
    /// Intended entity type when the mention is used metonymically.
    pub metonymy: Option<String>,
}

/// The mentions of one sentence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentionSet {
    pub parse: SubtheoryRef,
    pub mentions: Vec<Mention>,
    pub name_score: Score,
    pub desc_score: Score,
}

impl MentionSet {
    /// Name score plus descriptor score.
    #[must_use]
    pub fn score(&self) -> Score {
        self.name_score.saturating_add(self.desc_score)
    }

    /// Look up a mention by uid.
    #[must_use]
    pub fn mention(&self, uid: MentionUid) -> Option<&Mention> {
        self.mentions.iter().find(|m| m.uid == uid)
    }

    /// A copy of this set with one mention tagged as metonymic.
    ///
    /// Returns `None` when the set has no mention with that uid.
    #[must_use]
    pub fn with_metonymy(&self, uid: MentionUid, intended_type: &str) -> Option<Self> {
        let mut copy = self.clone();
        let mention = copy.mentions.iter_mut().find(|m| m.uid == uid)?;
        mention.metonymy = Some(intended_type.to_string());
        Some(copy)
    }

    /// Number of mentions carrying a metonymy tag.
    #[must_use]
    pub fn metonymic_count(&self) -> usize {
        self.mentions.iter().filter(|m| m.metonymy.is_some()).count()
    }
}

// =============================================================================
// PROPOSITIONS
// =============================================================================

/// A role-labelled mention argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
    pub role: String,
    pub mention: MentionUid,
}

/// A predicate with its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposition {
    pub predicate: String,
    pub arguments: Vec<Argument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropositionSet {
    pub mentions: SubtheoryRef,
    pub propositions: Vec<Proposition>,
}

// =============================================================================
// ENTITIES
// =============================================================================

/// A group of co-referring mentions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: u32,
    pub entity_type: String,
    pub mentions: Vec<MentionUid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySet {
    pub mentions: SubtheoryRef,
    pub entities: Vec<Entity>,
    pub score: Score,
}

impl EntitySet {
    /// The entity a mention belongs to.
    #[must_use]
    pub fn entity_of(&self, uid: MentionUid) -> Option<&Entity> {
        self.entities.iter().find(|e| e.mentions.contains(&uid))
    }
}

// =============================================================================
// RELATIONS AND EVENTS
// =============================================================================

/// A relation between two mentions of the same sentence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelMention {
    pub uid: MentionUid,
    pub relation_type: String,
    pub left: MentionUid,
    pub right: MentionUid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelMentionSet {
    pub mentions: SubtheoryRef,
    pub relations: Vec<RelMention>,
    pub score: Score,
}

/// A role-labelled value-mention argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueArgument {
    pub role: String,
    pub value: MentionUid,
}

/// An event anchored on one token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMention {
    pub uid: MentionUid,
    pub event_type: String,
    pub anchor_token: u32,
    pub arguments: Vec<Argument>,
    pub value_arguments: Vec<ValueArgument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMentionSet {
    pub mentions: SubtheoryRef,
    pub values: SubtheoryRef,
    pub events: Vec<EventMention>,
    pub score: Score,
}

// =============================================================================
// ACTORS
// =============================================================================

/// A mention resolved to an actor from an external actor database.
///
/// `actor_id` is only meaningful within the run that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorMention {
    pub mention: MentionUid,
    pub actor_id: u32,
    pub actor_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorMentionSet {
    pub mentions: SubtheoryRef,
    pub actors: Vec<ActorMention>,
}
