//! Document-scope layers.
//!
//! These are built from committed theories by document processors and
//! refer to sentence-level objects by [`MentionUid`] and entity id only.

use crate::subtheory::{Entity, RelMention, ValueMention};
use crate::MentionUid;
use serde::{Deserialize, Serialize};

/// Entities resolved across the whole document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocEntitySet {
    pub entities: Vec<Entity>,
}

/// A normalized value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Value {
    pub id: u32,
    pub value_type: String,
    pub mention: MentionUid,
    /// Normalized time expression, when the value is temporal.
    pub timex: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueSet {
    pub values: Vec<Value>,
}

/// A relation between two document entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub id: u32,
    pub relation_type: String,
    pub left: u32,
    pub right: u32,
    pub mentions: Vec<MentionUid>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationSet {
    pub relations: Vec<Relation>,
}

/// An event grouping co-referring event mentions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: u32,
    pub event_type: String,
    pub mentions: Vec<MentionUid>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSet {
    pub events: Vec<Event>,
}

/// Relation mentions found across sentence boundaries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocRelMentionSet {
    pub relations: Vec<RelMention>,
}

/// Value mentions found outside any sentence (dates in headers, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocValueMentionSet {
    pub values: Vec<ValueMention>,
}

/// One document-scope layer, as produced by a document processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentLayer {
    Entities(DocEntitySet),
    Values(ValueSet),
    Relations(RelationSet),
    Events(EventSet),
    RelationMentions(DocRelMentionSet),
    ValueMentions(DocValueMentionSet),
}

impl DocumentLayer {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            DocumentLayer::Entities(_) => "entities",
            DocumentLayer::Values(_) => "values",
            DocumentLayer::Relations(_) => "relations",
            DocumentLayer::Events(_) => "events",
            DocumentLayer::RelationMentions(_) => "relation-mentions",
            DocumentLayer::ValueMentions(_) => "value-mentions",
        }
    }
}

/// The six document-scope layers, each present or absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLayers {
    pub entities: Option<DocEntitySet>,
    pub values: Option<ValueSet>,
    pub relations: Option<RelationSet>,
    pub events: Option<EventSet>,
    pub relation_mentions: Option<DocRelMentionSet>,
    pub value_mentions: Option<DocValueMentionSet>,
}

impl DocumentLayers {
    /// Store a layer in its slot.
    pub fn install(&mut self, layer: DocumentLayer) {
        match layer {
            DocumentLayer::Entities(l) => self.entities = Some(l),
            DocumentLayer::Values(l) => self.values = Some(l),
            DocumentLayer::Relations(l) => self.relations = Some(l),
            DocumentLayer::Events(l) => self.events = Some(l),
            DocumentLayer::RelationMentions(l) => self.relation_mentions = Some(l),
            DocumentLayer::ValueMentions(l) => self.value_mentions = Some(l),
        }
    }

    /// Number of layers present.
    #[must_use]
    pub fn count(&self) -> usize {
        [
            self.entities.is_some(),
            self.values.is_some(),
            self.relations.is_some(),
            self.events.is_some(),
            self.relation_mentions.is_some(),
            self.value_mentions.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }
}
