//! Token-level layers: tokens, tags, names and value mentions.

use super::SubtheoryRef;
use crate::{MentionUid, Score};
use serde::{Deserialize, Serialize};

/// One token with its character span in the sentence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub start: u32,
    pub end: u32,
}

/// The tokenization of one sentence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSequence {
    pub sentence: u32,
    pub tokens: Vec<Token>,
    pub score: Score,
}

impl TokenSequence {
    /// An empty tokenization.
    #[must_use]
    pub fn new(sentence: u32) -> Self {
        Self {
            sentence,
            tokens: Vec::new(),
            score: Score::ZERO,
        }
    }

    /// Tokens laid out as if separated by single spaces.
    #[must_use]
    pub fn from_words(sentence: u32, words: &[&str]) -> Self {
        let mut offset = 0u32;
        let tokens = words
            .iter()
            .map(|word| {
                let start = offset;
                let end = start.saturating_add(word.chars().count() as u32);
                offset = end.saturating_add(1);
                Token {
                    text: (*word).to_string(),
                    start,
                    end,
                }
            })
            .collect();
        Self {
            sentence,
            tokens,
            score: Score::ZERO,
        }
    }

    /// Set the score (builder style).
    #[must_use]
    pub fn with_score(mut self, score: Score) -> Self {
        self.score = score;
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Part-of-speech tags, one per token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PosSequence {
    pub tokens: SubtheoryRef,
    pub tags: Vec<String>,
    pub score: Score,
}

/// A typed token span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameSpan {
    pub start_token: u32,
    pub end_token: u32,
    pub entity_type: String,
}

/// Named-entity spans over the token sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameTheory {
    pub tokens: SubtheoryRef,
    pub names: Vec<NameSpan>,
    pub score: Score,
}

/// Names found inside the spans of the enclosing name theory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NestedNameTheory {
    pub parent: SubtheoryRef,
    pub names: Vec<NameSpan>,
    pub score: Score,
}

/// A value expression (date, money, percentage, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueMention {
    pub uid: MentionUid,
    pub start_token: u32,
    pub end_token: u32,
    pub value_type: String,
}

/// The value mentions of one sentence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueMentionSet {
    pub tokens: SubtheoryRef,
    pub values: Vec<ValueMention>,
    pub score: Score,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_words_assigns_offsets() {
        let seq = TokenSequence::from_words(2, &["The", "cat", "sat"]);
        assert_eq!(seq.len(), 3);
        assert_eq!(seq.sentence, 2);
        assert_eq!((seq.tokens[1].start, seq.tokens[1].end), (4, 7));
        assert_eq!(seq.tokens[2].start, 8);
        assert!(TokenSequence::new(0).is_empty());
    }
}
