//! Fixture stage processors shared by the integration tests.

#![allow(dead_code)]

use std::rc::Rc;
use theorist_core::subtheory::{
    Argument, Entity, EntitySet, Mention, MentionSet, MentionType, Parse, Proposition,
    PropositionSet, TokenSequence,
};
use theorist_core::{
    DocTheory, Document, Driver, MentionUid, PipelineConfig, Score, Stage, StageInput,
    StageProcessor, Subtheory, SubtheoryType, Theory, TheoristError,
};

/// One candidate per configured score, built for the processor's stage.
pub struct Fixture {
    pub stage: Stage,
    pub scores: Vec<i64>,
}

impl Fixture {
    pub fn boxed(stage: Stage, scores: &[i64]) -> Box<dyn StageProcessor> {
        Box::new(Self {
            stage,
            scores: scores.to_vec(),
        })
    }
}

impl StageProcessor for Fixture {
    fn stage(&self) -> Stage {
        self.stage
    }

    fn expand(
        &mut self,
        input: &StageInput<'_>,
        theory: &Theory,
        max_candidates: usize,
        out: &mut Vec<Subtheory>,
    ) -> Result<usize, TheoristError> {
        let before = out.len();
        for units in self.scores.iter().take(max_candidates) {
            out.push(candidate(self.stage, input, theory, Score::from_units(*units)));
        }
        Ok(out.len() - before)
    }
}

fn candidate(stage: Stage, input: &StageInput<'_>, theory: &Theory, score: Score) -> Subtheory {
    let sentence = input.sentence_index as u32;
    match stage {
        Stage::Tokens => {
            let words: Vec<&str> = input.sentence.text.split_whitespace().collect();
            Subtheory::Tokens(TokenSequence::from_words(sentence, &words).with_score(score))
        }
        Stage::Parse => Subtheory::Parse(Parse {
            tokens: theory.link_to(SubtheoryType::Tokens),
            tree: format!("(S {})", input.sentence.text),
            score,
        }),
        Stage::Mentions => Subtheory::Mentions(MentionSet {
            parse: theory.link_to(SubtheoryType::Parse),
            mentions: vec![Mention {
                uid: MentionUid::new(sentence, 0),
                head_start: 0,
                head_end: 1,
                mention_type: MentionType::Name,
                entity_type: "GPE".to_string(),
                metonymy: None,
            }],
            name_score: score,
            desc_score: Score::ZERO,
        }),
        Stage::Propositions => Subtheory::Propositions(PropositionSet {
            mentions: theory.link_to(SubtheoryType::Mentions),
            propositions: vec![Proposition {
                predicate: "voted".to_string(),
                arguments: vec![Argument {
                    role: "<sub>".to_string(),
                    mention: MentionUid::new(sentence, 0),
                }],
            }],
        }),
        Stage::Metonymy => match theory
            .mentions()
            .and_then(|m| m.with_metonymy(MentionUid::new(sentence, 0), "ORG"))
        {
            Some(tagged) => Subtheory::Mentions(tagged),
            None => Subtheory::empty(SubtheoryType::Mentions, input.sentence_index, theory),
        },
        Stage::Entities => Subtheory::Entities(EntitySet {
            mentions: theory.link_to(SubtheoryType::Mentions),
            entities: vec![Entity {
                id: 0,
                entity_type: "GPE".to_string(),
                mentions: vec![MentionUid::new(sentence, 0)],
            }],
            score,
        }),
        other => Subtheory::empty(other.output_type(), input.sentence_index, theory),
    }
}

/// A two-sentence document.
pub fn two_sentence_doc(doc_id: &str) -> DocTheory {
    DocTheory::from_document(Document::new(
        doc_id,
        "newswire",
        "Paris voted yesterday. Rome agreed.",
    ))
}

/// Driver configured through `last` with fixtures for the semantic stages.
pub fn fixture_driver(last: Stage) -> Driver {
    let mut driver = Driver::new(PipelineConfig::through(last)).expect("fixture config");
    driver.register(Fixture::boxed(Stage::Tokens, &[1]));
    driver.register(Fixture::boxed(Stage::Parse, &[3, 2, 1]));
    driver.register(Fixture::boxed(Stage::Mentions, &[4, 1]));
    driver.register(Fixture::boxed(Stage::Propositions, &[0]));
    driver.register(Fixture::boxed(Stage::Metonymy, &[0]));
    driver.register(Fixture::boxed(Stage::Entities, &[2]));
    driver
}

/// Slot-by-slot shape of a theory: populated types and score.
pub fn shape(theory: &Theory) -> (Vec<SubtheoryType>, Score) {
    (theory.populated(), theory.score())
}

/// Tokens-only theory with a distinguishing sentence number.
pub fn tokens_theory(tag: u32, units: i64) -> (Theory, Rc<Subtheory>) {
    let tokens = Rc::new(Subtheory::Tokens(
        TokenSequence::from_words(tag, &["w"]).with_score(Score::from_units(units)),
    ));
    let mut theory = Theory::new("doc");
    theory
        .adopt_subtheory(SubtheoryType::Tokens, Rc::clone(&tokens))
        .expect("fresh theory accepts tokens");
    (theory, tokens)
}
