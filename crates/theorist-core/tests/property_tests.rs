//! # Property-Based Tests
//!
//! Beam ordering, reference counting and persistence invariants under
//! random input.

mod common;

use common::tokens_theory;
use proptest::collection::vec;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use theorist_core::subtheory::Parse;
use theorist_core::{Beam, Score, Subtheory, SubtheoryType, Theory, load_beam, save_beam};

/// Sentence tag of a theory's tokens, used as its identity in these tests.
fn tag(theory: &Theory) -> Option<u32> {
    theory.tokens().map(|t| t.sentence)
}

/// Number of slots, across every live theory, pointing at each instance.
fn slot_counts<'a>(
    theories: impl Iterator<Item = &'a Theory>,
) -> BTreeMap<*const Subtheory, (usize, Rc<Subtheory>)> {
    let mut counts: BTreeMap<*const Subtheory, (usize, Rc<Subtheory>)> = BTreeMap::new();
    for theory in theories {
        for (_, subtheory) in theory.slots() {
            counts
                .entry(Rc::as_ptr(subtheory))
                .or_insert_with(|| (0, Rc::clone(subtheory)))
                .0 += 1;
        }
    }
    counts
}

#[derive(Debug, Clone)]
enum Op {
    /// Add a fresh tokens-only theory to the source beam.
    Fresh(i64),
    /// Fork a source theory, give it a new parse, add it to the target beam.
    Refine(usize, i64),
    /// Commit the target beam to its best theory.
    Commit,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (-20i64..20).prop_map(Op::Fresh),
        (0usize..8, -20i64..20).prop_map(|(i, s)| Op::Refine(i, s)),
        Just(Op::Commit),
    ]
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// The beam equals a stable descending sort of every submission, truncated.
    #[test]
    fn beam_matches_stable_sort_and_truncate(
        scores in vec(-50i64..50, 0..40),
        width in 1usize..8
    ) {
        let mut beam = Beam::new(0, width);
        for (i, units) in scores.iter().enumerate() {
            let (theory, _) = tokens_theory(i as u32, *units);
            beam.add_theory(theory);
        }

        let mut expected: Vec<(u32, Score)> = scores
            .iter()
            .enumerate()
            .map(|(i, s)| (i as u32, Score::from_units(*s)))
            .collect();
        expected.sort_by(|a, b| b.1.cmp(&a.1));
        expected.truncate(width);

        let actual: Vec<(u32, Score)> = beam
            .iter()
            .filter_map(|t| tag(t).map(|tag| (tag, t.score())))
            .collect();
        prop_assert_eq!(actual, expected);
        prop_assert!(beam.n_theories() <= width);
    }

    /// Strong counts always equal slot counts, and nothing outlives the beams.
    #[test]
    fn refcounts_track_slots_without_leaks(ops in vec(op(), 1..40)) {
        let mut source = Beam::new(0, 6);
        let mut target = Beam::new(0, 4);
        let mut watched: Vec<Weak<Subtheory>> = Vec::new();
        let mut next_tag = 0u32;

        for op in ops {
            match op {
                Op::Fresh(units) => {
                    let (theory, tokens) = tokens_theory(next_tag, units);
                    next_tag += 1;
                    watched.push(Rc::downgrade(&tokens));
                    source.add_theory(theory);
                }
                Op::Refine(index, units) => {
                    let Some(base) = source.theory(index % source.n_theories().max(1)) else {
                        continue;
                    };
                    let mut forked = base.fork();
                    let parse = Rc::new(Subtheory::Parse(Parse {
                        tokens: forked.link_to(SubtheoryType::Tokens),
                        tree: String::new(),
                        score: Score::from_units(units),
                    }));
                    watched.push(Rc::downgrade(&parse));
                    forked.adopt_subtheory(SubtheoryType::Parse, parse).expect("parse");
                    target.add_theory(forked);
                }
                Op::Commit => {
                    if let Some(best) = target.extract_best_theory() {
                        target.add_theory(best);
                    }
                }
            }

            for (_, (slots, instance)) in slot_counts(source.iter().chain(target.iter())) {
                // One extra strong reference is the handle held by the map.
                prop_assert_eq!(Rc::strong_count(&instance), slots + 1);
            }
        }

        drop(source);
        drop(target);
        prop_assert!(watched.iter().all(|w| w.upgrade().is_none()));
    }

    /// A saved beam reloads with the same scores and the same sharing.
    #[test]
    fn beam_roundtrip_preserves_sharing(scores in vec(-10i64..10, 1..6)) {
        let (base, _) = tokens_theory(0, 1);
        let mut beam = Beam::new(0, 8);
        for units in &scores {
            let mut forked = base.fork();
            let parse = Rc::new(Subtheory::Parse(Parse {
                tokens: forked.link_to(SubtheoryType::Tokens),
                tree: String::new(),
                score: Score::from_units(*units),
            }));
            forked.adopt_subtheory(SubtheoryType::Parse, parse).expect("parse");
            beam.add_theory(forked);
        }
        drop(base);

        let loaded = load_beam(&save_beam(&beam).expect("save")).expect("load");
        prop_assert_eq!(loaded.scores(), beam.scores());

        let before = beam.collect_unique_subtheories().len();
        let after = loaded.collect_unique_subtheories();
        prop_assert_eq!(after.len(), before);

        let tokens = &after[0];
        prop_assert_eq!(Rc::strong_count(tokens), loaded.n_theories() + 1);
        for theory in &loaded {
            let parse = theory.get_subtheory(SubtheoryType::Parse).expect("parse");
            prop_assert!(parse.links()[0].points_to(tokens));
        }
    }
}
