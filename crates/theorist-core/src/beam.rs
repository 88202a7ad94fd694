//! # Beam
//!
//! A bounded, score-ordered collection of theories for one sentence.
//!
//! Theories are kept in a sorted `Vec` (best first). Insertion uses a binary
//! search for the first occupant with a strictly lower score, so equal
//! scores keep submission order. When the beam is full the tail theory is
//! dropped, which releases its subtheories.

use crate::subtheory::Subtheory;
use crate::theory::Theory;
use crate::Score;
use std::collections::BTreeSet;
use std::rc::{Rc, Weak};

/// Competing theories for one sentence, at most `width` of them.
#[derive(Debug)]
pub struct Beam {
    sentence_index: usize,
    width: usize,
    theories: Vec<Theory>,
    unique_cache: Option<Vec<Weak<Subtheory>>>,
}

impl Beam {
    /// Create an empty beam. A zero width is raised to one.
    #[must_use]
    pub fn new(sentence_index: usize, width: usize) -> Self {
        let width = width.max(1);
        Self {
            sentence_index,
            width,
            theories: Vec::with_capacity(width),
            unique_cache: None,
        }
    }

    /// A beam holding a single theory.
    #[must_use]
    pub fn with_theory(sentence_index: usize, width: usize, theory: Theory) -> Self {
        let mut beam = Self::new(sentence_index, width);
        beam.add_theory(theory);
        beam
    }

    pub(crate) fn from_sorted(sentence_index: usize, width: usize, theories: Vec<Theory>) -> Self {
        Self {
            sentence_index,
            width: width.max(1),
            theories,
            unique_cache: None,
        }
    }

    /// Insert a theory by descending score.
    ///
    /// Returns `false` when the theory ranks below every retained theory of
    /// a full beam; it is dropped immediately in that case.
    pub fn add_theory(&mut self, theory: Theory) -> bool {
        let score = theory.score();
        let position = self.theories.partition_point(|t| t.score() >= score);
        if position >= self.width {
            tracing::trace!(
                sentence = self.sentence_index,
                %score,
                "theory ranks below a full beam"
            );
            return false;
        }

        self.theories.insert(position, theory);
        if self.theories.len() > self.width {
            self.theories.truncate(self.width);
            tracing::trace!(sentence = self.sentence_index, "beam overflow pruned tail");
        }
        self.invalidate_unique_cache();
        true
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    #[must_use]
    pub fn sentence_index(&self) -> usize {
        self.sentence_index
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn n_theories(&self) -> usize {
        self.theories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.theories.is_empty()
    }

    #[must_use]
    pub fn best_theory(&self) -> Option<&Theory> {
        self.theories.first()
    }

    #[must_use]
    pub fn theory(&self, index: usize) -> Option<&Theory> {
        self.theories.get(index)
    }

    /// Theories, best first.
    pub fn iter(&self) -> std::slice::Iter<'_, Theory> {
        self.theories.iter()
    }

    /// Scores, best first.
    #[must_use]
    pub fn scores(&self) -> Vec<Score> {
        self.theories.iter().map(Theory::score).collect()
    }

    /// Remove and return the best theory, dropping every other one.
    pub fn extract_best_theory(&mut self) -> Option<Theory> {
        self.invalidate_unique_cache();
        if self.theories.is_empty() {
            return None;
        }
        let best = self.theories.remove(0);
        self.theories.clear();
        Some(best)
    }

    /// Take every theory out of the beam, best first.
    #[must_use]
    pub fn into_theories(self) -> Vec<Theory> {
        self.theories
    }

    // =========================================================================
    // UNIQUE SUBTHEORIES
    // =========================================================================

    /// Distinct subtheory instances held by any slot, in beam order then
    /// stage order.
    ///
    /// Served from a cache of weak handles when the cache is valid and every
    /// handle is still alive; recomputed otherwise.
    pub fn ensure_unique_subtheories_up_to_date(&mut self) -> Vec<Rc<Subtheory>> {
        if let Some(cache) = &self.unique_cache {
            let live: Option<Vec<Rc<Subtheory>>> = cache.iter().map(Weak::upgrade).collect();
            if let Some(live) = live {
                return live;
            }
        }
        let unique = self.collect_unique_subtheories();
        self.unique_cache = Some(unique.iter().map(Rc::downgrade).collect());
        unique
    }

    /// Uncached variant of [`Self::ensure_unique_subtheories_up_to_date`].
    #[must_use]
    pub fn collect_unique_subtheories(&self) -> Vec<Rc<Subtheory>> {
        let mut seen = BTreeSet::new();
        let mut unique = Vec::new();
        for theory in &self.theories {
            for (_, subtheory) in theory.slots() {
                if seen.insert(Rc::as_ptr(subtheory)) {
                    unique.push(Rc::clone(subtheory));
                }
            }
        }
        unique
    }

    /// Forget the cached unique-subtheory list.
    pub fn invalidate_unique_cache(&mut self) {
        self.unique_cache = None;
    }

    /// Whether a cached unique-subtheory list is held.
    #[must_use]
    pub fn has_unique_cache(&self) -> bool {
        self.unique_cache.is_some()
    }
}

impl<'a> IntoIterator for &'a Beam {
    type Item = &'a Theory;
    type IntoIter = std::slice::Iter<'a, Theory>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// =============================================================================
// TESTS
// =============================================================================
