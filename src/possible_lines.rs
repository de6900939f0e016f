//! The lazy algebra of admissible line patterns. A `Lines` value describes a
//! set of `ConcreteLine`s of a fixed length as a tree of variants: plain word
//! lists, block combinators, and unions. Values are immutable and shared by
//! reference; every operation returns either the receiver (when nothing
//! changed) or a freshly-built value, so search branches can share structure
//! freely.

use lazy_static::lazy_static;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::char_set::CharSet;
use crate::line::ConcreteLine;
use crate::{BLOCKED, MAX_GRID_SIZE};

/// A set of full-length words that could fill a line on their own, with the
/// preferred words ahead of the obscure ones.
#[derive(Debug)]
pub struct WordSet {
    pub words: Vec<Arc<str>>,
    /// Index of the first obscure word. 0 means all obscure; `words.len()`
    /// means all preferred.
    pub obscure_start: usize,
    /// Per-position masks of the letters occurring across all words, built on
    /// first use. Accelerates `chars_at` and lets `filter_any` early-return.
    letter_masks: OnceLock<Vec<CharSet>>,
}

impl WordSet {
    fn masks(&self) -> &[CharSet] {
        self.letter_masks.get_or_init(|| {
            let num_letters = self.words[0].len();
            let mut masks = vec![CharSet::new(); num_letters];
            for word in &self.words {
                for (index, ch) in word.chars().enumerate() {
                    masks[index]
                        .add(ch)
                        .expect("word characters are within the alphabet");
                }
            }
            masks
        })
    }

    fn char_at(word: &Arc<str>, index: usize) -> char {
        word.as_bytes()[index] as char
    }
}

/// The variant tree behind a `Lines` value.
#[derive(Debug)]
pub enum PossibleLines {
    /// The empty set. One canonical instance per length.
    Impossible { num_letters: usize },
    /// A singleton.
    Definite { line: ConcreteLine },
    /// Any one of a list of full-length words.
    Words(WordSet),
    /// A blocked cell followed by any element of `inner`.
    BlockBefore { inner: Lines },
    /// Any element of `inner` followed by a blocked cell.
    BlockAfter { inner: Lines },
    /// An element of `first`, a blocked cell, then an element of `second`.
    BlockBetween { first: Lines, second: Lines },
    /// A union. Children are never `Impossible` and never nested `Compound`s.
    Compound { parts: Vec<Lines> },
}

/// A bisection of a pattern set into two non-empty halves for branching.
#[derive(Debug, Clone)]
pub struct ChoiceStep {
    pub chosen: Lines,
    pub remaining: Lines,
}

lazy_static! {
    static ref IMPOSSIBLE_BY_LENGTH: Vec<Lines> = (0..=MAX_GRID_SIZE)
        .map(|num_letters| Lines(Arc::new(PossibleLines::Impossible { num_letters })))
        .collect();
}

/// A shared, immutable handle to a set of possible lines.
#[derive(Debug, Clone)]
pub struct Lines(Arc<PossibleLines>);

impl Lines {
    /// The canonical empty set for the given length.
    #[must_use]
    pub fn impossible(num_letters: usize) -> Lines {
        IMPOSSIBLE_BY_LENGTH
            .get(num_letters)
            .cloned()
            .unwrap_or_else(|| Lines(Arc::new(PossibleLines::Impossible { num_letters })))
    }

    #[must_use]
    pub fn definite(line: ConcreteLine) -> Lines {
        Lines(Arc::new(PossibleLines::Definite { line }))
    }

    /// Build a word-list pattern, collapsing the degenerate cases: an empty
    /// list is `Impossible` and a single word is `Definite`.
    #[must_use]
    pub fn words(words: Vec<Arc<str>>, obscure_start: usize, num_letters: usize) -> Lines {
        debug_assert!(obscure_start <= words.len());
        match words.len() {
            0 => Lines::impossible(num_letters),
            1 => Lines::definite(ConcreteLine::from_word(&words[0])),
            _ => Lines(Arc::new(PossibleLines::Words(WordSet {
                words,
                obscure_start,
                letter_masks: OnceLock::new(),
            }))),
        }
    }

    /// Build a word-list pattern from separate preferred and obscure tiers.
    #[must_use]
    pub fn words_from_tiers(
        preferred: Vec<Arc<str>>,
        obscure: Vec<Arc<str>>,
        num_letters: usize,
    ) -> Lines {
        let obscure_start = preferred.len();
        let mut words = preferred;
        words.extend(obscure);
        Lines::words(words, obscure_start, num_letters)
    }

    #[must_use]
    pub fn block_before(inner: Lines) -> Lines {
        if inner.is_impossible() {
            return Lines::impossible(inner.num_letters() + 1);
        }
        Lines(Arc::new(PossibleLines::BlockBefore { inner }))
    }

    #[must_use]
    pub fn block_after(inner: Lines) -> Lines {
        if inner.is_impossible() {
            return Lines::impossible(inner.num_letters() + 1);
        }
        Lines(Arc::new(PossibleLines::BlockAfter { inner }))
    }

    #[must_use]
    pub fn block_between(first: Lines, second: Lines) -> Lines {
        if first.is_impossible() || second.is_impossible() {
            return Lines::impossible(first.num_letters() + second.num_letters() + 1);
        }
        Lines(Arc::new(PossibleLines::BlockBetween { first, second }))
    }

    /// Build a union, flattening nested unions, dropping `Impossible` children
    /// and collapsing the empty and singleton cases.
    #[must_use]
    pub fn compound(parts: Vec<Lines>, num_letters: usize) -> Lines {
        let needs_rework = parts
            .iter()
            .any(|part| part.is_impossible() || matches!(*part.0, PossibleLines::Compound { .. }));

        let parts = if needs_rework {
            let mut flattened = Vec::with_capacity(parts.len());
            for part in parts {
                if part.is_impossible() {
                    continue;
                }
                match &*part.0 {
                    PossibleLines::Compound { parts: nested } => {
                        flattened.extend(nested.iter().cloned());
                    }
                    _ => flattened.push(part),
                }
            }
            flattened
        } else {
            parts
        };

        #[cfg(feature = "check_invariants")]
        for part in &parts {
            assert_eq!(
                part.num_letters(),
                num_letters,
                "compound child has the wrong length"
            );
        }

        match parts.len() {
            0 => Lines::impossible(num_letters),
            1 => parts.into_iter().next().expect("length checked"),
            _ => Lines(Arc::new(PossibleLines::Compound { parts })),
        }
    }

    /// The underlying variant, for structural inspection.
    #[must_use]
    pub fn node(&self) -> &PossibleLines {
        &self.0
    }

    #[must_use]
    pub fn is_impossible(&self) -> bool {
        matches!(*self.0, PossibleLines::Impossible { .. })
    }

    #[must_use]
    pub fn ptr_eq(a: &Lines, b: &Lines) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// The length of every line in the set.
    #[must_use]
    pub fn num_letters(&self) -> usize {
        match &*self.0 {
            PossibleLines::Impossible { num_letters } => *num_letters,
            PossibleLines::Definite { line } => line.len(),
            PossibleLines::Words(ws) => ws.words[0].len(),
            PossibleLines::BlockBefore { inner } | PossibleLines::BlockAfter { inner } => {
                1 + inner.num_letters()
            }
            PossibleLines::BlockBetween { first, second } => {
                1 + first.num_letters() + second.num_letters()
            }
            PossibleLines::Compound { parts } => parts[0].num_letters(),
        }
    }

    /// An upper bound on the number of lines in the set. Distinct subtrees may
    /// describe the same line, so this can over-count.
    #[must_use]
    pub fn max_possibilities(&self) -> u64 {
        match &*self.0 {
            PossibleLines::Impossible { .. } => 0,
            PossibleLines::Definite { .. } => 1,
            PossibleLines::Words(ws) => ws.words.len() as u64,
            PossibleLines::BlockBefore { inner } | PossibleLines::BlockAfter { inner } => {
                inner.max_possibilities()
            }
            PossibleLines::BlockBetween { first, second } => first
                .max_possibilities()
                .saturating_mul(second.max_possibilities()),
            PossibleLines::Compound { parts } => parts
                .iter()
                .map(Lines::max_possibilities)
                .fold(0u64, u64::saturating_add),
        }
    }

    /// Union into `accumulate` the characters this set allows at `index`.
    pub fn chars_at(&self, accumulate: &mut CharSet, index: usize) {
        if accumulate.is_full() {
            return;
        }
        match &*self.0 {
            PossibleLines::Impossible { .. } => {}
            PossibleLines::Definite { line } => {
                accumulate
                    .add(line.cells[index])
                    .expect("line cells are within the alphabet");
            }
            PossibleLines::Words(ws) => {
                // A word list only ever contributes letters, so an accumulator
                // already holding every letter can't grow here.
                if accumulate.is_full_of_letters() {
                    return;
                }
                accumulate.add_all(&ws.masks()[index]);
            }
            PossibleLines::BlockBefore { inner } => {
                if index == 0 {
                    accumulate.add(BLOCKED).expect("sentinel is in range");
                } else {
                    inner.chars_at(accumulate, index - 1);
                }
            }
            PossibleLines::BlockAfter { inner } => {
                if index == inner.num_letters() {
                    accumulate.add(BLOCKED).expect("sentinel is in range");
                } else {
                    inner.chars_at(accumulate, index);
                }
            }
            PossibleLines::BlockBetween { first, second } => {
                let first_len = first.num_letters();
                if index == first_len {
                    accumulate.add(BLOCKED).expect("sentinel is in range");
                } else if index < first_len {
                    first.chars_at(accumulate, index);
                } else {
                    second.chars_at(accumulate, index - first_len - 1);
                }
            }
            PossibleLines::Compound { parts } => {
                for part in parts {
                    part.chars_at(accumulate, index);
                    if accumulate.is_full() {
                        return;
                    }
                }
            }
        }
    }

    /// True iff every line in the set has the blocked sentinel at `index`.
    #[must_use]
    pub fn definitely_blocked_at(&self, index: usize) -> bool {
        match &*self.0 {
            PossibleLines::Impossible { .. } | PossibleLines::Words(_) => false,
            PossibleLines::Definite { line } => line.cells[index] == BLOCKED,
            PossibleLines::BlockBefore { inner } => {
                index == 0 || inner.definitely_blocked_at(index - 1)
            }
            PossibleLines::BlockAfter { inner } => {
                index == inner.num_letters() || inner.definitely_blocked_at(index)
            }
            PossibleLines::BlockBetween { first, second } => {
                let first_len = first.num_letters();
                if index == first_len {
                    true
                } else if index < first_len {
                    first.definitely_blocked_at(index)
                } else {
                    second.definitely_blocked_at(index - first_len - 1)
                }
            }
            PossibleLines::Compound { parts } => {
                parts.iter().all(|part| part.definitely_blocked_at(index))
            }
        }
    }

    /// Words that appear in every line of the set, used to forbid reuse
    /// elsewhere in the grid.
    #[must_use]
    pub fn definite_words(&self) -> Vec<Arc<str>> {
        match &*self.0 {
            PossibleLines::Impossible { .. }
            | PossibleLines::Words(_)
            | PossibleLines::Compound { .. } => vec![],
            PossibleLines::Definite { line } => line.words.clone(),
            PossibleLines::BlockBefore { inner } | PossibleLines::BlockAfter { inner } => {
                inner.definite_words()
            }
            PossibleLines::BlockBetween { first, second } => {
                let mut words = first.definite_words();
                words.extend(second.definite_words());
                words
            }
        }
    }

    fn rebuild_block_before(&self, inner: &Lines, new_inner: Lines) -> Lines {
        if new_inner.is_impossible() {
            return Lines::impossible(self.num_letters());
        }
        if Lines::ptr_eq(inner, &new_inner) {
            return self.clone();
        }
        Lines(Arc::new(PossibleLines::BlockBefore { inner: new_inner }))
    }

    fn rebuild_block_after(&self, inner: &Lines, new_inner: Lines) -> Lines {
        if new_inner.is_impossible() {
            return Lines::impossible(self.num_letters());
        }
        if Lines::ptr_eq(inner, &new_inner) {
            return self.clone();
        }
        Lines(Arc::new(PossibleLines::BlockAfter { inner: new_inner }))
    }

    fn rebuild_block_between(
        &self,
        first: &Lines,
        second: &Lines,
        new_first: Lines,
        new_second: Lines,
    ) -> Lines {
        if new_first.is_impossible() || new_second.is_impossible() {
            return Lines::impossible(self.num_letters());
        }
        if Lines::ptr_eq(first, &new_first) && Lines::ptr_eq(second, &new_second) {
            return self.clone();
        }
        Lines(Arc::new(PossibleLines::BlockBetween {
            first: new_first,
            second: new_second,
        }))
    }

    /// Apply `apply` to every child of a `Compound`, dropping emptied children
    /// and returning the receiver when nothing changed.
    fn rebuild_parts(&self, parts: &[Lines], apply: impl Fn(&Lines) -> Lines) -> Lines {
        let mut changed = false;
        let mut rebuilt: Vec<Lines> = Vec::new();

        for (index, part) in parts.iter().enumerate() {
            let applied = apply(part);
            if !changed && !Lines::ptr_eq(part, &applied) {
                changed = true;
                rebuilt.reserve(parts.len());
                rebuilt.extend(parts[..index].iter().cloned());
            }
            if changed && !applied.is_impossible() {
                rebuilt.push(applied);
            }
        }

        if !changed {
            return self.clone();
        }
        Lines::compound(rebuilt, self.num_letters())
    }

    /// Restrict to lines whose cell at `index` equals `ch`.
    #[must_use]
    pub fn filter(&self, ch: char, index: usize) -> Lines {
        match &*self.0 {
            PossibleLines::Impossible { .. } => self.clone(),
            PossibleLines::Definite { line } => {
                if line.cells[index] == ch {
                    self.clone()
                } else {
                    Lines::impossible(self.num_letters())
                }
            }
            PossibleLines::Words(ws) => {
                if ch == BLOCKED {
                    return Lines::impossible(self.num_letters());
                }

                // If every word already complies there's nothing to copy.
                if ws
                    .words
                    .iter()
                    .all(|word| WordSet::char_at(word, index) == ch)
                {
                    return self.clone();
                }

                let mut kept: Vec<Arc<str>> = Vec::new();
                let mut kept_preferred = 0;
                for (word_idx, word) in ws.words.iter().enumerate() {
                    if WordSet::char_at(word, index) == ch {
                        if word_idx < ws.obscure_start {
                            kept_preferred += 1;
                        }
                        kept.push(Arc::clone(word));
                    }
                }
                Lines::words(kept, kept_preferred, self.num_letters())
            }
            PossibleLines::BlockBefore { inner } => {
                if index == 0 {
                    return if ch == BLOCKED {
                        self.clone()
                    } else {
                        Lines::impossible(self.num_letters())
                    };
                }
                self.rebuild_block_before(inner, inner.filter(ch, index - 1))
            }
            PossibleLines::BlockAfter { inner } => {
                if index == inner.num_letters() {
                    return if ch == BLOCKED {
                        self.clone()
                    } else {
                        Lines::impossible(self.num_letters())
                    };
                }
                self.rebuild_block_after(inner, inner.filter(ch, index))
            }
            PossibleLines::BlockBetween { first, second } => {
                let first_len = first.num_letters();
                if index == first_len {
                    return if ch == BLOCKED {
                        self.clone()
                    } else {
                        Lines::impossible(self.num_letters())
                    };
                }
                if index < first_len {
                    self.rebuild_block_between(
                        first,
                        second,
                        first.filter(ch, index),
                        second.clone(),
                    )
                } else {
                    self.rebuild_block_between(
                        first,
                        second,
                        first.clone(),
                        second.filter(ch, index - first_len - 1),
                    )
                }
            }
            PossibleLines::Compound { parts } => {
                self.rebuild_parts(parts, |part| part.filter(ch, index))
            }
        }
    }

    /// Restrict to lines whose cell at `index` is a member of `constraint`.
    #[must_use]
    pub fn filter_any(&self, constraint: &CharSet, index: usize) -> Lines {
        if constraint.is_full() {
            return self.clone();
        }
        match &*self.0 {
            PossibleLines::Impossible { .. } => self.clone(),
            PossibleLines::Definite { line } => {
                if constraint.contains(line.cells[index]) {
                    self.clone()
                } else {
                    Lines::impossible(self.num_letters())
                }
            }
            PossibleLines::Words(ws) => {
                // Word cells are always letters, so a constraint containing
                // every letter can't remove anything.
                if constraint.is_full_of_letters() {
                    return self.clone();
                }

                if let Some(masks) = ws.letter_masks.get() {
                    if constraint.contains_all(&masks[index]) {
                        return self.clone();
                    }
                }

                if ws
                    .words
                    .iter()
                    .all(|word| constraint.contains(WordSet::char_at(word, index)))
                {
                    return self.clone();
                }

                let mut kept: Vec<Arc<str>> = Vec::new();
                let mut kept_preferred = 0;
                for (word_idx, word) in ws.words.iter().enumerate() {
                    if constraint.contains(WordSet::char_at(word, index)) {
                        if word_idx < ws.obscure_start {
                            kept_preferred += 1;
                        }
                        kept.push(Arc::clone(word));
                    }
                }
                Lines::words(kept, kept_preferred, self.num_letters())
            }
            PossibleLines::BlockBefore { inner } => {
                if index == 0 {
                    return if constraint.contains(BLOCKED) {
                        self.clone()
                    } else {
                        Lines::impossible(self.num_letters())
                    };
                }
                self.rebuild_block_before(inner, inner.filter_any(constraint, index - 1))
            }
            PossibleLines::BlockAfter { inner } => {
                if index == inner.num_letters() {
                    return if constraint.contains(BLOCKED) {
                        self.clone()
                    } else {
                        Lines::impossible(self.num_letters())
                    };
                }
                self.rebuild_block_after(inner, inner.filter_any(constraint, index))
            }
            PossibleLines::BlockBetween { first, second } => {
                let first_len = first.num_letters();
                if index == first_len {
                    return if constraint.contains(BLOCKED) {
                        self.clone()
                    } else {
                        Lines::impossible(self.num_letters())
                    };
                }
                if index < first_len {
                    self.rebuild_block_between(
                        first,
                        second,
                        first.filter_any(constraint, index),
                        second.clone(),
                    )
                } else {
                    self.rebuild_block_between(
                        first,
                        second,
                        first.clone(),
                        second.filter_any(constraint, index - first_len - 1),
                    )
                }
            }
            PossibleLines::Compound { parts } => {
                self.rebuild_parts(parts, |part| part.filter_any(constraint, index))
            }
        }
    }

    /// Restrict to lines whose realised word list is disjoint from `words`.
    #[must_use]
    pub fn remove_word_options(&self, words: &[Arc<str>]) -> Lines {
        match &*self.0 {
            PossibleLines::Impossible { .. } => self.clone(),
            PossibleLines::Definite { line } => {
                let collides = words.iter().any(|word| {
                    word.len() <= line.len() && line.words.iter().any(|own| own == word)
                });
                if collides {
                    Lines::impossible(self.num_letters())
                } else {
                    self.clone()
                }
            }
            PossibleLines::Words(ws) => {
                let num_letters = self.num_letters();
                let needs_filtering = words.iter().any(|word| {
                    word.len() == num_letters && ws.words.iter().any(|own| own == word)
                });
                if !needs_filtering {
                    return self.clone();
                }

                let mut kept: Vec<Arc<str>> = Vec::with_capacity(ws.words.len() - 1);
                let mut kept_preferred = 0;
                for (word_idx, word) in ws.words.iter().enumerate() {
                    if !words.iter().any(|removed| removed == word) {
                        if word_idx < ws.obscure_start {
                            kept_preferred += 1;
                        }
                        kept.push(Arc::clone(word));
                    }
                }
                Lines::words(kept, kept_preferred, num_letters)
            }
            PossibleLines::BlockBefore { inner } => {
                self.rebuild_block_before(inner, inner.remove_word_options(words))
            }
            PossibleLines::BlockAfter { inner } => {
                self.rebuild_block_after(inner, inner.remove_word_options(words))
            }
            PossibleLines::BlockBetween { first, second } => self.rebuild_block_between(
                first,
                second,
                first.remove_word_options(words),
                second.remove_word_options(words),
            ),
            PossibleLines::Compound { parts } => {
                self.rebuild_parts(parts, |part| part.remove_word_options(words))
            }
        }
    }

    /// Any single line from the set, or `None` when empty.
    #[must_use]
    pub fn first_line(&self) -> Option<ConcreteLine> {
        match &*self.0 {
            PossibleLines::Impossible { .. } => None,
            PossibleLines::Definite { line } => Some(line.clone()),
            PossibleLines::Words(ws) => Some(ConcreteLine::from_word(&ws.words[0])),
            PossibleLines::BlockBefore { inner } => {
                inner.first_line().map(|line| line.with_block_before())
            }
            PossibleLines::BlockAfter { inner } => {
                inner.first_line().map(|line| line.with_block_after())
            }
            PossibleLines::BlockBetween { first, second } => {
                match (first.first_line(), second.first_line()) {
                    (Some(f), Some(s)) => Some(ConcreteLine::joined_by_block(&f, &s)),
                    _ => None,
                }
            }
            PossibleLines::Compound { parts } => parts.iter().find_map(Lines::first_line),
        }
    }

    /// A restartable lazy iterator over every line in the set.
    pub fn iter_lines(&self) -> Box<dyn Iterator<Item = ConcreteLine> + '_> {
        match &*self.0 {
            PossibleLines::Impossible { .. } => Box::new(std::iter::empty()),
            PossibleLines::Definite { line } => Box::new(std::iter::once(line.clone())),
            PossibleLines::Words(ws) => {
                Box::new(ws.words.iter().map(ConcreteLine::from_word))
            }
            PossibleLines::BlockBefore { inner } => {
                Box::new(inner.iter_lines().map(|line| line.with_block_before()))
            }
            PossibleLines::BlockAfter { inner } => {
                Box::new(inner.iter_lines().map(|line| line.with_block_after()))
            }
            PossibleLines::BlockBetween { first, second } => {
                Box::new(first.iter_lines().flat_map(move |f| {
                    second
                        .iter_lines()
                        .map(move |s| ConcreteLine::joined_by_block(&f, &s))
                }))
            }
            PossibleLines::Compound { parts } => {
                Box::new(parts.iter().flat_map(Lines::iter_lines))
            }
        }
    }

    /// Split the set into two non-empty subsets for branching.
    ///
    /// Callers must check `max_possibilities() > 1` first; calling this on a
    /// set with at most one element is a contract violation and panics.
    #[must_use]
    pub fn make_choice(&self) -> ChoiceStep {
        match &*self.0 {
            PossibleLines::Impossible { .. } => {
                panic!("cannot make a choice on an impossible set")
            }
            PossibleLines::Definite { .. } => {
                panic!("cannot make a choice on a definite line")
            }
            PossibleLines::Words(ws) => {
                assert!(
                    ws.words.len() > 1,
                    "cannot make a choice with one or fewer options"
                );

                let mid = ws.words.len() / 2;
                let (front, back) = ws.words.split_at(mid);
                let (front_preferred, back_preferred) = if ws.obscure_start < front.len() {
                    (ws.obscure_start, 0)
                } else {
                    (front.len(), ws.obscure_start - front.len())
                };

                ChoiceStep {
                    chosen: Lines::words(front.to_vec(), front_preferred, self.num_letters()),
                    remaining: Lines::words(back.to_vec(), back_preferred, self.num_letters()),
                }
            }
            PossibleLines::BlockBefore { inner } => {
                let step = inner.make_choice();
                ChoiceStep {
                    chosen: Lines::block_before(step.chosen),
                    remaining: Lines::block_before(step.remaining),
                }
            }
            PossibleLines::BlockAfter { inner } => {
                let step = inner.make_choice();
                ChoiceStep {
                    chosen: Lines::block_after(step.chosen),
                    remaining: Lines::block_after(step.remaining),
                }
            }
            PossibleLines::BlockBetween { first, second } => {
                if first.max_possibilities() > second.max_possibilities() {
                    let step = first.make_choice();
                    ChoiceStep {
                        chosen: Lines::block_between(step.chosen, second.clone()),
                        remaining: Lines::block_between(step.remaining, second.clone()),
                    }
                } else {
                    let step = second.make_choice();
                    ChoiceStep {
                        chosen: Lines::block_between(first.clone(), step.chosen),
                        remaining: Lines::block_between(first.clone(), step.remaining),
                    }
                }
            }
            PossibleLines::Compound { parts } => {
                assert!(
                    self.max_possibilities() > 1,
                    "cannot make a choice with one or fewer options"
                );

                // Weighted split: walk until the left side holds about half of
                // the possibilities, keeping both sides non-empty.
                let total: u64 = self.max_possibilities();
                let half = total / 2;
                let mut accumulated = 0u64;
                let mut split_idx = 1;
                for (index, part) in parts.iter().enumerate() {
                    accumulated = accumulated.saturating_add(part.max_possibilities());
                    if accumulated >= half && index + 1 < parts.len() {
                        split_idx = index + 1;
                        break;
                    }
                }

                let (front, back) = parts.split_at(split_idx);
                ChoiceStep {
                    chosen: Lines::compound(front.to_vec(), self.num_letters()),
                    remaining: Lines::compound(back.to_vec(), self.num_letters()),
                }
            }
        }
    }
}

fn abbreviated_list(words: &[Arc<str>]) -> String {
    const MAX_PRINT: usize = 3;

    if words.is_empty() {
        return "[]".to_string();
    }
    let shown: Vec<&str> = words.iter().take(MAX_PRINT).map(|w| &**w).collect();
    if words.len() <= MAX_PRINT {
        format!("[{}]", shown.join(", "))
    } else {
        format!("[{}, ...{}]", shown.join(", "), words.len() - MAX_PRINT)
    }
}

impl fmt::Display for Lines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            PossibleLines::Impossible { num_letters } => write!(f, "Impossible({num_letters})"),
            PossibleLines::Definite { line } => {
                let raw: String = line.cells.iter().collect();
                write!(f, "Definite({raw})")
            }
            PossibleLines::Words(ws) => write!(
                f,
                "Words({}, {})",
                abbreviated_list(&ws.words[..ws.obscure_start]),
                abbreviated_list(&ws.words[ws.obscure_start..])
            ),
            PossibleLines::BlockBefore { inner } => write!(f, "BlockBefore({inner})"),
            PossibleLines::BlockAfter { inner } => write!(f, "BlockAfter({inner})"),
            PossibleLines::BlockBetween { first, second } => {
                write!(f, "BlockBetween({first}, {second})")
            }
            PossibleLines::Compound { parts } => {
                write!(f, "Compound({} and {} others)", parts[0], parts.len() - 1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arc(s: &str) -> Arc<str> {
        Arc::from(s)
    }

    fn word_lines(words: &[&str], obscure_start: usize) -> Lines {
        let len = words[0].len();
        Lines::words(words.iter().map(|w| arc(w)).collect(), obscure_start, len)
    }

    fn rendered(lines: &Lines) -> Vec<String> {
        lines.iter_lines().map(|line| line.to_string()).collect()
    }

    #[test]
    fn test_impossible_is_memoised() {
        let a = Lines::impossible(5);
        let b = Lines::impossible(5);
        assert!(Lines::ptr_eq(&a, &b));
        assert_eq!(a.num_letters(), 5);
        assert_eq!(a.max_possibilities(), 0);
        assert!(a.first_line().is_none());
    }

    #[test]
    fn test_words_constructor_collapses() {
        assert!(Lines::words(vec![], 0, 4).is_impossible());

        let single = Lines::words(vec![arc("cat")], 1, 3);
        assert!(matches!(*single.node(), PossibleLines::Definite { .. }));
        assert_eq!(single.max_possibilities(), 1);

        let pair = word_lines(&["cat", "cot"], 2);
        assert!(matches!(*pair.node(), PossibleLines::Words(_)));
        assert_eq!(pair.max_possibilities(), 2);
    }

    #[test]
    fn test_compound_constructor_flattens() {
        let inner = Lines::compound(
            vec![word_lines(&["cat", "cot"], 2), word_lines(&["dog", "dot"], 2)],
            3,
        );
        let outer = Lines::compound(
            vec![inner, Lines::impossible(3), word_lines(&["pig", "pit"], 2)],
            3,
        );

        match outer.node() {
            PossibleLines::Compound { parts } => assert_eq!(parts.len(), 3),
            other => panic!("expected flattened compound, got {other:?}"),
        }
        assert_eq!(outer.max_possibilities(), 6);
    }

    #[test]
    fn test_chars_at_matches_iteration() {
        let lines = Lines::compound(
            vec![
                word_lines(&["cat", "cot"], 2),
                Lines::block_before(Lines::words(vec![arc("at")], 1, 2)),
            ],
            3,
        );

        for index in 0..3 {
            let mut from_op = CharSet::new();
            lines.chars_at(&mut from_op, index);

            let mut from_iteration = CharSet::new();
            for line in lines.iter_lines() {
                from_iteration.add(line.cells[index]).unwrap();
            }

            assert_eq!(from_op, from_iteration, "position {index}");
        }
    }

    #[test]
    fn test_filter_compound_across_subtrees() {
        // Filtering a union at ('o', 1) keeps exactly the lines whose second
        // cell is 'o', across both word lists.
        let lines = Lines::compound(
            vec![
                word_lines(&["cat", "cot", "car"], 3),
                word_lines(&["dog", "dot"], 2),
            ],
            3,
        );

        let filtered = lines.filter('o', 1);
        let mut got = rendered(&filtered);
        got.sort();
        assert_eq!(got, vec!["COT", "DOG", "DOT"]);
    }

    #[test]
    fn test_filter_returns_receiver_when_compliant() {
        let lines = word_lines(&["dog", "dot"], 2);
        let filtered = lines.filter('o', 1);
        assert!(Lines::ptr_eq(&lines, &filtered));

        let mut constraint = CharSet::new();
        constraint.add('o').unwrap();
        let filtered_any = lines.filter_any(&constraint, 1);
        assert!(Lines::ptr_eq(&lines, &filtered_any));
    }

    #[test]
    fn test_filter_consistent_with_chars_at() {
        let lines = Lines::compound(
            vec![
                word_lines(&["cat", "cot", "car"], 3),
                Lines::block_after(word_lines(&["at", "it"], 2)),
            ],
            3,
        );

        for index in 0..3 {
            let mut allowed = CharSet::new();
            lines.chars_at(&mut allowed, index);

            for ch in std::iter::once(BLOCKED).chain('a'..='z') {
                let filtered = lines.filter(ch, index);
                assert_eq!(
                    allowed.contains(ch),
                    !filtered.is_impossible(),
                    "char {ch:?} at {index}"
                );
            }
        }
    }

    #[test]
    fn test_filter_any_with_full_set_is_identity() {
        let lines = word_lines(&["cat", "cot"], 2);
        let mut full = CharSet::new();
        for ch in std::iter::once(BLOCKED).chain('a'..='z') {
            full.add(ch).unwrap();
        }
        assert!(Lines::ptr_eq(&lines, &lines.filter_any(&full, 0)));
    }

    #[test]
    fn test_filter_blocked_on_words_is_impossible() {
        let lines = word_lines(&["cat", "cot"], 2);
        assert!(lines.filter(BLOCKED, 0).is_impossible());
    }

    #[test]
    fn test_block_positions() {
        let inner = word_lines(&["cat", "dog"], 2);
        let before = Lines::block_before(inner.clone());
        let after = Lines::block_after(inner.clone());
        let between = Lines::block_between(inner.clone(), word_lines(&["pig", "pit"], 2));

        assert!(before.definitely_blocked_at(0));
        assert!(!before.definitely_blocked_at(1));
        assert_eq!(before.num_letters(), 4);

        assert!(after.definitely_blocked_at(3));
        assert!(!after.definitely_blocked_at(0));

        assert!(between.definitely_blocked_at(3));
        assert!(!between.definitely_blocked_at(2));
        assert_eq!(between.num_letters(), 7);
        assert_eq!(between.max_possibilities(), 4);
    }

    #[test]
    fn test_filter_at_block_position() {
        let before = Lines::block_before(word_lines(&["cat", "dog"], 2));
        assert!(Lines::ptr_eq(&before, &before.filter(BLOCKED, 0)));
        assert!(before.filter('a', 0).is_impossible());

        let narrowed = before.filter('d', 1);
        assert_eq!(rendered(&narrowed), vec!["`DOG"]);
    }

    #[test]
    fn test_remove_word_options() {
        let lines = word_lines(&["cat", "cot", "dog"], 3);
        let removed = lines.remove_word_options(&[arc("cot")]);
        let mut got = rendered(&removed);
        got.sort();
        assert_eq!(got, vec!["CAT", "DOG"]);

        // Idempotent: removing again returns the receiver.
        let removed_twice = removed.remove_word_options(&[arc("cot")]);
        assert!(Lines::ptr_eq(&removed, &removed_twice));

        // Words of a different length never match.
        let unchanged = lines.remove_word_options(&[arc("cats")]);
        assert!(Lines::ptr_eq(&lines, &unchanged));
    }

    #[test]
    fn test_remove_word_options_through_blocks() {
        let between = Lines::block_between(
            word_lines(&["cat", "cot"], 2),
            word_lines(&["dog", "dot"], 2),
        );
        let removed = between.remove_word_options(&[arc("dog")]);
        let mut got = rendered(&removed);
        got.sort();
        assert_eq!(got, vec!["CAT`DOT", "COT`DOT"]);
    }

    #[test]
    fn test_definite_words() {
        let definite = Lines::definite(ConcreteLine::joined_by_block(
            &ConcreteLine::from_word(&arc("cat")),
            &ConcreteLine::from_word(&arc("dog")),
        ));
        let words: Vec<String> = definite
            .definite_words()
            .iter()
            .map(|w| w.to_string())
            .collect();
        assert_eq!(words, vec!["cat", "dog"]);

        // A multi-word set promises nothing.
        assert!(word_lines(&["cat", "cot"], 2).definite_words().is_empty());

        let between = Lines::block_between(
            Lines::words(vec![arc("cat")], 1, 3),
            word_lines(&["dog", "dot"], 2),
        );
        let words: Vec<String> = between
            .definite_words()
            .iter()
            .map(|w| w.to_string())
            .collect();
        assert_eq!(words, vec!["cat"]);
    }

    #[test]
    fn test_make_choice_partitions_words() {
        let lines = word_lines(&["ant", "bee", "cow", "doe", "elk"], 3);
        let step = lines.make_choice();

        assert!(step.chosen.max_possibilities() >= 1);
        assert!(step.remaining.max_possibilities() >= 1);

        let mut combined = rendered(&step.chosen);
        combined.extend(rendered(&step.remaining));
        combined.sort();
        assert_eq!(combined, vec!["ANT", "BEE", "COW", "DOE", "ELK"]);
    }

    #[test]
    fn test_make_choice_rebalances_obscure_boundary() {
        // Two preferred, three obscure; the front half is all preferred.
        let lines = word_lines(&["ant", "bee", "cow", "doe", "elk"], 2);
        let step = lines.make_choice();

        match step.chosen.node() {
            PossibleLines::Words(ws) => assert_eq!(ws.obscure_start, 2),
            other => panic!("expected words, got {other:?}"),
        }
        match step.remaining.node() {
            PossibleLines::Words(ws) => assert_eq!(ws.obscure_start, 0),
            other => panic!("expected words, got {other:?}"),
        }
    }

    #[test]
    fn test_make_choice_partitions_compound() {
        let lines = Lines::compound(
            vec![
                word_lines(&["ant", "bee"], 2),
                word_lines(&["cow", "doe"], 2),
                word_lines(&["elk", "fox"], 2),
            ],
            3,
        );
        let step = lines.make_choice();

        let mut combined = rendered(&step.chosen);
        combined.extend(rendered(&step.remaining));
        combined.sort();
        assert_eq!(combined, vec!["ANT", "BEE", "COW", "DOE", "ELK", "FOX"]);
    }

    #[test]
    fn test_make_choice_splits_larger_half_of_block_between() {
        let between = Lines::block_between(
            word_lines(&["cat", "cot", "car", "cab"], 4),
            word_lines(&["dog", "dot"], 2),
        );
        let step = between.make_choice();

        // The 4-word first half gets split; the second half rides along.
        assert_eq!(step.chosen.max_possibilities(), 4);
        assert_eq!(step.remaining.max_possibilities(), 4);

        let mut combined: Vec<String> = rendered(&step.chosen);
        combined.extend(rendered(&step.remaining));
        assert_eq!(combined.len(), 8);
    }

    #[test]
    #[should_panic(expected = "definite")]
    fn test_make_choice_on_definite_panics() {
        let definite = Lines::definite(ConcreteLine::from_word(&arc("cat")));
        let _ = definite.make_choice();
    }

    #[test]
    fn test_iterate_is_restartable() {
        let lines = word_lines(&["cat", "cot"], 2);
        assert_eq!(rendered(&lines), vec!["CAT", "COT"]);
        assert_eq!(rendered(&lines), vec!["CAT", "COT"]);
    }

    #[test]
    fn test_block_between_iterates_cross_product() {
        let between = Lines::block_between(
            word_lines(&["cat", "cot"], 2),
            word_lines(&["dog", "dot"], 2),
        );
        assert_eq!(
            rendered(&between),
            vec!["CAT`DOG", "CAT`DOT", "COT`DOG", "COT`DOT"]
        );
    }

    #[test]
    fn test_display() {
        let lines = word_lines(&["cat", "cot", "car", "cab"], 2);
        assert_eq!(lines.to_string(), "Words([cat, cot], [car, cab])");
        assert_eq!(Lines::impossible(4).to_string(), "Impossible(4)");
    }
}
