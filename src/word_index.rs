//! A reverse index over the dictionary: for each cell position, which words
//! put which letter there. Built once per generator and used by
//! pattern-completion helpers; the propagation loop itself never consults it.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::word_list::WordList;

/// For each position `k`, a map from letter to the sorted set of words whose
/// `k`-th letter is that letter (only words long enough to have one).
#[derive(Debug)]
pub struct PositionIndex {
    by_position: Vec<HashMap<char, BTreeSet<Arc<str>>>>,
    all_words: BTreeSet<Arc<str>>,
}

impl PositionIndex {
    /// Index every word in the list across `positions` cell positions.
    #[must_use]
    pub fn build(word_list: &WordList, positions: usize) -> PositionIndex {
        let mut by_position: Vec<HashMap<char, BTreeSet<Arc<str>>>> =
            (0..positions).map(|_| HashMap::new()).collect();
        let mut all_words = BTreeSet::new();

        for word in word_list.iter() {
            all_words.insert(Arc::clone(word));
            for (position, ch) in word.chars().enumerate().take(positions) {
                by_position[position]
                    .entry(ch)
                    .or_insert_with(BTreeSet::new)
                    .insert(Arc::clone(word));
            }
        }

        PositionIndex {
            by_position,
            all_words,
        }
    }

    #[must_use]
    pub fn positions(&self) -> usize {
        self.by_position.len()
    }

    /// The words with `letter` at `position`, if any.
    #[must_use]
    pub fn words_at(&self, position: usize, letter: char) -> Option<&BTreeSet<Arc<str>>> {
        self.by_position.get(position)?.get(&letter)
    }

    /// The words compatible with a template of optional cells: the
    /// intersection of the per-position sets for each fixed cell. A template
    /// with no fixed cells matches the whole dictionary.
    #[must_use]
    pub fn matching_words(&self, template: &[Option<char>]) -> BTreeSet<Arc<str>> {
        let mut result: Option<BTreeSet<Arc<str>>> = None;

        for (position, cell) in template.iter().enumerate() {
            let Some(letter) = cell else {
                continue;
            };

            let matches = match self.words_at(position, *letter) {
                Some(words) => words,
                None => return BTreeSet::new(),
            };

            result = Some(match result {
                None => matches.clone(),
                Some(current) => current.intersection(matches).cloned().collect(),
            });

            if let Some(current) = &result {
                if current.is_empty() {
                    return BTreeSet::new();
                }
            }
        }

        result.unwrap_or_else(|| self.all_words.clone())
    }
}
