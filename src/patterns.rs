//! Builds the initial pattern set for a line of a given length: every
//! sequence that decomposes into dictionary words of length ≥ 3 separated by
//! single blocked cells, with at most one leading and one trailing block and
//! never two blocks adjacent.
//!
//! Patterns are produced by unique decomposition so no line is described by
//! two subtrees: an interior pattern (no edge blocks) always splits at its
//! first gap into a plain word and a smaller interior pattern, and edge
//! blocks are peeled off outside that.

use std::sync::Arc;

use crate::possible_lines::Lines;
use crate::word_list::WordList;
use crate::MIN_WORD_LENGTH;

/// Enumerates admissible line patterns for one word list, memoising the
/// shared interior subtrees so that sibling patterns reference them rather
/// than rebuilding.
pub struct PatternEnumerator<'a> {
    word_list: &'a WordList,
    interior_memo: Vec<Option<Lines>>,
}

impl<'a> PatternEnumerator<'a> {
    #[must_use]
    pub fn new(word_list: &'a WordList) -> PatternEnumerator<'a> {
        PatternEnumerator {
            word_list,
            interior_memo: vec![],
        }
    }

    /// The set of single words that exactly fill `num_letters` cells.
    fn plain_words(&self, num_letters: usize) -> Lines {
        match self.word_list.bucket(num_letters) {
            Some(bucket) => {
                let preferred: Vec<Arc<str>> = bucket.preferred.clone();
                let obscure: Vec<Arc<str>> = bucket.obscure.clone();
                Lines::words_from_tiers(preferred, obscure, num_letters)
            }
            None => Lines::impossible(num_letters),
        }
    }

    /// Patterns with no block in the first or last cell: one word, or a word,
    /// a single block, and a smaller interior pattern.
    fn interior(&mut self, num_letters: usize) -> Lines {
        if num_letters < MIN_WORD_LENGTH {
            return Lines::impossible(num_letters);
        }
        if self.interior_memo.len() <= num_letters {
            self.interior_memo.resize(num_letters + 1, None);
        }
        if let Some(memoised) = &self.interior_memo[num_letters] {
            return memoised.clone();
        }

        let mut parts = vec![self.plain_words(num_letters)];
        // Both sides of the gap need room for a word, so the leading word runs
        // from MIN_WORD_LENGTH up to num_letters - MIN_WORD_LENGTH - 1.
        if num_letters >= 2 * MIN_WORD_LENGTH + 1 {
            for first_len in MIN_WORD_LENGTH..=num_letters - MIN_WORD_LENGTH - 1 {
                let rest = self.interior(num_letters - first_len - 1);
                parts.push(Lines::block_between(self.plain_words(first_len), rest));
            }
        }

        let built = Lines::compound(parts, num_letters);
        self.interior_memo[num_letters] = Some(built.clone());
        built
    }

    /// Every admissible pattern of the given length, as a single union.
    #[must_use]
    pub fn line_patterns(&mut self, num_letters: usize) -> Lines {
        if num_letters < MIN_WORD_LENGTH {
            return Lines::impossible(num_letters);
        }

        let bare = self.interior(num_letters);
        let trailing = Lines::block_after(self.interior(num_letters - 1));
        let leading = Lines::block_before(self.interior(num_letters - 1));
        let both = if num_letters >= MIN_WORD_LENGTH + 2 {
            Lines::block_before(Lines::block_after(self.interior(num_letters - 2)))
        } else {
            Lines::impossible(num_letters)
        };

        Lines::compound(vec![bare, trailing, leading, both], num_letters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::ConcreteLine;
    use crate::possible_lines::PossibleLines;
    use crate::BLOCKED;

    fn word_list(words: &[&str], max_length: usize) -> WordList {
        let raw: Vec<String> = words.iter().map(|w| w.to_string()).collect();
        WordList::new(&raw, &[], &[], max_length).unwrap()
    }

    fn all_lines(patterns: &Lines) -> Vec<String> {
        let mut lines: Vec<String> = patterns
            .iter_lines()
            .map(|line| line.cells.iter().collect())
            .collect();
        lines.sort();
        lines
    }

    fn contains_block_between(patterns: &Lines) -> bool {
        match patterns.node() {
            PossibleLines::BlockBetween { .. } => true,
            PossibleLines::BlockBefore { inner } | PossibleLines::BlockAfter { inner } => {
                contains_block_between(inner)
            }
            PossibleLines::Compound { parts } => parts.iter().any(contains_block_between),
            _ => false,
        }
    }

    #[test]
    fn test_too_short_is_impossible() {
        let words = word_list(&["cat"], 4);
        let mut enumerator = PatternEnumerator::new(&words);
        assert!(enumerator.line_patterns(2).is_impossible());
    }

    #[test]
    fn test_length_four_patterns() {
        let words = word_list(&["cat", "dog", "tart"], 4);
        let mut enumerator = PatternEnumerator::new(&words);
        let patterns = enumerator.line_patterns(4);

        assert_eq!(patterns.num_letters(), 4);
        assert_eq!(
            all_lines(&patterns),
            vec![
                "`cat".to_string(),
                "`dog".to_string(),
                "cat`".to_string(),
                "dog`".to_string(),
                "tart".to_string(),
            ]
        );
    }

    #[test]
    fn test_length_five_structure() {
        // With 4-letter words available, length 5 must offer a block before
        // and a block after them, and can't fit two segments anywhere.
        let words = word_list(&["cat", "tart", "aria"], 5);
        let mut enumerator = PatternEnumerator::new(&words);
        let patterns = enumerator.line_patterns(5);

        let parts = match patterns.node() {
            PossibleLines::Compound { parts } => parts,
            other => panic!("expected a compound, got {other:?}"),
        };

        let has_block_before_words = parts.iter().any(|part| {
            matches!(
                part.node(),
                PossibleLines::BlockBefore { inner }
                    if matches!(inner.node(), PossibleLines::Words(_)) && inner.num_letters() == 4
            )
        });
        let has_block_after_words = parts.iter().any(|part| {
            matches!(
                part.node(),
                PossibleLines::BlockAfter { inner }
                    if matches!(inner.node(), PossibleLines::Words(_)) && inner.num_letters() == 4
            )
        });

        assert!(has_block_before_words);
        assert!(has_block_after_words);
        assert!(!contains_block_between(&patterns));

        assert_eq!(
            all_lines(&patterns),
            vec![
                "`aria".to_string(),
                "`cat`".to_string(),
                "`tart".to_string(),
                "aria`".to_string(),
                "tart`".to_string(),
            ]
        );
    }

    #[test]
    fn test_length_seven_has_two_segment_patterns() {
        let words = word_list(&["cat", "dog"], 7);
        let mut enumerator = PatternEnumerator::new(&words);
        let patterns = enumerator.line_patterns(7);

        assert!(contains_block_between(&patterns));
        let lines = all_lines(&patterns);
        assert!(lines.contains(&"cat`dog".to_string()));
        assert!(lines.contains(&"dog`cat".to_string()));
        // A segment may pair with itself; the duplicate-word rule is enforced
        // later, during propagation.
        assert!(lines.contains(&"cat`cat".to_string()));
    }

    #[test]
    fn test_no_adjacent_blocks_and_no_short_segments() {
        let words = word_list(&["cat", "dog", "tart", "lambs", "marble"], 9);
        let mut enumerator = PatternEnumerator::new(&words);

        for num_letters in 3..=9 {
            let patterns = enumerator.line_patterns(num_letters);
            for line in patterns.iter_lines() {
                assert_eq!(line.len(), num_letters);

                let cells: Vec<char> = line.cells.iter().copied().collect();
                for pair in cells.windows(2) {
                    assert!(
                        !(pair[0] == BLOCKED && pair[1] == BLOCKED),
                        "adjacent blocks in {line}"
                    );
                }

                for segment in cells
                    .split(|&ch| ch == BLOCKED)
                    .filter(|segment| !segment.is_empty())
                {
                    let segment: String = segment.iter().collect();
                    assert!(segment.len() >= MIN_WORD_LENGTH, "short segment in {line}");
                    assert!(words.contains(&segment), "unknown segment in {line}");
                }
            }
        }
    }

    #[test]
    fn test_each_line_produced_once() {
        let words = word_list(&["cat", "dog", "tart", "lambs"], 9);
        let mut enumerator = PatternEnumerator::new(&words);

        for num_letters in 3..=9 {
            let patterns = enumerator.line_patterns(num_letters);
            let mut lines = all_lines(&patterns);
            let total = lines.len();
            lines.dedup();
            assert_eq!(lines.len(), total, "duplicate pattern at {num_letters}");
        }
    }

    #[test]
    fn test_words_carry_into_concrete_lines() {
        let words = word_list(&["cat", "dog"], 7);
        let mut enumerator = PatternEnumerator::new(&words);
        let patterns = enumerator.line_patterns(7);

        let two_segment: Vec<ConcreteLine> = patterns
            .iter_lines()
            .filter(|line| line.words.len() == 2)
            .collect();
        assert!(!two_segment.is_empty());
        for line in two_segment {
            assert!(line.words.iter().all(|word| words.contains(word)));
        }
    }
}
