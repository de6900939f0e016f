//! A fully-decided line of a grid: the cell characters plus the ordered list
//! of dictionary words the line realises.

use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

use crate::{BLOCKED, MAX_GRID_SIZE};

/// A resolved line. Cells hold letters or the blocked sentinel; `words` lists
/// the segments between blocks, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcreteLine {
    pub cells: SmallVec<[char; MAX_GRID_SIZE]>,
    pub words: Vec<Arc<str>>,
}

impl ConcreteLine {
    /// Build a line consisting of a single word with no blocked cells.
    #[must_use]
    pub fn from_word(word: &Arc<str>) -> ConcreteLine {
        ConcreteLine {
            cells: word.chars().collect(),
            words: vec![Arc::clone(word)],
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// This line with a blocked cell prepended.
    #[must_use]
    pub fn with_block_before(&self) -> ConcreteLine {
        let mut cells = SmallVec::with_capacity(self.cells.len() + 1);
        cells.push(BLOCKED);
        cells.extend_from_slice(&self.cells);
        ConcreteLine {
            cells,
            words: self.words.clone(),
        }
    }

    /// This line with a blocked cell appended.
    #[must_use]
    pub fn with_block_after(&self) -> ConcreteLine {
        let mut cells = self.cells.clone();
        cells.push(BLOCKED);
        ConcreteLine {
            cells,
            words: self.words.clone(),
        }
    }

    /// Two lines joined by a single blocked cell.
    #[must_use]
    pub fn joined_by_block(first: &ConcreteLine, second: &ConcreteLine) -> ConcreteLine {
        let mut cells = SmallVec::with_capacity(first.cells.len() + second.cells.len() + 1);
        cells.extend_from_slice(&first.cells);
        cells.push(BLOCKED);
        cells.extend_from_slice(&second.cells);

        let mut words = Vec::with_capacity(first.words.len() + second.words.len());
        words.extend(first.words.iter().cloned());
        words.extend(second.words.iter().cloned());

        ConcreteLine { cells, words }
    }
}

impl fmt::Display for ConcreteLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &cell in &self.cells {
            write!(f, "{}", cell.to_ascii_uppercase())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(s: &str) -> Arc<str> {
        Arc::from(s)
    }

    #[test]
    fn test_from_word() {
        let line = ConcreteLine::from_word(&word("cat"));
        assert_eq!(line.len(), 3);
        assert_eq!(line.cells.as_slice(), &['c', 'a', 't']);
        assert_eq!(line.words.len(), 1);
        assert_eq!(&*line.words[0], "cat");
    }

    #[test]
    fn test_block_combinators() {
        let cat = ConcreteLine::from_word(&word("cat"));
        let dog = ConcreteLine::from_word(&word("dog"));

        let before = cat.with_block_before();
        assert_eq!(before.cells.as_slice(), &[BLOCKED, 'c', 'a', 't']);
        assert_eq!(before.words.len(), 1);

        let after = cat.with_block_after();
        assert_eq!(after.cells.as_slice(), &['c', 'a', 't', BLOCKED]);

        let joined = ConcreteLine::joined_by_block(&cat, &dog);
        assert_eq!(joined.len(), 7);
        assert_eq!(joined.cells[3], BLOCKED);
        assert_eq!(&*joined.words[0], "cat");
        assert_eq!(&*joined.words[1], "dog");
    }

    #[test]
    fn test_display_uppercases() {
        let line = ConcreteLine::from_word(&word("cat")).with_block_after();
        assert_eq!(line.to_string(), "CAT`");
    }
}
