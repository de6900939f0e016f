//! The joint search state: one pattern set per row and per column, plus the
//! fixed-point tightening that keeps the two axes consistent. Tightening is
//! the crossword analogue of an arc-consistency pass: the characters each
//! entry on one axis can still supply become per-cell constraints on the
//! other axis.

use log::debug;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde_derive::{Deserialize, Serialize};

use crate::char_set::CharSet;
use crate::possible_lines::Lines;
use crate::MAX_GRID_SIZE;

/// The orientation of a line in the grid.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Direction {
    Across,
    Down,
}

impl Direction {
    #[must_use]
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Across => Direction::Down,
            Direction::Down => Direction::Across,
        }
    }
}

/// How many tightening passes we run before giving up on reaching a local
/// fixed point. The constraint is symmetric, so alternating directions
/// converges quickly in practice; a change-free pass proves we're done.
const MAX_PROPAGATION_PASSES: usize = 4;

/// Per-position allowed-character sets for one line.
type CharSetsByCell = SmallVec<[CharSet; MAX_GRID_SIZE]>;

/// The paired row and column pattern sets for an N×N grid. Entries are
/// immutable and shared, so cloning a state is cheap and search branches
/// never interfere.
#[derive(Debug, Clone)]
pub struct GridState {
    size: usize,
    across: Vec<Lines>,
    down: Vec<Lines>,
}

impl GridState {
    /// Build a state where every row and column starts from the same pattern
    /// set (which must have length `size`).
    #[must_use]
    pub fn new(size: usize, initial: &Lines) -> GridState {
        debug_assert_eq!(initial.num_letters(), size);
        GridState {
            size,
            across: (0..size).map(|_| initial.clone()).collect(),
            down: (0..size).map(|_| initial.clone()).collect(),
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn entries(&self, direction: Direction) -> &[Lines] {
        match direction {
            Direction::Across => &self.across,
            Direction::Down => &self.down,
        }
    }

    /// A copy of this state with one entry replaced.
    #[must_use]
    pub fn with_entry(&self, direction: Direction, index: usize, entry: Lines) -> GridState {
        #[cfg(feature = "check_invariants")]
        assert_eq!(entry.num_letters(), self.size, "entry has the wrong length");

        let mut state = self.clone();
        match direction {
            Direction::Across => state.across[index] = entry,
            Direction::Down => state.down[index] = entry,
        }
        state
    }

    /// Indices on the given axis that still admit more than one line.
    #[must_use]
    pub fn undecided(&self, direction: Direction) -> Vec<usize> {
        self.entries(direction)
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.max_possibilities() > 1)
            .map(|(index, _)| index)
            .collect()
    }

    /// Has every entry on both axes been reduced to a single line?
    #[must_use]
    pub fn fully_decided(&self) -> bool {
        self.across
            .iter()
            .chain(self.down.iter())
            .all(|entry| entry.max_possibilities() == 1)
    }

    /// Does any entry on either axis admit no lines at all?
    #[must_use]
    pub fn is_unsatisfiable(&self) -> bool {
        self.across
            .iter()
            .chain(self.down.iter())
            .any(Lines::is_impossible)
    }

    fn entry_iter(&self) -> impl Iterator<Item = &Lines> {
        self.across.iter().chain(self.down.iter())
    }

    /// One tightening pass in the given direction: every entry on the target
    /// axis is restricted, cell by cell, to the characters the crossing
    /// entries can still supply. Returns the tightened state and whether
    /// anything changed.
    fn tighten(&self, target: Direction) -> (GridState, bool) {
        if self.is_unsatisfiable() {
            return (self.clone(), false);
        }

        let constraints = self.entries(target.opposite());

        // allowed[x][y] is the set of characters constraint entry x admits at
        // its position y; cell x of target entry y crosses there.
        let allowed: Vec<CharSetsByCell> = constraints
            .iter()
            .map(|entry| {
                (0..self.size)
                    .map(|position| {
                        let mut chars = CharSet::new();
                        entry.chars_at(&mut chars, position);
                        chars
                    })
                    .collect()
            })
            .collect();

        let mut changed = false;
        let tightened: Vec<Lines> = self
            .entries(target)
            .iter()
            .enumerate()
            .map(|(y, entry)| {
                let mut current = entry.clone();
                for (x, crossing) in allowed.iter().enumerate() {
                    current = current.filter_any(&crossing[y], x);
                    if current.is_impossible() {
                        break;
                    }
                }
                if !Lines::ptr_eq(entry, &current) {
                    changed = true;
                }
                current
            })
            .collect();

        let state = match target {
            Direction::Across => GridState {
                size: self.size,
                across: tightened,
                down: self.down.clone(),
            },
            Direction::Down => GridState {
                size: self.size,
                across: self.across.clone(),
                down: tightened,
            },
        };
        (state, changed)
    }

    /// Enforce word uniqueness: any word that is certain to appear in one
    /// entry is removed as an option from every other entry, and an entry
    /// certain to contain the same word twice is emptied outright.
    fn remove_duplicate_words(&self) -> (GridState, bool) {
        let definite: Vec<Vec<Arc<str>>> =
            self.entry_iter().map(Lines::definite_words).collect();

        if definite.iter().all(Vec::is_empty) {
            return (self.clone(), false);
        }

        let mut changed = false;
        let rebuilt: Vec<Lines> = self
            .entry_iter()
            .enumerate()
            .map(|(entry_id, entry)| {
                let own = &definite[entry_id];
                let has_internal_dupe = own
                    .iter()
                    .enumerate()
                    .any(|(i, word)| own[..i].contains(word));
                if has_internal_dupe {
                    changed = true;
                    return Lines::impossible(self.size);
                }

                let elsewhere: Vec<Arc<str>> = definite
                    .iter()
                    .enumerate()
                    .filter(|&(other_id, _)| other_id != entry_id)
                    .flat_map(|(_, words)| words.iter().cloned())
                    .collect();
                if elsewhere.is_empty() {
                    return entry.clone();
                }

                let stripped = entry.remove_word_options(&elsewhere);
                if !Lines::ptr_eq(entry, &stripped) {
                    changed = true;
                }
                stripped
            })
            .collect();

        let (across, down) = rebuilt.split_at(self.size);
        (
            GridState {
                size: self.size,
                across: across.to_vec(),
                down: down.to_vec(),
            },
            changed,
        )
    }

    /// Alternate tightening directions until a pass changes nothing, checking
    /// the cancellation flag between passes. The result is never looser than
    /// the input. Tightening flows from rows into columns first.
    #[must_use]
    pub fn propagate(&self, cancel: Option<&AtomicBool>) -> GridState {
        self.propagate_from(Direction::Down, cancel)
    }

    /// `propagate`, but with the first pass aimed at the given axis. When one
    /// entry was just narrowed, aiming the first pass at the opposite axis
    /// carries that information outward immediately.
    #[must_use]
    pub fn propagate_from(
        &self,
        first_target: Direction,
        cancel: Option<&AtomicBool>,
    ) -> GridState {
        let mut state = self.clone();

        for pass in 0..MAX_PROPAGATION_PASSES {
            if cancel.map_or(false, |flag| flag.load(Ordering::Relaxed)) {
                return state;
            }

            let target = if pass % 2 == 0 {
                first_target
            } else {
                first_target.opposite()
            };

            let (tightened, mut pass_changed) = state.tighten(target);
            state = tightened;

            let (deduped, dedup_changed) = state.remove_duplicate_words();
            state = deduped;
            pass_changed |= dedup_changed;

            if !pass_changed {
                debug!("propagation reached a fixed point after {} passes", pass + 1);
                return state;
            }
        }

        debug!("propagation stopped at the pass cap");
        state
    }
}
