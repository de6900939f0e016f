//! The branching search that turns an initial pattern state into a lazy
//! stream of completed grids. Each node propagates to a fixed point, then
//! bisects one undecided entry and explores both halves; the stream is driven
//! by an explicit stack so the caller can pull grids one at a time and cancel
//! between pulls.

use log::{debug, info};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::grid_state::{Direction, GridState};
use crate::line::ConcreteLine;
use crate::patterns::PatternEnumerator;
use crate::possible_lines::Lines;
use crate::word_index::PositionIndex;
use crate::word_list::{WordList, WordListError};
use crate::{BLOCKED, MAX_GRID_SIZE, MIN_GRID_SIZE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratorError {
    InvalidGridSize(usize),
    EmptyDictionary,
    WordList(WordListError),
}

impl fmt::Display for GeneratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeneratorError::InvalidGridSize(size) => write!(
                f,
                "grid size {size} is out of range ({MIN_GRID_SIZE}..={MAX_GRID_SIZE})"
            ),
            GeneratorError::EmptyDictionary => {
                write!(f, "no usable words of any playable length")
            }
            GeneratorError::WordList(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for GeneratorError {}

impl From<WordListError> for GeneratorError {
    fn from(err: WordListError) -> GeneratorError {
        GeneratorError::WordList(err)
    }
}

/// A completed grid: one resolved line per row and per column.
#[derive(Debug, Clone)]
pub struct Grid {
    size: usize,
    across: Vec<ConcreteLine>,
    down: Vec<ConcreteLine>,
}

impl Grid {
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn lines(&self, direction: Direction) -> &[ConcreteLine] {
        match direction {
            Direction::Across => &self.across,
            Direction::Down => &self.down,
        }
    }

    /// Every word realised by the grid: across words first, then down.
    #[must_use]
    pub fn words(&self) -> Vec<Arc<str>> {
        self.across
            .iter()
            .chain(self.down.iter())
            .flat_map(|line| line.words.iter().cloned())
            .collect()
    }

    /// Human-readable rendering. Blocked cells print as `#`, empty cells as
    /// `_`, letters uppercase.
    #[must_use]
    pub fn repr(&self) -> String {
        self.across
            .iter()
            .map(|line| {
                line.cells
                    .iter()
                    .map(|&cell| match cell {
                        BLOCKED => '#',
                        ch if ch.is_ascii_lowercase() => ch.to_ascii_uppercase(),
                        _ => '_',
                    })
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// `repr` plus the realised word lists, for troubleshooting.
    #[must_use]
    pub fn debug_string(&self) -> String {
        let across_words: Vec<String> = self
            .across
            .iter()
            .flat_map(|line| line.words.iter().map(|w| w.to_string()))
            .collect();
        let down_words: Vec<String> = self
            .down
            .iter()
            .flat_map(|line| line.words.iter().map(|w| w.to_string()))
            .collect();
        format!(
            "{}\nacross: {}\ndown: {}",
            self.repr(),
            across_words.join(", "),
            down_words.join(", ")
        )
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Grid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let rows: Vec<String> = self.repr().lines().map(str::to_string).collect();
        rows.serialize(serializer)
    }
}

/// A configured grid generator. The word list and position index outlive any
/// number of `possible_grids` calls; each call starts an independent search
/// seeded identically, so the stream is reproducible.
#[derive(Debug)]
pub struct Generator {
    size: usize,
    word_list: WordList,
    position_index: PositionIndex,
    seed: u64,
}

impl Generator {
    /// Validate the configuration and prepare the dictionaries. The excluded
    /// words are removed from both tiers up front.
    pub fn new(
        size: usize,
        preferred: &[String],
        obscure: &[String],
        excluded: &[String],
        seed: u64,
    ) -> Result<Generator, GeneratorError> {
        if !(MIN_GRID_SIZE..=MAX_GRID_SIZE).contains(&size) {
            return Err(GeneratorError::InvalidGridSize(size));
        }

        let word_list = WordList::new(preferred, obscure, excluded, size)?;
        let position_index = PositionIndex::build(&word_list, size);
        info!(
            "generator ready: size {size}, {} words, seed {seed}",
            word_list.word_count()
        );

        Ok(Generator {
            size,
            word_list,
            position_index,
            seed,
        })
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn word_list(&self) -> &WordList {
        &self.word_list
    }

    #[must_use]
    pub fn position_index(&self) -> &PositionIndex {
        &self.position_index
    }

    /// Start a lazy search for completed grids. The stream ends when the
    /// space is exhausted or `cancel` becomes true; cancellation is observed
    /// between propagation passes and before each branch expansion, and no
    /// partial grid is ever produced.
    #[must_use]
    pub fn possible_grids(&self, cancel: Option<Arc<AtomicBool>>) -> GridStream<'_> {
        let mut enumerator = PatternEnumerator::new(&self.word_list);
        let patterns = enumerator.line_patterns(self.size);
        let initial = GridState::new(self.size, &patterns);

        GridStream {
            generator: self,
            cancel,
            rng: SmallRng::seed_from_u64(self.seed),
            stack: vec![SearchNode::root(initial)],
        }
    }
}

/// One expanded node of the search tree: a propagated state, the axis being
/// branched, and the branch bookkeeping for the entry currently split.
struct SearchNode {
    state: GridState,
    axis: Direction,
    undecided: Vec<usize>,
    cursor: usize,
    /// Unexplored child states of `undecided[cursor]`, popped from the back.
    pending: Vec<GridState>,
    /// Whether any grid has been produced beneath the current entry. Once an
    /// entry's subtree has produced something, the node stops expanding its
    /// remaining entries; this trades exhaustiveness for a quick stream of
    /// distinct grids.
    yielded: bool,
}

impl SearchNode {
    /// A pseudo-node that exists only to feed the initial state in.
    fn root(initial: GridState) -> SearchNode {
        SearchNode {
            state: initial.clone(),
            axis: Direction::Across,
            undecided: vec![],
            cursor: 0,
            pending: vec![initial],
            yielded: false,
        }
    }
}

/// The lazy stream of grids produced by `Generator::possible_grids`.
pub struct GridStream<'a> {
    generator: &'a Generator,
    cancel: Option<Arc<AtomicBool>>,
    rng: SmallRng,
    stack: Vec<SearchNode>,
}

impl<'a> GridStream<'a> {
    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map_or(false, |flag| flag.load(Ordering::Relaxed))
    }

    /// Two entries crossing on the main diagonal that are pinned to the same
    /// line make the grid degenerate; such branches are abandoned outright.
    fn is_diagonally_degenerate(state: &GridState) -> bool {
        let across = state.entries(Direction::Across);
        let down = state.entries(Direction::Down);

        (0..state.size()).any(|index| {
            if across[index].max_possibilities() != 1 || down[index].max_possibilities() != 1 {
                return false;
            }
            match (across[index].first_line(), down[index].first_line()) {
                (Some(row), Some(col)) => row.cells == col.cells,
                _ => false,
            }
        })
    }

    /// Extract the finished grid from a fully-decided state, checking that
    /// the axes agree cell-for-cell and that no word is used twice. A state
    /// failing either check is treated like any other dead branch.
    fn decided_grid(state: &GridState) -> Option<Grid> {
        let across: Vec<ConcreteLine> = state
            .entries(Direction::Across)
            .iter()
            .map(Lines::first_line)
            .collect::<Option<_>>()?;
        let down: Vec<ConcreteLine> = state
            .entries(Direction::Down)
            .iter()
            .map(Lines::first_line)
            .collect::<Option<_>>()?;

        for (y, row) in across.iter().enumerate() {
            for (x, &cell) in row.cells.iter().enumerate() {
                if down[x].cells[y] != cell {
                    return None;
                }
            }
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for line in across.iter().chain(down.iter()) {
            for word in &line.words {
                if !seen.insert(word) {
                    return None;
                }
            }
        }

        Some(Grid {
            size: state.size(),
            across,
            down,
        })
    }

    /// Choose which axis to branch on: a coin flip, falling back to whichever
    /// axis still has undecided entries.
    fn choose_axis(
        rng: &mut SmallRng,
        undecided_across: &[usize],
        undecided_down: &[usize],
    ) -> Direction {
        let prefer_across = rng.gen_bool(0.5);
        if prefer_across && !undecided_across.is_empty() {
            Direction::Across
        } else if !prefer_across && !undecided_down.is_empty() {
            Direction::Down
        } else if undecided_across.is_empty() {
            Direction::Down
        } else {
            Direction::Across
        }
    }

    /// Build the node for a propagated, not-fully-decided state, splitting
    /// its first undecided entry.
    fn expand(&mut self, state: GridState) -> SearchNode {
        let undecided_across = state.undecided(Direction::Across);
        let undecided_down = state.undecided(Direction::Down);
        let axis = GridStream::choose_axis(&mut self.rng, &undecided_across, &undecided_down);
        let undecided = match axis {
            Direction::Across => undecided_across,
            Direction::Down => undecided_down,
        };

        let mut node = SearchNode {
            state,
            axis,
            undecided,
            cursor: 0,
            pending: vec![],
            yielded: false,
        };
        node.pending = GridStream::branches_for(&node, node.undecided[0]);
        node
    }

    /// The two child states produced by bisecting one entry. The chosen half
    /// goes last so it's explored first.
    fn branches_for(node: &SearchNode, index: usize) -> Vec<GridState> {
        let step = node.state.entries(node.axis)[index].make_choice();
        vec![
            node.state.with_entry(node.axis, index, step.remaining),
            node.state.with_entry(node.axis, index, step.chosen),
        ]
    }
}

impl<'a> Iterator for GridStream<'a> {
    type Item = Grid;

    fn next(&mut self) -> Option<Grid> {
        loop {
            if self.is_cancelled() {
                debug!("search cancelled; dropping {} pending nodes", self.stack.len());
                self.stack.clear();
                return None;
            }

            let top = self.stack.last_mut()?;

            if let Some(child) = top.pending.pop() {
                // Propagating with the first pass aimed across the axis we
                // just narrowed pushes the new information outward.
                let first_target = top.axis.opposite();
                let propagated =
                    child.propagate_from(first_target, self.cancel.as_deref());

                if propagated.is_unsatisfiable() {
                    continue;
                }

                if propagated.fully_decided() {
                    let Some(grid) = GridStream::decided_grid(&propagated) else {
                        continue;
                    };
                    for node in &mut self.stack {
                        node.yielded = true;
                    }
                    debug!("yielding grid at depth {}", self.stack.len());
                    return Some(grid);
                }

                if GridStream::is_diagonally_degenerate(&propagated) {
                    continue;
                }

                let node = self.expand(propagated);
                self.stack.push(node);
                continue;
            }

            // The current entry's children are exhausted. If its subtree
            // produced anything, this node is done; otherwise move on to the
            // next undecided entry.
            if top.yielded {
                self.stack.pop();
                continue;
            }

            top.cursor += 1;
            if top.cursor >= top.undecided.len() {
                self.stack.pop();
                continue;
            }
            let index = top.undecided[top.cursor];
            top.pending = GridStream::branches_for(top, index);
        }
    }
}
