//! Validated storage for the generator's dictionaries. Words arrive as two
//! tiers (preferred and obscure), get normalized and checked, and are bucketed
//! by length for the pattern enumerator.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use unicode_normalization::UnicodeNormalization;

use crate::MIN_WORD_LENGTH;

/// Given a raw word string from a dictionary, produce the normalized form used
/// by the engine: lowercase, NFC, no whitespace.
#[must_use]
pub fn normalize_word(raw: &str) -> String {
    raw.to_lowercase()
        .nfc()
        .filter(|c| !c.is_whitespace())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WordListError {
    InvalidWord(String),
}

impl fmt::Display for WordListError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WordListError::InvalidWord(word) => {
                write!(f, "Word list contains invalid word: “{word}”")
            }
        }
    }
}

impl std::error::Error for WordListError {}

/// Words of a single length, partitioned into tiers.
#[derive(Debug, Default, Clone)]
pub struct LengthBucket {
    pub preferred: Vec<Arc<str>>,
    pub obscure: Vec<Arc<str>>,
}

impl LengthBucket {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.preferred.is_empty() && self.obscure.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.preferred.len() + self.obscure.len()
    }
}

/// The two-tier dictionary for one generator instance, bucketed by length.
/// An index into `buckets` is the length of the words in the bucket, so the
/// buckets for lengths 0, 1 and 2 are always empty.
#[derive(Debug, Clone)]
pub struct WordList {
    buckets: Vec<LengthBucket>,
    max_length: usize,
    word_count: usize,
}

impl WordList {
    /// Build a word list from raw tiers. Words are normalized first; a word
    /// containing anything but `a`..`z` after normalization is an error.
    /// Words outside `MIN_WORD_LENGTH..=max_length`, excluded words, and
    /// duplicates are dropped silently.
    pub fn new(
        preferred: &[String],
        obscure: &[String],
        excluded: &[String],
        max_length: usize,
    ) -> Result<WordList, WordListError> {
        let mut excluded_set: HashSet<String> = HashSet::with_capacity(excluded.len());
        for word in excluded {
            excluded_set.insert(normalize_word(word));
        }

        let mut buckets: Vec<LengthBucket> = vec![LengthBucket::default(); max_length + 1];
        let mut seen: HashSet<String> = HashSet::new();
        let mut word_count = 0;

        let mut add_tier = |tier: &[String], preferred_tier: bool| -> Result<(), WordListError> {
            for raw in tier {
                let normalized = normalize_word(raw);
                if normalized.is_empty() || !normalized.chars().all(|ch| ch.is_ascii_lowercase()) {
                    return Err(WordListError::InvalidWord(raw.clone()));
                }

                let length = normalized.len();
                if !(MIN_WORD_LENGTH..=max_length).contains(&length) {
                    continue;
                }
                if excluded_set.contains(&normalized) || !seen.insert(normalized.clone()) {
                    continue;
                }

                let word: Arc<str> = Arc::from(normalized.as_str());
                if preferred_tier {
                    buckets[length].preferred.push(word);
                } else {
                    buckets[length].obscure.push(word);
                }
                word_count += 1;
            }
            Ok(())
        };

        add_tier(preferred, true)?;
        add_tier(obscure, false)?;

        Ok(WordList {
            buckets,
            max_length,
            word_count,
        })
    }

    #[must_use]
    pub fn max_length(&self) -> usize {
        self.max_length
    }

    #[must_use]
    pub fn word_count(&self) -> usize {
        self.word_count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.word_count == 0
    }

    /// The bucket for the given length; `None` for lengths we never loaded.
    #[must_use]
    pub fn bucket(&self, length: usize) -> Option<&LengthBucket> {
        self.buckets.get(length)
    }

    /// Is this exact word in either tier?
    #[must_use]
    pub fn contains(&self, word: &str) -> bool {
        self.buckets.get(word.len()).map_or(false, |bucket| {
            bucket.preferred.iter().any(|w| &**w == word)
                || bucket.obscure.iter().any(|w| &**w == word)
        })
    }

    /// All words, preferred tier first within each length.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<str>> {
        self.buckets
            .iter()
            .flat_map(|bucket| bucket.preferred.iter().chain(bucket.obscure.iter()))
    }
}

/// Parse the contents of a word-list file: one word per line, blank lines and
/// `#` comments skipped.
#[must_use]
pub fn parse_word_file(contents: &str) -> Vec<String> {
    contents
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                None
            } else {
                Some(line.to_string())
            }
        })
        .collect()
}
