//! Filtering of candidates that already exist in the library.
//!
//! Both filters here are pure functions over their arguments: calling them
//! again with the same inputs, or feeding their output back in, yields the same
//! result. They run twice per session, once per search bucket against the
//! index scanned before searching and once more on the user's selection against
//! a freshly scanned index, because the library may have changed in between.
//!
//! # Examples
//!
//! ```rust
//! use medley::dedupe;
//! use medley::library::LibraryIndex;
//! use medley::types::{Candidate, Identity};
//!
//! let index = LibraryIndex::from_identities([Identity::new("x", "y")]);
//! let candidates = vec![Candidate::new("X", "Y"), Candidate::new("X", "Z")];
//!
//! let filtered = dedupe::filter(candidates, &index);
//! assert_eq!(filtered.skipped, 1);
//! assert_eq!(filtered.kept[0].title, "Z");
//! ```

use std::collections::HashSet;

use crate::download::format_filename;
use crate::library::LibraryIndex;
use crate::types::Candidate;

/// Output of a deduplication pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Filtered {
    /// Candidates that survived, in input order.
    pub kept: Vec<Candidate>,
    /// How many candidates were dropped.
    pub skipped: usize,
}

/// Drops candidates whose identity is already in `index`.
///
/// A candidate matches when its normalized, trimmed-only or on-disk identity
/// is present (see [`LibraryIndex::matches`]). The filter is stable.
pub fn filter(candidates: Vec<Candidate>, index: &LibraryIndex) -> Filtered {
    let total = candidates.len();
    let kept: Vec<Candidate> = candidates
        .into_iter()
        .filter(|candidate| !index.matches(&candidate.identity()))
        .collect();

    Filtered {
        skipped: total - kept.len(),
        kept,
    }
}

/// Pre-download check of a user selection.
///
/// Applies [`filter`] and additionally drops any candidate that repeats an
/// earlier kept one, either by normalized identity or by generated filename
/// (compared case-insensitively). The same song picked from two sources is
/// only fetched once, and two downloads never target the same file.
pub fn filter_selection(candidates: Vec<Candidate>, index: &LibraryIndex) -> Filtered {
    let total = candidates.len();
    let mut seen = HashSet::new();
    let mut files = HashSet::new();
    let kept: Vec<Candidate> = candidates
        .into_iter()
        .filter(|candidate| {
            let identity = candidate.identity();
            if index.matches(&identity) || seen.contains(&identity.normalized()) {
                return false;
            }
            if !files.insert(format_filename(candidate).to_lowercase()) {
                return false;
            }
            seen.insert(identity.normalized());
            true
        })
        .collect();

    Filtered {
        skipped: total - kept.len(),
        kept,
    }
}

/// Extension trait for running the filters on candidate lists.
///
/// ```rust
/// use medley::dedupe::CandidateListExt;
/// use medley::library::LibraryIndex;
/// use medley::types::Candidate;
///
/// let list = vec![
///     Candidate::new("A", "B").with_source("kugou"),
///     Candidate::new("a", "b ").with_source("qq"),
/// ];
///
/// let unique = list.dedupe_by_identity();
/// assert_eq!(unique.len(), 1);
/// assert_eq!(unique[0].source, "kugou");
/// # let _ = LibraryIndex::new();
/// ```
pub trait CandidateListExt: Sized {
    /// Keeps only candidates absent from `index`.
    fn without_library(self, index: &LibraryIndex) -> Self;

    /// Removes repeated identities, keeping the first occurrence.
    fn dedupe_by_identity(self) -> Self;
}

impl CandidateListExt for Vec<Candidate> {
    fn without_library(self, index: &LibraryIndex) -> Self {
        filter(self, index).kept
    }

    fn dedupe_by_identity(mut self) -> Self {
        let mut seen = HashSet::new();
        self.retain(|candidate| seen.insert(candidate.identity().normalized()));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Identity;

    fn song(singer: &str, title: &str, source: &str) -> Candidate {
        Candidate::new(singer, title).with_source(source)
    }

    #[test]
    fn test_filter_is_stable() {
        let index = LibraryIndex::from_identities([Identity::new("b", "b")]);
        let input = vec![song("A", "A", "s1"), song("B", "B", "s1"), song("C", "C", "s2")];

        let filtered = filter(input, &index);
        let titles: Vec<_> = filtered.kept.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "C"]);
        assert_eq!(filtered.skipped, 1);
    }

    #[test]
    fn test_filter_is_idempotent() {
        let index = LibraryIndex::from_identities([Identity::new("x", "y")]);
        let input = vec![song("X", "Y", "s"), song("x ", "z", "s"), song("Q", "R", "s")];

        let once = filter(input, &index);
        let twice = filter(once.kept.clone(), &index);
        assert_eq!(once.kept, twice.kept);
        assert_eq!(twice.skipped, 0);
    }

    #[test]
    fn test_filter_keeps_duplicates_across_sources() {
        let index = LibraryIndex::new();
        let filtered = filter(vec![song("A", "B", "s1"), song("a", "b", "s2")], &index);
        assert_eq!(filtered.kept.len(), 2);
    }

    #[test]
    fn test_selection_drops_repeats() {
        let index = LibraryIndex::from_identities([Identity::new("old", "song")]);
        let input = vec![
            song("A", "B", "s1"),
            song("Old", "Song", "s1"),
            song(" a", "B ", "s2"),
            song("C", "D", "s2"),
        ];

        let filtered = filter_selection(input, &index);
        let picked: Vec<_> = filtered
            .kept
            .iter()
            .map(|c| (c.title.as_str(), c.source.as_str()))
            .collect();
        assert_eq!(picked, vec![("B", "s1"), ("D", "s2")]);
        assert_eq!(filtered.skipped, 2);

        let again = filter_selection(filtered.kept.clone(), &index);
        assert_eq!(again.kept, filtered.kept);
    }

    #[test]
    fn test_selection_drops_colliding_filenames() {
        let index = LibraryIndex::new();
        let input = vec![
            song("A/B", "x", "s1"),
            song("A_B", "x", "s2"),
            song("a_b", "X", "s3"),
            song("A:B", "y", "s1"),
        ];

        let filtered = filter_selection(input, &index);
        let picked: Vec<_> = filtered
            .kept
            .iter()
            .map(|c| (c.singer.as_str(), c.title.as_str()))
            .collect();
        assert_eq!(picked, vec![("A/B", "x"), ("A:B", "y")]);
        assert_eq!(filtered.skipped, 2);
    }
}
