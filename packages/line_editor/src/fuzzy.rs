//! Fuzzy ranking for history search, scored by skim's matcher.

use std::collections::HashSet;

use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuzzyMatch {
    pub request: String,
    pub score: i64,
    /// Codepoint indices of the matched characters in `request`.
    pub positions: Vec<usize>,
}

fn matcher() -> SkimMatcherV2 {
    SkimMatcherV2::default().ignore_case()
}

/// Scores `candidate` against `query`, or `None` if `query` is not a
/// case-insensitive subsequence of it.
pub fn score(query: &str, candidate: &str) -> Option<(i64, Vec<usize>)> {
    matcher().fuzzy_indices(candidate, query)
}

/// Ranks `candidates` (most recent first) by score, keeping recency order
/// among equal scores and only the most recent copy of repeated entries.
pub fn rank<'a, I>(query: &str, candidates: I) -> Vec<FuzzyMatch>
where
    I: IntoIterator<Item = &'a str>,
{
    let matcher = matcher();
    let mut seen = HashSet::new();
    let mut matches: Vec<FuzzyMatch> = candidates
        .into_iter()
        .filter(|c| seen.insert(*c))
        .filter_map(|c| {
            matcher.fuzzy_indices(c, query).map(|(score, positions)| FuzzyMatch {
                request: c.to_string(),
                score,
                positions,
            })
        })
        .collect();

    matches.sort_by(|a, b| b.score.cmp(&a.score));
    matches
}
