use std::collections::BTreeSet;
use std::ops::Bound;

/// Ordered word set used for Tab completion.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    words: BTreeSet<String>,
}

impl Dictionary {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            words: words.into_iter().map(Into::into).collect(),
        }
    }

    /// Indexes every letter-or-digit run of `text` longer than one char.
    pub fn add_words(&mut self, text: &str) {
        for word in text.split(|c: char| !c.is_alphanumeric()) {
            if word.chars().count() > 1 {
                self.words.insert(word.to_string());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Longest common prefix of all words that extend `prefix`.
    ///
    /// Returns `None` when no word extends it, or when the common prefix is
    /// `prefix` itself.
    pub fn search(&self, prefix: &str) -> Option<String> {
        if prefix.is_empty() {
            return None;
        }

        let mut matches = self
            .words
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|w| w.starts_with(prefix));

        let mut common: String = matches.next()?.clone();
        for word in matches {
            let shared: usize = common
                .chars()
                .zip(word.chars())
                .take_while(|(a, b)| a == b)
                .map(|(a, _)| a.len_utf8())
                .sum();
            common.truncate(shared);
        }

        (common.len() > prefix.len()).then_some(common)
    }
}
