use std::collections::HashSet;

use crate::fulltext::filter::TokenFilter;
use crate::fulltext::token::Token;

/// Removes stopwords while preserving original token positions, so phrase
/// queries stay exact across stopword-filtered fields (spec §4.5, Open
/// Question resolution: keep positions rather than renumber).
pub struct StopWordFilter {
    words: HashSet<String>,
    pub version: u32,
}

impl StopWordFilter {
    pub fn new(words: HashSet<String>, version: u32) -> Self {
        StopWordFilter { words, version }
    }

    pub fn english() -> Self {
        let list = [
            "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in",
            "is", "it", "its", "of", "on", "that", "the", "to", "was", "were", "will", "with",
        ];
        StopWordFilter { words: list.iter().map(|s| s.to_string()).collect(), version: 1 }
    }

    /// Removing a word requires re-indexing the affected fields; adding one
    /// does not (spec §4.5) — callers bump `version` only on removal.
    pub fn remove_word(&mut self, word: &str) {
        if self.words.remove(word) {
            self.version += 1;
        }
    }

    pub fn add_word(&mut self, word: impl Into<String>) {
        self.words.insert(word.into());
    }
}

impl TokenFilter for StopWordFilter {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token> {
        tokens.into_iter().filter(|t| !self.words.contains(&t.text)).collect()
    }

    fn name(&self) -> &str {
        "stopword"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fulltext::token::Token;

    #[test]
    fn positions_are_not_renumbered_after_filtering() {
        let filter = StopWordFilter::english();
        let tokens = vec![
            Token::word("the", 0, 0),
            Token::word("quick", 1, 4),
            Token::word("fox", 2, 10),
        ];
        let filtered = filter.filter(tokens);
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].position, 1);
        assert_eq!(filtered[1].position, 2);
    }
}
